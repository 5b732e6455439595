//! Translates an [`EventFilter`] into a parameterized SQL predicate.
//!
//! Every filter dimension is a function from the filter to an optional
//! [`Fragment`]. A fragment owns both its SQL text and the values it binds, so
//! placeholders and parameters can never drift apart: `bind` writes the `?`
//! and records the value in one step. [`build`] folds the dimensions into a
//! [`Predicate`] whose fragments are joined with `AND`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::error::AppError;
use crate::models::EventFilter;

/// A value bound to a positional `?` placeholder.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Real(f64),
    Integer(i64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<f64> for SqlValue {
    fn from(value: f64) -> Self {
        SqlValue::Real(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for SqlValue {
    fn from(value: DateTime<Utc>) -> Self {
        SqlValue::Timestamp(value)
    }
}

/// One boolean SQL expression together with the values it binds, in order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    sql: String,
    params: Vec<SqlValue>,
}

impl Fragment {
    pub fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }

    pub fn push(mut self, sql: &str) -> Self {
        self.sql.push_str(sql);
        self
    }

    pub fn bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.sql.push('?');
        self.params.push(value.into());
        self
    }

    /// Splices another fragment in place, keeping its parameters in order.
    pub fn append(mut self, other: Fragment) -> Self {
        self.sql.push_str(&other.sql);
        self.params.extend(other.params);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    fragments: Vec<String>,
    params: Vec<SqlValue>,
}

impl Predicate {
    pub fn and(&mut self, fragment: Fragment) {
        self.fragments.push(fragment.sql);
        self.params.extend(fragment.params);
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// ` WHERE a AND b`, or an empty string when unconstrained.
    pub fn where_clause(&self) -> String {
        if self.fragments.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.fragments.join(" AND "))
        }
    }
}

type Dimension = fn(&EventFilter) -> Result<Option<Fragment>, AppError>;

const DIMENSIONS: &[Dimension] = &[
    verified_only,
    location,
    event_type,
    price,
    currency_only,
    event_properties,
    status,
    payment_type,
    search_query,
    date_range,
    organizer,
    age_restriction,
];

pub fn build(filter: &EventFilter) -> Result<Predicate, AppError> {
    DIMENSIONS
        .iter()
        .try_fold(Predicate::default(), |mut predicate, dimension| {
            if let Some(fragment) = dimension(filter)? {
                predicate.and(fragment);
            }
            Ok(predicate)
        })
}

const FREE: &str = "e.payment_type = 'FREE'";

/// `%text%` with LIKE wildcards in the user input escaped by `\`.
pub fn contains_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// Lowercased text kept next to matchable columns. SQLite's LIKE folds
/// ASCII only, so both sides are folded here instead.
pub fn fold(text: &str) -> String {
    text.to_lowercase()
}

fn folded_pattern(text: &str) -> String {
    contains_pattern(&fold(text))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn verified_only(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok((filter.verified_only == Some(true)).then(|| Fragment::new("u.is_verified = ").bind(true)))
}

fn location(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(non_blank(&filter.location).map(|text| {
        let pattern = folded_pattern(text);
        Fragment::new("(l.search_city LIKE ")
            .bind(pattern.clone())
            .push(" ESCAPE '\\' OR l.search_address LIKE ")
            .bind(pattern)
            .push(" ESCAPE '\\')")
    }))
}

fn event_type(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(filter
        .event_type
        .map(|t| Fragment::new("e.event_type = ").bind(t.as_str())))
}

fn status(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(filter
        .status
        .as_ref()
        .and_then(|s| s.value())
        .map(|s| Fragment::new("e.status = ").bind(s.as_str())))
}

fn payment_type(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(filter
        .payment_type
        .map(|p| Fragment::new("e.payment_type = ").bind(p.as_str())))
}

fn organizer(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(non_blank(&filter.organizer_id).map(|id| Fragment::new("e.organizer_id = ").bind(id)))
}

fn age_restriction(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(filter.age_restriction.map(|age| {
        Fragment::new("(e.age_restriction IS NULL OR e.age_restriction <= ")
            .bind(age)
            .push(")")
    }))
}

fn active_currency(filter: &EventFilter) -> Option<&str> {
    filter
        .currency
        .as_ref()
        .and_then(|c| c.value())
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
}

/// The price bounds, or `None` when no bound is given.
fn price_bounds(filter: &EventFilter) -> Result<Option<(Option<f64>, Option<f64>)>, AppError> {
    let Some((min, max)) = filter.price_range else {
        return Ok(None);
    };
    if min.is_none() && max.is_none() {
        return Ok(None);
    }
    if min.into_iter().chain(max).any(|bound| !bound.is_finite()) {
        return Err(AppError::InvalidArgument(
            "priceRange bounds must be finite numbers".to_string(),
        ));
    }
    if let (Some(min), Some(max)) = (min, max) {
        if min > max {
            return Err(AppError::InvalidArgument(format!(
                "priceRange minimum {min} exceeds maximum {max}"
            )));
        }
    }
    Ok(Some((min, max)))
}

/// Price bounds, narrowed to the requested currency when one is active.
/// A minimum of exactly zero also admits free events, which have no price.
fn price(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    let Some((min, max)) = price_bounds(filter)? else {
        return Ok(None);
    };

    let mut condition = match (min, max) {
        (Some(min), Some(max)) => Fragment::new("e.price BETWEEN ")
            .bind(min)
            .push(" AND ")
            .bind(max),
        (Some(min), None) => Fragment::new("e.price >= ").bind(min),
        (None, Some(max)) => Fragment::new("e.price <= ").bind(max),
        (None, None) => return Ok(None),
    };

    if let Some(currency) = active_currency(filter) {
        condition = Fragment::new("(")
            .append(condition)
            .push(" AND e.currency = ")
            .bind(currency)
            .push(")");
    }

    if min == Some(0.0) {
        condition = Fragment::new("(")
            .append(condition)
            .push(" OR ")
            .push(FREE)
            .push(")");
    }

    Ok(Some(condition))
}

/// Currency without any price bound still keeps free events.
fn currency_only(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    if price_bounds(filter)?.is_some() {
        return Ok(None);
    }
    Ok(active_currency(filter).map(|currency| {
        Fragment::new("(e.currency = ")
            .bind(currency)
            .push(" OR ")
            .push(FREE)
            .push(")")
    }))
}

/// Superset containment: every requested property must be on the event.
fn event_properties(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    let Some(properties) = filter.event_properties.as_ref().filter(|p| !p.is_empty()) else {
        return Ok(None);
    };
    let wanted = serde_json::to_string(properties)
        .map_err(|e| AppError::InvalidArgument(format!("invalid eventProperties: {e}")))?;

    Ok(Some(
        Fragment::new("NOT EXISTS (SELECT 1 FROM json_each(")
            .bind(wanted)
            .push(
                ") AS wanted WHERE wanted.value NOT IN \
                 (SELECT value FROM json_each(e.event_properties)))",
            ),
    ))
}

fn search_query(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    Ok(non_blank(&filter.search_query).map(|text| {
        let pattern = folded_pattern(text);
        Fragment::new("(e.search_title LIKE ")
            .bind(pattern.clone())
            .push(" ESCAPE '\\' OR e.search_description LIKE ")
            .bind(pattern)
            .push(" ESCAPE '\\')")
    }))
}

/// Interval intersection against `[from, to]`. An event without an end time
/// runs indefinitely.
fn date_range(filter: &EventFilter) -> Result<Option<Fragment>, AppError> {
    let Some((from, to)) = &filter.date_range else {
        return Ok(None);
    };
    let from = non_blank(from).map(parse_date).transpose()?;
    let to = non_blank(to).map(parse_date).transpose()?;

    let fragment = match (from, to) {
        (None, None) => return Ok(None),
        (Some(from), None) => Fragment::new("(e.end_time IS NULL OR e.end_time >= ")
            .bind(from)
            .push(")"),
        (None, Some(to)) => Fragment::new("e.start_time <= ").bind(to),
        (Some(from), Some(to)) => {
            if from > to {
                return Err(AppError::InvalidArgument(
                    "dateRange start is after its end".to_string(),
                ));
            }
            Fragment::new("(e.start_time <= ")
                .bind(to)
                .push(" AND (e.end_time IS NULL OR e.end_time >= ")
                .bind(from)
                .push("))")
        }
    };
    Ok(Some(fragment))
}

/// Accepts RFC 3339, a naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) or a bare
/// `YYYY-MM-DD` (UTC midnight).
pub fn parse_date(raw: &str) -> Result<DateTime<Utc>, AppError> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Ok(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(NaiveTime::MIN).and_utc());
    }
    Err(AppError::InvalidArgument(format!(
        "invalid date `{raw}` in dateRange"
    )))
}
