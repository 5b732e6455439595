//! Event persistence: the aggregate read query and the event write paths.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::SqlitePool;
use tracing::{debug, error, warn};

use crate::db::bind_params;
use crate::error::AppError;
use crate::filter::{self, Fragment, Predicate, fold};
use crate::models::{
    Coordinates, EventAggregate, EventFilter, EventLocation, EventProperty, EventStatus,
    EventType, Organizer, PaymentType, UserRef, UserSummary,
};

const EVENT_SELECT: &str = "
SELECT
    e.id, e.title, e.description, e.start_time, e.end_time, e.photo_urls,
    e.event_type, e.event_properties, e.payment_type, e.price, e.currency,
    e.posted_date, e.is_verified, e.is_private, e.max_participants, e.tags,
    e.status, e.age_restriction, e.created_at, e.updated_at,
    l.id AS location_id, l.address, l.city, l.place_name, l.longitude, l.latitude,
    u.id AS organizer_id,
    u.username AS organizer_username,
    u.display_name AS organizer_display_name,
    u.avatar AS organizer_avatar,
    u.is_verified AS organizer_verified,
    (
        SELECT json_group_array(json_object(
            'id', p.id,
            'username', p.username,
            'display_name', p.display_name,
            'avatar', p.avatar
        ))
        FROM event_participants ep
        JOIN users p ON ep.user_id = p.id
        WHERE ep.event_id = e.id
    ) AS participants,
    (
        SELECT json_group_array(f.user_id)
        FROM event_favorites f
        WHERE f.event_id = e.id
    ) AS favorited_by
FROM events e
JOIN locations l ON e.location_id = l.id
JOIN users u ON e.organizer_id = u.id";

/// Which events a read selects. Every scope runs through [`fetch_events`].
pub enum EventScope<'a> {
    All(&'a EventFilter),
    ById(&'a str),
    ByOrganizer(&'a str),
    FavoritedBy(&'a str),
    ParticipatedBy(&'a str),
}

impl EventScope<'_> {
    pub fn predicate(&self) -> Result<Predicate, AppError> {
        match self {
            EventScope::All(filter) => filter::build(filter),
            EventScope::ById(id) => Ok(single(Fragment::new("e.id = ").bind(*id))),
            EventScope::ByOrganizer(id) => Ok(single(Fragment::new("e.organizer_id = ").bind(*id))),
            EventScope::FavoritedBy(user_id) => Ok(single(
                Fragment::new(
                    "EXISTS (SELECT 1 FROM event_favorites f WHERE f.event_id = e.id AND f.user_id = ",
                )
                .bind(*user_id)
                .push(")"),
            )),
            EventScope::ParticipatedBy(user_id) => Ok(single(
                Fragment::new(
                    "EXISTS (SELECT 1 FROM event_participants ep WHERE ep.event_id = e.id AND ep.user_id = ",
                )
                .bind(*user_id)
                .push(")"),
            )),
        }
    }
}

fn single(fragment: Fragment) -> Predicate {
    let mut predicate = Predicate::default();
    predicate.and(fragment);
    predicate
}

#[derive(Debug, Deserialize)]
struct ParticipantRow {
    id: String,
    username: String,
    display_name: Option<String>,
    avatar: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: String,
    title: String,
    description: String,
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    photo_urls: Json<Vec<String>>,
    event_type: EventType,
    event_properties: Json<Vec<EventProperty>>,
    payment_type: PaymentType,
    price: Option<f64>,
    currency: Option<String>,
    posted_date: DateTime<Utc>,
    is_verified: bool,
    is_private: bool,
    max_participants: Option<i64>,
    tags: Json<Vec<String>>,
    status: EventStatus,
    age_restriction: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    location_id: String,
    address: Option<String>,
    city: String,
    place_name: Option<String>,
    longitude: f64,
    latitude: f64,
    organizer_id: String,
    organizer_username: String,
    organizer_display_name: Option<String>,
    organizer_avatar: Option<String>,
    organizer_verified: bool,
    participants: Json<Vec<ParticipantRow>>,
    favorited_by: Json<Vec<String>>,
}

fn display_name(display_name: Option<String>, username: &str) -> String {
    display_name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or_else(|| username.to_string())
}

fn into_aggregate(row: EventRow) -> Result<EventAggregate, String> {
    if row.organizer_username.trim().is_empty() {
        return Err(format!("organizer username is missing for event {}", row.id));
    }

    let participants = row
        .participants
        .0
        .into_iter()
        .map(|p| {
            if p.username.trim().is_empty() {
                return Err(format!("participant username is missing in event {}", row.id));
            }
            Ok(UserSummary {
                display_name: display_name(p.display_name, &p.username),
                id: p.id,
                username: p.username,
                avatar: p.avatar,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(EventAggregate {
        title: row.title,
        description: row.description,
        start_time: row.start_time,
        end_time: row.end_time,
        photo_urls: row.photo_urls.0,
        event_type: row.event_type,
        event_properties: row.event_properties.0,
        payment_type: row.payment_type,
        price: row.price,
        currency: row.currency,
        posted_date: row.posted_date,
        is_verified: row.is_verified,
        is_private: row.is_private,
        max_participants: row.max_participants,
        tags: row.tags.0,
        status: row.status,
        age_restriction: row.age_restriction,
        created_at: row.created_at,
        updated_at: row.updated_at,
        location: EventLocation {
            id: row.location_id,
            address: row.address,
            city: row.city,
            place_name: row.place_name,
            coordinates: Coordinates {
                longitude: row.longitude,
                latitude: row.latitude,
            },
        },
        organizer: Organizer {
            display_name: display_name(row.organizer_display_name, &row.organizer_username),
            id: row.organizer_id,
            username: row.organizer_username,
            avatar: row.organizer_avatar,
            is_verified: row.organizer_verified,
        },
        participants,
        favorited_by: row
            .favorited_by
            .0
            .into_iter()
            .map(|id| UserRef { id })
            .collect(),
        id: row.id,
    })
}

/// Runs the aggregate query for a scope, ordered by start time.
pub async fn fetch_events(
    pool: &SqlitePool,
    scope: &EventScope<'_>,
    timeout: Duration,
) -> Result<Vec<EventAggregate>, AppError> {
    let predicate = scope.predicate()?;
    let sql = format!(
        "{EVENT_SELECT}{} ORDER BY e.start_time ASC, e.id ASC",
        predicate.where_clause()
    );
    debug!(
        fragments = predicate.fragments().len(),
        params = predicate.params().len(),
        "fetching events"
    );

    let query = bind_params(sqlx::query_as::<_, EventRow>(&sql), predicate.params());
    let rows = match tokio::time::timeout(timeout, query.fetch_all(pool)).await {
        Ok(Ok(rows)) => rows,
        Ok(Err(e)) => {
            error!(error = ?e, "event query failed");
            return Err(AppError::Upstream("failed to fetch events".to_string()));
        }
        Err(_) => {
            error!(?timeout, "event query timed out");
            return Err(AppError::Upstream("failed to fetch events".to_string()));
        }
    };

    let fetched = rows.len();
    let events: Vec<EventAggregate> = rows
        .into_iter()
        .filter_map(|row| match into_aggregate(row) {
            Ok(event) => Some(event),
            Err(reason) => {
                warn!(%reason, "skipping event that failed to map");
                None
            }
        })
        .collect();
    debug!(fetched, returned = events.len(), "fetched events");
    Ok(events)
}

/// What the organization paths need to know about a stored event.
#[derive(Debug, sqlx::FromRow)]
pub struct EventRecord {
    pub id: String,
    pub organizer_id: String,
    pub photo_urls: Json<Vec<String>>,
    pub location_id: String,
    pub address: Option<String>,
    pub city: String,
    pub place_name: Option<String>,
}

pub async fn find_event_record(pool: &SqlitePool, id: &str) -> Result<Option<EventRecord>, AppError> {
    sqlx::query_as(
        "SELECT e.id, e.organizer_id, e.photo_urls, e.location_id, l.address, l.city, l.place_name
         FROM events e JOIN locations l ON e.location_id = l.id
         WHERE e.id = ?",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
    .map_err(AppError::from)
}

pub struct NewLocation<'a> {
    pub address: Option<&'a str>,
    pub city: &'a str,
    pub place_name: Option<&'a str>,
    pub coordinates: Coordinates,
}

/// Column values shared by event inserts and updates.
pub struct EventValues<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub photo_urls: &'a [String],
    pub event_type: EventType,
    pub event_properties: &'a [EventProperty],
    pub payment_type: PaymentType,
    pub price: Option<f64>,
    pub currency: Option<&'a str>,
    pub is_private: bool,
    pub max_participants: Option<i64>,
    pub tags: &'a [String],
    pub age_restriction: Option<i64>,
}

async fn insert_location(
    tx: &mut sqlx::SqliteConnection,
    location: &NewLocation<'_>,
) -> Result<String, AppError> {
    let now = Utc::now();
    let (id,): (String,) = sqlx::query_as(
        "INSERT INTO locations (
            id, address, city, place_name, search_city, search_address,
            longitude, latitude, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
    )
    .bind(nanoid::nanoid!())
    .bind(location.address)
    .bind(location.city)
    .bind(location.place_name)
    .bind(fold(location.city))
    .bind(location.address.map(fold))
    .bind(location.coordinates.longitude)
    .bind(location.coordinates.latitude)
    .bind(now)
    .bind(now)
    .fetch_one(&mut *tx)
    .await?;
    Ok(id)
}

/// Inserts location and event, and enrolls the organizer as a participant.
pub async fn insert_event(
    pool: &SqlitePool,
    id: &str,
    organizer_id: &str,
    location: &NewLocation<'_>,
    values: &EventValues<'_>,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    let location_id = insert_location(&mut tx, location).await?;
    let now = Utc::now();

    sqlx::query(
        "INSERT INTO events (
            id, title, description, search_title, search_description, start_time,
            end_time, photo_urls, event_type, event_properties, payment_type, price,
            currency, posted_date, is_verified, is_private, max_participants, tags,
            status, age_restriction, location_id, organizer_id, created_at, updated_at
        ) VALUES (
            ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
            (SELECT is_verified FROM users WHERE id = ?),
            ?, ?, ?, ?, ?, ?, ?, ?, ?
        )",
    )
    .bind(id)
    .bind(values.title)
    .bind(values.description)
    .bind(fold(values.title))
    .bind(fold(values.description))
    .bind(values.start_time)
    .bind(values.end_time)
    .bind(Json(values.photo_urls))
    .bind(values.event_type)
    .bind(Json(values.event_properties))
    .bind(values.payment_type)
    .bind(values.price)
    .bind(values.currency)
    .bind(now)
    .bind(organizer_id)
    .bind(values.is_private)
    .bind(values.max_participants)
    .bind(Json(values.tags))
    .bind(EventStatus::Upcoming)
    .bind(values.age_restriction)
    .bind(&location_id)
    .bind(organizer_id)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await?;

    sqlx::query("INSERT INTO event_participants (event_id, user_id) VALUES (?, ?)")
        .bind(id)
        .bind(organizer_id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

/// Replaces the event's columns. A new location is inserted when given and
/// the previous one is dropped if nothing else references it.
pub async fn update_event(
    pool: &SqlitePool,
    id: &str,
    new_location: Option<&NewLocation<'_>>,
    values: &EventValues<'_>,
) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;

    let (previous_location,): (String,) = sqlx::query_as("SELECT location_id FROM events WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    let location_id = match new_location {
        Some(location) => insert_location(&mut tx, location).await?,
        None => previous_location.clone(),
    };

    sqlx::query(
        "UPDATE events SET
            title = ?, description = ?, search_title = ?, search_description = ?,
            start_time = ?, end_time = ?, photo_urls = ?,
            event_type = ?, event_properties = ?, payment_type = ?, price = ?, currency = ?,
            is_private = ?, max_participants = ?, tags = ?, age_restriction = ?,
            location_id = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(values.title)
    .bind(values.description)
    .bind(fold(values.title))
    .bind(fold(values.description))
    .bind(values.start_time)
    .bind(values.end_time)
    .bind(Json(values.photo_urls))
    .bind(values.event_type)
    .bind(Json(values.event_properties))
    .bind(values.payment_type)
    .bind(values.price)
    .bind(values.currency)
    .bind(values.is_private)
    .bind(values.max_participants)
    .bind(Json(values.tags))
    .bind(values.age_restriction)
    .bind(&location_id)
    .bind(Utc::now())
    .bind(id)
    .execute(&mut *tx)
    .await?;

    if location_id != previous_location {
        delete_orphan_location(&mut tx, &previous_location).await?;
    }

    tx.commit().await?;
    Ok(())
}

async fn delete_orphan_location(
    tx: &mut sqlx::SqliteConnection,
    location_id: &str,
) -> Result<(), AppError> {
    sqlx::query(
        "DELETE FROM locations WHERE id = ? AND NOT EXISTS (SELECT 1 FROM events WHERE location_id = ?)",
    )
    .bind(location_id)
    .bind(location_id)
    .execute(&mut *tx)
    .await?;
    Ok(())
}

pub async fn delete_event(pool: &SqlitePool, record: &EventRecord) -> Result<(), AppError> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM events WHERE id = ?")
        .bind(&record.id)
        .execute(&mut *tx)
        .await?;
    delete_orphan_location(&mut tx, &record.location_id).await?;
    tx.commit().await?;
    Ok(())
}

pub async fn append_photo(pool: &SqlitePool, id: &str, path: &str) -> Result<(), AppError> {
    sqlx::query("UPDATE events SET photo_urls = json_insert(photo_urls, '$[#]', ?), updated_at = ? WHERE id = ?")
        .bind(path)
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}
