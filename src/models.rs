use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::{Deserializer, IntoDeserializer};
use serde::{Deserialize, Serialize, Serializer};

/// Declares a closed set of values stored as SCREAMING_SNAKE_CASE text.
macro_rules! text_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
            Serialize, Deserialize, sqlx::Type,
        )]
        #[serde(rename_all = "SCREAMING_SNAKE_CASE")]
        #[sqlx(rename_all = "SCREAMING_SNAKE_CASE")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

text_enum!(EventType {
    Concert => "CONCERT",
    Exhibition => "EXHIBITION",
    Meetup => "MEETUP",
    Workshop => "WORKSHOP",
    Sports => "SPORTS",
    Festival => "FESTIVAL",
    Party => "PARTY",
    Conference => "CONFERENCE",
    Other => "OTHER",
});

text_enum!(EventProperty {
    Outdoor => "OUTDOOR",
    Indoor => "INDOOR",
    FamilyFriendly => "FAMILY_FRIENDLY",
    PetFriendly => "PET_FRIENDLY",
    FreeEntry => "FREE_ENTRY",
    Accessible => "ACCESSIBLE",
    AdultsOnly => "ADULTS_ONLY",
    Online => "ONLINE",
});

text_enum!(PaymentType {
    Free => "FREE",
    Paid => "PAID",
    Donation => "DONATION",
});

impl PaymentType {
    pub fn is_free(&self) -> bool {
        matches!(self, PaymentType::Free)
    }
}

text_enum!(EventStatus {
    Upcoming => "UPCOMING",
    Ongoing => "ONGOING",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
});

/// A filter value that may be the literal `"any"`, meaning no constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint<T> {
    Any,
    Only(T),
}

impl<T> Constraint<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Constraint::Any => None,
            Constraint::Only(value) => Some(value),
        }
    }
}

impl<'de, T: Deserialize<'de>> Deserialize<'de> for Constraint<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if raw.eq_ignore_ascii_case("any") {
            return Ok(Constraint::Any);
        }
        let inner: serde::de::value::StringDeserializer<D::Error> = raw.into_deserializer();
        T::deserialize(inner).map(Constraint::Only)
    }
}

impl<T: Serialize> Serialize for Constraint<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Constraint::Any => serializer.serialize_str("any"),
            Constraint::Only(value) => value.serialize(serializer),
        }
    }
}

/// Optional constraints for the event listing. Absent fields do not filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventFilter {
    pub location: Option<String>,
    pub event_type: Option<EventType>,
    pub price_range: Option<(Option<f64>, Option<f64>)>,
    pub event_properties: Option<BTreeSet<EventProperty>>,
    pub status: Option<Constraint<EventStatus>>,
    pub payment_type: Option<PaymentType>,
    pub date_range: Option<(Option<String>, Option<String>)>,
    pub search_query: Option<String>,
    pub currency: Option<Constraint<String>>,
    pub verified_only: Option<bool>,
    pub organizer_id: Option<String>,
    pub age_restriction: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub is_verified: bool,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub longitude: f64,
    pub latitude: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventLocation {
    pub id: String,
    pub address: Option<String>,
    pub city: String,
    pub place_name: Option<String>,
    pub coordinates: Coordinates,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Organizer {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
    pub is_verified: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub display_name: String,
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRef {
    pub id: String,
}

/// Joined read view of an event. Assembled per query, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EventAggregate {
    pub id: String,
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub photo_urls: Vec<String>,
    pub event_type: EventType,
    pub event_properties: Vec<EventProperty>,
    pub payment_type: PaymentType,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub posted_date: DateTime<Utc>,
    pub is_verified: bool,
    pub is_private: bool,
    pub max_participants: Option<i64>,
    pub tags: Vec<String>,
    pub status: EventStatus,
    pub age_restriction: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub location: EventLocation,
    pub organizer: Organizer,
    pub participants: Vec<UserSummary>,
    pub favorited_by: Vec<UserRef>,
}

/// Payload for creating or replacing an event.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventInput {
    pub title: String,
    pub description: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub photo_urls: Vec<String>,
    pub event_type: EventType,
    #[serde(default)]
    pub event_properties: Vec<EventProperty>,
    pub payment_type: PaymentType,
    pub price: Option<f64>,
    pub currency: Option<String>,
    pub address: String,
    pub city: Option<String>,
    pub place_name: Option<String>,
    #[serde(default)]
    pub is_private: bool,
    pub max_participants: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub age_restriction: Option<i64>,
}

#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserSearch {
    pub username: Option<String>,
    pub is_verified: Option<bool>,
    pub skip: Option<i64>,
    pub take: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn any_sentinel_is_not_a_value() {
        let filter: EventFilter =
            serde_json::from_str(r#"{"status":"any","currency":"ANY"}"#).unwrap();
        assert_eq!(filter.status, Some(Constraint::Any));
        assert_eq!(filter.currency, Some(Constraint::Any));
    }

    #[test]
    fn concrete_constraints_parse_as_values() {
        let filter: EventFilter =
            serde_json::from_str(r#"{"status":"UPCOMING","currency":"USD"}"#).unwrap();
        assert_eq!(filter.status, Some(Constraint::Only(EventStatus::Upcoming)));
        assert_eq!(filter.currency, Some(Constraint::Only("USD".to_string())));
    }

    #[test]
    fn unknown_status_is_rejected() {
        assert!(serde_json::from_str::<EventFilter>(r#"{"status":"SOMEDAY"}"#).is_err());
    }

    #[test]
    fn ranges_accept_nulls() {
        let filter: EventFilter = serde_json::from_str(
            r#"{"priceRange":[10,null],"dateRange":[null,"2025-06-01"],"eventProperties":["OUTDOOR"]}"#,
        )
        .unwrap();
        assert_eq!(filter.price_range, Some((Some(10.0), None)));
        assert_eq!(filter.date_range, Some((None, Some("2025-06-01".to_string()))));
        assert!(filter.event_properties.unwrap().contains(&EventProperty::Outdoor));
    }

    #[test]
    fn enum_text_matches_serde_names() {
        let json = serde_json::to_string(&EventProperty::FamilyFriendly).unwrap();
        assert_eq!(json, format!("\"{}\"", EventProperty::FamilyFriendly.as_str()));
    }
}
