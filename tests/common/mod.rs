#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use eventhub::config::Config;
use eventhub::db::{self, NewUser};
use eventhub::error::AppError;
use eventhub::events;
use eventhub::geocoding::Geocoder;
use eventhub::models::{
    Coordinates, EventAggregate, EventInput, EventProperty, EventType, PaymentType, User,
};
use eventhub::state::AppState;
use eventhub::storage::Storage;

pub const MINSK: Coordinates = Coordinates {
    longitude: 27.5615,
    latitude: 53.9023,
};

#[derive(Default)]
pub struct FakeGeocoder {
    pub fail: AtomicBool,
    pub calls: AtomicUsize,
}

#[async_trait]
impl Geocoder for FakeGeocoder {
    async fn geocode(&self, _address: &str, _city: &str) -> Result<Coordinates, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("geocoding failed".to_string()));
        }
        Ok(MINSK)
    }
}

#[derive(Default)]
pub struct MemoryStorage {
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    pub fail_uploads: AtomicBool,
    pub fail_removals: AtomicBool,
}

impl MemoryStorage {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(&self, bytes: Vec<u8>, path: &str, _content_type: &str) -> Result<(), AppError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("failed to upload file".to_string()));
        }
        self.files.lock().unwrap().insert(path.to_string(), bytes);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), AppError> {
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(AppError::Upstream("failed to remove file".to_string()));
        }
        self.files.lock().unwrap().remove(path);
        Ok(())
    }
}

pub struct TestApp {
    pub state: AppState,
    pub geocoder: Arc<FakeGeocoder>,
    pub storage: Arc<MemoryStorage>,
}

/// A fresh in-memory database. A single connection keeps every query on the
/// same database.
pub async fn test_app() -> TestApp {
    test_app_on("sqlite::memory:", 1).await
}

pub async fn test_app_on(database_url: &str, max_connections: u32) -> TestApp {
    let pool = db::connect(database_url, max_connections).await.unwrap();
    db::init_schema(&pool).await.unwrap();

    let mut config = Config::from_lookup(|_: &str| None).unwrap();
    config.database_url = database_url.to_string();

    let geocoder = Arc::new(FakeGeocoder::default());
    let storage = Arc::new(MemoryStorage::default());
    TestApp {
        state: AppState {
            pool,
            config: Arc::new(config),
            geocoder: geocoder.clone(),
            storage: storage.clone(),
        },
        geocoder,
        storage,
    }
}

pub async fn user(app: &TestApp, username: &str) -> User {
    db::create_user(
        &app.state.pool,
        NewUser {
            username,
            display_name: username,
            avatar: None,
            is_admin: false,
        },
    )
    .await
    .unwrap()
}

pub async fn admin(app: &TestApp, username: &str) -> User {
    db::seed_admin(&app.state.pool, username).await.unwrap();
    db::find_user_by_name(&app.state.pool, username)
        .await
        .unwrap()
        .unwrap()
}

pub async fn verified_user(app: &TestApp, username: &str) -> User {
    let user = user(app, username).await;
    db::set_user_verified(&app.state.pool, &user.id, true)
        .await
        .unwrap()
        .unwrap()
}

pub fn at(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw).unwrap().with_timezone(&Utc)
}

pub fn event_input(title: &str) -> EventInput {
    EventInput {
        title: title.to_string(),
        description: format!("{title} description"),
        start_time: at("2025-06-10T18:00:00Z"),
        end_time: Some(at("2025-06-10T22:00:00Z")),
        photo_urls: Vec::new(),
        event_type: EventType::Concert,
        event_properties: Vec::new(),
        payment_type: PaymentType::Paid,
        price: Some(20.0),
        currency: Some("BYN".to_string()),
        address: "Praspiekt Niezaliežnasci 1".to_string(),
        city: Some("Minsk".to_string()),
        place_name: None,
        is_private: false,
        max_participants: None,
        tags: Vec::new(),
        age_restriction: None,
    }
}

pub fn paid(title: &str, price: f64, currency: &str) -> EventInput {
    EventInput {
        price: Some(price),
        currency: Some(currency.to_string()),
        ..event_input(title)
    }
}

pub fn free(title: &str) -> EventInput {
    EventInput {
        payment_type: PaymentType::Free,
        price: None,
        currency: None,
        ..event_input(title)
    }
}

pub fn with_properties(title: &str, properties: &[EventProperty]) -> EventInput {
    EventInput {
        event_properties: properties.to_vec(),
        ..event_input(title)
    }
}

pub fn between(title: &str, start: &str, end: Option<&str>) -> EventInput {
    EventInput {
        start_time: at(start),
        end_time: end.map(at),
        ..event_input(title)
    }
}

pub async fn create(app: &TestApp, organizer: &User, input: EventInput) -> EventAggregate {
    events::create_event(&app.state, input, &organizer.id, Vec::new())
        .await
        .unwrap()
}

pub fn titles(events: &[EventAggregate]) -> Vec<&str> {
    events.iter().map(|e| e.title.as_str()).collect()
}
