use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::geocoding::Geocoder;
use crate::storage::Storage;

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
    pub geocoder: Arc<dyn Geocoder>,
    pub storage: Arc<dyn Storage>,
}
