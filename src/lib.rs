//! Backend for an events platform: event listings with a composable filter,
//! organizer-side event management, favorites, participation and organizer
//! verification. State lives in SQLite; photos go to local storage and are
//! served under `/storage`.
//!
//! # Configuration
//!
//! Read from the environment (and `.env`):
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | `sqlite://events.db` |
//! | `PORT` | `3000` |
//! | `STORAGE_DIR` | `storage` |
//! | `GEOCODER_URL` | `https://nominatim.openstreetmap.org/search` |
//! | `GEOCODER_USER_AGENT` | `eventhub/0.1` |
//! | `DEFAULT_CITY` | `Minsk` |
//! | `DEFAULT_CURRENCY` | `BYN` |
//! | `QUERY_TIMEOUT_SECS` | `10` |
//! | `ADMIN_USERNAME` | unset |
//!
//! Log verbosity follows `RUST_LOG`.

use std::sync::Arc;

use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::{error, info};

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod favorites;
pub mod filter;
pub mod geocoding;
pub mod handlers;
pub mod models;
pub mod participation;
pub mod state;
pub mod storage;
pub mod store;
pub mod users;

use config::Config;
use error::AppError;
use geocoding::NominatimGeocoder;
use state::AppState;
use storage::LocalStorage;

const MAX_PHOTO_BYTES: usize = 10 * 1024 * 1024;

pub fn app(state: AppState) -> Router {
    let storage_dir = state.config.storage_dir.clone();

    Router::new()
        .route("/api/users", post(handlers::register_user))
        .route("/api/events/search", post(handlers::search_events))
        .route(
            "/api/events",
            get(handlers::get_events).post(handlers::create_event),
        )
        .route(
            "/api/events/{id}",
            get(handlers::get_event)
                .put(handlers::update_event)
                .delete(handlers::delete_event),
        )
        .route(
            "/api/events/{id}/photos",
            post(handlers::add_event_photo).layer(DefaultBodyLimit::max(MAX_PHOTO_BYTES)),
        )
        .route(
            "/api/events/{id}/favorite",
            post(handlers::add_favorite).delete(handlers::remove_favorite),
        )
        .route(
            "/api/events/{id}/participation",
            post(handlers::participate).delete(handlers::leave),
        )
        .route("/api/me/events", get(handlers::my_events))
        .route("/api/me/favorites", get(handlers::my_favorites))
        .route("/api/me/participations", get(handlers::my_participations))
        .route(
            "/api/organizers/verification",
            post(handlers::verify_organizer),
        )
        .route(
            "/api/organizers/verification/users",
            get(handlers::search_users),
        )
        .nest_service("/storage", ServeDir::new(storage_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server() -> Result<(), AppError> {
    let config = Config::load()?;

    info!("Connecting to {}", config.database_url);
    let pool = db::connect(&config.database_url, 5).await?;
    db::init_schema(&pool).await?;
    if let Some(admin) = &config.admin_username {
        db::seed_admin(&pool, admin).await?;
    }

    let storage = LocalStorage::new(&config.storage_dir);
    tokio::fs::create_dir_all(storage.root()).await?;
    let geocoder = NominatimGeocoder::new(&config.geocoder_url, &config.geocoder_user_agent)?;

    let address = format!("0.0.0.0:{}", config.port);
    let state = AppState {
        pool,
        config: Arc::new(config),
        geocoder: Arc::new(geocoder),
        storage: Arc::new(storage),
    };

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
