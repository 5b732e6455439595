use tracing::info;

use crate::db;
use crate::error::AppError;
use crate::models::EventAggregate;
use crate::state::AppState;
use crate::store::{self, EventScope};

pub async fn add_to_favorites(state: &AppState, event_id: &str, user_id: &str) -> Result<(), AppError> {
    if !db::event_exists(&state.pool, event_id).await? {
        return Err(AppError::not_found("event"));
    }
    if !db::insert_favorite(&state.pool, event_id, user_id).await? {
        return Err(AppError::Conflict("event already in favorites".to_string()));
    }
    info!(event_id, user_id, "added to favorites");
    Ok(())
}

pub async fn remove_from_favorites(
    state: &AppState,
    event_id: &str,
    user_id: &str,
) -> Result<(), AppError> {
    if !db::event_exists(&state.pool, event_id).await? {
        return Err(AppError::not_found("event"));
    }
    if !db::delete_favorite(&state.pool, event_id, user_id).await? {
        return Err(AppError::NotFound("event is not in favorites".to_string()));
    }
    info!(event_id, user_id, "removed from favorites");
    Ok(())
}

pub async fn favorite_events(state: &AppState, user_id: &str) -> Result<Vec<EventAggregate>, AppError> {
    store::fetch_events(
        &state.pool,
        &EventScope::FavoritedBy(user_id),
        state.config.query_timeout,
    )
    .await
}
