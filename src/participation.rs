use tracing::info;

use crate::db::{self, JoinOutcome};
use crate::error::AppError;
use crate::models::EventAggregate;
use crate::state::AppState;
use crate::store::{self, EventScope};

pub async fn participate(state: &AppState, event_id: &str, user_id: &str) -> Result<(), AppError> {
    match db::join_event(&state.pool, event_id, user_id).await? {
        JoinOutcome::Joined => {
            info!(event_id, user_id, "joined event");
            Ok(())
        }
        JoinOutcome::AlreadyJoined => Err(AppError::Conflict(
            "user is already a participant of this event".to_string(),
        )),
        JoinOutcome::Full => Err(AppError::Conflict("event is full".to_string())),
        JoinOutcome::MissingEvent => Err(AppError::not_found("event")),
    }
}

pub async fn leave(state: &AppState, event_id: &str, user_id: &str) -> Result<(), AppError> {
    if !db::event_exists(&state.pool, event_id).await? {
        return Err(AppError::not_found("event"));
    }
    if !db::leave_event(&state.pool, event_id, user_id).await? {
        return Err(AppError::Conflict(
            "user is not a participant of this event".to_string(),
        ));
    }
    info!(event_id, user_id, "left event");
    Ok(())
}

pub async fn participating_events(state: &AppState, user_id: &str) -> Result<Vec<EventAggregate>, AppError> {
    store::fetch_events(
        &state.pool,
        &EventScope::ParticipatedBy(user_id),
        state.config.query_timeout,
    )
    .await
}
