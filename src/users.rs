//! User registration and organizer verification.

use serde::Deserialize;
use tracing::info;

use crate::db::{self, NewUser};
use crate::error::AppError;
use crate::models::{User, UserSearch};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub username: String,
    pub display_name: Option<String>,
    pub avatar: Option<String>,
}

pub async fn register_user(state: &AppState, registration: Registration) -> Result<User, AppError> {
    let username = registration.username.trim();
    if username.is_empty() {
        return Err(AppError::InvalidArgument("username must not be empty".to_string()));
    }
    let display_name = registration
        .display_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .unwrap_or(username);

    let user = db::create_user(
        &state.pool,
        NewUser {
            username,
            display_name,
            avatar: registration.avatar.as_deref(),
            is_admin: false,
        },
    )
    .await?;
    info!(user_id = %user.id, username, "registered user");
    Ok(user)
}

/// Resolves the calling user; an id with no account behind it is treated as
/// unauthenticated.
pub async fn caller(state: &AppState, user_id: &str) -> Result<User, AppError> {
    db::find_user(&state.pool, user_id)
        .await?
        .ok_or(AppError::Unauthorized)
}

async fn require_admin(state: &AppState, caller_id: &str) -> Result<User, AppError> {
    let user = caller(state, caller_id).await?;
    if !user.is_admin {
        return Err(AppError::Forbidden("admin access required".to_string()));
    }
    Ok(user)
}

pub async fn verify_organizer(
    state: &AppState,
    caller_id: &str,
    user_id: &str,
    is_verified: bool,
) -> Result<User, AppError> {
    let admin = require_admin(state, caller_id).await?;
    let user = db::set_user_verified(&state.pool, user_id, is_verified)
        .await?
        .ok_or_else(|| AppError::not_found("user"))?;
    info!(admin = %admin.username, user_id, is_verified, "organizer verification changed");
    Ok(user)
}

pub async fn search_users(state: &AppState, caller_id: &str, search: &UserSearch) -> Result<Vec<User>, AppError> {
    require_admin(state, caller_id).await?;
    db::search_users(&state.pool, search).await
}
