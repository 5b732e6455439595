use axum::{
    Json,
    body::Bytes,
    extract::{FromRequestParts, Path, Query, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use serde::Deserialize;

use crate::{
    error::AppError,
    events, favorites,
    models::{EventAggregate, EventFilter, EventInput, PhotoUpload, User, UserSearch},
    participation,
    state::AppState,
    users::{self, Registration},
};

pub const USER_HEADER: &str = "x-user-id";

/// The calling user, resolved from the `x-user-id` header set by the session
/// layer in front of this service.
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let user_id = parts
            .headers
            .get(USER_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or(AppError::Unauthorized)?;
        users::caller(state, user_id).await.map(CurrentUser)
    }
}

pub async fn register_user(
    State(app_state): State<AppState>,
    Json(payload): Json<Registration>,
) -> Result<(StatusCode, Json<User>), AppError> {
    let user = users::register_user(&app_state, payload).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

/// An empty body lists every event.
pub async fn search_events(
    State(app_state): State<AppState>,
    body: Bytes,
) -> Result<Json<Vec<EventAggregate>>, AppError> {
    let filter = if body.iter().all(u8::is_ascii_whitespace) {
        EventFilter::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidArgument(format!("invalid filter: {e}")))?
    };
    events::all_events(&app_state, &filter).await.map(Json)
}

pub async fn get_events(State(app_state): State<AppState>) -> Result<Json<Vec<EventAggregate>>, AppError> {
    events::all_events(&app_state, &EventFilter::default())
        .await
        .map(Json)
}

pub async fn get_event(
    State(app_state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<EventAggregate>, AppError> {
    events::event_by_id(&app_state, &id).await.map(Json)
}

pub async fn create_event(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Json(payload): Json<EventInput>,
) -> Result<(StatusCode, Json<EventAggregate>), AppError> {
    let event = events::create_event(&app_state, payload, &user.id, Vec::new()).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn update_event(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    Json(payload): Json<EventInput>,
) -> Result<Json<EventAggregate>, AppError> {
    events::update_event(&app_state, &id, payload, &user.id, Vec::new())
        .await
        .map(Json)
}

pub async fn delete_event(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    events::delete_event(&app_state, &id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_event_photo(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<EventAggregate>), AppError> {
    if body.is_empty() {
        return Err(AppError::InvalidArgument("photo body is empty".to_string()));
    }
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::InvalidArgument("content-type header is required".to_string()))?;

    let photo = PhotoUpload {
        bytes: body.to_vec(),
        content_type: content_type.to_string(),
    };
    let event = events::add_photo(&app_state, &id, &user.id, photo).await?;
    Ok((StatusCode::CREATED, Json(event)))
}

pub async fn my_events(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<EventAggregate>>, AppError> {
    events::events_by_organizer(&app_state, &user.id).await.map(Json)
}

pub async fn add_favorite(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    favorites::add_to_favorites(&app_state, &id, &user.id).await?;
    Ok(StatusCode::CREATED)
}

pub async fn remove_favorite(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    favorites::remove_from_favorites(&app_state, &id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_favorites(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<EventAggregate>>, AppError> {
    favorites::favorite_events(&app_state, &user.id).await.map(Json)
}

pub async fn participate(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    participation::participate(&app_state, &id, &user.id).await?;
    Ok(StatusCode::CREATED)
}

pub async fn leave(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    participation::leave(&app_state, &id, &user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn my_participations(
    State(app_state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Result<Json<Vec<EventAggregate>>, AppError> {
    participation::participating_events(&app_state, &user.id)
        .await
        .map(Json)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayload {
    user_id: String,
    is_verified: bool,
}

pub async fn verify_organizer(
    State(app_state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Json(payload): Json<VerificationPayload>,
) -> Result<Json<User>, AppError> {
    users::verify_organizer(&app_state, &admin.id, &payload.user_id, payload.is_verified)
        .await
        .map(Json)
}

pub async fn search_users(
    State(app_state): State<AppState>,
    CurrentUser(admin): CurrentUser,
    Query(search): Query<UserSearch>,
) -> Result<Json<Vec<User>>, AppError> {
    users::search_users(&app_state, &admin.id, &search).await.map(Json)
}
