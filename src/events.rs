//! Event reads and the organizer-side write paths.

use nanoid::nanoid;
use tracing::{info, warn};

use crate::error::AppError;
use crate::models::{EventAggregate, EventFilter, EventInput, PhotoUpload};
use crate::state::AppState;
use crate::storage::photo_extension;
use crate::store::{self, EventRecord, EventScope, EventValues, NewLocation};

/// Storage prefixes a client may reference in `photoUrls`.
const KEPT_PHOTO_PREFIXES: [&str; 2] = ["/events/", "/users/"];

pub async fn all_events(state: &AppState, filter: &EventFilter) -> Result<Vec<EventAggregate>, AppError> {
    store::fetch_events(&state.pool, &EventScope::All(filter), state.config.query_timeout).await
}

pub async fn event_by_id(state: &AppState, id: &str) -> Result<EventAggregate, AppError> {
    store::fetch_events(&state.pool, &EventScope::ById(id), state.config.query_timeout)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::not_found("event"))
}

pub async fn events_by_organizer(
    state: &AppState,
    organizer_id: &str,
) -> Result<Vec<EventAggregate>, AppError> {
    store::fetch_events(
        &state.pool,
        &EventScope::ByOrganizer(organizer_id),
        state.config.query_timeout,
    )
    .await
}

fn validate(input: &EventInput) -> Result<(), AppError> {
    let invalid = |msg: &str| Err(AppError::InvalidArgument(msg.to_string()));

    if input.title.trim().is_empty() {
        return invalid("title must not be empty");
    }
    if input.address.trim().is_empty() {
        return invalid("address must not be empty");
    }
    if input.end_time.is_some_and(|end| end < input.start_time) {
        return invalid("endTime must not be before startTime");
    }
    if input.price.is_some_and(|price| !price.is_finite() || price < 0.0) {
        return invalid("price must be a non-negative number");
    }
    if input.max_participants.is_some_and(|max| max < 1) {
        return invalid("maxParticipants must be positive");
    }
    if input.age_restriction.is_some_and(|age| age < 0) {
        return invalid("ageRestriction must not be negative");
    }
    Ok(())
}

fn city<'a>(state: &'a AppState, input: &'a EventInput) -> &'a str {
    input
        .city
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(state.config.default_city.as_str())
}

fn blank_to_none(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Free events carry neither a price nor a currency.
fn event_values<'a>(state: &'a AppState, input: &'a EventInput, photo_urls: &'a [String]) -> EventValues<'a> {
    let free = input.payment_type.is_free();
    EventValues {
        title: input.title.trim(),
        description: &input.description,
        start_time: input.start_time,
        end_time: input.end_time,
        photo_urls,
        event_type: input.event_type,
        event_properties: &input.event_properties,
        payment_type: input.payment_type,
        price: if free { None } else { input.price },
        currency: if free {
            None
        } else {
            Some(blank_to_none(&input.currency).unwrap_or(state.config.default_currency.as_str()))
        },
        is_private: input.is_private,
        max_participants: input.max_participants,
        tags: &input.tags,
        age_restriction: input.age_restriction,
    }
}

/// Uploads photos one after another. On failure the already stored ones are
/// removed again.
async fn upload_photos(
    state: &AppState,
    organizer_id: &str,
    photos: Vec<PhotoUpload>,
) -> Result<Vec<String>, AppError> {
    let mut paths = Vec::with_capacity(photos.len());
    for photo in photos {
        let uploaded = async {
            let extension = photo_extension(&photo.content_type)?;
            let path = format!("/events/{organizer_id}/{}.{extension}", nanoid!());
            state
                .storage
                .upload(photo.bytes, &path, &photo.content_type)
                .await?;
            Ok::<_, AppError>(path)
        };
        match uploaded.await {
            Ok(path) => paths.push(path),
            Err(e) => {
                discard_photos(state, &paths).await;
                return Err(e);
            }
        }
    }
    Ok(paths)
}

/// Best-effort removal; failures are logged and swallowed.
async fn discard_photos(state: &AppState, paths: &[String]) {
    for path in paths {
        if let Err(e) = state.storage.remove(path).await {
            warn!(error = %e, %path, "failed to remove photo");
        }
    }
}

/// Paths under the organizer's own upload prefix. Only these are ever
/// removed from storage; references to other users' files are left alone.
fn owned_photos<'a>(paths: impl IntoIterator<Item = &'a String>, organizer_id: &str) -> Vec<String> {
    let prefix = format!("/events/{organizer_id}/");
    paths
        .into_iter()
        .filter(|path| path.starts_with(&prefix))
        .cloned()
        .collect()
}

fn kept_photo_paths(input: &EventInput) -> impl Iterator<Item = &String> {
    input
        .photo_urls
        .iter()
        .filter(|path| KEPT_PHOTO_PREFIXES.iter().any(|prefix| path.starts_with(prefix)))
}

async fn owned_record(state: &AppState, event_id: &str, user_id: &str) -> Result<EventRecord, AppError> {
    let record = store::find_event_record(&state.pool, event_id)
        .await?
        .ok_or_else(|| AppError::not_found("event"))?;
    if record.organizer_id != user_id {
        return Err(AppError::Forbidden(
            "you are not the organizer of this event".to_string(),
        ));
    }
    Ok(record)
}

pub async fn create_event(
    state: &AppState,
    input: EventInput,
    organizer_id: &str,
    photos: Vec<PhotoUpload>,
) -> Result<EventAggregate, AppError> {
    validate(&input)?;
    let city = city(state, &input);
    let coordinates = state.geocoder.geocode(input.address.trim(), city).await?;

    let mut photo_urls = upload_photos(state, organizer_id, photos).await?;
    let uploaded = photo_urls.len();
    photo_urls.extend(kept_photo_paths(&input).cloned());

    let id = nanoid!();
    let location = NewLocation {
        address: Some(input.address.trim()),
        city,
        place_name: blank_to_none(&input.place_name),
        coordinates,
    };
    let values = event_values(state, &input, &photo_urls);
    if let Err(e) = store::insert_event(&state.pool, &id, organizer_id, &location, &values).await {
        discard_photos(state, &photo_urls[..uploaded]).await;
        return Err(e);
    }

    info!(event_id = %id, organizer_id, "event created");
    event_by_id(state, &id).await
}

pub async fn update_event(
    state: &AppState,
    id: &str,
    input: EventInput,
    organizer_id: &str,
    photos: Vec<PhotoUpload>,
) -> Result<EventAggregate, AppError> {
    let record = owned_record(state, id, organizer_id).await?;
    validate(&input)?;

    let city = city(state, &input);
    let address = input.address.trim();
    let place_name = blank_to_none(&input.place_name);
    let moved = record.address.as_deref() != Some(address)
        || record.city != city
        || record.place_name.as_deref() != place_name;

    let new_location = if moved {
        let coordinates = state.geocoder.geocode(address, city).await?;
        Some(NewLocation {
            address: Some(address),
            city,
            place_name,
            coordinates,
        })
    } else {
        None
    };

    let mut photo_urls = upload_photos(state, organizer_id, photos).await?;
    let uploaded = photo_urls.len();
    photo_urls.extend(kept_photo_paths(&input).cloned());

    let values = event_values(state, &input, &photo_urls);
    if let Err(e) = store::update_event(&state.pool, id, new_location.as_ref(), &values).await {
        discard_photos(state, &photo_urls[..uploaded]).await;
        return Err(e);
    }

    let dropped = owned_photos(
        record.photo_urls.0.iter().filter(|path| !photo_urls.contains(path)),
        &record.organizer_id,
    );
    discard_photos(state, &dropped).await;

    info!(event_id = %id, moved, "event updated");
    event_by_id(state, id).await
}

pub async fn delete_event(state: &AppState, id: &str, user_id: &str) -> Result<(), AppError> {
    let record = owned_record(state, id, user_id).await?;
    store::delete_event(&state.pool, &record).await?;
    discard_photos(state, &owned_photos(&record.photo_urls.0, &record.organizer_id)).await;
    info!(event_id = %id, "event deleted");
    Ok(())
}

pub async fn add_photo(
    state: &AppState,
    id: &str,
    user_id: &str,
    photo: PhotoUpload,
) -> Result<EventAggregate, AppError> {
    owned_record(state, id, user_id).await?;
    let paths = upload_photos(state, user_id, vec![photo]).await?;
    for path in &paths {
        if let Err(e) = store::append_photo(&state.pool, id, path).await {
            discard_photos(state, &paths).await;
            return Err(e);
        }
    }
    event_by_id(state, id).await
}
