use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::Coordinates;

#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, address: &str, city: &str) -> Result<Coordinates, AppError>;
}

fn geocoding_failed() -> AppError {
    AppError::Upstream("geocoding failed".to_string())
}

/// Looks addresses up through a Nominatim-compatible search endpoint.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    url: String,
}

impl NominatimGeocoder {
    pub fn new(url: &str, user_agent: &str) -> Result<Self, AppError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| {
                warn!(error = %e, "failed to build geocoding client");
                geocoding_failed()
            })?;
        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lon: String,
    lat: String,
}

/// First hit of a search response. No hit, unparsable numbers or the
/// `0,0` placeholder are all failures.
fn first_place(places: Vec<Place>) -> Result<Coordinates, AppError> {
    let place = places.into_iter().next().ok_or_else(geocoding_failed)?;
    let longitude: f64 = place.lon.trim().parse().map_err(|_| geocoding_failed())?;
    let latitude: f64 = place.lat.trim().parse().map_err(|_| geocoding_failed())?;

    if longitude == 0.0 || latitude == 0.0 {
        return Err(geocoding_failed());
    }
    Ok(Coordinates {
        longitude,
        latitude,
    })
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, address: &str, city: &str) -> Result<Coordinates, AppError> {
        let query = format!("{address}, {city}");
        let response = self
            .client
            .get(&self.url)
            .query(&[("q", query.as_str()), ("format", "json"), ("limit", "1")])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| {
                warn!(error = %e, %query, "geocoding request failed");
                geocoding_failed()
            })?;

        let places: Vec<Place> = response.json().await.map_err(|e| {
            warn!(error = %e, %query, "geocoding response was not understood");
            geocoding_failed()
        })?;

        let coordinates = first_place(places).inspect_err(|_| {
            warn!(%query, "geocoding returned no usable coordinates");
        })?;
        debug!(%query, ?coordinates, "geocoded address");
        Ok(coordinates)
    }
}
