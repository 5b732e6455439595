use std::{env, fmt::Display, path::PathBuf, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
#[error("invalid value `{value}` for {key}: {reason}")]
pub struct ConfigError {
    key: &'static str,
    value: String,
    reason: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub geocoder_url: String,
    pub geocoder_user_agent: String,
    pub default_city: String,
    pub default_currency: String,
    pub query_timeout: Duration,
    /// Username promoted to admin at startup, created if missing.
    pub admin_username: Option<String>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        Ok(Self {
            database_url: try_load(&lookup, "DATABASE_URL", "sqlite://events.db")?,
            port: try_load(&lookup, "PORT", "3000")?,
            storage_dir: try_load(&lookup, "STORAGE_DIR", "storage")?,
            geocoder_url: try_load(
                &lookup,
                "GEOCODER_URL",
                "https://nominatim.openstreetmap.org/search",
            )?,
            geocoder_user_agent: try_load(&lookup, "GEOCODER_USER_AGENT", "eventhub/0.1")?,
            default_city: try_load(&lookup, "DEFAULT_CITY", "Minsk")?,
            default_currency: try_load(&lookup, "DEFAULT_CURRENCY", "BYN")?,
            query_timeout: Duration::from_secs(try_load(&lookup, "QUERY_TIMEOUT_SECS", "10")?),
            admin_username: lookup("ADMIN_USERNAME").filter(|name| !name.trim().is_empty()),
        })
    }
}

fn try_load<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    let value = lookup(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    });

    value.parse().map_err(|e: T::Err| ConfigError {
        key,
        reason: e.to_string(),
        value,
    })
}
