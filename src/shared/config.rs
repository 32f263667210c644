use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::Coordinates;
use crate::pipeline::{PipelineSettings, DEFAULT_LATITUDE, DEFAULT_LONGITUDE};
use crate::weather::{DEFAULT_LOOKBACK_DAYS, NASA_POWER_DAILY_URL};

/// Realtime Database connection settings, shared by both binaries
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Database base URL, e.g. `https://project-default-rtdb.firebaseio.com`
    pub database_url: String,
    /// Database secret or access token sent as the `auth` query parameter
    pub auth_token: String,
    pub timeout: Duration,
}

impl StoreConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = required(&lookup, "FIREBASE_DATABASE_URL")?;
        let auth_token = required(&lookup, "FIREBASE_AUTH_TOKEN")?;
        let timeout = Duration::from_secs(parse_or(&lookup, "STORE_TIMEOUT_SECS", 10u64)?);

        Ok(StoreConfig {
            database_url: database_url.trim_end_matches('/').to_string(),
            auth_token,
            timeout,
        })
    }
}

/// Configuration for the poller service
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub store: StoreConfig,
    /// Directory holding the exported model artifacts
    pub model_dir: PathBuf,
    pub poll_interval: Duration,
    pub bind_addr: IpAddr,
    pub port: u16,
    pub weather_api_url: String,
    pub weather_timeout: Duration,
    pub weather_lookback_days: u32,
    pub default_location: Coordinates,
    pub min_archive_gap: Duration,
    pub watch_ratio: Option<f64>,
}

impl Config {
    /// Create a new Config instance from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a Config from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let store = StoreConfig::from_lookup(&lookup)?;

        let poll_interval_secs: u64 = parse_or(&lookup, "POLL_INTERVAL_SECS", 1800)?;
        if poll_interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "POLL_INTERVAL_SECS".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        let latitude = parse_or(&lookup, "DEFAULT_LATITUDE", DEFAULT_LATITUDE)?;
        let longitude = parse_or(&lookup, "DEFAULT_LONGITUDE", DEFAULT_LONGITUDE)?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return Err(ConfigError::InvalidValue {
                key: "DEFAULT_LATITUDE/DEFAULT_LONGITUDE".to_string(),
                message: format!("({}, {}) is not a valid location", latitude, longitude),
            });
        }

        let watch_ratio = match lookup("WATCH_RATIO").filter(|v| !v.trim().is_empty()) {
            None => None,
            Some(raw) => {
                let ratio: f64 = parse_value("WATCH_RATIO", &raw)?;
                if !(ratio > 0.0 && ratio < 1.0) {
                    return Err(ConfigError::InvalidValue {
                        key: "WATCH_RATIO".to_string(),
                        message: format!("{} is not between 0 and 1", ratio),
                    });
                }
                Some(ratio)
            }
        };

        Ok(Config {
            store,
            model_dir: PathBuf::from(lookup("MODEL_DIR").unwrap_or_else(|| "models".to_string())),
            poll_interval: Duration::from_secs(poll_interval_secs),
            bind_addr: parse_or(&lookup, "BIND_ADDR", IpAddr::V4(Ipv4Addr::UNSPECIFIED))?,
            port: parse_or(&lookup, "PORT", 8000u16)?,
            weather_api_url: lookup("WEATHER_API_URL")
                .unwrap_or_else(|| NASA_POWER_DAILY_URL.to_string()),
            weather_timeout: Duration::from_secs(parse_or(&lookup, "WEATHER_TIMEOUT_SECS", 5u64)?),
            weather_lookback_days: parse_or(&lookup, "WEATHER_LOOKBACK_DAYS", DEFAULT_LOOKBACK_DAYS)?,
            default_location: Coordinates {
                latitude,
                longitude,
            },
            min_archive_gap: Duration::from_secs(parse_or(&lookup, "MIN_ARCHIVE_GAP_SECS", 1500u64)?),
            watch_ratio,
        })
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }

    pub fn pipeline_settings(&self) -> PipelineSettings {
        PipelineSettings {
            default_location: self.default_location,
            min_archive_gap_ms: i64::try_from(self.min_archive_gap.as_millis()).unwrap_or(i64::MAX),
        }
    }
}

fn required<F>(lookup: &F, key: &str) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => parse_value(key, &raw),
        _ => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("'{}': {}", raw, e),
    })
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}
