//! Solar radiation lookup against the NASA POWER daily point API
//!
//! The API publishes daily values with a lag of a few days, so the enricher
//! walks back from today until it finds a reported value and falls back to a
//! climatological average when none of the recent days has data.

use chrono::{Days, NaiveDate};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::Coordinates;
use crate::error::WeatherError;

pub const NASA_POWER_DAILY_URL: &str = "https://power.larc.nasa.gov/api/temporal/daily/point";
pub const SOLAR_PARAMETER: &str = "ALLSKY_SFC_SW_DWN";
/// Fill value NASA POWER uses for days without data
pub const NASA_FILL_VALUE: f64 = -999.0;
/// Average daily irradiance used when no recent day has data, kWh/m²/day
pub const FALLBACK_SOLAR_KWH: f64 = 5.0;
pub const DEFAULT_LOOKBACK_DAYS: u32 = 5;

const USER_AGENT: &str = concat!("pest-risk-backend/", env!("CARGO_PKG_VERSION"));

/// Source of daily solar radiation for one location and date
pub trait SolarSource: Send + Sync {
    fn daily_solar(
        &self,
        location: Coordinates,
        date: NaiveDate,
    ) -> impl Future<Output = Result<f64, WeatherError>> + Send;
}

#[derive(Debug, Deserialize)]
struct PowerResponse {
    properties: PowerProperties,
}

#[derive(Debug, Deserialize)]
struct PowerProperties {
    parameter: HashMap<String, BTreeMap<String, f64>>,
}

/// Format a date the way the POWER API expects (`YYYYMMDD`)
pub fn power_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// Extract the solar value for `date` from a POWER JSON response
pub fn parse_power_response(body: &str, date: NaiveDate) -> Result<f64, WeatherError> {
    let response: PowerResponse =
        serde_json::from_str(body).map_err(|e| WeatherError::Parse(e.to_string()))?;

    let series = response
        .properties
        .parameter
        .get(SOLAR_PARAMETER)
        .ok_or_else(|| WeatherError::Parse(format!("response has no {}", SOLAR_PARAMETER)))?;

    let key = power_date(date);
    let value = series
        .get(&key)
        .or_else(|| series.values().next())
        .copied()
        .ok_or_else(|| WeatherError::NoData(key.clone()))?;

    if value == NASA_FILL_VALUE || !value.is_finite() {
        return Err(WeatherError::NoData(key));
    }
    Ok(value)
}

/// HTTP client for the POWER daily point endpoint
#[derive(Debug, Clone)]
pub struct NasaPowerClient {
    http_client: reqwest::Client,
    base_url: String,
}

impl NasaPowerClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, WeatherError> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| WeatherError::Network(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
        })
    }
}

impl SolarSource for NasaPowerClient {
    async fn daily_solar(&self, location: Coordinates, date: NaiveDate) -> Result<f64, WeatherError> {
        let day = power_date(date);
        let latitude = location.latitude.to_string();
        let longitude = location.longitude.to_string();

        debug!(
            latitude = %latitude,
            longitude = %longitude,
            date = %day,
            "Querying NASA POWER"
        );

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&[
                ("parameters", SOLAR_PARAMETER),
                ("community", "AG"),
                ("latitude", latitude.as_str()),
                ("longitude", longitude.as_str()),
                ("start", day.as_str()),
                ("end", day.as_str()),
                ("format", "JSON"),
            ])
            .send()
            .await
            .map_err(|e| WeatherError::Network(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WeatherError::Network(e.to_string()))?;

        if !status.is_success() {
            return Err(WeatherError::Api(status.as_u16(), body));
        }

        parse_power_response(&body, date)
    }
}

/// Solar lookup with day-by-day lookback and a fixed fallback
#[derive(Debug, Clone)]
pub struct WeatherEnricher<W> {
    source: W,
    lookback_days: u32,
}

impl<W: SolarSource> WeatherEnricher<W> {
    pub fn new(source: W, lookback_days: u32) -> Self {
        Self {
            source,
            lookback_days: lookback_days.max(1),
        }
    }

    /// Most recent reported solar radiation, trying today and the days before it
    pub async fn solar_radiation(&self, location: Coordinates, today: NaiveDate) -> f64 {
        for offset in 0..self.lookback_days {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(offset))) else {
                break;
            };

            match self.source.daily_solar(location, date).await {
                Ok(value) => {
                    debug!(date = %date, solar_radiation = value, "Solar radiation found");
                    return value;
                }
                Err(e) => {
                    debug!(date = %date, error = %e, "No solar radiation for date");
                }
            }
        }

        warn!(
            latitude = location.latitude,
            longitude = location.longitude,
            lookback_days = self.lookback_days,
            fallback = FALLBACK_SOLAR_KWH,
            "Solar radiation unavailable, using fallback"
        );
        FALLBACK_SOLAR_KWH
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    const LOCATION: Coordinates = Coordinates {
        latitude: 20.5937,
        longitude: 78.9629,
    };

    /// Answers from a fixed table and records the dates asked for
    struct TableSource {
        values: HashMap<NaiveDate, f64>,
        requested: Mutex<Vec<NaiveDate>>,
    }

    impl TableSource {
        fn new(values: &[(NaiveDate, f64)]) -> Self {
            Self {
                values: values.iter().copied().collect(),
                requested: Mutex::new(Vec::new()),
            }
        }
    }

    impl SolarSource for TableSource {
        async fn daily_solar(&self, _location: Coordinates, date: NaiveDate) -> Result<f64, WeatherError> {
            self.requested.lock().unwrap().push(date);
            self.values
                .get(&date)
                .copied()
                .ok_or_else(|| WeatherError::NoData(power_date(date)))
        }
    }

    #[test]
    fn test_power_date_format() {
        assert_eq!(power_date(date(2024, 3, 7)), "20240307");
    }

    #[test]
    fn test_parse_power_response() {
        let body = r#"{
            "type": "Feature",
            "properties": { "parameter": { "ALLSKY_SFC_SW_DWN": { "20240307": 6.12 } } }
        }"#;
        assert_eq!(parse_power_response(body, date(2024, 3, 7)).unwrap(), 6.12);
    }

    #[test]
    fn test_parse_power_response_fill_value() {
        let body = r#"{"properties": {"parameter": {"ALLSKY_SFC_SW_DWN": {"20240307": -999.0}}}}"#;
        assert!(matches!(
            parse_power_response(body, date(2024, 3, 7)),
            Err(WeatherError::NoData(_))
        ));
    }

    #[test]
    fn test_parse_power_response_malformed() {
        assert!(matches!(
            parse_power_response("{\"messages\": []}", date(2024, 3, 7)),
            Err(WeatherError::Parse(_))
        ));
        let wrong_param = r#"{"properties": {"parameter": {"T2M": {"20240307": 25.0}}}}"#;
        assert!(matches!(
            parse_power_response(wrong_param, date(2024, 3, 7)),
            Err(WeatherError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_enricher_uses_today_when_available() {
        let source = TableSource::new(&[(date(2024, 3, 7), 6.5)]);
        let enricher = WeatherEnricher::new(source, 5);

        assert_eq!(enricher.solar_radiation(LOCATION, date(2024, 3, 7)).await, 6.5);
        assert_eq!(enricher.source.requested.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_enricher_walks_back() {
        let source = TableSource::new(&[(date(2024, 3, 4), 4.25)]);
        let enricher = WeatherEnricher::new(source, 5);

        assert_eq!(enricher.solar_radiation(LOCATION, date(2024, 3, 7)).await, 4.25);
        assert_eq!(
            *enricher.source.requested.lock().unwrap(),
            vec![date(2024, 3, 7), date(2024, 3, 6), date(2024, 3, 5), date(2024, 3, 4)]
        );
    }

    #[tokio::test]
    async fn test_enricher_falls_back_after_lookback() {
        let source = TableSource::new(&[(date(2024, 3, 1), 7.0)]);
        let enricher = WeatherEnricher::new(source, 5);

        assert_eq!(
            enricher.solar_radiation(LOCATION, date(2024, 3, 7)).await,
            FALLBACK_SOLAR_KWH
        );
        assert_eq!(enricher.source.requested.lock().unwrap().len(), 5);
    }
}
