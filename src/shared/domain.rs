use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Epoch values below this are taken to be seconds rather than milliseconds
const EPOCH_SECONDS_CUTOFF: i64 = 100_000_000_000;

/// Live sensor snapshot written by a field device under
/// `users/{uid}/live_status/{field_id}/env`
///
/// Devices write numbers or numeric strings; both are accepted. Any field that
/// cannot be read as a finite number is treated as absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    #[serde(default, deserialize_with = "lenient_f64")]
    pub temp: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub hum: Option<f64>,
    #[serde(default, deserialize_with = "lenient_epoch_millis")]
    pub timestamp: Option<i64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lat: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub lon: Option<f64>,
}

impl SensorReading {
    /// Coordinates carried by the snapshot, if both are present
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.lat, self.lon) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }
}

/// One field entry under `users/{uid}/live_status`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct LiveField {
    #[serde(default)]
    pub env: Option<Value>,
    #[serde(default, deserialize_with = "lenient_probes")]
    pub probes: BTreeMap<String, Value>,
}

impl LiveField {
    /// Read `env` and `probes` from a live entry independently
    ///
    /// The database returns sequentially numbered probes as a JSON array;
    /// those are keyed by index. Any other non-object `probes` node yields no
    /// probes and leaves `env` untouched.
    pub fn from_value(entry: &Value) -> Self {
        Self {
            env: entry.get("env").filter(|env| !env.is_null()).cloned(),
            probes: entry.get("probes").map(probe_map).unwrap_or_default(),
        }
    }
}

fn probe_map(node: &Value) -> BTreeMap<String, Value> {
    match node {
        Value::Object(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .filter(|(_, v)| !v.is_null())
            .map(|(i, v)| (i.to_string(), v.clone()))
            .collect(),
        _ => BTreeMap::new(),
    }
}

fn lenient_probes<'de, D>(deserializer: D) -> Result<BTreeMap<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    let node = Value::deserialize(deserializer)?;
    Ok(probe_map(&node))
}

/// Soil probe entry under `live_status/{field_id}/probes/{probe_id}`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProbeReading {
    #[serde(default)]
    pub raw_moisture: Option<Value>,
}

impl ProbeReading {
    pub fn moisture_pct(&self) -> Option<f64> {
        self.raw_moisture.as_ref().and_then(value_as_f64)
    }
}

/// Geographic point used for weather lookups
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

/// Sensor reading enriched with solar radiation, stored append-only under
/// `users/{uid}/fields/{field_id}/data/{timestamp}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRecord {
    pub temperature: f64,
    pub humidity: f64,
    /// Daily surface shortwave irradiance, kWh/m²/day
    pub solar_radiation: f64,
    /// Epoch milliseconds
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lon: Option<f64>,
}

/// Risk label written for a field or a probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Normal,
    Watch,
    Warning,
    High,
}

impl RiskLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "NORMAL",
            RiskLevel::Watch => "WATCH",
            RiskLevel::Warning => "WARNING",
            RiskLevel::High => "HIGH",
        }
    }

    /// Human-readable explanation stored next to the label
    pub fn reason(&self) -> &'static str {
        match self {
            RiskLevel::Normal => "Normal conditions",
            RiskLevel::Watch => "Elevated risk parameters detected",
            RiskLevel::Warning => "Risk conditions developing",
            RiskLevel::High => "High humidity and low solar drying",
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification written to `users/{uid}/fields/{field_id}/prediction`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub risk: RiskLevel,
    pub anomaly_score: f64,
    pub confidence: f64,
    pub reason: String,
    pub window_size: usize,
    /// Timestamp of the newest record in the window (epoch ms)
    pub timestamp: i64,
    #[serde(rename = "lastUpdated")]
    pub last_updated: String,
}

/// Read a JSON value as a finite number, accepting numeric strings
pub fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Read a JSON value as epoch milliseconds; second-resolution values are scaled
pub fn value_as_epoch_millis(value: &Value) -> Option<i64> {
    let raw = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }?;

    if (0..EPOCH_SECONDS_CUTOFF).contains(&raw) {
        raw.checked_mul(1000)
    } else {
        Some(raw)
    }
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_f64))
}

fn lenient_epoch_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(value_as_epoch_millis))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sensor_reading_accepts_numbers_and_strings() {
        let reading: SensorReading = serde_json::from_value(json!({
            "temp": "24.5",
            "hum": 61,
            "timestamp": 1704067800000i64,
            "lat": 12.97,
            "lon": "77.59",
            "battery": 88
        }))
        .unwrap();

        assert_eq!(reading.temp, Some(24.5));
        assert_eq!(reading.hum, Some(61.0));
        assert_eq!(reading.timestamp, Some(1704067800000));
        assert_eq!(
            reading.coordinates(),
            Some(Coordinates {
                latitude: 12.97,
                longitude: 77.59
            })
        );
    }

    #[test]
    fn test_sensor_reading_missing_and_garbage_fields() {
        let reading: SensorReading =
            serde_json::from_value(json!({ "temp": "n/a", "hum": null })).unwrap();

        assert_eq!(reading.temp, None);
        assert_eq!(reading.hum, None);
        assert_eq!(reading.timestamp, None);
        assert_eq!(reading.coordinates(), None);
    }

    #[test]
    fn test_epoch_seconds_are_scaled_to_millis() {
        assert_eq!(value_as_epoch_millis(&json!(1704067800)), Some(1704067800000));
        assert_eq!(value_as_epoch_millis(&json!("1704067800123")), Some(1704067800123));
        assert_eq!(value_as_epoch_millis(&json!(true)), None);
    }

    #[test]
    fn test_value_as_f64_rejects_non_finite() {
        assert_eq!(value_as_f64(&json!("NaN")), None);
        assert_eq!(value_as_f64(&json!("inf")), None);
        assert_eq!(value_as_f64(&json!(" 42.5 ")), Some(42.5));
    }

    #[test]
    fn test_risk_level_serializes_uppercase() {
        assert_eq!(serde_json::to_value(RiskLevel::High).unwrap(), json!("HIGH"));
        assert_eq!(RiskLevel::Watch.to_string(), "WATCH");
        let parsed: RiskLevel = serde_json::from_value(json!("NORMAL")).unwrap();
        assert_eq!(parsed, RiskLevel::Normal);
    }

    #[test]
    fn test_live_field_with_probes() {
        let field: LiveField = serde_json::from_value(json!({
            "env": { "temp": 20.0, "hum": 50.0 },
            "probes": { "p1": { "raw_moisture": "45.5" }, "p2": "offline" }
        }))
        .unwrap();

        assert!(field.env.is_some());
        assert_eq!(field.probes.len(), 2);

        let probe: ProbeReading = serde_json::from_value(field.probes["p1"].clone()).unwrap();
        assert_eq!(probe.moisture_pct(), Some(45.5));
    }

    #[test]
    fn test_live_field_array_probes_keyed_by_index() {
        let entry = json!({
            "env": { "temp": 24, "hum": 85 },
            "probes": [{ "raw_moisture": 20 }, null, { "raw_moisture": 70 }]
        });
        let field = LiveField::from_value(&entry);

        assert!(field.env.is_some());
        let keys: Vec<&str> = field.probes.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["0", "2"]);

        let parsed: LiveField = serde_json::from_value(entry).unwrap();
        assert_eq!(parsed, field);
    }

    #[test]
    fn test_live_field_scalar_probes_keep_env() {
        let field = LiveField::from_value(&json!({
            "env": { "temp": 24, "hum": 85 },
            "probes": "offline"
        }));
        assert!(field.env.is_some());
        assert!(field.probes.is_empty());

        let bare = LiveField::from_value(&json!("garbage"));
        assert_eq!(bare, LiveField::default());
        assert!(LiveField::from_value(&json!({ "env": null })).env.is_none());
    }

    #[test]
    fn test_prediction_result_field_names() {
        let result = PredictionResult {
            risk: RiskLevel::Normal,
            anomaly_score: 0.01,
            confidence: 0.5,
            reason: RiskLevel::Normal.reason().to_string(),
            window_size: 48,
            timestamp: 1704067800000,
            last_updated: "2024-01-01T00:10:00+00:00".to_string(),
        };

        let value = serde_json::to_value(&result).unwrap();
        assert_eq!(value["risk"], "NORMAL");
        assert_eq!(value["lastUpdated"], "2024-01-01T00:10:00+00:00");
        assert!(value.get("last_updated").is_none());
    }
}
