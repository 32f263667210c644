//! Test utilities shared by unit and property tests
//!
//! `fixtures` builds deterministic model artifacts, archive windows and a
//! constant solar source. `generators` provides proptest strategies for
//! readings and archived records.

pub mod fixtures {
    use serde_json::{json, Map, Value};
    use std::path::Path;

    use crate::domain::{ArchivedRecord, Coordinates};
    use crate::error::WeatherError;
    use crate::features::FEATURE_COUNT;
    use crate::idempotency::archive_key;
    use crate::model::{
        Activation, Autoencoder, DenseLayer, RiskClassifier, StandardScaler, AUTOENCODER_FILE,
        SCALER_FILE, THRESHOLD_FILE,
    };
    use crate::weather::SolarSource;

    /// Half-hour spacing between generated records
    pub const RECORD_SPACING_MS: i64 = 30 * 60 * 1000;

    fn square(value_at: impl Fn(usize, usize) -> f64) -> Vec<Vec<f64>> {
        (0..FEATURE_COUNT)
            .map(|i| (0..FEATURE_COUNT).map(|j| value_at(i, j)).collect())
            .collect()
    }

    /// Single linear layer that reproduces its input exactly
    pub fn identity_autoencoder() -> Autoencoder {
        Autoencoder {
            input_dim: FEATURE_COUNT,
            layers: vec![DenseLayer {
                weights: square(|i, j| if i == j { 1.0 } else { 0.0 }),
                bias: vec![0.0; FEATURE_COUNT],
                activation: Activation::Linear,
            }],
        }
    }

    /// Single linear layer that always outputs zeros
    pub fn zero_autoencoder() -> Autoencoder {
        Autoencoder {
            input_dim: FEATURE_COUNT,
            layers: vec![DenseLayer {
                weights: square(|_, _| 0.0),
                bias: vec![0.0; FEATURE_COUNT],
                activation: Activation::Linear,
            }],
        }
    }

    pub fn unit_scaler() -> StandardScaler {
        StandardScaler {
            mean: vec![0.0; FEATURE_COUNT],
            scale: vec![1.0; FEATURE_COUNT],
        }
    }

    /// Reconstruction error is always 0
    pub fn identity_classifier(threshold: f64) -> RiskClassifier {
        RiskClassifier::new(identity_autoencoder(), unit_scaler(), threshold)
            .expect("identity fixture is valid")
    }

    /// Reconstruction error is the mean of the squared raw features
    pub fn zero_classifier(threshold: f64) -> RiskClassifier {
        RiskClassifier::new(zero_autoencoder(), unit_scaler(), threshold)
            .expect("zero fixture is valid")
    }

    /// `n` plausible records, oldest first, starting at `start_ms`
    pub fn records(n: usize, start_ms: i64) -> Vec<ArchivedRecord> {
        (0..n)
            .map(|i| ArchivedRecord {
                temperature: 20.0 + (i % 5) as f64,
                humidity: 60.0 + (i % 7) as f64,
                solar_radiation: 5.0,
                timestamp: start_ms + i as i64 * RECORD_SPACING_MS,
                lat: None,
                lon: None,
            })
            .collect()
    }

    /// Archive node (`fields/{id}/data`) holding `records` under their keys
    pub fn history_json(records: &[ArchivedRecord]) -> Value {
        let map: Map<String, Value> = records
            .iter()
            .map(|r| {
                (
                    archive_key(r.timestamp),
                    serde_json::to_value(r).expect("record serializes"),
                )
            })
            .collect();
        Value::Object(map)
    }

    /// Write an identity model export into `dir`
    pub fn write_identity_artifacts(dir: &Path, threshold: f64) {
        let ae = identity_autoencoder();
        let layers: Vec<Value> = ae
            .layers
            .iter()
            .map(|l| json!({ "weights": l.weights, "bias": l.bias, "activation": "linear" }))
            .collect();
        let autoencoder = json!({ "input_dim": ae.input_dim, "layers": layers });
        let scaler = unit_scaler();

        std::fs::write(dir.join(AUTOENCODER_FILE), autoencoder.to_string())
            .expect("write autoencoder");
        std::fs::write(
            dir.join(SCALER_FILE),
            json!({ "mean": scaler.mean, "scale": scaler.scale }).to_string(),
        )
        .expect("write scaler");
        std::fs::write(dir.join(THRESHOLD_FILE), format!("{}\n", threshold))
            .expect("write threshold");
    }

    /// Solar source that always reports the same value
    #[derive(Debug, Clone, Copy)]
    pub struct FixedSolar(pub f64);

    impl SolarSource for FixedSolar {
        async fn daily_solar(
            &self,
            _location: Coordinates,
            _date: chrono::NaiveDate,
        ) -> Result<f64, WeatherError> {
            Ok(self.0)
        }
    }
}

pub mod generators {
    use proptest::prelude::*;

    use crate::domain::ArchivedRecord;
    use crate::features::HISTORY_WINDOW;

    /// 2020-01-01T00:00:00Z .. 2030-01-01T00:00:00Z in milliseconds
    pub fn epoch_millis() -> impl Strategy<Value = i64> {
        1_577_836_800_000i64..1_893_456_000_000i64
    }

    pub fn temperature() -> impl Strategy<Value = f64> {
        -40.0f64..=85.0
    }

    pub fn humidity() -> impl Strategy<Value = f64> {
        0.0f64..=100.0
    }

    pub fn solar_radiation() -> impl Strategy<Value = f64> {
        0.0f64..=12.0
    }

    pub fn archived_record() -> impl Strategy<Value = ArchivedRecord> {
        (temperature(), humidity(), solar_radiation(), epoch_millis()).prop_map(
            |(temperature, humidity, solar_radiation, timestamp)| ArchivedRecord {
                temperature,
                humidity,
                solar_radiation,
                timestamp,
                lat: None,
                lon: None,
            },
        )
    }

    /// Full window of records with strictly increasing timestamps
    pub fn window() -> impl Strategy<Value = Vec<ArchivedRecord>> {
        prop::collection::vec(archived_record(), HISTORY_WINDOW).prop_map(|mut records| {
            let start = records[0].timestamp;
            for (i, r) in records.iter_mut().enumerate() {
                r.timestamp = start + i as i64 * 1_800_000;
            }
            records
        })
    }
}
