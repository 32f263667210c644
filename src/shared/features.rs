//! Climate feature extraction for the risk model
//!
//! A window of archived records is reduced to a fixed 15-value vector:
//! mean/min/max of temperature, humidity, dew point, dew point depression and
//! solar radiation, in that order. The order is the one the scaler was fit
//! with and must not change without re-exporting the model artifacts.

use crate::domain::ArchivedRecord;
use crate::error::FeatureError;

/// Number of archived records required before a field can be classified
pub const HISTORY_WINDOW: usize = 48;

/// Length of the feature vector consumed by the scaler and autoencoder
pub const FEATURE_COUNT: usize = 15;

pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "temp_mean",
    "temp_min",
    "temp_max",
    "hum_mean",
    "hum_min",
    "hum_max",
    "dew_mean",
    "dew_min",
    "dew_max",
    "dpd_mean",
    "dpd_min",
    "dpd_max",
    "solar_mean",
    "solar_min",
    "solar_max",
];

const MAGNUS_A: f64 = 17.27;
const MAGNUS_B: f64 = 237.7;
const MIN_RELATIVE_HUMIDITY: f64 = 0.1;

/// Dew point in °C (Magnus approximation)
pub fn dew_point(temp_c: f64, relative_humidity_pct: f64) -> f64 {
    let rh = if relative_humidity_pct <= 0.0 {
        MIN_RELATIVE_HUMIDITY
    } else {
        relative_humidity_pct
    };
    let alpha = (MAGNUS_A * temp_c) / (MAGNUS_B + temp_c) + (rh / 100.0).ln();
    (MAGNUS_B * alpha) / (MAGNUS_A - alpha)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Summary {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

pub fn summarize(values: &[f64]) -> Option<Summary> {
    if values.is_empty() {
        return None;
    }

    let sum: f64 = values.iter().sum();
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    Some(Summary {
        mean: sum / values.len() as f64,
        min,
        max,
    })
}

/// History gate: prediction needs a full window
pub fn history_gate_open(record_count: usize) -> bool {
    record_count >= HISTORY_WINDOW
}

/// Build the model input from exactly [`HISTORY_WINDOW`] records, oldest first
pub fn build_feature_vector(window: &[ArchivedRecord]) -> Result<Vec<f64>, FeatureError> {
    if window.len() != HISTORY_WINDOW {
        return Err(FeatureError::WindowSize {
            expected: HISTORY_WINDOW,
            actual: window.len(),
        });
    }

    let temps: Vec<f64> = window.iter().map(|r| r.temperature).collect();
    let hums: Vec<f64> = window.iter().map(|r| r.humidity).collect();
    let dews: Vec<f64> = temps
        .iter()
        .zip(&hums)
        .map(|(&t, &h)| dew_point(t, h))
        .collect();
    let depressions: Vec<f64> = temps.iter().zip(&dews).map(|(&t, &d)| t - d).collect();
    let solar: Vec<f64> = window.iter().map(|r| r.solar_radiation).collect();

    let mut features = Vec::with_capacity(FEATURE_COUNT);
    for series in [&temps, &hums, &dews, &depressions, &solar] {
        // Non-empty: window length was checked above
        if let Some(s) = summarize(series) {
            features.extend([s.mean, s.min, s.max]);
        }
    }

    check_finite(&features)?;
    Ok(features)
}

/// Reject vectors of the wrong length or with NaN/infinite entries
pub fn check_finite(features: &[f64]) -> Result<(), FeatureError> {
    if features.len() != FEATURE_COUNT {
        return Err(FeatureError::Dimension {
            expected: FEATURE_COUNT,
            actual: features.len(),
        });
    }

    match features.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(FeatureError::NonFinite(FEATURE_NAMES[i].to_string())),
        None => Ok(()),
    }
}
