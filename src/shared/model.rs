//! Pre-trained risk model: feature scaler, dense autoencoder and threshold
//!
//! The artifacts are produced outside this service and loaded once at startup.
//! Any missing or inconsistent artifact is a fatal error.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::domain::{ArchivedRecord, RiskLevel};
use crate::error::{FeatureError, ModelError};
use crate::features::{build_feature_vector, check_finite, FEATURE_COUNT};

pub const AUTOENCODER_FILE: &str = "autoencoder.json";
pub const SCALER_FILE: &str = "scaler.json";
pub const THRESHOLD_FILE: &str = "threshold.txt";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    Linear,
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    fn apply(&self, x: f64) -> f64 {
        match self {
            Activation::Linear => x,
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }
}

/// Fully connected layer; `weights` is laid out `[input][output]`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DenseLayer {
    pub weights: Vec<Vec<f64>>,
    pub bias: Vec<f64>,
    #[serde(default = "default_activation")]
    pub activation: Activation,
}

fn default_activation() -> Activation {
    Activation::Linear
}

impl DenseLayer {
    pub fn input_dim(&self) -> usize {
        self.weights.len()
    }

    pub fn output_dim(&self) -> usize {
        self.bias.len()
    }

    fn forward(&self, input: &[f64]) -> Vec<f64> {
        let mut output = self.bias.clone();
        for (x, row) in input.iter().zip(&self.weights) {
            for (out, w) in output.iter_mut().zip(row) {
                *out += x * w;
            }
        }
        output.iter().map(|&v| self.activation.apply(v)).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Autoencoder {
    pub input_dim: usize,
    pub layers: Vec<DenseLayer>,
}

impl Autoencoder {
    /// Check that layer shapes chain and the output matches the input
    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::Shape("autoencoder has no layers".to_string()));
        }

        let mut dim = self.input_dim;
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.input_dim() != dim {
                return Err(ModelError::Shape(format!(
                    "layer {} expects {} inputs, previous layer produces {}",
                    i,
                    layer.input_dim(),
                    dim
                )));
            }
            if let Some(row) = layer.weights.iter().find(|row| row.len() != layer.output_dim()) {
                return Err(ModelError::Shape(format!(
                    "layer {} has a weight row of length {} but {} biases",
                    i,
                    row.len(),
                    layer.output_dim()
                )));
            }
            let all_finite = layer
                .weights
                .iter()
                .flatten()
                .chain(&layer.bias)
                .all(|v| v.is_finite());
            if !all_finite {
                return Err(ModelError::Shape(format!(
                    "layer {} contains non-finite parameters",
                    i
                )));
            }
            dim = layer.output_dim();
        }

        if dim != self.input_dim {
            return Err(ModelError::Shape(format!(
                "autoencoder output dimension {} does not match input dimension {}",
                dim, self.input_dim
            )));
        }

        Ok(())
    }

    pub fn reconstruct(&self, input: &[f64]) -> Vec<f64> {
        self.layers
            .iter()
            .fold(input.to_vec(), |activations, layer| layer.forward(&activations))
    }
}

/// Standard scaler: `(x - mean) / scale`
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl StandardScaler {
    pub fn len(&self) -> usize {
        self.mean.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mean.is_empty()
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.mean.len() != self.scale.len() {
            return Err(ModelError::Shape(format!(
                "scaler has {} means but {} scales",
                self.mean.len(),
                self.scale.len()
            )));
        }
        if !self.mean.iter().chain(&self.scale).all(|v| v.is_finite()) {
            return Err(ModelError::Shape(
                "scaler contains non-finite parameters".to_string(),
            ));
        }
        Ok(())
    }

    pub fn transform(&self, features: &[f64]) -> Result<Vec<f64>, FeatureError> {
        if features.len() != self.len() {
            return Err(FeatureError::Dimension {
                expected: self.len(),
                actual: features.len(),
            });
        }

        Ok(features
            .iter()
            .zip(self.mean.iter().zip(&self.scale))
            .map(|(x, (mean, scale))| {
                // Constant features are fit with scale 0; leave them centred only
                let s = if *scale == 0.0 { 1.0 } else { *scale };
                (x - mean) / s
            })
            .collect())
    }
}

/// Outcome of one classification
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub risk: RiskLevel,
    pub error: f64,
    /// error / threshold, rounded to two decimals
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct RiskClassifier {
    autoencoder: Autoencoder,
    scaler: StandardScaler,
    threshold: f64,
    watch_ratio: Option<f64>,
}

impl RiskClassifier {
    pub fn new(
        autoencoder: Autoencoder,
        scaler: StandardScaler,
        threshold: f64,
    ) -> Result<Self, ModelError> {
        autoencoder.validate()?;
        scaler.validate()?;

        if scaler.len() != FEATURE_COUNT || autoencoder.input_dim != FEATURE_COUNT {
            return Err(ModelError::Shape(format!(
                "expected {} features, scaler has {} and autoencoder has {}",
                FEATURE_COUNT,
                scaler.len(),
                autoencoder.input_dim
            )));
        }

        if !threshold.is_finite() || threshold <= 0.0 {
            return Err(ModelError::InvalidThreshold(format!(
                "threshold must be a positive number, got {}",
                threshold
            )));
        }

        Ok(Self {
            autoencoder,
            scaler,
            threshold,
            watch_ratio: None,
        })
    }

    /// Enable the WATCH band for errors in `[threshold * ratio, threshold)`
    ///
    /// Ratios outside (0, 1) are ignored.
    pub fn with_watch_ratio(mut self, ratio: Option<f64>) -> Self {
        self.watch_ratio = ratio.filter(|r| *r > 0.0 && *r < 1.0);
        self
    }

    /// Load `autoencoder.json`, `scaler.json` and `threshold.txt` from a directory
    pub fn load(model_dir: &Path) -> Result<Self, ModelError> {
        let autoencoder: Autoencoder = read_json(&model_dir.join(AUTOENCODER_FILE))?;
        let scaler: StandardScaler = read_json(&model_dir.join(SCALER_FILE))?;

        let threshold_path = model_dir.join(THRESHOLD_FILE);
        let threshold = parse_threshold(&read_text(&threshold_path)?)?;

        Self::new(autoencoder, scaler, threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn watch_ratio(&self) -> Option<f64> {
        self.watch_ratio
    }

    /// Mean squared reconstruction error of a raw (unscaled) feature vector
    pub fn reconstruction_error(&self, features: &[f64]) -> Result<f64, FeatureError> {
        check_finite(features)?;
        let scaled = self.scaler.transform(features)?;
        let reconstructed = self.autoencoder.reconstruct(&scaled);

        let sum_sq: f64 = scaled
            .iter()
            .zip(&reconstructed)
            .map(|(x, r)| (x - r).powi(2))
            .sum();
        let error = sum_sq / scaled.len() as f64;

        if !error.is_finite() {
            return Err(FeatureError::NonFinite("reconstruction_error".to_string()));
        }
        Ok(error)
    }

    /// Label an error; `error >= threshold` is HIGH
    pub fn label(&self, error: f64) -> RiskLevel {
        if error >= self.threshold {
            return RiskLevel::High;
        }
        match self.watch_ratio {
            Some(ratio) if error >= self.threshold * ratio => RiskLevel::Watch,
            _ => RiskLevel::Normal,
        }
    }

    pub fn classify_features(&self, features: &[f64]) -> Result<Classification, FeatureError> {
        let error = self.reconstruction_error(features)?;
        Ok(Classification {
            risk: self.label(error),
            error,
            confidence: round2(error / self.threshold),
        })
    }

    /// Classify a window of exactly 48 archived records, oldest first
    pub fn classify(&self, window: &[ArchivedRecord]) -> Result<Classification, FeatureError> {
        let features = build_feature_vector(window)?;
        self.classify_features(&features)
    }
}

pub fn parse_threshold(text: &str) -> Result<f64, ModelError> {
    let threshold: f64 = text.trim().parse().map_err(|_| {
        ModelError::InvalidThreshold(format!("'{}' is not a number", text.trim()))
    })?;

    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ModelError::InvalidThreshold(format!(
            "threshold must be a positive number, got {}",
            threshold
        )));
    }
    Ok(threshold)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn read_text(path: &Path) -> Result<String, ModelError> {
    fs::read_to_string(path).map_err(|source| ModelError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, ModelError> {
    let text = read_text(path)?;
    serde_json::from_str(&text).map_err(|e| ModelError::Parse {
        path: PathBuf::from(path),
        message: e.to_string(),
    })
}
