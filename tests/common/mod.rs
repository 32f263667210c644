//! Test doubles and poller builders for integration tests
//!
//! Model, record and solar fixtures come from
//! `pest_risk_backend::test_utils::fixtures`.
#![allow(dead_code)]

use chrono::NaiveDate;
use serde_json::Value;

use pest_risk_backend::domain::Coordinates;
use pest_risk_backend::error::{StoreError, WeatherError};
use pest_risk_backend::id_generator::FixedIdGenerator;
use pest_risk_backend::model::RiskClassifier;
use pest_risk_backend::pipeline::{PipelineSettings, Poller};
use pest_risk_backend::store::{DocumentStore, MemoryStore, Query};
use pest_risk_backend::test_utils::fixtures::FixedSolar;
use pest_risk_backend::time::FixedClock;
use pest_risk_backend::weather::{SolarSource, WeatherEnricher};

/// 2024-03-01T12:00:00Z
pub const NOW_MS: i64 = 1_709_294_400_000;

/// Weather source that is always down
#[derive(Debug, Clone, Copy)]
pub struct OfflineSolar;

impl SolarSource for OfflineSolar {
    async fn daily_solar(&self, _location: Coordinates, _date: NaiveDate) -> Result<f64, WeatherError> {
        Err(WeatherError::Network("connection refused".to_string()))
    }
}

/// Store whose every operation fails, as when the database is unreachable
#[derive(Debug, Default)]
pub struct UnreachableStore;

impl DocumentStore for UnreachableStore {
    async fn get(&self, _path: &str, _query: Query) -> Result<Option<Value>, StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn set(&self, _path: &str, _value: &Value) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }

    async fn delete(&self, _path: &str) -> Result<(), StoreError> {
        Err(StoreError::Transport("connection refused".to_string()))
    }
}

pub fn poller<S: DocumentStore, W: SolarSource>(
    store: S,
    solar: W,
    classifier: RiskClassifier,
    clock: FixedClock,
) -> Poller<S, W> {
    Poller::new(
        store,
        WeatherEnricher::new(solar, 2),
        classifier,
        PipelineSettings::default(),
        Box::new(clock),
        Box::new(FixedIdGenerator::single("cycle-test")),
    )
}

pub fn memory_poller(
    data: Value,
    classifier: RiskClassifier,
    clock: FixedClock,
) -> Poller<MemoryStore, FixedSolar> {
    poller(MemoryStore::with_data(data), FixedSolar(5.5), classifier, clock)
}
