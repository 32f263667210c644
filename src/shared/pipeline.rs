//! Poll cycle: live snapshot -> weather enrichment -> archive -> history gate
//! -> classification -> prediction and probe labels
//!
//! The poller keeps no state between cycles. Every decision (duplicate
//! snapshot, history size, previous prediction) is re-read from the store.

use chrono::DateTime;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::domain::{
    ArchivedRecord, Coordinates, LiveField, PredictionResult, ProbeReading, RiskLevel,
    SensorReading,
};
use crate::error::{FieldError, StoreError};
use crate::features::{history_gate_open, HISTORY_WINDOW};
use crate::grid_risk::grid_risk;
use crate::id_generator::IdGenerator;
use crate::idempotency::{archive_key, gap_allows_archive, parse_archive_key};
use crate::model::RiskClassifier;
use crate::paths::{live_status_path, FieldRef, USERS_ROOT};
use crate::sensor_validation::{validate_reading, validate_soil_moisture, SensorStatus, ValidReading};
use crate::store::{child_keys, set_json, DocumentStore, Query};
use crate::time::Clock;
use crate::weather::{SolarSource, WeatherEnricher};

pub const DEFAULT_LATITUDE: f64 = 20.5937;
pub const DEFAULT_LONGITUDE: f64 = 78.9629;
pub const DEFAULT_MIN_ARCHIVE_GAP_MS: i64 = 25 * 60 * 1000;

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineSettings {
    /// Used for weather lookups when a snapshot carries no coordinates
    pub default_location: Coordinates,
    /// Minimum spacing of archive entries for snapshots without a timestamp
    pub min_archive_gap_ms: i64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            default_location: Coordinates {
                latitude: DEFAULT_LATITUDE,
                longitude: DEFAULT_LONGITUDE,
            },
            min_archive_gap_ms: DEFAULT_MIN_ARCHIVE_GAP_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ArchiveOutcome {
    Archived { key: String },
    /// A record with this timestamp key already exists
    Duplicate { key: String },
    /// Untimestamped snapshot arrived within the minimum archive gap
    TooSoon { since_last_ms: i64 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoEnvData,
    MalformedReading(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldOutcome {
    Skipped(SkipReason),
    Processed {
        archive: ArchiveOutcome,
        history_len: usize,
        prediction: Option<PredictionResult>,
        probes_labelled: usize,
    },
}

/// Counters for one poll cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub cycle_id: String,
    pub users: usize,
    pub fields: usize,
    pub archived: usize,
    pub predicted: usize,
    pub skipped: usize,
    pub errors: usize,
}

pub struct Poller<S, W> {
    store: S,
    enricher: WeatherEnricher<W>,
    classifier: RiskClassifier,
    settings: PipelineSettings,
    clock: Box<dyn Clock>,
    id_generator: Box<dyn IdGenerator>,
}

impl<S: DocumentStore, W: SolarSource> Poller<S, W> {
    pub fn new(
        store: S,
        enricher: WeatherEnricher<W>,
        classifier: RiskClassifier,
        settings: PipelineSettings,
        clock: Box<dyn Clock>,
        id_generator: Box<dyn IdGenerator>,
    ) -> Self {
        Self {
            store,
            enricher,
            classifier,
            settings,
            clock,
            id_generator,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Poll forever on a fixed interval; the first cycle starts immediately
    pub async fn run(&self, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            match self.run_cycle().await {
                Ok(report) => info!(
                    cycle_id = %report.cycle_id,
                    users = report.users,
                    fields = report.fields,
                    archived = report.archived,
                    predicted = report.predicted,
                    skipped = report.skipped,
                    errors = report.errors,
                    "Poll cycle complete"
                ),
                Err(e) => error!(error = %e, "Poll cycle failed"),
            }

            debug!(next_poll_secs = period.as_secs(), "Waiting for next poll");
        }
    }

    /// Process every user and field once
    ///
    /// Only a failure to list users fails the cycle; per-user and per-field
    /// errors are logged, counted and skipped.
    pub async fn run_cycle(&self) -> Result<CycleReport, StoreError> {
        let cycle_id = self.id_generator.uuid_v4();
        let span = info_span!("poll_cycle", cycle_id = %cycle_id);
        self.run_cycle_inner(cycle_id).instrument(span).await
    }

    async fn run_cycle_inner(&self, cycle_id: String) -> Result<CycleReport, StoreError> {
        let mut report = CycleReport {
            cycle_id,
            ..Default::default()
        };

        let users = child_keys(&self.store, USERS_ROOT).await?;
        info!(users = users.len(), "Fetched users");

        for user_id in users {
            report.users += 1;
            if let Err(e) = self.process_user(&user_id, &mut report).await {
                report.errors += 1;
                warn!(user_id = %user_id, error = %e, "Skipping user");
            }
        }

        Ok(report)
    }

    async fn process_user(&self, user_id: &str, report: &mut CycleReport) -> Result<(), FieldError> {
        let path = live_status_path(user_id)?;
        let live_status = match self.store.get(&path, Query::Full).await? {
            Some(Value::Object(map)) => map,
            _ => {
                debug!(user_id = %user_id, "No live_status");
                return Ok(());
            }
        };

        for (field_id, field_data) in live_status {
            report.fields += 1;

            let field = match FieldRef::new(user_id, field_id.as_str()) {
                Ok(field) => field,
                Err(e) => {
                    report.errors += 1;
                    warn!(user_id = %user_id, field_id = %field_id, error = %e, "Invalid field id");
                    continue;
                }
            };

            if let Some(probes) = field_data.get("probes") {
                if !(probes.is_object() || probes.is_array() || probes.is_null()) {
                    warn!(user_id = %user_id, field_id = %field_id, "Ignoring malformed probes node");
                }
            }
            let live = LiveField::from_value(&field_data);

            match self.process_field(&field, &live).await {
                Ok(FieldOutcome::Skipped(reason)) => {
                    report.skipped += 1;
                    info!(
                        user_id = %user_id,
                        field_id = %field_id,
                        reason = ?reason,
                        "Skipping field"
                    );
                }
                Ok(FieldOutcome::Processed {
                    archive,
                    prediction,
                    ..
                }) => {
                    if matches!(archive, ArchiveOutcome::Archived { .. }) {
                        report.archived += 1;
                    }
                    if prediction.is_some() {
                        report.predicted += 1;
                    }
                }
                Err(e) => {
                    report.errors += 1;
                    warn!(
                        user_id = %user_id,
                        field_id = %field_id,
                        error = %e,
                        "Field processing failed, will retry next poll"
                    );
                }
            }
        }

        Ok(())
    }

    /// Run the full pipeline for one field's live entry
    pub async fn process_field(
        &self,
        field: &FieldRef,
        live: &LiveField,
    ) -> Result<FieldOutcome, FieldError> {
        let Some(env) = live.env.as_ref().filter(|v| v.is_object()) else {
            return Ok(FieldOutcome::Skipped(SkipReason::NoEnvData));
        };

        let reading: SensorReading = match serde_json::from_value(env.clone()) {
            Ok(reading) => reading,
            Err(e) => {
                return Ok(FieldOutcome::Skipped(SkipReason::MalformedReading(
                    e.to_string(),
                )))
            }
        };

        let reading = match validate_reading(&reading) {
            Ok(reading) => reading,
            Err(e) => {
                return Ok(FieldOutcome::Skipped(SkipReason::MalformedReading(
                    e.to_string(),
                )))
            }
        };

        let archive = self.archive(field, &reading).await?;

        let window = self.load_window(field).await?;
        if !history_gate_open(window.len()) {
            info!(
                user_id = %field.user_id(),
                field_id = %field.field_id(),
                history = window.len(),
                required = HISTORY_WINDOW,
                "Insufficient history for prediction"
            );
            return Ok(FieldOutcome::Processed {
                archive,
                history_len: window.len(),
                prediction: None,
                probes_labelled: 0,
            });
        }

        let prediction = self.predict(field, &window).await?;
        let probes_labelled = self
            .write_probe_risks(field, prediction.risk, &live.probes)
            .await;

        Ok(FieldOutcome::Processed {
            archive,
            history_len: window.len(),
            prediction: Some(prediction),
            probes_labelled,
        })
    }

    async fn archive(
        &self,
        field: &FieldRef,
        reading: &ValidReading,
    ) -> Result<ArchiveOutcome, FieldError> {
        let now_ms = self.clock.now_epoch_millis();

        let timestamp = match reading.timestamp {
            Some(ts) => {
                let key = archive_key(ts);
                let path = field.history_record_path(&key)?;
                if self.store.get(&path, Query::Shallow).await?.is_some() {
                    debug!(
                        user_id = %field.user_id(),
                        field_id = %field.field_id(),
                        key = %key,
                        "Snapshot already archived"
                    );
                    return Ok(ArchiveOutcome::Duplicate { key });
                }
                ts
            }
            None => {
                let newest = self.newest_archived_ms(field).await?;
                if !gap_allows_archive(newest, now_ms, self.settings.min_archive_gap_ms) {
                    let since_last_ms = newest.map(|last| now_ms - last).unwrap_or_default();
                    info!(
                        user_id = %field.user_id(),
                        field_id = %field.field_id(),
                        since_last_secs = since_last_ms / 1000,
                        required_secs = self.settings.min_archive_gap_ms / 1000,
                        "Skipping archive, last entry too recent"
                    );
                    return Ok(ArchiveOutcome::TooSoon { since_last_ms });
                }
                now_ms
            }
        };

        let key = archive_key(timestamp);
        let path = field.history_record_path(&key)?;

        let location = match (reading.lat, reading.lon) {
            (Some(latitude), Some(longitude)) => Coordinates {
                latitude,
                longitude,
            },
            _ => self.settings.default_location,
        };
        let date = DateTime::from_timestamp_millis(timestamp)
            .map(|dt| dt.date_naive())
            .unwrap_or_else(|| self.clock.today());
        let solar_radiation = self.enricher.solar_radiation(location, date).await;

        let record = ArchivedRecord {
            temperature: reading.temperature,
            humidity: reading.humidity,
            solar_radiation,
            timestamp,
            lat: reading.lat,
            lon: reading.lon,
        };
        set_json(&self.store, &path, &record).await?;

        info!(
            user_id = %field.user_id(),
            field_id = %field.field_id(),
            key = %key,
            solar_radiation,
            "Archived reading"
        );

        Ok(ArchiveOutcome::Archived { key })
    }

    async fn newest_archived_ms(&self, field: &FieldRef) -> Result<Option<i64>, FieldError> {
        let newest = self
            .store
            .get(&field.history_path(), Query::LastByKey(1))
            .await?;

        Ok(match newest {
            Some(Value::Object(map)) => map.keys().next_back().and_then(|k| parse_archive_key(k)),
            _ => None,
        })
    }

    /// Most recent archived records, oldest first; malformed entries are dropped
    async fn load_window(&self, field: &FieldRef) -> Result<Vec<ArchivedRecord>, FieldError> {
        let history = self
            .store
            .get(&field.history_path(), Query::LastByKey(HISTORY_WINDOW))
            .await?;

        let Some(Value::Object(entries)) = history else {
            return Ok(Vec::new());
        };

        let mut window = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_value::<ArchivedRecord>(value) {
                Ok(record) => window.push(record),
                Err(e) => debug!(
                    user_id = %field.user_id(),
                    field_id = %field.field_id(),
                    key = %key,
                    error = %e,
                    "Ignoring malformed archived record"
                ),
            }
        }
        Ok(window)
    }

    async fn predict(
        &self,
        field: &FieldRef,
        window: &[ArchivedRecord],
    ) -> Result<PredictionResult, FieldError> {
        let classification = self.classifier.classify(window)?;

        let result = PredictionResult {
            risk: classification.risk,
            anomaly_score: classification.error,
            confidence: classification.confidence,
            reason: classification.risk.reason().to_string(),
            window_size: window.len(),
            timestamp: window.last().map(|r| r.timestamp).unwrap_or_default(),
            last_updated: self.clock.now_rfc3339(),
        };
        set_json(&self.store, &field.prediction_path(), &result).await?;

        info!(
            user_id = %field.user_id(),
            field_id = %field.field_id(),
            risk = %result.risk,
            anomaly_score = result.anomaly_score,
            threshold = self.classifier.threshold(),
            "Prediction written"
        );

        Ok(result)
    }

    /// Label each soil probe from the field risk; returns how many were written
    async fn write_probe_risks(
        &self,
        field: &FieldRef,
        field_risk: RiskLevel,
        probes: &BTreeMap<String, Value>,
    ) -> usize {
        let mut written = 0;

        for (probe_id, data) in probes {
            let Ok(probe) = serde_json::from_value::<ProbeReading>(data.clone()) else {
                continue;
            };
            let Some(raw) = probe.raw_moisture.as_ref() else {
                continue;
            };

            let moisture = match probe.moisture_pct() {
                Some(m) if validate_soil_moisture(Some(m)) == SensorStatus::Ok => m,
                _ => {
                    warn!(
                        field_id = %field.field_id(),
                        probe_id = %probe_id,
                        raw_moisture = %raw,
                        "Invalid moisture for probe"
                    );
                    continue;
                }
            };

            let path = match field.probe_prediction_path(probe_id) {
                Ok(path) => path,
                Err(e) => {
                    warn!(probe_id = %probe_id, error = %e, "Invalid probe id");
                    continue;
                }
            };

            let level = grid_risk(field_risk, moisture);
            match self
                .store
                .set(&path, &Value::String(level.as_str().to_string()))
                .await
            {
                Ok(()) => {
                    written += 1;
                    info!(
                        field_id = %field.field_id(),
                        probe_id = %probe_id,
                        moisture,
                        risk = %level,
                        "Probe prediction written"
                    );
                }
                Err(e) => warn!(probe_id = %probe_id, error = %e, "Failed to write probe prediction"),
            }
        }

        written
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id_generator::FixedIdGenerator;
    use crate::store::MemoryStore;
    use crate::test_utils::fixtures::{self, FixedSolar};
    use crate::time::FixedClock;
    use serde_json::json;

    const NOW_MS: i64 = 1_704_153_600_000; // 2024-01-02T00:00:00Z

    fn poller(store: MemoryStore, classifier: RiskClassifier) -> Poller<MemoryStore, FixedSolar> {
        Poller::new(
            store,
            WeatherEnricher::new(FixedSolar(6.0), 1),
            classifier,
            PipelineSettings::default(),
            Box::new(FixedClock::from_epoch_millis(NOW_MS)),
            Box::new(FixedIdGenerator::single("cycle-1")),
        )
    }

    fn live(env: Value) -> LiveField {
        serde_json::from_value(json!({ "env": env })).unwrap()
    }

    #[tokio::test]
    async fn test_missing_env_is_skipped() {
        let p = poller(MemoryStore::new(), fixtures::identity_classifier(1.0));
        let field = FieldRef::new("u1", "north").unwrap();

        let outcome = p.process_field(&field, &LiveField::default()).await.unwrap();
        assert_eq!(outcome, FieldOutcome::Skipped(SkipReason::NoEnvData));
        assert_eq!(p.store().snapshot(), Value::Null);
    }

    #[tokio::test]
    async fn test_malformed_reading_is_skipped() {
        let p = poller(MemoryStore::new(), fixtures::identity_classifier(1.0));
        let field = FieldRef::new("u1", "north").unwrap();

        let outcome = p
            .process_field(&field, &live(json!({ "temp": 21.0 })))
            .await
            .unwrap();
        assert!(matches!(
            outcome,
            FieldOutcome::Skipped(SkipReason::MalformedReading(_))
        ));
    }

    #[tokio::test]
    async fn test_first_reading_is_archived_with_solar() {
        let p = poller(MemoryStore::new(), fixtures::identity_classifier(1.0));
        let field = FieldRef::new("u1", "north").unwrap();

        let outcome = p
            .process_field(
                &field,
                &live(json!({ "temp": 22.5, "hum": "71", "timestamp": 1_704_150_000_000i64 })),
            )
            .await
            .unwrap();

        match outcome {
            FieldOutcome::Processed {
                archive,
                history_len,
                prediction,
                ..
            } => {
                assert_eq!(
                    archive,
                    ArchiveOutcome::Archived {
                        key: "1704150000000".to_string()
                    }
                );
                assert_eq!(history_len, 1);
                assert!(prediction.is_none());
            }
            other => panic!("unexpected outcome {:?}", other),
        }

        let record = p
            .store()
            .read("users/u1/fields/north/data/1704150000000")
            .unwrap();
        assert_eq!(record["temperature"], 22.5);
        assert_eq!(record["humidity"], 71.0);
        assert_eq!(record["solar_radiation"], 6.0);
        assert!(p.store().read("users/u1/fields/north/prediction").is_none());
    }

    #[tokio::test]
    async fn test_same_timestamp_is_not_archived_twice() {
        let p = poller(MemoryStore::new(), fixtures::identity_classifier(1.0));
        let field = FieldRef::new("u1", "north").unwrap();
        let snapshot = live(json!({ "temp": 22.5, "hum": 70, "timestamp": 1_704_150_000_000i64 }));

        p.process_field(&field, &snapshot).await.unwrap();
        let second = p.process_field(&field, &snapshot).await.unwrap();

        assert!(matches!(
            second,
            FieldOutcome::Processed {
                archive: ArchiveOutcome::Duplicate { .. },
                history_len: 1,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_untimestamped_snapshot_respects_gap() {
        let store = MemoryStore::with_data(json!({
            "users": { "u1": { "fields": { "north": { "data": fixtures::history_json(
                &fixtures::records(1, NOW_MS - 10 * 60 * 1000)
            ) } } } }
        }));
        let p = poller(store, fixtures::identity_classifier(1.0));
        let field = FieldRef::new("u1", "north").unwrap();

        let outcome = p
            .process_field(&field, &live(json!({ "temp": 22.5, "hum": 70 })))
            .await
            .unwrap();

        assert!(matches!(
            outcome,
            FieldOutcome::Processed {
                archive: ArchiveOutcome::TooSoon { since_last_ms: 600_000 },
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_full_history_writes_prediction_and_probes() {
        let start = NOW_MS - (HISTORY_WINDOW as i64) * 1_800_000;
        let store = MemoryStore::with_data(json!({
            "users": { "u1": { "fields": { "north": { "data": fixtures::history_json(
                &fixtures::records(HISTORY_WINDOW, start)
            ) } } } }
        }));
        // Zero model with a tiny threshold: any non-zero feature vector is HIGH
        let p = poller(store, fixtures::zero_classifier(1e-6));
        let field = FieldRef::new("u1", "north").unwrap();

        let entry: LiveField = serde_json::from_value(json!({
            "env": { "temp": 24.0, "hum": 88.0, "timestamp": NOW_MS },
            "probes": {
                "dry": { "raw_moisture": 12 },
                "wet": { "raw_moisture": "75" },
                "broken": { "raw_moisture": "n/a" },
                "empty": {}
            }
        }))
        .unwrap();

        let outcome = p.process_field(&field, &entry).await.unwrap();
        let FieldOutcome::Processed {
            prediction: Some(prediction),
            probes_labelled,
            history_len,
            ..
        } = outcome
        else {
            panic!("expected a prediction");
        };

        assert_eq!(history_len, HISTORY_WINDOW);
        assert_eq!(prediction.risk, RiskLevel::High);
        assert_eq!(prediction.timestamp, NOW_MS);
        assert_eq!(probes_labelled, 2);

        let stored = p.store().read("users/u1/fields/north/prediction").unwrap();
        assert_eq!(stored["risk"], "HIGH");
        assert_eq!(stored["window_size"], HISTORY_WINDOW);
        assert_eq!(
            p.store().read("users/u1/live_status/north/probes/dry/prediction"),
            Some(json!("WARNING"))
        );
        assert_eq!(
            p.store().read("users/u1/live_status/north/probes/wet/prediction"),
            Some(json!("HIGH"))
        );
        assert!(p
            .store()
            .read("users/u1/live_status/north/probes/broken/prediction")
            .is_none());
    }

    #[tokio::test]
    async fn test_run_cycle_counts() {
        let start = NOW_MS - (HISTORY_WINDOW as i64) * 1_800_000;
        let store = MemoryStore::with_data(json!({
            "users": {
                "u1": {
                    "live_status": {
                        "north": { "env": { "temp": 21.0, "hum": 65.0, "timestamp": NOW_MS } },
                        "south": { "probes": {} },
                        "east": "offline"
                    },
                    "fields": { "north": { "data": fixtures::history_json(
                        &fixtures::records(HISTORY_WINDOW - 1, start)
                    ) } }
                },
                "u2": { "profile": { "name": "no fields" } }
            }
        }));
        let p = poller(store, fixtures::identity_classifier(1.0));

        let report = p.run_cycle().await.unwrap();

        assert_eq!(report.cycle_id, "cycle-1");
        assert_eq!(report.users, 2);
        assert_eq!(report.fields, 3);
        assert_eq!(report.archived, 1);
        // 47 + the new reading completes the window
        assert_eq!(report.predicted, 1);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.errors, 0);
    }
}
