use chrono::{DateTime, NaiveDate, Utc};
use std::sync::{Arc, Mutex};

/// Clock trait for abstracting time operations
pub trait Clock: Send + Sync {
    /// Current instant in UTC
    fn now(&self) -> DateTime<Utc>;

    /// Current time as RFC3339 string (for `lastUpdated` fields)
    fn now_rfc3339(&self) -> String {
        self.now().to_rfc3339()
    }

    /// Current time as epoch milliseconds (archive keys)
    fn now_epoch_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Current UTC calendar date (weather lookups)
    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Production implementation of Clock using system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Test implementation of Clock with fixed/controllable time
///
/// Clones share the same instant, so a test can keep a handle and advance
/// time while the poller owns another.
#[derive(Debug, Clone)]
pub struct FixedClock {
    timestamp: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp: Arc::new(Mutex::new(timestamp)),
        }
    }

    pub fn from_rfc3339(timestamp_str: &str) -> Result<Self, chrono::ParseError> {
        let timestamp = DateTime::parse_from_rfc3339(timestamp_str)?.with_timezone(&Utc);
        Ok(Self::new(timestamp))
    }

    /// Create a FixedClock from epoch milliseconds; out-of-range input falls back to the epoch
    pub fn from_epoch_millis(millis: i64) -> Self {
        let timestamp = DateTime::from_timestamp_millis(millis).unwrap_or_default();
        Self::new(timestamp)
    }

    pub fn set_time(&self, timestamp: DateTime<Utc>) {
        let mut current = self.timestamp.lock().unwrap_or_else(|e| e.into_inner());
        *current = timestamp;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        let mut current = self.timestamp.lock().unwrap_or_else(|e| e.into_inner());
        *current += chrono::Duration::seconds(seconds);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.timestamp.lock().unwrap_or_else(|e| e.into_inner())
    }
}
