use regex::Regex;
use std::sync::OnceLock;

/// Maximum key length accepted by the Realtime Database, in UTF-8 bytes
pub const MAX_KEY_BYTES: usize = 768;

/// Validation error type
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Validation error for field '{}': {}",
            self.field, self.message
        )
    }
}

impl std::error::Error for ValidationError {}

/// Validate a single database path segment (user id, field id, probe id, record key)
///
/// Keys must be non-empty, at most 768 bytes, and must not contain
/// `.`, `$`, `#`, `[`, `]`, `/` or ASCII control characters.
pub fn validate_path_key(field: &str, key: &str) -> Result<(), ValidationError> {
    static KEY_REGEX: OnceLock<Regex> = OnceLock::new();
    let regex = KEY_REGEX.get_or_init(|| {
        Regex::new(r"^[^.$#\[\]/\x00-\x1F\x7F]+$").expect("Valid regex for database keys")
    });

    if key.is_empty() {
        return Err(ValidationError::new(field, "Key cannot be empty"));
    }

    if key.len() > MAX_KEY_BYTES {
        return Err(ValidationError::new(
            field,
            format!(
                "Key length {} exceeds maximum of {} bytes",
                key.len(),
                MAX_KEY_BYTES
            ),
        ));
    }

    if !regex.is_match(key) {
        return Err(ValidationError::new(
            field,
            "Key must not contain '.', '$', '#', '[', ']', '/' or control characters",
        ));
    }

    Ok(())
}

/// Validate epoch milliseconds timestamp for readings
/// Ensures non-negative and within reasonable range (year 2000 to 2100)
pub fn validate_epoch_millis(timestamp_ms: i64) -> Result<(), ValidationError> {
    // Minimum: 2000-01-01 00:00:00 UTC = 946684800000 ms
    const MIN_TIMESTAMP_MS: i64 = 946_684_800_000;
    // Maximum: 2100-01-01 00:00:00 UTC = 4102444800000 ms
    const MAX_TIMESTAMP_MS: i64 = 4_102_444_800_000;

    if timestamp_ms < 0 {
        return Err(ValidationError::new(
            "timestamp",
            "Timestamp must be non-negative",
        ));
    }

    if timestamp_ms < MIN_TIMESTAMP_MS {
        return Err(ValidationError::new(
            "timestamp",
            format!("Timestamp {} is before year 2000", timestamp_ms),
        ));
    }

    if timestamp_ms > MAX_TIMESTAMP_MS {
        return Err(ValidationError::new(
            "timestamp",
            format!("Timestamp {} is after year 2100", timestamp_ms),
        ));
    }

    Ok(())
}

/// Validate WGS84 latitude/longitude
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<(), ValidationError> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::new(
            "lat",
            format!("Latitude {} is outside -90..90", latitude),
        ));
    }

    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::new(
            "lon",
            format!("Longitude {} is outside -180..180", longitude),
        ));
    }

    Ok(())
}
