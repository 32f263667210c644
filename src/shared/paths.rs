//! Database path layout
//!
//! ```text
//! users/{uid}/live_status/{field_id}/env                       live snapshot (read)
//! users/{uid}/live_status/{field_id}/probes/{probe}/prediction  probe label (write)
//! users/{uid}/fields/{field_id}/data/{timestamp}               archive (append)
//! users/{uid}/fields/{field_id}/prediction                     field label (write)
//! ```

use crate::validators::{validate_path_key, ValidationError};

pub const USERS_ROOT: &str = "users";

pub fn live_status_path(user_id: &str) -> Result<String, ValidationError> {
    validate_path_key("user_id", user_id)?;
    Ok(format!("{}/{}/live_status", USERS_ROOT, user_id))
}

/// A validated (user, field) pair
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    user_id: String,
    field_id: String,
}

impl FieldRef {
    pub fn new(
        user_id: impl Into<String>,
        field_id: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let user_id = user_id.into();
        let field_id = field_id.into();
        validate_path_key("user_id", &user_id)?;
        validate_path_key("field_id", &field_id)?;
        Ok(Self { user_id, field_id })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    pub fn history_path(&self) -> String {
        format!(
            "{}/{}/fields/{}/data",
            USERS_ROOT, self.user_id, self.field_id
        )
    }

    pub fn history_record_path(&self, key: &str) -> Result<String, ValidationError> {
        validate_path_key("timestamp", key)?;
        Ok(format!("{}/{}", self.history_path(), key))
    }

    pub fn prediction_path(&self) -> String {
        format!(
            "{}/{}/fields/{}/prediction",
            USERS_ROOT, self.user_id, self.field_id
        )
    }

    pub fn probe_prediction_path(&self, probe_id: &str) -> Result<String, ValidationError> {
        validate_path_key("probe_id", probe_id)?;
        Ok(format!(
            "{}/{}/live_status/{}/probes/{}/prediction",
            USERS_ROOT, self.user_id, self.field_id, probe_id
        ))
    }
}
