//! Maintenance: remove archived history so fields start collecting afresh
//!
//! Only `fields/{id}/data` is touched. Live status, predictions and probe
//! labels are left in place.

use tracing::info;

use crate::error::StoreError;
use crate::paths::{live_status_path, FieldRef, USERS_ROOT};
use crate::store::{child_keys, DocumentStore, Query};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CleanupReport {
    pub users_scanned: usize,
    pub fields_scanned: usize,
    /// History paths removed (or that would be removed in a dry run)
    pub deleted: Vec<String>,
}

/// Delete the archive of every field, or of one user's fields
pub async fn clean_history<S: DocumentStore>(
    store: &S,
    only_user: Option<&str>,
    dry_run: bool,
) -> Result<CleanupReport, StoreError> {
    let users = match only_user {
        Some(user_id) => vec![user_id.to_string()],
        None => child_keys(store, USERS_ROOT).await?,
    };

    let mut report = CleanupReport::default();

    for user_id in users {
        report.users_scanned += 1;

        let fields = child_keys(store, &live_status_path(&user_id)?).await?;
        for field_id in fields {
            report.fields_scanned += 1;

            let history = FieldRef::new(user_id.as_str(), field_id)?.history_path();
            if store.get(&history, Query::Shallow).await?.is_none() {
                continue;
            }

            if dry_run {
                info!(path = %history, "Would delete history");
            } else {
                store.delete(&history).await?;
                info!(path = %history, "Deleted history");
            }
            report.deleted.push(history);
        }
    }

    Ok(report)
}
