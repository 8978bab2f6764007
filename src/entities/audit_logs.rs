use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use macros::Entity;
use serde::{Deserialize, Serialize};
use sqlx::prelude::FromRow;

use crate::error::Result;
use crate::storage::ChangeCounts;

/// Operation tag used when an audited save does not name one
pub const DEFAULT_AUDIT_OPERATION: &str = "BULK_OPERATION";

/// Operation tag written by `UnitOfWork::save_changes_for_user`
pub const SAVE_CHANGES_OPERATION: &str = "SAVE_CHANGES";

/// One audited flush: who saved, what kind of operation, how many changes.
///
/// `details` holds the per-table change counts of the batch as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, Entity)]
#[serde(rename_all = "camelCase")]
#[entity(table = "audit_logs", name = "AuditEntry")]
pub struct AuditEntry {
    #[entity(key)]
    pub id: i64,
    pub operation: String,
    pub user_id: String,
    pub entity_change_count: i64,
    pub details: String,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    pub(crate) fn for_batch(
        operation: impl Into<String>,
        user_id: impl Into<String>,
        summary: &BTreeMap<&'static str, ChangeCounts>,
    ) -> Result<Self> {
        let entity_change_count = summary.values().map(ChangeCounts::total).sum::<usize>() as i64;
        Ok(Self {
            id: 0,
            operation: operation.into(),
            user_id: user_id.into(),
            entity_change_count,
            details: serde_json::to_string(summary)?,
            timestamp: Utc::now(),
        })
    }

    /// Decode the per-table change counts recorded with this entry
    pub fn change_summary(&self) -> Result<BTreeMap<String, ChangeCounts>> {
        Ok(serde_json::from_str(&self.details)?)
    }
}
