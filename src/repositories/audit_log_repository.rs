//! Read access to the audit trail
//!
//! Entries are written by the unit of work as part of an audited save; this
//! repository only adds lookups on top of the generic surface.

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::AuditEntry;
use crate::error::{DataError, Result};
use crate::repositories::base::GenericRepository;
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

pub struct AuditLogRepository {
    base: GenericRepository<AuditEntry>,
}

impl AuditLogRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    /// Everything one user saved, newest first
    #[instrument(skip(self, cancel))]
    pub async fn by_user(&self, user_id: &str, cancel: &CancellationToken) -> Result<Vec<AuditEntry>> {
        self.base
            .find_ordered(
                Some(&Filter::eq("user_id", user_id)),
                &[OrderBy::desc("timestamp"), OrderBy::desc("id")],
                None,
                cancel,
            )
            .await
    }

    /// The `limit` most recent entries
    #[instrument(skip(self, cancel))]
    pub async fn recent(&self, limit: u32, cancel: &CancellationToken) -> Result<Vec<AuditEntry>> {
        if limit == 0 {
            return Err(DataError::argument("limit must be at least 1"));
        }
        self.base
            .find_ordered(
                None,
                &[OrderBy::desc("timestamp"), OrderBy::desc("id")],
                Some(i64::from(limit)),
                cancel,
            )
            .await
    }
}

impl Deref for AuditLogRepository {
    type Target = GenericRepository<AuditEntry>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
