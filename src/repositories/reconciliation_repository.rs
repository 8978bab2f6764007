//! Daily reconciliation repository implementation

use std::ops::Deref;
use std::sync::Arc;

use chrono::NaiveDate;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::DailyReconciliation;
use crate::error::Result;
use crate::repositories::base::{GenericRepository, Repository};
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

pub struct DailyReconciliationRepository {
    base: GenericRepository<DailyReconciliation>,
}

impl DailyReconciliationRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    /// The reconciliation for one business day, if it was started
    #[instrument(skip(self, cancel))]
    pub async fn for_date(&self, business_date: NaiveDate, cancel: &CancellationToken) -> Result<Option<DailyReconciliation>> {
        self.base.get(&Filter::eq("business_date", business_date), cancel).await
    }

    /// Days not yet closed, oldest first
    pub async fn open_days(&self, cancel: &CancellationToken) -> Result<Vec<DailyReconciliation>> {
        self.base
            .find_ordered(Some(&Filter::eq("closed", false)), &[OrderBy::asc("business_date")], None, cancel)
            .await
    }
}

impl Deref for DailyReconciliationRepository {
    type Target = GenericRepository<DailyReconciliation>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
