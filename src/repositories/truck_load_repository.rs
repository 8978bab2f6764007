//! Truck load repository implementation

use std::ops::Deref;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::TruckLoad;
use crate::error::{DataError, Result};
use crate::repositories::base::GenericRepository;
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

/// Truck load repository implementation
pub struct TruckLoadRepository {
    base: GenericRepository<TruckLoad>,
}

impl TruckLoadRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    /// Loads carried by one truck, most recent first
    #[instrument(skip(self, cancel))]
    pub async fn for_truck(&self, truck_id: i64, cancel: &CancellationToken) -> Result<Vec<TruckLoad>> {
        self.base
            .find_ordered(
                Some(&Filter::eq("truck_id", truck_id)),
                &[OrderBy::desc("loaded_at"), OrderBy::desc("id")],
                None,
                cancel,
            )
            .await
    }

    /// Loads in the half-open window `[from, to)`, in loading order
    #[instrument(skip(self, cancel))]
    pub async fn loaded_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<Vec<TruckLoad>> {
        if to < from {
            return Err(DataError::argument(format!("window ends ({to}) before it starts ({from})")));
        }
        let filter = Filter::gte("loaded_at", from).and(Filter::lt("loaded_at", to));
        self.base
            .find_ordered(Some(&filter), &[OrderBy::asc("loaded_at"), OrderBy::asc("id")], None, cancel)
            .await
    }
}

impl Deref for TruckLoadRepository {
    type Target = GenericRepository<TruckLoad>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
