//! Truck repository implementation

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::Truck;
use crate::error::Result;
use crate::repositories::base::{GenericRepository, Repository};
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

/// Truck repository implementation
pub struct TruckRepository {
    /// Base repository
    base: GenericRepository<Truck>,
}

impl TruckRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    /// Look a truck up by its registration plate
    #[instrument(skip(self, cancel))]
    pub async fn find_by_plate(&self, plate_number: &str, cancel: &CancellationToken) -> Result<Option<Truck>> {
        self.base.get(&Filter::eq("plate_number", plate_number), cancel).await
    }

    /// Trucks in service, by plate
    pub async fn active_trucks(&self, cancel: &CancellationToken) -> Result<Vec<Truck>> {
        self.base
            .find_ordered(Some(&Filter::eq("active", true)), &[OrderBy::asc("plate_number")], None, cancel)
            .await
    }
}

impl Deref for TruckRepository {
    type Target = GenericRepository<Truck>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
