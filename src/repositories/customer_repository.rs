//! Customer repository implementation

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::Customer;
use crate::error::Result;
use crate::repositories::base::{GenericRepository, Repository};
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

/// Customer repository implementation
pub struct CustomerRepository {
    base: GenericRepository<Customer>,
}

impl CustomerRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn find_by_email(&self, email: &str, cancel: &CancellationToken) -> Result<Option<Customer>> {
        self.base.get(&Filter::eq("email", email), cancel).await
    }

    /// Customers whose name contains `term`, by name. SQLite's LIKE is
    /// case-insensitive for ASCII.
    #[instrument(skip(self, cancel))]
    pub async fn search_by_name(&self, term: &str, cancel: &CancellationToken) -> Result<Vec<Customer>> {
        let filter = Filter::like("name", format!("%{}%", term.trim()));
        self.base
            .find_ordered(Some(&filter), &[OrderBy::asc("name"), OrderBy::asc("id")], None, cancel)
            .await
    }
}

impl Deref for CustomerRepository {
    type Target = GenericRepository<Customer>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
