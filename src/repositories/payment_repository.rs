//! Payment repository implementation

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::Payment;
use crate::error::Result;
use crate::repositories::base::GenericRepository;
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

/// Payment repository implementation
pub struct PaymentRepository {
    base: GenericRepository<Payment>,
}

impl PaymentRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    #[instrument(skip(self, cancel))]
    pub async fn for_invoice(&self, invoice_id: i64, cancel: &CancellationToken) -> Result<Vec<Payment>> {
        self.base
            .find_ordered(
                Some(&Filter::eq("invoice_id", invoice_id)),
                &[OrderBy::asc("paid_at"), OrderBy::asc("id")],
                None,
                cancel,
            )
            .await
    }

    /// Amount received so far against one invoice
    #[instrument(skip(self, cancel))]
    pub async fn total_paid_cents(&self, invoice_id: i64, cancel: &CancellationToken) -> Result<i64> {
        self.base
            .sum("amount_cents", Some(&Filter::eq("invoice_id", invoice_id)), cancel)
            .await
    }
}

impl Deref for PaymentRepository {
    type Target = GenericRepository<Payment>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
