//! Invoice repository implementation

use std::ops::Deref;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::entities::{Invoice, InvoiceStatus};
use crate::error::Result;
use crate::repositories::base::GenericRepository;
use crate::repositories::query_builder::{Filter, OrderBy};
use crate::storage::PersistenceContext;

/// Invoice repository implementation
pub struct InvoiceRepository {
    base: GenericRepository<Invoice>,
}

fn outstanding_filter() -> Filter {
    Filter::is_in("status", [InvoiceStatus::Issued, InvoiceStatus::PartiallyPaid])
}

impl InvoiceRepository {
    pub fn new(context: &Arc<Mutex<PersistenceContext>>) -> Self {
        Self {
            base: GenericRepository::new(context),
        }
    }

    /// Every invoice of one customer, oldest first
    #[instrument(skip(self, cancel))]
    pub async fn for_customer(&self, customer_id: i64, cancel: &CancellationToken) -> Result<Vec<Invoice>> {
        self.base
            .find_ordered(
                Some(&Filter::eq("customer_id", customer_id)),
                &[OrderBy::asc("issued_at"), OrderBy::asc("id")],
                None,
                cancel,
            )
            .await
    }

    /// Invoices still awaiting payment, earliest due first
    pub async fn outstanding(&self, cancel: &CancellationToken) -> Result<Vec<Invoice>> {
        self.base
            .find_ordered(
                Some(&outstanding_filter()),
                &[OrderBy::asc("due_at"), OrderBy::asc("id")],
                None,
                cancel,
            )
            .await
    }

    /// Face value of all outstanding invoices, optionally for one customer
    #[instrument(skip(self, cancel))]
    pub async fn outstanding_total_cents(&self, customer_id: Option<i64>, cancel: &CancellationToken) -> Result<i64> {
        let filter = match customer_id {
            Some(customer_id) => outstanding_filter().and(Filter::eq("customer_id", customer_id)),
            None => outstanding_filter(),
        };
        self.base.sum("amount_cents", Some(&filter), cancel).await
    }
}

impl Deref for InvoiceRepository {
    type Target = GenericRepository<Invoice>;

    fn deref(&self) -> &Self::Target {
        &self.base
    }
}
