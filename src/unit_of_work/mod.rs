//! Unit of work
//!
//! Groups repository operations into one atomic save. Repositories handed out
//! by a unit of work share its persistence context, so a change staged through
//! one is visible to every other before anything is saved. Saving optionally
//! appends an audit entry in the same store transaction.

use std::any::{Any, TypeId};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use sqlx::SqlitePool;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::entities::{AuditEntry, Entity, audit_logs};
use crate::error::{DataError, Result};
use crate::repositories::{
    AuditLogRepository, CustomerRepository, DailyReconciliationRepository, GenericRepository, InvoiceRepository,
    PaymentRepository, TruckLoadRepository, TruckRepository,
};
use crate::storage::{ChangeCounts, PersistenceContext, SqlValue};
use crate::utils::cancellable;

pub mod factory;


pub use factory::UnitOfWorkFactory;

type RepositoryCache = HashMap<TypeId, Arc<dyn Any + Send + Sync>>;

pub struct UnitOfWork {
    id: Uuid,
    context: Option<Arc<Mutex<PersistenceContext>>>,
    repositories: parking_lot::Mutex<RepositoryCache>,
}

impl UnitOfWork {
    pub fn new(pool: SqlitePool) -> Self {
        let id = Uuid::new_v4();
        tracing::debug!(%id, "Unit of work created");
        Self {
            id,
            context: Some(Arc::new(Mutex::new(PersistenceContext::new(pool)))),
            repositories: parking_lot::Mutex::new(HashMap::new()),
        }
    }

    /// Correlation id recorded in this unit of work's log spans
    pub fn id(&self) -> Uuid {
        self.id
    }

    fn context(&self) -> Result<&Arc<Mutex<PersistenceContext>>> {
        self.context.as_ref().ok_or_else(|| DataError::disposed("UnitOfWork"))
    }

    /// Get or create the cached repository of type `R`
    fn cached<R, F>(&self, build: F) -> Result<Arc<R>>
    where
        R: Send + Sync + 'static,
        F: FnOnce(&Arc<Mutex<PersistenceContext>>) -> R,
    {
        let context = self.context()?;
        let mut repositories = self.repositories.lock();
        let repository = repositories
            .entry(TypeId::of::<R>())
            .or_insert_with(|| Arc::new(build(context)) as Arc<dyn Any + Send + Sync>)
            .clone();
        repository
            .downcast::<R>()
            .map_err(|_| DataError::invalid_operation("repository cache holds a mismatched type"))
    }

    /// Generic repository for any entity type
    pub fn repository<T: Entity>(&self) -> Result<Arc<GenericRepository<T>>> {
        self.cached(GenericRepository::<T>::new)
    }

    pub fn trucks(&self) -> Result<Arc<TruckRepository>> {
        self.cached(TruckRepository::new)
    }

    pub fn customers(&self) -> Result<Arc<CustomerRepository>> {
        self.cached(CustomerRepository::new)
    }

    pub fn invoices(&self) -> Result<Arc<InvoiceRepository>> {
        self.cached(InvoiceRepository::new)
    }

    pub fn payments(&self) -> Result<Arc<PaymentRepository>> {
        self.cached(PaymentRepository::new)
    }

    pub fn truck_loads(&self) -> Result<Arc<TruckLoadRepository>> {
        self.cached(TruckLoadRepository::new)
    }

    pub fn daily_reconciliations(&self) -> Result<Arc<DailyReconciliationRepository>> {
        self.cached(DailyReconciliationRepository::new)
    }

    pub fn audit_logs(&self) -> Result<Arc<AuditLogRepository>> {
        self.cached(AuditLogRepository::new)
    }

    /// Persist every staged change atomically and return how many were written
    #[instrument(skip_all, fields(uow = %self.id))]
    pub async fn save_changes(&self, cancel: &CancellationToken) -> Result<u64> {
        cancellable(cancel, "save_changes", async {
            let mut context = self.context()?.lock().await;
            context.flush(None).await
        })
        .await
    }

    /// Like [`Self::save_changes`], recording `user_id` in the audit trail
    pub async fn save_changes_for_user(&self, user_id: &str, cancel: &CancellationToken) -> Result<u64> {
        self.save_changes_with_audit(user_id, Some(audit_logs::SAVE_CHANGES_OPERATION), cancel)
            .await
    }

    /// Persist every staged change plus one audit entry, all or nothing.
    ///
    /// The entry is tagged `operation` (`BULK_OPERATION` when `None`) and its
    /// change count is the number of staged data changes. The returned count
    /// includes the audit row.
    #[instrument(skip(self, cancel), fields(uow = %self.id))]
    pub async fn save_changes_with_audit(
        &self,
        user_id: &str,
        operation: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        if user_id.trim().is_empty() {
            return Err(DataError::argument("an audited save needs a user id"));
        }
        let operation = operation.unwrap_or(audit_logs::DEFAULT_AUDIT_OPERATION);
        cancellable(cancel, "save_changes_with_audit", async {
            let mut context = self.context()?.lock().await;
            let audit = AuditEntry::for_batch(operation, user_id, &context.tracker().summary())?;
            context.flush(Some(audit)).await
        })
        .await
    }

    /// Open an explicit transaction; reads, raw SQL and saves run inside it
    /// until it is committed or rolled back
    #[instrument(skip_all, fields(uow = %self.id))]
    pub async fn begin_transaction(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "begin_transaction", async {
            self.context()?.lock().await.begin_transaction().await
        })
        .await
    }

    #[instrument(skip_all, fields(uow = %self.id))]
    pub async fn commit_transaction(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "commit_transaction", async {
            self.context()?.lock().await.commit_transaction().await
        })
        .await
    }

    #[instrument(skip_all, fields(uow = %self.id))]
    pub async fn rollback_transaction(&self, cancel: &CancellationToken) -> Result<()> {
        cancellable(cancel, "rollback_transaction", async {
            self.context()?.lock().await.rollback_transaction().await
        })
        .await
    }

    /// Run a statement directly, bypassing change tracking. `?` placeholders
    /// are bound from `params` in order. Returns the affected row count.
    #[instrument(skip(self, params, cancel), fields(uow = %self.id, params = params.len()))]
    pub async fn execute_sql_raw(&self, sql: &str, params: &[SqlValue], cancel: &CancellationToken) -> Result<u64> {
        cancellable(cancel, "execute_sql_raw", async {
            let mut context = self.context()?.lock().await;
            context
                .execute_raw(sql, params.to_vec())
                .await
                .map_err(|e| DataError::data_access("UnitOfWork", "execute_sql_raw", e).logged())
        })
        .await
    }

    pub async fn has_active_transaction(&self) -> Result<bool> {
        Ok(self.context()?.lock().await.has_active_transaction())
    }

    /// Number of staged, unsaved changes
    pub async fn pending_changes_count(&self) -> Result<usize> {
        Ok(self.context()?.lock().await.tracker().len())
    }

    /// Keys the store assigned to keyless inserts of `T` during the last
    /// successful save, in the order they were added
    pub async fn assigned_keys<T: Entity>(&self) -> Result<Vec<i64>> {
        Ok(self.context()?.lock().await.assigned_keys::<T>())
    }

    /// Staged change counts per table
    pub async fn change_summary(&self) -> Result<BTreeMap<&'static str, ChangeCounts>> {
        Ok(self.context()?.lock().await.tracker().summary())
    }

    /// Roll back any active transaction, drop staged changes and release the
    /// context. Calling it again does nothing.
    #[instrument(skip_all, fields(uow = %self.id))]
    pub async fn dispose(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        self.repositories.lock().clear();
        context.lock().await.release().await;
        info!("Unit of work disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.context.is_none()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        let Some(context) = self.context.take() else {
            return;
        };
        // the dropped sqlx transaction rolls itself back when its connection returns to the pool
        if let Ok(context) = context.try_lock() {
            if context.has_active_transaction() {
                warn!(uow = %self.id, "Unit of work dropped with an active transaction; rolling back");
            }
        }
    }
}
