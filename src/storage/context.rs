//! Persistence context
//!
//! The per-unit-of-work handle to the store: the shared pool, the change
//! tracker and the optional explicit transaction. Reads and raw statements run
//! inside the explicit transaction when one is active so they observe its
//! uncommitted writes.
//!
//! The context also remembers the row versions its own saves produced. A
//! caller that keeps editing a value it already saved through this context is
//! rebased onto the version it wrote, so only writes made elsewhere surface as
//! concurrency conflicts.

use std::collections::HashMap;

use sqlx::{
    Connection, FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool, Transaction,
    sqlite::SqliteRow,
};
use tracing::{debug, info, instrument};

use crate::entities::{AuditEntry, Entity};
use crate::error::{DataError, Result};
use crate::repositories::query_builder::quote_ident;
use crate::storage::SqlValue;
use crate::storage::tracker::{ChangeTracker, EntityState, TrackedEntity};

// extended result code for a write attempted from a stale WAL snapshot
const SQLITE_BUSY_SNAPSHOT: &str = "517";

/// `(table, key, replaced version)`
type VersionKey = (&'static str, i64, i64);

/// Row versions written by this context's saves
#[derive(Debug, Default)]
struct VersionLedger {
    committed: HashMap<VersionKey, i64>,
    /// Written inside the explicit transaction; dropped if it rolls back
    in_transaction: HashMap<VersionKey, i64>,
}

impl VersionLedger {
    /// Follow the chain of versions this context wrote starting at `version`
    fn current(&self, table: &'static str, key: i64, version: i64) -> i64 {
        let mut version = version;
        while let Some(next) = self
            .in_transaction
            .get(&(table, key, version))
            .or_else(|| self.committed.get(&(table, key, version)))
        {
            version = *next;
        }
        version
    }
}

/// What one successful flush wrote
#[derive(Debug, Default)]
struct FlushOutcome {
    written: u64,
    versions: Vec<(VersionKey, i64)>,
    assigned_keys: Vec<(&'static str, i64)>,
}

pub struct PersistenceContext {
    pool: SqlitePool,
    tracker: ChangeTracker,
    transaction: Option<Transaction<'static, Sqlite>>,
    versions: VersionLedger,
    assigned_keys: Vec<(&'static str, i64)>,
}

impl PersistenceContext {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            tracker: ChangeTracker::new(),
            transaction: None,
            versions: VersionLedger::default(),
            assigned_keys: Vec::new(),
        }
    }

    pub fn tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut ChangeTracker {
        &mut self.tracker
    }

    pub fn has_active_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Stage an update, rebased onto any version this context already wrote
    pub(crate) fn stage_modified<T: Entity>(&mut self, entity: T) -> Result<()> {
        let entity = self.rebase(entity);
        self.tracker.stage_modified(entity)
    }

    /// Stage a removal, rebased like [`Self::stage_modified`]
    pub(crate) fn stage_deleted<T: Entity>(&mut self, entity: T) -> Result<()> {
        let entity = self.rebase(entity);
        self.tracker.stage_deleted(entity)
    }

    fn rebase<T: Entity>(&self, mut entity: T) -> T {
        if let (Some(key), Some(version)) = (entity.key(), entity.version()) {
            let current = self.versions.current(T::TABLE, key, version);
            if current != version {
                debug!(entity = T::NAME, key, from = version, to = current, "Rebasing onto saved version");
                entity.set_version(current);
            }
        }
        entity
    }

    /// Keys the store assigned to keyless inserts of `T` in the last
    /// successful save, in staging order
    pub fn assigned_keys<T: Entity>(&self) -> Vec<i64> {
        self.assigned_keys
            .iter()
            .filter(|(table, _)| *table == T::TABLE)
            .map(|(_, key)| *key)
            .collect()
    }

    pub(crate) async fn fetch_all<T>(&mut self, builder: &mut QueryBuilder<'_, Sqlite>) -> Result<Vec<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let query = builder.build_query_as::<T>();
        match self.transaction.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        }
    }

    pub(crate) async fn fetch_optional<T>(
        &mut self,
        builder: &mut QueryBuilder<'_, Sqlite>,
    ) -> Result<Option<T>, sqlx::Error>
    where
        T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
    {
        let query = builder.build_query_as::<T>();
        match self.transaction.as_mut() {
            Some(tx) => query.fetch_optional(&mut **tx).await,
            None => query.fetch_optional(&self.pool).await,
        }
    }

    pub(crate) async fn fetch_scalar(&mut self, builder: &mut QueryBuilder<'_, Sqlite>) -> Result<i64, sqlx::Error> {
        let query = builder.build_query_scalar::<i64>();
        match self.transaction.as_mut() {
            Some(tx) => query.fetch_one(&mut **tx).await,
            None => query.fetch_one(&self.pool).await,
        }
    }

    /// Run a statement that bypasses the change tracker
    pub(crate) async fn execute_raw(&mut self, sql: &str, params: Vec<SqlValue>) -> Result<u64, sqlx::Error> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = param.bind_to(query);
        }
        let result = match self.transaction.as_mut() {
            Some(tx) => query.execute(&mut **tx).await?,
            None => query.execute(&self.pool).await?,
        };
        Ok(result.rows_affected())
    }

    pub(crate) async fn begin_transaction(&mut self) -> Result<()> {
        if self.transaction.is_some() {
            return Err(DataError::invalid_operation("a transaction is already active").logged());
        }
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DataError::data_access("UnitOfWork", "begin_transaction", e).logged())?;
        self.transaction = Some(tx);
        debug!("Transaction started");
        Ok(())
    }

    pub(crate) async fn commit_transaction(&mut self) -> Result<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| DataError::invalid_operation("no transaction is active to commit").logged())?;
        // the transaction handle is consumed either way, so the tracker goes with it
        self.tracker.clear();
        let written = std::mem::take(&mut self.versions.in_transaction);
        tx.commit()
            .await
            .map_err(|e| DataError::data_access("UnitOfWork", "commit_transaction", e).logged())?;
        self.versions.committed.extend(written);
        info!("Transaction committed");
        Ok(())
    }

    pub(crate) async fn rollback_transaction(&mut self) -> Result<()> {
        let tx = self
            .transaction
            .take()
            .ok_or_else(|| DataError::invalid_operation("no transaction is active to roll back").logged())?;
        self.tracker.clear();
        self.versions.in_transaction.clear();
        self.assigned_keys.clear();
        tx.rollback()
            .await
            .map_err(|e| DataError::data_access("UnitOfWork", "rollback_transaction", e).logged())?;
        info!("Transaction rolled back");
        Ok(())
    }

    /// Write every staged change, followed by `audit` when given, as one atomic
    /// unit. Returns the number of state changes written, audit row included.
    ///
    /// Outside an explicit transaction a store transaction wraps the flush;
    /// inside one a savepoint does, so a failed flush leaves the outer
    /// transaction usable. The tracker is cleared only on success.
    #[instrument(skip_all, fields(staged = self.tracker.len(), audited = audit.is_some()))]
    pub(crate) async fn flush(&mut self, audit: Option<AuditEntry>) -> Result<u64> {
        let in_transaction = self.transaction.is_some();
        let outcome = match self.transaction.as_mut() {
            Some(outer) => {
                let mut savepoint = Connection::begin(&mut **outer)
                    .await
                    .map_err(|e| DataError::data_access("UnitOfWork", "save_changes", e).logged())?;
                match apply_changes(&mut savepoint, &self.tracker, audit.as_ref()).await {
                    Ok(outcome) => {
                        savepoint
                            .commit()
                            .await
                            .map_err(|e| DataError::data_access("UnitOfWork", "save_changes", e).logged())?;
                        outcome
                    }
                    Err(err) => {
                        let _ = savepoint.rollback().await;
                        return Err(err);
                    }
                }
            }
            None => {
                let mut tx = self
                    .pool
                    .begin()
                    .await
                    .map_err(|e| DataError::data_access("UnitOfWork", "save_changes", e).logged())?;
                match apply_changes(&mut tx, &self.tracker, audit.as_ref()).await {
                    Ok(outcome) => {
                        tx.commit()
                            .await
                            .map_err(|e| DataError::data_access("UnitOfWork", "save_changes", e).logged())?;
                        outcome
                    }
                    Err(err) => {
                        let _ = tx.rollback().await;
                        return Err(err);
                    }
                }
            }
        };
        self.tracker.clear();
        let ledger = if in_transaction {
            &mut self.versions.in_transaction
        } else {
            &mut self.versions.committed
        };
        ledger.extend(outcome.versions);
        self.assigned_keys = outcome.assigned_keys;
        info!(written = outcome.written, "Changes saved");
        Ok(outcome.written)
    }

    /// Roll back anything in flight and forget all staged state
    pub(crate) async fn release(&mut self) {
        self.tracker.clear();
        self.versions = VersionLedger::default();
        self.assigned_keys.clear();
        if let Some(tx) = self.transaction.take() {
            match tx.rollback().await {
                Ok(()) => info!("Active transaction rolled back on dispose"),
                Err(e) => DataError::data_access("UnitOfWork", "dispose", e).log(),
            }
        }
    }
}

async fn apply_changes(
    conn: &mut SqliteConnection,
    tracker: &ChangeTracker,
    audit: Option<&AuditEntry>,
) -> Result<FlushOutcome> {
    let mut outcome = FlushOutcome::default();
    for entry in tracker.entries() {
        let entity = entry.entity.as_ref();
        match entry.state {
            EntityState::Added => {
                if let Some(key) = insert(conn, entity).await? {
                    outcome.assigned_keys.push((entity.table(), key));
                }
            }
            EntityState::Modified => {
                if let Some(written) = update(conn, entity).await? {
                    outcome.versions.push(written);
                }
            }
            EntityState::Deleted => delete(conn, entity).await?,
        }
        outcome.written += 1;
    }
    if let Some(audit) = audit {
        insert(conn, audit).await?;
        outcome.written += 1;
    }
    Ok(outcome)
}

/// Insert one row, returning the key the store assigned when the entity had none
async fn insert(conn: &mut SqliteConnection, entity: &dyn TrackedEntity) -> Result<Option<i64>> {
    let mut columns: Vec<&str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    if let Some(key) = entity.tracked_key() {
        columns.push(entity.key_column());
        values.push(SqlValue::Integer(key));
    }
    columns.extend_from_slice(entity.columns());
    values.extend(entity.column_values());
    if let (Some(column), Some(version)) = (entity.version_column(), entity.tracked_version()) {
        columns.push(column);
        values.push(SqlValue::Integer(version));
    }

    let mut builder = QueryBuilder::<Sqlite>::new("INSERT INTO ");
    builder.push(quote_ident(entity.table())?);
    builder.push(" (");
    builder.push(
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Result<Vec<_>>>()?
            .join(", "),
    );
    builder.push(") VALUES (");
    for (i, value) in values.into_iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        value.push_bind(&mut builder);
    }
    builder.push(")");

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| DataError::data_access(entity.entity_name(), "insert", e).logged())?;
    let key = result.last_insert_rowid();
    debug!(entity = entity.entity_name(), key, "Inserted");
    Ok(entity.tracked_key().is_none().then_some(key))
}

/// Update one row, returning the version it replaced and the one it wrote
async fn update(conn: &mut SqliteConnection, entity: &dyn TrackedEntity) -> Result<Option<(VersionKey, i64)>> {
    let key = entity
        .tracked_key()
        .ok_or_else(|| DataError::argument(format!("cannot update a {} without a key", entity.entity_name())))?;

    let mut builder = QueryBuilder::<Sqlite>::new("UPDATE ");
    builder.push(quote_ident(entity.table())?);
    builder.push(" SET ");
    for (i, (column, value)) in entity.columns().iter().zip(entity.column_values()).enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        builder.push(quote_ident(column)?);
        builder.push(" = ");
        value.push_bind(&mut builder);
    }
    if let Some(column) = entity.version_column() {
        let column = quote_ident(column)?;
        if !entity.columns().is_empty() {
            builder.push(", ");
        }
        builder.push(format!("{column} = {column} + 1"));
    }
    push_identity_match(&mut builder, entity, key)?;

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(entity, "update", key, e))?;
    if result.rows_affected() == 0 {
        return Err(DataError::concurrency(entity.entity_name(), Some(key)).logged());
    }
    Ok(entity
        .version_column()
        .and(entity.tracked_version())
        .map(|version| ((entity.table(), key, version), version + 1)))
}

async fn delete(conn: &mut SqliteConnection, entity: &dyn TrackedEntity) -> Result<()> {
    let key = entity
        .tracked_key()
        .ok_or_else(|| DataError::argument(format!("cannot delete a {} without a key", entity.entity_name())))?;

    let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM ");
    builder.push(quote_ident(entity.table())?);
    push_identity_match(&mut builder, entity, key)?;

    let result = builder
        .build()
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(entity, "delete", key, e))?;
    if result.rows_affected() == 0 {
        return Err(DataError::concurrency(entity.entity_name(), Some(key)).logged());
    }
    Ok(())
}

// a stale snapshot means another connection changed the store under the open transaction
fn write_error(entity: &dyn TrackedEntity, operation: &'static str, key: i64, source: sqlx::Error) -> DataError {
    let stale_snapshot = source
        .as_database_error()
        .and_then(|e| e.code())
        .is_some_and(|code| code == SQLITE_BUSY_SNAPSHOT);
    if stale_snapshot {
        DataError::concurrency(entity.entity_name(), Some(key)).logged()
    } else {
        DataError::data_access(entity.entity_name(), operation, source).logged()
    }
}

// WHERE key = ? [AND version = ?]
fn push_identity_match(builder: &mut QueryBuilder<'_, Sqlite>, entity: &dyn TrackedEntity, key: i64) -> Result<()> {
    builder.push(" WHERE ");
    builder.push(quote_ident(entity.key_column())?);
    builder.push(" = ");
    builder.push_bind(key);
    if let (Some(column), Some(version)) = (entity.version_column(), entity.tracked_version()) {
        builder.push(" AND ");
        builder.push(quote_ident(column)?);
        builder.push(" = ");
        builder.push_bind(version);
    }
    Ok(())
}
