//! Entity model
//!
//! Every persisted record implements [`Entity`], usually through
//! `#[derive(Entity)]`. The trait carries just enough metadata for the generic
//! repository and the change tracker to build SQL for any record type.

use std::fmt::Debug;

use sqlx::{FromRow, sqlite::SqliteRow};

use crate::storage::SqlValue;

pub mod audit_logs;
pub mod customers;
pub mod daily_reconciliations;
pub mod invoices;
pub mod payments;
pub mod truck_loads;
pub mod trucks;

pub use audit_logs::AuditEntry;
pub use customers::Customer;
pub use daily_reconciliations::DailyReconciliation;
pub use invoices::{Invoice, InvoiceStatus};
pub use payments::Payment;
pub use truck_loads::TruckLoad;
pub use trucks::Truck;

/// A record type with an integer identity, persisted in one table.
///
/// A key of `0` means the store has not assigned one yet.
pub trait Entity:
    Debug + Clone + Send + Sync + Unpin + 'static + for<'r> FromRow<'r, SqliteRow>
{
    /// Type name used in logs and errors
    const NAME: &'static str;
    /// Table the entity lives in
    const TABLE: &'static str;
    /// Primary key column
    const KEY: &'static str;
    /// Non-key, non-version columns, in the order of [`Entity::values`]
    const COLUMNS: &'static [&'static str];
    /// Optimistic concurrency column, if the entity has one
    const VERSION: Option<&'static str> = None;

    /// The identity, or `None` while it is still store-assigned
    fn key(&self) -> Option<i64>;

    /// Current concurrency token
    fn version(&self) -> Option<i64> {
        None
    }

    /// Replace the concurrency token; a no-op for unversioned entities
    fn set_version(&mut self, _version: i64) {}

    /// Column values matching [`Entity::COLUMNS`]
    fn values(&self) -> Vec<SqlValue>;

    /// Every column a full entity load needs
    fn select_columns() -> Vec<&'static str> {
        let mut columns = Vec::with_capacity(Self::COLUMNS.len() + 2);
        columns.push(Self::KEY);
        columns.extend_from_slice(Self::COLUMNS);
        if let Some(version) = Self::VERSION {
            columns.push(version);
        }
        columns
    }
}
