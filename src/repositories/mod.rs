//! Repository pattern implementation for data access
//!
//! Every entity gets the generic [`Repository`] surface through
//! [`GenericRepository`]; entities with domain lookups get a specialized
//! repository that wraps the generic one. All repositories of one unit of
//! work share its persistence context.

pub mod audit_log_repository;
pub mod base;
pub mod customer_repository;
pub mod invoice_repository;
pub mod payment_repository;
pub mod query_builder;
pub mod reconciliation_repository;
pub mod truck_load_repository;
pub mod truck_repository;

#[cfg(test)]
pub mod tests;

// Re-export repositories for easier access
pub use audit_log_repository::AuditLogRepository;
pub use base::{GenericRepository, Repository};
pub use customer_repository::CustomerRepository;
pub use invoice_repository::InvoiceRepository;
pub use payment_repository::PaymentRepository;
pub use query_builder::{AggregateFunction, Filter, OrderBy, OrderDirection, Projection};
pub use reconciliation_repository::DailyReconciliationRepository;
pub use truck_load_repository::TruckLoadRepository;
pub use truck_repository::TruckRepository;
