//! Transactional data access for the haulage back office.
//!
//! Repositories stage changes against a per-unit-of-work persistence context;
//! a [`UnitOfWork`] writes them to SQLite in one transaction, optionally with
//! an audit entry recording who saved what.

pub mod config;
pub mod entities;
pub mod error;
pub mod logging;
pub mod provider;
pub mod repositories;
pub mod storage;
pub mod unit_of_work;
pub mod utils;

pub use config::DataConfig;
pub use error::{DataError, Result};
pub use provider::{ServiceLocator, ServiceProvider};
pub use repositories::{Filter, OrderBy, Projection, Repository};
pub use storage::{DatabaseManager, SqlValue};
pub use unit_of_work::{UnitOfWork, UnitOfWorkFactory};
