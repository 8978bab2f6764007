//! Unit of work factory
//!
//! Hands out units of work that share one connection pool. Cloning the
//! factory is cheap, so it can be registered once and passed around freely.

use sqlx::{Pool, Sqlite};

use crate::unit_of_work::UnitOfWork;

/// Factory for units of work
#[derive(Clone)]
pub struct UnitOfWorkFactory {
    /// Database connection pool
    pool: Pool<Sqlite>,
}

impl UnitOfWorkFactory {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Get the database connection pool
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Start a new unit of work with its own persistence context
    pub fn create(&self) -> UnitOfWork {
        UnitOfWork::new(self.pool.clone())
    }
}
