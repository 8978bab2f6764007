use std::{str::FromStr, sync::Arc, time::Duration};

use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
};
use tracing::{info, instrument};

use crate::config::DataConfig;
use crate::error::{DataError, Result};
use crate::unit_of_work::UnitOfWorkFactory;

/// DatabaseManager handles SQLite connection pooling and schema setup
#[derive(Clone)]
pub struct DatabaseManager {
    /// Connection pool for SQLite
    pub pool: Pool<Sqlite>,
    /// Connection string the pool was opened with
    pub database_url: Arc<str>,
}

impl DatabaseManager {
    /// Open a connection pool to the database named by `config`
    #[instrument(skip(config), fields(url = %config.database_url), err)]
    pub async fn connect(config: &DataConfig) -> Result<Self> {
        config.validate()?;
        info!("Initializing database");

        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| DataError::data_access("DatabaseManager", "connect", e))?
            .foreign_keys(config.foreign_keys)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            // NORMAL is safe with WAL and avoids an fsync per commit
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(config.busy_timeout_ms));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await
            .map_err(|e| DataError::data_access("DatabaseManager", "connect", e).logged())?;

        Ok(Self {
            pool,
            database_url: config.database_url.as_str().into(),
        })
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn database_url(&self) -> &str {
        &self.database_url
    }

    /// Apply the bundled schema migrations
    #[instrument(skip(self))]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running migrations");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DataError::from(e).logged())?;
        Ok(())
    }

    /// Factory for units of work sharing this pool
    pub fn unit_of_work_factory(&self) -> UnitOfWorkFactory {
        UnitOfWorkFactory::new(self.pool.clone())
    }

    /// Close every pooled connection
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }

    /// Setup a migrated database in a fresh temporary directory.
    ///
    /// The directory guard must outlive the manager.
    #[cfg(test)]
    pub(crate) async fn setup_test_db() -> (DatabaseManager, tempfile::TempDir) {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let config = DataConfig::for_path(dir.path().join("test.db"));
        let db = DatabaseManager::connect(&config)
            .await
            .expect("Failed to initialize database");
        db.run_migrations().await.expect("Failed to run migrations");
        (db, dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn migrations_create_every_table() {
        let (db, _dir) = DatabaseManager::setup_test_db().await;
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name != '_sqlx_migrations' AND name NOT LIKE 'sqlite%' ORDER BY name",
        )
        .fetch_all(db.pool())
        .await
        .unwrap();
        assert_eq!(
            tables,
            vec![
                "audit_logs",
                "customers",
                "daily_reconciliations",
                "invoices",
                "payments",
                "truck_loads",
                "trucks",
            ]
        );
    }

    #[tokio::test]
    async fn connect_rejects_invalid_config() {
        let config = DataConfig {
            max_connections: 0,
            ..DataConfig::default()
        };
        assert!(matches!(
            DatabaseManager::connect(&config).await,
            Err(DataError::Argument(_))
        ));
    }
}
