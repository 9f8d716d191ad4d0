//! SQLite storage backend for turnstile
//!
//! Provides [`SqliteRepositoryProvider`], which implements the user lookup and
//! login attempt repositories from `turnstile-core` on top of a `sqlx` pool,
//! plus the schema migrations they need.
//!
//! ```rust,no_run
//! use turnstile_core::RepositoryProvider;
//! use turnstile_storage_sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let storage = SqliteStorage::connect("sqlite::memory:").await?;
//! let repositories = storage.into_repository_provider();
//! repositories.migrate().await?;
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod repositories;

pub use repositories::{
    SqliteLoginAttemptRepository, SqliteRepositoryProvider, SqliteUserRepository,
};

use sqlx::SqlitePool;
use sqlx::sqlite::SqliteConnectOptions;
use std::str::FromStr;
use turnstile_core::{Error, error::StorageError};

/// A connected SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to `url`, creating the database file if it does not exist.
    pub async fn connect(url: &str) -> Result<Self, Error> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Storage(StorageError::Connection(e.to_string())))?
            .create_if_missing(true);

        let pool = SqlitePool::connect_with(options).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to SQLite");
            Error::Storage(StorageError::Connection(e.to_string()))
        })?;

        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn into_repository_provider(self) -> SqliteRepositoryProvider {
        SqliteRepositoryProvider::new(self.pool)
    }
}
