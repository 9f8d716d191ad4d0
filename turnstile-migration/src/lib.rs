//! Versioned schema migrations shared by turnstile storage backends.
//!
//! A backend lists its migrations as `Box<dyn Migration<DB>>` in ascending
//! version order and hands them to its [`MigrationManager`], which records
//! applied versions in the `_turnstile_migrations` table.

use async_trait::async_trait;
use sqlx::Database;
use thiserror::Error;
use turnstile_core::error::StorageError;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Migration failed: {0}")]
    Migration(String),
    #[error("Migration versions must be unique and ascending, found {found} after {previous}")]
    OutOfOrder { previous: i64, found: i64 },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type Result<T> = std::result::Result<T, MigrationError>;

impl From<MigrationError> for turnstile_core::Error {
    fn from(error: MigrationError) -> Self {
        turnstile_core::Error::Storage(StorageError::Migration(error.to_string()))
    }
}

#[async_trait]
pub trait Migration<DB: Database>: Send + Sync {
    /// Execute the migration
    async fn up<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Rollback the migration
    async fn down<'a>(&'a self, conn: &'a mut <DB as Database>::Connection) -> Result<()>;

    /// Unique version number for ordering migrations
    fn version(&self) -> i64;

    /// Human readable name of the migration
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    /// Unix timestamp in seconds
    pub applied_at: i64,
}

/// Check that `versions` is strictly ascending.
pub fn validate_versions(versions: impl IntoIterator<Item = i64>) -> Result<()> {
    let mut previous: Option<i64> = None;
    for version in versions {
        if let Some(previous) = previous {
            if version <= previous {
                return Err(MigrationError::OutOfOrder {
                    previous,
                    found: version,
                });
            }
        }
        previous = Some(version);
    }
    Ok(())
}

/// Versions from `available` that do not appear in `applied`, in order.
pub fn pending_versions(available: &[i64], applied: &[MigrationRecord]) -> Vec<i64> {
    available
        .iter()
        .copied()
        .filter(|version| !applied.iter().any(|record| record.version == *version))
        .collect()
}

#[async_trait]
pub trait MigrationManager<DB: Database>: Send + Sync {
    fn get_migration_table_name(&self) -> &str {
        "_turnstile_migrations"
    }

    /// Initialize migration tracking table
    async fn initialize(&self) -> Result<()>;

    /// Apply pending migrations
    async fn up(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Rollback applied migrations, newest first
    async fn down(&self, migrations: &[Box<dyn Migration<DB>>]) -> Result<()>;

    /// Get list of applied migrations
    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>>;

    /// Check if specific migration was applied
    async fn is_applied(&self, version: i64) -> Result<bool>;
}
