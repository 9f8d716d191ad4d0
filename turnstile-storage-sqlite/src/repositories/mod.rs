//! Repository implementations for SQLite storage

pub mod login_attempt;
pub mod user;

pub use login_attempt::SqliteLoginAttemptRepository;
pub use user::SqliteUserRepository;

use async_trait::async_trait;
use sqlx::SqlitePool;
use std::sync::Arc;
use turnstile_core::{
    Error,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::{LoginAttemptRepositoryProvider, RepositoryProvider, UserRepositoryProvider},
};

/// Repository provider implementation for SQLite
///
/// This struct implements all the individual repository provider traits
/// as well as the unified `RepositoryProvider` trait.
pub struct SqliteRepositoryProvider {
    pool: SqlitePool,
    user: Arc<SqliteUserRepository>,
    login_attempt: Arc<SqliteLoginAttemptRepository>,
}

impl SqliteRepositoryProvider {
    pub fn new(pool: SqlitePool) -> Self {
        let user = Arc::new(SqliteUserRepository::new(pool.clone()));
        let login_attempt = Arc::new(SqliteLoginAttemptRepository::new(pool.clone()));

        Self {
            pool,
            user,
            login_attempt,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

impl UserRepositoryProvider for SqliteRepositoryProvider {
    type UserRepo = SqliteUserRepository;

    fn user(&self) -> &Self::UserRepo {
        &self.user
    }
}

impl LoginAttemptRepositoryProvider for SqliteRepositoryProvider {
    type LoginAttemptRepo = SqliteLoginAttemptRepository;

    fn login_attempt(&self) -> &Self::LoginAttemptRepo {
        &self.login_attempt
    }
}

#[async_trait]
impl RepositoryProvider for SqliteRepositoryProvider {
    async fn migrate(&self) -> Result<(), Error> {
        use crate::migrations::{SqliteMigrationManager, all_migrations};
        use turnstile_migration::MigrationManager;

        let manager = SqliteMigrationManager::new(self.pool.clone());
        manager.initialize().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to initialize migrations");
            Error::Storage(StorageError::Migration(
                "Failed to initialize migrations".to_string(),
            ))
        })?;

        manager.up(&all_migrations()).await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            Error::Storage(StorageError::Migration(
                "Failed to run migrations".to_string(),
            ))
        })?;

        Ok(())
    }

    async fn health_check(&self) -> Result<(), Error> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Health check failed")?;
        Ok(())
    }
}
