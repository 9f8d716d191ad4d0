//! Builder pattern for constructing Turnstile instances
//!
//! This module provides a type-safe builder for creating [`Turnstile`] instances with
//! compile-time validation of storage configuration.
//!
//! # Example
//!
//! ```rust,no_run
//! use turnstile::{LockoutConfig, TurnstileBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Configuration from TURNSTILE_* environment variables, auto-migration
//!     let turnstile = TurnstileBuilder::new()
//!         .with_sqlite("sqlite://turnstile.db")
//!         .await?
//!         .with_config_from_env()?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     // Or explicit configuration
//!     let turnstile = TurnstileBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .with_lockout(LockoutConfig {
//!             threshold: 3,
//!             ..Default::default()
//!         })
//!         .build()
//!         .await?;
//!     turnstile.migrate().await?;
//!
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use turnstile_core::{
    AttemptControlConfig, Clock, LockoutConfig, RateLimitConfig, RepositoryProvider,
    RetentionConfig, SystemClock,
};

use crate::Turnstile;

/// Errors that can occur when building a Turnstile instance.
#[derive(Debug, thiserror::Error)]
pub enum TurnstileBuilderError {
    /// Failed to connect to storage backend
    #[error("Storage connection failed: {0}")]
    StorageConnection(String),

    /// Failed to run database migrations
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Invalid configuration provided
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

/// Marker type indicating no storage has been configured yet.
///
/// This is the initial state of [`TurnstileBuilder`].
pub struct NoStorage;

/// Marker type indicating storage has been configured.
pub struct WithStorage<R: RepositoryProvider> {
    repositories: Arc<R>,
}

/// A type-safe builder for constructing [`Turnstile`] instances.
///
/// The type parameter tracks whether storage has been configured:
///
/// - [`NoStorage`]: Initial state, storage must be configured
/// - [`WithStorage<R>`]: Storage configured, ready to build or add more configuration
///
/// [`build`](TurnstileBuilder::build) validates the configuration, so an
/// inconsistent setup fails at startup instead of at the first sign-in.
pub struct TurnstileBuilder<Storage> {
    storage: Storage,
    config: AttemptControlConfig,
    clock: Arc<dyn Clock>,
    apply_migrations: bool,
}

impl Default for TurnstileBuilder<NoStorage> {
    fn default() -> Self {
        Self::new()
    }
}

impl TurnstileBuilder<NoStorage> {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            storage: NoStorage,
            config: AttemptControlConfig::default(),
            clock: Arc::new(SystemClock),
            apply_migrations: false,
        }
    }

    /// Use an existing repository provider, for custom storage backends.
    pub fn with_repositories<R: RepositoryProvider>(
        self,
        repositories: Arc<R>,
    ) -> TurnstileBuilder<WithStorage<R>> {
        TurnstileBuilder {
            storage: WithStorage { repositories },
            config: self.config,
            clock: self.clock,
            apply_migrations: self.apply_migrations,
        }
    }
}

#[cfg(feature = "sqlite")]
impl TurnstileBuilder<NoStorage> {
    /// Configure SQLite storage by connecting to the given URL.
    ///
    /// # Arguments
    ///
    /// * `url` - SQLite connection URL (e.g., "sqlite::memory:" or "sqlite://path/to/db.sqlite")
    pub async fn with_sqlite(
        self,
        url: &str,
    ) -> Result<
        TurnstileBuilder<WithStorage<turnstile_storage_sqlite::SqliteRepositoryProvider>>,
        TurnstileBuilderError,
    > {
        let storage = turnstile_storage_sqlite::SqliteStorage::connect(url)
            .await
            .map_err(|e| TurnstileBuilderError::StorageConnection(e.to_string()))?;

        Ok(self.with_repositories(Arc::new(storage.into_repository_provider())))
    }

    /// Configure SQLite storage with an existing connection pool.
    ///
    /// Use this when you already have a SQLite connection pool and want to
    /// share it with Turnstile.
    pub fn with_sqlite_pool(
        self,
        pool: sqlx::SqlitePool,
    ) -> TurnstileBuilder<WithStorage<turnstile_storage_sqlite::SqliteRepositoryProvider>> {
        self.with_repositories(Arc::new(
            turnstile_storage_sqlite::SqliteRepositoryProvider::new(pool),
        ))
    }
}

impl<R: RepositoryProvider> TurnstileBuilder<WithStorage<R>> {
    /// Replace the whole attempt-control configuration.
    pub fn with_config(mut self, config: AttemptControlConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the configuration from `TURNSTILE_*` environment variables.
    ///
    /// See [`AttemptControlConfig::from_env`] for the variables read.
    pub fn with_config_from_env(mut self) -> Result<Self, TurnstileBuilderError> {
        self.config = AttemptControlConfig::from_env()
            .map_err(|e| TurnstileBuilderError::InvalidConfiguration(e.to_string()))?;
        Ok(self)
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.config.rate_limit = config;
        self
    }

    pub fn with_lockout(mut self, config: LockoutConfig) -> Self {
        self.config.lockout = config;
        self
    }

    pub fn with_retention(mut self, config: RetentionConfig) -> Self {
        self.config.retention = config;
        self
    }

    /// Use a different time source, e.g. [`MockClock`](turnstile_core::MockClock) in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Set whether to automatically apply database migrations during build.
    ///
    /// Default: false
    ///
    /// When `false`, call `turnstile.migrate()` manually after building.
    pub fn apply_migrations(mut self, apply: bool) -> Self {
        self.apply_migrations = apply;
        self
    }

    /// Build the Turnstile instance.
    ///
    /// Validates the configuration, then applies migrations if
    /// `apply_migrations(true)` was called.
    pub async fn build(self) -> Result<Turnstile<R>, TurnstileBuilderError> {
        self.config
            .validate()
            .map_err(|e| TurnstileBuilderError::InvalidConfiguration(e.to_string()))?;

        if self.apply_migrations {
            self.storage
                .repositories
                .migrate()
                .await
                .map_err(|e| TurnstileBuilderError::Migration(e.to_string()))?;
        }

        Ok(Turnstile::from_parts(
            self.storage.repositories,
            self.config,
            self.clock,
        ))
    }
}
