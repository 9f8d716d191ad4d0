//! # Turnstile
//!
//! Turnstile guards an email and password sign-in endpoint against two kinds
//! of abuse:
//!
//! - volumetric abuse from one network origin, stopped by a per-origin rate limiter
//! - password guessing against one account, stopped by a per-account lockout
//!
//! The credential check itself is timing-equalized: an unknown email costs one
//! argon2 comparison against a dummy hash, exactly like a wrong password, and
//! both produce the same `INVALID_CREDENTIALS` answer.
//!
//! ## Storage Support
//!
//! - SQLite (feature `sqlite`, enabled by default)
//!
//! Other backends plug in by implementing
//! [`RepositoryProvider`](turnstile_core::RepositoryProvider).
//!
//! ## Example
//!
//! ```rust,no_run
//! use turnstile::{SignInRequest, TurnstileBuilder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let turnstile = TurnstileBuilder::new()
//!         .with_sqlite("sqlite::memory:")
//!         .await?
//!         .apply_migrations(true)
//!         .build()
//!         .await?;
//!
//!     turnstile
//!         .create_user("alice@example.com", "correct horse battery", None)
//!         .await?;
//!
//!     let request = SignInRequest::new("alice@example.com", "correct horse battery")
//!         .with_origin_key("203.0.113.7");
//!     match turnstile.sign_in(request).await {
//!         Ok(user) => println!("Welcome {}", user.email),
//!         Err(e) => println!("{}: {e}", e.code()),
//!     }
//!     Ok(())
//! }
//! ```
use std::sync::Arc;

use serde::Serialize;
use turnstile_core::{
    Argon2HashComparator, Clock, LoginAttemptTracker, RateLimiter, RepositoryProvider,
    SignInService, SystemClock, UserService,
    repositories::{LoginAttemptRepositoryAdapter, UserRepositoryAdapter},
    validation::normalize_email,
};

mod builder;

pub use builder::{NoStorage, TurnstileBuilder, TurnstileBuilderError, WithStorage};

/// Re-export core types from turnstile_core
///
/// These types are commonly used when working with the Turnstile API.
pub use turnstile_core::{
    AttemptControlConfig, AuthenticatedUser, FailureCode, FailureReason, LockoutConfig,
    LockoutStatus, RateLimitConfig, RateLimitDecision, RetentionConfig, SignInError,
    SignInRequest, User, UserId,
};

/// Re-export storage backends
///
/// These storage implementations are available when the corresponding feature is enabled.
#[cfg(feature = "sqlite")]
pub use turnstile_storage_sqlite::{SqliteRepositoryProvider, SqliteStorage};

/// Errors from administrative operations on [`Turnstile`].
///
/// Sign-in itself never returns this type; it reports [`SignInError`].
#[derive(Debug, thiserror::Error)]
pub enum TurnstileError {
    /// Error during authentication or user provisioning
    #[error("Auth error: {0}")]
    AuthError(String),
    /// Invalid input
    #[error("Validation error: {0}")]
    ValidationError(String),
    /// Error when interacting with storage
    #[error("Storage error: {0}")]
    StorageError(String),
    /// Invalid or inconsistent configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<turnstile_core::Error> for TurnstileError {
    fn from(error: turnstile_core::Error) -> Self {
        use turnstile_core::Error;
        match error {
            Error::Auth(e) => TurnstileError::AuthError(e.to_string()),
            Error::Validation(e) => TurnstileError::ValidationError(e.to_string()),
            Error::Storage(e) => TurnstileError::StorageError(e.to_string()),
            Error::Config(e) => TurnstileError::ConfigError(e.to_string()),
            Error::Crypto(e) => TurnstileError::AuthError(e.to_string()),
        }
    }
}

/// What one cleanup pass removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub attempts_deleted: u64,
    pub rate_limit_windows_removed: usize,
}

type UserRepo<R> = UserRepositoryAdapter<R>;
type AttemptRepo<R> = LoginAttemptRepositoryAdapter<R>;

/// The assembled attempt-control subsystem.
///
/// Build one at process start with [`TurnstileBuilder`] and share it; every
/// method takes `&self` and is safe to call concurrently.
pub struct Turnstile<R: RepositoryProvider> {
    repositories: Arc<R>,
    rate_limiter: Arc<RateLimiter>,
    tracker: Arc<LoginAttemptTracker<AttemptRepo<R>>>,
    sign_in_service: SignInService<UserRepo<R>, AttemptRepo<R>, Argon2HashComparator>,
    user_service: UserService<UserRepo<R>, Argon2HashComparator>,
    config: AttemptControlConfig,
}

impl<R: RepositoryProvider> Turnstile<R> {
    /// Create a new Turnstile instance with default configuration and the system clock
    ///
    /// Prefer [`TurnstileBuilder`], which also validates the configuration.
    pub fn new(repositories: Arc<R>) -> Self {
        Self::from_parts(
            repositories,
            AttemptControlConfig::default(),
            Arc::new(SystemClock),
        )
    }

    pub(crate) fn from_parts(
        repositories: Arc<R>,
        config: AttemptControlConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let user_repo = Arc::new(UserRepositoryAdapter::new(repositories.clone()));
        let attempt_repo = Arc::new(LoginAttemptRepositoryAdapter::new(repositories.clone()));

        let rate_limiter = Arc::new(RateLimiter::new(config.rate_limit.clone(), clock.clone()));
        let tracker = Arc::new(LoginAttemptTracker::new(
            attempt_repo,
            config.lockout.clone(),
            clock.clone(),
        ));
        let comparator = Arc::new(Argon2HashComparator::new());
        let sign_in_service = SignInService::new(
            user_repo.clone(),
            tracker.clone(),
            rate_limiter.clone(),
            comparator.clone(),
            clock,
        );

        Self {
            repositories,
            rate_limiter,
            tracker,
            sign_in_service,
            user_service: UserService::new(user_repo, comparator),
            config,
        }
    }

    pub fn config(&self) -> &AttemptControlConfig {
        &self.config
    }

    /// Run migrations for all repositories
    pub async fn migrate(&self) -> Result<(), TurnstileError> {
        Ok(self.repositories.migrate().await?)
    }

    /// Health check for all repositories
    pub async fn health_check(&self) -> Result<(), TurnstileError> {
        Ok(self.repositories.health_check().await?)
    }

    /// Authenticate a user with email and password
    ///
    /// See [`SignInService::sign_in`] for the order of checks.
    pub async fn sign_in(&self, request: SignInRequest) -> Result<AuthenticatedUser, SignInError> {
        self.sign_in_service.sign_in(request).await
    }

    /// Provision a user that can sign in
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<User, TurnstileError> {
        Ok(self.user_service.create_user(email, password, name).await?)
    }

    /// Current lockout status for an email
    pub async fn check_lockout(&self, email: &str) -> Result<LockoutStatus, TurnstileError> {
        Ok(self.tracker.check_lockout(&normalize_email(email)).await?)
    }

    /// Administratively unlock an account by deleting its failed attempts
    ///
    /// # Returns
    ///
    /// The number of failure records deleted.
    pub async fn reset_attempts(&self, email: &str) -> Result<u64, TurnstileError> {
        Ok(self.tracker.reset_attempts(&normalize_email(email)).await?)
    }

    /// Clear the rate-limit window of one origin. Returns whether it was tracked.
    pub fn reset_rate_limit(&self, origin_key: &str) -> bool {
        self.rate_limiter.reset(origin_key)
    }

    /// Remove attempt records past retention and elapsed rate-limit windows
    pub async fn cleanup(&self) -> Result<CleanupReport, TurnstileError> {
        let attempts_deleted = self.tracker.cleanup(self.config.retention.period).await?;
        let rate_limit_windows_removed = self.rate_limiter.cleanup();

        tracing::info!(
            attempts_deleted,
            rate_limit_windows_removed,
            "Cleanup finished"
        );

        Ok(CleanupReport {
            attempts_deleted,
            rate_limit_windows_removed,
        })
    }

    /// Start the hourly background cleanup task
    ///
    /// The task stops when `shutdown` receives a value.
    pub fn start_cleanup_task(
        &self,
        shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        self.tracker.start_cleanup_task(
            self.rate_limiter.clone(),
            self.config.retention.period,
            shutdown,
        )
    }
}
