//! Repository traits for data access layer
//!
//! This module defines the repository interfaces that services use to interact with storage.
//!
//! # Trait Hierarchy
//!
//! - Individual `*Repository` traits define the operations for each data domain
//! - Individual `*RepositoryProvider` traits provide access to each repository type
//! - [`RepositoryProvider`] is a supertrait combining all provider traits plus lifecycle methods

pub mod adapter;
pub mod login_attempt;
pub mod user;

pub use adapter::{LoginAttemptRepositoryAdapter, UserRepositoryAdapter};
pub use login_attempt::LoginAttemptRepository;
pub use user::UserRepository;

use async_trait::async_trait;

use crate::Error;

/// Provider trait for user repository access.
pub trait UserRepositoryProvider: Send + Sync + 'static {
    /// The user repository implementation type
    type UserRepo: UserRepository;

    /// Get the user repository
    fn user(&self) -> &Self::UserRepo;
}

/// Provider trait for login attempt repository access.
pub trait LoginAttemptRepositoryProvider: Send + Sync + 'static {
    /// The login attempt repository implementation type
    type LoginAttemptRepo: LoginAttemptRepository;

    /// Get the login attempt repository
    fn login_attempt(&self) -> &Self::LoginAttemptRepo;
}

/// Provider trait that storage implementations must implement to provide all repositories.
///
/// # Implementing a Custom Storage Backend
///
/// ```rust,ignore
/// use turnstile_core::repositories::*;
///
/// struct MyStorage { /* ... */ }
///
/// impl UserRepositoryProvider for MyStorage {
///     type UserRepo = MyUserRepository;
///     fn user(&self) -> &Self::UserRepo { &self.user_repo }
/// }
///
/// impl LoginAttemptRepositoryProvider for MyStorage {
///     type LoginAttemptRepo = MyLoginAttemptRepository;
///     fn login_attempt(&self) -> &Self::LoginAttemptRepo { &self.attempts }
/// }
///
/// #[async_trait]
/// impl RepositoryProvider for MyStorage {
///     async fn migrate(&self) -> Result<(), Error> { /* ... */ }
///     async fn health_check(&self) -> Result<(), Error> { /* ... */ }
/// }
/// ```
#[async_trait]
pub trait RepositoryProvider: UserRepositoryProvider + LoginAttemptRepositoryProvider {
    /// Run migrations for all repositories
    async fn migrate(&self) -> Result<(), Error>;

    /// Health check for all repositories
    async fn health_check(&self) -> Result<(), Error>;
}
