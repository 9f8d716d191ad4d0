use crate::{
    Error,
    user::{NewUser, User, UserCredentials},
};
use async_trait::async_trait;

/// Repository for the user lookups sign-in needs
#[async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// Find a user and their stored password hash by email.
    ///
    /// Matching is case-insensitive. Returns `None` when no account exists.
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, Error>;

    /// Create a new user with an already hashed password
    async fn create(&self, user: NewUser) -> Result<User, Error>;
}
