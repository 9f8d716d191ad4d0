use crate::{
    Error,
    crypto::HashComparator,
    error::CryptoError,
    repositories::UserRepository,
    user::{NewUser, User},
    validation::{normalize_email, validate_email, validate_name, validate_password},
};
use std::sync::Arc;

/// Service for provisioning users that can sign in
pub struct UserService<R: UserRepository, H: HashComparator> {
    repository: Arc<R>,
    hasher: Arc<H>,
}

impl<R: UserRepository, H: HashComparator> UserService<R, H> {
    /// Create a new UserService with the given repository
    ///
    /// `hasher` should be the comparator sign-in uses, so stored hashes match
    /// the parameters of its dummy hash.
    pub fn new(repository: Arc<R>, hasher: Arc<H>) -> Self {
        Self { repository, hasher }
    }

    /// Create a user with a password
    ///
    /// The email is normalized the same way sign-in normalizes it, and the
    /// password is hashed before it reaches storage.
    pub async fn create_user(
        &self,
        email: &str,
        password: &str,
        name: Option<String>,
    ) -> Result<User, Error> {
        let email = normalize_email(email);
        validate_email(&email)?;
        validate_password(password)?;
        validate_name(name.as_deref())?;

        let password_hash = self.hash_password(password).await?;
        let user = self
            .repository
            .create(NewUser::new(email, password_hash).with_name(name))
            .await?;

        tracing::info!(user_id = %user.id, email = %user.email, "Created user");
        Ok(user)
    }

    async fn hash_password(&self, password: &str) -> Result<String, Error> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(|e| Error::Crypto(CryptoError::PasswordHash(e.to_string())))
    }
}
