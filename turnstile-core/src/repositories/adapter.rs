use crate::{
    Error,
    attempt::{LoginAttempt, NewLoginAttempt},
    repositories::{LoginAttemptRepository, RepositoryProvider, UserRepository},
    user::{NewUser, User, UserCredentials},
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Adapter that wraps a RepositoryProvider and implements UserRepository
pub struct UserRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> UserRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> UserRepository for UserRepositoryAdapter<R> {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, Error> {
        self.provider.user().find_by_email(email).await
    }

    async fn create(&self, user: NewUser) -> Result<User, Error> {
        self.provider.user().create(user).await
    }
}

/// Adapter that wraps a RepositoryProvider and implements LoginAttemptRepository
pub struct LoginAttemptRepositoryAdapter<R: RepositoryProvider> {
    provider: Arc<R>,
}

impl<R: RepositoryProvider> LoginAttemptRepositoryAdapter<R> {
    pub fn new(provider: Arc<R>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl<R: RepositoryProvider> LoginAttemptRepository for LoginAttemptRepositoryAdapter<R> {
    async fn insert(
        &self,
        attempt: NewLoginAttempt,
        occurred_at: DateTime<Utc>,
    ) -> Result<LoginAttempt, Error> {
        self.provider
            .login_attempt()
            .insert(attempt, occurred_at)
            .await
    }

    async fn find_by_email_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, Error> {
        self.provider
            .login_attempt()
            .find_by_email_since(email, since)
            .await
    }

    async fn delete_failures(&self, email: &str) -> Result<u64, Error> {
        self.provider.login_attempt().delete_failures(email).await
    }

    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        self.provider
            .login_attempt()
            .delete_older_than(before)
            .await
    }
}
