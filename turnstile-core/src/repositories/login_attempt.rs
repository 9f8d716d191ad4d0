//! Repository trait for the login attempt log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    attempt::{LoginAttempt, NewLoginAttempt},
};

/// Append-only storage for authentication attempts.
///
/// Lockout state is never stored. It is recomputed from the rows returned by
/// [`find_by_email_since`](LoginAttemptRepository::find_by_email_since), so
/// concurrent inserts can never lose a failure.
///
/// # Security Considerations
///
/// - Attempts are recorded for every email, including ones with no account,
///   so the log itself does not reveal which accounts exist.
/// - Origin keys are usually IP addresses and may be subject to data
///   retention regulations.
#[async_trait]
pub trait LoginAttemptRepository: Send + Sync + 'static {
    /// Insert one attempt stamped with `occurred_at`.
    ///
    /// # Returns
    ///
    /// The stored record with its assigned ID.
    async fn insert(
        &self,
        attempt: NewLoginAttempt,
        occurred_at: DateTime<Utc>,
    ) -> Result<LoginAttempt, Error>;

    /// All attempts for `email` with `occurred_at >= since`, oldest first.
    async fn find_by_email_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, Error>;

    /// Delete every failed attempt for `email`.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn delete_failures(&self, email: &str) -> Result<u64, Error>;

    /// Delete attempts with `occurred_at < before`, for all emails.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, Error>;
}
