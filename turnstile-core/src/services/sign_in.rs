//! Email and password sign-in with attempt control.
//!
//! [`SignInService::sign_in`] runs a fixed sequence of checks:
//!
//! 1. **Rate limit** on the origin key, before any per-account state is read.
//! 2. **Lockout** check. A locked account is rejected even with the right password.
//! 3. **Input validation** of email and password.
//! 4. **User lookup** followed by exactly one hash comparison. Unknown emails
//!    are compared against the dummy hash so they cost the same as a wrong password.
//! 5. **Recording** of the outcome, then a lockout re-check after a failure.
//!
//! Callers never learn whether an email exists: both an unknown email and a
//! wrong password surface as [`SignInError::InvalidCredentials`]. The precise
//! reason is only written to the attempt log.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    attempt::{FailureReason, LockoutStatus, NewLoginAttempt},
    clock::Clock,
    crypto::HashComparator,
    repositories::{LoginAttemptRepository, UserRepository},
    services::{LoginAttemptTracker, RateLimiter},
    user::AuthenticatedUser,
    validation::{normalize_email, validate_email},
};

/// Credentials submitted by a client.
#[derive(Clone)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
    /// Network origin used for rate limiting, typically the client IP.
    pub origin_key: Option<String>,
}

impl SignInRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            origin_key: None,
        }
    }

    pub fn with_origin_key(mut self, origin_key: impl Into<String>) -> Self {
        self.origin_key = Some(origin_key.into());
        self
    }
}

impl std::fmt::Debug for SignInRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignInRequest")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .field("origin_key", &self.origin_key)
            .finish()
    }
}

/// Machine-readable sign-in failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    RateLimitExceeded,
    AccountLocked,
    EmptyEmail,
    InvalidEmail,
    EmptyPassword,
    InvalidCredentials,
    UnexpectedError,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            FailureCode::AccountLocked => "ACCOUNT_LOCKED",
            FailureCode::EmptyEmail => "EMPTY_EMAIL",
            FailureCode::InvalidEmail => "INVALID_EMAIL",
            FailureCode::EmptyPassword => "EMPTY_PASSWORD",
            FailureCode::InvalidCredentials => "INVALID_CREDENTIALS",
            FailureCode::UnexpectedError => "UNEXPECTED_ERROR",
        }
    }
}

impl std::fmt::Display for FailureCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a sign-in was refused, as shown to the caller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignInError {
    #[error("Too many sign-in attempts. Try again in {retry_after_seconds} seconds.")]
    RateLimitExceeded { retry_after_seconds: i64 },

    #[error("Account is temporarily locked. Try again in {retry_after_seconds} seconds.")]
    AccountLocked {
        locked_until: DateTime<Utc>,
        retry_after_seconds: i64,
    },

    #[error("Email is required.")]
    EmptyEmail,

    #[error("Email address is not valid.")]
    InvalidEmail,

    #[error("Password is required.")]
    EmptyPassword,

    #[error("Invalid email or password.{}", remaining_hint(.remaining_attempts))]
    InvalidCredentials { remaining_attempts: Option<u32> },

    #[error("An unexpected error occurred. Please try again.")]
    Unexpected,
}

fn remaining_hint(remaining_attempts: &Option<u32>) -> String {
    match remaining_attempts {
        Some(1) => " 1 attempt remaining.".to_string(),
        Some(n) => format!(" {n} attempts remaining."),
        None => String::new(),
    }
}

impl SignInError {
    pub fn code(&self) -> FailureCode {
        match self {
            SignInError::RateLimitExceeded { .. } => FailureCode::RateLimitExceeded,
            SignInError::AccountLocked { .. } => FailureCode::AccountLocked,
            SignInError::EmptyEmail => FailureCode::EmptyEmail,
            SignInError::InvalidEmail => FailureCode::InvalidEmail,
            SignInError::EmptyPassword => FailureCode::EmptyPassword,
            SignInError::InvalidCredentials { .. } => FailureCode::InvalidCredentials,
            SignInError::Unexpected => FailureCode::UnexpectedError,
        }
    }

    /// Seconds the caller should wait before retrying, for throttling rejections.
    pub fn retry_after_seconds(&self) -> Option<i64> {
        match self {
            SignInError::RateLimitExceeded {
                retry_after_seconds,
            }
            | SignInError::AccountLocked {
                retry_after_seconds,
                ..
            } => Some(*retry_after_seconds),
            _ => None,
        }
    }

    pub fn remaining_attempts(&self) -> Option<u32> {
        match self {
            SignInError::InvalidCredentials { remaining_attempts } => *remaining_attempts,
            _ => None,
        }
    }
}

type AccountLocks = DashMap<String, Arc<Mutex<()>>>;

/// Holds one account's sign-in lock and drops the map entry once nobody
/// else is waiting on it.
struct AccountGuard<'a> {
    locks: &'a AccountLocks,
    email: String,
    lock: Arc<Mutex<()>>,
}

impl<'a> AccountGuard<'a> {
    fn new(locks: &'a AccountLocks, email: &str) -> Self {
        let lock = locks.entry(email.to_string()).or_default().clone();
        Self {
            locks,
            email: email.to_string(),
            lock,
        }
    }
}

impl Drop for AccountGuard<'_> {
    fn drop(&mut self) {
        // One reference in the map, one here
        self.locks
            .remove_if(&self.email, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

/// Orchestrates rate limiting, lockout and credential checks for sign-in.
///
/// Attempts on the same account run one at a time, from the lockout check
/// until the outcome is recorded, so parallel guesses cannot get past the
/// lockout threshold. Different accounts proceed in parallel.
pub struct SignInService<U: UserRepository, A: LoginAttemptRepository, H: HashComparator> {
    users: Arc<U>,
    tracker: Arc<LoginAttemptTracker<A>>,
    rate_limiter: Arc<RateLimiter>,
    comparator: Arc<H>,
    clock: Arc<dyn Clock>,
    account_locks: AccountLocks,
}

impl<U, A, H> SignInService<U, A, H>
where
    U: UserRepository,
    A: LoginAttemptRepository,
    H: HashComparator,
{
    pub fn new(
        users: Arc<U>,
        tracker: Arc<LoginAttemptTracker<A>>,
        rate_limiter: Arc<RateLimiter>,
        comparator: Arc<H>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            users,
            tracker,
            rate_limiter,
            comparator,
            clock,
            account_locks: DashMap::new(),
        }
    }

    /// Authenticate `request`, returning the signed-in identity.
    ///
    /// Collaborator failures are logged and surface as
    /// [`SignInError::Unexpected`]; they are never propagated raw.
    pub async fn sign_in(&self, request: SignInRequest) -> Result<AuthenticatedUser, SignInError> {
        let SignInRequest {
            email,
            password,
            origin_key,
        } = request;

        if let Some(key) = origin_key.as_deref() {
            let decision = self.rate_limiter.check_and_record(key);
            if !decision.allowed {
                tracing::info!(
                    origin_key = %key,
                    current = decision.current,
                    limit = decision.limit,
                    "Sign-in rate limit exceeded"
                );
                return Err(SignInError::RateLimitExceeded {
                    retry_after_seconds: decision.retry_after_seconds().unwrap_or(0),
                });
            }
        }

        let email = normalize_email(&email);

        let account = AccountGuard::new(&self.account_locks, &email);
        let _held = account.lock.lock().await;
        self.authenticate(email, password, origin_key).await
    }

    /// Everything after the rate limit. Runs under the account's lock.
    async fn authenticate(
        &self,
        email: String,
        password: String,
        origin_key: Option<String>,
    ) -> Result<AuthenticatedUser, SignInError> {
        let status = self.tracker.check_lockout(&email).await.map_err(|e| {
            tracing::error!(email = %email, error = %e, "Failed to check account lockout");
            SignInError::Unexpected
        })?;
        if status.is_locked {
            tracing::info!(email = %email, "Sign-in attempt on locked account");
            self.record_failure(&email, &origin_key, FailureReason::AccountLocked)
                .await;
            return Err(self.account_locked(&status));
        }

        if email.is_empty() {
            self.record_failure(&email, &origin_key, FailureReason::EmptyEmail)
                .await;
            return Err(SignInError::EmptyEmail);
        }
        if validate_email(&email).is_err() {
            self.record_failure(&email, &origin_key, FailureReason::InvalidEmail)
                .await;
            return Err(SignInError::InvalidEmail);
        }
        if password.is_empty() {
            self.record_failure(&email, &origin_key, FailureReason::EmptyPassword)
                .await;
            return Err(SignInError::EmptyPassword);
        }

        let credentials = self.users.find_by_email(&email).await.map_err(|e| {
            tracing::error!(email = %email, error = %e, "Failed to look up user");
            SignInError::Unexpected
        })?;

        let Some(credentials) = credentials else {
            // Same cost as a wrong password: one comparison, result discarded
            let dummy = self.comparator.dummy_hash().to_string();
            let _ = self.compare(password, dummy).await?;
            return Err(self
                .reject_credentials(&email, &origin_key, FailureReason::UserNotFound)
                .await);
        };

        let matched = self
            .compare(password, credentials.password_hash.clone())
            .await?;
        if !matched {
            return Err(self
                .reject_credentials(&email, &origin_key, FailureReason::InvalidPassword)
                .await);
        }

        if let Err(e) = self
            .tracker
            .record_attempt(NewLoginAttempt::success(&email, origin_key.clone()))
            .await
        {
            tracing::error!(email = %email, error = %e, "Failed to record successful sign-in");
        }

        if let Some(key) = origin_key.as_deref() {
            if self.rate_limiter.config().reset_on_success {
                self.rate_limiter.reset(key);
            }
        }

        tracing::info!(email = %email, user_id = %credentials.user.id, "User signed in");
        Ok(credentials.user.into())
    }

    /// Run one comparison on the blocking pool.
    async fn compare(&self, candidate: String, stored_hash: String) -> Result<bool, SignInError> {
        let comparator = Arc::clone(&self.comparator);
        tokio::task::spawn_blocking(move || comparator.compare(&candidate, &stored_hash))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password comparison task failed");
                SignInError::Unexpected
            })
    }

    /// Record a credential failure and decide what the caller sees.
    async fn reject_credentials(
        &self,
        email: &str,
        origin_key: &Option<String>,
        reason: FailureReason,
    ) -> SignInError {
        tracing::debug!(email = %email, reason = %reason, "Sign-in failed");

        if !self.record_failure(email, origin_key, reason).await {
            return SignInError::InvalidCredentials {
                remaining_attempts: None,
            };
        }

        match self.tracker.check_lockout(email).await {
            Ok(status) if status.is_locked => {
                tracing::info!(email = %email, "Account locked after failed sign-in");
                self.account_locked(&status)
            }
            Ok(status) => SignInError::InvalidCredentials {
                remaining_attempts: (self.tracker.is_enabled() && status.remaining_attempts > 0)
                    .then_some(status.remaining_attempts),
            },
            Err(e) => {
                tracing::error!(email = %email, error = %e, "Failed to re-check account lockout");
                SignInError::InvalidCredentials {
                    remaining_attempts: None,
                }
            }
        }
    }

    /// Append a failed attempt, logging instead of failing. Returns whether it was stored.
    async fn record_failure(
        &self,
        email: &str,
        origin_key: &Option<String>,
        reason: FailureReason,
    ) -> bool {
        match self
            .tracker
            .record_attempt(NewLoginAttempt::failure(email, origin_key.clone(), reason))
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::error!(
                    email = %email,
                    reason = %reason,
                    error = %e,
                    "Failed to record failed sign-in attempt"
                );
                false
            }
        }
    }

    fn account_locked(&self, status: &LockoutStatus) -> SignInError {
        let now = self.clock.now();
        let locked_until = status
            .locked_until
            .or_else(|| now.checked_add_signed(self.tracker.config().duration))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        SignInError::AccountLocked {
            locked_until,
            retry_after_seconds: status.retry_after_seconds(now).unwrap_or(0),
        }
    }
}
