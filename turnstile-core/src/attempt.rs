//! Login attempt records and derived lockout state
//!
//! Every sign-in attempt, successful or not, becomes an immutable
//! [`LoginAttempt`]. Lockout decisions are never stored; they are recomputed as
//! a [`LockoutStatus`] from the attempts inside the trailing lockout window.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Why an attempt failed, as written to the audit trail.
///
/// This is richer than what callers see: `UserNotFound` and `InvalidPassword`
/// are both reported as invalid credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureReason {
    AccountLocked,
    EmptyEmail,
    InvalidEmail,
    EmptyPassword,
    UserNotFound,
    InvalidPassword,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::AccountLocked => "ACCOUNT_LOCKED",
            FailureReason::EmptyEmail => "EMPTY_EMAIL",
            FailureReason::InvalidEmail => "INVALID_EMAIL",
            FailureReason::EmptyPassword => "EMPTY_PASSWORD",
            FailureReason::UserNotFound => "USER_NOT_FOUND",
            FailureReason::InvalidPassword => "INVALID_PASSWORD",
        }
    }

    /// Whether a failure with this reason counts toward an account lockout.
    ///
    /// Only credential guesses count. Attempts rejected while locked and
    /// malformed input are kept for audit but never extend or cause a lock.
    pub fn counts_toward_lockout(&self) -> bool {
        matches!(
            self,
            FailureReason::UserNotFound | FailureReason::InvalidPassword
        )
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureReason {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACCOUNT_LOCKED" => Ok(FailureReason::AccountLocked),
            "EMPTY_EMAIL" => Ok(FailureReason::EmptyEmail),
            "INVALID_EMAIL" => Ok(FailureReason::InvalidEmail),
            "EMPTY_PASSWORD" => Ok(FailureReason::EmptyPassword),
            "USER_NOT_FOUND" => Ok(FailureReason::UserNotFound),
            "INVALID_PASSWORD" => Ok(FailureReason::InvalidPassword),
            other => Err(ValidationError::InvalidField(format!(
                "Unknown failure reason: {other}"
            ))),
        }
    }
}

/// A persisted authentication attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoginAttempt {
    pub id: i64,
    /// The claimed account identifier, recorded whether or not an account exists.
    pub email: String,
    pub origin_key: Option<String>,
    pub succeeded: bool,
    /// Present iff `succeeded` is false.
    pub failure_reason: Option<FailureReason>,
    pub occurred_at: DateTime<Utc>,
}

impl LoginAttempt {
    /// Whether this record is a failure that counts toward lockout.
    pub fn is_counted_failure(&self) -> bool {
        !self.succeeded
            && self
                .failure_reason
                .is_some_and(|reason| reason.counts_toward_lockout())
    }
}

/// An attempt to be recorded. The timestamp is assigned by the tracker's clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoginAttempt {
    pub email: String,
    pub origin_key: Option<String>,
    pub succeeded: bool,
    pub failure_reason: Option<FailureReason>,
}

impl NewLoginAttempt {
    pub fn success(email: impl Into<String>, origin_key: Option<String>) -> Self {
        Self {
            email: email.into(),
            origin_key,
            succeeded: true,
            failure_reason: None,
        }
    }

    pub fn failure(
        email: impl Into<String>,
        origin_key: Option<String>,
        reason: FailureReason,
    ) -> Self {
        Self {
            email: email.into(),
            origin_key,
            succeeded: false,
            failure_reason: Some(reason),
        }
    }

    /// Attach the timestamp, producing the row shape storage persists.
    pub fn at(self, occurred_at: DateTime<Utc>) -> LoginAttempt {
        LoginAttempt {
            id: 0,
            email: self.email,
            origin_key: self.origin_key,
            succeeded: self.succeeded,
            failure_reason: self.failure_reason,
            occurred_at,
        }
    }
}

/// Lockout state of one email, derived from its recent attempts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockoutStatus {
    pub email: String,
    /// Counted failures in the window since the most recent success.
    pub failed_attempts: u32,
    pub is_locked: bool,
    /// When the account unlocks if no further failures arrive. Only set while locked.
    pub locked_until: Option<DateTime<Utc>>,
    pub remaining_attempts: u32,
}

impl LockoutStatus {
    /// The status of an email with no relevant history.
    pub fn unlocked(email: &str, threshold: u32) -> Self {
        Self {
            email: email.to_string(),
            failed_attempts: 0,
            is_locked: false,
            locked_until: None,
            remaining_attempts: threshold,
        }
    }

    /// Whole seconds until the lock expires, rounded up, if locked.
    pub fn retry_after_seconds(&self, now: DateTime<Utc>) -> Option<i64> {
        self.locked_until.map(|until| {
            let millis = (until - now).num_milliseconds().max(0);
            (millis + 999) / 1000
        })
    }
}
