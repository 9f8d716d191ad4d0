//! Per-account lockout tracking.
//!
//! Every attempt is appended to the attempt log. Lockout state is derived on
//! each read from the failures in the trailing lockout window:
//!
//! - only `USER_NOT_FOUND` and `INVALID_PASSWORD` failures count
//! - a success acts as a barrier: failures before the latest success are ignored
//! - the account is locked while at least `threshold` counted failures remain
//!   in the window
//!
//! Because nothing but the log is stored, a lock expires on its own once
//! enough failures age out of the window, and concurrent failures can never
//! overwrite each other.
//!
//! # Example
//!
//! ```rust,ignore
//! use turnstile_core::services::LoginAttemptTracker;
//!
//! let tracker = LoginAttemptTracker::new(repository, LockoutConfig::default(), clock);
//!
//! let status = tracker.check_lockout("user@example.com").await?;
//! if status.is_locked {
//!     // reject before touching credentials
//! }
//! ```

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::{
    Error,
    attempt::{LockoutStatus, LoginAttempt, NewLoginAttempt},
    clock::Clock,
    config::LockoutConfig,
    repositories::LoginAttemptRepository,
    services::RateLimiter,
};

/// Cleanup runs hourly
const CLEANUP_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3600);

/// Records attempts and derives lockout decisions from them.
pub struct LoginAttemptTracker<R: LoginAttemptRepository> {
    repository: Arc<R>,
    config: LockoutConfig,
    clock: Arc<dyn Clock>,
}

impl<R: LoginAttemptRepository> LoginAttemptTracker<R> {
    pub fn new(repository: Arc<R>, config: LockoutConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            repository,
            config,
            clock,
        }
    }

    pub fn config(&self) -> &LockoutConfig {
        &self.config
    }

    pub fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    /// Append an attempt to the log, stamped with the current time.
    ///
    /// Attempts are recorded even when lockout is disabled, so the audit
    /// trail stays complete.
    pub async fn record_attempt(&self, attempt: NewLoginAttempt) -> Result<LoginAttempt, Error> {
        let occurred_at = self.clock.now();
        let record = self.repository.insert(attempt, occurred_at).await?;

        tracing::debug!(
            email = %record.email,
            origin_key = ?record.origin_key,
            succeeded = record.succeeded,
            reason = ?record.failure_reason,
            "Recorded login attempt"
        );

        Ok(record)
    }

    /// Current lockout status for `email`. Reads only.
    ///
    /// An email with no history, or any email while lockout is disabled, is
    /// unlocked with zero counted failures.
    pub async fn check_lockout(&self, email: &str) -> Result<LockoutStatus, Error> {
        if !self.config.enabled {
            return Ok(LockoutStatus::unlocked(email, self.config.threshold));
        }

        let now = self.clock.now();
        let window_start = now
            .checked_sub_signed(self.config.duration)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let attempts = self
            .repository
            .find_by_email_since(email, window_start)
            .await?;

        Ok(self.compute_lockout_status(email, &attempts, window_start))
    }

    /// Administrative unlock: delete every failure recorded for `email`.
    ///
    /// Idempotent. Success records are kept for audit.
    ///
    /// # Returns
    ///
    /// The number of failure records deleted.
    pub async fn reset_attempts(&self, email: &str) -> Result<u64, Error> {
        let deleted = self.repository.delete_failures(email).await?;
        tracing::info!(email = %email, count = deleted, "Reset login attempts");
        Ok(deleted)
    }

    /// Delete records older than `retention`.
    ///
    /// The cutoff never reaches into the lockout window, so a retention
    /// shorter than the lockout duration cannot unlock anyone early.
    ///
    /// # Returns
    ///
    /// The number of records deleted.
    pub async fn cleanup(&self, retention: Duration) -> Result<u64, Error> {
        let before = cleanup_cutoff(self.clock.now(), retention, self.config.duration);
        self.repository.delete_older_than(before).await
    }

    /// Start the background cleanup task.
    ///
    /// Every hour the task removes attempt records older than `retention` and
    /// elapsed windows from `rate_limiter`, until `shutdown` changes.
    ///
    /// # Returns
    ///
    /// A `JoinHandle` for the spawned task.
    pub fn start_cleanup_task(
        &self,
        rate_limiter: Arc<RateLimiter>,
        retention: Duration,
        mut shutdown: tokio::sync::watch::Receiver<bool>,
    ) -> tokio::task::JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        let clock = Arc::clone(&self.clock);
        let lockout_duration = self.config.duration;

        tokio::spawn(async move {
            let mut interval_timer = tokio::time::interval(CLEANUP_INTERVAL);

            loop {
                tokio::select! {
                    _ = interval_timer.tick() => {
                        let before = cleanup_cutoff(clock.now(), retention, lockout_duration);
                        match repository.delete_older_than(before).await {
                            Ok(count) if count > 0 => {
                                tracing::info!(
                                    count = count,
                                    "Cleaned up old login attempt records"
                                );
                            }
                            Err(e) => {
                                tracing::warn!(
                                    error = %e,
                                    "Failed to cleanup login attempt records"
                                );
                            }
                            _ => {}
                        }

                        let windows = rate_limiter.cleanup();
                        if windows > 0 {
                            tracing::info!(count = windows, "Cleaned up expired rate limit windows");
                        }
                    }
                    _ = shutdown.changed() => {
                        tracing::info!("Shutting down login attempt cleanup task");
                        break;
                    }
                }
            }
        })
    }

    /// Derive lockout status from the attempts since `window_start`.
    fn compute_lockout_status(
        &self,
        email: &str,
        attempts: &[LoginAttempt],
        window_start: DateTime<Utc>,
    ) -> LockoutStatus {
        let threshold = self.config.threshold;

        // Strictly inside the window, so a lock ends exactly at `locked_until`
        let in_window: Vec<&LoginAttempt> = attempts
            .iter()
            .filter(|a| a.occurred_at > window_start)
            .collect();
        let since_success = match in_window.iter().rposition(|a| a.succeeded) {
            Some(last_success) => &in_window[last_success + 1..],
            None => &in_window[..],
        };

        let mut failures: Vec<DateTime<Utc>> = since_success
            .iter()
            .filter(|a| a.is_counted_failure())
            .map(|a| a.occurred_at)
            .collect();
        failures.sort();

        let failed_attempts = u32::try_from(failures.len()).unwrap_or(u32::MAX);
        let is_locked = failed_attempts >= threshold;
        let locked_until = if is_locked {
            // The lock holds until the oldest of the last `threshold` failures
            // leaves the window. With exactly `threshold` failures that is the
            // first failure; with more (parallel guesses recorded together) it
            // is later than the failure that reached the threshold, because
            // `is_locked` stays true until fewer than `threshold` remain.
            failures
                .len()
                .checked_sub(threshold as usize)
                .map(|i| {
                    failures[i]
                        .checked_add_signed(self.config.duration)
                        .unwrap_or(DateTime::<Utc>::MAX_UTC)
                })
        } else {
            None
        };

        LockoutStatus {
            email: email.to_string(),
            failed_attempts,
            is_locked,
            locked_until,
            remaining_attempts: threshold.saturating_sub(failed_attempts),
        }
    }
}

fn cleanup_cutoff(
    now: DateTime<Utc>,
    retention: Duration,
    lockout_duration: Duration,
) -> DateTime<Utc> {
    now.checked_sub_signed(retention.max(lockout_duration))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attempt::FailureReason, clock::MockClock, config::RateLimitConfig,
        services::test_support::MockLoginAttemptRepository,
    };

    const EMAIL: &str = "test@example.com";

    fn tracker(
        threshold: u32,
        duration: Duration,
    ) -> (
        LoginAttemptTracker<MockLoginAttemptRepository>,
        Arc<MockLoginAttemptRepository>,
        Arc<MockClock>,
    ) {
        let repo = Arc::new(MockLoginAttemptRepository::new());
        let clock = Arc::new(MockClock::default());
        let config = LockoutConfig {
            enabled: true,
            threshold,
            duration,
        };
        let tracker = LoginAttemptTracker::new(repo.clone(), config, clock.clone());
        (tracker, repo, clock)
    }

    async fn fail(tracker: &LoginAttemptTracker<MockLoginAttemptRepository>, reason: FailureReason) {
        tracker
            .record_attempt(NewLoginAttempt::failure(EMAIL, None, reason))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_no_history_is_unlocked() {
        let (tracker, _repo, _clock) = tracker(5, Duration::minutes(15));

        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 0);
        assert_eq!(status.remaining_attempts, 5);
        assert_eq!(status.locked_until, None);
    }

    #[tokio::test]
    async fn test_lockout_after_threshold() {
        let (tracker, _repo, clock) = tracker(3, Duration::minutes(15));

        for expected_remaining in [2, 1] {
            fail(&tracker, FailureReason::InvalidPassword).await;
            let status = tracker.check_lockout(EMAIL).await.unwrap();
            assert!(!status.is_locked);
            assert_eq!(status.remaining_attempts, expected_remaining);
            clock.advance(Duration::seconds(1));
        }

        fail(&tracker, FailureReason::UserNotFound).await;
        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert!(status.is_locked);
        assert_eq!(status.failed_attempts, 3);
        assert_eq!(status.remaining_attempts, 0);

        // Oldest of the three failures was two seconds ago
        let expected = clock.now() - Duration::seconds(2) + Duration::minutes(15);
        assert_eq!(status.locked_until, Some(expected));
        assert_eq!(status.retry_after_seconds(clock.now()), Some(15 * 60 - 2));
    }

    #[tokio::test]
    async fn test_lock_expires_exactly_at_locked_until() {
        let (tracker, _repo, clock) = tracker(2, Duration::minutes(15));

        fail(&tracker, FailureReason::InvalidPassword).await;
        fail(&tracker, FailureReason::InvalidPassword).await;
        let status = tracker.check_lockout(EMAIL).await.unwrap();
        let locked_until = status.locked_until.unwrap();

        clock.set(locked_until - Duration::milliseconds(1));
        assert!(tracker.check_lockout(EMAIL).await.unwrap().is_locked);

        clock.set(locked_until);
        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 0);
    }

    #[tokio::test]
    async fn test_lock_follows_oldest_of_last_threshold_failures() {
        let (tracker, _repo, clock) = tracker(2, Duration::minutes(15));

        // Four failures a minute apart; the lock was first reached at the second
        for _ in 0..4 {
            fail(&tracker, FailureReason::InvalidPassword).await;
            clock.advance(Duration::minutes(1));
        }
        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert_eq!(status.failed_attempts, 4);

        // Third failure, two minutes after the threshold was reached
        let third = clock.now() - Duration::minutes(2);
        assert_eq!(status.locked_until, Some(third + Duration::minutes(15)));

        clock.set(third + Duration::minutes(15) - Duration::milliseconds(1));
        assert!(tracker.check_lockout(EMAIL).await.unwrap().is_locked);
        clock.set(third + Duration::minutes(15));
        assert!(!tracker.check_lockout(EMAIL).await.unwrap().is_locked);
    }

    #[tokio::test]
    async fn test_success_is_a_barrier() {
        let (tracker, repo, clock) = tracker(3, Duration::minutes(15));

        fail(&tracker, FailureReason::InvalidPassword).await;
        fail(&tracker, FailureReason::InvalidPassword).await;
        clock.advance(Duration::seconds(1));
        tracker
            .record_attempt(NewLoginAttempt::success(EMAIL, None))
            .await
            .unwrap();
        clock.advance(Duration::seconds(1));
        fail(&tracker, FailureReason::InvalidPassword).await;

        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert_eq!(status.failed_attempts, 1);
        assert!(!status.is_locked);
        // Nothing was deleted from the audit trail
        assert_eq!(repo.len(), 4);
    }

    #[tokio::test]
    async fn test_audit_only_failures_do_not_count() {
        let (tracker, _repo, _clock) = tracker(2, Duration::minutes(15));

        fail(&tracker, FailureReason::AccountLocked).await;
        fail(&tracker, FailureReason::EmptyPassword).await;
        fail(&tracker, FailureReason::InvalidEmail).await;
        fail(&tracker, FailureReason::EmptyEmail).await;

        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert_eq!(status.failed_attempts, 0);
        assert!(!status.is_locked);
    }

    #[tokio::test]
    async fn test_failures_outside_window_are_ignored() {
        let (tracker, _repo, clock) = tracker(2, Duration::minutes(15));

        fail(&tracker, FailureReason::InvalidPassword).await;
        clock.advance(Duration::minutes(16));
        fail(&tracker, FailureReason::InvalidPassword).await;

        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert_eq!(status.failed_attempts, 1);
        assert!(!status.is_locked);
    }

    #[tokio::test]
    async fn test_reset_attempts_unlocks_and_is_idempotent() {
        let (tracker, repo, _clock) = tracker(2, Duration::minutes(15));

        tracker
            .record_attempt(NewLoginAttempt::success(EMAIL, None))
            .await
            .unwrap();
        fail(&tracker, FailureReason::InvalidPassword).await;
        fail(&tracker, FailureReason::InvalidPassword).await;
        assert!(tracker.check_lockout(EMAIL).await.unwrap().is_locked);

        assert_eq!(tracker.reset_attempts(EMAIL).await.unwrap(), 2);
        assert!(!tracker.check_lockout(EMAIL).await.unwrap().is_locked);
        assert_eq!(tracker.reset_attempts(EMAIL).await.unwrap(), 0);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_different_emails_tracked_separately() {
        let (tracker, _repo, _clock) = tracker(1, Duration::minutes(15));

        fail(&tracker, FailureReason::InvalidPassword).await;

        assert!(tracker.check_lockout(EMAIL).await.unwrap().is_locked);
        assert!(
            !tracker
                .check_lockout("other@example.com")
                .await
                .unwrap()
                .is_locked
        );
    }

    #[tokio::test]
    async fn test_disabled_lockout_still_records() {
        let repo = Arc::new(MockLoginAttemptRepository::new());
        let clock = Arc::new(MockClock::default());
        let tracker = LoginAttemptTracker::new(repo.clone(), LockoutConfig::disabled(), clock);

        for _ in 0..10 {
            fail(&tracker, FailureReason::InvalidPassword).await;
        }

        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert!(!status.is_locked);
        assert_eq!(status.failed_attempts, 0);
        assert_eq!(repo.len(), 10);
        assert!(!tracker.is_enabled());
    }

    #[tokio::test]
    async fn test_cleanup_never_reaches_into_lockout_window() {
        let (tracker, repo, clock) = tracker(2, Duration::minutes(15));

        fail(&tracker, FailureReason::InvalidPassword).await;
        clock.advance(Duration::minutes(10));
        fail(&tracker, FailureReason::InvalidPassword).await;
        clock.advance(Duration::minutes(1));

        // Retention shorter than the lockout window is clamped to it
        let deleted = tracker.cleanup(Duration::minutes(1)).await.unwrap();
        assert_eq!(deleted, 0);
        assert!(tracker.check_lockout(EMAIL).await.unwrap().is_locked);

        clock.advance(Duration::minutes(5));
        let deleted = tracker.cleanup(Duration::minutes(1)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_huge_durations_do_not_overflow() {
        let (tracker, repo, _clock) = tracker(1, Duration::MAX);

        fail(&tracker, FailureReason::InvalidPassword).await;
        let status = tracker.check_lockout(EMAIL).await.unwrap();
        assert!(status.is_locked);
        assert_eq!(status.locked_until, Some(DateTime::<Utc>::MAX_UTC));

        assert_eq!(tracker.cleanup(Duration::MAX).await.unwrap(), 0);
        assert_eq!(repo.len(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_task_stops_on_shutdown() {
        let (tracker, repo, clock) = tracker(5, Duration::minutes(15));
        let limiter = Arc::new(RateLimiter::new(RateLimitConfig::default(), clock.clone()));

        fail(&tracker, FailureReason::InvalidPassword).await;
        limiter.check_and_record("10.0.0.1");
        clock.advance(Duration::days(8));

        let (tx, rx) = tokio::sync::watch::channel(false);
        let handle = tracker.start_cleanup_task(limiter.clone(), Duration::days(7), rx);

        // The first interval tick fires immediately
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while repo.len() > 0 || !limiter.is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
