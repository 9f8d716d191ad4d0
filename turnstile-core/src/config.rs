//! Attempt-control configuration
//!
//! Settings are grouped per concern ([`RateLimitConfig`], [`LockoutConfig`],
//! [`RetentionConfig`]) and collected in [`AttemptControlConfig`], which can be
//! loaded from `TURNSTILE_*` environment variables with [`AttemptControlConfig::from_env`].
//!
//! | Setting                        | Environment variable                    | Default |
//! | ------------------------------ | --------------------------------------- | ------- |
//! | `rate_limit.enabled`           | `TURNSTILE_RATE_LIMIT_ENABLED`          | `true`  |
//! | `rate_limit.max_requests`      | `TURNSTILE_RATE_LIMIT_MAX_REQUESTS`     | `5`     |
//! | `rate_limit.window_ms`         | `TURNSTILE_RATE_LIMIT_WINDOW_MS`        | `60000` |
//! | `rate_limit.reset_on_success`  | `TURNSTILE_RATE_LIMIT_RESET_ON_SUCCESS` | `false` |
//! | `lockout.enabled`              | `TURNSTILE_LOCKOUT_ENABLED`             | `true`  |
//! | `lockout.threshold`            | `TURNSTILE_LOCKOUT_THRESHOLD`           | `5`     |
//! | `lockout.duration_ms`          | `TURNSTILE_LOCKOUT_DURATION_MS`         | `900000`|
//! | `retention.days`               | `TURNSTILE_RETENTION_DAYS`              | `7`     |

use chrono::Duration;

use crate::error::{ConfigError, utilities::parse_setting};

pub const ENV_RATE_LIMIT_ENABLED: &str = "TURNSTILE_RATE_LIMIT_ENABLED";
pub const ENV_RATE_LIMIT_MAX_REQUESTS: &str = "TURNSTILE_RATE_LIMIT_MAX_REQUESTS";
pub const ENV_RATE_LIMIT_WINDOW_MS: &str = "TURNSTILE_RATE_LIMIT_WINDOW_MS";
pub const ENV_RATE_LIMIT_RESET_ON_SUCCESS: &str = "TURNSTILE_RATE_LIMIT_RESET_ON_SUCCESS";
pub const ENV_LOCKOUT_ENABLED: &str = "TURNSTILE_LOCKOUT_ENABLED";
pub const ENV_LOCKOUT_THRESHOLD: &str = "TURNSTILE_LOCKOUT_THRESHOLD";
pub const ENV_LOCKOUT_DURATION_MS: &str = "TURNSTILE_LOCKOUT_DURATION_MS";
pub const ENV_RETENTION_DAYS: &str = "TURNSTILE_RETENTION_DAYS";

/// Longest accepted rate-limit window or lockout duration.
pub const MAX_WINDOW: Duration = Duration::days(365);
/// Longest accepted retention period.
pub const MAX_RETENTION: Duration = Duration::days(3650);

/// Per-origin request throttling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Requests admitted per key within one window.
    pub max_requests: u32,
    pub window: Duration,
    /// Clear the origin's window after a successful sign-in.
    pub reset_on_success: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 5,
            window: Duration::milliseconds(60_000),
            reset_on_success: false,
        }
    }
}

impl RateLimitConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Per-account lockout after repeated credential failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockoutConfig {
    pub enabled: bool,
    /// Failures within the window that lock the account.
    pub threshold: u32,
    /// Length of both the counting window and the lock itself.
    pub duration: Duration,
}

impl Default for LockoutConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 5,
            duration: Duration::milliseconds(900_000),
        }
    }
}

impl LockoutConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// How long attempt records are kept before cleanup removes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionConfig {
    pub period: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            period: Duration::days(7),
        }
    }
}

/// Complete configuration for the attempt-control subsystem.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttemptControlConfig {
    pub rate_limit: RateLimitConfig,
    pub lockout: LockoutConfig,
    pub retention: RetentionConfig,
}

impl AttemptControlConfig {
    /// Load the configuration from the process environment.
    ///
    /// Unset variables keep their defaults; variables that are set but cannot
    /// be parsed produce [`ConfigError::InvalidValue`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let window_ms = parse_setting(
            ENV_RATE_LIMIT_WINDOW_MS,
            lookup(ENV_RATE_LIMIT_WINDOW_MS),
            defaults.rate_limit.window.num_milliseconds(),
        )?;
        let rate_limit = RateLimitConfig {
            enabled: parse_setting(
                ENV_RATE_LIMIT_ENABLED,
                lookup(ENV_RATE_LIMIT_ENABLED),
                defaults.rate_limit.enabled,
            )?,
            max_requests: parse_setting(
                ENV_RATE_LIMIT_MAX_REQUESTS,
                lookup(ENV_RATE_LIMIT_MAX_REQUESTS),
                defaults.rate_limit.max_requests,
            )?,
            window: millis_setting(ENV_RATE_LIMIT_WINDOW_MS, window_ms)?,
            reset_on_success: parse_setting(
                ENV_RATE_LIMIT_RESET_ON_SUCCESS,
                lookup(ENV_RATE_LIMIT_RESET_ON_SUCCESS),
                defaults.rate_limit.reset_on_success,
            )?,
        };

        let duration_ms = parse_setting(
            ENV_LOCKOUT_DURATION_MS,
            lookup(ENV_LOCKOUT_DURATION_MS),
            defaults.lockout.duration.num_milliseconds(),
        )?;
        let lockout = LockoutConfig {
            enabled: parse_setting(
                ENV_LOCKOUT_ENABLED,
                lookup(ENV_LOCKOUT_ENABLED),
                defaults.lockout.enabled,
            )?,
            threshold: parse_setting(
                ENV_LOCKOUT_THRESHOLD,
                lookup(ENV_LOCKOUT_THRESHOLD),
                defaults.lockout.threshold,
            )?,
            duration: millis_setting(ENV_LOCKOUT_DURATION_MS, duration_ms)?,
        };

        let retention_days = parse_setting(
            ENV_RETENTION_DAYS,
            lookup(ENV_RETENTION_DAYS),
            defaults.retention.period.num_days(),
        )?;
        let retention = RetentionConfig {
            period: Duration::try_days(retention_days).ok_or_else(|| ConfigError::InvalidValue {
                key: ENV_RETENTION_DAYS.to_string(),
                value: retention_days.to_string(),
            })?,
        };

        Ok(Self {
            rate_limit,
            lockout,
            retention,
        })
    }

    /// Check the settings for values that would make the subsystem misbehave.
    ///
    /// Retention shorter than the lockout duration is rejected: cleanup would
    /// otherwise be configured to delete failures that still hold a lock.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rate_limit.enabled {
            if self.rate_limit.max_requests == 0 {
                return Err(ConfigError::Inconsistent(
                    "rate_limit.max_requests must be at least 1".to_string(),
                ));
            }
            if self.rate_limit.window <= Duration::zero() {
                return Err(ConfigError::Inconsistent(
                    "rate_limit.window_ms must be positive".to_string(),
                ));
            }
            if self.rate_limit.window > MAX_WINDOW {
                return Err(ConfigError::Inconsistent(format!(
                    "rate_limit.window_ms must be at most {}",
                    MAX_WINDOW.num_milliseconds()
                )));
            }
        }

        if self.lockout.enabled {
            if self.lockout.threshold == 0 {
                return Err(ConfigError::Inconsistent(
                    "lockout.threshold must be at least 1".to_string(),
                ));
            }
            if self.lockout.duration <= Duration::zero() {
                return Err(ConfigError::Inconsistent(
                    "lockout.duration_ms must be positive".to_string(),
                ));
            }
            if self.lockout.duration > MAX_WINDOW {
                return Err(ConfigError::Inconsistent(format!(
                    "lockout.duration_ms must be at most {}",
                    MAX_WINDOW.num_milliseconds()
                )));
            }
            if self.retention.period < self.lockout.duration {
                return Err(ConfigError::Inconsistent(format!(
                    "retention period ({} days) is shorter than the lockout duration ({} ms)",
                    self.retention.period.num_days(),
                    self.lockout.duration.num_milliseconds()
                )));
            }
        }

        if self.retention.period <= Duration::zero() {
            return Err(ConfigError::Inconsistent(
                "retention.days must be positive".to_string(),
            ));
        }
        if self.retention.period > MAX_RETENTION {
            return Err(ConfigError::Inconsistent(format!(
                "retention.days must be at most {}",
                MAX_RETENTION.num_days()
            )));
        }

        Ok(())
    }
}

fn millis_setting(key: &str, millis: i64) -> Result<Duration, ConfigError> {
    Duration::try_milliseconds(millis).ok_or_else(|| ConfigError::InvalidValue {
        key: key.to_string(),
        value: millis.to_string(),
    })
}
