//! Core functionality for the turnstile project
//!
//! This crate contains the sign-in attempt-control subsystem: the per-origin
//! [`RateLimiter`], the per-account [`LoginAttemptTracker`], and the
//! [`SignInService`] that sequences them around a timing-equalized password
//! check.
//!
//! Storage is reached through the traits in [`repositories`]; a storage
//! backend implements [`RepositoryProvider`]. Most applications should use the
//! `turnstile` crate, which wires everything together with a builder.
pub mod attempt;
pub mod clock;
pub mod config;
pub mod crypto;
pub mod error;
pub mod id;
pub mod repositories;
pub mod services;
pub mod user;
pub mod validation;

pub use attempt::{FailureReason, LockoutStatus, LoginAttempt, NewLoginAttempt};
pub use clock::{Clock, MockClock, SystemClock};
pub use config::{AttemptControlConfig, LockoutConfig, RateLimitConfig, RetentionConfig};
pub use crypto::{Argon2HashComparator, HashComparator};
pub use error::Error;
pub use repositories::{LoginAttemptRepository, RepositoryProvider, UserRepository};
pub use services::{
    FailureCode, LoginAttemptTracker, RateLimitDecision, RateLimiter, SignInError, SignInRequest,
    SignInService, UserService,
};
pub use user::{AuthenticatedUser, NewUser, User, UserCredentials, UserId};
