//! Service layer for business logic
//!
//! This module contains the attempt-control services and the sign-in
//! orchestration built on top of them.

pub mod login_attempt;
pub mod rate_limit;
pub mod sign_in;
pub mod user;

#[cfg(test)]
pub(crate) mod test_support;

pub use login_attempt::LoginAttemptTracker;
pub use rate_limit::{RateLimitDecision, RateLimitWindow, RateLimiter};
pub use sign_in::{FailureCode, SignInError, SignInRequest, SignInService};
pub use user::UserService;
