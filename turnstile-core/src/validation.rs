//! Validation for sign-in input and user provisioning.

use crate::error::ValidationError;
use regex::Regex;
use std::sync::LazyLock;

/// Practical subset of RFC 5322 addresses.
static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$")
        .expect("Invalid email regex pattern")
});

/// Canonical form of an email used as the lockout key and lookup key.
///
/// Surrounding whitespace is dropped and the address is lowercased, so
/// `Alice@Example.com ` and `alice@example.com` share one failure history.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validates an email address
///
/// # Examples
///
/// ```rust
/// use turnstile_core::validation::validate_email;
///
/// assert!(validate_email("user@example.com").is_ok());
/// assert!(validate_email("invalid-email").is_err());
/// ```
pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    if email.is_empty() {
        return Err(ValidationError::MissingField(
            "Email is required".to_string(),
        ));
    }

    if email.len() > 254 {
        return Err(ValidationError::InvalidEmail(
            "Email is too long".to_string(),
        ));
    }

    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(ValidationError::InvalidEmail(format!(
            "Invalid email format: {email}"
        )))
    }
}

/// Validates a new password for provisioning.
///
/// Sign-in only rejects empty passwords; strength rules apply when a password
/// is set, never when one is checked.
///
/// # Password Requirements
///
/// - Minimum 8 characters
/// - Maximum 128 characters
/// - Cannot be empty or whitespace only
pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::MissingField(
            "Password is required".to_string(),
        ));
    }

    if password.trim().is_empty() {
        return Err(ValidationError::InvalidPassword(
            "Password cannot be only whitespace".to_string(),
        ));
    }

    if password.len() < 8 {
        return Err(ValidationError::InvalidPassword(
            "Password must be at least 8 characters long".to_string(),
        ));
    }

    if password.len() > 128 {
        return Err(ValidationError::InvalidPassword(
            "Password must be no more than 128 characters long".to_string(),
        ));
    }

    Ok(())
}

/// Validates a user name
///
/// - If provided, cannot be empty or whitespace only
/// - Maximum 100 characters
pub fn validate_name(name: Option<&str>) -> Result<(), ValidationError> {
    if let Some(name) = name {
        if name.trim().is_empty() {
            return Err(ValidationError::InvalidName(
                "Name cannot be empty or whitespace only".to_string(),
            ));
        }

        if name.len() > 100 {
            return Err(ValidationError::InvalidName(
                "Name must be no more than 100 characters long".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_email() {
        assert_eq!(normalize_email("  Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_email(""), "");
    }

    #[test]
    fn test_validate_email_valid() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("test.email+tag@domain.co.uk").is_ok());
        assert!(validate_email("user123@test-domain.com").is_ok());
    }

    #[test]
    fn test_validate_email_invalid() {
        assert!(matches!(
            validate_email(""),
            Err(ValidationError::MissingField(_))
        ));
        assert!(validate_email("invalid-email").is_err());
        assert!(validate_email("@domain.com").is_err());
        assert!(validate_email("user@").is_err());
        assert!(validate_email("user@domain").is_err());

        let long_email = format!("{}@example.com", "a".repeat(250));
        assert!(validate_email(&long_email).is_err());
    }

    #[test]
    fn test_validate_password() {
        assert!(validate_password("password123").is_ok());
        assert!(validate_password("12345678").is_ok());

        assert!(matches!(
            validate_password(""),
            Err(ValidationError::MissingField(_))
        ));
        assert!(validate_password("   ").is_err());
        assert!(validate_password("short").is_err());
        assert!(validate_password(&"a".repeat(129)).is_err());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name(None).is_ok());
        assert!(validate_name(Some("José María García-López")).is_ok());
        assert!(validate_name(Some("   ")).is_err());
        assert!(validate_name(Some(&"a".repeat(101))).is_err());
    }
}
