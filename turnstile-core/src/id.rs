//! Prefixed identifier generation
//!
//! Identifiers look like `usr_Xk2v...`: a short type prefix followed by at
//! least 96 bits of URL-safe base64 encoded randomness.

use base64::{Engine, prelude::BASE64_URL_SAFE_NO_PAD};
use rand::{TryRngCore, rngs::OsRng};

const MIN_ENTROPY_BYTES: usize = 12;

/// Generate a prefixed ID with 96 bits of entropy.
///
/// # Panics
///
/// Panics if the OS random number generator fails.
pub fn generate_prefixed_id(prefix: &str) -> String {
    let mut bytes = [0u8; MIN_ENTROPY_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .expect("OS RNG failure - system entropy source unavailable");

    format!("{prefix}_{}", BASE64_URL_SAFE_NO_PAD.encode(bytes))
}

/// Check that `id` is `{expected_prefix}_` followed by enough decodable randomness.
pub fn validate_prefixed_id(id: &str, expected_prefix: &str) -> bool {
    let Some(random_part) = id
        .strip_prefix(expected_prefix)
        .and_then(|rest| rest.strip_prefix('_'))
    else {
        return false;
    };

    match BASE64_URL_SAFE_NO_PAD.decode(random_part) {
        Ok(decoded) => decoded.len() >= MIN_ENTROPY_BYTES,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prefixed_id() {
        let id = generate_prefixed_id("usr");
        assert!(id.starts_with("usr_"));
        // 12 bytes encode to 16 base64 characters
        assert_eq!(id.len(), "usr_".len() + 16);
        assert!(validate_prefixed_id(&id, "usr"));
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(generate_prefixed_id("usr"), generate_prefixed_id("usr"));
    }

    #[test]
    fn test_validate_prefixed_id_rejects_wrong_prefix() {
        let id = generate_prefixed_id("usr");
        assert!(!validate_prefixed_id(&id, "att"));
        assert!(!validate_prefixed_id("usr", "usr"));
        assert!(!validate_prefixed_id("usr_", "usr"));
        assert!(!validate_prefixed_id("usr_!!!notbase64", "usr"));
        assert!(!validate_prefixed_id("usr_c2hvcnQ", "usr"));
    }
}
