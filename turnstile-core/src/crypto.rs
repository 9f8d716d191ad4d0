//! Password hash comparison
//!
//! Sign-in compares exactly one password against one hash on every credential
//! path. When the account does not exist the comparison runs against
//! [`HashComparator::dummy_hash`], so an unknown email costs the same as a
//! wrong password.
//!
//! Comparisons are CPU bound (argon2) and synchronous. Callers on an async
//! runtime should move them onto the blocking pool; the sign-in service does.
//!
//! See: <https://cheatsheetseries.owasp.org/cheatsheets/Authentication_Cheat_Sheet.html#authentication-responses>

use password_auth::{generate_hash, verify_password};

/// Hashes secrets for storage and verifies them against stored hashes.
///
/// Stored hashes, the dummy hash and comparisons all go through one
/// implementation so they share parameters.
pub trait HashComparator: Send + Sync + 'static {
    /// Hash `password` for storage.
    fn hash(&self, password: &str) -> String;

    /// Returns `true` iff `candidate` matches `stored_hash`.
    ///
    /// A malformed or unsupported hash compares `false`.
    fn compare(&self, candidate: &str, stored_hash: &str) -> bool;

    /// A fixed, valid hash of a secret nobody knows.
    fn dummy_hash(&self) -> &str;
}

/// Argon2 comparator backed by `password-auth`.
#[derive(Clone)]
pub struct Argon2HashComparator {
    dummy_hash: String,
}

impl Argon2HashComparator {
    /// Build a comparator, computing the dummy hash with the same parameters
    /// as real password hashes.
    pub fn new() -> Self {
        Self {
            dummy_hash: generate_hash("turnstile-dummy-password"),
        }
    }
}

impl Default for Argon2HashComparator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Argon2HashComparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Argon2HashComparator").finish_non_exhaustive()
    }
}

impl HashComparator for Argon2HashComparator {
    fn hash(&self, password: &str) -> String {
        generate_hash(password)
    }

    fn compare(&self, candidate: &str, stored_hash: &str) -> bool {
        verify_password(candidate, stored_hash).is_ok()
    }

    fn dummy_hash(&self) -> &str {
        &self.dummy_hash
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_matches_own_hash() {
        let comparator = Argon2HashComparator::new();
        let hash = comparator.hash("correct horse battery staple");

        assert!(comparator.compare("correct horse battery staple", &hash));
        assert!(!comparator.compare("wrong", &hash));
    }

    #[test]
    fn test_malformed_hash_compares_false() {
        let comparator = Argon2HashComparator::new();
        assert!(!comparator.compare("anything", "not-a-phc-string"));
        assert!(!comparator.compare("anything", ""));
    }

    #[test]
    fn test_dummy_hash_is_valid_argon2() {
        let comparator = Argon2HashComparator::new();
        assert!(comparator.dummy_hash().starts_with("$argon2"));
        assert!(!comparator.compare("", comparator.dummy_hash()));
        assert!(!comparator.compare("password", comparator.dummy_hash()));
    }

    #[test]
    fn test_debug_does_not_leak_dummy_hash() {
        let comparator = Argon2HashComparator::new();
        assert!(!format!("{comparator:?}").contains("$argon2"));
    }
}
