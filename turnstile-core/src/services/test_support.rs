//! In-memory repositories for service tests.

use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{
    Error,
    attempt::{LoginAttempt, NewLoginAttempt},
    crypto::HashComparator,
    error::StorageError,
    repositories::{LoginAttemptRepository, UserRepository},
    user::{NewUser, User, UserCredentials},
};

/// Mock login attempt log with switchable failures
#[derive(Default)]
pub struct MockLoginAttemptRepository {
    attempts: Mutex<Vec<LoginAttempt>>,
    pub fail_inserts: AtomicBool,
    pub fail_reads: AtomicBool,
}

impl MockLoginAttemptRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    pub fn all(&self) -> Vec<LoginAttempt> {
        self.attempts.lock().unwrap().clone()
    }
}

#[async_trait]
impl LoginAttemptRepository for MockLoginAttemptRepository {
    async fn insert(
        &self,
        attempt: NewLoginAttempt,
        occurred_at: DateTime<Utc>,
    ) -> Result<LoginAttempt, Error> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(StorageError::Database("insert failed".to_string()).into());
        }
        let mut attempts = self.attempts.lock().unwrap();
        let mut record = attempt.at(occurred_at);
        record.id = attempts.len() as i64 + 1;
        attempts.push(record.clone());
        Ok(record)
    }

    async fn find_by_email_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, Error> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::Database("read failed".to_string()).into());
        }
        let mut matching: Vec<LoginAttempt> = self
            .attempts
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.email == email && a.occurred_at >= since)
            .cloned()
            .collect();
        matching.sort_by_key(|a| (a.occurred_at, a.id));
        Ok(matching)
    }

    async fn delete_failures(&self, email: &str) -> Result<u64, Error> {
        let mut attempts = self.attempts.lock().unwrap();
        let before_len = attempts.len();
        attempts.retain(|a| a.email != email || a.succeeded);
        Ok((before_len - attempts.len()) as u64)
    }

    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let mut attempts = self.attempts.lock().unwrap();
        let before_len = attempts.len();
        attempts.retain(|a| a.occurred_at >= before);
        Ok((before_len - attempts.len()) as u64)
    }
}

/// Mock user store keyed by lowercase email
#[derive(Default)]
pub struct MockUserRepository {
    users: Mutex<Vec<UserCredentials>>,
    pub fail_lookups: AtomicBool,
}

impl MockUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, email: &str, password_hash: &str) -> Self {
        let user = User::builder()
            .email(email.to_string())
            .name(Some("Test User".to_string()))
            .build()
            .unwrap();
        self.users.lock().unwrap().push(UserCredentials {
            user,
            password_hash: password_hash.to_string(),
        });
        self
    }
}

#[async_trait]
impl UserRepository for MockUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, Error> {
        if self.fail_lookups.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("lookup failed".to_string()).into());
        }
        Ok(self
            .users
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.user.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let mut users = self.users.lock().unwrap();
        if users
            .iter()
            .any(|c| c.user.email.eq_ignore_ascii_case(&user.email))
        {
            return Err(crate::error::AuthError::UserAlreadyExists.into());
        }
        let created = User::builder()
            .id(user.id)
            .email(user.email)
            .name(user.name)
            .build()?;
        users.push(UserCredentials {
            user: created.clone(),
            password_hash: user.password_hash,
        });
        Ok(created)
    }
}

/// Plaintext comparator that counts calls and remembers which hashes it saw.
///
/// A stored hash of `"plain:secret"` matches the candidate `"secret"`.
pub struct CountingComparator {
    pub calls: AtomicUsize,
    pub seen: Mutex<Vec<String>>,
}

pub const DUMMY_HASH: &str = "plain:<dummy>";

impl CountingComparator {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HashComparator for CountingComparator {
    fn hash(&self, password: &str) -> String {
        format!("plain:{password}")
    }

    fn compare(&self, candidate: &str, stored_hash: &str) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(stored_hash.to_string());
        stored_hash
            .strip_prefix("plain:")
            .is_some_and(|expected| expected == candidate)
    }

    fn dummy_hash(&self) -> &str {
        DUMMY_HASH
    }
}
