//! SQLite implementation of the login attempt log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use turnstile_core::{
    Error, FailureReason, LoginAttempt, NewLoginAttempt,
    error::{StorageError, utilities::DatabaseResultExt},
    repositories::LoginAttemptRepository,
};

/// SQLite repository for login attempts. Timestamps are stored as unix milliseconds.
pub struct SqliteLoginAttemptRepository {
    pool: SqlitePool,
}

impl SqliteLoginAttemptRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Internal struct for query results
#[derive(Debug, sqlx::FromRow)]
struct SqliteLoginAttempt {
    id: i64,
    email: String,
    origin_key: Option<String>,
    succeeded: bool,
    failure_reason: Option<String>,
    occurred_at: i64,
}

impl TryFrom<SqliteLoginAttempt> for LoginAttempt {
    type Error = Error;

    fn try_from(row: SqliteLoginAttempt) -> Result<Self, Self::Error> {
        let occurred_at = DateTime::from_timestamp_millis(row.occurred_at).ok_or_else(|| {
            StorageError::Database(format!("Invalid timestamp: {}", row.occurred_at))
        })?;
        let failure_reason = row
            .failure_reason
            .as_deref()
            .map(str::parse::<FailureReason>)
            .transpose()?;

        Ok(LoginAttempt {
            id: row.id,
            email: row.email,
            origin_key: row.origin_key,
            succeeded: row.succeeded,
            failure_reason,
            occurred_at,
        })
    }
}

#[async_trait]
impl LoginAttemptRepository for SqliteLoginAttemptRepository {
    async fn insert(
        &self,
        attempt: NewLoginAttempt,
        occurred_at: DateTime<Utc>,
    ) -> Result<LoginAttempt, Error> {
        let row = sqlx::query_as::<_, SqliteLoginAttempt>(
            r#"
            INSERT INTO login_attempts (email, origin_key, succeeded, failure_reason, occurred_at)
            VALUES (?, ?, ?, ?, ?)
            RETURNING id, email, origin_key, succeeded, failure_reason, occurred_at
            "#,
        )
        .bind(&attempt.email)
        .bind(&attempt.origin_key)
        .bind(attempt.succeeded)
        .bind(attempt.failure_reason.map(|r| r.as_str()))
        .bind(occurred_at.timestamp_millis())
        .fetch_one(&self.pool)
        .await
        .map_db_err_with_context("Failed to record login attempt")?;

        row.try_into()
    }

    async fn find_by_email_since(
        &self,
        email: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<LoginAttempt>, Error> {
        let rows = sqlx::query_as::<_, SqliteLoginAttempt>(
            r#"
            SELECT id, email, origin_key, succeeded, failure_reason, occurred_at
            FROM login_attempts
            WHERE email = ? AND occurred_at >= ?
            ORDER BY occurred_at, id
            "#,
        )
        .bind(email)
        .bind(since.timestamp_millis())
        .fetch_all(&self.pool)
        .await
        .map_db_err_with_context("Failed to query login attempts")?;

        rows.into_iter().map(LoginAttempt::try_from).collect()
    }

    async fn delete_failures(&self, email: &str) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE email = ? AND succeeded = 0")
            .bind(email)
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to clear login attempts")?;

        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, before: DateTime<Utc>) -> Result<u64, Error> {
        let result = sqlx::query("DELETE FROM login_attempts WHERE occurred_at < ?")
            .bind(before.timestamp_millis())
            .execute(&self.pool)
            .await
            .map_db_err_with_context("Failed to cleanup old login attempts")?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::{SqliteMigrationManager, all_migrations};
    use chrono::Duration;
    use turnstile_migration::MigrationManager;

    async fn setup_test_db() -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");

        let manager = SqliteMigrationManager::new(pool.clone());
        manager
            .initialize()
            .await
            .expect("Failed to initialize migrations");
        manager
            .up(&all_migrations())
            .await
            .expect("Failed to run migrations");

        pool
    }

    fn failure(email: &str, reason: FailureReason) -> NewLoginAttempt {
        NewLoginAttempt::failure(email, Some("192.168.1.1".to_string()), reason)
    }

    #[tokio::test]
    async fn test_insert_round_trips_fields() {
        let repo = SqliteLoginAttemptRepository::new(setup_test_db().await);
        let now = Utc::now();

        let attempt = repo
            .insert(failure("test@example.com", FailureReason::InvalidPassword), now)
            .await
            .expect("Failed to record attempt");

        assert!(attempt.id > 0);
        assert_eq!(attempt.email, "test@example.com");
        assert_eq!(attempt.origin_key.as_deref(), Some("192.168.1.1"));
        assert!(!attempt.succeeded);
        assert_eq!(attempt.failure_reason, Some(FailureReason::InvalidPassword));
        assert_eq!(attempt.occurred_at.timestamp_millis(), now.timestamp_millis());

        let success = repo
            .insert(NewLoginAttempt::success("test@example.com", None), now)
            .await
            .unwrap();
        assert!(success.succeeded);
        assert_eq!(success.failure_reason, None);
    }

    #[tokio::test]
    async fn test_find_by_email_since_filters_and_orders() {
        let repo = SqliteLoginAttemptRepository::new(setup_test_db().await);
        let now = Utc::now();

        repo.insert(
            failure("test@example.com", FailureReason::UserNotFound),
            now - Duration::hours(2),
        )
        .await
        .unwrap();
        repo.insert(
            failure("test@example.com", FailureReason::InvalidPassword),
            now,
        )
        .await
        .unwrap();
        repo.insert(
            failure("test@example.com", FailureReason::AccountLocked),
            now - Duration::minutes(5),
        )
        .await
        .unwrap();
        repo.insert(
            failure("other@example.com", FailureReason::InvalidPassword),
            now,
        )
        .await
        .unwrap();

        let attempts = repo
            .find_by_email_since("test@example.com", now - Duration::hours(1))
            .await
            .unwrap();
        let reasons: Vec<_> = attempts.iter().map(|a| a.failure_reason).collect();
        assert_eq!(
            reasons,
            vec![
                Some(FailureReason::AccountLocked),
                Some(FailureReason::InvalidPassword)
            ]
        );

        // The lower bound is inclusive
        let attempts = repo
            .find_by_email_since("test@example.com", now)
            .await
            .unwrap();
        assert_eq!(attempts.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_failures_keeps_successes_and_other_emails() {
        let repo = SqliteLoginAttemptRepository::new(setup_test_db().await);
        let now = Utc::now();

        for _ in 0..3 {
            repo.insert(failure("test1@example.com", FailureReason::InvalidPassword), now)
                .await
                .unwrap();
            repo.insert(failure("test2@example.com", FailureReason::InvalidPassword), now)
                .await
                .unwrap();
        }
        repo.insert(NewLoginAttempt::success("test1@example.com", None), now)
            .await
            .unwrap();

        assert_eq!(repo.delete_failures("test1@example.com").await.unwrap(), 3);
        assert_eq!(repo.delete_failures("test1@example.com").await.unwrap(), 0);

        let remaining = repo
            .find_by_email_since("test1@example.com", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert!(remaining[0].succeeded);

        let other = repo
            .find_by_email_since("test2@example.com", now - Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(other.len(), 3);
    }

    #[tokio::test]
    async fn test_delete_older_than() {
        let repo = SqliteLoginAttemptRepository::new(setup_test_db().await);
        let now = Utc::now();

        repo.insert(
            failure("test@example.com", FailureReason::InvalidPassword),
            now - Duration::days(8),
        )
        .await
        .unwrap();
        repo.insert(
            failure("test@example.com", FailureReason::InvalidPassword),
            now,
        )
        .await
        .unwrap();

        let deleted = repo
            .delete_older_than(now - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(deleted, 1);

        let remaining = repo
            .find_by_email_since("test@example.com", now - Duration::days(30))
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
    }

    #[tokio::test]
    async fn test_query_errors_carry_operation_context() {
        // No migrations, so the table does not exist
        let pool = SqlitePool::connect("sqlite::memory:")
            .await
            .expect("Failed to create pool");
        let repo = SqliteLoginAttemptRepository::new(pool);

        let err = repo
            .insert(
                failure("test@example.com", FailureReason::InvalidPassword),
                Utc::now(),
            )
            .await
            .unwrap_err();
        match err {
            Error::Storage(StorageError::Database(msg)) => {
                assert!(msg.starts_with("Failed to record login attempt: "));
                assert!(msg.contains("login_attempts"));
            }
            other => panic!("Expected storage database error, got {other:?}"),
        }

        let err = repo.delete_older_than(Utc::now()).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Storage(StorageError::Database(msg))
                if msg.starts_with("Failed to cleanup old login attempts: ")
        ));
    }
}
