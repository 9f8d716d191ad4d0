use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use turnstile_core::{
    Error, NewUser, User, UserCredentials, UserId,
    error::{AuthError, StorageError, utilities::DatabaseResultExt},
    repositories::UserRepository,
};

pub struct SqliteUserRepository {
    pool: SqlitePool,
}

impl SqliteUserRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SqliteUserRow {
    id: String,
    name: Option<String>,
    email: String,
    password_hash: String,
    created_at: i64,
    updated_at: i64,
}

fn timestamp(seconds: i64) -> Result<DateTime<Utc>, Error> {
    DateTime::from_timestamp(seconds, 0).ok_or_else(|| {
        Error::Storage(StorageError::Database(format!(
            "Invalid timestamp: {seconds}"
        )))
    })
}

impl TryFrom<SqliteUserRow> for UserCredentials {
    type Error = Error;

    fn try_from(row: SqliteUserRow) -> Result<Self, Self::Error> {
        let user = User::builder()
            .id(UserId::new(&row.id))
            .name(row.name)
            .email(row.email)
            .created_at(timestamp(row.created_at)?)
            .updated_at(timestamp(row.updated_at)?)
            .build()?;

        Ok(UserCredentials {
            user,
            password_hash: row.password_hash,
        })
    }
}

#[async_trait]
impl UserRepository for SqliteUserRepository {
    async fn find_by_email(&self, email: &str) -> Result<Option<UserCredentials>, Error> {
        // The email column is COLLATE NOCASE, so this match is case-insensitive
        let row = sqlx::query_as::<_, SqliteUserRow>(
            r#"
            SELECT id, name, email, password_hash, created_at, updated_at
            FROM users
            WHERE email = ?1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_db_err_with_context("Failed to find user by email")?;

        row.map(UserCredentials::try_from).transpose()
    }

    async fn create(&self, user: NewUser) -> Result<User, Error> {
        let now = Utc::now().timestamp();

        let result = sqlx::query_as::<_, SqliteUserRow>(
            r#"
            INSERT INTO users (id, name, email, password_hash, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            RETURNING id, name, email, password_hash, created_at, updated_at
            "#,
        )
        .bind(user.id.as_str())
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(now)
        .bind(now)
        .fetch_one(&self.pool)
        .await;

        let row = match result {
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                return Err(Error::Auth(AuthError::UserAlreadyExists));
            }
            result => result.map_db_err_with_context("Failed to create user")?,
        };

        Ok(UserCredentials::try_from(row)?.user)
    }
}
