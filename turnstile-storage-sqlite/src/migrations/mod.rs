use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Database, Sqlite, SqlitePool};
use turnstile_migration::{
    Migration, MigrationError, MigrationManager, MigrationRecord, validate_versions,
};

/// Every migration for the SQLite backend, in version order.
pub fn all_migrations() -> Vec<Box<dyn Migration<Sqlite>>> {
    vec![
        Box::new(CreateUsersTable),
        Box::new(CreateLoginAttemptsTable),
        Box::new(CreateLoginAttemptsIndexes),
    ]
}

pub struct SqliteMigrationManager {
    pool: SqlitePool,
}

impl SqliteMigrationManager {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MigrationManager<Sqlite> for SqliteMigrationManager {
    async fn initialize(&self) -> Result<(), MigrationError> {
        sqlx::query(
            format!(
                r#"
            CREATE TABLE IF NOT EXISTS {} (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at INTEGER NOT NULL DEFAULT (unixepoch())
            );"#,
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn up(&self, migrations: &[Box<dyn Migration<Sqlite>>]) -> Result<(), MigrationError> {
        validate_versions(migrations.iter().map(|m| m.version()))?;

        for migration in migrations {
            if !self.is_applied(migration.version()).await? {
                let mut tx = self.pool.begin().await?;

                tracing::info!(
                    version = migration.version(),
                    name = migration.name(),
                    "Applying migration"
                );

                migration
                    .up(&mut *tx as &mut <Sqlite as Database>::Connection)
                    .await?;

                sqlx::query(
                    format!(
                        "INSERT INTO {} (version, name, applied_at) VALUES (?, ?, ?)",
                        self.get_migration_table_name()
                    )
                    .as_str(),
                )
                .bind(migration.version())
                .bind(migration.name())
                .bind(Utc::now().timestamp())
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn down(&self, migrations: &[Box<dyn Migration<Sqlite>>]) -> Result<(), MigrationError> {
        validate_versions(migrations.iter().map(|m| m.version()))?;

        for migration in migrations.iter().rev() {
            if self.is_applied(migration.version()).await? {
                let mut tx = self.pool.begin().await?;

                tracing::info!(
                    version = migration.version(),
                    name = migration.name(),
                    "Rolling back migration"
                );

                migration
                    .down(&mut *tx as &mut <Sqlite as Database>::Connection)
                    .await?;

                sqlx::query(
                    format!(
                        "DELETE FROM {} WHERE version = ?",
                        self.get_migration_table_name()
                    )
                    .as_str(),
                )
                .bind(migration.version())
                .execute(&mut *tx)
                .await?;

                tx.commit().await?;
            }
        }
        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<Vec<MigrationRecord>, MigrationError> {
        let records = sqlx::query_as::<_, MigrationRecord>(
            format!(
                "SELECT version, name, applied_at FROM {} ORDER BY version",
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(records)
    }

    async fn is_applied(&self, version: i64) -> Result<bool, MigrationError> {
        let result: bool = sqlx::query_scalar(
            format!(
                "SELECT EXISTS(SELECT 1 FROM {} WHERE version = ?)",
                self.get_migration_table_name()
            )
            .as_str(),
        )
        .bind(version)
        .fetch_one(&self.pool)
        .await?;
        Ok(result)
    }
}

pub struct CreateUsersTable;

#[async_trait]
impl Migration<Sqlite> for CreateUsersTable {
    fn version(&self) -> i64 {
        1
    }

    fn name(&self) -> &str {
        "CreateUsersTable"
    }

    async fn up<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT,
                email TEXT NOT NULL UNIQUE COLLATE NOCASE,
                password_hash TEXT NOT NULL,
                created_at INTEGER DEFAULT (unixepoch()),
                updated_at INTEGER DEFAULT (unixepoch())
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS users")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateLoginAttemptsTable;

#[async_trait]
impl Migration<Sqlite> for CreateLoginAttemptsTable {
    fn version(&self) -> i64 {
        2
    }

    fn name(&self) -> &str {
        "CreateLoginAttemptsTable"
    }

    async fn up<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        // No foreign key to users: attempts are recorded for unknown emails too
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS login_attempts (
                id INTEGER PRIMARY KEY,
                email TEXT NOT NULL,
                origin_key TEXT,
                succeeded INTEGER NOT NULL,
                failure_reason TEXT,
                occurred_at INTEGER NOT NULL
            );"#,
        )
        .execute(conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query("DROP TABLE IF EXISTS login_attempts")
            .execute(conn)
            .await?;
        Ok(())
    }
}

pub struct CreateLoginAttemptsIndexes;

#[async_trait]
impl Migration<Sqlite> for CreateLoginAttemptsIndexes {
    fn version(&self) -> i64 {
        3
    }

    fn name(&self) -> &str {
        "CreateLoginAttemptsIndexes"
    }

    async fn up<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_login_attempts_email_occurred_at ON login_attempts(email, occurred_at)",
        )
        .execute(&mut *conn)
        .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_login_attempts_occurred_at ON login_attempts(occurred_at)",
        )
        .execute(&mut *conn)
        .await?;
        Ok(())
    }

    async fn down<'a>(
        &'a self,
        conn: &'a mut <Sqlite as Database>::Connection,
    ) -> Result<(), MigrationError> {
        sqlx::query("DROP INDEX IF EXISTS idx_login_attempts_email_occurred_at")
            .execute(&mut *conn)
            .await?;
        sqlx::query("DROP INDEX IF EXISTS idx_login_attempts_occurred_at")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}
