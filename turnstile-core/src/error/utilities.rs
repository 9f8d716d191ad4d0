use crate::{
    Error,
    error::{ConfigError, StorageError},
};

/// Extension trait for Result types to simplify database error mapping
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::error::utilities::DatabaseResultExt;
///
/// query.execute(&pool).await.map_db_err_with_context("Failed to insert login attempt")?;
/// ```
pub trait DatabaseResultExt<T> {
    /// Convert a database error to a Turnstile storage error
    fn map_db_err(self) -> Result<T, Error>;

    /// Convert a database error to a Turnstile storage error with additional context
    ///
    /// The underlying error is also logged at error level.
    fn map_db_err_with_context(self, context: &str) -> Result<T, Error>;
}

impl<T, E: std::fmt::Display> DatabaseResultExt<T> for Result<T, E> {
    fn map_db_err(self) -> Result<T, Error> {
        self.map_err(|e| Error::Storage(StorageError::Database(e.to_string())))
    }

    fn map_db_err_with_context(self, context: &str) -> Result<T, Error> {
        self.map_err(|e| {
            tracing::error!(error = %e, "{context}");
            Error::Storage(StorageError::Database(format!("{context}: {e}")))
        })
    }
}

/// Parse an optional raw setting, keeping `default` when it is absent.
///
/// Present but unparseable values are reported as [`ConfigError::InvalidValue`]
/// rather than silently falling back to the default.
pub fn parse_setting<T: std::str::FromStr>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value,
            }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_result_ext() {
        let error_result: Result<i32, &str> = Err("database connection failed");
        let mapped = error_result.map_db_err();

        match mapped.unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "database connection failed");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_database_result_ext_with_context() {
        let error_result: Result<i32, &str> = Err("timeout");
        let mapped = error_result.map_db_err_with_context("Failed to record attempt");

        match mapped.unwrap_err() {
            Error::Storage(StorageError::Database(msg)) => {
                assert_eq!(msg, "Failed to record attempt: timeout");
            }
            _ => panic!("Expected storage database error"),
        }
    }

    #[test]
    fn test_parse_setting_default_when_missing() {
        let value: u32 = parse_setting("KEY", None, 5).unwrap();
        assert_eq!(value, 5);
    }

    #[test]
    fn test_parse_setting_trims_whitespace() {
        let value: u32 = parse_setting("KEY", Some(" 12 ".to_string()), 5).unwrap();
        assert_eq!(value, 12);
    }

    #[test]
    fn test_parse_setting_rejects_garbage() {
        let result: Result<bool, _> = parse_setting("KEY", Some("maybe".to_string()), true);
        match result.unwrap_err() {
            ConfigError::InvalidValue { key, value } => {
                assert_eq!(key, "KEY");
                assert_eq!(value, "maybe");
            }
            e => panic!("Expected invalid value error, got {e:?}"),
        }
    }
}
