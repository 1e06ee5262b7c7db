//! Core error types for tabula.
//!
//! [`DbError`] covers every failure the ORM core can surface. The variants
//! fall into the buckets reported by [`DbError::category`]: construction
//! errors raised while building a query, validation errors raised before any
//! I/O, driver errors coming back from a backend, and unsupported-operation
//! errors from backends that refuse a structural change.

use thiserror::Error;

/// The coarse bucket an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Malformed query AST usage, raised at build or compile time.
    Construction,
    /// Invalid input detected before touching the database.
    Validation,
    /// A failure reported by the underlying driver.
    Driver,
    /// A backend refused a requested structural change.
    Unsupported,
}

/// The primary error type for tabula.
#[derive(Error, Debug)]
pub enum DbError {
    // ── Construction ─────────────────────────────────────────────────

    /// The query AST was built or compiled incorrectly.
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    // ── Validation ───────────────────────────────────────────────────

    /// Input failed validation before any statement was issued.
    #[error("Validation error: {0}")]
    Validation(String),

    /// A lookup expected a row but none matched.
    #[error("Record does not exist: {0}")]
    DoesNotExist(String),

    /// A value could not be converted to or from its stored form.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Configuration(String),

    // ── Driver ───────────────────────────────────────────────────────

    /// A generic database error reported by a driver.
    #[error("Database error: {0}")]
    Database(String),

    /// Starting, committing or rolling back a transaction failed, or a
    /// transaction was started while another was active.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ── Unsupported ──────────────────────────────────────────────────

    /// The backend cannot perform the requested operation.
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
}

impl DbError {
    /// Returns the category this error belongs to.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidQuery(_) => ErrorCategory::Construction,
            Self::Validation(_)
            | Self::DoesNotExist(_)
            | Self::Serialization(_)
            | Self::Configuration(_) => ErrorCategory::Validation,
            Self::Database(_) | Self::Transaction(_) | Self::Io(_) => ErrorCategory::Driver,
            Self::Unsupported(_) => ErrorCategory::Unsupported,
        }
    }

    /// Shorthand for an [`DbError::InvalidQuery`].
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Shorthand for a [`DbError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// A convenience type alias for `Result<T, DbError>`.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            DbError::InvalidQuery("x".into()).category(),
            ErrorCategory::Construction
        );
        assert_eq!(
            DbError::Validation("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            DbError::DoesNotExist("x".into()).category(),
            ErrorCategory::Validation
        );
        assert_eq!(
            DbError::Database("x".into()).category(),
            ErrorCategory::Driver
        );
        assert_eq!(
            DbError::Transaction("x".into()).category(),
            ErrorCategory::Driver
        );
        assert_eq!(
            DbError::Unsupported("x".into()).category(),
            ErrorCategory::Unsupported
        );
    }

    #[test]
    fn test_error_display() {
        let err = DbError::invalid_query("BETWEEN requires exactly two values");
        assert_eq!(
            err.to_string(),
            "Invalid query: BETWEEN requires exactly two values"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file missing");
        let err: DbError = io_err.into();
        assert_eq!(err.category(), ErrorCategory::Driver);
        assert!(err.to_string().contains("file missing"));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: DbError = json_err.into();
        assert!(matches!(err, DbError::Serialization(_)));
    }
}
