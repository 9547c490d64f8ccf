//! Error types for Cedar.

use thiserror::Error;

/// Result type alias using CedarError.
pub type Result<T> = std::result::Result<T, CedarError>;

/// Errors that can occur in Cedar operations.
///
/// Inserting a key that is already present is not an error: the tree reports
/// it as `Ok(false)`.
#[derive(Debug, Error)]
pub enum CedarError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Index file errors
    /// A node line does not follow the index grammar or breaks a tree
    /// invariant. Splits touch several lines without atomicity, so an
    /// interrupted insert shows up here on the next open or verification.
    #[error("Index corrupted at address {address}: {reason}")]
    IndexCorrupted { address: u64, reason: String },

    #[error("Index header corrupted: {0}")]
    HeaderCorrupted(String),

    #[error("Encoded line needs {needed} bytes but width is {width}")]
    LineOverflow { width: usize, needed: usize },

    // Dictionary errors
    #[error("Value not registered in dictionary: {0}")]
    UnknownDictionaryValue(String),

    #[error("Code not assigned by dictionary: {0}")]
    UnknownCode(u64),

    // Table errors
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Schema mismatch: expected {expected} fields, got {actual}")]
    SchemaMismatch { expected: usize, actual: usize },

    #[error("Tuple page {page} corrupted: {reason}")]
    TupleCorrupted { page: u64, reason: String },

    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Invalid parameter: {name} = {value}")]
    InvalidParameter { name: String, value: String },

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CedarError {
    /// Shorthand for an `IndexCorrupted` error.
    pub fn corrupted(address: u64, reason: impl Into<String>) -> Self {
        CedarError::IndexCorrupted {
            address,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::UnexpectedEof, "short read");
        let err: CedarError = io_err.into();
        assert!(matches!(err, CedarError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_index_corrupted_display() {
        let err = CedarError::corrupted(101, "unknown tag 'X'");
        assert_eq!(
            err.to_string(),
            "Index corrupted at address 101: unknown tag 'X'"
        );
    }

    #[test]
    fn test_line_overflow_display() {
        let err = CedarError::LineOverflow {
            width: 100,
            needed: 140,
        };
        assert_eq!(
            err.to_string(),
            "Encoded line needs 140 bytes but width is 100"
        );
    }

    #[test]
    fn test_dictionary_errors_display() {
        let err = CedarError::UnknownDictionaryValue("1996".to_string());
        assert_eq!(err.to_string(), "Value not registered in dictionary: 1996");

        let err = CedarError::UnknownCode(42);
        assert_eq!(err.to_string(), "Code not assigned by dictionary: 42");
    }

    #[test]
    fn test_table_errors_display() {
        let err = CedarError::ColumnNotFound("rotulo".to_string());
        assert_eq!(err.to_string(), "Column not found: rotulo");

        let err = CedarError::SchemaMismatch {
            expected: 5,
            actual: 3,
        };
        assert_eq!(err.to_string(), "Schema mismatch: expected 5 fields, got 3");
    }

    #[test]
    fn test_config_errors_display() {
        let err = CedarError::InvalidParameter {
            name: "branching_factor".to_string(),
            value: "2".to_string(),
        };
        assert_eq!(err.to_string(), "Invalid parameter: branching_factor = 2");
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<CedarError>();
    }
}
