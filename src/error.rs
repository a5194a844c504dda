//! Error types for the Tessera library.
//!
//! All fallible operations return [`Result`], whose error side is the
//! [`TesseraError`] enum.
//!
//! Capability gaps are not errors: an unsupported ordinal seek is reported as
//! [`Capability::Unsupported`](crate::codec::Capability) and a field without
//! positions yields `None` from `docs_and_positions`. Conformance failures found
//! by the verifier are reported as [`TesseraError::Conformance`].
//!
//! # Examples
//!
//! ```
//! use tessera::error::{Result, TesseraError};
//!
//! fn example_operation() -> Result<()> {
//!     Err(TesseraError::invalid_argument("Invalid input"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Tessera operations.
#[derive(Error, Debug)]
pub enum TesseraError {
    /// I/O errors (file operations, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Storage-related errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// Corrupt or unsupported persisted postings data
    #[error("Codec error: {0}")]
    Codec(String),

    /// Field registry errors
    #[error("Schema error: {0}")]
    Schema(String),

    /// Invalid operation (enumerator misuse, closed resources)
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// Invalid argument or configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Reader output disagreed with the reference model
    #[error("Conformance failure: {0}")]
    Conformance(String),

    /// Thread join errors
    #[error("Thread join error: {0}")]
    ThreadJoinError(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with TesseraError.
pub type Result<T> = std::result::Result<T, TesseraError>;

impl TesseraError {
    /// Create a new storage error.
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        TesseraError::Storage(msg.into())
    }

    /// Create a new codec error.
    pub fn codec<S: Into<String>>(msg: S) -> Self {
        TesseraError::Codec(msg.into())
    }

    /// Create a new schema error.
    pub fn schema<S: Into<String>>(msg: S) -> Self {
        TesseraError::Schema(msg.into())
    }

    /// Create a new invalid operation error.
    pub fn invalid_operation<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidOperation(msg.into())
    }

    /// Create a new invalid argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(msg.into())
    }

    /// Create a new invalid config error.
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        TesseraError::InvalidArgument(format!("Invalid configuration: {}", msg.into()))
    }

    /// Create a new conformance failure.
    pub fn conformance<S: Into<String>>(msg: S) -> Self {
        TesseraError::Conformance(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        TesseraError::Other(msg.into())
    }

    /// Whether this error reports a reader/model disagreement.
    pub fn is_conformance(&self) -> bool {
        matches!(self, TesseraError::Conformance(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_construction() {
        let error = TesseraError::codec("bad magic");
        assert_eq!(error.to_string(), "Codec error: bad magic");

        let error = TesseraError::schema("unknown field");
        assert_eq!(error.to_string(), "Schema error: unknown field");

        let error = TesseraError::invalid_config("threads must be > 0");
        assert_eq!(
            error.to_string(),
            "Invalid argument: Invalid configuration: threads must be > 0"
        );

        let error = TesseraError::conformance("doc mismatch");
        assert!(error.is_conformance());
        assert!(!TesseraError::other("x").is_conformance());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error = TesseraError::from(io_error);

        match error {
            TesseraError::Io(_) => {}
            _ => panic!("Expected IO error variant"),
        }
    }
}
