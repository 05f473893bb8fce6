//! Engine error types.
//!
//! Every layer of the query engine (parser, planner, optimizer, executor)
//! has its own error enum; all of them convert into [`TesseraError`] at the
//! public API boundary.

use std::fmt;
use thiserror::Error;

/// Error codes for categorizing errors.
///
/// These codes can be used for programmatic error handling and
/// are stable across versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    // General errors (0x0000 - 0x00FF)
    /// Unknown or unspecified error.
    Unknown = 0x0000,
    /// Internal error (bug).
    Internal = 0x0001,
    /// Operation not supported.
    NotSupported = 0x0002,
    /// Invalid argument provided.
    InvalidArgument = 0x0003,
    /// Operation was cancelled.
    Cancelled = 0x0005,

    // I/O errors (0x0100 - 0x01FF)
    /// General I/O error.
    Io = 0x0100,
    /// Error raised by an external reader, writer or cache.
    External = 0x0101,

    // Planning errors (0x0200 - 0x02FF)
    /// SQL syntax error.
    SyntaxError = 0x0200,
    /// Table not found.
    TableNotFound = 0x0201,
    /// Column not found.
    ColumnNotFound = 0x0202,
    /// Query planning failed.
    PlanningFailed = 0x0203,

    // Execution errors (0x0300 - 0x03FF)
    /// Type mismatch.
    TypeMismatch = 0x0300,
    /// Query execution failed.
    ExecutionFailed = 0x0301,
}

impl ErrorCode {
    /// Returns the numeric code.
    #[inline]
    #[must_use]
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Returns the error category name.
    #[must_use]
    pub const fn category(&self) -> &'static str {
        match (*self as u16) >> 8 {
            0x00 => "General",
            0x01 => "I/O",
            0x02 => "Planning",
            0x03 => "Execution",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// The main error type for Tessera.
///
/// # Example
///
/// ```rust
/// use tessera_common::error::{ErrorCode, TesseraError};
///
/// let err = TesseraError::TableNotFound { table: "orders".into() };
/// assert_eq!(err.code(), ErrorCode::TableNotFound);
/// ```
#[derive(Debug, Error)]
pub enum TesseraError {
    // ==========================================================================
    // General Errors
    // ==========================================================================
    /// Internal error - this indicates a bug.
    #[error("internal error: {message}")]
    Internal {
        /// Error message.
        message: String,
    },

    /// Operation not supported.
    #[error("operation not supported: {operation}")]
    NotSupported {
        /// The unsupported operation.
        operation: String,
    },

    /// Invalid argument provided.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Error message.
        message: String,
    },

    /// Query was cancelled.
    #[error("query was cancelled")]
    Cancelled,

    // ==========================================================================
    // I/O Errors
    // ==========================================================================
    /// I/O error from a reader, writer or cache stream.
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Error reported by an external collaborator, passed through unmodified.
    #[error("external error: {source}")]
    External {
        /// The collaborator's error.
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ==========================================================================
    // Planning Errors
    // ==========================================================================
    /// SQL syntax error.
    #[error("syntax error: {message}")]
    SyntaxError {
        /// Parser message.
        message: String,
    },

    /// Table not found.
    #[error("table '{table}' not found")]
    TableNotFound {
        /// Table name.
        table: String,
    },

    /// Column not found.
    #[error("column '{column}' not found")]
    ColumnNotFound {
        /// Column name.
        column: String,
    },

    /// The query is semantically malformed.
    #[error("planning failed: {message}")]
    Planning {
        /// Error message.
        message: String,
    },

    // ==========================================================================
    // Execution Errors
    // ==========================================================================
    /// Type mismatch.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Expected type.
        expected: String,
        /// Actual type.
        actual: String,
    },

    /// Query execution failed.
    #[error("query execution failed: {reason}")]
    ExecutionFailed {
        /// Failure reason.
        reason: String,
    },

    // ==========================================================================
    // Configuration Errors
    // ==========================================================================
    /// Invalid configuration.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Error message.
        message: String,
    },
}

impl TesseraError {
    /// Returns the error code for this error.
    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Internal { .. } => ErrorCode::Internal,
            Self::NotSupported { .. } => ErrorCode::NotSupported,
            Self::InvalidArgument { .. } | Self::InvalidConfig { .. } => {
                ErrorCode::InvalidArgument
            }
            Self::Cancelled => ErrorCode::Cancelled,
            Self::Io { .. } => ErrorCode::Io,
            Self::External { .. } => ErrorCode::External,
            Self::SyntaxError { .. } => ErrorCode::SyntaxError,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::ColumnNotFound { .. } => ErrorCode::ColumnNotFound,
            Self::Planning { .. } => ErrorCode::PlanningFailed,
            Self::TypeMismatch { .. } => ErrorCode::TypeMismatch,
            Self::ExecutionFailed { .. } => ErrorCode::ExecutionFailed,
        }
    }

    /// Returns true if the error was raised before any rows were produced.
    #[must_use]
    pub const fn is_planning(&self) -> bool {
        matches!(
            self.code(),
            ErrorCode::SyntaxError
                | ErrorCode::TableNotFound
                | ErrorCode::ColumnNotFound
                | ErrorCode::PlanningFailed
                | ErrorCode::NotSupported
        )
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[must_use]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a planning error.
    #[must_use]
    pub fn planning(message: impl Into<String>) -> Self {
        Self::Planning {
            message: message.into(),
        }
    }

    /// Creates a not-supported error.
    #[must_use]
    pub fn not_supported(operation: impl Into<String>) -> Self {
        Self::NotSupported {
            operation: operation.into(),
        }
    }

    /// Wraps an error from an external collaborator.
    #[must_use]
    pub fn external(source: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        Self::External {
            source: source.into(),
        }
    }
}
