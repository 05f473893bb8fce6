//! Execution errors and conversions into the engine-wide error type.

use thiserror::Error;

use tessera_common::error::TesseraError;

use crate::logical::PlanError;
use crate::optimizer::OptimizerError;
use crate::parser::ParseError;

/// Errors raised while building physical plans or executing them.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// An expression or aggregate was applied to an unsupported type.
    #[error("type error: {0}")]
    Type(String),

    /// Batch shapes or schemas do not line up.
    #[error("schema error: {0}")]
    Schema(String),

    /// Integer overflow or division by zero.
    #[error("arithmetic error: {0}")]
    Arithmetic(String),

    /// The physical plan could not be constructed.
    #[error("plan error: {0}")]
    Plan(String),

    /// The query was cancelled.
    #[error("query was cancelled")]
    Cancelled,

    /// I/O error from a reader, writer or cache.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error from an external collaborator, passed through unmodified.
    #[error("{0}")]
    External(Box<dyn std::error::Error + Send + Sync>),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ExecutionError {
    /// Wraps an error from an external collaborator.
    pub fn external(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        ExecutionError::External(error.into())
    }
}

/// Result type for execution.
pub type ExecResult<T> = Result<T, ExecutionError>;

impl From<ExecutionError> for TesseraError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::Type(message) => TesseraError::TypeMismatch {
                expected: "a supported type".to_string(),
                actual: message,
            },
            ExecutionError::Plan(message) => TesseraError::Planning { message },
            ExecutionError::Cancelled => TesseraError::Cancelled,
            ExecutionError::Io(source) => TesseraError::Io { source },
            ExecutionError::External(source) => TesseraError::External { source },
            ExecutionError::Internal(message) => TesseraError::Internal { message },
            other @ (ExecutionError::Schema(_) | ExecutionError::Arithmetic(_)) => {
                TesseraError::ExecutionFailed {
                    reason: other.to_string(),
                }
            }
        }
    }
}

impl From<ParseError> for TesseraError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Unsupported(operation) => TesseraError::NotSupported { operation },
            other => TesseraError::SyntaxError {
                message: other.to_string(),
            },
        }
    }
}

impl From<PlanError> for TesseraError {
    fn from(err: PlanError) -> Self {
        match err {
            PlanError::TableNotFound(table) => TesseraError::TableNotFound { table },
            PlanError::ColumnNotFound(column) => TesseraError::ColumnNotFound { column },
            PlanError::Unsupported(operation) => TesseraError::NotSupported { operation },
            other => TesseraError::Planning {
                message: other.to_string(),
            },
        }
    }
}

impl From<OptimizerError> for TesseraError {
    fn from(err: OptimizerError) -> Self {
        match err {
            OptimizerError::Unsupported(operation) => TesseraError::NotSupported { operation },
            OptimizerError::Plan(inner) => inner.into(),
            other => TesseraError::Planning {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessera_common::ErrorCode;

    #[test]
    fn test_execution_error_codes() {
        let err: TesseraError = ExecutionError::Cancelled.into();
        assert_eq!(err.code(), ErrorCode::Cancelled);

        let err: TesseraError = ExecutionError::Type("SUM over Utf8".into()).into();
        assert_eq!(err.code(), ErrorCode::TypeMismatch);

        let err: TesseraError = ExecutionError::Plan("bad join filter".into()).into();
        assert!(err.is_planning());
    }

    #[test]
    fn test_io_error_passthrough() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "sink closed");
        let err: TesseraError = ExecutionError::from(io).into();
        assert_eq!(err.code(), ErrorCode::Io);
        assert!(err.to_string().contains("sink closed"));
    }

    #[test]
    fn test_plan_error_codes() {
        let err: TesseraError = PlanError::TableNotFound("t".into()).into();
        assert_eq!(err.code(), ErrorCode::TableNotFound);

        let err: TesseraError = OptimizerError::Unsupported("correlated IN".into()).into();
        assert_eq!(err.code(), ErrorCode::NotSupported);
    }
}
