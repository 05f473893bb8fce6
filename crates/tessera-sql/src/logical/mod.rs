//! Logical query plan representation.
//!
//! This module defines the logical plan tree consumed by the optimizer.
//! Logical plans describe what a query computes without committing to a
//! physical strategy (e.g., "Join" rather than "HashJoin").

mod builder;
mod expr;
mod operator;
mod plan;

pub use builder::*;
pub use expr::*;
pub use operator::*;
pub use plan::*;

use thiserror::Error;

/// Errors raised while constructing logical plans.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlanError {
    /// Referenced table is not registered.
    #[error("table not found: {0}")]
    TableNotFound(String),

    /// Referenced column does not exist in the input schema.
    #[error("column not found: {0}")]
    ColumnNotFound(String),

    /// Unqualified column matches more than one input field.
    #[error("ambiguous column reference: {0}")]
    AmbiguousColumn(String),

    /// Expression is not valid for its operand types.
    #[error("type error: {0}")]
    Type(String),

    /// Query is semantically malformed.
    #[error("invalid plan: {0}")]
    Invalid(String),

    /// SQL feature not supported by the planner.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// Internal invariant violated.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for logical planning.
pub type PlanResult<T> = Result<T, PlanError>;
