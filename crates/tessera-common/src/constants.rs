//! Engine-wide constants for Tessera.

// =============================================================================
// Batching
// =============================================================================

/// Default number of rows per record batch.
pub const DEFAULT_BATCH_SIZE: usize = 2048;

/// Largest batch size accepted by the configuration validator.
pub const MAX_BATCH_SIZE: usize = 1 << 20;

/// A `max_result_rows` of zero means the result is unbounded.
pub const UNBOUNDED_RESULT_ROWS: usize = 0;

// =============================================================================
// Optimizer
// =============================================================================

/// Default number of passes the optimizer makes over a plan.
pub const DEFAULT_OPTIMIZER_PASSES: usize = 3;

// =============================================================================
// Naming
// =============================================================================

/// Prefix for the aliases given to decorrelated scalar subqueries.
pub const SCALAR_SUBQUERY_ALIAS_PREFIX: &str = "__scalar_sq_";
