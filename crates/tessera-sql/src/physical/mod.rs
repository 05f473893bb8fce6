//! Physical planning.
//!
//! - [`PhysicalExpr`]: expressions resolved to column positions
//! - [`AggregateExpr`] and [`Accumulator`]: aggregate functions and their
//!   running state
//! - [`PhysicalPlanner`]: turns an optimized logical plan into an
//!   [`ExecutionPlan`](crate::execution::ExecutionPlan)

mod aggregate;
mod expr;
mod planner;

pub use aggregate::{state_offsets, Accumulator, AggregateExpr, AggregationMode};
pub use expr::PhysicalExpr;
pub use planner::{create_aggregate_expr, create_physical_expr, PhysicalPlanner};
