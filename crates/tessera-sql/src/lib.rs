//! # tessera-sql
//!
//! Embeddable SQL query engine for Tessera.
//!
//! This crate implements:
//! - SQL parsing (ANSI dialect, `SELECT` queries)
//! - Logical query planning and rule-based optimization
//! - Physical planning into streaming execution nodes
//! - A columnar record-batch data model with numeric upcasting
//! - Hash joins, partial/final aggregation and output caching
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use tessera_sql::data::{schema_of, ColumnDataType, ScalarValue};
//! use tessera_sql::datasource::MemoryDataSource;
//! use tessera_sql::{QueryContext, QueryEngine};
//!
//! # tokio_test_block_on(async {
//! let engine = QueryEngine::default();
//! let schema = schema_of(&[("n", ColumnDataType::Long)]);
//! let rows = vec![vec![ScalarValue::from(1i64)], vec![ScalarValue::from(2i64)]];
//! engine.register_table("t", schema.clone(), Arc::new(MemoryDataSource::new(schema, rows)));
//!
//! let result = engine.sql("SELECT n FROM t WHERE n > 1", &QueryContext::default()).await?;
//! assert_eq!(result.total_rows, 1);
//! # Ok::<(), tessera_common::TesseraError>(())
//! # }).unwrap();
//! # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Runtime::new().unwrap().block_on(f)
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Per-query settings, hooks and cancellation
pub mod context;

/// Record batches, arrays, scalars and schemas
pub mod data;

/// Row sources, writers and result caches
pub mod datasource;

/// Query engine facade
pub mod engine;

/// Execution errors
pub mod error;

/// Streaming execution nodes
pub mod execution;

/// Logical plan representation
pub mod logical;

/// Query optimizer
pub mod optimizer;

/// SQL parser
pub mod parser;

/// Physical expressions, aggregates and planning
pub mod physical;

/// Query profiling
pub mod profiler;

pub use context::QueryContext;
pub use engine::{Explanation, QueryEngine, QueryResult};
pub use error::{ExecResult, ExecutionError};
pub use execution::{collect, ExecutionPlan};
pub use logical::LogicalPlan;
pub use profiler::QueryProfiler;
