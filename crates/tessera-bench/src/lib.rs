//! Tessera Performance Benchmarks
//!
//! This crate contains benchmarks for the query engine:
//! - Column building with numeric upcasting
//! - CASE evaluation and hash join probing
//! - End-to-end SQL queries over in-memory tables
//!
//! Run benchmarks with:
//! ```bash
//! cargo bench -p tessera-bench
//! ```

pub mod utils;
