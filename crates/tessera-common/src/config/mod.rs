//! Configuration for Tessera.
//!
//! This module provides configuration structures for the engine, the
//! optimizer and individual queries.

mod engine;

pub use engine::{EngineConfig, OptimizerConfig, QueryConfig};
