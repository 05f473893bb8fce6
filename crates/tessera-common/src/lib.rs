//! # tessera-common
//!
//! Common errors, configuration and constants for the Tessera query engine.
//!
//! This crate provides the foundational pieces shared by every Tessera
//! component:
//!
//! - **Errors**: Unified error handling with `TesseraError` and stable `ErrorCode`s
//! - **Config**: Engine, query and optimizer configuration structures
//! - **Constants**: Engine-wide defaults and limits
//!
//! ## Example
//!
//! ```rust
//! use tessera_common::config::QueryConfig;
//! use tessera_common::error::{TesseraError, TesseraResult};
//!
//! fn check(config: &QueryConfig) -> TesseraResult<()> {
//!     if config.batch_size == 0 {
//!         return Err(TesseraError::invalid_argument("batch_size must be positive"));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check(&QueryConfig::default()).is_ok());
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod constants;
pub mod error;

// Re-export commonly used items at the crate root
pub use constants::*;
pub use error::{ErrorCode, TesseraError, TesseraResult};
