//! Engine configuration structures.
//!
//! These structures define the tunable aspects of query planning and
//! execution. All of them are plain serde data so they can be loaded from
//! whatever configuration source the embedding application uses.

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_OPTIMIZER_PASSES, MAX_BATCH_SIZE, UNBOUNDED_RESULT_ROWS,
};

/// Top-level engine configuration.
///
/// # Example
///
/// ```rust
/// use tessera_common::config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.query.batch_size, 2048);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Defaults applied to every query.
    pub query: QueryConfig,

    /// Logical optimizer settings.
    pub optimizer: OptimizerConfig,
}

impl EngineConfig {
    /// Creates a small configuration for testing.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            query: QueryConfig::for_testing(),
            optimizer: OptimizerConfig::default(),
        }
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        self.query.validate()?;
        if self.optimizer.enabled && self.optimizer.max_passes == 0 {
            return Err("optimizer.max_passes must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Per-query execution settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Maximum number of rows in a batch.
    /// Default: 2048
    pub batch_size: usize,

    /// Maximum number of rows returned to the caller. Zero means unbounded.
    /// Default: 0
    pub max_result_rows: usize,

    /// Record a timing tree for every query.
    /// Default: false
    pub profile: bool,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_result_rows: UNBOUNDED_RESULT_ROWS,
            profile: false,
        }
    }
}

impl QueryConfig {
    /// Creates a configuration with tiny batches so tests cross batch
    /// boundaries with little data.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            batch_size: 4,
            max_result_rows: UNBOUNDED_RESULT_ROWS,
            profile: true,
        }
    }

    /// Returns the result row limit, if one is set.
    #[must_use]
    pub fn result_limit(&self) -> Option<usize> {
        (self.max_result_rows != UNBOUNDED_RESULT_ROWS).then_some(self.max_result_rows)
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.batch_size > MAX_BATCH_SIZE {
            return Err(format!("batch_size must not exceed {MAX_BATCH_SIZE}"));
        }
        Ok(())
    }
}

/// Logical optimizer configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    /// Run the optimizer at all.
    pub enabled: bool,

    /// Maximum number of passes over the full rule list. The optimizer stops
    /// early once a pass changes nothing.
    pub max_passes: usize,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_passes: DEFAULT_OPTIMIZER_PASSES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.query.batch_size, 2048);
        assert_eq!(config.query.max_result_rows, 0);
        assert_eq!(config.query.result_limit(), None);
        assert!(config.optimizer.enabled);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = EngineConfig::for_testing();
        assert!(config.validate().is_ok());

        config.query.batch_size = 0;
        assert!(config.validate().is_err());

        config.query.batch_size = 16;
        config.optimizer.max_passes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_deserialize() {
        let config: QueryConfig = serde_json::from_str(r#"{"max_result_rows": 10}"#).unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.result_limit(), Some(10));
    }
}
