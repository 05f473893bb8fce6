//! Rule-based logical optimizer.
//!
//! The optimizer rewrites a [`LogicalPlan`] by applying an ordered list of
//! rules. A rule either declares an [`ApplyOrder`] and is driven over every
//! operator of the tree by the optimizer, or declares none and receives the
//! root once, recursing on its own.
//!
//! # Optimization Rules
//!
//! The rules run in this order:
//!
//! - **ReplaceDistinctWithAggregate**: `Distinct(x)` becomes an aggregate
//!   grouping by every output column of `x`
//! - **ScalarSubqueryToJoin**: decorrelates scalar subqueries into left joins
//! - **ExtractEquijoinPredicate**: moves `left = right` conjuncts into join keys
//! - **PushDownProjection**: narrows every operator, and finally each scan, to
//!   the columns its ancestors consume
//! - **EliminateProjection**: drops identity projections
//!
//! # Example
//!
//! ```ignore
//! use tessera_common::config::OptimizerConfig;
//! use tessera_sql::optimizer::Optimizer;
//!
//! let optimizer = Optimizer::new(OptimizerConfig::default());
//! let optimized_plan = optimizer.optimize(plan)?;
//! ```

mod eliminate_projection;
mod extract_equijoin;
mod push_down_projection;
mod replace_distinct;
mod scalar_subquery;

pub use eliminate_projection::EliminateProjection;
pub use extract_equijoin::ExtractEquijoinPredicate;
pub use push_down_projection::PushDownProjection;
pub use replace_distinct::ReplaceDistinctWithAggregate;
pub use scalar_subquery::ScalarSubqueryToJoin;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

pub use tessera_common::config::OptimizerConfig;
use thiserror::Error;
use tracing::{debug, trace};

use crate::logical::{transform_down, transform_up, LogicalOperator, LogicalPlan, PlanError};

/// Errors that can occur during optimization.
#[derive(Debug, Error)]
pub enum OptimizerError {
    /// Rule application failed.
    #[error("Rule '{rule}' failed: {message}")]
    RuleFailed {
        /// Rule name.
        rule: String,
        /// Error message.
        message: String,
    },

    /// The plan uses a construct no rule can rewrite into an executable form.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A rewritten operator failed validation.
    #[error(transparent)]
    Plan(#[from] PlanError),

    /// Internal optimizer error.
    #[error("Internal optimizer error: {0}")]
    Internal(String),
}

/// Result type for optimizer operations.
pub type OptimizerResult<T> = Result<T, OptimizerError>;

/// How the optimizer drives a rule over the plan tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOrder {
    /// The rule sees a node before its inputs, and recursion continues into
    /// the inputs of the rewritten node.
    TopDown,
    /// The rule sees a node after its inputs have been rewritten.
    BottomUp,
}

/// Trait for optimizer rules.
///
/// Rules should be idempotent: applying the same rule twice should not
/// change the plan after the first application.
pub trait OptimizerRule: std::fmt::Debug + Send + Sync {
    /// Returns the name of this rule.
    fn name(&self) -> &str;

    /// Returns how the optimizer should drive this rule. `None` means the
    /// rule is handed the root and recurses itself.
    fn apply_order(&self) -> Option<ApplyOrder> {
        None
    }

    /// Attempts to rewrite a single operator.
    ///
    /// Returns the replacement if any transformation was made, or `None`
    /// to leave the operator as is.
    fn try_optimize(&self, op: &LogicalOperator) -> OptimizerResult<Option<LogicalOperator>>;
}

/// Statistics about optimization.
#[derive(Debug, Clone, Default)]
pub struct OptimizationStats {
    /// Number of passes performed.
    pub iterations: usize,
    /// Number of rule applications that changed the plan.
    pub rules_applied: usize,
    /// Per-rule application counts.
    pub rule_applications: Vec<(String, usize)>,
    /// Total optimization time in microseconds.
    pub total_time_us: u64,
}

/// The query optimizer.
#[derive(Debug)]
pub struct Optimizer {
    config: OptimizerConfig,
    rules: Vec<Arc<dyn OptimizerRule>>,
}

impl Optimizer {
    /// Creates an optimizer with the standard rule list.
    pub fn new(config: OptimizerConfig) -> Self {
        let rules: Vec<Arc<dyn OptimizerRule>> = vec![
            Arc::new(ReplaceDistinctWithAggregate),
            Arc::new(ScalarSubqueryToJoin),
            Arc::new(ExtractEquijoinPredicate),
            Arc::new(PushDownProjection),
            Arc::new(EliminateProjection),
        ];
        Self { config, rules }
    }

    /// Creates an optimizer with no rules.
    pub fn empty(config: OptimizerConfig) -> Self {
        Self {
            config,
            rules: Vec::new(),
        }
    }

    /// Optimizes a logical plan.
    pub fn optimize(&self, plan: LogicalPlan) -> OptimizerResult<LogicalPlan> {
        let (optimized, _) = self.optimize_with_stats(plan)?;
        Ok(optimized)
    }

    /// Optimizes a logical plan and returns optimization statistics.
    pub fn optimize_with_stats(
        &self,
        plan: LogicalPlan,
    ) -> OptimizerResult<(LogicalPlan, OptimizationStats)> {
        let start = Instant::now();
        let mut stats = OptimizationStats::default();
        if !self.config.enabled {
            return Ok((plan, stats));
        }

        let mut rule_counts: HashMap<String, usize> = HashMap::new();
        let mut root = plan.root;

        for pass in 0..self.config.max_passes {
            stats.iterations = pass + 1;
            let mut plan_changed = false;

            for rule in &self.rules {
                let rewritten = self.apply_rule(rule.as_ref(), &root)?;
                if !Arc::ptr_eq(&rewritten, &root) && rewritten != root {
                    trace!(rule = rule.name(), pass, "rule rewrote plan");
                    root = rewritten;
                    plan_changed = true;
                    stats.rules_applied += 1;
                    *rule_counts.entry(rule.name().to_string()).or_insert(0) += 1;
                }
            }

            if !plan_changed {
                break;
            }
        }

        stats.rule_applications = rule_counts.into_iter().collect();
        stats.rule_applications.sort();
        stats.total_time_us = start.elapsed().as_micros() as u64;
        debug!(
            passes = stats.iterations,
            rules_applied = stats.rules_applied,
            elapsed_us = stats.total_time_us,
            "optimized logical plan"
        );

        Ok((LogicalPlan::from_arc(root), stats))
    }

    fn apply_rule(
        &self,
        rule: &dyn OptimizerRule,
        root: &Arc<LogicalOperator>,
    ) -> OptimizerResult<Arc<LogicalOperator>> {
        let mut f = |op: &LogicalOperator| rule.try_optimize(op);
        let result = match rule.apply_order() {
            Some(ApplyOrder::TopDown) => transform_down(root, &mut f),
            Some(ApplyOrder::BottomUp) => transform_up(root, &mut f),
            None => f(root.as_ref()).map(|op| op.map(Arc::new).unwrap_or_else(|| root.clone())),
        };
        result.map_err(|err| match err {
            OptimizerError::Unsupported(_) | OptimizerError::RuleFailed { .. } => err,
            other => OptimizerError::RuleFailed {
                rule: rule.name().to_string(),
                message: other.to_string(),
            },
        })
    }

    /// Adds a custom optimization rule at the end of the list.
    pub fn add_rule(&mut self, rule: Arc<dyn OptimizerRule>) {
        self.rules.push(rule);
    }

    /// Returns the rule names in application order.
    pub fn rule_names(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// Returns the current configuration.
    pub fn config(&self) -> &OptimizerConfig {
        &self.config
    }
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}


#[cfg(test)]
mod tests {
    use super::test_util::plan;
    use super::*;

    #[test]
    fn test_optimizer_rule_order() {
        let optimizer = Optimizer::default();
        assert_eq!(
            optimizer.rule_names(),
            vec![
                "replace_distinct_with_aggregate",
                "scalar_subquery_to_join",
                "extract_equijoin_predicate",
                "push_down_projection",
                "eliminate_projection",
            ]
        );
    }

    #[test]
    fn test_optimizer_disabled_is_no_op() {
        let config = OptimizerConfig {
            enabled: false,
            ..OptimizerConfig::default()
        };
        let original = plan("SELECT DISTINCT status FROM orders");
        let (optimized, stats) = Optimizer::new(config)
            .optimize_with_stats(original.clone())
            .unwrap();
        assert_eq!(optimized, original);
        assert_eq!(stats.iterations, 0);
    }

    #[test]
    fn test_optimizer_empty_rules_no_op() {
        let original = plan("SELECT id FROM orders WHERE amount > 10");
        let optimized = Optimizer::empty(OptimizerConfig::default())
            .optimize(original.clone())
            .unwrap();
        assert_eq!(optimized, original);
    }

    #[test]
    fn test_optimizer_reaches_fixed_point() {
        let original = plan(
            "SELECT o.id, c.name FROM orders o, customers c \
             WHERE o.customer_id = c.id AND o.amount > 10",
        );
        let optimizer = Optimizer::default();
        let (once, stats) = optimizer.optimize_with_stats(original).unwrap();
        assert!(stats.rules_applied > 0);
        assert!(stats.iterations <= optimizer.config().max_passes);

        let twice = optimizer.optimize(once.clone()).unwrap();
        assert_eq!(once, twice);
        assert_eq!(once.schema().field_names(), vec!["id", "name"]);
    }

    #[test]
    fn test_rule_failure_names_rule() {
        #[derive(Debug)]
        struct Failing;

        impl OptimizerRule for Failing {
            fn name(&self) -> &str {
                "failing"
            }

            fn try_optimize(
                &self,
                _op: &LogicalOperator,
            ) -> OptimizerResult<Option<LogicalOperator>> {
                Err(OptimizerError::Internal("boom".into()))
            }
        }

        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(Arc::new(Failing));
        let err = optimizer
            .optimize(plan("SELECT id FROM orders"))
            .unwrap_err();
        assert!(matches!(err, OptimizerError::RuleFailed { ref rule, .. } if rule == "failing"));
    }
}
