//! Rewrites `Distinct` into a grouping aggregate.

use super::{ApplyOrder, OptimizerResult, OptimizerRule};
use crate::logical::{AggregateOperator, LogicalExpr, LogicalOperator};

/// Replaces `Distinct(x)` with `Aggregate(x, groupBy=[every column of x],
/// aggr=[])`, so execution only implements grouping once.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReplaceDistinctWithAggregate;

impl OptimizerRule for ReplaceDistinctWithAggregate {
    fn name(&self) -> &str {
        "replace_distinct_with_aggregate"
    }

    fn apply_order(&self) -> Option<ApplyOrder> {
        Some(ApplyOrder::BottomUp)
    }

    fn try_optimize(&self, op: &LogicalOperator) -> OptimizerResult<Option<LogicalOperator>> {
        let LogicalOperator::Distinct(distinct) = op else {
            return Ok(None);
        };
        let group_by = distinct
            .input
            .schema()
            .fields()
            .iter()
            .map(|field| LogicalExpr::Column(field.column()))
            .collect();
        let aggregate = AggregateOperator::try_new(distinct.input.clone(), group_by, vec![])?;
        Ok(Some(aggregate.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::test_util::plan;
    use crate::optimizer::{Optimizer, OptimizerConfig};

    fn optimize(sql: &str) -> String {
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(std::sync::Arc::new(ReplaceDistinctWithAggregate));
        optimizer.optimize(plan(sql)).unwrap().display()
    }

    #[test]
    fn test_distinct_becomes_aggregate() {
        let text = optimize("SELECT DISTINCT status, customer_id FROM orders");
        assert_eq!(
            text,
            "Aggregate: groupBy=[orders.status, orders.customer_id] aggr=[]\n  \
             Projection: orders.status, orders.customer_id\n    \
             Scan: orders\n"
        );
    }

    #[test]
    fn test_schema_is_preserved() {
        let original = plan("SELECT DISTINCT status AS s FROM orders");
        let mut optimizer = Optimizer::empty(OptimizerConfig::default());
        optimizer.add_rule(std::sync::Arc::new(ReplaceDistinctWithAggregate));
        let optimized = optimizer.optimize(original.clone()).unwrap();
        assert_eq!(optimized.schema(), original.schema());
    }

    #[test]
    fn test_union_distinct_groups_union_output() {
        let text = optimize("SELECT id FROM orders UNION SELECT id FROM customers");
        assert!(text.starts_with("Aggregate: groupBy=[id] aggr=[]\n  Union\n"));
        assert!(!text.contains("Distinct"));
    }
}
