//! Removal of identity projections.

use super::{ApplyOrder, OptimizerResult, OptimizerRule};
use crate::logical::{LogicalExpr, LogicalOperator, ProjectionOperator};

/// Removes a projection that passes its input through unchanged: every
/// expression is a bare column naming the input field at the same ordinal.
#[derive(Debug, Default, Clone, Copy)]
pub struct EliminateProjection;

impl OptimizerRule for EliminateProjection {
    fn name(&self) -> &str {
        "eliminate_projection"
    }

    fn apply_order(&self) -> Option<ApplyOrder> {
        Some(ApplyOrder::TopDown)
    }

    fn try_optimize(&self, op: &LogicalOperator) -> OptimizerResult<Option<LogicalOperator>> {
        let mut current = op;
        let mut eliminated = false;
        while let LogicalOperator::Projection(projection) = current {
            if !is_identity(projection) {
                break;
            }
            current = projection.input.as_ref();
            eliminated = true;
        }
        Ok(eliminated.then(|| current.clone()))
    }
}

fn is_identity(projection: &ProjectionOperator) -> bool {
    let input_schema = projection.input.schema();
    if projection.exprs.len() != input_schema.len() || *projection.schema != *input_schema {
        return false;
    }
    projection
        .exprs
        .iter()
        .zip(input_schema.fields())
        .all(|(expr, field)| match expr {
            LogicalExpr::Column(column) => column.name == field.name && field.matches(column),
            _ => false,
        })
}
