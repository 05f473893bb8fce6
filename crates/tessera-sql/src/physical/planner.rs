//! Physical planner.
//!
//! Converts an optimized [`LogicalPlan`] into an [`ExecutionPlan`].
//! Expressions are resolved to column positions against the logical input
//! schema of the operator that evaluates them. A `SubqueryAlias` only
//! renames qualifiers, so it has no physical node.
//!
//! Aggregates whose functions can merge partial state are split into a
//! `Partial` stage and a `Final` stage. When the input is a union the
//! partial stage runs once per branch, inside the branch task.

use std::sync::Arc;

use tracing::debug;

use super::aggregate::{AggregateExpr, AggregationMode};
use super::expr::PhysicalExpr;
use crate::data::{QualifiedField, ScalarValue, Schema, SchemaRef};
use crate::datasource::SourceProvider;
use crate::error::{ExecResult, ExecutionError};
use crate::execution::{
    output_column_indices, AggregateExec, CrossJoinExec, EmptyExec, ExecutionPlan, FilterExec,
    HashJoinExec, JoinFilter, LimitExec, PhysicalSortExpr, ProjectionExec, ScanExec, SortExec,
    UnionExec,
};
use crate::logical::{
    AggregateOperator, BinaryOp, JoinOperator, JoinType, LogicalExpr, LogicalOperator,
    LogicalPlan,
};

/// Physical planner.
pub struct PhysicalPlanner<'a> {
    sources: &'a dyn SourceProvider,
}

impl<'a> PhysicalPlanner<'a> {
    /// Creates a planner resolving tables through `sources`.
    pub fn new(sources: &'a dyn SourceProvider) -> Self {
        Self { sources }
    }

    /// Creates a physical plan from a logical plan.
    pub fn create_physical_plan(&self, plan: &LogicalPlan) -> ExecResult<ExecutionPlan> {
        let physical = self.plan_operator(&plan.root)?;
        debug!(plan = %physical.display(), "created physical plan");
        Ok(physical)
    }

    fn plan_child(&self, op: &LogicalOperator) -> ExecResult<Arc<ExecutionPlan>> {
        self.plan_operator(op).map(Arc::new)
    }

    fn plan_operator(&self, op: &LogicalOperator) -> ExecResult<ExecutionPlan> {
        match op {
            LogicalOperator::Scan(scan) => {
                let source = self.sources.source(&scan.table_name).ok_or_else(|| {
                    ExecutionError::Plan(format!("no data source for table {}", scan.table_name))
                })?;
                let exec =
                    ScanExec::new(scan.table_name.clone(), source, scan.source_schema.clone());
                let exec = match &scan.projection {
                    Some(indices) => exec.with_projection(indices.clone())?,
                    None => exec,
                };
                Ok(ExecutionPlan::Scan(exec))
            }
            LogicalOperator::Projection(projection) => {
                let input_schema = projection.input.schema();
                let exprs = projection
                    .exprs
                    .iter()
                    .map(|e| create_physical_expr(e, &input_schema))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(ExecutionPlan::Projection(ProjectionExec::new(
                    self.plan_child(&projection.input)?,
                    exprs,
                    projection.schema.clone(),
                )))
            }
            LogicalOperator::Filter(filter) => {
                let predicate = create_physical_expr(&filter.predicate, &filter.input.schema())?;
                Ok(ExecutionPlan::Filter(FilterExec::new(
                    self.plan_child(&filter.input)?,
                    predicate,
                )))
            }
            LogicalOperator::Aggregate(aggregate) => self.plan_aggregate(aggregate),
            LogicalOperator::Distinct(distinct) => {
                let schema = distinct.input.schema();
                let group_by = (0..schema.len())
                    .map(|i| column_at(&schema, i))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(ExecutionPlan::Aggregate(AggregateExec::new(
                    self.plan_child(&distinct.input)?,
                    AggregationMode::Single,
                    group_by,
                    vec![],
                    schema,
                )))
            }
            LogicalOperator::Sort(sort) => {
                let input_schema = sort.input.schema();
                let order_by = sort
                    .order_by
                    .iter()
                    .map(|e| create_sort_expr(e, &input_schema))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(ExecutionPlan::Sort(SortExec::new(
                    self.plan_child(&sort.input)?,
                    order_by,
                    sort.fetch,
                )))
            }
            LogicalOperator::Join(join) => self.plan_join(join),
            LogicalOperator::CrossJoin(cross) => Ok(ExecutionPlan::CrossJoin(CrossJoinExec::new(
                self.plan_child(&cross.left)?,
                self.plan_child(&cross.right)?,
                cross.schema.clone(),
            ))),
            LogicalOperator::Union(union) => {
                let inputs = union
                    .inputs
                    .iter()
                    .map(|input| self.plan_child(input))
                    .collect::<ExecResult<Vec<_>>>()?;
                Ok(ExecutionPlan::Union(UnionExec::new(inputs, union.schema.clone())))
            }
            LogicalOperator::Limit(limit) => {
                let mut input = self.plan_operator(&limit.input)?;
                // a sort feeding a limit only needs to keep skip + fetch rows
                if let (ExecutionPlan::Sort(sort), Some(fetch)) = (&mut input, limit.fetch) {
                    let needed = limit.skip.saturating_add(fetch);
                    sort.fetch = Some(sort.fetch.map_or(needed, |f| f.min(needed)));
                }
                Ok(ExecutionPlan::Limit(LimitExec::new(
                    Arc::new(input),
                    limit.skip,
                    limit.fetch,
                )))
            }
            LogicalOperator::SubqueryAlias(alias) => self.plan_operator(&alias.input),
            LogicalOperator::EmptyRelation(empty) => Ok(ExecutionPlan::Empty(EmptyExec::new(
                empty.produce_one_row,
                empty.schema.clone(),
            ))),
        }
    }

    fn plan_aggregate(&self, op: &AggregateOperator) -> ExecResult<ExecutionPlan> {
        let input_schema = op.input.schema();
        let group_by = op
            .group_by
            .iter()
            .map(|e| create_physical_expr(e, &input_schema))
            .collect::<ExecResult<Vec<_>>>()?;
        let aggregates = op
            .aggregates
            .iter()
            .map(|e| create_aggregate_expr(e, &input_schema))
            .collect::<ExecResult<Vec<_>>>()?;

        if !aggregates.iter().all(AggregateExpr::supports_partial) {
            return Ok(ExecutionPlan::Aggregate(AggregateExec::new(
                self.plan_child(&op.input)?,
                AggregationMode::Single,
                group_by,
                aggregates,
                op.schema.clone(),
            )));
        }

        let group_fields: Vec<QualifiedField> =
            op.schema.fields().iter().take(group_by.len()).cloned().collect();
        let partial_schema =
            AggregateExec::output_schema(AggregationMode::Partial, group_fields, &aggregates);
        let partial = |input: Arc<ExecutionPlan>| {
            Arc::new(ExecutionPlan::Aggregate(AggregateExec::new(
                input,
                AggregationMode::Partial,
                group_by.clone(),
                aggregates.clone(),
                partial_schema.clone(),
            )))
        };
        let partial_plan = match union_input(&op.input) {
            Some(inputs) => {
                let branches = inputs
                    .iter()
                    .map(|input| self.plan_child(input).map(&partial))
                    .collect::<ExecResult<Vec<_>>>()?;
                Arc::new(ExecutionPlan::Union(UnionExec::new(
                    branches,
                    partial_schema.clone(),
                )))
            }
            None => partial(self.plan_child(&op.input)?),
        };
        let final_group_by = (0..group_by.len())
            .map(|i| column_at(&partial_schema, i))
            .collect::<ExecResult<Vec<_>>>()?;
        Ok(ExecutionPlan::Aggregate(AggregateExec::new(
            partial_plan,
            AggregationMode::Final,
            final_group_by,
            aggregates,
            op.schema.clone(),
        )))
    }

    fn plan_join(&self, join: &JoinOperator) -> ExecResult<ExecutionPlan> {
        let left_schema = join.left.schema();
        let right_schema = join.right.schema();
        let on = join
            .on
            .iter()
            .map(|(l, r)| {
                Ok((
                    create_physical_expr(l, &left_schema)?,
                    create_physical_expr(r, &right_schema)?,
                ))
            })
            .collect::<ExecResult<Vec<_>>>()?;
        let filter = match &join.filter {
            Some(expr) => {
                let schema = Schema::join(&left_schema, &right_schema);
                Some(JoinFilter {
                    expr: create_physical_expr(expr, &schema)?,
                    schema: Arc::new(schema),
                    column_indices: output_column_indices(
                        JoinType::Inner,
                        left_schema.len(),
                        right_schema.len(),
                    ),
                })
            }
            None => None,
        };
        Ok(ExecutionPlan::HashJoin(HashJoinExec::new(
            self.plan_child(&join.left)?,
            self.plan_child(&join.right)?,
            join.join_type,
            on,
            filter,
            join.schema.clone(),
        )))
    }
}

/// Returns the inputs of a union, looking through aliases.
fn union_input(op: &LogicalOperator) -> Option<&[Arc<LogicalOperator>]> {
    match op {
        LogicalOperator::Union(union) => Some(&union.inputs),
        LogicalOperator::SubqueryAlias(alias) => union_input(&alias.input),
        _ => None,
    }
}

fn column_at(schema: &SchemaRef, index: usize) -> ExecResult<PhysicalExpr> {
    schema
        .field(index)
        .map(|field| PhysicalExpr::column(field.name.clone(), index))
        .ok_or_else(|| ExecutionError::Plan(format!("no column at position {}", index)))
}

/// Resolves a logical expression against `schema`.
pub fn create_physical_expr(expr: &LogicalExpr, schema: &Schema) -> ExecResult<PhysicalExpr> {
    let boxed = |e: &LogicalExpr| create_physical_expr(e, schema).map(Box::new);
    Ok(match expr {
        LogicalExpr::Column(column) => {
            let index = schema.index_of_column(column).ok_or_else(|| {
                ExecutionError::Plan(format!(
                    "column {} not found in {}",
                    column.qualified_name(),
                    schema
                ))
            })?;
            PhysicalExpr::column(column.name.clone(), index)
        }
        LogicalExpr::Literal(value) => PhysicalExpr::Literal(value.clone()),
        LogicalExpr::Alias { expr, .. } | LogicalExpr::OrderBy { expr, .. } => {
            create_physical_expr(expr, schema)?
        }
        LogicalExpr::BinaryOp { left, op, right } => PhysicalExpr::Binary {
            left: boxed(left)?,
            op: *op,
            right: boxed(right)?,
        },
        LogicalExpr::Not(e) => PhysicalExpr::Not(boxed(e)?),
        LogicalExpr::Negative(e) => PhysicalExpr::Negative(boxed(e)?),
        LogicalExpr::IsNull(e) => PhysicalExpr::IsNull(boxed(e)?),
        LogicalExpr::IsNotNull(e) => PhysicalExpr::IsNotNull(boxed(e)?),
        LogicalExpr::Like {
            negated,
            case_insensitive,
            expr,
            pattern,
            escape_char,
        } => PhysicalExpr::Like {
            expr: boxed(expr)?,
            pattern: boxed(pattern)?,
            negated: *negated,
            case_insensitive: *case_insensitive,
            escape_char: *escape_char,
        },
        LogicalExpr::Between {
            expr,
            negated,
            low,
            high,
        } => {
            let value = create_physical_expr(expr, schema)?;
            let range = PhysicalExpr::binary(
                PhysicalExpr::binary(value.clone(), BinaryOp::GtEq, create_physical_expr(low, schema)?),
                BinaryOp::And,
                PhysicalExpr::binary(value, BinaryOp::LtEq, create_physical_expr(high, schema)?),
            );
            if *negated {
                PhysicalExpr::Not(Box::new(range))
            } else {
                range
            }
        }
        LogicalExpr::Case {
            operand,
            when_then,
            else_result,
        } => PhysicalExpr::Case {
            operand: operand.as_deref().map(boxed).transpose()?,
            when_then: when_then
                .iter()
                .map(|(w, t)| Ok((create_physical_expr(w, schema)?, create_physical_expr(t, schema)?)))
                .collect::<ExecResult<Vec<_>>>()?,
            else_result: else_result.as_deref().map(boxed).transpose()?,
        },
        LogicalExpr::InList {
            expr,
            list,
            negated,
        } => PhysicalExpr::InList {
            expr: boxed(expr)?,
            list: list
                .iter()
                .map(|e| create_physical_expr(e, schema))
                .collect::<ExecResult<Vec<_>>>()?,
            negated: *negated,
        },
        LogicalExpr::Cast { expr, data_type } => PhysicalExpr::Cast {
            expr: boxed(expr)?,
            data_type: *data_type,
        },
        LogicalExpr::OuterReferenceColumn { column, .. } => {
            return Err(ExecutionError::Plan(format!(
                "correlated reference {} was not decorrelated",
                column
            )))
        }
        LogicalExpr::AggregateFunction { .. } => {
            return Err(ExecutionError::Plan(format!(
                "aggregate {} outside an aggregation",
                expr
            )))
        }
        LogicalExpr::ScalarSubquery(_) => {
            return Err(ExecutionError::Plan(
                "scalar subquery was not rewritten into a join".into(),
            ))
        }
        LogicalExpr::Wildcard { .. } => {
            return Err(ExecutionError::Plan("wildcard was not expanded".into()))
        }
    })
}

/// Binds a logical aggregate call to physical arguments. `COUNT(*)`
/// counts a constant.
pub fn create_aggregate_expr(expr: &LogicalExpr, schema: &Schema) -> ExecResult<AggregateExpr> {
    let (func, args, distinct) = match expr {
        LogicalExpr::Alias { expr: inner, .. } => match inner.as_ref() {
            LogicalExpr::AggregateFunction {
                func,
                args,
                distinct,
            } => (func, args, distinct),
            other => return Err(not_an_aggregate(other)),
        },
        LogicalExpr::AggregateFunction {
            func,
            args,
            distinct,
        } => (func, args, distinct),
        other => return Err(not_an_aggregate(other)),
    };
    let mut physical_args = args
        .iter()
        .map(|arg| match arg {
            LogicalExpr::Wildcard { .. } => Ok(PhysicalExpr::Literal(ScalarValue::from(1i64))),
            other => create_physical_expr(other, schema),
        })
        .collect::<ExecResult<Vec<_>>>()?;
    if physical_args.is_empty() && func.arity() > 0 {
        physical_args.push(PhysicalExpr::Literal(ScalarValue::from(1i64)));
    }
    AggregateExpr::try_new(*func, physical_args, *distinct, expr.output_name(), schema)
}

fn not_an_aggregate(expr: &LogicalExpr) -> ExecutionError {
    ExecutionError::Plan(format!("{} is not an aggregate call", expr))
}

fn create_sort_expr(expr: &LogicalExpr, schema: &Schema) -> ExecResult<PhysicalSortExpr> {
    match expr {
        LogicalExpr::OrderBy {
            expr,
            asc,
            nulls_first,
        } => Ok(PhysicalSortExpr::new(
            create_physical_expr(expr, schema)?,
            *asc,
            *nulls_first,
        )),
        other => Ok(PhysicalSortExpr::new(
            create_physical_expr(other, schema)?,
            true,
            false,
        )),
    }
}
