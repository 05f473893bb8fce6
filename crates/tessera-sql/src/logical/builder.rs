//! Logical plan builder.
//!
//! Converts parsed SQL statements into logical query plans. Column
//! references are resolved against the FROM scope and normalized to their
//! qualified form; references that only resolve in an enclosing query
//! become [`LogicalExpr::OuterReferenceColumn`].

use std::collections::HashMap;
use std::sync::Arc;

use sqlparser::ast::{
    BinaryOperator, Distinct, Expr as AstExpr, FunctionArg, FunctionArgExpr, GroupByExpr,
    JoinConstraint, JoinOperator as AstJoinOperator, ObjectName, OrderByExpr, Query, Select,
    SelectItem, SetExpr, SetOperator, SetQuantifier, Statement, TableFactor, TableWithJoins,
    UnaryOperator, Value,
};
use tracing::debug;

use super::expr::{AggregateFunc, BinaryOp, LogicalExpr};
use super::operator::*;
use super::plan::LogicalPlan;
use super::{PlanError, PlanResult};
use crate::data::{Column, ColumnDataType, ScalarValue, Schema, SchemaRef, TableReference};

/// Catalog interface for resolving table schemas.
pub trait Catalog: Send + Sync {
    /// Resolves a table by name.
    fn resolve_table(&self, name: &str) -> Option<SchemaRef>;
}

impl Catalog for HashMap<String, SchemaRef> {
    fn resolve_table(&self, name: &str) -> Option<SchemaRef> {
        self.get(name).cloned()
    }
}

/// Builds a logical plan from a statement.
pub fn build_plan(stmt: &Statement, catalog: &dyn Catalog) -> PlanResult<LogicalPlan> {
    let plan = PlanBuilder::new(catalog).build_statement(stmt)?;
    debug!(plan = %plan.display(), "built logical plan");
    Ok(plan)
}

/// Converts SQL AST nodes into logical operators.
pub struct PlanBuilder<'a> {
    catalog: &'a dyn Catalog,
    /// Schemas of enclosing queries, innermost last.
    outer_scopes: Vec<SchemaRef>,
}

impl<'a> PlanBuilder<'a> {
    /// Creates a builder over `catalog`.
    pub fn new(catalog: &'a dyn Catalog) -> Self {
        Self {
            catalog,
            outer_scopes: Vec::new(),
        }
    }

    /// Builds a plan for a statement. Only queries are supported.
    pub fn build_statement(&mut self, stmt: &Statement) -> PlanResult<LogicalPlan> {
        match stmt {
            Statement::Query(query) => Ok(LogicalPlan::from_arc(self.build_query(query)?)),
            other => Err(PlanError::Unsupported(format!("statement: {}", other))),
        }
    }

    fn build_query(&mut self, query: &Query) -> PlanResult<Arc<LogicalOperator>> {
        if query.with.is_some() {
            return Err(PlanError::Unsupported("WITH clause".into()));
        }

        let mut plan = match query.body.as_ref() {
            SetExpr::Select(select) => self.build_select(select, &query.order_by)?,
            body => {
                let plan = self.build_set_expr(body)?;
                self.build_output_sort(plan, &query.order_by)?
            }
        };

        let fetch = query.limit.as_ref().map(parse_row_count).transpose()?;
        let skip = query
            .offset
            .as_ref()
            .map(|offset| parse_row_count(&offset.value))
            .transpose()?
            .unwrap_or(0);
        if fetch.is_some() || skip > 0 {
            plan = Arc::new(LogicalOperator::Limit(LimitOperator {
                input: plan,
                skip,
                fetch,
            }));
        }
        Ok(plan)
    }

    fn build_set_expr(&mut self, body: &SetExpr) -> PlanResult<Arc<LogicalOperator>> {
        match body {
            SetExpr::Select(select) => self.build_select(select, &[]),
            SetExpr::Query(query) => self.build_query(query),
            SetExpr::SetOperation {
                op: SetOperator::Union,
                set_quantifier,
                left,
                right,
            } => {
                let distinct = !matches!(set_quantifier, SetQuantifier::All);
                let mut inputs = Vec::new();
                for side in [left, right] {
                    let input = self.build_set_expr(side)?;
                    // Flatten nested UNION ALL chains into one operator.
                    match input.as_ref() {
                        LogicalOperator::Union(union) if !distinct => {
                            inputs.extend(union.inputs.iter().cloned())
                        }
                        _ => inputs.push(input),
                    }
                }
                let union = arc(UnionOperator::try_new(inputs)?);
                Ok(if distinct {
                    Arc::new(LogicalOperator::Distinct(DistinctOperator { input: union }))
                } else {
                    union
                })
            }
            SetExpr::SetOperation { op, .. } => {
                Err(PlanError::Unsupported(format!("set operation {}", op)))
            }
            other => Err(PlanError::Unsupported(format!("query body {}", other))),
        }
    }

    /// Sorts the output of a set operation. Keys must resolve against the
    /// output columns.
    fn build_output_sort(
        &mut self,
        plan: Arc<LogicalOperator>,
        order_by: &[OrderByExpr],
    ) -> PlanResult<Arc<LogicalOperator>> {
        if order_by.is_empty() {
            return Ok(plan);
        }
        let schema = plan.schema();
        let keys = order_by
            .iter()
            .map(|o| Ok(sort_key(self.build_expr(&o.expr, &schema)?, o)))
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(Arc::new(LogicalOperator::Sort(SortOperator {
            input: plan,
            order_by: keys,
            fetch: None,
        })))
    }

    fn build_select(
        &mut self,
        select: &Select,
        order_by: &[OrderByExpr],
    ) -> PlanResult<Arc<LogicalOperator>> {
        let distinct = match &select.distinct {
            None => false,
            Some(Distinct::Distinct) => true,
            Some(Distinct::On(_)) => return Err(PlanError::Unsupported("DISTINCT ON".into())),
        };

        let mut plan = self.build_from(&select.from)?;
        if let Some(selection) = &select.selection {
            let predicate = self.build_expr(selection, &plan.schema())?;
            plan = arc(FilterOperator::try_new(plan, predicate)?);
        }
        let input_schema = plan.schema();

        let mut select_exprs = Vec::new();
        for item in &select.projection {
            self.build_select_item(item, &input_schema, &mut select_exprs)?;
        }
        let group_by = match &select.group_by {
            GroupByExpr::Expressions(exprs) => exprs
                .iter()
                .map(|e| self.build_expr(e, &input_schema))
                .collect::<PlanResult<Vec<_>>>()?,
            GroupByExpr::All => return Err(PlanError::Unsupported("GROUP BY ALL".into())),
        };
        let having = select
            .having
            .as_ref()
            .map(|h| self.build_expr(h, &input_schema))
            .transpose()?;
        let mut sort_keys = order_by
            .iter()
            .map(|o| {
                let expr = match select_alias(&o.expr, &select_exprs) {
                    Some(aliased) => aliased,
                    None => self.build_expr(&o.expr, &input_schema)?,
                };
                Ok(sort_key(expr, o))
            })
            .collect::<PlanResult<Vec<_>>>()?;

        let aggregated = !group_by.is_empty()
            || having.is_some()
            || select_exprs.iter().any(LogicalExpr::contains_aggregate);
        if aggregated {
            let mut aggregates = Vec::new();
            for expr in select_exprs
                .iter()
                .chain(having.iter())
                .chain(sort_keys.iter())
            {
                collect_aggregates(expr, &mut aggregates);
            }
            let aggregate = AggregateOperator::try_new(plan, group_by, aggregates)?;
            let rewrite = |expr: LogicalExpr| rewrite_for_aggregate(expr, &aggregate);
            select_exprs = select_exprs
                .into_iter()
                .map(rewrite)
                .collect::<PlanResult<_>>()?;
            sort_keys = sort_keys
                .into_iter()
                .map(rewrite)
                .collect::<PlanResult<_>>()?;
            let having = having.map(rewrite).transpose()?;
            plan = arc(aggregate);
            if let Some(predicate) = having {
                plan = arc(FilterOperator::try_new(plan, predicate)?);
            }
        }

        let projection = ProjectionOperator::try_new(plan.clone(), select_exprs.clone())?;
        if sort_keys.is_empty() {
            let plan = arc(projection);
            return Ok(if distinct {
                Arc::new(LogicalOperator::Distinct(DistinctOperator { input: plan }))
            } else {
                plan
            });
        }

        // Sort keys that are not select items are computed as hidden columns
        // and projected away after sorting.
        let output = projection.schema.clone();
        let mut hidden = Vec::new();
        let mut resolved_keys = Vec::with_capacity(sort_keys.len());
        for key in sort_keys {
            let (expr, asc, nulls_first) = match key {
                LogicalExpr::OrderBy {
                    expr,
                    asc,
                    nulls_first,
                } => (*expr, asc, nulls_first),
                other => {
                    return Err(PlanError::Internal(format!("{} is not a sort key", other)))
                }
            };
            let position = select_exprs
                .iter()
                .position(|e| e.clone().unalias() == expr);
            let target = match position.and_then(|i| output.field(i)) {
                Some(field) => LogicalExpr::Column(field.column()),
                None => {
                    let name = format!("__sort_key_{}", hidden.len());
                    hidden.push(expr.alias(name.clone()));
                    LogicalExpr::col(name)
                }
            };
            resolved_keys.push(target.sort(asc, nulls_first));
        }

        if hidden.is_empty() {
            let mut plan = arc(projection);
            if distinct {
                plan = Arc::new(LogicalOperator::Distinct(DistinctOperator { input: plan }));
            }
            return Ok(Arc::new(LogicalOperator::Sort(SortOperator {
                input: plan,
                order_by: resolved_keys,
                fetch: None,
            })));
        }
        if distinct {
            return Err(PlanError::Invalid(
                "for SELECT DISTINCT, ORDER BY expressions must appear in select list".into(),
            ));
        }
        let visible = select_exprs.len();
        let mut extended = select_exprs;
        extended.extend(hidden);
        let extended = arc(ProjectionOperator::try_new(plan, extended)?);
        let sorted = Arc::new(LogicalOperator::Sort(SortOperator {
            input: extended.clone(),
            order_by: resolved_keys,
            fetch: None,
        }));
        let schema = extended.schema();
        let final_exprs = (0..visible)
            .filter_map(|i| schema.field(i))
            .map(|f| LogicalExpr::Column(f.column()))
            .collect();
        Ok(arc(ProjectionOperator::try_new(sorted, final_exprs)?))
    }

    fn build_select_item(
        &mut self,
        item: &SelectItem,
        schema: &Schema,
        out: &mut Vec<LogicalExpr>,
    ) -> PlanResult<()> {
        match item {
            SelectItem::UnnamedExpr(expr) => out.push(self.build_expr(expr, schema)?),
            SelectItem::ExprWithAlias { expr, alias } => {
                out.push(self.build_expr(expr, schema)?.alias(alias.value.clone()))
            }
            SelectItem::Wildcard(_) => {
                out.extend(schema.fields().iter().map(|f| LogicalExpr::Column(f.column())));
            }
            SelectItem::QualifiedWildcard(name, _) => {
                let qualifier = object_name(name);
                let before = out.len();
                out.extend(
                    schema
                        .fields()
                        .iter()
                        .filter(|f| f.qualifier.as_ref().is_some_and(|q| q.matches(&qualifier)))
                        .map(|f| LogicalExpr::Column(f.column())),
                );
                if out.len() == before {
                    return Err(PlanError::TableNotFound(qualifier));
                }
            }
        }
        Ok(())
    }

    fn build_from(&mut self, from: &[TableWithJoins]) -> PlanResult<Arc<LogicalOperator>> {
        let mut plans = from.iter().map(|t| self.build_table_with_joins(t));
        let Some(first) = plans.next() else {
            return Ok(Arc::new(LogicalOperator::EmptyRelation(
                EmptyRelationOperator {
                    produce_one_row: true,
                    schema: Arc::new(Schema::empty()),
                },
            )));
        };
        let mut plan = first?;
        for right in plans {
            plan = arc(CrossJoinOperator::new(plan, right?));
        }
        Ok(plan)
    }

    fn build_table_with_joins(
        &mut self,
        table: &TableWithJoins,
    ) -> PlanResult<Arc<LogicalOperator>> {
        let mut plan = self.build_table_factor(&table.relation)?;
        for join in &table.joins {
            let right = self.build_table_factor(&join.relation)?;
            let (join_type, constraint) = match &join.join_operator {
                AstJoinOperator::Inner(c) => (JoinType::Inner, c),
                AstJoinOperator::LeftOuter(c) => (JoinType::Left, c),
                AstJoinOperator::RightOuter(c) => (JoinType::Right, c),
                AstJoinOperator::FullOuter(c) => (JoinType::Full, c),
                AstJoinOperator::LeftSemi(c) => (JoinType::LeftSemi, c),
                AstJoinOperator::LeftAnti(c) => (JoinType::LeftAnti, c),
                AstJoinOperator::RightSemi(c) => (JoinType::RightSemi, c),
                AstJoinOperator::RightAnti(c) => (JoinType::RightAnti, c),
                AstJoinOperator::CrossJoin => {
                    plan = arc(CrossJoinOperator::new(plan, right));
                    continue;
                }
                other => return Err(PlanError::Unsupported(format!("join {:?}", other))),
            };
            plan = match constraint {
                JoinConstraint::On(expr) => {
                    let combined = Schema::join(&plan.schema(), &right.schema());
                    let filter = self.build_expr(expr, &combined)?;
                    arc(JoinOperator::try_new(
                        plan,
                        right,
                        join_type,
                        vec![],
                        Some(filter),
                    )?)
                }
                JoinConstraint::None if join_type == JoinType::Inner => {
                    arc(CrossJoinOperator::new(plan, right))
                }
                _ => {
                    return Err(PlanError::Unsupported(
                        "join constraints other than ON".into(),
                    ))
                }
            };
        }
        Ok(plan)
    }

    fn build_table_factor(&mut self, factor: &TableFactor) -> PlanResult<Arc<LogicalOperator>> {
        match factor {
            TableFactor::Table { name, alias, .. } => {
                let table_name = object_name(name);
                let schema = self
                    .catalog
                    .resolve_table(&table_name)
                    .ok_or_else(|| PlanError::TableNotFound(table_name.clone()))?;
                let table = match alias {
                    Some(alias) => TableReference::aliased(&table_name, alias.name.value.clone()),
                    None => TableReference::new(&table_name),
                };
                Ok(arc(ScanOperator::new(table, &schema)))
            }
            TableFactor::Derived {
                subquery, alias, ..
            } => {
                let plan = self.build_query(subquery)?;
                Ok(match alias {
                    Some(alias) => arc(SubqueryAliasOperator::new(plan, alias.name.value.clone())),
                    None => plan,
                })
            }
            TableFactor::NestedJoin {
                table_with_joins,
                alias,
            } => {
                let plan = self.build_table_with_joins(table_with_joins)?;
                Ok(match alias {
                    Some(alias) => arc(SubqueryAliasOperator::new(plan, alias.name.value.clone())),
                    None => plan,
                })
            }
            other => Err(PlanError::Unsupported(format!("table factor {}", other))),
        }
    }

    /// Converts an AST expression, resolving columns against `schema`.
    pub fn build_expr(&mut self, expr: &AstExpr, schema: &Schema) -> PlanResult<LogicalExpr> {
        let recurse = |e: &AstExpr, this: &mut Self| this.build_expr(e, schema).map(Box::new);
        Ok(match expr {
            AstExpr::Identifier(ident) => self.resolve_column(Column::new(&ident.value), schema)?,
            AstExpr::CompoundIdentifier(idents) => {
                let column = match idents.as_slice() {
                    [name] => Column::new(&name.value),
                    [.., qualifier, name] => Column::qualified(&qualifier.value, &name.value),
                    [] => return Err(PlanError::Invalid("empty identifier".into())),
                };
                self.resolve_column(column, schema)?
            }
            AstExpr::Value(value) => LogicalExpr::Literal(literal(value)?),
            AstExpr::TypedString { data_type, value } => LogicalExpr::Cast {
                expr: Box::new(LogicalExpr::lit(value.as_str())),
                data_type: sql_type(data_type)?,
            },
            AstExpr::Nested(inner) => self.build_expr(inner, schema)?,
            AstExpr::BinaryOp { left, op, right } => LogicalExpr::BinaryOp {
                left: recurse(left, self)?,
                op: binary_op(op)?,
                right: recurse(right, self)?,
            },
            AstExpr::UnaryOp { op, expr } => match op {
                UnaryOperator::Not => LogicalExpr::Not(recurse(expr, self)?),
                UnaryOperator::Plus => self.build_expr(expr, schema)?,
                UnaryOperator::Minus => match self.build_expr(expr, schema)? {
                    LogicalExpr::Literal(ScalarValue::Integer(Some(v))) => {
                        LogicalExpr::lit(v.checked_neg().ok_or_else(|| {
                            PlanError::Invalid(format!("integer literal -{} out of range", v))
                        })?)
                    }
                    LogicalExpr::Literal(ScalarValue::Double(Some(v))) => LogicalExpr::lit(-v),
                    other => LogicalExpr::Negative(Box::new(other)),
                },
                other => return Err(PlanError::Unsupported(format!("unary operator {}", other))),
            },
            AstExpr::IsNull(inner) => LogicalExpr::IsNull(recurse(inner, self)?),
            AstExpr::IsNotNull(inner) => LogicalExpr::IsNotNull(recurse(inner, self)?),
            AstExpr::Between {
                expr,
                negated,
                low,
                high,
            } => LogicalExpr::Between {
                expr: recurse(expr, self)?,
                negated: *negated,
                low: recurse(low, self)?,
                high: recurse(high, self)?,
            },
            AstExpr::InList {
                expr,
                list,
                negated,
            } => LogicalExpr::InList {
                expr: recurse(expr, self)?,
                list: list
                    .iter()
                    .map(|e| self.build_expr(e, schema))
                    .collect::<PlanResult<_>>()?,
                negated: *negated,
            },
            AstExpr::Like {
                negated,
                expr,
                pattern,
                escape_char,
            } => LogicalExpr::Like {
                negated: *negated,
                case_insensitive: false,
                expr: recurse(expr, self)?,
                pattern: recurse(pattern, self)?,
                escape_char: *escape_char,
            },
            AstExpr::ILike {
                negated,
                expr,
                pattern,
                escape_char,
            } => LogicalExpr::Like {
                negated: *negated,
                case_insensitive: true,
                expr: recurse(expr, self)?,
                pattern: recurse(pattern, self)?,
                escape_char: *escape_char,
            },
            AstExpr::Case {
                operand,
                conditions,
                results,
                else_result,
            } => LogicalExpr::Case {
                operand: operand.as_ref().map(|e| recurse(e, self)).transpose()?,
                when_then: conditions
                    .iter()
                    .zip(results.iter())
                    .map(|(w, t)| Ok((self.build_expr(w, schema)?, self.build_expr(t, schema)?)))
                    .collect::<PlanResult<_>>()?,
                else_result: else_result.as_ref().map(|e| recurse(e, self)).transpose()?,
            },
            AstExpr::Cast {
                expr, data_type, ..
            } => LogicalExpr::Cast {
                expr: recurse(expr, self)?,
                data_type: sql_type(data_type)?,
            },
            AstExpr::Function(func) => {
                if func.over.is_some() {
                    return Err(PlanError::Unsupported("window functions".into()));
                }
                let name = object_name(&func.name);
                let agg = AggregateFunc::from_name(&name)
                    .ok_or_else(|| PlanError::Unsupported(format!("function {}", name)))?;
                let mut args = Vec::with_capacity(func.args.len());
                for arg in &func.args {
                    match arg {
                        FunctionArg::Unnamed(FunctionArgExpr::Expr(e)) => {
                            args.push(self.build_expr(e, schema)?)
                        }
                        FunctionArg::Unnamed(FunctionArgExpr::Wildcard)
                            if agg == AggregateFunc::Count =>
                        {
                            args.push(LogicalExpr::Wildcard { qualifier: None })
                        }
                        other => {
                            return Err(PlanError::Unsupported(format!(
                                "argument {} to {}",
                                other, name
                            )))
                        }
                    }
                }
                if args.len() != agg.arity() {
                    return Err(PlanError::Invalid(format!(
                        "{} expects {} argument(s), got {}",
                        agg,
                        agg.arity(),
                        args.len()
                    )));
                }
                if args.iter().any(LogicalExpr::contains_aggregate) {
                    return Err(PlanError::Invalid(format!(
                        "aggregate calls cannot be nested in {}",
                        agg
                    )));
                }
                LogicalExpr::AggregateFunction {
                    func: agg,
                    args,
                    distinct: func.distinct,
                }
            }
            AstExpr::Subquery(query) => {
                self.outer_scopes.push(Arc::new(schema.clone()));
                let plan = self.build_query(query);
                self.outer_scopes.pop();
                let plan = LogicalPlan::from_arc(plan?);
                if plan.schema().len() != 1 {
                    return Err(PlanError::Invalid(format!(
                        "scalar subquery must return one column, got {}",
                        plan.schema().len()
                    )));
                }
                LogicalExpr::ScalarSubquery(plan)
            }
            other => return Err(PlanError::Unsupported(format!("expression {}", other))),
        })
    }

    /// Resolves a column in `schema`, then in the enclosing query scopes.
    fn resolve_column(&self, column: Column, schema: &Schema) -> PlanResult<LogicalExpr> {
        match schema.match_count(&column) {
            1 => {
                let index = schema
                    .index_of_column(&column)
                    .ok_or_else(|| PlanError::Internal(format!("lost column {}", column)))?;
                return Ok(LogicalExpr::Column(schema.fields()[index].column()));
            }
            0 => {}
            _ => return Err(PlanError::AmbiguousColumn(column.qualified_name())),
        }
        for outer in self.outer_scopes.iter().rev() {
            if let Some(index) = outer.index_of_column(&column) {
                let field = &outer.fields()[index];
                return Ok(LogicalExpr::OuterReferenceColumn {
                    column: field.column(),
                    data_type: field.data_type,
                });
            }
        }
        Err(PlanError::ColumnNotFound(column.qualified_name()))
    }
}

fn arc(op: impl Into<LogicalOperator>) -> Arc<LogicalOperator> {
    Arc::new(op.into())
}

fn object_name(name: &ObjectName) -> String {
    name.0
        .last()
        .map(|ident| ident.value.clone())
        .unwrap_or_default()
}

fn sort_key(expr: LogicalExpr, order: &OrderByExpr) -> LogicalExpr {
    let asc = order.asc.unwrap_or(true);
    // NULLS LAST for ascending and NULLS FIRST for descending by default.
    let nulls_first = order.nulls_first.unwrap_or(!asc);
    expr.sort(asc, nulls_first)
}

/// Returns the select expression a bare ORDER BY identifier names by alias.
fn select_alias(expr: &AstExpr, select_exprs: &[LogicalExpr]) -> Option<LogicalExpr> {
    let AstExpr::Identifier(ident) = expr else {
        return None;
    };
    select_exprs.iter().find_map(|e| match e {
        LogicalExpr::Alias { expr, name } if *name == ident.value => Some((**expr).clone()),
        _ => None,
    })
}

fn collect_aggregates(expr: &LogicalExpr, out: &mut Vec<LogicalExpr>) {
    expr.apply(&mut |e| {
        if let LogicalExpr::AggregateFunction { .. } = e {
            if !out.contains(e) {
                out.push(e.clone());
            }
            return false;
        }
        true
    });
}

/// Rewrites an expression over an aggregate's input into one over its
/// output: group expressions and aggregate calls become column references.
/// Any column left that is not an aggregate output is ungrouped.
fn rewrite_for_aggregate(
    expr: LogicalExpr,
    aggregate: &AggregateOperator,
) -> PlanResult<LogicalExpr> {
    fn replace(expr: LogicalExpr, aggregate: &AggregateOperator) -> PlanResult<LogicalExpr> {
        let position = aggregate
            .group_by
            .iter()
            .chain(aggregate.aggregates.iter())
            .position(|e| *e == expr);
        if let Some(field) = position.and_then(|i| aggregate.schema.field(i)) {
            return Ok(LogicalExpr::Column(field.column()));
        }
        expr.map_children(&mut |child| replace(child, aggregate))
    }

    let rewritten = replace(expr, aggregate)?;
    for column in rewritten.columns() {
        if aggregate.schema.index_of_column(&column).is_none() {
            return Err(PlanError::Invalid(format!(
                "column {} must appear in the GROUP BY clause or be used in an aggregate function",
                column
            )));
        }
    }
    Ok(rewritten)
}

fn literal(value: &Value) -> PlanResult<ScalarValue> {
    Ok(match value {
        Value::Number(text, _) => match text.parse::<i64>() {
            Ok(v) => ScalarValue::Integer(Some(v)),
            Err(_) => ScalarValue::Double(Some(text.parse::<f64>().map_err(|_| {
                PlanError::Invalid(format!("invalid numeric literal {}", text))
            })?)),
        },
        Value::SingleQuotedString(s) | Value::DoubleQuotedString(s) => {
            ScalarValue::Utf8(Some(s.clone()))
        }
        Value::Boolean(b) => ScalarValue::Boolean(Some(*b)),
        Value::Null => ScalarValue::Null,
        other => return Err(PlanError::Unsupported(format!("literal {}", other))),
    })
}

fn parse_row_count(expr: &AstExpr) -> PlanResult<usize> {
    match expr {
        AstExpr::Value(Value::Number(text, _)) => text
            .parse::<usize>()
            .map_err(|_| PlanError::Invalid(format!("invalid row count {}", text))),
        other => Err(PlanError::Unsupported(format!("row count {}", other))),
    }
}

fn sql_type(data_type: &sqlparser::ast::DataType) -> PlanResult<ColumnDataType> {
    ColumnDataType::from_sql(data_type)
        .ok_or_else(|| PlanError::Unsupported(format!("data type {}", data_type)))
}

fn binary_op(op: &BinaryOperator) -> PlanResult<BinaryOp> {
    Ok(match op {
        BinaryOperator::Eq => BinaryOp::Eq,
        BinaryOperator::NotEq => BinaryOp::NotEq,
        BinaryOperator::Lt => BinaryOp::Lt,
        BinaryOperator::LtEq => BinaryOp::LtEq,
        BinaryOperator::Gt => BinaryOp::Gt,
        BinaryOperator::GtEq => BinaryOp::GtEq,
        BinaryOperator::Plus => BinaryOp::Plus,
        BinaryOperator::Minus => BinaryOp::Minus,
        BinaryOperator::Multiply => BinaryOp::Multiply,
        BinaryOperator::Divide => BinaryOp::Divide,
        BinaryOperator::Modulo => BinaryOp::Modulo,
        BinaryOperator::And => BinaryOp::And,
        BinaryOperator::Or => BinaryOp::Or,
        BinaryOperator::StringConcat => BinaryOp::Concat,
        other => return Err(PlanError::Unsupported(format!("operator {}", other))),
    })
}
