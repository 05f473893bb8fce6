//! Logical operators for query plans.
//!
//! These represent the abstract operations in a query plan tree. Every
//! operator carries its output schema, computed once at construction.

use std::fmt;
use std::sync::Arc;

use super::expr::LogicalExpr;
use super::{PlanError, PlanResult};
use crate::data::{ColumnDataType, QualifiedField, Schema, SchemaRef, TableReference};

/// Join type for join operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JoinType {
    /// Matching pairs only.
    Inner,
    /// All left rows, nulls for unmatched right.
    Left,
    /// All right rows, nulls for unmatched left.
    Right,
    /// All rows from both sides.
    Full,
    /// Left rows that have a match on the right.
    LeftSemi,
    /// Left rows that have no match on the right.
    LeftAnti,
    /// Right rows that have a match on the left.
    RightSemi,
    /// Right rows that have no match on the left.
    RightAnti,
}

impl JoinType {
    /// Returns true if this join preserves all rows from the left side.
    pub fn preserves_left(&self) -> bool {
        matches!(self, JoinType::Left | JoinType::Full)
    }

    /// Returns true if this join preserves all rows from the right side.
    pub fn preserves_right(&self) -> bool {
        matches!(self, JoinType::Right | JoinType::Full)
    }

    /// Returns true if the output carries only the left side's columns.
    pub fn outputs_left_only(&self) -> bool {
        matches!(self, JoinType::LeftSemi | JoinType::LeftAnti)
    }

    /// Returns true if the output carries only the right side's columns.
    pub fn outputs_right_only(&self) -> bool {
        matches!(self, JoinType::RightSemi | JoinType::RightAnti)
    }

    /// Returns the output schema of a join of `left` and `right`.
    pub fn output_schema(&self, left: &Schema, right: &Schema) -> Schema {
        if self.outputs_left_only() {
            left.clone()
        } else if self.outputs_right_only() {
            right.clone()
        } else {
            Schema::join(left, right)
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinType::Inner => write!(f, "Inner"),
            JoinType::Left => write!(f, "Left"),
            JoinType::Right => write!(f, "Right"),
            JoinType::Full => write!(f, "Full"),
            JoinType::LeftSemi => write!(f, "LeftSemi"),
            JoinType::LeftAnti => write!(f, "LeftAnti"),
            JoinType::RightSemi => write!(f, "RightSemi"),
            JoinType::RightAnti => write!(f, "RightAnti"),
        }
    }
}

/// A logical operator in a query plan.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalOperator {
    /// Table scan.
    Scan(ScanOperator),

    /// Projection (SELECT clause).
    Projection(ProjectionOperator),

    /// Filter (WHERE / HAVING clause).
    Filter(FilterOperator),

    /// Aggregate (GROUP BY).
    Aggregate(AggregateOperator),

    /// Sort (ORDER BY).
    Sort(SortOperator),

    /// Distinct (SELECT DISTINCT).
    Distinct(DistinctOperator),

    /// Join with equality keys and an optional residual filter.
    Join(JoinOperator),

    /// Cartesian product.
    CrossJoin(CrossJoinOperator),

    /// Concatenation of inputs with identical shapes (UNION ALL).
    Union(UnionOperator),

    /// Limit (LIMIT/OFFSET).
    Limit(LimitOperator),

    /// Subquery alias.
    SubqueryAlias(SubqueryAliasOperator),

    /// Empty relation.
    EmptyRelation(EmptyRelationOperator),
}

impl LogicalOperator {
    /// Returns the output schema of this operator.
    pub fn schema(&self) -> SchemaRef {
        match self {
            LogicalOperator::Scan(op) => op.projected_schema.clone(),
            LogicalOperator::Projection(op) => op.schema.clone(),
            LogicalOperator::Filter(op) => op.input.schema(),
            LogicalOperator::Aggregate(op) => op.schema.clone(),
            LogicalOperator::Sort(op) => op.input.schema(),
            LogicalOperator::Distinct(op) => op.input.schema(),
            LogicalOperator::Join(op) => op.schema.clone(),
            LogicalOperator::CrossJoin(op) => op.schema.clone(),
            LogicalOperator::Union(op) => op.schema.clone(),
            LogicalOperator::Limit(op) => op.input.schema(),
            LogicalOperator::SubqueryAlias(op) => op.schema.clone(),
            LogicalOperator::EmptyRelation(op) => op.schema.clone(),
        }
    }

    /// Returns the child operators.
    pub fn inputs(&self) -> Vec<&Arc<LogicalOperator>> {
        match self {
            LogicalOperator::Scan(_) | LogicalOperator::EmptyRelation(_) => vec![],
            LogicalOperator::Projection(op) => vec![&op.input],
            LogicalOperator::Filter(op) => vec![&op.input],
            LogicalOperator::Aggregate(op) => vec![&op.input],
            LogicalOperator::Sort(op) => vec![&op.input],
            LogicalOperator::Distinct(op) => vec![&op.input],
            LogicalOperator::Join(op) => vec![&op.left, &op.right],
            LogicalOperator::CrossJoin(op) => vec![&op.left, &op.right],
            LogicalOperator::Union(op) => op.inputs.iter().collect(),
            LogicalOperator::Limit(op) => vec![&op.input],
            LogicalOperator::SubqueryAlias(op) => vec![&op.input],
        }
    }

    /// Returns the expressions this operator evaluates, in a stable order.
    pub fn expressions(&self) -> Vec<&LogicalExpr> {
        match self {
            LogicalOperator::Projection(op) => op.exprs.iter().collect(),
            LogicalOperator::Filter(op) => vec![&op.predicate],
            LogicalOperator::Aggregate(op) => {
                op.group_by.iter().chain(op.aggregates.iter()).collect()
            }
            LogicalOperator::Sort(op) => op.order_by.iter().collect(),
            LogicalOperator::Join(op) => op
                .on
                .iter()
                .flat_map(|(l, r)| [l, r])
                .chain(op.filter.iter())
                .collect(),
            LogicalOperator::Scan(_)
            | LogicalOperator::Distinct(_)
            | LogicalOperator::CrossJoin(_)
            | LogicalOperator::Union(_)
            | LogicalOperator::Limit(_)
            | LogicalOperator::SubqueryAlias(_)
            | LogicalOperator::EmptyRelation(_) => vec![],
        }
    }

    /// Returns true if this is a leaf operator.
    pub fn is_leaf(&self) -> bool {
        matches!(
            self,
            LogicalOperator::Scan(_) | LogicalOperator::EmptyRelation(_)
        )
    }

    /// Returns the operator name.
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOperator::Scan(_) => "Scan",
            LogicalOperator::Projection(_) => "Projection",
            LogicalOperator::Filter(_) => "Filter",
            LogicalOperator::Aggregate(_) => "Aggregate",
            LogicalOperator::Sort(_) => "Sort",
            LogicalOperator::Distinct(_) => "Distinct",
            LogicalOperator::Join(_) => "Join",
            LogicalOperator::CrossJoin(_) => "CrossJoin",
            LogicalOperator::Union(_) => "Union",
            LogicalOperator::Limit(_) => "Limit",
            LogicalOperator::SubqueryAlias(_) => "SubqueryAlias",
            LogicalOperator::EmptyRelation(_) => "EmptyRelation",
        }
    }

    /// Rebuilds this operator over new inputs, recomputing the output
    /// schema. `inputs` must have the same arity as [`Self::inputs`].
    pub fn with_new_inputs(&self, inputs: Vec<Arc<LogicalOperator>>) -> PlanResult<Self> {
        let expected = self.inputs().len();
        if inputs.len() != expected {
            return Err(PlanError::Internal(format!(
                "{} expects {} inputs, got {}",
                self.name(),
                expected,
                inputs.len()
            )));
        }
        let mut inputs = inputs.into_iter();
        let mut next = || {
            inputs
                .next()
                .ok_or_else(|| PlanError::Internal("missing operator input".into()))
        };
        Ok(match self {
            LogicalOperator::Scan(_) | LogicalOperator::EmptyRelation(_) => self.clone(),
            LogicalOperator::Projection(op) => {
                ProjectionOperator::try_new(next()?, op.exprs.clone())?.into()
            }
            LogicalOperator::Filter(op) => {
                FilterOperator::try_new(next()?, op.predicate.clone())?.into()
            }
            LogicalOperator::Aggregate(op) => {
                AggregateOperator::try_new(next()?, op.group_by.clone(), op.aggregates.clone())?
                    .into()
            }
            LogicalOperator::Sort(op) => LogicalOperator::Sort(SortOperator {
                input: next()?,
                order_by: op.order_by.clone(),
                fetch: op.fetch,
            }),
            LogicalOperator::Distinct(_) => {
                LogicalOperator::Distinct(DistinctOperator { input: next()? })
            }
            LogicalOperator::Join(op) => {
                let left = next()?;
                let right = next()?;
                JoinOperator::try_new(left, right, op.join_type, op.on.clone(), op.filter.clone())?
                    .into()
            }
            LogicalOperator::CrossJoin(_) => {
                let left = next()?;
                let right = next()?;
                CrossJoinOperator::new(left, right).into()
            }
            LogicalOperator::Union(_) => {
                let mut all = Vec::with_capacity(expected);
                while let Ok(input) = next() {
                    all.push(input);
                }
                UnionOperator::try_new(all)?.into()
            }
            LogicalOperator::Limit(op) => LogicalOperator::Limit(LimitOperator {
                input: next()?,
                skip: op.skip,
                fetch: op.fetch,
            }),
            LogicalOperator::SubqueryAlias(op) => {
                SubqueryAliasOperator::new(next()?, op.alias.clone()).into()
            }
        })
    }
}

macro_rules! impl_from_operator {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for LogicalOperator {
                fn from(op: $ty) -> Self {
                    LogicalOperator::$variant(op)
                }
            }
        )*
    };
}

impl_from_operator! {
    Scan => ScanOperator,
    Projection => ProjectionOperator,
    Filter => FilterOperator,
    Aggregate => AggregateOperator,
    Join => JoinOperator,
    CrossJoin => CrossJoinOperator,
    Union => UnionOperator,
    SubqueryAlias => SubqueryAliasOperator,
}

/// Table scan operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOperator {
    /// Registered table name.
    pub table_name: String,
    /// Table reference (name and alias) qualifying the output fields.
    pub table: TableReference,
    /// Full source schema, qualified by `table`.
    pub source_schema: SchemaRef,
    /// Projected columns (None = all).
    pub projection: Option<Vec<usize>>,
    /// Schema after projection.
    pub projected_schema: SchemaRef,
}

impl ScanOperator {
    /// Creates a scan over every column of `schema`.
    pub fn new(table: TableReference, schema: &Schema) -> Self {
        let schema = Arc::new(schema.with_qualifier(&table));
        Self {
            table_name: table.name.clone(),
            table,
            source_schema: schema.clone(),
            projection: None,
            projected_schema: schema,
        }
    }

    /// Narrows the scan to the source columns at `indices`.
    pub fn with_projection(mut self, indices: Vec<usize>) -> PlanResult<Self> {
        let projected = self.source_schema.project(&indices).ok_or_else(|| {
            PlanError::Internal(format!(
                "scan projection {:?} out of range for {}",
                indices, self.table_name
            ))
        })?;
        self.projected_schema = Arc::new(projected);
        self.projection = Some(indices);
        Ok(self)
    }
}

/// Projection operator.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Projection expressions.
    pub exprs: Vec<LogicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

impl ProjectionOperator {
    /// Creates a projection, resolving each expression against the input.
    pub fn try_new(input: Arc<LogicalOperator>, exprs: Vec<LogicalExpr>) -> PlanResult<Self> {
        let input_schema = input.schema();
        let fields = exprs
            .iter()
            .map(|e| e.to_field(&input_schema))
            .collect::<PlanResult<Vec<_>>>()?;
        Ok(Self {
            input,
            exprs,
            schema: Arc::new(Schema::new(fields)),
        })
    }
}

/// Filter operator.
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Filter predicate.
    pub predicate: LogicalExpr,
}

impl FilterOperator {
    /// Creates a filter. The predicate must be boolean.
    pub fn try_new(input: Arc<LogicalOperator>, predicate: LogicalExpr) -> PlanResult<Self> {
        let data_type = predicate.data_type(&input.schema())?;
        if !matches!(data_type, ColumnDataType::Boolean | ColumnDataType::Null) {
            return Err(PlanError::Type(format!(
                "filter predicate {} has type {}, expected Boolean",
                predicate, data_type
            )));
        }
        Ok(Self { input, predicate })
    }

    /// Returns the conjuncts of the predicate.
    pub fn conjuncts(&self) -> Vec<&LogicalExpr> {
        extract_conjuncts(&self.predicate)
    }
}

/// Aggregate operator.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Group by expressions.
    pub group_by: Vec<LogicalExpr>,
    /// Aggregate expressions.
    pub aggregates: Vec<LogicalExpr>,
    /// Output schema: group columns followed by aggregate columns.
    pub schema: SchemaRef,
}

impl AggregateOperator {
    /// Creates an aggregate operator.
    pub fn try_new(
        input: Arc<LogicalOperator>,
        group_by: Vec<LogicalExpr>,
        aggregates: Vec<LogicalExpr>,
    ) -> PlanResult<Self> {
        let input_schema = input.schema();
        let mut fields = Vec::with_capacity(group_by.len() + aggregates.len());
        for expr in &group_by {
            fields.push(expr.to_field(&input_schema)?);
        }
        for expr in &aggregates {
            if !expr.contains_aggregate() {
                return Err(PlanError::Invalid(format!(
                    "{} is not an aggregate expression",
                    expr
                )));
            }
            fields.push(QualifiedField::new(
                expr.output_name(),
                expr.data_type(&input_schema)?,
            ));
        }
        Ok(Self {
            input,
            group_by,
            aggregates,
            schema: Arc::new(Schema::new(fields)),
        })
    }
}

/// Sort operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SortOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Sort keys, each a [`LogicalExpr::OrderBy`].
    pub order_by: Vec<LogicalExpr>,
    /// Keep only the first `fetch` rows.
    pub fetch: Option<usize>,
}

/// Distinct operator.
#[derive(Debug, Clone, PartialEq)]
pub struct DistinctOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
}

/// Join operator.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinOperator {
    /// Left input.
    pub left: Arc<LogicalOperator>,
    /// Right input.
    pub right: Arc<LogicalOperator>,
    /// Join type.
    pub join_type: JoinType,
    /// Equality keys: (left expression, right expression).
    pub on: Vec<(LogicalExpr, LogicalExpr)>,
    /// Residual non-equality condition.
    pub filter: Option<LogicalExpr>,
    /// Output schema.
    pub schema: SchemaRef,
}

impl JoinOperator {
    /// Creates a join. Each key must resolve against its own side and the
    /// filter must resolve against the combined schema.
    pub fn try_new(
        left: Arc<LogicalOperator>,
        right: Arc<LogicalOperator>,
        join_type: JoinType,
        on: Vec<(LogicalExpr, LogicalExpr)>,
        filter: Option<LogicalExpr>,
    ) -> PlanResult<Self> {
        let left_schema = left.schema();
        let right_schema = right.schema();
        for (l, r) in &on {
            l.data_type(&left_schema)?;
            r.data_type(&right_schema)?;
        }
        if let Some(filter) = &filter {
            let combined = Schema::join(&left_schema, &right_schema);
            for column in filter.columns() {
                if combined.index_of_column(&column).is_none() {
                    return Err(PlanError::ColumnNotFound(format!(
                        "join filter references {} outside the joined inputs",
                        column
                    )));
                }
            }
            filter.data_type(&combined)?;
        }
        let schema = Arc::new(join_type.output_schema(&left_schema, &right_schema));
        Ok(Self {
            left,
            right,
            join_type,
            on,
            filter,
            schema,
        })
    }

    /// Returns true if the join has at least one equality key.
    pub fn is_equi_join(&self) -> bool {
        !self.on.is_empty()
    }
}

/// Cross join operator.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossJoinOperator {
    /// Left input.
    pub left: Arc<LogicalOperator>,
    /// Right input.
    pub right: Arc<LogicalOperator>,
    /// Output schema: left fields then right fields.
    pub schema: SchemaRef,
}

impl CrossJoinOperator {
    /// Creates a cross join.
    pub fn new(left: Arc<LogicalOperator>, right: Arc<LogicalOperator>) -> Self {
        let schema = Arc::new(Schema::join(&left.schema(), &right.schema()));
        Self {
            left,
            right,
            schema,
        }
    }
}

/// Union operator (bag semantics).
#[derive(Debug, Clone, PartialEq)]
pub struct UnionOperator {
    /// Inputs, all with the same number of columns.
    pub inputs: Vec<Arc<LogicalOperator>>,
    /// Output schema: first input's names, widened types, no qualifiers.
    pub schema: SchemaRef,
}

impl UnionOperator {
    /// Creates a union. Column counts must agree and column types must have
    /// a common type.
    pub fn try_new(inputs: Vec<Arc<LogicalOperator>>) -> PlanResult<Self> {
        let first = inputs
            .first()
            .ok_or_else(|| PlanError::Invalid("UNION requires at least one input".into()))?
            .schema();
        let mut fields: Vec<QualifiedField> = first.unqualified().fields().to_vec();
        for input in inputs.iter().skip(1) {
            let schema = input.schema();
            if schema.len() != fields.len() {
                return Err(PlanError::Invalid(format!(
                    "UNION inputs have {} and {} columns",
                    fields.len(),
                    schema.len()
                )));
            }
            for (field, other) in fields.iter_mut().zip(schema.fields()) {
                field.data_type = field.data_type.common_with(&other.data_type).ok_or_else(|| {
                    PlanError::Type(format!(
                        "UNION column {} has types {} and {}",
                        field.name, field.data_type, other.data_type
                    ))
                })?;
            }
        }
        Ok(Self {
            inputs,
            schema: Arc::new(Schema::new(fields)),
        })
    }
}

/// Limit operator.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Rows to skip.
    pub skip: usize,
    /// Rows to return after skipping (None = all).
    pub fetch: Option<usize>,
}

/// Subquery alias operator.
#[derive(Debug, Clone, PartialEq)]
pub struct SubqueryAliasOperator {
    /// Input operator.
    pub input: Arc<LogicalOperator>,
    /// Alias.
    pub alias: String,
    /// Input schema requalified by the alias.
    pub schema: SchemaRef,
}

impl SubqueryAliasOperator {
    /// Creates an alias over `input`.
    pub fn new(input: Arc<LogicalOperator>, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        let schema = Arc::new(input.schema().with_qualifier(&TableReference::new(&alias)));
        Self {
            input,
            alias,
            schema,
        }
    }
}

/// Empty relation operator.
#[derive(Debug, Clone, PartialEq)]
pub struct EmptyRelationOperator {
    /// Produce a single row with no columns (`SELECT 1`).
    pub produce_one_row: bool,
    /// Output schema.
    pub schema: SchemaRef,
}

/// Splits a predicate into its AND-ed conjuncts.
pub fn extract_conjuncts(expr: &LogicalExpr) -> Vec<&LogicalExpr> {
    match expr {
        LogicalExpr::BinaryOp {
            left,
            op: super::expr::BinaryOp::And,
            right,
        } => {
            let mut result = extract_conjuncts(left);
            result.extend(extract_conjuncts(right));
            result
        }
        _ => vec![expr],
    }
}

/// Combines predicates with AND. Returns `None` for an empty list.
pub fn conjoin(exprs: Vec<LogicalExpr>) -> Option<LogicalExpr> {
    exprs.into_iter().reduce(|acc, e| acc.and(e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::expr::AggregateFunc;

    fn scan(name: &str, cols: &[(&str, ColumnDataType)]) -> Arc<LogicalOperator> {
        let schema = Schema::new(
            cols.iter()
                .map(|(n, t)| QualifiedField::new(*n, *t))
                .collect(),
        );
        Arc::new(ScanOperator::new(TableReference::new(name), &schema).into())
    }

    #[test]
    fn test_scan_qualifies_and_projects() {
        let op = ScanOperator::new(
            TableReference::aliased("orders", "o"),
            &Schema::new(vec![
                QualifiedField::new("id", ColumnDataType::Long),
                QualifiedField::new("total", ColumnDataType::Double),
            ]),
        )
        .with_projection(vec![1])
        .unwrap();
        assert_eq!(op.projected_schema.len(), 1);
        assert_eq!(op.projected_schema.fields()[0].qualified_name(), "o.total");
        assert!(op.clone().with_projection(vec![5]).is_err());
    }

    #[test]
    fn test_filter_requires_boolean() {
        let input = scan("t", &[("a", ColumnDataType::Long)]);
        assert!(FilterOperator::try_new(
            input.clone(),
            LogicalExpr::col("a").gt(LogicalExpr::lit(1i64))
        )
        .is_ok());
        assert!(matches!(
            FilterOperator::try_new(input, LogicalExpr::col("a")),
            Err(PlanError::Type(_))
        ));
    }

    #[test]
    fn test_join_schema_by_type() {
        let left = scan("l", &[("a", ColumnDataType::Long)]);
        let right = scan("r", &[("b", ColumnDataType::Long), ("c", ColumnDataType::Utf8)]);
        let on = vec![(LogicalExpr::col("a"), LogicalExpr::col("b"))];

        let inner =
            JoinOperator::try_new(left.clone(), right.clone(), JoinType::Inner, on.clone(), None)
                .unwrap();
        assert_eq!(inner.schema.len(), 3);

        let semi =
            JoinOperator::try_new(left.clone(), right.clone(), JoinType::LeftSemi, on.clone(), None)
                .unwrap();
        assert_eq!(semi.schema.field_names(), vec!["a"]);

        let anti = JoinOperator::try_new(left, right, JoinType::RightAnti, on, None).unwrap();
        assert_eq!(anti.schema.field_names(), vec!["b", "c"]);
    }

    #[test]
    fn test_join_filter_outside_schema_is_plan_error() {
        let left = scan("l", &[("a", ColumnDataType::Long)]);
        let right = scan("r", &[("b", ColumnDataType::Long)]);
        let filter = LogicalExpr::qualified_col("x", "z").gt(LogicalExpr::lit(1i64));
        let result = JoinOperator::try_new(left, right, JoinType::Inner, vec![], Some(filter));
        assert!(matches!(result, Err(PlanError::ColumnNotFound(_))));
    }

    #[test]
    fn test_aggregate_schema() {
        let input = scan("t", &[("k", ColumnDataType::Utf8), ("v", ColumnDataType::Integer)]);
        let agg = AggregateOperator::try_new(
            input,
            vec![LogicalExpr::col("k")],
            vec![LogicalExpr::aggregate(AggregateFunc::Sum, vec![LogicalExpr::col("v")])],
        )
        .unwrap();
        assert_eq!(agg.schema.field_names(), vec!["k", "SUM(v)"]);
        assert_eq!(agg.schema.fields()[1].data_type, ColumnDataType::Long);
    }

    #[test]
    fn test_union_widens_types() {
        let a = scan("a", &[("x", ColumnDataType::Byte)]);
        let b = scan("b", &[("y", ColumnDataType::Long)]);
        let union = UnionOperator::try_new(vec![a.clone(), b]).unwrap();
        assert_eq!(union.schema.fields()[0].name, "x");
        assert_eq!(union.schema.fields()[0].data_type, ColumnDataType::Long);

        let c = scan("c", &[("x", ColumnDataType::Long), ("y", ColumnDataType::Long)]);
        assert!(UnionOperator::try_new(vec![a, c]).is_err());
    }

    #[test]
    fn test_with_new_inputs_recomputes_schema() {
        let input = scan("t", &[("a", ColumnDataType::Long), ("b", ColumnDataType::Utf8)]);
        let alias: LogicalOperator = SubqueryAliasOperator::new(input, "s").into();
        let narrower = scan("t", &[("a", ColumnDataType::Long)]);
        let rebuilt = alias.with_new_inputs(vec![narrower]).unwrap();
        assert_eq!(rebuilt.schema().len(), 1);
        assert_eq!(rebuilt.schema().fields()[0].qualified_name(), "s.a");
        assert!(alias.with_new_inputs(vec![]).is_err());
    }

    #[test]
    fn test_conjuncts_round_trip() {
        let a = LogicalExpr::col("a").gt(LogicalExpr::lit(1i64));
        let b = LogicalExpr::col("b").is_null();
        let c = LogicalExpr::col("c").eq(LogicalExpr::lit(2i64));
        let combined = conjoin(vec![a.clone(), b.clone(), c.clone()]).unwrap();
        let parts = extract_conjuncts(&combined);
        assert_eq!(parts, vec![&a, &b, &c]);
        assert!(conjoin(vec![]).is_none());
    }
}
