//! Logical expressions for query plans.
//!
//! These expressions are used in logical plans and are independent of
//! physical execution. They support type inference against a [`Schema`]
//! and generic bottom-up rewriting through [`LogicalExpr::transform_up`].

use std::collections::HashSet;
use std::fmt;

use super::plan::LogicalPlan;
use super::{PlanError, PlanResult};
use crate::data::{Column, ColumnDataType, QualifiedField, ScalarValue, Schema};

/// A logical expression.
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalExpr {
    /// Column reference.
    Column(Column),

    /// Reference to a column of an enclosing query, inside a correlated
    /// subquery.
    OuterReferenceColumn {
        /// The outer column.
        column: Column,
        /// Its type in the outer schema.
        data_type: ColumnDataType,
    },

    /// Literal value.
    Literal(ScalarValue),

    /// Alias (expression AS name).
    Alias {
        /// Aliased expression.
        expr: Box<LogicalExpr>,
        /// Output name.
        name: String,
    },

    /// Binary operation.
    BinaryOp {
        /// Left operand.
        left: Box<LogicalExpr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<LogicalExpr>,
    },

    /// Logical negation.
    Not(Box<LogicalExpr>),

    /// Arithmetic negation.
    Negative(Box<LogicalExpr>),

    /// IS NULL check.
    IsNull(Box<LogicalExpr>),

    /// IS NOT NULL check.
    IsNotNull(Box<LogicalExpr>),

    /// LIKE / ILIKE pattern match.
    Like {
        /// NOT LIKE.
        negated: bool,
        /// ILIKE.
        case_insensitive: bool,
        /// Matched expression.
        expr: Box<LogicalExpr>,
        /// Pattern expression.
        pattern: Box<LogicalExpr>,
        /// Escape character, if any.
        escape_char: Option<char>,
    },

    /// BETWEEN expression.
    Between {
        /// Tested expression.
        expr: Box<LogicalExpr>,
        /// NOT BETWEEN.
        negated: bool,
        /// Lower bound (inclusive).
        low: Box<LogicalExpr>,
        /// Upper bound (inclusive).
        high: Box<LogicalExpr>,
    },

    /// CASE expression.
    Case {
        /// Base expression of the simple form (`CASE x WHEN ...`).
        operand: Option<Box<LogicalExpr>>,
        /// WHEN / THEN pairs.
        when_then: Vec<(LogicalExpr, LogicalExpr)>,
        /// ELSE result.
        else_result: Option<Box<LogicalExpr>>,
    },

    /// IN list.
    InList {
        /// Tested expression.
        expr: Box<LogicalExpr>,
        /// Candidate values.
        list: Vec<LogicalExpr>,
        /// NOT IN.
        negated: bool,
    },

    /// CAST expression.
    Cast {
        /// Converted expression.
        expr: Box<LogicalExpr>,
        /// Target type.
        data_type: ColumnDataType,
    },

    /// Aggregate function call.
    AggregateFunction {
        /// Function.
        func: AggregateFunc,
        /// Arguments.
        args: Vec<LogicalExpr>,
        /// DISTINCT modifier.
        distinct: bool,
    },

    /// Sort key.
    OrderBy {
        /// Sorted expression.
        expr: Box<LogicalExpr>,
        /// Ascending order.
        asc: bool,
        /// Nulls sort before values.
        nulls_first: bool,
    },

    /// Scalar subquery (returns a single value).
    ScalarSubquery(LogicalPlan),

    /// Wildcard (`*` or `table.*`).
    Wildcard {
        /// Table qualifier.
        qualifier: Option<String>,
    },
}

impl LogicalExpr {
    // ===== Builder methods =====

    /// Creates a column reference.
    pub fn col(name: impl Into<String>) -> Self {
        LogicalExpr::Column(Column::new(name))
    }

    /// Creates a qualified column reference.
    pub fn qualified_col(qualifier: impl Into<String>, name: impl Into<String>) -> Self {
        LogicalExpr::Column(Column::qualified(qualifier, name))
    }

    /// Creates a literal.
    pub fn lit(value: impl Into<ScalarValue>) -> Self {
        LogicalExpr::Literal(value.into())
    }

    /// Creates an alias.
    pub fn alias(self, name: impl Into<String>) -> Self {
        LogicalExpr::Alias {
            expr: Box::new(self),
            name: name.into(),
        }
    }

    /// Creates a binary operation.
    pub fn binary(self, op: BinaryOp, other: LogicalExpr) -> Self {
        LogicalExpr::BinaryOp {
            left: Box::new(self),
            op,
            right: Box::new(other),
        }
    }

    /// Creates an equality comparison.
    pub fn eq(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::Eq, other)
    }

    /// Creates an inequality comparison.
    pub fn not_eq(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::NotEq, other)
    }

    /// Creates a less-than comparison.
    pub fn lt(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::Lt, other)
    }

    /// Creates a less-than-or-equal comparison.
    pub fn lt_eq(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::LtEq, other)
    }

    /// Creates a greater-than comparison.
    pub fn gt(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::Gt, other)
    }

    /// Creates a greater-than-or-equal comparison.
    pub fn gt_eq(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::GtEq, other)
    }

    /// Creates a logical AND.
    pub fn and(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::And, other)
    }

    /// Creates a logical OR.
    pub fn or(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::Or, other)
    }

    /// Creates an addition.
    pub fn add(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::Plus, other)
    }

    /// Creates a multiplication.
    pub fn mul(self, other: LogicalExpr) -> Self {
        self.binary(BinaryOp::Multiply, other)
    }

    /// Creates a NOT.
    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Self {
        LogicalExpr::Not(Box::new(self))
    }

    /// Creates an IS NULL check.
    pub fn is_null(self) -> Self {
        LogicalExpr::IsNull(Box::new(self))
    }

    /// Creates a LIKE match.
    pub fn like(self, pattern: LogicalExpr) -> Self {
        LogicalExpr::Like {
            negated: false,
            case_insensitive: false,
            expr: Box::new(self),
            pattern: Box::new(pattern),
            escape_char: None,
        }
    }

    /// Creates a sort key.
    pub fn sort(self, asc: bool, nulls_first: bool) -> Self {
        LogicalExpr::OrderBy {
            expr: Box::new(self),
            asc,
            nulls_first,
        }
    }

    /// Creates an aggregate function call.
    pub fn aggregate(func: AggregateFunc, args: Vec<LogicalExpr>) -> Self {
        LogicalExpr::AggregateFunction {
            func,
            args,
            distinct: false,
        }
    }

    // ===== Traversal =====

    /// Returns the direct child expressions. Subquery plans are not
    /// descended into.
    pub fn children(&self) -> Vec<&LogicalExpr> {
        match self {
            LogicalExpr::Column(_)
            | LogicalExpr::OuterReferenceColumn { .. }
            | LogicalExpr::Literal(_)
            | LogicalExpr::ScalarSubquery(_)
            | LogicalExpr::Wildcard { .. } => vec![],
            LogicalExpr::Alias { expr, .. }
            | LogicalExpr::Not(expr)
            | LogicalExpr::Negative(expr)
            | LogicalExpr::IsNull(expr)
            | LogicalExpr::IsNotNull(expr)
            | LogicalExpr::Cast { expr, .. }
            | LogicalExpr::OrderBy { expr, .. } => vec![expr],
            LogicalExpr::BinaryOp { left, right, .. } => vec![left, right],
            LogicalExpr::Like { expr, pattern, .. } => vec![expr, pattern],
            LogicalExpr::Between {
                expr, low, high, ..
            } => vec![expr, low, high],
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => {
                let mut children: Vec<&LogicalExpr> = Vec::new();
                if let Some(operand) = operand {
                    children.push(operand);
                }
                for (when, then) in when_then {
                    children.push(when);
                    children.push(then);
                }
                if let Some(else_result) = else_result {
                    children.push(else_result);
                }
                children
            }
            LogicalExpr::InList { expr, list, .. } => {
                let mut children: Vec<&LogicalExpr> = vec![expr];
                children.extend(list.iter());
                children
            }
            LogicalExpr::AggregateFunction { args, .. } => args.iter().collect(),
        }
    }

    /// Rebuilds this expression with each direct child replaced by `f(child)`.
    pub fn map_children<F>(self, f: &mut F) -> PlanResult<LogicalExpr>
    where
        F: FnMut(LogicalExpr) -> PlanResult<LogicalExpr>,
    {
        let boxed = |e: Box<LogicalExpr>, f: &mut F| f(*e).map(Box::new);
        Ok(match self {
            LogicalExpr::Column(_)
            | LogicalExpr::OuterReferenceColumn { .. }
            | LogicalExpr::Literal(_)
            | LogicalExpr::ScalarSubquery(_)
            | LogicalExpr::Wildcard { .. } => self,
            LogicalExpr::Alias { expr, name } => LogicalExpr::Alias {
                expr: boxed(expr, f)?,
                name,
            },
            LogicalExpr::BinaryOp { left, op, right } => LogicalExpr::BinaryOp {
                left: boxed(left, f)?,
                op,
                right: boxed(right, f)?,
            },
            LogicalExpr::Not(expr) => LogicalExpr::Not(boxed(expr, f)?),
            LogicalExpr::Negative(expr) => LogicalExpr::Negative(boxed(expr, f)?),
            LogicalExpr::IsNull(expr) => LogicalExpr::IsNull(boxed(expr, f)?),
            LogicalExpr::IsNotNull(expr) => LogicalExpr::IsNotNull(boxed(expr, f)?),
            LogicalExpr::Like {
                negated,
                case_insensitive,
                expr,
                pattern,
                escape_char,
            } => LogicalExpr::Like {
                negated,
                case_insensitive,
                expr: boxed(expr, f)?,
                pattern: boxed(pattern, f)?,
                escape_char,
            },
            LogicalExpr::Between {
                expr,
                negated,
                low,
                high,
            } => LogicalExpr::Between {
                expr: boxed(expr, f)?,
                negated,
                low: boxed(low, f)?,
                high: boxed(high, f)?,
            },
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => LogicalExpr::Case {
                operand: operand.map(|e| boxed(e, f)).transpose()?,
                when_then: when_then
                    .into_iter()
                    .map(|(w, t)| Ok((f(w)?, f(t)?)))
                    .collect::<PlanResult<_>>()?,
                else_result: else_result.map(|e| boxed(e, f)).transpose()?,
            },
            LogicalExpr::InList {
                expr,
                list,
                negated,
            } => LogicalExpr::InList {
                expr: boxed(expr, f)?,
                list: list.into_iter().map(&mut *f).collect::<PlanResult<_>>()?,
                negated,
            },
            LogicalExpr::Cast { expr, data_type } => LogicalExpr::Cast {
                expr: boxed(expr, f)?,
                data_type,
            },
            LogicalExpr::AggregateFunction {
                func,
                args,
                distinct,
            } => LogicalExpr::AggregateFunction {
                func,
                args: args.into_iter().map(&mut *f).collect::<PlanResult<_>>()?,
                distinct,
            },
            LogicalExpr::OrderBy {
                expr,
                asc,
                nulls_first,
            } => LogicalExpr::OrderBy {
                expr: boxed(expr, f)?,
                asc,
                nulls_first,
            },
        })
    }

    /// Rewrites the expression bottom-up: children first, then `f` on the
    /// rebuilt node.
    pub fn transform_up<F>(self, f: &mut F) -> PlanResult<LogicalExpr>
    where
        F: FnMut(LogicalExpr) -> PlanResult<LogicalExpr>,
    {
        let rebuilt = self.map_children(&mut |child| child.transform_up(f))?;
        f(rebuilt)
    }

    /// Visits every node in pre-order. Returning false skips the node's
    /// children.
    pub fn apply<F>(&self, f: &mut F)
    where
        F: FnMut(&LogicalExpr) -> bool,
    {
        if f(self) {
            for child in self.children() {
                child.apply(f);
            }
        }
    }

    // ===== Analysis methods =====

    /// Returns all column references in this expression, excluding outer
    /// references.
    pub fn columns(&self) -> HashSet<Column> {
        let mut cols = HashSet::new();
        self.apply(&mut |e| {
            if let LogicalExpr::Column(c) = e {
                cols.insert(c.clone());
            }
            true
        });
        cols
    }

    /// Returns all outer column references in this expression.
    pub fn outer_columns(&self) -> Vec<Column> {
        let mut cols = Vec::new();
        self.apply(&mut |e| {
            if let LogicalExpr::OuterReferenceColumn { column, .. } = e {
                cols.push(column.clone());
            }
            true
        });
        cols
    }

    /// Returns true if this expression contains any aggregate functions.
    pub fn contains_aggregate(&self) -> bool {
        self.any(|e| matches!(e, LogicalExpr::AggregateFunction { .. }))
    }

    /// Returns true if this expression references an enclosing query.
    pub fn contains_outer_reference(&self) -> bool {
        self.any(|e| matches!(e, LogicalExpr::OuterReferenceColumn { .. }))
    }

    /// Returns true if this expression contains a scalar subquery.
    pub fn contains_subquery(&self) -> bool {
        self.any(|e| matches!(e, LogicalExpr::ScalarSubquery(_)))
    }

    fn any(&self, predicate: impl Fn(&LogicalExpr) -> bool) -> bool {
        let mut found = false;
        self.apply(&mut |e| {
            found = found || predicate(e);
            !found
        });
        found
    }

    /// Returns the expression without a top-level alias.
    pub fn unalias(self) -> LogicalExpr {
        match self {
            LogicalExpr::Alias { expr, .. } => *expr,
            other => other,
        }
    }

    /// Infers the output data type of this expression given an input schema.
    pub fn data_type(&self, schema: &Schema) -> PlanResult<ColumnDataType> {
        Ok(match self {
            LogicalExpr::Column(col) => {
                let index = schema
                    .index_of_column(col)
                    .ok_or_else(|| PlanError::ColumnNotFound(col.qualified_name()))?;
                schema.fields()[index].data_type
            }
            LogicalExpr::OuterReferenceColumn { data_type, .. } => *data_type,
            LogicalExpr::Literal(value) => value.data_type(),
            LogicalExpr::Alias { expr, .. } | LogicalExpr::OrderBy { expr, .. } => {
                expr.data_type(schema)?
            }
            LogicalExpr::BinaryOp { left, op, right } => {
                let (l, r) = (left.data_type(schema)?, right.data_type(schema)?);
                op.result_type(l, r).ok_or_else(|| {
                    PlanError::Type(format!("cannot apply {} to {} and {}", op, l, r))
                })?
            }
            LogicalExpr::Negative(expr) => {
                let t = expr.data_type(schema)?;
                if !t.is_numeric() && t != ColumnDataType::Null {
                    return Err(PlanError::Type(format!("cannot negate {}", t)));
                }
                t
            }
            LogicalExpr::Not(_)
            | LogicalExpr::IsNull(_)
            | LogicalExpr::IsNotNull(_)
            | LogicalExpr::Like { .. }
            | LogicalExpr::Between { .. }
            | LogicalExpr::InList { .. } => ColumnDataType::Boolean,
            LogicalExpr::Case {
                when_then,
                else_result,
                ..
            } => {
                let mut result = ColumnDataType::Null;
                let branches = when_then
                    .iter()
                    .map(|(_, then)| then)
                    .chain(else_result.iter().map(|e| e.as_ref()));
                for branch in branches {
                    let t = branch.data_type(schema)?;
                    result = result.common_with(&t).ok_or_else(|| {
                        PlanError::Type(format!("CASE branches have types {} and {}", result, t))
                    })?;
                }
                result
            }
            LogicalExpr::Cast { data_type, .. } => *data_type,
            LogicalExpr::AggregateFunction { func, args, .. } => {
                let arg_types = args
                    .iter()
                    .filter(|a| !matches!(a, LogicalExpr::Wildcard { .. }))
                    .map(|a| a.data_type(schema))
                    .collect::<PlanResult<Vec<_>>>()?;
                func.return_type(&arg_types).map_err(PlanError::Type)?
            }
            LogicalExpr::ScalarSubquery(plan) => plan
                .schema()
                .field(0)
                .map(|f| f.data_type)
                .ok_or_else(|| PlanError::Invalid("scalar subquery has no columns".into()))?,
            LogicalExpr::Wildcard { .. } => {
                return Err(PlanError::Invalid("wildcard has no data type".into()))
            }
        })
    }

    /// Returns the output field this expression produces over `schema`.
    /// Bare columns keep their qualifier.
    pub fn to_field(&self, schema: &Schema) -> PlanResult<QualifiedField> {
        match self {
            LogicalExpr::Column(col) => {
                let index = schema
                    .index_of_column(col)
                    .ok_or_else(|| PlanError::ColumnNotFound(col.qualified_name()))?;
                Ok(schema.fields()[index].clone())
            }
            other => Ok(QualifiedField::new(
                other.output_name(),
                other.data_type(schema)?,
            )),
        }
    }

    /// Returns the output name of this expression.
    pub fn output_name(&self) -> String {
        match self {
            LogicalExpr::Column(col) => col.name.clone(),
            LogicalExpr::Alias { name, .. } => name.clone(),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for LogicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogicalExpr::Column(col) => write!(f, "{}", col),
            LogicalExpr::OuterReferenceColumn { column, .. } => write!(f, "outer_ref({})", column),
            LogicalExpr::Literal(ScalarValue::Utf8(Some(s))) => write!(f, "'{}'", s),
            LogicalExpr::Literal(value) => write!(f, "{}", value),
            LogicalExpr::Alias { expr, name } => write!(f, "{} AS {}", expr, name),
            LogicalExpr::BinaryOp { left, op, right } => write!(f, "{} {} {}", left, op, right),
            LogicalExpr::Not(expr) => write!(f, "NOT {}", expr),
            LogicalExpr::Negative(expr) => write!(f, "(- {})", expr),
            LogicalExpr::IsNull(expr) => write!(f, "{} IS NULL", expr),
            LogicalExpr::IsNotNull(expr) => write!(f, "{} IS NOT NULL", expr),
            LogicalExpr::Like {
                negated,
                case_insensitive,
                expr,
                pattern,
                ..
            } => {
                let op = if *case_insensitive { "ILIKE" } else { "LIKE" };
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}{} {}", expr, not, op, pattern)
            }
            LogicalExpr::Between {
                expr,
                negated,
                low,
                high,
            } => {
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}BETWEEN {} AND {}", expr, not, low, high)
            }
            LogicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => {
                write!(f, "CASE")?;
                if let Some(operand) = operand {
                    write!(f, " {}", operand)?;
                }
                for (when, then) in when_then {
                    write!(f, " WHEN {} THEN {}", when, then)?;
                }
                if let Some(else_result) = else_result {
                    write!(f, " ELSE {}", else_result)?;
                }
                write!(f, " END")
            }
            LogicalExpr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<_> = list.iter().map(|e| e.to_string()).collect();
                let not = if *negated { "NOT " } else { "" };
                write!(f, "{} {}IN ({})", expr, not, items.join(", "))
            }
            LogicalExpr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
            LogicalExpr::AggregateFunction {
                func,
                args,
                distinct,
            } => {
                let args: Vec<_> = args.iter().map(|a| a.to_string()).collect();
                let distinct = if *distinct { "DISTINCT " } else { "" };
                write!(f, "{}({}{})", func, distinct, args.join(", "))
            }
            LogicalExpr::OrderBy {
                expr,
                asc,
                nulls_first,
            } => write!(
                f,
                "{} {} NULLS {}",
                expr,
                if *asc { "ASC" } else { "DESC" },
                if *nulls_first { "FIRST" } else { "LAST" }
            ),
            LogicalExpr::ScalarSubquery(_) => write!(f, "(<subquery>)"),
            LogicalExpr::Wildcard { qualifier: Some(q) } => write!(f, "{}.*", q),
            LogicalExpr::Wildcard { qualifier: None } => write!(f, "*"),
        }
    }
}

/// Binary operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `%`
    Modulo,
    /// `AND`
    And,
    /// `OR`
    Or,
    /// `||`
    Concat,
}

impl BinaryOp {
    /// Returns true if this is a comparison operator.
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq
                | BinaryOp::NotEq
                | BinaryOp::Lt
                | BinaryOp::LtEq
                | BinaryOp::Gt
                | BinaryOp::GtEq
        )
    }

    /// Returns true if this is a logical operator.
    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }

    /// Returns true if this is an arithmetic operator.
    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            BinaryOp::Plus
                | BinaryOp::Minus
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo
        )
    }

    /// Swaps the operands (for normalizing column on left).
    pub fn swap(&self) -> Option<BinaryOp> {
        match self {
            BinaryOp::Eq => Some(BinaryOp::Eq),
            BinaryOp::NotEq => Some(BinaryOp::NotEq),
            BinaryOp::Lt => Some(BinaryOp::Gt),
            BinaryOp::LtEq => Some(BinaryOp::GtEq),
            BinaryOp::Gt => Some(BinaryOp::Lt),
            BinaryOp::GtEq => Some(BinaryOp::LtEq),
            BinaryOp::Plus | BinaryOp::Multiply | BinaryOp::And | BinaryOp::Or => Some(*self),
            _ => None,
        }
    }

    /// Returns the result type of applying this operator, or `None` if the
    /// operand types are not supported.
    pub fn result_type(
        &self,
        left: ColumnDataType,
        right: ColumnDataType,
    ) -> Option<ColumnDataType> {
        if self.is_comparison() {
            return left.common_with(&right).map(|_| ColumnDataType::Boolean);
        }
        match self {
            BinaryOp::And | BinaryOp::Or => {
                let ok = |t: ColumnDataType| {
                    matches!(t, ColumnDataType::Boolean | ColumnDataType::Null)
                };
                (ok(left) && ok(right)).then_some(ColumnDataType::Boolean)
            }
            BinaryOp::Concat => Some(ColumnDataType::Utf8),
            _ => left.arithmetic_result(&right),
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinaryOp::Eq => write!(f, "="),
            BinaryOp::NotEq => write!(f, "<>"),
            BinaryOp::Lt => write!(f, "<"),
            BinaryOp::LtEq => write!(f, "<="),
            BinaryOp::Gt => write!(f, ">"),
            BinaryOp::GtEq => write!(f, ">="),
            BinaryOp::Plus => write!(f, "+"),
            BinaryOp::Minus => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Modulo => write!(f, "%"),
            BinaryOp::And => write!(f, "AND"),
            BinaryOp::Or => write!(f, "OR"),
            BinaryOp::Concat => write!(f, "||"),
        }
    }
}

/// Sample or population statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatsType {
    /// Divide by `n - 1`.
    Sample,
    /// Divide by `n`.
    Population,
}

/// Aggregate function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunc {
    /// COUNT
    Count,
    /// SUM
    Sum,
    /// MIN
    Min,
    /// MAX
    Max,
    /// AVG
    Avg,
    /// MEDIAN
    Median,
    /// VAR_SAMP / VAR_POP
    Variance(StatsType),
    /// STDDEV_SAMP / STDDEV_POP
    Stddev(StatsType),
    /// COVAR_SAMP / COVAR_POP
    Covariance(StatsType),
}

impl AggregateFunc {
    /// Looks up an aggregate by SQL function name (case-insensitive).
    pub fn from_name(name: &str) -> Option<AggregateFunc> {
        use StatsType::*;
        Some(match name.to_ascii_uppercase().as_str() {
            "COUNT" => AggregateFunc::Count,
            "SUM" => AggregateFunc::Sum,
            "MIN" => AggregateFunc::Min,
            "MAX" => AggregateFunc::Max,
            "AVG" | "MEAN" => AggregateFunc::Avg,
            "MEDIAN" => AggregateFunc::Median,
            "VARIANCE" | "VAR" | "VAR_SAMP" => AggregateFunc::Variance(Sample),
            "VAR_POP" => AggregateFunc::Variance(Population),
            "STDDEV" | "STDDEV_SAMP" => AggregateFunc::Stddev(Sample),
            "STDDEV_POP" => AggregateFunc::Stddev(Population),
            "COVAR" | "COVAR_SAMP" => AggregateFunc::Covariance(Sample),
            "COVAR_POP" => AggregateFunc::Covariance(Population),
            _ => return None,
        })
    }

    /// Returns the number of arguments the function takes.
    pub fn arity(&self) -> usize {
        match self {
            AggregateFunc::Covariance(_) => 2,
            _ => 1,
        }
    }

    /// Returns the result type for the given argument types, or an error
    /// message if the function does not accept them.
    pub fn return_type(&self, args: &[ColumnDataType]) -> Result<ColumnDataType, String> {
        let numeric = |t: &ColumnDataType| t.is_numeric() || *t == ColumnDataType::Null;
        match self {
            AggregateFunc::Count => Ok(ColumnDataType::Long),
            AggregateFunc::Min | AggregateFunc::Max => {
                Ok(args.first().copied().unwrap_or(ColumnDataType::Null))
            }
            AggregateFunc::Sum => match args.first() {
                Some(t) if t.is_integer() || *t == ColumnDataType::Null => Ok(ColumnDataType::Long),
                Some(ColumnDataType::Double) => Ok(ColumnDataType::Double),
                Some(t) => Err(format!("SUM does not support {}", t)),
                None => Err("SUM requires an argument".to_string()),
            },
            _ => {
                if args.len() != self.arity() {
                    return Err(format!("{} expects {} argument(s)", self, self.arity()));
                }
                match args.iter().find(|t| !numeric(t)) {
                    Some(t) => Err(format!("{} does not support {}", self, t)),
                    None => Ok(ColumnDataType::Double),
                }
            }
        }
    }
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use StatsType::*;
        let name = match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Median => "MEDIAN",
            AggregateFunc::Variance(Sample) => "VAR_SAMP",
            AggregateFunc::Variance(Population) => "VAR_POP",
            AggregateFunc::Stddev(Sample) => "STDDEV_SAMP",
            AggregateFunc::Stddev(Population) => "STDDEV_POP",
            AggregateFunc::Covariance(Sample) => "COVAR_SAMP",
            AggregateFunc::Covariance(Population) => "COVAR_POP",
        };
        write!(f, "{}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_schema() -> Schema {
        Schema::new(vec![
            QualifiedField::new("a", ColumnDataType::Integer),
            QualifiedField::new("b", ColumnDataType::Double),
            QualifiedField::new("s", ColumnDataType::Utf8),
        ])
    }

    #[test]
    fn test_data_type_inference() {
        let schema = test_schema();
        let expr = LogicalExpr::col("a").add(LogicalExpr::lit(1i64));
        assert_eq!(expr.data_type(&schema).unwrap(), ColumnDataType::Long);

        let expr = LogicalExpr::col("a").mul(LogicalExpr::col("b"));
        assert_eq!(expr.data_type(&schema).unwrap(), ColumnDataType::Double);

        let expr = LogicalExpr::col("a").gt(LogicalExpr::lit(1i64));
        assert_eq!(expr.data_type(&schema).unwrap(), ColumnDataType::Boolean);
    }

    #[test]
    fn test_sum_over_utf8_is_type_error() {
        let schema = test_schema();
        let expr = LogicalExpr::aggregate(AggregateFunc::Sum, vec![LogicalExpr::col("s")]);
        assert!(matches!(expr.data_type(&schema), Err(PlanError::Type(_))));
    }

    #[test]
    fn test_missing_column() {
        let schema = test_schema();
        assert!(matches!(
            LogicalExpr::col("zz").data_type(&schema),
            Err(PlanError::ColumnNotFound(_))
        ));
    }

    #[test]
    fn test_columns_and_aggregates() {
        let expr = LogicalExpr::aggregate(AggregateFunc::Max, vec![LogicalExpr::col("a")])
            .add(LogicalExpr::qualified_col("t", "b"));
        let cols = expr.columns();
        assert!(cols.contains(&Column::new("a")));
        assert!(cols.contains(&Column::qualified("t", "b")));
        assert!(expr.contains_aggregate());
        assert!(!LogicalExpr::col("a").contains_aggregate());
    }

    #[test]
    fn test_transform_up_rewrites_leaves() {
        let expr = LogicalExpr::col("a").and(LogicalExpr::col("b").not());
        let rewritten = expr
            .transform_up(&mut |e| {
                Ok(match e {
                    LogicalExpr::Column(c) => LogicalExpr::qualified_col("t", c.name),
                    other => other,
                })
            })
            .unwrap();
        assert_eq!(rewritten.to_string(), "t.a AND NOT t.b");
    }

    #[test]
    fn test_output_names() {
        assert_eq!(LogicalExpr::qualified_col("t", "a").output_name(), "a");
        assert_eq!(LogicalExpr::lit(1i64).alias("one").output_name(), "one");
        let count = LogicalExpr::aggregate(
            AggregateFunc::Count,
            vec![LogicalExpr::Wildcard { qualifier: None }],
        );
        assert_eq!(count.output_name(), "COUNT(*)");
    }

    #[test]
    fn test_case_type_is_common_type() {
        let schema = test_schema();
        let case = LogicalExpr::Case {
            operand: None,
            when_then: vec![(LogicalExpr::col("a").gt(LogicalExpr::lit(0i64)), LogicalExpr::col("a"))],
            else_result: Some(Box::new(LogicalExpr::col("b"))),
        };
        assert_eq!(case.data_type(&schema).unwrap(), ColumnDataType::Double);
    }

    #[test]
    fn test_aggregate_names() {
        assert_eq!(
            AggregateFunc::from_name("stddev"),
            Some(AggregateFunc::Stddev(StatsType::Sample))
        );
        assert_eq!(AggregateFunc::from_name("nope"), None);
        assert_eq!(AggregateFunc::Covariance(StatsType::Population).arity(), 2);
    }
}
