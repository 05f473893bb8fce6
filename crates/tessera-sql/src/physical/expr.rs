//! Physical expressions.
//!
//! A [`PhysicalExpr`] is a logical expression resolved against a concrete
//! input schema: columns are addressed by position, and evaluation works on
//! a whole [`RecordBatch`] at a time, producing a [`ColumnValue`].

use std::cmp::Ordering;
use std::fmt;

use crate::data::{ColumnDataType, ColumnValue, RecordArray, RecordBatch, ScalarValue, Schema};
use crate::error::{ExecResult, ExecutionError};
use crate::logical::BinaryOp;

/// A physical expression that can be evaluated on data.
#[derive(Debug, Clone, PartialEq)]
pub enum PhysicalExpr {
    /// Column reference by index.
    Column {
        /// Column name for display.
        name: String,
        /// Column index in the input schema.
        index: usize,
    },

    /// Literal value.
    Literal(ScalarValue),

    /// Binary operation.
    Binary {
        /// Left operand.
        left: Box<PhysicalExpr>,
        /// Operator.
        op: BinaryOp,
        /// Right operand.
        right: Box<PhysicalExpr>,
    },

    /// Logical negation.
    Not(Box<PhysicalExpr>),

    /// Arithmetic negation.
    Negative(Box<PhysicalExpr>),

    /// IS NULL check.
    IsNull(Box<PhysicalExpr>),

    /// IS NOT NULL check.
    IsNotNull(Box<PhysicalExpr>),

    /// LIKE / ILIKE pattern matching.
    Like {
        /// Expression to match.
        expr: Box<PhysicalExpr>,
        /// Pattern.
        pattern: Box<PhysicalExpr>,
        /// Whether negated.
        negated: bool,
        /// Case insensitive (ILIKE).
        case_insensitive: bool,
        /// Escape character; backslash when absent.
        escape_char: Option<char>,
    },

    /// CASE expression.
    Case {
        /// Base expression of the simple form.
        operand: Option<Box<PhysicalExpr>>,
        /// WHEN-THEN pairs.
        when_then: Vec<(PhysicalExpr, PhysicalExpr)>,
        /// ELSE result.
        else_result: Option<Box<PhysicalExpr>>,
    },

    /// IN list check.
    InList {
        /// Expression to check.
        expr: Box<PhysicalExpr>,
        /// List of values.
        list: Vec<PhysicalExpr>,
        /// Whether negated (NOT IN).
        negated: bool,
    },

    /// CAST expression.
    Cast {
        /// Expression to cast.
        expr: Box<PhysicalExpr>,
        /// Target data type.
        data_type: ColumnDataType,
    },
}

impl PhysicalExpr {
    /// Creates a column reference.
    pub fn column(name: impl Into<String>, index: usize) -> Self {
        PhysicalExpr::Column {
            name: name.into(),
            index,
        }
    }

    /// Creates a literal expression.
    pub fn literal(value: impl Into<ScalarValue>) -> Self {
        PhysicalExpr::Literal(value.into())
    }

    /// Creates a binary expression.
    pub fn binary(left: PhysicalExpr, op: BinaryOp, right: PhysicalExpr) -> Self {
        PhysicalExpr::Binary {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    /// Returns the output data type of this expression given an input
    /// schema. Fails if an operator does not accept its operand types.
    pub fn data_type(&self, schema: &Schema) -> ExecResult<ColumnDataType> {
        match self {
            PhysicalExpr::Column { name, index } => schema
                .field(*index)
                .map(|f| f.data_type)
                .ok_or_else(|| {
                    ExecutionError::Schema(format!(
                        "column {} at index {} is not in {}",
                        name, index, schema
                    ))
                }),
            PhysicalExpr::Literal(value) => Ok(value.data_type()),
            PhysicalExpr::Binary { left, op, right } => {
                let (l, r) = (left.data_type(schema)?, right.data_type(schema)?);
                op.result_type(l, r).ok_or_else(|| {
                    ExecutionError::Type(format!("cannot apply {} to {} and {}", op, l, r))
                })
            }
            PhysicalExpr::Negative(expr) => {
                let data_type = expr.data_type(schema)?;
                if data_type.is_numeric() || data_type == ColumnDataType::Null {
                    Ok(data_type)
                } else {
                    Err(ExecutionError::Type(format!("cannot negate {}", data_type)))
                }
            }
            PhysicalExpr::Like { expr, pattern, .. } => {
                check_like_types(expr.data_type(schema)?, pattern.data_type(schema)?)?;
                Ok(ColumnDataType::Boolean)
            }
            PhysicalExpr::Case {
                when_then,
                else_result,
                ..
            } => {
                let mut result = ColumnDataType::Null;
                let branches = when_then
                    .iter()
                    .map(|(_, then)| then)
                    .chain(else_result.as_deref());
                for branch in branches {
                    let data_type = branch.data_type(schema)?;
                    result = result.common_with(&data_type).ok_or_else(|| {
                        ExecutionError::Type(format!(
                            "CASE branches have incompatible types {} and {}",
                            result, data_type
                        ))
                    })?;
                }
                Ok(result)
            }
            PhysicalExpr::Cast { data_type, .. } => Ok(*data_type),
            PhysicalExpr::Not(_)
            | PhysicalExpr::IsNull(_)
            | PhysicalExpr::IsNotNull(_)
            | PhysicalExpr::InList { .. } => Ok(ColumnDataType::Boolean),
        }
    }

    /// Evaluates the expression over every row of `batch`.
    pub fn evaluate(&self, batch: &RecordBatch) -> ExecResult<ColumnValue> {
        let num_rows = batch.num_rows();
        match self {
            PhysicalExpr::Column { name, index } => batch
                .column(*index)
                .cloned()
                .map(ColumnValue::Array)
                .ok_or_else(|| {
                    ExecutionError::Schema(format!(
                        "column {} at index {} is out of range for a batch of {} columns",
                        name,
                        index,
                        batch.num_columns()
                    ))
                }),
            PhysicalExpr::Literal(value) => Ok(ColumnValue::scalar(value.clone(), num_rows)),
            PhysicalExpr::Binary { left, op, right } => {
                let left = left.evaluate(batch)?;
                let right = right.evaluate(batch)?;
                let result_type = op
                    .result_type(left.data_type(), right.data_type())
                    .ok_or_else(|| {
                        ExecutionError::Type(format!(
                            "cannot apply {} to {} and {}",
                            op,
                            left.data_type(),
                            right.data_type()
                        ))
                    })?;
                map_binary(&left, &right, result_type, |l, r| binary_scalar(l, *op, r))
            }
            PhysicalExpr::Not(expr) => {
                map_unary(&expr.evaluate(batch)?, ColumnDataType::Boolean, |v| {
                    Ok(ScalarValue::Boolean(as_logical(v)?.map(|b| !b)))
                })
            }
            PhysicalExpr::Negative(expr) => {
                let value = expr.evaluate(batch)?;
                map_unary(&value, value.data_type(), negate)
            }
            PhysicalExpr::IsNull(expr) => {
                map_unary(&expr.evaluate(batch)?, ColumnDataType::Boolean, |v| {
                    Ok(ScalarValue::Boolean(Some(v.is_null())))
                })
            }
            PhysicalExpr::IsNotNull(expr) => {
                map_unary(&expr.evaluate(batch)?, ColumnDataType::Boolean, |v| {
                    Ok(ScalarValue::Boolean(Some(!v.is_null())))
                })
            }
            PhysicalExpr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
                escape_char,
            } => {
                let value = expr.evaluate(batch)?;
                let pattern = pattern.evaluate(batch)?;
                check_like_types(value.data_type(), pattern.data_type())?;
                let escape = escape_char.unwrap_or('\\');
                let compiled = match &pattern {
                    ColumnValue::Scalar { value, .. } => value
                        .as_str()
                        .map(|p| LikePattern::new(p, escape, *case_insensitive)),
                    ColumnValue::Array(_) => None,
                };
                let mut result = Vec::with_capacity(value.len());
                for i in 0..value.len() {
                    let text = value.get(i);
                    let matched = match (text.as_str(), &compiled) {
                        (None, _) => None,
                        (Some(text), Some(compiled)) => Some(compiled.matches(text)),
                        (Some(text), None) => pattern
                            .get(i)
                            .as_str()
                            .map(|p| LikePattern::new(p, escape, *case_insensitive).matches(text)),
                    };
                    result.push(matched.map(|m| m != *negated));
                }
                Ok(ColumnValue::Array(RecordArray::Boolean(result)))
            }
            PhysicalExpr::Case {
                operand,
                when_then,
                else_result,
            } => evaluate_case(
                batch,
                operand.as_deref(),
                when_then,
                else_result.as_deref(),
                self.data_type(batch.schema())?,
            ),
            PhysicalExpr::InList {
                expr,
                list,
                negated,
            } => {
                let value = expr.evaluate(batch)?;
                let items = list
                    .iter()
                    .map(|item| item.evaluate(batch))
                    .collect::<ExecResult<Vec<_>>>()?;
                let result = (0..value.len())
                    .map(|i| in_list(&value.get(i), items.iter().map(|item| item.get(i)), *negated))
                    .collect();
                Ok(ColumnValue::Array(RecordArray::Boolean(result)))
            }
            PhysicalExpr::Cast { expr, data_type } => match expr.evaluate(batch)? {
                ColumnValue::Scalar { value, len } => {
                    Ok(ColumnValue::scalar(cast_scalar(&value, *data_type), len))
                }
                ColumnValue::Array(array) => Ok(ColumnValue::Array(array.cast(*data_type))),
            },
        }
    }
}

/// Evaluates a CASE expression.
///
/// Rows not yet matched by an earlier WHEN form the remainder mask. Each
/// WHEN is evaluated only over the remainder, its result is scattered back
/// to full row positions, THEN is evaluated only over the newly matched
/// rows, and those rows leave the remainder. ELSE sees whatever is left.
/// In the simple form, rows whose base value is null skip every WHEN.
fn evaluate_case(
    batch: &RecordBatch,
    operand: Option<&PhysicalExpr>,
    when_then: &[(PhysicalExpr, PhysicalExpr)],
    else_result: Option<&PhysicalExpr>,
    result_type: ColumnDataType,
) -> ExecResult<ColumnValue> {
    let num_rows = batch.num_rows();
    let base = operand
        .map(|expr| expr.evaluate(batch).map(|v| v.to_array(num_rows)))
        .transpose()?;
    let base_nulls: Vec<bool> = match &base {
        Some(base) => (0..num_rows).map(|i| base.is_null(i)).collect(),
        None => vec![false; num_rows],
    };
    let mut remainder: Vec<bool> = base_nulls.iter().map(|null| !null).collect();
    let mut output = RecordArray::new_null(result_type, num_rows);

    for (when, then) in when_then {
        if !remainder.iter().any(|r| *r) {
            break;
        }
        let candidates = batch.filtered(&remainder)?;
        let condition = when.evaluate(&candidates)?;
        let dense: Vec<Option<bool>> = match &base {
            Some(base) => {
                let mut base = base.clone();
                base.filter(&remainder);
                (0..candidates.num_rows())
                    .map(|i| {
                        Some(compare_values(&base.get(i), &condition.get(i)) == Some(Ordering::Equal))
                    })
                    .collect()
            }
            None => condition
                .to_mask()
                .ok_or_else(|| {
                    ExecutionError::Type(format!(
                        "CASE condition {} is not boolean but {}",
                        when,
                        condition.data_type()
                    ))
                })?
                .into_iter()
                .map(Some)
                .collect(),
        };
        let matched = RecordArray::scatter(&remainder, &RecordArray::Boolean(dense))?
            .as_boolean()
            .map(|values| values.into_iter().map(|v| v.unwrap_or(false)).collect::<Vec<_>>())
            .ok_or_else(|| ExecutionError::Internal("scattered CASE mask is not boolean".into()))?;
        if matched.iter().any(|m| *m) {
            let values = then.evaluate(&batch.filtered(&matched)?)?;
            output.scatter_into(&matched, &values.into_array().cast(result_type))?;
        }
        for (rest, hit) in remainder.iter_mut().zip(&matched) {
            *rest &= !*hit;
        }
    }

    if let Some(else_result) = else_result {
        let unmatched: Vec<bool> = remainder
            .iter()
            .zip(&base_nulls)
            .map(|(rest, null)| *rest || *null)
            .collect();
        if unmatched.iter().any(|u| *u) {
            let values = else_result.evaluate(&batch.filtered(&unmatched)?)?;
            output.scatter_into(&unmatched, &values.into_array().cast(result_type))?;
        }
    }
    Ok(ColumnValue::Array(output))
}

fn map_unary<F>(value: &ColumnValue, result_type: ColumnDataType, f: F) -> ExecResult<ColumnValue>
where
    F: Fn(&ScalarValue) -> ExecResult<ScalarValue>,
{
    match value {
        ColumnValue::Scalar { value, len } => Ok(ColumnValue::scalar(f(value)?, *len)),
        ColumnValue::Array(array) => {
            let mut result = RecordArray::new_empty(result_type, array.len());
            for v in array.iter() {
                result.push_widening(&f(&v)?)?;
            }
            Ok(ColumnValue::Array(result))
        }
    }
}

fn map_binary<F>(
    left: &ColumnValue,
    right: &ColumnValue,
    result_type: ColumnDataType,
    f: F,
) -> ExecResult<ColumnValue>
where
    F: Fn(&ScalarValue, &ScalarValue) -> ExecResult<ScalarValue>,
{
    if let (
        ColumnValue::Scalar { value: l, len },
        ColumnValue::Scalar { value: r, .. },
    ) = (left, right)
    {
        return Ok(ColumnValue::scalar(f(l, r)?, *len));
    }
    let len = left.len().max(right.len());
    let mut result = RecordArray::new_empty(result_type, len);
    for i in 0..len {
        result.push_widening(&f(&left.get(i), &right.get(i))?)?;
    }
    Ok(ColumnValue::Array(result))
}

fn binary_scalar(left: &ScalarValue, op: BinaryOp, right: &ScalarValue) -> ExecResult<ScalarValue> {
    match op {
        BinaryOp::And => Ok(ScalarValue::Boolean(
            match (as_logical(left)?, as_logical(right)?) {
                (Some(false), _) | (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
        )),
        BinaryOp::Or => Ok(ScalarValue::Boolean(
            match (as_logical(left)?, as_logical(right)?) {
                (Some(true), _) | (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
        )),
        BinaryOp::Concat => Ok(ScalarValue::Utf8(
            (!left.is_null() && !right.is_null()).then(|| format!("{}{}", left, right)),
        )),
        op if op.is_comparison() => Ok(ScalarValue::Boolean(
            compare_values(left, right).map(|ordering| comparison_holds(op, ordering)),
        )),
        op => arithmetic(left, op, right),
    }
}

fn as_logical(value: &ScalarValue) -> ExecResult<Option<bool>> {
    match value {
        ScalarValue::Boolean(b) => Ok(*b),
        ScalarValue::Null => Ok(None),
        other => Err(ExecutionError::Type(format!(
            "expected a boolean, got {}",
            other.data_type()
        ))),
    }
}

fn comparison_holds(op: BinaryOp, ordering: Ordering) -> bool {
    match op {
        BinaryOp::Eq => ordering == Ordering::Equal,
        BinaryOp::NotEq => ordering != Ordering::Equal,
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::LtEq => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        BinaryOp::GtEq => ordering != Ordering::Less,
        _ => false,
    }
}

/// Compares two values, coercing a string operand to the other operand's
/// type. Returns `None` when either side is null or the values cannot be
/// compared.
pub(crate) fn compare_values(left: &ScalarValue, right: &ScalarValue) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    if let Some(ordering) = left.compare(right) {
        return Some(ordering);
    }
    match (left, right) {
        (ScalarValue::Utf8(_), _) => cast_scalar(left, right.data_type()).compare(right),
        (_, ScalarValue::Utf8(_)) => left.compare(&cast_scalar(right, left.data_type())),
        _ => None,
    }
}

/// Converts a scalar to `data_type` with the same coercion rules as column
/// ingestion; unrepresentable values become null.
pub(crate) fn cast_scalar(value: &ScalarValue, data_type: ColumnDataType) -> ScalarValue {
    RecordArray::from_scalar(value, 1).cast(data_type).get(0)
}

fn arithmetic(left: &ScalarValue, op: BinaryOp, right: &ScalarValue) -> ExecResult<ScalarValue> {
    use ScalarValue::{Double, Integer, Null};
    let numeric = |v: &ScalarValue| matches!(v, Null | Integer(_) | Double(_));
    if !numeric(left) || !numeric(right) {
        return Err(ExecutionError::Type(format!(
            "cannot apply {} to {} and {}",
            op,
            left.data_type(),
            right.data_type()
        )));
    }
    match (left, right) {
        (Integer(Some(a)), Integer(Some(b))) => integer_arithmetic(*a, op, *b).map(|v| Integer(Some(v))),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => float_arithmetic(a, op, b).map(|v| Double(Some(v))),
            _ if matches!(left, Double(_)) || matches!(right, Double(_)) => Ok(Double(None)),
            _ => Ok(Integer(None)),
        },
    }
}

fn integer_arithmetic(a: i64, op: BinaryOp, b: i64) -> ExecResult<i64> {
    let result = match op {
        BinaryOp::Plus => a.checked_add(b),
        BinaryOp::Minus => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide | BinaryOp::Modulo if b == 0 => {
            return Err(ExecutionError::Arithmetic("division by zero".into()))
        }
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        other => {
            return Err(ExecutionError::Internal(format!(
                "{} is not an arithmetic operator",
                other
            )))
        }
    };
    result.ok_or_else(|| {
        ExecutionError::Arithmetic(format!("integer overflow in {} {} {}", a, op, b))
    })
}

fn float_arithmetic(a: f64, op: BinaryOp, b: f64) -> ExecResult<f64> {
    match op {
        BinaryOp::Plus => Ok(a + b),
        BinaryOp::Minus => Ok(a - b),
        BinaryOp::Multiply => Ok(a * b),
        BinaryOp::Divide | BinaryOp::Modulo if b == 0.0 => {
            Err(ExecutionError::Arithmetic("division by zero".into()))
        }
        BinaryOp::Divide => Ok(a / b),
        BinaryOp::Modulo => Ok(a % b),
        other => Err(ExecutionError::Internal(format!(
            "{} is not an arithmetic operator",
            other
        ))),
    }
}

fn negate(value: &ScalarValue) -> ExecResult<ScalarValue> {
    match value {
        ScalarValue::Null => Ok(ScalarValue::Null),
        ScalarValue::Integer(None) => Ok(ScalarValue::Integer(None)),
        ScalarValue::Integer(Some(v)) => v
            .checked_neg()
            .map(|v| ScalarValue::Integer(Some(v)))
            .ok_or_else(|| ExecutionError::Arithmetic(format!("integer overflow in -{}", v))),
        ScalarValue::Double(v) => Ok(ScalarValue::Double(v.map(|v| -v))),
        other => Err(ExecutionError::Type(format!(
            "cannot negate {}",
            other.data_type()
        ))),
    }
}

fn in_list(
    value: &ScalarValue,
    items: impl Iterator<Item = ScalarValue>,
    negated: bool,
) -> Option<bool> {
    if value.is_null() {
        return None;
    }
    let mut saw_null = false;
    for item in items {
        if item.is_null() {
            saw_null = true;
        } else if compare_values(value, &item) == Some(Ordering::Equal) {
            return Some(!negated);
        }
    }
    (!saw_null).then_some(negated)
}

fn check_like_types(value: ColumnDataType, pattern: ColumnDataType) -> ExecResult<()> {
    let textual = |t: ColumnDataType| matches!(t, ColumnDataType::Utf8 | ColumnDataType::Null);
    if textual(value) && textual(pattern) {
        Ok(())
    } else {
        Err(ExecutionError::Type(format!(
            "LIKE requires string operands, got {} and {}",
            value, pattern
        )))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum LikeToken {
    /// `%`
    AnySequence,
    /// `_`
    AnyChar,
    Char(char),
}

/// A compiled LIKE pattern.
#[derive(Debug, Clone)]
struct LikePattern {
    tokens: Vec<LikeToken>,
    case_insensitive: bool,
}

impl LikePattern {
    fn new(pattern: &str, escape: char, case_insensitive: bool) -> Self {
        let mut tokens = Vec::with_capacity(pattern.len());
        let mut chars = pattern.chars();
        while let Some(c) = chars.next() {
            let token = match c {
                c if c == escape => LikeToken::Char(chars.next().unwrap_or(escape)),
                '%' => LikeToken::AnySequence,
                '_' => LikeToken::AnyChar,
                c => LikeToken::Char(c),
            };
            let token = match token {
                LikeToken::Char(c) if case_insensitive => LikeToken::Char(fold_case(c)),
                other => other,
            };
            // Consecutive `%` are equivalent to one.
            if token == LikeToken::AnySequence && tokens.last() == Some(&LikeToken::AnySequence) {
                continue;
            }
            tokens.push(token);
        }
        Self {
            tokens,
            case_insensitive,
        }
    }

    fn matches(&self, text: &str) -> bool {
        let text: Vec<char> = if self.case_insensitive {
            text.chars().map(fold_case).collect()
        } else {
            text.chars().collect()
        };
        let (mut t, mut p) = (0, 0);
        // Position after the last `%` and the text position it is retried at.
        let mut backtrack: Option<(usize, usize)> = None;
        while t < text.len() {
            match self.tokens.get(p) {
                Some(LikeToken::AnySequence) => {
                    p += 1;
                    backtrack = Some((p, t));
                }
                Some(LikeToken::AnyChar) => {
                    p += 1;
                    t += 1;
                }
                Some(LikeToken::Char(c)) if text.get(t) == Some(c) => {
                    p += 1;
                    t += 1;
                }
                _ => match backtrack {
                    Some((after, start)) => {
                        p = after;
                        t = start + 1;
                        backtrack = Some((after, start + 1));
                    }
                    None => return false,
                },
            }
        }
        self.tokens
            .iter()
            .skip(p)
            .all(|token| *token == LikeToken::AnySequence)
    }
}

fn fold_case(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

impl fmt::Display for PhysicalExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PhysicalExpr::Column { name, .. } => write!(f, "{}", name),
            PhysicalExpr::Literal(ScalarValue::Utf8(Some(s))) => write!(f, "'{}'", s),
            PhysicalExpr::Literal(value) => write!(f, "{}", value),
            PhysicalExpr::Binary { left, op, right } => write!(f, "{} {} {}", left, op, right),
            PhysicalExpr::Not(expr) => write!(f, "NOT {}", expr),
            PhysicalExpr::Negative(expr) => write!(f, "-{}", expr),
            PhysicalExpr::IsNull(expr) => write!(f, "{} IS NULL", expr),
            PhysicalExpr::IsNotNull(expr) => write!(f, "{} IS NOT NULL", expr),
            PhysicalExpr::Like {
                expr,
                pattern,
                negated,
                case_insensitive,
                ..
            } => write!(
                f,
                "{} {}{} {}",
                expr,
                if *negated { "NOT " } else { "" },
                if *case_insensitive { "ILIKE" } else { "LIKE" },
                pattern
            ),
            PhysicalExpr::Case {
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
            PhysicalExpr::InList {
                expr,
                list,
                negated,
            } => {
                let items: Vec<String> = list.iter().map(ToString::to_string).collect();
                write!(
                    f,
                    "{} {}IN ({})",
                    expr,
                    if *negated { "NOT " } else { "" },
                    items.join(", ")
                )
            }
            PhysicalExpr::Cast { expr, data_type } => write!(f, "CAST({} AS {})", expr, data_type),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema_of;

    fn batch(values: Vec<Option<i64>>) -> RecordBatch {
        RecordBatch::new(
            schema_of(&[("x", ColumnDataType::Long)]),
            vec![RecordArray::Long(values)],
        )
        .unwrap()
    }

    fn x() -> PhysicalExpr {
        PhysicalExpr::column("x", 0)
    }

    fn strings(value: ColumnValue) -> Vec<Option<String>> {
        (0..value.len())
            .map(|i| value.get(i).as_str().map(str::to_string))
            .collect()
    }

    fn like(pattern: &str, case_insensitive: bool) -> PhysicalExpr {
        PhysicalExpr::Like {
            expr: Box::new(PhysicalExpr::column("s", 0)),
            pattern: Box::new(PhysicalExpr::literal(pattern)),
            negated: false,
            case_insensitive,
            escape_char: None,
        }
    }

    #[test]
    fn test_column_and_literal() {
        let batch = batch(vec![Some(1), Some(2)]);
        assert_eq!(
            x().evaluate(&batch).unwrap(),
            ColumnValue::Array(RecordArray::Long(vec![Some(1), Some(2)]))
        );
        let literal = PhysicalExpr::literal(5i64).evaluate(&batch).unwrap();
        assert_eq!(literal, ColumnValue::scalar(ScalarValue::from(5i64), 2));
        assert!(PhysicalExpr::column("y", 3).evaluate(&batch).is_err());
    }

    #[test]
    fn test_comparison_propagates_nulls() {
        let batch = batch(vec![Some(1), None, Some(3)]);
        let expr = PhysicalExpr::binary(x(), BinaryOp::Gt, PhysicalExpr::literal(1i64));
        let result = expr.evaluate(&batch).unwrap();
        assert_eq!(
            result,
            ColumnValue::Array(RecordArray::Boolean(vec![Some(false), None, Some(true)]))
        );
        assert_eq!(result.to_mask(), Some(vec![false, false, true]));
    }

    #[test]
    fn test_three_valued_logic() {
        let t = ScalarValue::Boolean(Some(true));
        let f = ScalarValue::Boolean(Some(false));
        let n = ScalarValue::Boolean(None);
        assert_eq!(binary_scalar(&n, BinaryOp::And, &f).unwrap(), f);
        assert_eq!(binary_scalar(&n, BinaryOp::And, &t).unwrap(), n);
        assert_eq!(binary_scalar(&n, BinaryOp::Or, &t).unwrap(), t);
        assert_eq!(binary_scalar(&n, BinaryOp::Or, &f).unwrap(), n);
    }

    #[test]
    fn test_arithmetic_errors() {
        let batch = batch(vec![Some(i64::MAX)]);
        let overflow = PhysicalExpr::binary(x(), BinaryOp::Plus, PhysicalExpr::literal(1i64));
        assert!(matches!(
            overflow.evaluate(&batch),
            Err(ExecutionError::Arithmetic(_))
        ));
        let divide = PhysicalExpr::binary(x(), BinaryOp::Divide, PhysicalExpr::literal(0i64));
        assert!(matches!(
            divide.evaluate(&batch),
            Err(ExecutionError::Arithmetic(_))
        ));
    }

    #[test]
    fn test_mixed_arithmetic_is_double() {
        let batch = batch(vec![Some(3), None]);
        let expr = PhysicalExpr::binary(x(), BinaryOp::Multiply, PhysicalExpr::literal(0.5));
        assert_eq!(
            expr.evaluate(&batch).unwrap(),
            ColumnValue::Array(RecordArray::Double(vec![Some(1.5), None]))
        );
    }

    #[test]
    fn test_like_patterns() {
        let batch = RecordBatch::new(
            schema_of(&[("s", ColumnDataType::Utf8)]),
            vec![RecordArray::Utf8(vec![
                Some("apple".into()),
                Some("Apricot".into()),
                Some("50%".into()),
                None,
            ])],
        )
        .unwrap();
        let result = like("ap%", false).evaluate(&batch).unwrap();
        assert_eq!(
            result,
            ColumnValue::Array(RecordArray::Boolean(vec![
                Some(true),
                Some(false),
                Some(false),
                None
            ]))
        );
        let result = like("ap%", true).evaluate(&batch).unwrap();
        assert_eq!(result.to_mask(), Some(vec![true, true, false, false]));
        let result = like("_0\\%", false).evaluate(&batch).unwrap();
        assert_eq!(result.to_mask(), Some(vec![false, false, true, false]));
        let result = like("%p%c%", true).evaluate(&batch).unwrap();
        assert_eq!(result.to_mask(), Some(vec![false, true, false, false]));
    }

    #[test]
    fn test_like_rejects_non_strings() {
        let batch = batch(vec![Some(1)]);
        let expr = PhysicalExpr::Like {
            expr: Box::new(x()),
            pattern: Box::new(PhysicalExpr::literal("1%")),
            negated: false,
            case_insensitive: false,
            escape_char: None,
        };
        assert!(matches!(expr.evaluate(&batch), Err(ExecutionError::Type(_))));
        assert!(expr.data_type(batch.schema()).is_err());
    }

    #[test]
    fn test_searched_case() {
        let batch = batch(vec![Some(3), Some(1), Some(-1), None]);
        let expr = PhysicalExpr::Case {
            operand: None,
            when_then: vec![
                (
                    PhysicalExpr::binary(x(), BinaryOp::Gt, PhysicalExpr::literal(2i64)),
                    PhysicalExpr::literal("big"),
                ),
                (
                    PhysicalExpr::binary(x(), BinaryOp::Gt, PhysicalExpr::literal(0i64)),
                    PhysicalExpr::literal("small"),
                ),
            ],
            else_result: Some(Box::new(PhysicalExpr::literal("other"))),
        };
        assert_eq!(
            strings(expr.evaluate(&batch).unwrap()),
            vec![
                Some("big".to_string()),
                Some("small".to_string()),
                Some("other".to_string()),
                Some("other".to_string())
            ]
        );
    }

    #[test]
    fn test_case_completeness() {
        let batch = batch(vec![Some(2), Some(1), Some(0)]);
        // Row 0 matches both branches; only the first may populate it.
        let expr = PhysicalExpr::Case {
            operand: None,
            when_then: vec![
                (
                    PhysicalExpr::binary(x(), BinaryOp::Gt, PhysicalExpr::literal(0i64)),
                    PhysicalExpr::literal(10i64),
                ),
                (
                    PhysicalExpr::binary(x(), BinaryOp::Gt, PhysicalExpr::literal(1i64)),
                    PhysicalExpr::literal(20i64),
                ),
            ],
            else_result: None,
        };
        assert_eq!(
            expr.evaluate(&batch).unwrap(),
            ColumnValue::Array(RecordArray::Long(vec![Some(10), Some(10), None]))
        );
    }

    #[test]
    fn test_case_then_sees_only_matched_rows() {
        let batch = batch(vec![Some(0), Some(5)]);
        let expr = PhysicalExpr::Case {
            operand: None,
            when_then: vec![(
                PhysicalExpr::binary(x(), BinaryOp::NotEq, PhysicalExpr::literal(0i64)),
                PhysicalExpr::binary(PhysicalExpr::literal(10i64), BinaryOp::Divide, x()),
            )],
            else_result: Some(Box::new(PhysicalExpr::literal(0i64))),
        };
        assert_eq!(
            expr.evaluate(&batch).unwrap(),
            ColumnValue::Array(RecordArray::Long(vec![Some(0), Some(2)]))
        );
    }

    #[test]
    fn test_simple_case_routes_null_base_to_else() {
        let batch = batch(vec![Some(1), None, Some(2)]);
        let expr = PhysicalExpr::Case {
            operand: Some(Box::new(x())),
            when_then: vec![(PhysicalExpr::literal(1i64), PhysicalExpr::literal("one"))],
            else_result: Some(Box::new(PhysicalExpr::literal("other"))),
        };
        assert_eq!(
            strings(expr.evaluate(&batch).unwrap()),
            vec![
                Some("one".to_string()),
                Some("other".to_string()),
                Some("other".to_string())
            ]
        );
    }

    #[test]
    fn test_case_widens_branch_types() {
        let batch = batch(vec![Some(1), Some(2)]);
        let expr = PhysicalExpr::Case {
            operand: None,
            when_then: vec![(
                PhysicalExpr::binary(x(), BinaryOp::Eq, PhysicalExpr::literal(1i64)),
                x(),
            )],
            else_result: Some(Box::new(PhysicalExpr::literal(2.5))),
        };
        assert_eq!(
            expr.evaluate(&batch).unwrap(),
            ColumnValue::Array(RecordArray::Double(vec![Some(1.0), Some(2.5)]))
        );
    }

    #[test]
    fn test_in_list_with_null() {
        let batch = batch(vec![Some(1), Some(2), None]);
        let expr = PhysicalExpr::InList {
            expr: Box::new(x()),
            list: vec![PhysicalExpr::literal(1i64), PhysicalExpr::Literal(ScalarValue::Null)],
            negated: false,
        };
        assert_eq!(
            expr.evaluate(&batch).unwrap(),
            ColumnValue::Array(RecordArray::Boolean(vec![Some(true), None, None]))
        );
    }

    #[test]
    fn test_string_compared_as_date() {
        let batch = RecordBatch::new(
            schema_of(&[("d", ColumnDataType::Date32)]),
            vec![RecordArray::Date32(vec![Some(0), Some(1)])],
        )
        .unwrap();
        let expr = PhysicalExpr::binary(
            PhysicalExpr::column("d", 0),
            BinaryOp::Eq,
            PhysicalExpr::literal("1970-01-02"),
        );
        assert_eq!(
            expr.evaluate(&batch).unwrap().to_mask(),
            Some(vec![false, true])
        );
    }

    #[test]
    fn test_cast_and_display() {
        let batch = batch(vec![Some(7)]);
        let expr = PhysicalExpr::Cast {
            expr: Box::new(x()),
            data_type: ColumnDataType::Utf8,
        };
        assert_eq!(strings(expr.evaluate(&batch).unwrap()), vec![Some("7".to_string())]);
        assert_eq!(expr.to_string(), "CAST(x AS Utf8)");
    }
}
