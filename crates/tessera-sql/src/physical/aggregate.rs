//! Aggregate expressions and accumulators.
//!
//! Aggregation runs in up to two stages. A [`AggregationMode::Partial`]
//! stage folds raw input rows into per-partition state, a
//! [`AggregationMode::Final`] stage merges those state rows and produces
//! the result. Aggregates whose state cannot be merged (MEDIAN, DISTINCT)
//! run in a single [`AggregationMode::Single`] stage.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::data::{ColumnDataType, KeyValue, QualifiedField, RecordArray, RecordBatch, ScalarValue, Schema};
use crate::error::{ExecResult, ExecutionError};
use crate::logical::{AggregateFunc, StatsType};

use super::expr::{compare_values, PhysicalExpr};

/// Aggregation mode for multi-stage aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Fold raw rows into state and emit the state (first stage).
    Partial,
    /// Merge state rows and emit results (second stage).
    Final,
    /// Fold raw rows and emit results.
    Single,
}

impl AggregationMode {
    /// Returns true if input rows are partial state rather than raw values.
    pub fn consumes_state(&self) -> bool {
        matches!(self, AggregationMode::Final)
    }

    /// Returns true if output rows are partial state rather than results.
    pub fn emits_state(&self) -> bool {
        matches!(self, AggregationMode::Partial)
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationMode::Partial => write!(f, "Partial"),
            AggregationMode::Final => write!(f, "Final"),
            AggregationMode::Single => write!(f, "Single"),
        }
    }
}

/// An aggregate function call bound to physical argument expressions.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    /// The aggregate function.
    pub func: AggregateFunc,
    /// Argument expressions over the aggregate's raw input.
    pub args: Vec<PhysicalExpr>,
    /// DISTINCT modifier.
    pub distinct: bool,
    /// Output column name.
    pub name: String,
    /// Argument types at planning time.
    pub input_types: Vec<ColumnDataType>,
    /// Result type.
    pub return_type: ColumnDataType,
}

impl AggregateExpr {
    /// Binds an aggregate to its arguments, checking that the function
    /// accepts their types.
    pub fn try_new(
        func: AggregateFunc,
        args: Vec<PhysicalExpr>,
        distinct: bool,
        name: impl Into<String>,
        input_schema: &Schema,
    ) -> ExecResult<Self> {
        let input_types = args
            .iter()
            .map(|arg| arg.data_type(input_schema))
            .collect::<ExecResult<Vec<_>>>()?;
        let return_type = func.return_type(&input_types).map_err(ExecutionError::Type)?;
        Ok(Self {
            func,
            args,
            distinct,
            name: name.into(),
            input_types,
            return_type,
        })
    }

    /// Returns the result type over `schema`, failing if the function does
    /// not support the argument types (for example SUM over Utf8).
    pub fn data_type(&self, schema: &Schema) -> ExecResult<ColumnDataType> {
        let types = self
            .args
            .iter()
            .map(|arg| arg.data_type(schema))
            .collect::<ExecResult<Vec<_>>>()?;
        self.func.return_type(&types).map_err(ExecutionError::Type)
    }

    /// Returns true if this aggregate can run as a partial/final pair.
    pub fn supports_partial(&self) -> bool {
        !self.distinct && self.func != AggregateFunc::Median
    }

    /// Returns the output field.
    pub fn field(&self) -> QualifiedField {
        QualifiedField::new(self.name.clone(), self.return_type)
    }

    /// Returns the fields of the partial state, in the order
    /// [`Accumulator::state`] produces them.
    pub fn state_fields(&self) -> Vec<QualifiedField> {
        let field = |suffix: &str, data_type| {
            QualifiedField::new(format!("{}[{}]", self.name, suffix), data_type)
        };
        let arg_type = self.input_types.first().copied().unwrap_or(ColumnDataType::Null);
        match self.func {
            AggregateFunc::Count => vec![field("count", ColumnDataType::Long)],
            AggregateFunc::Sum => vec![field("sum", self.return_type)],
            AggregateFunc::Min => vec![field("min", arg_type)],
            AggregateFunc::Max => vec![field("max", arg_type)],
            AggregateFunc::Avg => vec![
                field("sum", ColumnDataType::Double),
                field("count", ColumnDataType::Long),
            ],
            AggregateFunc::Median => vec![],
            AggregateFunc::Variance(_) | AggregateFunc::Stddev(_) => vec![
                field("count", ColumnDataType::Long),
                field("mean", ColumnDataType::Double),
                field("m2", ColumnDataType::Double),
            ],
            AggregateFunc::Covariance(_) => vec![
                field("count", ColumnDataType::Long),
                field("mean_x", ColumnDataType::Double),
                field("mean_y", ColumnDataType::Double),
                field("co_moment", ColumnDataType::Double),
            ],
        }
    }

    /// Creates an empty accumulator.
    pub fn create_accumulator(&self) -> Accumulator {
        Accumulator::new(self)
    }

    /// Evaluates the arguments over a batch of raw input.
    pub fn evaluate_args(&self, batch: &RecordBatch) -> ExecResult<Vec<RecordArray>> {
        self.args
            .iter()
            .map(|arg| Ok(arg.evaluate(batch)?.to_array(batch.num_rows())))
            .collect()
    }
}

impl fmt::Display for AggregateExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Returns, for each aggregate, the index of its first state column in a
/// partial-state row whose aggregate columns begin at `start`.
pub fn state_offsets(aggregates: &[AggregateExpr], start: usize) -> Vec<usize> {
    aggregates
        .iter()
        .scan(start, |next, aggregate| {
            let offset = *next;
            *next += aggregate.state_fields().len();
            Some(offset)
        })
        .collect()
}

/// Running mean and sum of squared deviations, updated with Welford's
/// algorithm and merged with Chan's parallel formula.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Moments {
    count: i64,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn update(&mut self, x: f64) {
        self.count += 1;
        let delta = x - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (x - self.mean);
    }

    fn merge(&mut self, other: Moments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let count = self.count + other.count;
        let (n, c1, c2) = (count as f64, self.count as f64, other.count as f64);
        let delta = self.mean - other.mean;
        self.mean = self.mean * c1 / n + other.mean * c2 / n;
        self.m2 = self.m2 + other.m2 + delta * delta * c1 * c2 / n;
        self.count = count;
    }

    fn variance(&self, stats: StatsType) -> Option<f64> {
        divide_moment(self.m2, self.count, stats)
    }
}

/// Running means and co-moment of two variables.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct CoMoments {
    count: i64,
    mean_x: f64,
    mean_y: f64,
    c: f64,
}

impl CoMoments {
    fn update(&mut self, x: f64, y: f64) {
        self.count += 1;
        let n = self.count as f64;
        let dx = x - self.mean_x;
        self.mean_x += dx / n;
        self.mean_y += (y - self.mean_y) / n;
        self.c += dx * (y - self.mean_y);
    }

    fn merge(&mut self, other: CoMoments) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }
        let count = self.count + other.count;
        let (n, c1, c2) = (count as f64, self.count as f64, other.count as f64);
        let dx = self.mean_x - other.mean_x;
        let dy = self.mean_y - other.mean_y;
        self.mean_x = self.mean_x * c1 / n + other.mean_x * c2 / n;
        self.mean_y = self.mean_y * c1 / n + other.mean_y * c2 / n;
        self.c = self.c + other.c + dx * dy * c1 * c2 / n;
        self.count = count;
    }
}

/// Divides a second moment by `count` or `count - 1`. A zero divisor
/// yields no value.
fn divide_moment(moment: f64, count: i64, stats: StatsType) -> Option<f64> {
    let divisor = match stats {
        StatsType::Population => count,
        StatsType::Sample => (count - 1).max(0),
    };
    (divisor > 0).then(|| moment / divisor as f64)
}

#[derive(Debug, Clone)]
enum AccumulatorState {
    Count(i64),
    SumInteger(Option<i64>),
    SumDouble(Option<f64>),
    Min(Option<ScalarValue>),
    Max(Option<ScalarValue>),
    Avg { sum: f64, count: i64 },
    Median(Vec<f64>),
    Variance { stats: StatsType, sqrt: bool, moments: Moments },
    Covariance { stats: StatsType, moments: CoMoments },
}

/// Running state of one aggregate over one group.
#[derive(Debug, Clone)]
pub struct Accumulator {
    func: AggregateFunc,
    return_type: ColumnDataType,
    state: AccumulatorState,
    /// Argument tuples already seen, for DISTINCT aggregates.
    seen: Option<FxHashSet<Vec<KeyValue>>>,
}

impl Accumulator {
    /// Creates an empty accumulator for `aggregate`.
    pub fn new(aggregate: &AggregateExpr) -> Self {
        let state = match aggregate.func {
            AggregateFunc::Count => AccumulatorState::Count(0),
            AggregateFunc::Sum if aggregate.return_type == ColumnDataType::Double => {
                AccumulatorState::SumDouble(None)
            }
            AggregateFunc::Sum => AccumulatorState::SumInteger(None),
            AggregateFunc::Min => AccumulatorState::Min(None),
            AggregateFunc::Max => AccumulatorState::Max(None),
            AggregateFunc::Avg => AccumulatorState::Avg { sum: 0.0, count: 0 },
            AggregateFunc::Median => AccumulatorState::Median(Vec::new()),
            AggregateFunc::Variance(stats) => AccumulatorState::Variance {
                stats,
                sqrt: false,
                moments: Moments::default(),
            },
            AggregateFunc::Stddev(stats) => AccumulatorState::Variance {
                stats,
                sqrt: true,
                moments: Moments::default(),
            },
            AggregateFunc::Covariance(stats) => AccumulatorState::Covariance {
                stats,
                moments: CoMoments::default(),
            },
        };
        Self {
            func: aggregate.func,
            return_type: aggregate.return_type,
            state,
            seen: aggregate.distinct.then(FxHashSet::default),
        }
    }

    /// Folds raw argument values (one array per argument) into the state.
    pub fn update_batch(&mut self, values: &[RecordArray]) -> ExecResult<()> {
        if let Some(seen) = &mut self.seen {
            let len = values.first().map_or(0, RecordArray::len);
            let fresh: Vec<Option<usize>> = (0..len)
                .filter(|&i| {
                    let key: Vec<KeyValue> = values.iter().map(|v| v.get(i).key()).collect();
                    !key.iter().any(KeyValue::is_null) && seen.insert(key)
                })
                .map(Some)
                .collect();
            let values: Vec<RecordArray> = values.iter().map(|v| v.take(&fresh)).collect();
            return self.fold(&values);
        }
        self.fold(values)
    }

    fn fold(&mut self, values: &[RecordArray]) -> ExecResult<()> {
        let first = argument(values, 0)?;
        match &mut self.state {
            AccumulatorState::Count(count) => {
                let len = first.len();
                let counted = (0..len)
                    .filter(|&i| values.iter().all(|v| !v.is_null(i)))
                    .count();
                *count += counted as i64;
            }
            AccumulatorState::SumInteger(sum) => {
                for v in integers(first)?.into_iter().flatten() {
                    *sum = Some(checked_sum(*sum, v)?);
                }
            }
            AccumulatorState::SumDouble(sum) => {
                for v in floats(first)?.into_iter().flatten() {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            AccumulatorState::Min(current) => keep_extreme(current, first, std::cmp::Ordering::Less),
            AccumulatorState::Max(current) => {
                keep_extreme(current, first, std::cmp::Ordering::Greater)
            }
            AccumulatorState::Avg { sum, count } => {
                for v in floats(first)?.into_iter().flatten() {
                    *sum += v;
                    *count += 1;
                }
            }
            AccumulatorState::Median(values) => values.extend(floats(first)?.into_iter().flatten()),
            AccumulatorState::Variance { moments, .. } => {
                for v in floats(first)?.into_iter().flatten() {
                    moments.update(v);
                }
            }
            AccumulatorState::Covariance { moments, .. } => {
                let ys = floats(argument(values, 1)?)?;
                for (x, y) in floats(first)?.into_iter().zip(ys) {
                    if let (Some(x), Some(y)) = (x, y) {
                        moments.update(x, y);
                    }
                }
            }
        }
        Ok(())
    }

    /// Merges partial state columns (one array per state field, one row per
    /// upstream partial accumulator) into this state.
    pub fn merge_batch(&mut self, states: &[RecordArray]) -> ExecResult<()> {
        if self.seen.is_some() {
            return Err(self.cannot_merge());
        }
        let first = argument(states, 0)?;
        match &mut self.state {
            AccumulatorState::Count(count) => {
                for v in integers(first)?.into_iter().flatten() {
                    *count += v;
                }
            }
            AccumulatorState::SumInteger(sum) => {
                for v in integers(first)?.into_iter().flatten() {
                    *sum = Some(checked_sum(*sum, v)?);
                }
            }
            AccumulatorState::SumDouble(sum) => {
                for v in floats(first)?.into_iter().flatten() {
                    *sum = Some(sum.unwrap_or(0.0) + v);
                }
            }
            AccumulatorState::Min(current) => keep_extreme(current, first, std::cmp::Ordering::Less),
            AccumulatorState::Max(current) => {
                keep_extreme(current, first, std::cmp::Ordering::Greater)
            }
            AccumulatorState::Avg { sum, count } => {
                let counts = integers(argument(states, 1)?)?;
                for (s, c) in floats(first)?.into_iter().zip(counts) {
                    *sum += s.unwrap_or(0.0);
                    *count += c.unwrap_or(0);
                }
            }
            AccumulatorState::Median(_) => return Err(self.cannot_merge()),
            AccumulatorState::Variance { moments, .. } => {
                let means = floats(argument(states, 1)?)?;
                let m2s = floats(argument(states, 2)?)?;
                for ((count, mean), m2) in integers(first)?.into_iter().zip(means).zip(m2s) {
                    moments.merge(Moments {
                        count: count.unwrap_or(0),
                        mean: mean.unwrap_or(0.0),
                        m2: m2.unwrap_or(0.0),
                    });
                }
            }
            AccumulatorState::Covariance { moments, .. } => {
                let mean_x = floats(argument(states, 1)?)?;
                let mean_y = floats(argument(states, 2)?)?;
                let cs = floats(argument(states, 3)?)?;
                let rows = integers(first)?.into_iter().zip(mean_x).zip(mean_y).zip(cs);
                for (((count, mean_x), mean_y), c) in rows {
                    moments.merge(CoMoments {
                        count: count.unwrap_or(0),
                        mean_x: mean_x.unwrap_or(0.0),
                        mean_y: mean_y.unwrap_or(0.0),
                        c: c.unwrap_or(0.0),
                    });
                }
            }
        }
        Ok(())
    }

    /// Returns the partial state, matching [`AggregateExpr::state_fields`].
    pub fn state(&self) -> ExecResult<Vec<ScalarValue>> {
        if self.seen.is_some() {
            return Err(self.cannot_merge());
        }
        Ok(match &self.state {
            AccumulatorState::Count(count) => vec![ScalarValue::Integer(Some(*count))],
            AccumulatorState::SumInteger(sum) => vec![ScalarValue::Integer(*sum)],
            AccumulatorState::SumDouble(sum) => vec![ScalarValue::Double(*sum)],
            AccumulatorState::Min(value) | AccumulatorState::Max(value) => {
                vec![value.clone().unwrap_or(ScalarValue::Null)]
            }
            AccumulatorState::Avg { sum, count } => vec![
                ScalarValue::Double(Some(*sum)),
                ScalarValue::Integer(Some(*count)),
            ],
            AccumulatorState::Median(_) => return Err(self.cannot_merge()),
            AccumulatorState::Variance { moments, .. } => vec![
                ScalarValue::Integer(Some(moments.count)),
                ScalarValue::Double(Some(moments.mean)),
                ScalarValue::Double(Some(moments.m2)),
            ],
            AccumulatorState::Covariance { moments, .. } => vec![
                ScalarValue::Integer(Some(moments.count)),
                ScalarValue::Double(Some(moments.mean_x)),
                ScalarValue::Double(Some(moments.mean_y)),
                ScalarValue::Double(Some(moments.c)),
            ],
        })
    }

    /// Produces the final value.
    pub fn evaluate(&self) -> ExecResult<ScalarValue> {
        Ok(match &self.state {
            AccumulatorState::Count(count) => ScalarValue::Integer(Some(*count)),
            AccumulatorState::SumInteger(sum) => ScalarValue::Integer(*sum),
            AccumulatorState::SumDouble(sum) => ScalarValue::Double(*sum),
            AccumulatorState::Min(value) | AccumulatorState::Max(value) => value
                .clone()
                .unwrap_or_else(|| ScalarValue::null_of(self.return_type)),
            AccumulatorState::Avg { sum, count } => {
                ScalarValue::Double((*count > 0).then(|| sum / *count as f64))
            }
            AccumulatorState::Median(values) => ScalarValue::Double(median(values)),
            AccumulatorState::Variance {
                stats,
                sqrt,
                moments,
            } => {
                let variance = moments.variance(*stats);
                ScalarValue::Double(if *sqrt { variance.map(f64::sqrt) } else { variance })
            }
            AccumulatorState::Covariance { stats, moments } => {
                ScalarValue::Double(divide_moment(moments.c, moments.count, *stats))
            }
        })
    }

    fn cannot_merge(&self) -> ExecutionError {
        let what = if self.seen.is_some() {
            format!("{}(DISTINCT ...)", self.func)
        } else {
            self.func.to_string()
        };
        ExecutionError::Plan(format!("{} does not support partial aggregation", what))
    }
}

fn argument(values: &[RecordArray], index: usize) -> ExecResult<&RecordArray> {
    values.get(index).ok_or_else(|| {
        ExecutionError::Internal(format!(
            "aggregate expected argument {} but received {}",
            index,
            values.len()
        ))
    })
}

fn integers(array: &RecordArray) -> ExecResult<Vec<Option<i64>>> {
    array.to_i64_values().ok_or_else(|| {
        ExecutionError::Type(format!("expected integer values, got {}", array.data_type()))
    })
}

fn floats(array: &RecordArray) -> ExecResult<Vec<Option<f64>>> {
    array.to_f64_values().ok_or_else(|| {
        ExecutionError::Type(format!("expected numeric values, got {}", array.data_type()))
    })
}

fn checked_sum(sum: Option<i64>, value: i64) -> ExecResult<i64> {
    sum.unwrap_or(0)
        .checked_add(value)
        .ok_or_else(|| ExecutionError::Arithmetic("integer overflow in SUM".into()))
}

/// Replaces `current` with any value of `array` that orders `wanted`
/// relative to it.
fn keep_extreme(current: &mut Option<ScalarValue>, array: &RecordArray, wanted: std::cmp::Ordering) {
    for value in array.iter() {
        if value.is_null() {
            continue;
        }
        let replace = match current {
            Some(existing) => compare_values(&value, existing) == Some(wanted),
            None => true,
        };
        if replace {
            *current = Some(value);
        }
    }
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted.get(mid).copied()
    } else {
        Some((sorted.get(mid - 1)? + sorted.get(mid)?) / 2.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema_of;

    fn aggregate(func: AggregateFunc, data_type: ColumnDataType) -> AggregateExpr {
        let schema = schema_of(&[("x", data_type), ("y", data_type)]);
        let args = (0..func.arity())
            .map(|i| PhysicalExpr::column(if i == 0 { "x" } else { "y" }, i))
            .collect();
        AggregateExpr::try_new(func, args, false, format!("{}(x)", func), &schema).unwrap()
    }

    fn doubles(values: &[f64]) -> RecordArray {
        RecordArray::Double(values.iter().copied().map(Some).collect())
    }

    fn state_columns(state: Vec<ScalarValue>, aggregate: &AggregateExpr) -> Vec<RecordArray> {
        state
            .iter()
            .zip(aggregate.state_fields())
            .map(|(value, field)| {
                RecordArray::from_scalars(field.data_type, std::iter::once(value)).unwrap()
            })
            .collect()
    }

    fn as_f64(value: ScalarValue) -> f64 {
        value.as_f64().unwrap()
    }

    #[test]
    fn test_variance_merge_equivalence() {
        let expr = aggregate(AggregateFunc::Variance(StatsType::Sample), ColumnDataType::Double);

        let mut single = expr.create_accumulator();
        single
            .update_batch(&[doubles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0])])
            .unwrap();

        let mut low = expr.create_accumulator();
        low.update_batch(&[doubles(&[1.0, 2.0, 3.0])]).unwrap();
        let mut high = expr.create_accumulator();
        high.update_batch(&[doubles(&[4.0, 5.0, 6.0])]).unwrap();

        let mut merged = expr.create_accumulator();
        merged
            .merge_batch(&state_columns(low.state().unwrap(), &expr))
            .unwrap();
        merged
            .merge_batch(&state_columns(high.state().unwrap(), &expr))
            .unwrap();

        let direct = as_f64(single.evaluate().unwrap());
        let combined = as_f64(merged.evaluate().unwrap());
        assert!((direct - 3.5).abs() < 1e-12);
        assert!((combined - 3.5).abs() < 1e-12);
    }

    #[test]
    fn test_population_variance_and_stddev() {
        let values = doubles(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        let mut variance = aggregate(
            AggregateFunc::Variance(StatsType::Population),
            ColumnDataType::Double,
        )
        .create_accumulator();
        variance.update_batch(&[values.clone()]).unwrap();
        assert!((as_f64(variance.evaluate().unwrap()) - 4.0).abs() < 1e-12);

        let mut stddev =
            aggregate(AggregateFunc::Stddev(StatsType::Population), ColumnDataType::Double)
                .create_accumulator();
        stddev.update_batch(&[values]).unwrap();
        assert!((as_f64(stddev.evaluate().unwrap()) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_sample_variance_of_one_value_is_null() {
        let mut acc = aggregate(AggregateFunc::Variance(StatsType::Sample), ColumnDataType::Long)
            .create_accumulator();
        acc.update_batch(&[RecordArray::Long(vec![Some(4)])]).unwrap();
        assert!(acc.evaluate().unwrap().is_null());
    }

    #[test]
    fn test_covariance_merge() {
        let expr = aggregate(AggregateFunc::Covariance(StatsType::Sample), ColumnDataType::Double);
        let xs = [1.0, 2.0, 3.0, 4.0];
        let ys = [2.0, 4.0, 6.0, 8.0];

        let mut single = expr.create_accumulator();
        single.update_batch(&[doubles(&xs), doubles(&ys)]).unwrap();

        let mut left = expr.create_accumulator();
        left.update_batch(&[doubles(&xs[..2]), doubles(&ys[..2])]).unwrap();
        let mut right = expr.create_accumulator();
        right.update_batch(&[doubles(&xs[2..]), doubles(&ys[2..])]).unwrap();
        let mut merged = expr.create_accumulator();
        merged.merge_batch(&state_columns(left.state().unwrap(), &expr)).unwrap();
        merged.merge_batch(&state_columns(right.state().unwrap(), &expr)).unwrap();

        let expected = 10.0 / 3.0;
        assert!((as_f64(single.evaluate().unwrap()) - expected).abs() < 1e-12);
        assert!((as_f64(merged.evaluate().unwrap()) - expected).abs() < 1e-12);
    }

    #[test]
    fn test_basic_aggregates_skip_nulls() {
        let values = RecordArray::Long(vec![Some(4), None, Some(1), Some(7)]);
        let run = |func| {
            let mut acc = aggregate(func, ColumnDataType::Long).create_accumulator();
            acc.update_batch(&[values.clone()]).unwrap();
            acc.evaluate().unwrap()
        };
        assert_eq!(run(AggregateFunc::Count), ScalarValue::from(3i64));
        assert_eq!(run(AggregateFunc::Sum), ScalarValue::from(12i64));
        assert_eq!(run(AggregateFunc::Min), ScalarValue::from(1i64));
        assert_eq!(run(AggregateFunc::Max), ScalarValue::from(7i64));
        assert_eq!(run(AggregateFunc::Avg), ScalarValue::from(4.0));
        assert_eq!(run(AggregateFunc::Median), ScalarValue::from(4.0));
    }

    #[test]
    fn test_empty_input_results() {
        let evaluate = |func| {
            aggregate(func, ColumnDataType::Long)
                .create_accumulator()
                .evaluate()
                .unwrap()
        };
        assert_eq!(evaluate(AggregateFunc::Count), ScalarValue::from(0i64));
        assert!(evaluate(AggregateFunc::Sum).is_null());
        assert!(evaluate(AggregateFunc::Max).is_null());
        assert!(evaluate(AggregateFunc::Avg).is_null());
    }

    #[test]
    fn test_avg_partial_then_final() {
        let expr = aggregate(AggregateFunc::Avg, ColumnDataType::Long);
        let mut a = expr.create_accumulator();
        a.update_batch(&[RecordArray::Long(vec![Some(1), Some(2)])]).unwrap();
        let mut b = expr.create_accumulator();
        b.update_batch(&[RecordArray::Long(vec![Some(6)])]).unwrap();

        let mut rows = state_columns(a.state().unwrap(), &expr);
        for (column, more) in rows.iter_mut().zip(state_columns(b.state().unwrap(), &expr)) {
            column.extend_from(&more).unwrap();
        }
        let mut merged = expr.create_accumulator();
        merged.merge_batch(&rows).unwrap();
        assert_eq!(merged.evaluate().unwrap(), ScalarValue::from(3.0));
    }

    #[test]
    fn test_median_even_count_and_no_merge() {
        let expr = aggregate(AggregateFunc::Median, ColumnDataType::Double);
        assert!(!expr.supports_partial());
        let mut acc = expr.create_accumulator();
        acc.update_batch(&[doubles(&[4.0, 1.0, 3.0, 2.0])]).unwrap();
        assert_eq!(acc.evaluate().unwrap(), ScalarValue::from(2.5));
        assert!(matches!(acc.state(), Err(ExecutionError::Plan(_))));
        assert!(acc.merge_batch(&[doubles(&[1.0])]).is_err());
    }

    #[test]
    fn test_count_distinct() {
        let schema = schema_of(&[("x", ColumnDataType::Utf8)]);
        let expr = AggregateExpr::try_new(
            AggregateFunc::Count,
            vec![PhysicalExpr::column("x", 0)],
            true,
            "COUNT(DISTINCT x)",
            &schema,
        )
        .unwrap();
        assert!(!expr.supports_partial());
        let mut acc = expr.create_accumulator();
        let batch = |values: &[Option<&str>]| {
            RecordArray::Utf8(values.iter().map(|v| v.map(str::to_string)).collect())
        };
        acc.update_batch(&[batch(&[Some("a"), Some("b"), None])]).unwrap();
        acc.update_batch(&[batch(&[Some("a"), Some("c")])]).unwrap();
        assert_eq!(acc.evaluate().unwrap(), ScalarValue::from(3i64));
    }

    #[test]
    fn test_sum_rejects_strings() {
        let schema = schema_of(&[("s", ColumnDataType::Utf8)]);
        let result = AggregateExpr::try_new(
            AggregateFunc::Sum,
            vec![PhysicalExpr::column("s", 0)],
            false,
            "SUM(s)",
            &schema,
        );
        assert!(matches!(result, Err(ExecutionError::Type(_))));
    }

    #[test]
    fn test_sum_overflow() {
        let mut acc = aggregate(AggregateFunc::Sum, ColumnDataType::Long).create_accumulator();
        let result = acc.update_batch(&[RecordArray::Long(vec![Some(i64::MAX), Some(1)])]);
        assert!(matches!(result, Err(ExecutionError::Arithmetic(_))));
    }

    #[test]
    fn test_state_offsets() {
        let aggregates = vec![
            aggregate(AggregateFunc::Count, ColumnDataType::Long),
            aggregate(AggregateFunc::Avg, ColumnDataType::Long),
            aggregate(AggregateFunc::Variance(StatsType::Sample), ColumnDataType::Long),
            aggregate(AggregateFunc::Max, ColumnDataType::Long),
        ];
        assert_eq!(state_offsets(&aggregates, 0), vec![0, 1, 3, 6]);
        assert_eq!(state_offsets(&aggregates, 2), vec![2, 3, 5, 8]);
    }

    #[test]
    fn test_mode_flags() {
        assert!(AggregationMode::Partial.emits_state());
        assert!(!AggregationMode::Partial.consumes_state());
        assert!(AggregationMode::Final.consumes_state());
        assert!(!AggregationMode::Single.emits_state());
    }
}
