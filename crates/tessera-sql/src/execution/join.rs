//! Hash join.
//!
//! The left input is the build side: it is fully collected and indexed in a
//! [`JoinMap`]. Each right batch is then probed against the map, producing
//! `(build, probe)` index pairs that are filtered by the residual join
//! predicate and gathered into output batches. Rows that never matched are
//! emitted per batch for the probe side, and in a final pass for the build
//! side.

use std::sync::Arc;

use futures::StreamExt;
use rustc_hash::FxHashMap;

use super::{BatchStream, ExecutionPlan};
use crate::context::QueryContext;
use crate::data::{KeyValue, RecordArray, RecordBatch, SchemaRef};
use crate::error::{ExecResult, ExecutionError};
use crate::logical::JoinType;
use crate::physical::PhysicalExpr;

/// A side of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinSide {
    /// Left input.
    Left,
    /// Right input.
    Right,
}

impl JoinSide {
    /// Returns the other side.
    pub fn negate(self) -> JoinSide {
        match self {
            JoinSide::Left => JoinSide::Right,
            JoinSide::Right => JoinSide::Left,
        }
    }
}

/// An output column taken from one side of a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    /// Column index within its side.
    pub index: usize,
    /// Side the column comes from.
    pub side: JoinSide,
}

/// Returns the output columns of a join: the left columns, the right
/// columns, or both in left-then-right order.
pub fn output_column_indices(
    join_type: JoinType,
    left_len: usize,
    right_len: usize,
) -> Vec<ColumnIndex> {
    let left = (0..left_len).map(|index| ColumnIndex {
        index,
        side: JoinSide::Left,
    });
    let right = (0..right_len).map(|index| ColumnIndex {
        index,
        side: JoinSide::Right,
    });
    if join_type.outputs_left_only() {
        left.collect()
    } else if join_type.outputs_right_only() {
        right.collect()
    } else {
        left.chain(right).collect()
    }
}

/// A residual join predicate, evaluated over candidate pairs.
#[derive(Debug, Clone)]
pub struct JoinFilter {
    /// Predicate over the intermediate schema.
    pub expr: PhysicalExpr,
    /// Intermediate schema the predicate is resolved against.
    pub schema: SchemaRef,
    /// How the intermediate columns map to the join inputs.
    pub column_indices: Vec<ColumnIndex>,
}

/// Maps equi-join keys to the build-side rows holding them. Rows with a
/// null key are not indexed and never match.
#[derive(Debug, Default)]
pub struct JoinMap {
    map: FxHashMap<Vec<KeyValue>, Vec<usize>>,
}

impl JoinMap {
    /// Indexes `num_rows` rows by the values of `keys`. With no key
    /// columns every row shares the empty key.
    pub fn build(keys: &[RecordArray], num_rows: usize) -> Self {
        let mut map: FxHashMap<Vec<KeyValue>, Vec<usize>> = FxHashMap::default();
        for row in 0..num_rows {
            if let Some(key) = row_key(keys, row) {
                map.entry(key).or_default().push(row);
            }
        }
        Self { map }
    }

    /// Returns the rows stored under `key`.
    pub fn get(&self, key: &[KeyValue]) -> Option<&[usize]> {
        self.map.get(key).map(Vec::as_slice)
    }

    /// Returns the number of distinct keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns true if no row was indexed.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Looks up each probe row, returning matching `(build, probe)` index
    /// pairs in probe order.
    pub fn probe(&self, keys: &[RecordArray], num_rows: usize) -> (Vec<usize>, Vec<usize>) {
        let mut build_indices = Vec::new();
        let mut probe_indices = Vec::new();
        for row in 0..num_rows {
            let Some(key) = row_key(keys, row) else {
                continue;
            };
            if let Some(matches) = self.get(&key) {
                build_indices.extend_from_slice(matches);
                probe_indices.extend(std::iter::repeat(row).take(matches.len()));
            }
        }
        (build_indices, probe_indices)
    }
}

fn row_key(keys: &[RecordArray], row: usize) -> Option<Vec<KeyValue>> {
    keys.iter()
        .map(|array| {
            let key = array.get(row).key();
            (!key.is_null()).then_some(key)
        })
        .collect()
}

/// Gathers an output batch from index pairs. A `None` index produces a
/// null for every column of that side.
pub fn build_batch_from_indices(
    schema: &SchemaRef,
    build: &RecordBatch,
    probe: &RecordBatch,
    build_indices: &[Option<usize>],
    probe_indices: &[Option<usize>],
    column_indices: &[ColumnIndex],
    build_side: JoinSide,
) -> ExecResult<RecordBatch> {
    if build_indices.len() != probe_indices.len() {
        return Err(ExecutionError::Internal(format!(
            "join index arrays differ in length: {} and {}",
            build_indices.len(),
            probe_indices.len()
        )));
    }
    let columns = column_indices
        .iter()
        .map(|column| {
            let (batch, indices) = if column.side == build_side {
                (build, build_indices)
            } else {
                (probe, probe_indices)
            };
            batch
                .column(column.index)
                .map(|array| array.take(indices))
                .ok_or_else(|| {
                    ExecutionError::Internal(format!(
                        "join column {} out of range for {:?} side",
                        column.index, column.side
                    ))
                })
        })
        .collect::<ExecResult<Vec<_>>>()?;
    RecordBatch::with_row_count(schema.clone(), columns, build_indices.len())
}

/// Keeps the candidate pairs for which `filter` is true.
pub fn apply_join_filter_to_indices(
    build: &RecordBatch,
    probe: &RecordBatch,
    build_indices: Vec<usize>,
    probe_indices: Vec<usize>,
    filter: &JoinFilter,
    build_side: JoinSide,
) -> ExecResult<(Vec<usize>, Vec<usize>)> {
    if build_indices.is_empty() && probe_indices.is_empty() {
        return Ok((build_indices, probe_indices));
    }
    let intermediate = build_batch_from_indices(
        &filter.schema,
        build,
        probe,
        &build_indices.iter().copied().map(Some).collect::<Vec<_>>(),
        &probe_indices.iter().copied().map(Some).collect::<Vec<_>>(),
        &filter.column_indices,
        build_side,
    )?;
    let mask = filter.expr.evaluate(&intermediate)?.to_mask().ok_or_else(|| {
        ExecutionError::Type(format!("join filter {} is not boolean", filter.expr))
    })?;
    Ok(build_indices
        .into_iter()
        .zip(probe_indices)
        .zip(mask)
        .filter_map(|(pair, keep)| keep.then_some(pair))
        .unzip())
}

/// Returns the rows a join emits from a `matched` mask after probing: the
/// matched rows for semi joins, the unmatched rows otherwise.
pub fn get_final_indices(matched: &[bool], join_type: JoinType) -> Vec<usize> {
    let keep_matched = matches!(join_type, JoinType::LeftSemi | JoinType::RightSemi);
    matched
        .iter()
        .enumerate()
        .filter_map(|(i, m)| (*m == keep_matched).then_some(i))
        .collect()
}

/// Appends unmatched left rows, padding the right indices with nulls.
pub fn append_left_indices(
    mut left_indices: Vec<Option<usize>>,
    mut right_indices: Vec<Option<usize>>,
    unmatched_left: &[usize],
) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    left_indices.extend(unmatched_left.iter().copied().map(Some));
    right_indices.extend(std::iter::repeat(None).take(unmatched_left.len()));
    (left_indices, right_indices)
}

/// Appends unmatched right rows, padding the left indices with nulls.
pub fn append_right_indices(
    mut left_indices: Vec<Option<usize>>,
    mut right_indices: Vec<Option<usize>>,
    unmatched_right: &[usize],
) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
    left_indices.extend(std::iter::repeat(None).take(unmatched_right.len()));
    right_indices.extend(unmatched_right.iter().copied().map(Some));
    (left_indices, right_indices)
}

/// Equi-join with an optional residual filter.
#[derive(Debug, Clone)]
pub struct HashJoinExec {
    /// Build input.
    pub left: Arc<ExecutionPlan>,
    /// Probe input.
    pub right: Arc<ExecutionPlan>,
    /// Join type.
    pub join_type: JoinType,
    /// Equi-join key pairs, resolved against the left and right schemas.
    pub on: Vec<(PhysicalExpr, PhysicalExpr)>,
    /// Residual predicate.
    pub filter: Option<JoinFilter>,
    /// Output schema.
    pub schema: SchemaRef,
}

impl HashJoinExec {
    /// Creates a hash join.
    pub fn new(
        left: Arc<ExecutionPlan>,
        right: Arc<ExecutionPlan>,
        join_type: JoinType,
        on: Vec<(PhysicalExpr, PhysicalExpr)>,
        filter: Option<JoinFilter>,
        schema: SchemaRef,
    ) -> Self {
        Self {
            left,
            right,
            join_type,
            on,
            filter,
            schema,
        }
    }

    pub(super) fn execute(&self, ctx: &QueryContext) -> ExecResult<BatchStream> {
        let mut left_stream = self.left.execute(ctx)?;
        let mut right_stream = self.right.execute(ctx)?;
        let join = self.clone();
        let ctx = ctx.clone();
        Ok(Box::pin(async_stream::try_stream! {
            let mut left_batches = Vec::new();
            while let Some(batch) = left_stream.next().await {
                left_batches.push(batch?);
                ctx.check_cancelled()?;
            }
            let build = RecordBatch::concat_all(join.left.schema(), &left_batches)?;
            drop(left_batches);
            let build_keys = join
                .on
                .iter()
                .map(|(l, _)| Ok(l.evaluate(&build)?.into_array()))
                .collect::<ExecResult<Vec<_>>>()?;
            let map = JoinMap::build(&build_keys, build.num_rows());
            tracing::debug!(
                rows = build.num_rows(),
                keys = map.len(),
                join_type = %join.join_type,
                "built hash join table"
            );

            let column_indices = output_column_indices(
                join.join_type,
                join.left.schema().len(),
                join.right.schema().len(),
            );
            let mut left_matched = vec![false; build.num_rows()];
            let mut right_schema = join.right.schema();

            while let Some(probe) = right_stream.next().await {
                let probe = probe?;
                right_schema = probe.schema().clone();
                if let Some(output) = join.probe_batch(&build, &probe, &map, &column_indices, &mut left_matched)? {
                    yield output;
                }
                ctx.check_cancelled()?;
            }

            if matches!(
                join.join_type,
                JoinType::Left | JoinType::Full | JoinType::LeftSemi | JoinType::LeftAnti
            ) {
                let unmatched = get_final_indices(&left_matched, join.join_type);
                let (build_indices, probe_indices) =
                    append_left_indices(Vec::new(), Vec::new(), &unmatched);
                let probe = RecordBatch::empty(right_schema);
                let output = build_batch_from_indices(
                    &join.schema,
                    &build,
                    &probe,
                    &build_indices,
                    &probe_indices,
                    &column_indices,
                    JoinSide::Left,
                )?;
                for batch in output.repartition(ctx.batch_size) {
                    yield batch;
                }
            }
        }))
    }

    fn probe_batch(
        &self,
        build: &RecordBatch,
        probe: &RecordBatch,
        map: &JoinMap,
        column_indices: &[ColumnIndex],
        left_matched: &mut [bool],
    ) -> ExecResult<Option<RecordBatch>> {
        let probe_keys = self
            .on
            .iter()
            .map(|(_, r)| Ok(r.evaluate(probe)?.into_array()))
            .collect::<ExecResult<Vec<_>>>()?;
        let (build_indices, probe_indices) = map.probe(&probe_keys, probe.num_rows());
        let (build_indices, probe_indices) = match &self.filter {
            Some(filter) => apply_join_filter_to_indices(
                build,
                probe,
                build_indices,
                probe_indices,
                filter,
                JoinSide::Left,
            )?,
            None => (build_indices, probe_indices),
        };
        for &i in &build_indices {
            if let Some(matched) = left_matched.get_mut(i) {
                *matched = true;
            }
        }

        let (build_indices, probe_indices) = match self.join_type {
            JoinType::Inner | JoinType::Left => (
                build_indices.into_iter().map(Some).collect(),
                probe_indices.into_iter().map(Some).collect(),
            ),
            JoinType::Right | JoinType::Full => {
                let mut probe_matched = vec![false; probe.num_rows()];
                for &i in &probe_indices {
                    if let Some(matched) = probe_matched.get_mut(i) {
                        *matched = true;
                    }
                }
                let unmatched = get_final_indices(&probe_matched, self.join_type);
                append_right_indices(
                    build_indices.into_iter().map(Some).collect(),
                    probe_indices.into_iter().map(Some).collect(),
                    &unmatched,
                )
            }
            JoinType::RightSemi | JoinType::RightAnti => {
                let mut probe_matched = vec![false; probe.num_rows()];
                for &i in &probe_indices {
                    if let Some(matched) = probe_matched.get_mut(i) {
                        *matched = true;
                    }
                }
                let rows = get_final_indices(&probe_matched, self.join_type);
                append_right_indices(Vec::new(), Vec::new(), &rows)
            }
            JoinType::LeftSemi | JoinType::LeftAnti => return Ok(None),
        };
        if probe_indices.is_empty() {
            return Ok(None);
        }
        build_batch_from_indices(
            &self.schema,
            build,
            probe,
            &build_indices,
            &probe_indices,
            column_indices,
            JoinSide::Left,
        )
        .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ColumnDataType, ScalarValue, Schema};
    use crate::execution::collect;
    use crate::execution::test_util::{rows, scan};
    use crate::logical::BinaryOp;
    use std::collections::BTreeSet;

    fn left_rows() -> Vec<Vec<ScalarValue>> {
        vec![
            vec![ScalarValue::from(1i64), ScalarValue::from("a")],
            vec![ScalarValue::from(2i64), ScalarValue::from("b")],
            vec![ScalarValue::from(2i64), ScalarValue::from("bb")],
            vec![ScalarValue::Integer(None), ScalarValue::from("null")],
        ]
    }

    fn right_rows() -> Vec<Vec<ScalarValue>> {
        vec![
            vec![ScalarValue::from(2i64), ScalarValue::from(20i64)],
            vec![ScalarValue::from(3i64), ScalarValue::from(30i64)],
            vec![ScalarValue::Integer(None), ScalarValue::from(0i64)],
        ]
    }

    fn join_plan(join_type: JoinType, filter: Option<JoinFilter>) -> ExecutionPlan {
        let left_schema = schema_of(&[("id", ColumnDataType::Long), ("name", ColumnDataType::Utf8)]);
        let right_schema = schema_of(&[("id", ColumnDataType::Long), ("score", ColumnDataType::Long)]);
        let schema = Arc::new(join_type.output_schema(&left_schema, &right_schema));
        ExecutionPlan::HashJoin(HashJoinExec::new(
            scan("l", left_schema, left_rows()),
            scan("r", right_schema, right_rows()),
            join_type,
            vec![(PhysicalExpr::column("id", 0), PhysicalExpr::column("id", 0))],
            filter,
            schema,
        ))
    }

    async fn run(join_type: JoinType) -> Vec<Vec<ScalarValue>> {
        let mut out = rows(&collect(&join_plan(join_type, None), &QueryContext::default()).await.unwrap());
        out.sort_by(|a, b| {
            a.iter()
                .zip(b)
                .map(|(x, y)| x.sort_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        out
    }

    fn long(v: i64) -> ScalarValue {
        ScalarValue::from(v)
    }

    #[test]
    fn test_output_column_indices() {
        let both = output_column_indices(JoinType::Inner, 2, 1);
        assert_eq!(both.len(), 3);
        assert_eq!(both[2], ColumnIndex { index: 0, side: JoinSide::Right });
        assert_eq!(output_column_indices(JoinType::LeftAnti, 2, 1).len(), 2);
        assert!(output_column_indices(JoinType::RightSemi, 2, 1)
            .iter()
            .all(|c| c.side == JoinSide::Right));
    }

    #[test]
    fn test_join_map_skips_null_keys() {
        let keys = vec![RecordArray::Long(vec![Some(1), None, Some(1)])];
        let map = JoinMap::build(&keys, 3);
        assert_eq!(map.get(&[KeyValue::Integer(1)]), Some(&[0usize, 2][..]));
        assert_eq!(map.len(), 1);

        let probe = vec![RecordArray::Long(vec![None, Some(1)])];
        assert_eq!(map.probe(&probe, 2), (vec![0, 2], vec![1, 1]));
    }

    #[test]
    fn test_join_map_without_keys_matches_everything() {
        let map = JoinMap::build(&[], 2);
        let (build, probe) = map.probe(&[], 2);
        assert_eq!(build, vec![0, 1, 0, 1]);
        assert_eq!(probe, vec![0, 0, 1, 1]);
    }

    #[test]
    fn test_join_index_symmetry() {
        let left = vec![RecordArray::Long(vec![Some(1), Some(2), Some(2), Some(4)])];
        let right = vec![RecordArray::Long(vec![Some(2), Some(4), Some(4), Some(5)])];

        let (l, r) = JoinMap::build(&left, 4).probe(&right, 4);
        let forward: BTreeSet<(usize, usize)> = l.into_iter().zip(r).collect();

        let (r, l) = JoinMap::build(&right, 4).probe(&left, 4);
        let swapped: BTreeSet<(usize, usize)> = l.into_iter().zip(r).collect();

        assert_eq!(forward, swapped);
        assert_eq!(forward.len(), 4);
    }

    #[test]
    fn test_final_indices() {
        let matched = [true, false, true, false];
        assert_eq!(get_final_indices(&matched, JoinType::LeftSemi), vec![0, 2]);
        assert_eq!(get_final_indices(&matched, JoinType::LeftAnti), vec![1, 3]);
        assert_eq!(get_final_indices(&matched, JoinType::Full), vec![1, 3]);

        let (l, r) = append_left_indices(vec![Some(0)], vec![Some(5)], &[1, 3]);
        assert_eq!(l, vec![Some(0), Some(1), Some(3)]);
        assert_eq!(r, vec![Some(5), None, None]);
        let (l, r) = append_right_indices(l, r, &[7]);
        assert_eq!(l.len(), r.len());
        assert_eq!(r.last(), Some(&Some(7)));
        assert_eq!(l.last(), Some(&None));
    }

    #[test]
    fn test_build_batch_from_indices_is_side_agnostic() {
        let left = RecordBatch::from_rows(schema_of(&[("a", ColumnDataType::Long)]), vec![vec![long(1)], vec![long(2)]]).unwrap();
        let right = RecordBatch::from_rows(schema_of(&[("b", ColumnDataType::Utf8)]), vec![vec![ScalarValue::from("x")]]).unwrap();
        let schema = schema_of(&[("a", ColumnDataType::Long), ("b", ColumnDataType::Utf8)]);
        let columns = output_column_indices(JoinType::Inner, 1, 1);

        let built = build_batch_from_indices(&schema, &left, &right, &[Some(1), None], &[Some(0), Some(0)], &columns, JoinSide::Left).unwrap();
        let swapped = build_batch_from_indices(&schema, &right, &left, &[Some(0), Some(0)], &[Some(1), None], &columns, JoinSide::Right).unwrap();
        assert_eq!(built, swapped);
        assert_eq!(built.row(1), vec![ScalarValue::Integer(None), ScalarValue::from("x")]);
    }

    #[test]
    fn test_empty_filter_input_is_noop() {
        let batch = RecordBatch::empty(schema_of(&[("a", ColumnDataType::Long)]));
        let filter = JoinFilter {
            expr: PhysicalExpr::column("missing", 9),
            schema: Arc::new(Schema::empty()),
            column_indices: vec![],
        };
        let result = apply_join_filter_to_indices(&batch, &batch, vec![], vec![], &filter, JoinSide::Left).unwrap();
        assert_eq!(result, (vec![], vec![]));
    }

    #[tokio::test]
    async fn test_inner_join() {
        assert_eq!(
            run(JoinType::Inner).await,
            vec![
                vec![long(2), "b".into(), long(2), long(20)],
                vec![long(2), "bb".into(), long(2), long(20)],
            ]
        );
    }

    #[tokio::test]
    async fn test_outer_joins_pad_with_nulls() {
        let null = ScalarValue::Integer(None);
        let left = run(JoinType::Left).await;
        assert_eq!(left.len(), 4);
        assert!(left.contains(&vec![long(1), "a".into(), null.clone(), null.clone()]));

        let right = run(JoinType::Right).await;
        assert_eq!(right.len(), 4);
        assert!(right.contains(&vec![null.clone(), ScalarValue::Utf8(None), long(3), long(30)]));

        assert_eq!(run(JoinType::Full).await.len(), 6);
    }

    #[tokio::test]
    async fn test_semi_and_anti_joins() {
        assert_eq!(
            run(JoinType::LeftSemi).await,
            vec![vec![long(2), "b".into()], vec![long(2), "bb".into()]]
        );
        assert_eq!(run(JoinType::LeftAnti).await.len(), 2);
        assert_eq!(run(JoinType::RightSemi).await, vec![vec![long(2), long(20)]]);
        assert_eq!(run(JoinType::RightAnti).await.len(), 2);
    }

    #[tokio::test]
    async fn test_residual_filter() {
        let left_schema = schema_of(&[("id", ColumnDataType::Long), ("name", ColumnDataType::Utf8)]);
        let right_schema = schema_of(&[("id", ColumnDataType::Long), ("score", ColumnDataType::Long)]);
        let filter = JoinFilter {
            expr: PhysicalExpr::binary(
                PhysicalExpr::column("name", 1),
                BinaryOp::Eq,
                PhysicalExpr::literal("bb"),
            ),
            schema: Arc::new(Schema::join(&left_schema, &right_schema)),
            column_indices: output_column_indices(JoinType::Inner, 2, 2),
        };
        let plan = join_plan(JoinType::Left, Some(filter));
        let mut out = rows(&collect(&plan, &QueryContext::default()).await.unwrap());
        out.sort_by(|a, b| a[1].sort_cmp(&b[1]));
        assert_eq!(out.len(), 4);
        assert_eq!(out[2], vec![long(2), "bb".into(), long(2), long(20)]);
        assert_eq!(out[1][3], ScalarValue::Integer(None));
    }
}
