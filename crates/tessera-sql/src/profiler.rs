//! Query profiling.
//!
//! A [`QueryProfiler`] records a tree of [`TimingNode`]s, one per executed
//! plan node. The active node is carried by the [`QueryContext`] passed to
//! each execution call rather than held globally, so concurrent Union
//! branches each time into their own subtree.
//!
//! [`QueryContext`]: crate::context::QueryContext

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use parking_lot::Mutex;

use crate::execution::BatchStream;

/// Timing and row counts for one profiled scope.
#[derive(Debug)]
pub struct TimingNode {
    name: String,
    stats: Mutex<TimingStats>,
    children: Mutex<Vec<Arc<TimingNode>>>,
}

/// Totals recorded on a [`TimingNode`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    /// Time spent producing output, including time spent in children.
    pub elapsed: Duration,
    /// Batches produced.
    pub batches: usize,
    /// Rows produced.
    pub rows: usize,
}

impl TimingNode {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stats: Mutex::new(TimingStats::default()),
            children: Mutex::new(Vec::new()),
        }
    }

    /// Returns the scope name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens a child scope.
    pub fn child(&self, name: impl Into<String>) -> Arc<TimingNode> {
        let child = Arc::new(TimingNode::new(name));
        self.children.lock().push(child.clone());
        child
    }

    /// Returns a snapshot of the child scopes.
    pub fn children(&self) -> Vec<Arc<TimingNode>> {
        self.children.lock().clone()
    }

    /// Returns the recorded totals.
    pub fn stats(&self) -> TimingStats {
        *self.stats.lock()
    }

    /// Adds elapsed time.
    pub fn add_elapsed(&self, elapsed: Duration) {
        self.stats.lock().elapsed += elapsed;
    }

    /// Records one produced batch.
    pub fn add_batch(&self, rows: usize) {
        let mut stats = self.stats.lock();
        stats.batches += 1;
        stats.rows += rows;
    }

    fn format(&self, depth: usize, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = self.stats();
        writeln!(
            f,
            "{}{}: {:.3}ms rows={} batches={}",
            "  ".repeat(depth),
            self.name,
            stats.elapsed.as_secs_f64() * 1000.0,
            stats.rows,
            stats.batches
        )?;
        for child in self.children() {
            child.format(depth + 1, f)?;
        }
        Ok(())
    }
}

/// Collects per-node timings for one query.
#[derive(Debug)]
pub struct QueryProfiler {
    root: Arc<TimingNode>,
}

impl QueryProfiler {
    /// Creates a profiler whose root scope is named `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            root: Arc::new(TimingNode::new(name)),
        }
    }

    /// Returns the root scope.
    pub fn root(&self) -> &Arc<TimingNode> {
        &self.root
    }

    /// Times a synchronous phase (planning, optimization) as a child of
    /// the root.
    pub fn time_phase<T>(&self, name: &str, f: impl FnOnce() -> T) -> T {
        let node = self.root.child(name);
        let start = Instant::now();
        let result = f();
        node.add_elapsed(start.elapsed());
        result
    }
}

impl Default for QueryProfiler {
    fn default() -> Self {
        Self::new("Query")
    }
}

impl fmt::Display for QueryProfiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.root.format(0, f)
    }
}

/// Wraps `input` so that time spent pulling from it and the batches it
/// yields are recorded on `node`.
pub(crate) fn instrument(mut input: BatchStream, node: Option<Arc<TimingNode>>) -> BatchStream {
    let Some(node) = node else {
        return input;
    };
    Box::pin(async_stream::stream! {
        loop {
            let start = Instant::now();
            let next = input.next().await;
            node.add_elapsed(start.elapsed());
            match next {
                Some(Ok(batch)) => {
                    node.add_batch(batch.num_rows());
                    yield Ok(batch);
                }
                Some(Err(e)) => {
                    yield Err(e);
                    break;
                }
                None => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ColumnDataType, RecordBatch, ScalarValue};
    use crate::error::ExecResult;

    fn batch(rows: i64) -> ExecResult<RecordBatch> {
        RecordBatch::from_rows(
            schema_of(&[("n", ColumnDataType::Long)]),
            (0..rows).map(|i| vec![ScalarValue::from(i)]),
        )
    }

    #[tokio::test]
    async fn test_instrument_counts_batches_and_rows() {
        let profiler = QueryProfiler::default();
        let node = profiler.root().child("Scan");
        let input: BatchStream = Box::pin(futures::stream::iter(vec![batch(3), batch(2)]));
        let collected: Vec<_> = instrument(input, Some(node.clone())).collect().await;

        assert_eq!(collected.len(), 2);
        let stats = node.stats();
        assert_eq!(stats.batches, 2);
        assert_eq!(stats.rows, 5);
    }

    #[test]
    fn test_tree_display() {
        let profiler = QueryProfiler::new("Query");
        let projection = profiler.root().child("Projection");
        projection.child("Scan").add_batch(4);
        profiler.time_phase("Optimize", || ());

        let text = profiler.to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("Query: "));
        assert!(lines[1].starts_with("  Projection: "));
        assert!(lines[2].starts_with("    Scan: "));
        assert!(lines[2].ends_with("rows=4 batches=1"));
        assert!(lines[3].starts_with("  Optimize: "));
    }
}
