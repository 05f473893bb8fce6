//! Per-query execution context.

use std::fmt;
use std::sync::Arc;

use tessera_common::config::QueryConfig;
use tessera_common::constants::{DEFAULT_BATCH_SIZE, UNBOUNDED_RESULT_ROWS};
use tokio_util::sync::CancellationToken;

use crate::datasource::CacheOptions;
use crate::error::{ExecResult, ExecutionError};
use crate::execution::ExecutionPlan;
use crate::logical::LogicalPlan;
use crate::profiler::{QueryProfiler, TimingNode};

/// Rewrites the optimized logical plan before physical planning.
pub type LogicalPlanHook = Arc<dyn Fn(LogicalPlan) -> LogicalPlan + Send + Sync>;

/// Rewrites the physical plan before execution.
pub type PhysicalPlanHook = Arc<dyn Fn(ExecutionPlan) -> ExecutionPlan + Send + Sync>;

/// Settings and shared handles passed into every execution call.
///
/// Cloning is cheap. A clone shares the profiler and cancellation token;
/// [`QueryContext::scoped`] additionally opens a child timing scope so each
/// plan node, and each concurrent Union branch, times into its own node.
#[derive(Clone)]
pub struct QueryContext {
    /// Maximum rows per batch.
    pub batch_size: usize,
    /// Maximum rows returned to the caller. Zero means unbounded.
    pub max_result_rows: usize,
    logical_hook: Option<LogicalPlanHook>,
    physical_hook: Option<PhysicalPlanHook>,
    profiler: Option<Arc<QueryProfiler>>,
    timing: Option<Arc<TimingNode>>,
    cancellation: CancellationToken,
    cache_options: Option<CacheOptions>,
}

impl QueryContext {
    /// Creates a context from query settings. A profiler is attached when
    /// `config.profile` is set.
    pub fn new(config: &QueryConfig) -> Self {
        let ctx = Self {
            batch_size: config.batch_size.max(1),
            max_result_rows: config.max_result_rows,
            ..Self::default()
        };
        if config.profile {
            ctx.with_profiler(Arc::new(QueryProfiler::default()))
        } else {
            ctx
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Sets the result row limit. Zero means unbounded.
    pub fn with_max_result_rows(mut self, max_result_rows: usize) -> Self {
        self.max_result_rows = max_result_rows;
        self
    }

    /// Sets the logical plan hook.
    pub fn with_logical_hook(mut self, hook: LogicalPlanHook) -> Self {
        self.logical_hook = Some(hook);
        self
    }

    /// Sets the physical plan hook.
    pub fn with_physical_hook(mut self, hook: PhysicalPlanHook) -> Self {
        self.physical_hook = Some(hook);
        self
    }

    /// Attaches a profiler. Execution scopes open under its root.
    pub fn with_profiler(mut self, profiler: Arc<QueryProfiler>) -> Self {
        self.timing = Some(profiler.root().clone());
        self.profiler = Some(profiler);
        self
    }

    /// Uses `token` for cancellation.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Caches the query output with `options`.
    pub fn with_cache_options(mut self, options: CacheOptions) -> Self {
        self.cache_options = Some(options);
        self
    }

    /// Returns the result row limit, if one is set.
    pub fn result_limit(&self) -> Option<usize> {
        (self.max_result_rows != UNBOUNDED_RESULT_ROWS).then_some(self.max_result_rows)
    }

    /// Returns the logical plan hook.
    pub fn logical_hook(&self) -> Option<&LogicalPlanHook> {
        self.logical_hook.as_ref()
    }

    /// Returns the physical plan hook.
    pub fn physical_hook(&self) -> Option<&PhysicalPlanHook> {
        self.physical_hook.as_ref()
    }

    /// Returns the profiler.
    pub fn profiler(&self) -> Option<&Arc<QueryProfiler>> {
        self.profiler.as_ref()
    }

    /// Returns the active timing scope.
    pub fn timing(&self) -> Option<&Arc<TimingNode>> {
        self.timing.as_ref()
    }

    /// Returns the cache options.
    pub fn cache_options(&self) -> Option<&CacheOptions> {
        self.cache_options.as_ref()
    }

    /// Returns the cancellation token.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Returns an error if the query has been cancelled.
    pub fn check_cancelled(&self) -> ExecResult<()> {
        if self.cancellation.is_cancelled() {
            Err(ExecutionError::Cancelled)
        } else {
            Ok(())
        }
    }

    /// Returns a clone whose timing scope is a new child of the current one.
    pub fn scoped(&self, name: impl Into<String>) -> QueryContext {
        let mut ctx = self.clone();
        ctx.timing = self.timing.as_ref().map(|node| node.child(name));
        ctx
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            max_result_rows: UNBOUNDED_RESULT_ROWS,
            logical_hook: None,
            physical_hook: None,
            profiler: None,
            timing: None,
            cancellation: CancellationToken::new(),
            cache_options: None,
        }
    }
}

impl fmt::Debug for QueryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryContext")
            .field("batch_size", &self.batch_size)
            .field("max_result_rows", &self.max_result_rows)
            .field("logical_hook", &self.logical_hook.is_some())
            .field("physical_hook", &self.physical_hook.is_some())
            .field("profiled", &self.profiler.is_some())
            .field("cancelled", &self.cancellation.is_cancelled())
            .field("cache_options", &self.cache_options)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let ctx = QueryContext::default();
        assert_eq!(ctx.batch_size, 2048);
        assert_eq!(ctx.result_limit(), None);
        assert!(ctx.profiler().is_none());
        assert!(ctx.check_cancelled().is_ok());
    }

    #[test]
    fn test_from_config() {
        let ctx = QueryContext::new(&QueryConfig::for_testing());
        assert_eq!(ctx.batch_size, 4);
        assert!(ctx.profiler().is_some());

        let ctx = ctx.with_max_result_rows(10).with_batch_size(0);
        assert_eq!(ctx.result_limit(), Some(10));
        assert_eq!(ctx.batch_size, 1);
    }

    #[test]
    fn test_cancellation_is_shared_by_clones() {
        let ctx = QueryContext::default();
        let branch = ctx.scoped("Union");
        ctx.cancellation_token().cancel();
        assert!(matches!(branch.check_cancelled(), Err(ExecutionError::Cancelled)));
    }

    #[test]
    fn test_scopes_are_isolated_per_branch() {
        let ctx = QueryContext::default().with_profiler(Arc::new(QueryProfiler::default()));
        let union = ctx.scoped("Union");
        let left = union.scoped("Scan");
        let right = union.scoped("Scan");
        left.timing().unwrap().add_batch(3);
        right.timing().unwrap().add_batch(5);

        let profiler = ctx.profiler().unwrap();
        let union_node = &profiler.root().children()[0];
        let rows: Vec<usize> = union_node.children().iter().map(|c| c.stats().rows).collect();
        assert_eq!(rows, vec![3, 5]);
    }
}
