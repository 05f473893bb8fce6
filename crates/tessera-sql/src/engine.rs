//! Query engine facade.
//!
//! [`QueryEngine`] owns the table registry and runs the whole pipeline for
//! a SQL string: parse, build the logical plan, optimize, plan physically,
//! execute. Plan hooks, output caching and the result row limit are taken
//! from the [`QueryContext`] passed with each query.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use tessera_common::config::EngineConfig;
use tessera_common::error::{TesseraError, TesseraResult};
use tracing::{debug, info};

use crate::context::QueryContext;
use crate::data::{RecordBatch, ScalarValue, SchemaRef};
use crate::datasource::{CacheOptions, DataSource};
use crate::error::{ExecResult, ExecutionError};
use crate::execution::{BatchStream, ExecutionPlan, OutputCacheExec, ScanExec};
use crate::logical::{build_plan, LogicalPlan};
use crate::optimizer::Optimizer;
use crate::parser::Parser;
use crate::physical::PhysicalPlanner;

#[derive(Default, Clone)]
struct Registry {
    schemas: HashMap<String, SchemaRef>,
    sources: HashMap<String, Arc<dyn DataSource>>,
}

/// Runs SQL queries against registered data sources.
pub struct QueryEngine {
    config: EngineConfig,
    optimizer: Optimizer,
    registry: RwLock<Registry>,
}

/// The materialized output of a query.
#[derive(Debug, Clone)]
pub struct QueryResult {
    /// Output schema.
    pub schema: SchemaRef,
    /// Result batches.
    pub batches: Vec<RecordBatch>,
    /// Total number of rows.
    pub total_rows: usize,
    /// Wall time from parse to last batch, in milliseconds.
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Returns all rows.
    pub fn rows(&self) -> Vec<Vec<ScalarValue>> {
        self.batches
            .iter()
            .flat_map(|batch| (0..batch.num_rows()).map(move |i| batch.row(i)))
            .collect()
    }

    /// Returns true if the query produced no rows.
    pub fn is_empty(&self) -> bool {
        self.total_rows == 0
    }
}

/// Logical and physical plans for a query.
#[derive(Debug, Clone)]
pub struct Explanation {
    /// Optimized logical plan.
    pub logical: LogicalPlan,
    /// Physical plan.
    pub physical: ExecutionPlan,
}

impl std::fmt::Display for Explanation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Logical plan:")?;
        write!(f, "{}", self.logical.explain())?;
        writeln!(f, "Physical plan:")?;
        write!(f, "{}", self.physical.display())
    }
}

impl QueryEngine {
    /// Creates an engine after validating `config`.
    pub fn new(config: EngineConfig) -> TesseraResult<Self> {
        config
            .validate()
            .map_err(|message| TesseraError::InvalidConfig { message })?;
        Ok(Self {
            optimizer: Optimizer::new(config.optimizer.clone()),
            config,
            registry: RwLock::new(Registry::default()),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Returns a fresh context carrying the configured query settings.
    pub fn context(&self) -> QueryContext {
        QueryContext::new(&self.config.query)
    }

    /// Registers `source` under `name` with an explicit schema, replacing
    /// any table of the same name.
    pub fn register_table(
        &self,
        name: impl Into<String>,
        schema: SchemaRef,
        source: Arc<dyn DataSource>,
    ) {
        let name = name.into();
        debug!(table = %name, columns = schema.len(), "registering table");
        let mut registry = self.registry.write();
        registry.schemas.insert(name.clone(), schema);
        registry.sources.insert(name, source);
    }

    /// Registers a source that can describe its own schema.
    pub async fn register_source(
        &self,
        name: impl Into<String>,
        source: Arc<dyn DataSource>,
    ) -> TesseraResult<()> {
        let name = name.into();
        let schema = source.query_schema().await?.ok_or_else(|| {
            TesseraError::invalid_argument(format!("source for {name} does not report a schema"))
        })?;
        self.register_table(name, schema, source);
        Ok(())
    }

    /// Removes a table. Returns true if it was registered.
    pub fn deregister_table(&self, name: &str) -> bool {
        let mut registry = self.registry.write();
        registry.sources.remove(name);
        registry.schemas.remove(name).is_some()
    }

    /// Returns the registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.registry.read().schemas.keys().cloned().collect();
        names.sort();
        names
    }

    /// Runs `sql` and collects the result.
    pub async fn sql(&self, sql: &str, ctx: &QueryContext) -> TesseraResult<QueryResult> {
        let start = Instant::now();
        let (schema, stream) = self.prepare(sql, ctx).await?;
        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        let total_rows = batches.iter().map(RecordBatch::num_rows).sum();
        // Batches carry the widened column types.
        let schema = batches.first().map_or(schema, |b| b.schema().clone());
        let execution_time_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(rows = total_rows, batches = batches.len(), ms = execution_time_ms, "query finished");
        if let Some(profiler) = ctx.profiler() {
            debug!(profile = %profiler, "query profile");
        }
        Ok(QueryResult {
            schema,
            batches,
            total_rows,
            execution_time_ms,
        })
    }

    /// Runs `sql`, returning its batches as a stream.
    pub async fn sql_stream(&self, sql: &str, ctx: &QueryContext) -> TesseraResult<BatchStream> {
        Ok(self.prepare(sql, ctx).await?.1)
    }

    /// Plans `sql` without executing it.
    pub fn explain(&self, sql: &str, ctx: &QueryContext) -> TesseraResult<Explanation> {
        let registry = self.registry.read().clone();
        let logical = self.logical_plan(sql, &registry, ctx)?;
        let physical = self.physical_plan(&logical, &registry, ctx)?;
        Ok(Explanation { logical, physical })
    }

    fn logical_plan(
        &self,
        sql: &str,
        registry: &Registry,
        ctx: &QueryContext,
    ) -> TesseraResult<LogicalPlan> {
        let stmt = timed(ctx, "Parse", || Parser::parse_query(sql))?;
        let plan = timed(ctx, "LogicalPlan", || build_plan(&stmt, &registry.schemas))?;
        let plan = timed(ctx, "Optimize", || self.optimizer.optimize(plan))?;
        Ok(match ctx.logical_hook() {
            Some(hook) => hook(plan),
            None => plan,
        })
    }

    fn physical_plan(
        &self,
        plan: &LogicalPlan,
        registry: &Registry,
        ctx: &QueryContext,
    ) -> TesseraResult<ExecutionPlan> {
        let planner = PhysicalPlanner::new(&registry.sources);
        let physical = timed(ctx, "PhysicalPlan", || planner.create_physical_plan(plan))?;
        Ok(match ctx.physical_hook() {
            Some(hook) => hook(physical),
            None => physical,
        })
    }

    async fn prepare(&self, sql: &str, ctx: &QueryContext) -> TesseraResult<(SchemaRef, BatchStream)> {
        debug!(sql, "running query");
        ctx.check_cancelled()?;
        let registry = self.registry.read().clone();
        let logical = self.logical_plan(sql, &registry, ctx)?;
        let mut physical = self.physical_plan(&logical, &registry, ctx)?;
        if let Some(options) = ctx.cache_options().filter(|o| o.is_enabled()) {
            physical = with_cache(physical, options).await?;
        }
        let schema = physical.schema();
        let stream = physical.execute(ctx)?;
        let stream = match ctx.result_limit() {
            Some(limit) => truncate(stream, limit),
            None => stream,
        };
        Ok((schema, stream))
    }
}

impl Default for QueryEngine {
    fn default() -> Self {
        let config = EngineConfig::default();
        Self {
            optimizer: Optimizer::new(config.optimizer.clone()),
            config,
            registry: RwLock::new(Registry::default()),
        }
    }
}

impl std::fmt::Debug for QueryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryEngine")
            .field("config", &self.config)
            .field("tables", &self.table_names())
            .finish()
    }
}

fn timed<T, E>(ctx: &QueryContext, phase: &str, f: impl FnOnce() -> Result<T, E>) -> Result<T, E> {
    match ctx.profiler() {
        Some(profiler) => profiler.time_phase(phase, f),
        None => f(),
    }
}

/// Serves the query from a live cache entry, or wraps the plan so its
/// output populates one. Expired entries are removed first.
async fn with_cache(plan: ExecutionPlan, options: &CacheOptions) -> ExecResult<ExecutionPlan> {
    let key = options.key.as_str();
    if options.provider.exists(key).await? {
        if !options.is_expired(Utc::now()) {
            let reader = options.create_reader();
            let schema = plan.schema();
            if let Some(cached) = reader.query_schema().await? {
                if cached.len() != schema.len() {
                    return Err(ExecutionError::Schema(format!(
                        "cache entry {key} has {} columns, query produces {}",
                        cached.len(),
                        schema.len()
                    )));
                }
            }
            info!(key, "cache hit");
            return Ok(ExecutionPlan::Scan(ScanExec::new(key, reader, schema)));
        }
        info!(key, expires_at = %options.expires_at, "cache entry expired");
        options.provider.remove(key).await?;
    }
    info!(key, "cache miss");
    Ok(ExecutionPlan::OutputCache(OutputCacheExec::new(
        Arc::new(plan),
        options.clone(),
    )))
}

/// Stops the stream after `limit` rows.
fn truncate(mut input: BatchStream, limit: usize) -> BatchStream {
    Box::pin(async_stream::try_stream! {
        let mut remaining = limit;
        while remaining > 0 {
            let batch = match input.next().await {
                Some(batch) => batch?,
                None => break,
            };
            if batch.num_rows() > remaining {
                let head = batch.slice(0, remaining);
                remaining = 0;
                yield head;
            } else {
                remaining -= batch.num_rows();
                yield batch;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{schema_of, ColumnDataType};
    use crate::datasource::MemoryDataSource;
    use tessera_common::ErrorCode;

    fn engine() -> QueryEngine {
        let engine = QueryEngine::default();
        let schema = schema_of(&[("id", ColumnDataType::Long), ("score", ColumnDataType::Double)]);
        let rows = (1..=10i64)
            .map(|i| vec![ScalarValue::from(i), ScalarValue::from(i as f64 / 2.0)])
            .collect();
        engine.register_table(
            "scores",
            schema.clone(),
            Arc::new(MemoryDataSource::new(schema, rows)),
        );
        engine
    }

    #[tokio::test]
    async fn test_sql_collects_result() {
        let result = engine()
            .sql("SELECT id FROM scores WHERE score >= 4", &QueryContext::default())
            .await
            .unwrap();
        assert_eq!(result.total_rows, 3);
        assert_eq!(result.schema.field_names(), vec!["id"]);
        assert_eq!(
            result.rows(),
            vec![vec![8i64.into()], vec![9i64.into()], vec![10i64.into()]]
        );
    }

    #[tokio::test]
    async fn test_result_limit_truncates_mid_batch() {
        let ctx = QueryContext::default().with_batch_size(4).with_max_result_rows(6);
        let result = engine().sql("SELECT id FROM scores", &ctx).await.unwrap();
        let sizes: Vec<usize> = result.batches.iter().map(RecordBatch::num_rows).collect();
        assert_eq!(sizes, vec![4, 2]);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let err = engine()
            .sql("SELECT * FROM missing", &QueryContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ErrorCode::TableNotFound);
    }

    #[tokio::test]
    async fn test_register_source_uses_reported_schema() {
        let engine = QueryEngine::default();
        let schema = schema_of(&[("k", ColumnDataType::Utf8)]);
        let source = MemoryDataSource::new(schema, vec![vec![ScalarValue::from("a")]]);
        engine.register_source("kv", Arc::new(source)).await.unwrap();
        assert_eq!(engine.table_names(), vec!["kv".to_string()]);

        let result = engine.sql("SELECT k FROM kv", &QueryContext::default()).await.unwrap();
        assert_eq!(result.rows(), vec![vec![ScalarValue::from("a")]]);
        assert!(engine.deregister_table("kv"));
        assert!(engine.table_names().is_empty());
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut config = EngineConfig::default();
        config.query.batch_size = 0;
        let err = QueryEngine::new(config).unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidArgument);
    }

    #[test]
    fn test_explain_shows_both_plans() {
        let explanation = engine()
            .explain("SELECT id FROM scores WHERE id > 2", &QueryContext::default())
            .unwrap();
        let text = explanation.to_string();
        assert!(text.contains("Logical plan:"));
        assert!(text.contains("Physical plan:"));
        assert!(explanation.physical.display().contains("Filter: "));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let ctx = QueryContext::default();
        ctx.cancellation_token().cancel();
        let err = engine().sql("SELECT id FROM scores", &ctx).await.unwrap_err();
        assert_eq!(err.code(), ErrorCode::Cancelled);
    }
}
