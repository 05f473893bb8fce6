//! External collaborators: row sources, batch writers and result caches.
//!
//! The engine is format-agnostic. A [`DataSource`] hands it already-decoded
//! rows, a [`DataWriter`] receives finished [`RecordBatch`]es, and a
//! [`CacheProvider`] stores cached query output addressed by key.

mod file;
mod memory;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use futures::stream::BoxStream;
use tokio_util::sync::CancellationToken;

use crate::context::QueryContext;
use crate::data::{RecordBatch, ScalarValue, SchemaRef};
use crate::error::ExecResult;

pub use file::{FileCacheEntry, FileCacheProvider};
pub use memory::{CacheFile, CacheReader, CacheWriter, MemoryCacheProvider, MemoryDataSource};

/// A stream of decoded rows, one value per source column.
pub type RowStream = BoxStream<'static, ExecResult<Vec<ScalarValue>>>;

/// A source of rows.
#[async_trait]
pub trait DataSource: Send + Sync + fmt::Debug {
    /// Starts reading rows. Implementations should stop producing rows once
    /// `cancel` fires.
    async fn read_source(
        &self,
        ctx: &QueryContext,
        cancel: CancellationToken,
    ) -> ExecResult<RowStream>;

    /// Returns the schema of the rows, for sources that can describe
    /// themselves.
    async fn query_schema(&self) -> ExecResult<Option<SchemaRef>> {
        Ok(None)
    }
}

/// A sink for result batches.
///
/// Callers must finish every writer with either [`DataWriter::close`] or
/// [`DataWriter::discard`], on every exit path.
#[async_trait]
pub trait DataWriter: Send {
    /// Writes one batch.
    async fn write(&mut self, batch: &RecordBatch, cancel: &CancellationToken) -> ExecResult<()>;

    /// Flushes and releases the underlying sink.
    async fn close(&mut self) -> ExecResult<()>;

    /// Releases the underlying sink without publishing what was written.
    async fn discard(&mut self) -> ExecResult<()> {
        self.close().await
    }
}

/// The byte storage behind one cache entry.
///
/// An entry is written at most once: [`CacheHandle::publish`] replaces the
/// contents and marks the entry complete in a single step, and refuses once
/// the entry is complete.
#[async_trait]
pub trait CacheHandle: Send + Sync + fmt::Debug {
    /// Returns the published contents. Empty until the entry is complete.
    async fn contents(&self) -> ExecResult<Vec<u8>>;

    /// Returns true once contents have been published.
    async fn is_complete(&self) -> ExecResult<bool>;

    /// Publishes `bytes` as the entry's contents. Returns false, leaving the
    /// entry untouched, if it was already complete.
    async fn publish(&self, bytes: Vec<u8>) -> ExecResult<bool>;
}

/// Storage for cached query output.
#[async_trait]
pub trait CacheProvider: Send + Sync + fmt::Debug {
    /// Returns true if a complete entry exists for `key`.
    async fn exists(&self, key: &str) -> ExecResult<bool>;

    /// Opens the storage behind `path`, creating an empty entry if absent.
    async fn get_file_stream(&self, path: &str) -> ExecResult<Arc<dyn CacheHandle>>;

    /// Drops the entry for `key`, if any.
    async fn remove(&self, key: &str) -> ExecResult<()>;
}

/// Builds the reader for a cache entry.
pub type ReaderFactory = Arc<dyn Fn(&CacheOptions) -> Arc<dyn DataSource> + Send + Sync>;

/// Builds the writer for a cache entry.
pub type WriterFactory = Arc<dyn Fn(&CacheOptions) -> Box<dyn DataWriter> + Send + Sync>;

/// How a query's output is cached.
#[derive(Clone)]
pub struct CacheOptions {
    /// Cache in memory.
    pub use_memory_cache: bool,
    /// Cache in durable storage.
    pub use_durable_cache: bool,
    /// Entry key.
    pub key: String,
    /// Time to live.
    pub duration: TimeDelta,
    /// When the options were created.
    pub created_at: DateTime<Utc>,
    /// When the entry stops being served.
    pub expires_at: DateTime<Utc>,
    /// Where entries live.
    pub provider: Arc<dyn CacheProvider>,
    reader_factory: ReaderFactory,
    writer_factory: WriterFactory,
}

impl CacheOptions {
    /// Creates in-memory cache options for `key`, expiring `duration` from
    /// now, with readers and writers that use `provider` directly.
    pub fn new(key: impl Into<String>, duration: TimeDelta, provider: Arc<dyn CacheProvider>) -> Self {
        let created_at = Utc::now();
        Self {
            use_memory_cache: true,
            use_durable_cache: false,
            key: key.into(),
            duration,
            created_at,
            expires_at: created_at
                .checked_add_signed(duration)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            provider,
            reader_factory: Arc::new(|options: &CacheOptions| -> Arc<dyn DataSource> {
                Arc::new(CacheReader::new(options.provider.clone(), options.key.clone()))
            }),
            writer_factory: Arc::new(|options: &CacheOptions| -> Box<dyn DataWriter> {
                Box::new(CacheWriter::new(options.provider.clone(), options.key.clone()))
            }),
        }
    }

    /// Sets the durable cache flag.
    pub fn with_durable_cache(mut self, durable: bool) -> Self {
        self.use_durable_cache = durable;
        self
    }

    /// Replaces the reader factory.
    pub fn with_reader_factory(mut self, factory: ReaderFactory) -> Self {
        self.reader_factory = factory;
        self
    }

    /// Replaces the writer factory.
    pub fn with_writer_factory(mut self, factory: WriterFactory) -> Self {
        self.writer_factory = factory;
        self
    }

    /// Returns true if either cache tier is enabled.
    pub fn is_enabled(&self) -> bool {
        self.use_memory_cache || self.use_durable_cache
    }

    /// Returns true if the entry should no longer be served at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// Creates a reader over the cached entry.
    pub fn create_reader(&self) -> Arc<dyn DataSource> {
        (self.reader_factory)(self)
    }

    /// Creates a writer for the cached entry.
    pub fn create_writer(&self) -> Box<dyn DataWriter> {
        (self.writer_factory)(self)
    }
}

impl fmt::Debug for CacheOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheOptions")
            .field("use_memory_cache", &self.use_memory_cache)
            .field("use_durable_cache", &self.use_durable_cache)
            .field("key", &self.key)
            .field("duration", &self.duration)
            .field("created_at", &self.created_at)
            .field("expires_at", &self.expires_at)
            .field("provider", &self.provider)
            .finish_non_exhaustive()
    }
}

/// Resolves table names to row sources during physical planning.
pub trait SourceProvider: Send + Sync {
    /// Returns the source registered under `name`.
    fn source(&self, name: &str) -> Option<Arc<dyn DataSource>>;
}

impl SourceProvider for HashMap<String, Arc<dyn DataSource>> {
    fn source(&self, name: &str) -> Option<Arc<dyn DataSource>> {
        self.get(name).cloned()
    }
}
