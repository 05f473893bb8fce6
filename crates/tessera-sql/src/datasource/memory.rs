//! In-memory row sources and result cache.
//!
//! Cache entries are newline-delimited JSON: a header line listing
//! `(name, type)` pairs, then one JSON array per row.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio_util::sync::CancellationToken;

use super::{CacheHandle, CacheProvider, DataSource, DataWriter, RowStream};
use crate::context::QueryContext;
use crate::data::{ColumnDataType, QualifiedField, RecordBatch, ScalarValue, Schema, SchemaRef};
use crate::error::{ExecResult, ExecutionError};

/// A table held in memory as rows.
#[derive(Debug, Clone)]
pub struct MemoryDataSource {
    schema: SchemaRef,
    rows: Arc<Vec<Vec<ScalarValue>>>,
}

impl MemoryDataSource {
    /// Creates a source over `rows`.
    pub fn new(schema: SchemaRef, rows: Vec<Vec<ScalarValue>>) -> Self {
        Self {
            schema,
            rows: Arc::new(rows),
        }
    }

    /// Creates a source holding the rows of `batches`.
    pub fn from_batches(schema: SchemaRef, batches: &[RecordBatch]) -> Self {
        let rows = batches
            .iter()
            .flat_map(|batch| (0..batch.num_rows()).map(|i| batch.row(i)))
            .collect();
        Self::new(schema, rows)
    }

    /// Returns the schema.
    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    /// Returns the number of rows.
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

#[async_trait]
impl DataSource for MemoryDataSource {
    async fn read_source(
        &self,
        _ctx: &QueryContext,
        cancel: CancellationToken,
    ) -> ExecResult<RowStream> {
        let rows = self.rows.clone();
        Ok(Box::pin(async_stream::try_stream! {
            for row in rows.iter() {
                if cancel.is_cancelled() {
                    Err(ExecutionError::Cancelled)?;
                }
                yield row.clone();
            }
        }))
    }

    async fn query_schema(&self) -> ExecResult<Option<SchemaRef>> {
        Ok(Some(self.schema.clone()))
    }
}

/// Byte storage for one in-memory cache entry.
#[derive(Debug, Default)]
pub struct CacheFile {
    state: RwLock<CacheFileState>,
}

#[derive(Debug, Default)]
struct CacheFileState {
    bytes: Vec<u8>,
    complete: bool,
}

impl CacheFile {
    /// Returns the size in bytes.
    pub fn len(&self) -> usize {
        self.state.read().bytes.len()
    }

    /// Returns true if nothing has been published.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl CacheHandle for CacheFile {
    async fn contents(&self) -> ExecResult<Vec<u8>> {
        Ok(self.state.read().bytes.clone())
    }

    async fn is_complete(&self) -> ExecResult<bool> {
        Ok(self.state.read().complete)
    }

    async fn publish(&self, bytes: Vec<u8>) -> ExecResult<bool> {
        let mut state = self.state.write();
        if state.complete {
            return Ok(false);
        }
        state.bytes = bytes;
        state.complete = true;
        Ok(true)
    }
}

/// Cache entries kept in process memory.
#[derive(Debug, Default)]
pub struct MemoryCacheProvider {
    files: RwLock<FxHashMap<String, Arc<CacheFile>>>,
}

impl MemoryCacheProvider {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of entries, complete or not.
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn file(&self, key: &str) -> Arc<CacheFile> {
        if let Some(file) = self.files.read().get(key) {
            return file.clone();
        }
        self.files
            .write()
            .entry(key.to_string())
            .or_default()
            .clone()
    }
}

#[async_trait]
impl CacheProvider for MemoryCacheProvider {
    async fn exists(&self, key: &str) -> ExecResult<bool> {
        Ok(self
            .files
            .read()
            .get(key)
            .is_some_and(|f| f.state.read().complete))
    }

    async fn get_file_stream(&self, path: &str) -> ExecResult<Arc<dyn CacheHandle>> {
        let file: Arc<dyn CacheHandle> = self.file(path);
        Ok(file)
    }

    async fn remove(&self, key: &str) -> ExecResult<()> {
        self.files.write().remove(key);
        Ok(())
    }
}

/// Writes batches into a cache entry.
///
/// Rows are buffered by the writer and published in one step by
/// [`DataWriter::close`]. If another writer published the entry first, the
/// buffered rows are dropped. [`DataWriter::discard`] only drops the buffer.
#[derive(Debug)]
pub struct CacheWriter {
    provider: Arc<dyn CacheProvider>,
    key: String,
    buffer: Vec<u8>,
    wrote_header: bool,
}

impl CacheWriter {
    /// Creates a writer for `key`.
    pub fn new(provider: Arc<dyn CacheProvider>, key: impl Into<String>) -> Self {
        Self {
            provider,
            key: key.into(),
            buffer: Vec::new(),
            wrote_header: false,
        }
    }
}

#[async_trait]
impl DataWriter for CacheWriter {
    async fn write(&mut self, batch: &RecordBatch, cancel: &CancellationToken) -> ExecResult<()> {
        if cancel.is_cancelled() {
            return Err(ExecutionError::Cancelled);
        }
        if !self.wrote_header {
            let header: Vec<(&str, ColumnDataType)> = batch
                .schema()
                .fields()
                .iter()
                .map(|f| (f.name.as_str(), f.data_type))
                .collect();
            write_line(&mut self.buffer, &header)?;
            self.wrote_header = true;
        }
        for i in 0..batch.num_rows() {
            write_line(&mut self.buffer, &batch.row(i))?;
        }
        Ok(())
    }

    async fn close(&mut self) -> ExecResult<()> {
        let bytes = std::mem::take(&mut self.buffer);
        self.wrote_header = false;
        let handle = self.provider.get_file_stream(&self.key).await?;
        if !handle.publish(bytes).await? {
            tracing::debug!(key = %self.key, "cache entry already published");
        }
        Ok(())
    }

    async fn discard(&mut self) -> ExecResult<()> {
        self.buffer.clear();
        self.wrote_header = false;
        Ok(())
    }
}

fn write_line<T: serde::Serialize + ?Sized>(buffer: &mut Vec<u8>, value: &T) -> ExecResult<()> {
    serde_json::to_writer(&mut *buffer, value).map_err(ExecutionError::external)?;
    buffer.push(b'\n');
    Ok(())
}

/// Reads the rows of a cache entry.
#[derive(Debug, Clone)]
pub struct CacheReader {
    provider: Arc<dyn CacheProvider>,
    key: String,
}

impl CacheReader {
    /// Creates a reader for `key`.
    pub fn new(provider: Arc<dyn CacheProvider>, key: impl Into<String>) -> Self {
        Self {
            provider,
            key: key.into(),
        }
    }

    async fn lines(&self) -> ExecResult<Vec<String>> {
        let handle = self.provider.get_file_stream(&self.key).await?;
        let text = String::from_utf8(handle.contents().await?).map_err(ExecutionError::external)?;
        Ok(text.lines().map(str::to_string).collect())
    }
}

#[async_trait]
impl DataSource for CacheReader {
    async fn read_source(
        &self,
        _ctx: &QueryContext,
        cancel: CancellationToken,
    ) -> ExecResult<RowStream> {
        let lines = self.lines().await?;
        Ok(Box::pin(async_stream::try_stream! {
            for line in lines.into_iter().skip(1) {
                if cancel.is_cancelled() {
                    Err(ExecutionError::Cancelled)?;
                }
                let row: Vec<ScalarValue> =
                    serde_json::from_str(&line).map_err(ExecutionError::external)?;
                yield row;
            }
        }))
    }

    async fn query_schema(&self) -> ExecResult<Option<SchemaRef>> {
        let lines = self.lines().await?;
        let Some(header) = lines.first() else {
            return Ok(None);
        };
        let fields: Vec<(String, ColumnDataType)> =
            serde_json::from_str(header).map_err(ExecutionError::external)?;
        Ok(Some(Arc::new(Schema::new(
            fields
                .into_iter()
                .map(|(name, data_type)| QualifiedField::new(name, data_type))
                .collect(),
        ))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema_of;
    use futures::TryStreamExt;

    fn people() -> RecordBatch {
        RecordBatch::from_rows(
            schema_of(&[("id", ColumnDataType::Long), ("name", ColumnDataType::Utf8)]),
            vec![
                vec![ScalarValue::from(1i64), ScalarValue::from("ada")],
                vec![ScalarValue::from(2i64), ScalarValue::Utf8(None)],
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_memory_source_streams_rows() {
        let batch = people();
        let source = MemoryDataSource::from_batches(batch.schema().clone(), &[batch]);
        let rows: Vec<_> = source
            .read_source(&QueryContext::default(), CancellationToken::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0][1], ScalarValue::from("ada"));
        assert!(source.query_schema().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_memory_source_stops_when_cancelled() {
        let source = MemoryDataSource::new(
            schema_of(&[("id", ColumnDataType::Long)]),
            vec![vec![ScalarValue::from(1i64)]],
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result: ExecResult<Vec<_>> = source
            .read_source(&QueryContext::default(), cancel)
            .await
            .unwrap()
            .try_collect()
            .await;
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }

    #[tokio::test]
    async fn test_cache_entry_visible_after_close() {
        let provider: Arc<dyn CacheProvider> = Arc::new(MemoryCacheProvider::new());
        let mut writer = CacheWriter::new(provider.clone(), "q1");
        writer.write(&people(), &CancellationToken::new()).await.unwrap();
        assert!(!provider.exists("q1").await.unwrap());
        writer.close().await.unwrap();
        assert!(provider.exists("q1").await.unwrap());

        let reader = CacheReader::new(provider.clone(), "q1");
        let schema = reader.query_schema().await.unwrap().unwrap();
        assert_eq!(schema.len(), 2);
        assert_eq!(schema.fields()[1].name, "name");
        let rows: Vec<_> = reader
            .read_source(&QueryContext::default(), CancellationToken::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows, vec![people().row(0), people().row(1)]);
    }

    #[tokio::test]
    async fn test_discarded_entry_is_not_published() {
        let provider: Arc<dyn CacheProvider> = Arc::new(MemoryCacheProvider::new());
        let mut writer = CacheWriter::new(provider.clone(), "q2");
        writer.write(&people(), &CancellationToken::new()).await.unwrap();
        writer.discard().await.unwrap();
        assert!(!provider.exists("q2").await.unwrap());
    }

    #[tokio::test]
    async fn test_interleaved_writers_publish_once() {
        let provider: Arc<dyn CacheProvider> = Arc::new(MemoryCacheProvider::new());
        let cancel = CancellationToken::new();
        let mut first = CacheWriter::new(provider.clone(), "q4");
        let mut second = CacheWriter::new(provider.clone(), "q4");
        let mut third = CacheWriter::new(provider.clone(), "q4");

        first.write(&people(), &cancel).await.unwrap();
        second.write(&people(), &cancel).await.unwrap();
        third.write(&people(), &cancel).await.unwrap();
        second.write(&people(), &cancel).await.unwrap();
        first.close().await.unwrap();
        let published = provider.get_file_stream("q4").await.unwrap().contents().await.unwrap();

        second.close().await.unwrap();
        third.discard().await.unwrap();

        let handle = provider.get_file_stream("q4").await.unwrap();
        assert!(handle.is_complete().await.unwrap());
        assert_eq!(handle.contents().await.unwrap(), published);
        let rows: Vec<_> = CacheReader::new(provider, "q4")
            .read_source(&QueryContext::default(), CancellationToken::new())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[tokio::test]
    async fn test_publish_refuses_complete_entry() {
        let file = CacheFile::default();
        assert!(file.publish(b"a\n".to_vec()).await.unwrap());
        assert!(!file.publish(b"b\n".to_vec()).await.unwrap());
        assert_eq!(file.contents().await.unwrap(), b"a\n".to_vec());
        assert_eq!(file.len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_write_fails() {
        let provider: Arc<dyn CacheProvider> = Arc::new(MemoryCacheProvider::new());
        let mut writer = CacheWriter::new(provider, "q3");
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = writer.write(&people(), &cancel).await;
        assert!(matches!(result, Err(ExecutionError::Cancelled)));
    }
}
