//! Stream registry implementation
//!
//! The central registry that manages all active streams: creation, append,
//! random-access reads, finalization, deletion, and idle eviction.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tokio::sync::RwLock;

use crate::cache::{BufferPool, CacheError};

use super::config::RegistryConfig;
use super::context::{StreamContext, StreamInfo, StreamStatus};
use super::error::RegistryError;

/// Central registry for all active streams
///
/// Thread-safe via `RwLock`; per-stream mutation serializes through each
/// context's own mutex, so the registry lock is only held for map access.
pub struct StreamRegistry {
    /// Map of stream id to context
    streams: RwLock<HashMap<String, Arc<StreamContext>>>,

    /// Shared pool backing transient read buffers
    pool: BufferPool,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a registry with custom configuration
    ///
    /// The cache directory is created if absent; a failure here is logged
    /// and resurfaces as an I/O error on the first append.
    pub fn with_config(config: RegistryConfig) -> Self {
        if let Err(error) = std::fs::create_dir_all(&config.cache_dir) {
            tracing::warn!(
                dir = %config.cache_dir.display(),
                error = %error,
                "Failed to create cache directory"
            );
        } else {
            tracing::info!(
                dir = %config.cache_dir.display(),
                "Stream registry initialized"
            );
        }
        Self {
            streams: RwLock::new(HashMap::new()),
            pool: BufferPool::with_sizes(config.pool_buffer_size, config.pool_capacity),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// The shared read-buffer pool
    pub fn pool(&self) -> &BufferPool {
        &self.pool
    }

    /// Register a new stream in `Uploading` state
    ///
    /// The backing cache file is created lazily on the first append.
    pub async fn create_stream(&self, stream_id: &str) -> Result<(), RegistryError> {
        validate_stream_id(stream_id)?;

        let mut streams = self.streams.write().await;
        if streams.contains_key(stream_id) {
            tracing::warn!(stream = %stream_id, "Stream already exists");
            return Err(RegistryError::StreamExists(stream_id.to_string()));
        }

        let cache_path = self.cache_path(stream_id);
        let context = Arc::new(StreamContext::new(
            stream_id.to_string(),
            cache_path.clone(),
            self.config.geometry,
        ));
        streams.insert(stream_id.to_string(), context);

        tracing::info!(
            stream = %stream_id,
            path = %cache_path.display(),
            "Created stream"
        );
        Ok(())
    }

    /// Look up a stream, refreshing its idle-eviction clock
    pub async fn get_stream(&self, stream_id: &str) -> Option<Arc<StreamContext>> {
        let context = {
            let streams = self.streams.read().await;
            streams.get(stream_id).cloned()
        };
        if let Some(ref context) = context {
            context.touch().await;
        }
        context
    }

    /// Append a chunk at the stream's current offset
    ///
    /// Only legal while the stream is `Uploading`. The chunk is written in
    /// full or the offsets are left untouched.
    pub async fn write_chunk(&self, stream_id: &str, data: &[u8]) -> Result<(), RegistryError> {
        let context = self
            .get_stream(stream_id)
            .await
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))?;

        let mut meta = context.meta.lock().await;
        if meta.status != StreamStatus::Uploading {
            return Err(RegistryError::NotUploading(stream_id.to_string()));
        }

        let written = context.cache().write(meta.current_offset, data).await?;
        if written != data.len() {
            return Err(RegistryError::ShortWrite {
                stream_id: stream_id.to_string(),
                written,
                expected: data.len(),
            });
        }

        meta.current_offset += data.len() as u64;
        meta.total_size = meta.current_offset;
        meta.last_accessed_at = Instant::now();

        tracing::debug!(
            stream = %stream_id,
            bytes = data.len(),
            offset = meta.current_offset - data.len() as u64,
            "Wrote chunk"
        );
        Ok(())
    }

    /// Read up to `length` bytes at `offset`, in any stream state
    ///
    /// Returns `EndOfStream` when the request starts at or past the end of
    /// the appended data. Requests no larger than one pool buffer go
    /// through the shared buffer pool.
    pub async fn read_chunk(
        &self,
        stream_id: &str,
        offset: u64,
        length: usize,
    ) -> Result<Bytes, RegistryError> {
        let context = self
            .get_stream(stream_id)
            .await
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))?;

        let result = if length <= self.pool.buffer_size() {
            let mut buf = self.pool.acquire().await;
            let copied = match context.cache().read_into(offset, &mut buf[..length]).await {
                Ok(copied) => copied,
                Err(error) => {
                    buf.release().await;
                    return self.end_of_stream_or(&context, stream_id, offset, error).await;
                }
            };
            let bytes = Bytes::copy_from_slice(&buf[..copied]);
            buf.release().await;
            bytes
        } else {
            match context.cache().read(offset, length).await {
                Ok(data) => Bytes::from(data),
                Err(error) => {
                    return self.end_of_stream_or(&context, stream_id, offset, error).await;
                }
            }
        };

        if result.is_empty() && length > 0 {
            let meta = context.meta.lock().await;
            if offset >= meta.total_size {
                return Err(RegistryError::EndOfStream(stream_id.to_string()));
            }
        }

        tracing::debug!(
            stream = %stream_id,
            offset = offset,
            bytes = result.len(),
            "Read chunk"
        );
        Ok(result)
    }

    /// Finalize an uploading stream: truncate, flush, transition to `Ready`
    pub async fn finalize_stream(&self, stream_id: &str) -> Result<(), RegistryError> {
        let context = self
            .get_stream(stream_id)
            .await
            .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))?;

        let mut meta = context.meta.lock().await;
        if meta.status != StreamStatus::Uploading {
            tracing::warn!(stream = %stream_id, "Stream is not uploading, cannot finalize");
            return Err(RegistryError::NotUploading(stream_id.to_string()));
        }

        // A stream stopped before its first append has no backing file yet.
        if !context.cache().is_open().await {
            context.cache().create(meta.total_size).await?;
        }
        context.cache().finalize(meta.total_size).await?;

        meta.status = StreamStatus::Ready;
        meta.last_accessed_at = Instant::now();

        tracing::info!(
            stream = %stream_id,
            bytes = meta.total_size,
            "Finalized stream"
        );
        Ok(())
    }

    /// Remove a stream, close its cache, and unlink its backing file
    pub async fn delete_stream(&self, stream_id: &str) -> Result<(), RegistryError> {
        let context = {
            let mut streams = self.streams.write().await;
            streams.remove(stream_id)
        }
        .ok_or_else(|| RegistryError::StreamNotFound(stream_id.to_string()))?;

        self.teardown(&context).await;
        tracing::info!(stream = %stream_id, "Deleted stream");
        Ok(())
    }

    /// Snapshot one stream's metadata
    pub async fn stream_info(&self, stream_id: &str) -> Option<StreamInfo> {
        let context = {
            let streams = self.streams.read().await;
            streams.get(stream_id).cloned()
        };
        match context {
            Some(context) => Some(context.info().await),
            None => None,
        }
    }

    /// Ids of all registered streams
    pub async fn list_streams(&self) -> Vec<String> {
        self.streams.read().await.keys().cloned().collect()
    }

    /// Number of registered streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.len()
    }

    /// Run the idle-eviction scan once
    ///
    /// Contexts busy with an operation are skipped and retried next tick.
    /// Filesystem teardown happens after the registry lock is released.
    pub async fn cleanup(&self) {
        let expired: Vec<Arc<StreamContext>> = {
            let mut streams = self.streams.write().await;
            let expired_ids: Vec<String> = streams
                .iter()
                .filter_map(|(id, context)| {
                    let meta = context.meta.try_lock().ok()?;
                    (meta.last_accessed_at.elapsed() > self.config.idle_ttl).then(|| id.clone())
                })
                .collect();
            expired_ids
                .iter()
                .filter_map(|id| streams.remove(id))
                .collect()
        };

        for context in expired {
            tracing::info!(stream = %context.stream_id(), "Removing idle stream");
            self.teardown(&context).await;
        }
    }

    /// Spawn the background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }

    /// Map a cache error on the read path to `EndOfStream` when the request
    /// starts past the appended data (e.g. a stream that never received a
    /// chunk has no backing file to open)
    async fn end_of_stream_or(
        &self,
        context: &StreamContext,
        stream_id: &str,
        offset: u64,
        error: CacheError,
    ) -> Result<Bytes, RegistryError> {
        let meta = context.meta.lock().await;
        if offset >= meta.total_size {
            Err(RegistryError::EndOfStream(stream_id.to_string()))
        } else {
            tracing::error!(stream = %stream_id, error = %error, "Read failed");
            Err(RegistryError::Cache(error))
        }
    }

    async fn teardown(&self, context: &StreamContext) {
        context.cache().close().await;
        match tokio::fs::remove_file(context.cache_path()).await {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => {
                tracing::error!(
                    path = %context.cache_path().display(),
                    error = %error,
                    "Failed to remove cache file"
                );
            }
        }
    }

    fn cache_path(&self, stream_id: &str) -> PathBuf {
        self.config.cache_dir.join(format!("{stream_id}.cache"))
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream ids name files under the cache directory, so anything that could
/// escape it is rejected up front.
fn validate_stream_id(stream_id: &str) -> Result<(), RegistryError> {
    let ok = !stream_id.is_empty()
        && stream_id != ".."
        && !stream_id.contains(['/', '\\'])
        && !stream_id.chars().any(|c| c.is_control());
    if ok {
        Ok(())
    } else {
        Err(RegistryError::InvalidStreamId(stream_id.to_string()))
    }
}
