//! Per-stream context and status types

use std::path::{Path, PathBuf};
use std::time::Instant;

use tokio::sync::Mutex;

use crate::cache::{CacheGeometry, SegmentedCache};

/// Lifecycle status of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// Accepting appends from the owning connection
    Uploading,
    /// Finalized; backing file truncated to its logical length
    Ready,
    /// Reserved; no transition enters this state
    Downloading,
}

/// Mutable per-stream metadata, guarded by the context mutex
#[derive(Debug)]
pub(super) struct StreamMeta {
    /// Byte position of the next append; equals `total_size` while uploading
    pub current_offset: u64,
    /// Logical length of the stream's payload
    pub total_size: u64,
    /// Lifecycle status
    pub status: StreamStatus,
    /// When the stream was created
    pub created_at: Instant,
    /// Last create/append/read touch, used for idle eviction
    pub last_accessed_at: Instant,
}

/// Context for a single live stream
///
/// Identity and the owned cache are immutable; everything that changes goes
/// through the `meta` mutex. Appends take the mutex for the whole write so
/// chunks on one stream are strictly ordered and contiguous.
pub struct StreamContext {
    stream_id: String,
    cache_path: PathBuf,
    cache: SegmentedCache,
    pub(super) meta: Mutex<StreamMeta>,
}

impl StreamContext {
    /// Create a context for a fresh stream in `Uploading` state
    ///
    /// The cache is constructed but not opened; the backing file appears on
    /// the first append.
    pub(super) fn new(stream_id: String, cache_path: PathBuf, geometry: CacheGeometry) -> Self {
        let now = Instant::now();
        Self {
            cache: SegmentedCache::with_geometry(&cache_path, geometry),
            stream_id,
            cache_path,
            meta: Mutex::new(StreamMeta {
                current_offset: 0,
                total_size: 0,
                status: StreamStatus::Uploading,
                created_at: now,
                last_accessed_at: now,
            }),
        }
    }

    /// The stream's id
    pub fn stream_id(&self) -> &str {
        &self.stream_id
    }

    /// Path of the backing cache file
    pub fn cache_path(&self) -> &Path {
        &self.cache_path
    }

    /// The stream's cache
    pub(super) fn cache(&self) -> &SegmentedCache {
        &self.cache
    }

    /// Refresh the idle-eviction clock
    pub(super) async fn touch(&self) {
        self.meta.lock().await.last_accessed_at = Instant::now();
    }

    /// Snapshot the mutable metadata
    pub async fn info(&self) -> StreamInfo {
        let meta = self.meta.lock().await;
        StreamInfo {
            stream_id: self.stream_id.clone(),
            current_offset: meta.current_offset,
            total_size: meta.total_size,
            status: meta.status,
            age: meta.created_at.elapsed(),
            idle_for: meta.last_accessed_at.elapsed(),
        }
    }
}

/// Point-in-time view of a stream's metadata
#[derive(Debug, Clone)]
pub struct StreamInfo {
    /// The stream's id
    pub stream_id: String,
    /// Next append position
    pub current_offset: u64,
    /// Logical payload length
    pub total_size: u64,
    /// Lifecycle status
    pub status: StreamStatus,
    /// Time since the stream was created
    pub age: std::time::Duration,
    /// Time since the stream was last touched
    pub idle_for: std::time::Duration,
}
