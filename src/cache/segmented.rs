//! Segmented memory-mapped cache implementation
//!
//! A `SegmentedCache` owns one backing file and maps it in fixed-size
//! segments on demand. Large files (beyond 2 GiB) are handled with 64-bit
//! offsets; only the segments actually touched are ever mapped.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use bytes::Bytes;
use memmap2::{MmapMut, MmapOptions};
use tokio::sync::RwLock;

use super::error::CacheError;

/// Maximum number of operations accepted by a single batch call
pub const BATCH_OPERATION_LIMIT: usize = 1000;

/// Production segment size: 1 GiB per mapping
const DEFAULT_SEGMENT_SIZE: u64 = 1024 * 1024 * 1024;

/// Production cap on a single cache file: 8 GiB
const DEFAULT_MAX_CACHE_SIZE: u64 = 8 * 1024 * 1024 * 1024;

/// Mapping geometry for a cache file
///
/// Production caches always use the defaults (1 GiB segments, 8 GiB max).
/// Tests inject small geometries so segment-boundary behavior can be
/// exercised without gigabyte files.
#[derive(Debug, Clone, Copy)]
pub struct CacheGeometry {
    /// Size of one mapped segment in bytes
    pub segment_size: u64,
    /// Maximum logical size of the backing file
    pub max_size: u64,
}

impl Default for CacheGeometry {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            max_size: DEFAULT_MAX_CACHE_SIZE,
        }
    }
}

impl CacheGeometry {
    /// Create a custom geometry
    pub fn new(segment_size: u64, max_size: u64) -> Self {
        Self {
            segment_size,
            max_size,
        }
    }
}

/// A single write in a batch
#[derive(Debug, Clone)]
pub struct WriteOp {
    /// Byte offset to write at
    pub offset: u64,
    /// Data to write
    pub data: Bytes,
}

/// A single read in a batch
#[derive(Debug, Clone, Copy)]
pub struct ReadOp {
    /// Byte offset to read from
    pub offset: u64,
    /// Number of bytes requested
    pub length: usize,
}

/// Mutable cache state, guarded by the per-cache lock
struct CacheInner {
    /// Backing file handle; `None` until created or opened
    file: Option<File>,
    /// Logical length, always matching the on-disk length
    file_size: u64,
    /// Currently mapped segments, keyed by segment index
    segments: HashMap<u64, MmapMut>,
}

/// Growable byte-addressable file, mapped in fixed-size segments
///
/// Readers share the lock; writes, resizes, open/create, evict, and close
/// are exclusive because they can mutate the set of active mappings.
pub struct SegmentedCache {
    path: PathBuf,
    geometry: CacheGeometry,
    inner: RwLock<CacheInner>,
}

impl SegmentedCache {
    /// Create a cache handle for `path` with production geometry
    ///
    /// The backing file is not touched until `create`, `open`, or the first
    /// `write`/`read`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_geometry(path, CacheGeometry::default())
    }

    /// Create a cache handle with custom mapping geometry
    pub fn with_geometry(path: impl Into<PathBuf>, geometry: CacheGeometry) -> Self {
        Self {
            path: path.into(),
            geometry,
            inner: RwLock::new(CacheInner {
                file: None,
                file_size: 0,
                segments: HashMap::new(),
            }),
        }
    }

    /// Path of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Mapping geometry in use
    pub fn geometry(&self) -> CacheGeometry {
        self.geometry
    }

    /// Current logical file size
    pub async fn size(&self) -> u64 {
        self.inner.read().await.file_size
    }

    /// Whether the backing file is open
    pub async fn is_open(&self) -> bool {
        self.inner.read().await.file.is_some()
    }

    /// Create the backing file, pre-extended to `initial_size`
    pub async fn create(&self, initial_size: u64) -> Result<(), CacheError> {
        self.check_limit(0, initial_size)?;
        let mut inner = self.inner.write().await;
        self.create_locked(&mut inner, initial_size)
    }

    /// Open an existing backing file and adopt its on-disk length
    pub async fn open(&self) -> Result<(), CacheError> {
        let mut inner = self.inner.write().await;
        self.open_locked(&mut inner)
    }

    /// Unmap all segments and release the file handle; idempotent
    pub async fn close(&self) {
        let mut inner = self.inner.write().await;
        if inner.file.is_some() {
            inner.segments.clear();
            inner.file = None;
            tracing::debug!(path = %self.path.display(), "Closed cache file");
        }
    }

    /// Write `data` at `offset`, growing the file if needed
    ///
    /// Creates the backing file on first use. Returns the number of bytes
    /// actually written; a count shorter than `data.len()` means a segment
    /// failed to map mid-write (the failure is logged).
    pub async fn write(&self, offset: u64, data: &[u8]) -> Result<usize, CacheError> {
        if data.is_empty() {
            return Ok(0);
        }
        self.check_limit(offset, data.len() as u64)?;

        let mut inner = self.inner.write().await;
        if inner.file.is_none() {
            self.create_locked(&mut inner, offset + data.len() as u64)?;
        }

        let required = offset + data.len() as u64;
        if required > inner.file_size {
            self.resize_locked(&mut inner, required)?;
        }

        let mut written = 0;
        while written < data.len() {
            let pos = offset + written as u64;
            let index = pos / self.geometry.segment_size;
            let intra = (pos % self.geometry.segment_size) as usize;
            let count = (data.len() - written).min((self.geometry.segment_size as usize) - intra);

            let mmap = match self.mapped_segment(&mut inner, index) {
                Ok(mmap) => mmap,
                Err(error) => {
                    tracing::error!(
                        path = %self.path.display(),
                        segment = index,
                        error = %error,
                        "Failed to map segment for write"
                    );
                    break;
                }
            };

            mmap[intra..intra + count].copy_from_slice(&data[written..written + count]);
            // Writeback is scheduled, not awaited; `flush` gives durability.
            let _ = mmap.flush_async_range(intra, count);

            written += count;
        }

        tracing::trace!(
            path = %self.path.display(),
            offset = offset,
            bytes = written,
            "Cache write"
        );
        Ok(written)
    }

    /// Read up to `length` bytes starting at `offset`
    ///
    /// Opens the backing file if needed. Returns an empty buffer when
    /// `offset` is at or past the end of the file; otherwise the result is
    /// clamped to the remaining bytes.
    pub async fn read(&self, offset: u64, length: usize) -> Result<Vec<u8>, CacheError> {
        self.ensure_open_for_read().await?;

        // Fast path: every covering segment is already mapped.
        {
            let inner = self.inner.read().await;
            if offset >= inner.file_size {
                return Ok(Vec::new());
            }
            let actual = length.min((inner.file_size - offset) as usize);
            if self.range_mapped(&inner, offset, actual) {
                let mut out = vec![0u8; actual];
                let copied = self.copy_mapped(&inner, offset, &mut out);
                out.truncate(copied);
                return Ok(out);
            }
        }

        // Slow path: take the exclusive lock and map the missing segments.
        let mut inner = self.inner.write().await;
        if offset >= inner.file_size {
            return Ok(Vec::new());
        }
        let actual = length.min((inner.file_size - offset) as usize);
        let mut out = vec![0u8; actual];
        let copied = self.copy_mapping(&mut inner, offset, &mut out);
        out.truncate(copied);
        Ok(out)
    }

    /// Read into a caller-provided buffer, returning the bytes copied
    ///
    /// Same bounds behavior as [`read`](Self::read) with the requested
    /// length taken from `buf.len()`.
    pub async fn read_into(&self, offset: u64, buf: &mut [u8]) -> Result<usize, CacheError> {
        self.ensure_open_for_read().await?;

        {
            let inner = self.inner.read().await;
            if offset >= inner.file_size {
                return Ok(0);
            }
            let actual = buf.len().min((inner.file_size - offset) as usize);
            if self.range_mapped(&inner, offset, actual) {
                return Ok(self.copy_mapped(&inner, offset, &mut buf[..actual]));
            }
        }

        let mut inner = self.inner.write().await;
        if offset >= inner.file_size {
            return Ok(0);
        }
        let actual = buf.len().min((inner.file_size - offset) as usize);
        Ok(self.copy_mapping(&mut inner, offset, &mut buf[..actual]))
    }

    /// Apply writes sequentially, returning per-op byte counts
    pub async fn write_batch(&self, ops: &[WriteOp]) -> Result<Vec<usize>, CacheError> {
        if ops.len() > BATCH_OPERATION_LIMIT {
            return Err(CacheError::BatchLimitExceeded(ops.len()));
        }
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            results.push(self.write(op.offset, &op.data).await?);
        }
        Ok(results)
    }

    /// Apply reads sequentially, returning per-op buffers
    pub async fn read_batch(&self, ops: &[ReadOp]) -> Result<Vec<Vec<u8>>, CacheError> {
        if ops.len() > BATCH_OPERATION_LIMIT {
            return Err(CacheError::BatchLimitExceeded(ops.len()));
        }
        let mut results = Vec::with_capacity(ops.len());
        for op in ops {
            results.push(self.read(op.offset, op.length).await?);
        }
        Ok(results)
    }

    /// Truncate or extend the backing file to exactly `new_size`
    ///
    /// All mappings are torn down; subsequent accesses remap on demand.
    pub async fn resize(&self, new_size: u64) -> Result<(), CacheError> {
        let mut inner = self.inner.write().await;
        self.resize_locked(&mut inner, new_size)
    }

    /// Truncate to `final_size` and synchronously persist
    pub async fn finalize(&self, final_size: u64) -> Result<(), CacheError> {
        let mut inner = self.inner.write().await;
        self.resize_locked(&mut inner, final_size)?;
        let file = inner
            .file
            .as_ref()
            .ok_or_else(|| CacheError::NotOpen(self.path.clone()))?;
        file.sync_all()?;
        tracing::debug!(
            path = %self.path.display(),
            size = final_size,
            "Finalized cache file"
        );
        Ok(())
    }

    /// Synchronously flush every mapped segment to disk
    pub async fn flush(&self) -> Result<(), CacheError> {
        let inner = self.inner.read().await;
        if inner.file.is_none() {
            return Err(CacheError::NotOpen(self.path.clone()));
        }
        for mmap in inner.segments.values() {
            mmap.flush()?;
        }
        tracing::debug!(path = %self.path.display(), "Flushed cache file");
        Ok(())
    }

    /// Map the segments covering the range and advise the OS they are needed
    ///
    /// Best-effort: the advice itself is not required to succeed.
    pub async fn prefetch(&self, offset: u64, length: usize) -> Result<(), CacheError> {
        self.check_limit(offset, length as u64)?;
        let mut inner = self.inner.write().await;
        if inner.file.is_none() {
            return Err(CacheError::NotOpen(self.path.clone()));
        }
        if length == 0 || offset >= inner.file_size {
            return Ok(());
        }

        let end = (offset + length as u64).min(inner.file_size);
        let first = offset / self.geometry.segment_size;
        let last = (end - 1) / self.geometry.segment_size;
        for index in first..=last {
            let mmap = self.mapped_segment(&mut inner, index)?;
            #[cfg(unix)]
            {
                let _ = mmap.advise(memmap2::Advice::WillNeed);
            }
            #[cfg(not(unix))]
            let _ = mmap;
        }
        tracing::trace!(
            path = %self.path.display(),
            offset = offset,
            length = length,
            "Prefetched segments"
        );
        Ok(())
    }

    /// Unmap every segment covered by the range; idempotent
    pub async fn evict(&self, offset: u64, length: usize) -> Result<(), CacheError> {
        self.check_limit(offset, length as u64)?;
        let mut inner = self.inner.write().await;
        if inner.file.is_none() || length == 0 {
            return Ok(());
        }

        let first = offset / self.geometry.segment_size;
        let last = (offset + length as u64 - 1) / self.geometry.segment_size;
        for index in first..=last {
            if inner.segments.remove(&index).is_some() {
                tracing::trace!(
                    path = %self.path.display(),
                    segment = index,
                    "Evicted segment mapping"
                );
            }
        }
        Ok(())
    }

    fn check_limit(&self, offset: u64, length: u64) -> Result<(), CacheError> {
        match offset.checked_add(length) {
            Some(end) if end <= self.geometry.max_size => Ok(()),
            _ => Err(CacheError::SizeLimitExceeded {
                offset,
                length,
                max: self.geometry.max_size,
            }),
        }
    }

    fn create_locked(&self, inner: &mut CacheInner, initial_size: u64) -> Result<(), CacheError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        if initial_size > 0 {
            file.set_len(initial_size)?;
        }
        inner.segments.clear();
        inner.file = Some(file);
        inner.file_size = initial_size;
        tracing::debug!(
            path = %self.path.display(),
            size = initial_size,
            "Created cache file"
        );
        Ok(())
    }

    fn open_locked(&self, inner: &mut CacheInner) -> Result<(), CacheError> {
        let file = OpenOptions::new().read(true).write(true).open(&self.path)?;
        let file_size = file.metadata()?.len();
        inner.segments.clear();
        inner.file = Some(file);
        inner.file_size = file_size;
        tracing::debug!(
            path = %self.path.display(),
            size = file_size,
            "Opened cache file"
        );
        Ok(())
    }

    fn resize_locked(&self, inner: &mut CacheInner, new_size: u64) -> Result<(), CacheError> {
        self.check_limit(0, new_size)?;
        if inner.file.is_none() {
            return Err(CacheError::NotOpen(self.path.clone()));
        }
        if new_size == inner.file_size {
            return Ok(());
        }
        // Mappings refer to the old length and must go before truncation.
        inner.segments.clear();
        if let Some(file) = inner.file.as_ref() {
            file.set_len(new_size)?;
        }
        inner.file_size = new_size;
        tracing::debug!(
            path = %self.path.display(),
            size = new_size,
            "Resized cache file"
        );
        Ok(())
    }

    /// Return the mapping for `index`, creating it if absent
    fn mapped_segment<'a>(
        &self,
        inner: &'a mut CacheInner,
        index: u64,
    ) -> Result<&'a mut MmapMut, CacheError> {
        let CacheInner {
            file,
            file_size,
            segments,
        } = inner;
        match segments.entry(index) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(slot) => {
                let file = file
                    .as_ref()
                    .ok_or_else(|| CacheError::NotOpen(self.path.clone()))?;
                let seg_start = index * self.geometry.segment_size;
                if seg_start >= *file_size {
                    return Err(CacheError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "segment starts beyond end of file",
                    )));
                }
                let seg_len = self.geometry.segment_size.min(*file_size - seg_start);
                // The mapping is private to this cache; all access to it is
                // serialized through `inner`'s lock.
                let mmap = unsafe {
                    MmapOptions::new()
                        .offset(seg_start)
                        .len(seg_len as usize)
                        .map_mut(file)?
                };
                tracing::trace!(
                    path = %self.path.display(),
                    segment = index,
                    bytes = seg_len,
                    "Mapped segment"
                );
                Ok(slot.insert(mmap))
            }
        }
    }

    /// Whether every segment covering `[offset, offset + length)` is mapped
    fn range_mapped(&self, inner: &CacheInner, offset: u64, length: usize) -> bool {
        if length == 0 {
            return true;
        }
        let first = offset / self.geometry.segment_size;
        let last = (offset + length as u64 - 1) / self.geometry.segment_size;
        (first..=last).all(|index| inner.segments.contains_key(&index))
    }

    /// Copy out of already-mapped segments; stops at the first gap
    fn copy_mapped(&self, inner: &CacheInner, offset: u64, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let pos = offset + copied as u64;
            let index = pos / self.geometry.segment_size;
            let intra = (pos % self.geometry.segment_size) as usize;
            let count = (dst.len() - copied).min((self.geometry.segment_size as usize) - intra);

            let Some(mmap) = inner.segments.get(&index) else {
                break;
            };
            dst[copied..copied + count].copy_from_slice(&mmap[intra..intra + count]);
            copied += count;
        }
        copied
    }

    /// Copy out of the cache, mapping segments on demand
    ///
    /// A segment that fails to map truncates the result at that point, the
    /// same partial-count contract as `write`.
    fn copy_mapping(&self, inner: &mut CacheInner, offset: u64, dst: &mut [u8]) -> usize {
        let mut copied = 0;
        while copied < dst.len() {
            let pos = offset + copied as u64;
            let index = pos / self.geometry.segment_size;
            let intra = (pos % self.geometry.segment_size) as usize;
            let count = (dst.len() - copied).min((self.geometry.segment_size as usize) - intra);

            let mmap = match self.mapped_segment(inner, index) {
                Ok(mmap) => mmap,
                Err(error) => {
                    tracing::error!(
                        path = %self.path.display(),
                        segment = index,
                        error = %error,
                        "Failed to map segment for read"
                    );
                    break;
                }
            };
            dst[copied..copied + count].copy_from_slice(&mmap[intra..intra + count]);
            copied += count;
        }
        copied
    }

    async fn ensure_open_for_read(&self) -> Result<(), CacheError> {
        {
            let inner = self.inner.read().await;
            if inner.file.is_some() {
                return Ok(());
            }
        }
        let mut inner = self.inner.write().await;
        if inner.file.is_none() {
            self.open_locked(&mut inner)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use tempfile::tempdir;

    use super::*;

    const SEG: u64 = 64;

    fn small_geometry() -> CacheGeometry {
        CacheGeometry::new(SEG, SEG * 8)
    }

    fn test_bytes(len: usize, seed: u64) -> Vec<u8> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..len).map(|_| rng.gen()).collect()
    }

    #[tokio::test]
    async fn test_write_then_read_roundtrip() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("a.cache"), small_geometry());

        let data = test_bytes(40, 1);
        let written = cache.write(0, &data).await.unwrap();
        assert_eq!(written, data.len());

        let read = cache.read(0, data.len()).await.unwrap();
        assert_eq!(read, data);
    }

    #[tokio::test]
    async fn test_auto_create_on_first_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("b.cache");
        let cache = SegmentedCache::with_geometry(&path, small_geometry());
        assert!(!cache.is_open().await);

        cache.write(10, &[1, 2, 3]).await.unwrap();
        assert!(cache.is_open().await);
        assert_eq!(cache.size().await, 13);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 13);
    }

    #[tokio::test]
    async fn test_empty_write_is_noop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("c.cache");
        let cache = SegmentedCache::with_geometry(&path, small_geometry());

        assert_eq!(cache.write(0, &[]).await.unwrap(), 0);
        assert!(!cache.is_open().await);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_read_past_end_returns_empty() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("d.cache"), small_geometry());
        cache.write(0, &[7u8; 16]).await.unwrap();

        assert!(cache.read(16, 10).await.unwrap().is_empty());
        assert!(cache.read(1000, 1).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_read_clamps_length() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("e.cache"), small_geometry());
        cache.write(0, &[9u8; 16]).await.unwrap();

        let read = cache.read(15, 10).await.unwrap();
        assert_eq!(read, vec![9u8]);
    }

    #[tokio::test]
    async fn test_write_at_segment_boundary() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("f.cache"), small_geometry());

        let data = test_bytes(8, 2);
        cache.write(SEG, &data).await.unwrap();
        assert_eq!(cache.read(SEG, 8).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_write_crossing_one_boundary() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("g.cache"), small_geometry());

        let data = test_bytes(16, 3);
        cache.write(SEG - 8, &data).await.unwrap();

        let read = cache.read(SEG - 8, 16).await.unwrap();
        assert_eq!(read, data);
        // The two bytes straddling the boundary.
        let straddle = cache.read(SEG - 1, 2).await.unwrap();
        assert_eq!(straddle, &data[7..9]);
    }

    #[tokio::test]
    async fn test_write_crossing_multiple_boundaries() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("h.cache"), small_geometry());

        let data = test_bytes((SEG * 3) as usize + 10, 4);
        let written = cache.write(5, &data).await.unwrap();
        assert_eq!(written, data.len());

        assert_eq!(cache.read(5, data.len()).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_resize_and_finalize() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("i.cache");
        let cache = SegmentedCache::with_geometry(&path, small_geometry());

        cache.create(SEG * 4).await.unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), SEG * 4);

        cache.write(0, &[3u8; 100]).await.unwrap();
        cache.finalize(100).await.unwrap();
        assert_eq!(cache.size().await, 100);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 100);
        assert_eq!(cache.read(0, 100).await.unwrap(), vec![3u8; 100]);
    }

    #[tokio::test]
    async fn test_size_limit_rejected() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("j.cache"), small_geometry());

        let result = cache.write(SEG * 8, &[1]).await;
        assert!(matches!(result, Err(CacheError::SizeLimitExceeded { .. })));
        assert!(!cache.is_open().await);
    }

    #[tokio::test]
    async fn test_batch_limit() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("k.cache"), small_geometry());

        let at_limit: Vec<ReadOp> = (0..BATCH_OPERATION_LIMIT)
            .map(|_| ReadOp {
                offset: 0,
                length: 1,
            })
            .collect();
        cache.write(0, &[1, 2, 3, 4]).await.unwrap();
        assert!(cache.read_batch(&at_limit).await.is_ok());

        let over: Vec<ReadOp> = (0..BATCH_OPERATION_LIMIT + 1)
            .map(|_| ReadOp {
                offset: 0,
                length: 1,
            })
            .collect();
        assert!(matches!(
            cache.read_batch(&over).await,
            Err(CacheError::BatchLimitExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_write_batch_matches_sequential_writes() {
        let dir = tempdir().unwrap();
        let batched = SegmentedCache::with_geometry(dir.path().join("l1.cache"), small_geometry());
        let sequential =
            SegmentedCache::with_geometry(dir.path().join("l2.cache"), small_geometry());

        let ops = vec![
            WriteOp {
                offset: 0,
                data: Bytes::from(test_bytes(32, 5)),
            },
            WriteOp {
                offset: SEG - 4,
                data: Bytes::from(test_bytes(16, 6)),
            },
            WriteOp {
                offset: 8,
                data: Bytes::from(test_bytes(8, 7)),
            },
        ];

        let counts = batched.write_batch(&ops).await.unwrap();
        assert_eq!(counts, vec![32, 16, 8]);
        for op in &ops {
            sequential.write(op.offset, &op.data).await.unwrap();
        }

        let total = sequential.size().await as usize;
        assert_eq!(
            batched.read(0, total).await.unwrap(),
            sequential.read(0, total).await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_evict_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("m.cache"), small_geometry());

        let data = test_bytes((SEG * 2) as usize, 8);
        cache.write(0, &data).await.unwrap();

        cache.evict(0, data.len()).await.unwrap();
        cache.evict(0, data.len()).await.unwrap();

        // Reads remap on demand after eviction.
        assert_eq!(cache.read(0, data.len()).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("n.cache"), small_geometry());
        cache.write(0, &[1]).await.unwrap();

        cache.close().await;
        cache.close().await;
        assert!(!cache.is_open().await);
    }

    #[tokio::test]
    async fn test_auto_open_on_read() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("o.cache");
        let data = test_bytes(48, 9);

        let writer = SegmentedCache::with_geometry(&path, small_geometry());
        writer.write(0, &data).await.unwrap();
        writer.flush().await.unwrap();
        writer.close().await;

        let reader = SegmentedCache::with_geometry(&path, small_geometry());
        assert_eq!(reader.read(0, data.len()).await.unwrap(), data);
    }

    #[tokio::test]
    async fn test_open_missing_file_fails() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("p.cache"), small_geometry());
        assert!(matches!(cache.open().await, Err(CacheError::Io(_))));
        assert!(matches!(cache.read(0, 1).await, Err(CacheError::Io(_))));
    }

    #[tokio::test]
    async fn test_read_into() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("q.cache"), small_geometry());
        let data = test_bytes(100, 10);
        cache.write(0, &data).await.unwrap();

        let mut buf = [0u8; 32];
        let copied = cache.read_into(90, &mut buf).await.unwrap();
        assert_eq!(copied, 10);
        assert_eq!(&buf[..10], &data[90..]);

        assert_eq!(cache.read_into(100, &mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_prefetch_then_flush() {
        let dir = tempdir().unwrap();
        let cache = SegmentedCache::with_geometry(dir.path().join("r.cache"), small_geometry());
        let data = test_bytes((SEG * 2) as usize, 11);
        cache.write(0, &data).await.unwrap();

        cache.evict(0, data.len()).await.unwrap();
        cache.prefetch(0, data.len()).await.unwrap();
        cache.flush().await.unwrap();

        assert_eq!(cache.read(0, data.len()).await.unwrap(), data);
    }
}
