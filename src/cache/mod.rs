//! Segmented memory-mapped cache storage
//!
//! Each stream's payload lives in a single on-disk file that is mapped into
//! memory in fixed-size segments, created on demand. The cache presents a
//! byte-addressable read/write surface that grows automatically on write and
//! supports lifecycle operations (resize, finalize, flush, prefetch, evict).
//!
//! # Architecture
//!
//! ```text
//!              SegmentedCache
//!        ┌───────────────────────────┐
//!        │ RwLock<CacheInner> {      │
//!        │   file:     Option<File>  │
//!        │   file_size: u64          │
//!        │   segments: index → Mmap  │
//!        │ }                         │
//!        └─────────────┬─────────────┘
//!                      │ map on demand
//!          ┌───────────┼───────────┐
//!          ▼           ▼           ▼
//!      [seg 0]     [seg 1]     [seg N]     (1 GiB each, last may be short)
//!          └───────────┴───────────┘
//!                backing file
//! ```
//!
//! Readers share the lock; anything that can mutate mapping state (writes,
//! resize, open/create, evict, close) is exclusive.

pub mod error;
pub mod pool;
pub mod segmented;

pub use error::CacheError;
pub use pool::{BufferPool, PooledBuffer};
pub use segmented::{CacheGeometry, ReadOp, SegmentedCache, WriteOp, BATCH_OPERATION_LIMIT};
