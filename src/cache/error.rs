//! Cache error types

use std::path::PathBuf;

/// Error type for segmented cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Operation would exceed the maximum cache size
    #[error("operation exceeds maximum cache size: offset {offset} + length {length} > {max}")]
    SizeLimitExceeded { offset: u64, length: u64, max: u64 },

    /// Batch contains more operations than the batch limit allows
    #[error("batch operation limit exceeded: {0} operations")]
    BatchLimitExceeded(usize),

    /// Operation requires an open backing file
    #[error("cache file not open: {0}")]
    NotOpen(PathBuf),

    /// Underlying file or mapping failure
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
