//! Registry error types

use crate::cache::CacheError;

/// Error type for stream registry operations
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A stream with this id is already registered
    #[error("stream already exists: {0}")]
    StreamExists(String),

    /// No stream with this id in the registry
    #[error("stream not found: {0}")]
    StreamNotFound(String),

    /// Stream id is empty or not usable as a cache file name
    #[error("invalid stream id: {0:?}")]
    InvalidStreamId(String),

    /// Operation requires the stream to be uploading
    #[error("stream {0} is not in uploading state")]
    NotUploading(String),

    /// The cache accepted fewer bytes than the chunk carried
    #[error("short write on stream {stream_id}: {written} of {expected} bytes")]
    ShortWrite {
        stream_id: String,
        written: usize,
        expected: usize,
    },

    /// Read at or past the end of the stream's data
    #[error("end of stream {0}")]
    EndOfStream(String),

    /// Underlying cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),
}
