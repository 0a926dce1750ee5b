//! Registry configuration

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::pool::{DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY};
use crate::cache::CacheGeometry;

/// Configuration for the stream registry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Directory holding the `{stream_id}.cache` backing files
    pub cache_dir: PathBuf,

    /// Streams idle longer than this are removed by the cleanup task
    pub idle_ttl: Duration,

    /// How often the cleanup task scans for idle streams
    pub cleanup_interval: Duration,

    /// Mapping geometry for every stream's cache
    pub geometry: CacheGeometry,

    /// Buffer size of the shared read pool
    pub pool_buffer_size: usize,

    /// Target number of buffers kept by the shared read pool
    pub pool_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("./cache"),
            idle_ttl: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(60),
            geometry: CacheGeometry::default(),
            pool_buffer_size: DEFAULT_BUFFER_SIZE,
            pool_capacity: DEFAULT_POOL_CAPACITY,
        }
    }
}

impl RegistryConfig {
    /// Set the cache directory
    pub fn cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    /// Set the idle TTL
    pub fn idle_ttl(mut self, ttl: Duration) -> Self {
        self.idle_ttl = ttl;
        self
    }

    /// Set the cleanup scan interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the cache mapping geometry
    pub fn geometry(mut self, geometry: CacheGeometry) -> Self {
        self.geometry = geometry;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();

        assert_eq!(config.cache_dir, PathBuf::from("./cache"));
        assert_eq!(config.idle_ttl, Duration::from_secs(86_400));
        assert_eq!(config.cleanup_interval, Duration::from_secs(60));
        assert_eq!(config.pool_buffer_size, 64 * 1024);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .cache_dir("/tmp/sc")
            .idle_ttl(Duration::from_secs(5))
            .cleanup_interval(Duration::from_millis(100))
            .geometry(CacheGeometry::new(1024, 8192));

        assert_eq!(config.cache_dir, PathBuf::from("/tmp/sc"));
        assert_eq!(config.idle_ttl, Duration::from_secs(5));
        assert_eq!(config.cleanup_interval, Duration::from_millis(100));
        assert_eq!(config.geometry.segment_size, 1024);
    }
}
