//! Reusable buffer pool
//!
//! A process-wide pool of fixed-size byte buffers used to back transient
//! read buffers. The pool grows transparently when exhausted and sheds
//! buffers released while it is already at its target capacity.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;

/// Default buffer size: the 64 KiB wire chunk size used by upload clients
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Default number of preallocated buffers
pub const DEFAULT_POOL_CAPACITY: usize = 64;

/// Pool of fixed-size reusable buffers
pub struct BufferPool {
    buffer_size: usize,
    capacity: usize,
    available: Mutex<Vec<Vec<u8>>>,
    total: AtomicUsize,
}

impl BufferPool {
    /// Create a pool with the default buffer size and capacity
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_BUFFER_SIZE, DEFAULT_POOL_CAPACITY)
    }

    /// Create a pool of `capacity` preallocated buffers of `buffer_size` bytes
    pub fn with_sizes(buffer_size: usize, capacity: usize) -> Self {
        let available = (0..capacity).map(|_| vec![0u8; buffer_size]).collect();
        tracing::info!(
            buffers = capacity,
            buffer_size = buffer_size,
            "Buffer pool initialized"
        );
        Self {
            buffer_size,
            capacity,
            available: Mutex::new(available),
            total: AtomicUsize::new(capacity),
        }
    }

    /// Size in bytes of every buffer handed out by this pool
    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Take a zeroed buffer from the pool, allocating if it is empty
    pub async fn acquire(&self) -> PooledBuffer<'_> {
        let buf = {
            let mut available = self.available.lock().await;
            available.pop()
        };
        let buf = match buf {
            Some(buf) => buf,
            None => {
                let total = self.total.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::debug!(total = total, "Buffer pool exhausted, allocating");
                vec![0u8; self.buffer_size]
            }
        };
        PooledBuffer {
            pool: self,
            buf: Some(buf),
        }
    }

    /// Number of buffers currently available
    pub async fn available(&self) -> usize {
        self.available.lock().await.len()
    }

    /// Total buffers handed out by this pool over its lifetime (in use + free)
    pub fn total(&self) -> usize {
        self.total.load(Ordering::Relaxed)
    }

    /// Return a buffer to the pool
    ///
    /// The buffer is zeroed before it becomes available again. Buffers of
    /// the wrong size, or buffers released while the pool is at capacity,
    /// are dropped.
    async fn release(&self, mut buf: Vec<u8>) {
        if buf.len() != self.buffer_size {
            tracing::warn!(
                expected = self.buffer_size,
                got = buf.len(),
                "Dropping buffer with mismatched size"
            );
            return;
        }
        let mut available = self.available.lock().await;
        if available.len() < self.capacity {
            buf.fill(0);
            available.push(buf);
        }
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

/// A buffer checked out of a [`BufferPool`]
///
/// Call [`release`](Self::release) to return it to the pool; a guard that is
/// simply dropped gives its buffer back to the allocator instead.
pub struct PooledBuffer<'a> {
    pool: &'a BufferPool,
    buf: Option<Vec<u8>>,
}

impl PooledBuffer<'_> {
    /// Return the buffer to its pool
    pub async fn release(mut self) {
        if let Some(buf) = self.buf.take() {
            self.pool.release(buf).await;
        }
    }
}

impl std::ops::Deref for PooledBuffer<'_> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.buf.as_deref().unwrap_or(&[])
    }
}

impl std::ops::DerefMut for PooledBuffer<'_> {
    fn deref_mut(&mut self) -> &mut [u8] {
        self.buf.as_deref_mut().unwrap_or(&mut [])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_acquire_release_cycle() {
        let pool = BufferPool::with_sizes(16, 2);
        assert_eq!(pool.available().await, 2);

        let buf = pool.acquire().await;
        assert_eq!(buf.len(), 16);
        assert_eq!(pool.available().await, 1);

        buf.release().await;
        assert_eq!(pool.available().await, 2);
    }

    #[tokio::test]
    async fn test_grows_on_miss() {
        let pool = BufferPool::with_sizes(8, 1);

        let first = pool.acquire().await;
        let second = pool.acquire().await;
        assert_eq!(second.len(), 8);
        assert_eq!(pool.total(), 2);

        first.release().await;
        second.release().await;
        // Capacity is 1, so the extra buffer is dropped.
        assert_eq!(pool.available().await, 1);
    }

    #[tokio::test]
    async fn test_released_buffers_are_zeroed() {
        let pool = BufferPool::with_sizes(4, 1);

        let mut buf = pool.acquire().await;
        buf.copy_from_slice(&[0xAA; 4]);
        buf.release().await;

        let buf = pool.acquire().await;
        assert_eq!(&buf[..], &[0u8; 4]);
    }
}
