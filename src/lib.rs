//! # streamcache
//!
//! Server core of a streaming upload/download cache. Clients push opaque
//! binary payloads over a WebSocket connection, the server lands every chunk
//! in a memory-mapped backing file, and any connection can read back
//! arbitrary byte ranges — including while the upload is still in flight.
//!
//! The crate is organized along its dependency order:
//!
//! - [`cache`] — segmented memory-mapped files and the shared buffer pool
//! - [`registry`] — stream lifecycle, id uniqueness, idle eviction
//! - [`protocol`] — JSON control messages and the dispatch state machine
//! - [`server`] — TCP accept loop, WebSocket upgrade, connection pumps
//!
//! # Example
//!
//! ```no_run
//! use streamcache::{CacheServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> streamcache::Result<()> {
//!     let server = CacheServer::new(ServerConfig::default());
//!     server.run().await
//! }
//! ```

pub mod cache;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod server;

pub use cache::{BufferPool, CacheGeometry, SegmentedCache};
pub use error::{Error, Result};
pub use protocol::{ControlMessage, MessageDispatcher, MessageType, OutboundFrame};
pub use registry::{RegistryConfig, StreamRegistry, StreamStatus};
pub use server::{CacheServer, ServerConfig};
