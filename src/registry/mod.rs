//! Stream registry
//!
//! The registry owns every live stream and arbitrates id uniqueness, write
//! serialization per stream, and read concurrency.
//!
//! # Architecture
//!
//! ```text
//!                       Arc<StreamRegistry>
//!                  ┌────────────────────────────┐
//!                  │ streams: HashMap<String,   │
//!                  │   Arc<StreamContext> {     │
//!                  │     cache: SegmentedCache, │
//!                  │     meta:  Mutex<Meta>,    │
//!                  │   }                        │
//!                  │ >                          │
//!                  └─────────────┬──────────────┘
//!                                │
//!            ┌───────────────────┼───────────────────┐
//!            ▼                   ▼                   ▼
//!      write_chunk()        read_chunk()       cleanup task
//!      (owning conn)        (any conn)         (idle eviction)
//! ```
//!
//! Appends on one stream serialize through its context mutex; reads go
//! through the cache's shared lock and may run concurrently with each other.
//! Lock order is registry → context → cache, never the reverse.

pub mod config;
pub mod context;
pub mod error;
pub mod store;

pub use config::RegistryConfig;
pub use context::{StreamContext, StreamInfo, StreamStatus};
pub use error::RegistryError;
pub use store::StreamRegistry;
