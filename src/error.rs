//! Crate-level error type for the server layer

use crate::cache::CacheError;
use crate::registry::RegistryError;

/// Error type spanning the server's subsystems
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Socket or filesystem failure
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// WebSocket protocol failure
    #[error(transparent)]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Cache failure
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Registry failure
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Convenience alias used throughout the server layer
pub type Result<T> = std::result::Result<T, Error>;
