//! Cache server listener
//!
//! Handles the TCP accept loop and spawns connection handlers.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;

use crate::error::Result;
use crate::protocol::MessageDispatcher;
use crate::registry::{RegistryConfig, StreamRegistry};
use crate::server::config::ServerConfig;
use crate::server::connection::Connection;

/// Streaming cache server
pub struct CacheServer {
    config: ServerConfig,
    registry: Arc<StreamRegistry>,
    dispatcher: Arc<MessageDispatcher>,
    connection_semaphore: Option<Arc<Semaphore>>,
}

impl CacheServer {
    /// Create a new server with the given configuration
    pub fn new(config: ServerConfig) -> Self {
        Self::with_registry_config(config, RegistryConfig::default())
    }

    /// Create a new server with custom registry configuration
    pub fn with_registry_config(config: ServerConfig, registry_config: RegistryConfig) -> Self {
        let connection_semaphore = if config.max_connections > 0 {
            Some(Arc::new(Semaphore::new(config.max_connections)))
        } else {
            None
        };

        let registry = Arc::new(StreamRegistry::with_config(registry_config));
        let dispatcher = Arc::new(MessageDispatcher::new(Arc::clone(&registry)));

        Self {
            config,
            registry,
            dispatcher,
            connection_semaphore,
        }
    }

    /// Get a reference to the stream registry
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    /// Get the bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }

    /// Run the server
    ///
    /// This method blocks until the server is shut down.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run the server with graceful shutdown
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already-bound listener
    ///
    /// Binding is the caller's problem, which also makes it the test entry
    /// point (bind port 0, read `local_addr`).
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: std::future::Future<Output = ()>,
    {
        tracing::info!(
            addr = %listener.local_addr()?,
            path = %self.config.path,
            "Cache server listening"
        );

        // Spawn idle-stream eviction for the registry
        let cleanup_handle = self.registry.spawn_cleanup_task();

        let result = tokio::select! {
            _ = shutdown => {
                tracing::info!("Shutdown signal received");
                Ok(())
            }
            result = self.accept_loop(&listener) => result,
        };

        cleanup_handle.abort();

        result
    }

    async fn accept_loop(&self, listener: &TcpListener) -> Result<()> {
        loop {
            match listener.accept().await {
                Ok((socket, peer_addr)) => {
                    self.handle_connection(socket, peer_addr);
                }
                Err(error) => {
                    tracing::error!(error = %error, "Failed to accept connection");
                }
            }
        }
    }

    fn handle_connection(&self, socket: TcpStream, peer_addr: SocketAddr) {
        // Check connection limit
        let permit = if let Some(ref sem) = self.connection_semaphore {
            match sem.clone().try_acquire_owned() {
                Ok(permit) => Some(permit),
                Err(_) => {
                    tracing::warn!(peer = %peer_addr, "Connection rejected: limit reached");
                    return;
                }
            }
        } else {
            None
        };

        if self.config.tcp_nodelay {
            if let Err(error) = socket.set_nodelay(true) {
                tracing::debug!(peer = %peer_addr, error = %error, "Failed to set TCP_NODELAY");
            }
        }

        // The remote endpoint is the connection's stable id
        let connection_id = peer_addr.to_string();
        let connection = Connection::new(
            connection_id.clone(),
            Arc::clone(&self.dispatcher),
            self.config.outbound_queue_depth,
        );

        tokio::spawn(async move {
            let _permit = permit;

            if let Err(error) = connection.run(socket).await {
                tracing::debug!(
                    conn = %connection_id,
                    error = %error,
                    "Connection error"
                );
            }
        });
    }
}
