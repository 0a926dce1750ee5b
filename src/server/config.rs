//! Server configuration

use std::net::SocketAddr;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind_addr: SocketAddr,

    /// Advisory WebSocket path announced to clients
    ///
    /// Routing metadata only; upgrades are accepted on any path.
    pub path: String,

    /// Maximum concurrent connections (0 = unlimited)
    pub max_connections: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm)
    pub tcp_nodelay: bool,

    /// Depth of each connection's outbound frame queue
    pub outbound_queue_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            path: "/audio".to_string(),
            max_connections: 0, // Unlimited
            tcp_nodelay: true,
            outbound_queue_depth: 64,
        }
    }
}

impl ServerConfig {
    /// Create a new config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the advisory path
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set maximum connections
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Set the outbound queue depth
    pub fn outbound_queue_depth(mut self, depth: usize) -> Self {
        self.outbound_queue_depth = depth.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.path, "/audio");
        assert_eq!(config.max_connections, 0);
        assert!(config.tcp_nodelay);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:9000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .path("/blobs")
            .max_connections(50)
            .outbound_queue_depth(8);

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.path, "/blobs");
        assert_eq!(config.max_connections, 50);
        assert_eq!(config.outbound_queue_depth, 8);
    }

    #[test]
    fn test_queue_depth_floor() {
        let config = ServerConfig::default().outbound_queue_depth(0);
        assert_eq!(config.outbound_queue_depth, 1);
    }
}
