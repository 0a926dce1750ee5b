//! Streaming cache server binary

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use streamcache::{CacheServer, RegistryConfig, ServerConfig};

/// Streaming upload/download cache server
#[derive(Debug, Parser)]
#[command(name = "streamcache", version, about)]
struct Args {
    /// Port to listen on
    #[arg(default_value_t = 8080)]
    port: u16,

    /// Advisory WebSocket path announced to clients
    #[arg(default_value = "/audio")]
    path: String,

    /// Directory for stream backing files
    #[arg(long, default_value = "./cache")]
    cache_dir: PathBuf,

    /// Maximum concurrent connections (0 = unlimited)
    #[arg(long, default_value_t = 0)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    tracing::info!(port = args.port, path = %args.path, "Starting cache server");

    let config = ServerConfig::default()
        .bind(SocketAddr::from(([0, 0, 0, 0], args.port)))
        .path(args.path)
        .max_connections(args.max_connections);
    let registry_config = RegistryConfig::default().cache_dir(args.cache_dir);

    let server = CacheServer::with_registry_config(config, registry_config);
    server.run_until(shutdown_signal()).await?;

    tracing::info!("Server shut down");
    Ok(())
}

/// Resolves when SIGINT or SIGTERM arrives
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(error) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %error, "Failed to install SIGINT handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(error) => {
                tracing::error!(error = %error, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
