//! Telnet Chat Server - Entry Point
//!
//! Loads configuration, binds the listener and runs the ChatServer until
//! Ctrl+C.

use std::env;

use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use telnet_chat::{ChatServer, Config};

/// Environment variable naming an optional JSON config file
const CONFIG_ENV: &str = "TELNET_CHAT_CONFIG";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG env var to control log level
    // e.g., RUST_LOG=debug or RUST_LOG=telnet_chat=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("telnet_chat=info")),
        )
        .init();

    let mut config = match env::var(CONFIG_ENV) {
        Ok(path) => {
            info!("Loading configuration from {}", path);
            Config::from_file(&path)?
        }
        Err(_) => Config::default(),
    };

    // Bind address from command line overrides the config
    if let Some(addr) = env::args().nth(1) {
        config.bind_addr = addr;
    }
    config.validate()?;

    let listener = TcpListener::bind(&config.bind_addr).await?;
    let port = listener.local_addr()?.port();
    info!("Telnet chat server listening on {}", config.bind_addr);
    info!("Users can connect via: telnet localhost {}", port);

    let server = ChatServer::new(config);
    let handle = server.handle();

    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {}", e);
            return;
        }
        info!("Shutting down server...");
        handle.shutdown().await;
    });

    server.serve(listener).await?;
    Ok(())
}
