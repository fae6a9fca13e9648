//! kobold - pub/sub message node
//!
//! A TCP node that reads length-prefixed envelopes and hands each decoded
//! message to a handler.

use kobold_server::{Config, Node};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Load configuration (from file if KOBOLD_CONFIG is set, then env overrides)
    let config_path = std::env::var("KOBOLD_CONFIG").ok();
    let config = match Config::load() {
        Ok(c) => {
            if let Some(path) = &config_path {
                tracing::info!("Loaded config from {}", path);
            }
            c
        }
        Err(e) => {
            // An explicitly named config file must load
            if config_path.is_some() {
                tracing::error!("Failed to load config: {}", e);
                return Err(e.into());
            }
            tracing::warn!("Invalid environment overrides ({}), using defaults", e);
            Config::default()
        }
    };

    tracing::info!("Starting kobold node");
    tracing::info!("  Bind address: {}", config.network.bind_addr);
    tracing::info!("  Format: {}", config.protocol.format);
    tracing::info!("  Max message size: {} bytes", config.protocol.max_message_size);
    tracing::info!("  Max connections: {}", config.network.max_connections);
    match config.network.idle_timeout() {
        Some(timeout) => tracing::info!("  Idle timeout: {}s", timeout.as_secs()),
        None => tracing::info!("  Idle timeout: disabled"),
    }

    let node = Arc::new(Node::new(config));

    // Spawn shutdown signal handler
    let shutdown_node = node.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping node...");
        shutdown_node.shutdown();
    });

    // Run node (blocks until shutdown)
    node.run().await?;

    let stats = node.stats();
    tracing::info!(
        "Node stopped ({} connections, {} messages, {} decode errors)",
        stats.connections_total.load(Ordering::Relaxed),
        stats.messages_total.load(Ordering::Relaxed),
        stats.decode_errors_total.load(Ordering::Relaxed)
    );
    Ok(())
}
