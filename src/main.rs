//! PulseDB - An In-Memory Key-Value Server
//!
//! This is the main entry point for the PulseDB server.
//! It replays the AOF, starts the background workers, and accepts connections
//! until Ctrl+C.

use anyhow::Context;
use clap::Parser;
use pulsedb::commands::CommandHandler;
use pulsedb::config::Config;
use pulsedb::connection::{handle_connection, ConnectionStats};
use pulsedb::persistence::{self, AofWriter};
use pulsedb::storage::{SnapshotWorker, StorageEngine};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn print_banner(config: &Config) {
    println!(
        r#"
PulseDB v{} - In-Memory Key-Value Server
──────────────────────────────────────────────────────────────
Listening on   {}
AOF            {}
Snapshot       {}

Use Ctrl+C to shutdown gracefully.
"#,
        pulsedb::VERSION,
        config.bind_address(),
        config.aof_path.display(),
        config.snapshot_path.display(),
    );
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "debug" } else { "info" }));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.verbose);

    // Create the storage engine (shared across all connections)
    let storage = Arc::new(StorageEngine::new());

    // Rebuild state before anything can write to the journal
    let replayed = persistence::recover(&config.aof_path, &CommandHandler::new(Arc::clone(&storage)))
        .await
        .with_context(|| format!("failed to recover from {}", config.aof_path.display()))?;
    info!(records = replayed, keys = storage.len(), "Recovery complete");

    let aof_config = config.aof_config();
    let (aof_sender, aof_rx) = persistence::aof::channel(aof_config.queue_capacity, aof_config.overflow);
    let aof_writer = AofWriter::start(aof_rx, &aof_config);

    let snapshot_worker = SnapshotWorker::start(Arc::clone(&storage), config.snapshot_config());

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address())
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address()))?;
    print_banner(&config);
    info!("Listening on {}", config.bind_address());

    let handler = CommandHandler::new(storage).with_aof(aof_sender.clone());

    // Set up graceful shutdown
    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, handler, Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    snapshot_worker.stop();
    aof_writer.shutdown().await;

    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        failed = stats.commands_failed.load(Ordering::Relaxed),
        aof_dropped = aof_sender.dropped(),
        "Server shutdown complete"
    );
    Ok(())
}

/// Main loop that accepts incoming connections
async fn accept_loop(listener: TcpListener, handler: CommandHandler, stats: Arc<ConnectionStats>) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let handler = handler.clone();
                let stats = Arc::clone(&stats);

                // Spawn a task to handle this connection
                tokio::spawn(async move {
                    handle_connection(stream, addr, handler, stats).await;
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
