// ABOUTME: gambit server - exposes one supervised UCI engine to many clients
// ABOUTME: Wires configuration, the engine supervisor, and the HTTP/WebSocket listener

pub mod config;
pub mod server;
pub mod session;

pub use config::Config;
pub use server::{build_router, serve, AppState, EngineList, Health, SetEngineResponse};

use anyhow::{Context, Result};
use gambit_core::{Broadcaster, DirectoryDiscovery, EngineSupervisor};
use std::sync::Arc;
use tokio::signal;
use tracing::info;

/// Run the server until Ctrl+C or SIGTERM, then stop the active engine.
pub async fn run(config: Config) -> Result<()> {
    info!("Starting gambit server");
    info!("  Engines directory: {}", config.engines.dir.display());
    info!("  Listen address: {}", config.bind_addr());

    let supervisor = EngineSupervisor::start(
        Arc::new(DirectoryDiscovery::new(&config.engines.dir)),
        Arc::new(Broadcaster::new()),
        config.supervisor_config(),
    )
    .await;

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("binding {}", config.bind_addr()))?;
    info!(addr = %listener.local_addr()?, "Listening");

    let state = AppState {
        supervisor: Arc::clone(&supervisor),
        client_queue: config.supervisor.client_queue,
    };
    let served = serve(listener, state, shutdown_signal())
        .await
        .context("running HTTP server");

    supervisor.shutdown().await;
    info!("Server shut down gracefully");
    served
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        }
    }
}
