//! Arena Shield - resilience and caching layer for calls to external services
//!
//! Runs the observability API over the service caches and upstream guards.

use std::net::SocketAddr;

use anyhow::Context;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use arena_shield::api::{create_router, AppState};
use arena_shield::config::Config;
use arena_shield::tasks::spawn_cleanup_task;

/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Build caches and upstream guards
/// 4. Start background TTL cleanup task
/// 5. Serve the API until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "arena_shield=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Arena Shield");

    let config = Config::from_env();
    info!(
        "Configuration loaded: port={}, meta_cache={}/{}s, deck_cache={}/{}s, persistent_cache={}, cleanup_interval={}s",
        config.server_port,
        config.meta_cache_max_entries,
        config.meta_cache_ttl,
        config.deck_cache_max_entries,
        config.deck_cache_ttl,
        config.persistent_cache_dir.display(),
        config.cleanup_interval
    );

    let state = AppState::from_config(&config).with_context(|| {
        format!(
            "Failed to create persistent cache directory {}",
            config.persistent_cache_dir.display()
        )
    })?;
    info!("Caches and upstream guards initialized");

    let cleanup_handle = spawn_cleanup_task(state.caches.clone(), config.cleanup_interval());
    info!("Background cleanup task started");

    let app = create_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cleanup_handle))
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM, then aborts the cleanup task.
async fn shutdown_signal(cleanup_handle: tokio::task::JoinHandle<()>) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }

    cleanup_handle.abort();
    warn!("Cleanup task aborted");
}
