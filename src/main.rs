use std::sync::Arc;

use anyhow::{Context, Result};
use insights_backend::{
    build_router,
    config::{AppConfig, StoreBackend},
    state::AppState,
    store::{HttpMetricsStore, InMemoryMetricsStore, MetricsStore},
};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env().context("failed to load application configuration")?;
    let addr = config.address();
    let call_timeout = config.store_timeout;

    let store: Arc<dyn MetricsStore> = match config.store_backend {
        StoreBackend::Http => {
            info!(url = %config.store_url, "store backend: http");
            Arc::new(
                HttpMetricsStore::new(
                    config.store_url,
                    config.store_anon_key,
                    config.store_service_key,
                    call_timeout,
                )
                .context("failed to build the remote store client")?,
            )
        }
        StoreBackend::Memory => {
            info!("store backend: memory");
            Arc::new(InMemoryMetricsStore::new())
        }
    };

    let app = build_router(AppState::new(store, call_timeout));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(address = %addr, "insights backend started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("insights_backend=debug,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "unable to install Ctrl+C signal handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = %err, "unable to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
