//! Freemius SSO Gateway
//!
//! Single-binary Rust service that:
//! 1. Loads store credentials and the local user file
//! 2. Builds the authentication pipeline (local password check, then the
//!    Freemius login mediator)
//! 3. Serves login, logout and session endpoints over HTTP

mod config;
mod error;
mod local_auth;
mod metrics;
mod routes;
mod session;

use anyhow::{Context, Result};
use freemius_api::HttpIdentityClient;
use sso::{AuthPipeline, LoginMediator};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use user_store::{FileUserStore, UserStore};

use crate::config::Config;
use crate::local_auth::{LOCAL_PASSWORD_PRIORITY, LocalPasswordCheck};
use crate::routes::AppState;
use crate::session::SessionStore;

/// How long in-flight requests may run after a shutdown signal
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and LOG_LEVEL / RUST_LOG support
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_env("LOG_LEVEL")
                .or_else(|_| EnvFilter::try_from_default_env())
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("starting sso-gateway");

    // Install Prometheus metrics recorder before any metrics are emitted
    let prometheus_handle =
        metrics::install_recorder().context("failed to install Prometheus recorder")?;

    // CLI: simple --config flag parsing
    let args: Vec<String> = std::env::args().collect();
    let cli_config_path = args
        .iter()
        .position(|a| a == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str());

    let config_path = Config::resolve_path(cli_config_path);
    info!(path = %config_path.display(), "loading configuration");

    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        listen_addr = %config.server.listen_addr,
        store_id = config.freemius.store_id,
        use_local_api = config.freemius.use_local_api,
        users_path = %config.users.path.display(),
        "configuration loaded"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.freemius.timeout_secs))
        .build()
        .context("failed to build HTTP client")?;
    let mut client = HttpIdentityClient::new(http, config.freemius.api_credentials()?);
    if let Some(ref root) = config.freemius.api_root {
        client = client.with_api_root(root);
    }
    info!(login_url = client.login_url(), "identity client ready");

    let file_store = FileUserStore::load(config.users.path.clone())
        .await
        .with_context(|| format!("failed to load users from {}", config.users.path.display()))?;
    info!(users = file_store.len().await, "user store loaded");
    let store: Arc<dyn UserStore> = Arc::new(file_store);

    let mediator = Arc::new(LoginMediator::new(Arc::new(client), store.clone()));
    let mut pipeline = AuthPipeline::new();
    pipeline.add_authenticate(
        LOCAL_PASSWORD_PRIORITY,
        Arc::new(LocalPasswordCheck::new(store.clone())),
    );
    mediator.register(&mut pipeline);
    info!(
        authenticate_hooks = pipeline.authenticate_hook_count(),
        logout_hooks = pipeline.logout_hook_count(),
        "authentication pipeline built"
    );

    let app_state = AppState {
        pipeline: Arc::new(pipeline),
        mediator,
        store,
        sessions: Arc::new(SessionStore::new(Duration::from_secs(
            config.server.session_ttl_secs,
        ))),
        prometheus: prometheus_handle,
        started_at: Instant::now(),
    };

    let app = routes::build_router(app_state, config.server.max_connections);

    let listen_addr = config.server.listen_addr;
    let listener = TcpListener::bind(listen_addr)
        .await
        .with_context(|| format!("failed to bind to {listen_addr}"))?;
    info!(addr = %listen_addr, "accepting requests");

    // The drain timeout starts when the shutdown signal fires, not when the
    // server starts.
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    let server_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
    });

    shutdown_signal().await;
    let _ = shutdown_tx.send(());

    match tokio::time::timeout(DRAIN_TIMEOUT, server_handle).await {
        Ok(Ok(Ok(()))) => {
            info!("all in-flight requests drained");
        }
        Ok(Ok(Err(e))) => {
            error!(error = %e, "server error during shutdown");
        }
        Ok(Err(e)) => {
            error!(error = %e, "server task panicked");
        }
        Err(_) => {
            warn!(
                drain_timeout_secs = DRAIN_TIMEOUT.as_secs(),
                "drain timeout exceeded, forcing shutdown"
            );
        }
    }

    info!("shutdown complete");
    Ok(())
}

/// Wait for SIGTERM or SIGINT for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received SIGINT, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
