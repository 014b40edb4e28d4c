//! Bouncer Gateway - device-integrity edge filter
//!
//! Sits in front of the mobile API and challenges protected auth requests
//! for a device attestation before forwarding them upstream.

use std::sync::Arc;

use bouncer_gateway::{create_router, upstream_router, Config, GatewayState};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Waits for Ctrl+C or SIGTERM (Unix) to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections...");
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bouncer_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let addr = config.socket_addr();

    let Some(upstream_url) = config.upstream_url.clone() else {
        tracing::error!("UPSTREAM_URL must be set");
        std::process::exit(1);
    };

    let state = match GatewayState::from_env(config).await {
        Ok(state) => Arc::new(state),
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise gateway");
            std::process::exit(1);
        }
    };

    let app = create_router(state, upstream_router(upstream_url.clone()));

    tracing::info!("Listening on http://{}", addr);
    tracing::info!(upstream = %upstream_url, "Forwarding to upstream");
    tracing::info!("Protected routes: /v2.5/auth/sign-up, /v2.5/auth/login (phoneNumber)");

    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .unwrap();

    tracing::info!("Gateway shutdown complete");
}
