//! Axum-based HTTP server.

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use serde_json::json;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::api;
use crate::state::GatewayState;

/// Build the gateway router.
///
/// Published audio is served from the configured audio directory under
/// `storage.public_audio_path`, which must not be empty or `/`.
pub fn router(state: Arc<GatewayState>) -> anyhow::Result<Router> {
    let audio_dir = state.config.audio_dir();
    let Some(audio_path) = state.config.audio_prefix() else {
        anyhow::bail!(
            "storage.public_audio_path must be a non-root URL path, got '{}'",
            state.config.storage().public_audio_path
        );
    };

    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/api/upload", post(api::upload))
        .route("/api/questions", post(api::questions))
        .route("/api/submit", post(api::submit));

    #[cfg(feature = "metrics")]
    let app = app.route("/metrics", get(metrics_handler));

    Ok(app
        .nest_service(&audio_path, ServeDir::new(audio_dir))
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes()))
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// Start the gateway HTTP server.
pub async fn start_gateway(state: Arc<GatewayState>, port: u16) -> anyhow::Result<()> {
    let bind_addr = state.config.gateway_bind();
    let app = router(Arc::clone(&state))?;
    std::fs::create_dir_all(state.config.audio_dir())?;

    let addr = format!("{bind_addr}:{port}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Gateway listening on {addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    axum::Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "started_at": state.started_at.to_rfc3339(),
        "uptime_secs": state.uptime_secs(),
    }))
}

#[cfg(feature = "metrics")]
async fn metrics_handler(State(state): State<Arc<GatewayState>>) -> impl IntoResponse {
    match &state.prometheus {
        Some(handle) => (axum::http::StatusCode::OK, handle.render()),
        None => (
            axum::http::StatusCode::NOT_FOUND,
            "metrics recorder not installed".to_string(),
        ),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            error!(error = %e, "Failed to install CTRL+C handler");
            std::future::pending::<()>().await;
        }
    }
}
