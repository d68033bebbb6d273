//! HTTP JSON surface for the front-end.
//!
//! This module is organized into submodules:
//! - `targets` - Target management and manual checks (/api/targets/*)
//! - `notifications` - Throttler switches and alert triggers (/api/notifications/*, /api/alerts/*)
//! - `settings` - User settings and mail relay info (/api/settings, /api/mail/*)
//! - `health` - Health check endpoint (/healthz)

pub mod health;
pub mod notifications;
pub mod settings;
pub mod targets;

use crate::config::ApiConfig;
use crate::error::{RelayError, ValidationError};
use crate::service::MonitorService;
use axum::http::StatusCode;
use axum::{Json, Router, routing::get};
use serde_json::{Value, json};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Shared state of every handler.
pub type ApiState = Arc<MonitorService>;

/// Builds the full router with its middleware.
pub fn router(service: ApiState) -> Router {
    Router::new()
        .nest("/api/targets", targets::router())
        .nest("/api/notifications", notifications::router())
        .nest("/api/alerts", notifications::alerts_router())
        .merge(settings::router())
        .route("/healthz", get(health::health))
        .with_state(service)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Serves the API until `shutdown` resolves.
#[tracing::instrument(skip(service, shutdown))]
pub async fn start_webserver(
    service: ApiState,
    config: &ApiConfig,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> color_eyre::Result<()> {
    let addr = SocketAddr::new(config.host, config.port);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        name = "api.listening",
        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
        addr = %addr,
        message = "API server running"
    );

    axum::serve(listener, router(service))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| color_eyre::Report::msg(format!("Failed to start server: {e}")))?;

    Ok(())
}

pub(crate) fn validation_error(e: ValidationError) -> (StatusCode, Json<Value>) {
    let status = match e {
        ValidationError::UnknownTarget(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::BAD_REQUEST,
    };
    (status, Json(json!({ "error": e.to_string() })))
}

pub(crate) fn relay_error(e: RelayError) -> (StatusCode, Json<Value>) {
    let status = if e.is_configuration() {
        StatusCode::BAD_REQUEST
    } else {
        StatusCode::BAD_GATEWAY
    };
    (status, Json(json!({ "error": e.to_string() })))
}
