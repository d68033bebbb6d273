//! Settings and mail relay endpoints.

use super::ApiState;
use crate::mail::RelayConfig;
use crate::settings::Settings;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/api/settings", get(get_settings).put(save_settings))
        .route("/api/mail/port", get(mail_port))
        .route("/api/mail/presets/{provider}", get(relay_preset))
}

async fn get_settings(State(service): State<ApiState>) -> Json<Settings> {
    Json(service.settings().await)
}

#[tracing::instrument(skip(service, payload))]
async fn save_settings(
    State(service): State<ApiState>,
    Json(payload): Json<Settings>,
) -> impl IntoResponse {
    match service.save_settings(payload).await {
        Ok(()) => (StatusCode::OK, Json(json!(service.settings().await))),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": format!("Failed to save settings: {e}") })),
        ),
    }
}

async fn mail_port(State(service): State<ApiState>) -> impl IntoResponse {
    Json(json!({ "port": service.mail_port().await }))
}

async fn relay_preset(Path(provider): Path<String>) -> impl IntoResponse {
    match RelayConfig::preset(&provider) {
        Some(config) => (StatusCode::OK, Json(json!(config))),
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "error": format!("Unknown provider '{provider}'") })),
        ),
    }
}
