//! Throttler switches and on-demand alerts.

use super::{ApiState, relay_error};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Debug, Serialize, Deserialize)]
pub struct Enabled {
    pub enabled: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Cooldown {
    pub minutes: u64,
}

/// `/api/notifications` routes.
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/enabled", get(get_enabled).put(set_enabled))
        .route("/cooldown", get(get_cooldown).put(set_cooldown))
        .route("/cooldowns", delete(clear_cooldowns))
}

/// `/api/alerts` routes.
pub fn alerts_router() -> Router<ApiState> {
    Router::new()
        .route("/test", post(send_test_alert))
        .route("/summary", post(send_down_summary))
}

async fn get_enabled(State(service): State<ApiState>) -> Json<Enabled> {
    Json(Enabled {
        enabled: service.notifications_enabled(),
    })
}

#[tracing::instrument(skip(service))]
async fn set_enabled(
    State(service): State<ApiState>,
    Json(payload): Json<Enabled>,
) -> Json<Enabled> {
    service.set_notifications_enabled(payload.enabled);
    Json(payload)
}

async fn get_cooldown(State(service): State<ApiState>) -> Json<Cooldown> {
    Json(Cooldown {
        minutes: service.cooldown_minutes(),
    })
}

#[tracing::instrument(skip(service))]
async fn set_cooldown(
    State(service): State<ApiState>,
    Json(payload): Json<Cooldown>,
) -> Json<Cooldown> {
    service.set_cooldown(payload.minutes);
    Json(payload)
}

#[tracing::instrument(skip(service))]
async fn clear_cooldowns(State(service): State<ApiState>) -> StatusCode {
    service.clear_cooldowns();
    StatusCode::NO_CONTENT
}

#[tracing::instrument(skip(service))]
async fn send_test_alert(State(service): State<ApiState>) -> impl IntoResponse {
    match service.send_test_alert().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "sent" }))),
        Err(e) => relay_error(e),
    }
}

#[tracing::instrument(skip(service))]
async fn send_down_summary(State(service): State<ApiState>) -> impl IntoResponse {
    Json(json!({ "sent": service.send_down_summary().await }))
}
