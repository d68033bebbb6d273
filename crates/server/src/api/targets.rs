//! Target management endpoints.
//!
//! - `GET /` - List targets with their last status
//! - `POST /` - Register a target and start monitoring it
//! - `PUT /{id}` - Update a target and restart its loop
//! - `DELETE /{id}` - Stop monitoring and forget a target
//! - `POST /check` - Probe a target once without storing the result

use super::{ApiState, validation_error};
use crate::targets::Target;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::json;

pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/", get(list_targets).post(add_target))
        .route("/check", post(manual_check))
        .route("/{id}", put(update_target).delete(delete_target))
}

#[tracing::instrument(skip(service))]
async fn list_targets(State(service): State<ApiState>) -> impl IntoResponse {
    Json(service.list_targets().await)
}

#[tracing::instrument(skip(service, payload), fields(name = %payload.name))]
async fn add_target(
    State(service): State<ApiState>,
    Json(payload): Json<Target>,
) -> impl IntoResponse {
    match service.add_target(payload).await {
        Ok(target) => (StatusCode::CREATED, Json(json!(target))),
        Err(e) => validation_error(e),
    }
}

#[tracing::instrument(skip(service, payload))]
async fn update_target(
    State(service): State<ApiState>,
    Path(id): Path<String>,
    Json(mut payload): Json<Target>,
) -> impl IntoResponse {
    payload.id = id;
    match service.update_target(payload).await {
        Ok(target) => (StatusCode::OK, Json(json!(target))),
        Err(e) => validation_error(e),
    }
}

#[tracing::instrument(skip(service))]
async fn delete_target(
    State(service): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match service.delete_target(&id).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "deleted" }))),
        Err(e) => validation_error(e),
    }
}

#[tracing::instrument(skip(service, payload), fields(url = %payload.url))]
async fn manual_check(
    State(service): State<ApiState>,
    Json(payload): Json<Target>,
) -> impl IntoResponse {
    Json(service.manual_check(&payload).await)
}
