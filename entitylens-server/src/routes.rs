//! REST API routes.
//!
//! `POST /api/search` is synchronous up to job submission only; research
//! itself runs in the worker and is observed via the status endpoint.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use entitylens_core::error::{DispatchError, EntityLensError};
use entitylens_core::types::EntityType;
use entitylens_research::dispatch::{SearchService, TaskPoll, ValidationTasks};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::error;
use uuid::Uuid;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<SearchService>,
    pub tasks: Arc<ValidationTasks>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/search", post(search_handler))
        .route("/api/research/status/{job_id}", get(job_status_handler))
        .route("/api/validate_query", post(validate_submit_handler))
        .route("/api/validate_query/{task_id}", get(validate_poll_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct SearchRequest {
    pub query: String,
    #[serde(default = "default_entity_type")]
    pub entity_type: EntityType,
}

fn default_entity_type() -> EntityType {
    EntityType::Company
}

async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn search_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Response {
    match state.service.search(&req.query, req.entity_type).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn job_status_handler(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Response {
    match state.service.get_job_status(&job_id).await {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn validate_submit_handler(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Response {
    let task_id = state.tasks.submit(&req.query, req.entity_type);
    let body = json!({
        "task_id": task_id.to_string(),
        "status": "processing",
    });
    (StatusCode::ACCEPTED, Json(body)).into_response()
}

async fn validate_poll_handler(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
) -> Response {
    let id = match Uuid::parse_str(&task_id) {
        Ok(id) => id,
        Err(_) => {
            let body = json!({ "error": format!("Invalid task id: {task_id}") });
            return (StatusCode::BAD_REQUEST, Json(body)).into_response();
        }
    };
    match state.tasks.poll(id) {
        Ok(TaskPoll::Pending) => {
            (StatusCode::OK, Json(json!({ "status": "processing" }))).into_response()
        }
        Ok(TaskPoll::Resolved(result)) => {
            let body = json!({ "status": "completed", "result": result });
            (StatusCode::OK, Json(body)).into_response()
        }
        Err(e) => error_response(e.into()),
    }
}

fn error_response(e: EntityLensError) -> Response {
    let status = match &e {
        EntityLensError::Dispatch(DispatchError::InvalidJobId { .. }) => StatusCode::BAD_REQUEST,
        EntityLensError::Dispatch(DispatchError::JobNotFound { .. })
        | EntityLensError::Dispatch(DispatchError::TaskNotFound { .. }) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!(error = %e, "Request failed");
    }
    (status, Json(json!({ "error": e.to_string() }))).into_response()
}
