// REST API endpoints for the job orchestrator

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::db::JobRecord;
use crate::orchestrator::{
    JobAccepted, JobCancelled, JobDeleted, JobDetail, JobError, JobOrchestrator, JobRequest,
};
use crate::types::JobId;

pub type AppState = Arc<JobOrchestrator>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/jobs", post(create_job).get(list_jobs))
        .route("/jobs/{id}", get(get_job).delete(delete_job))
        .route("/jobs/{id}/cancel", post(cancel_job))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

impl IntoResponse for JobError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (self.status_code(), body).into_response()
    }
}

async fn health_check() -> Result<Json<Value>, StatusCode> {
    Ok(Json(serde_json::json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

async fn create_job(
    State(state): State<AppState>,
    Json(request): Json<JobRequest>,
) -> Result<(StatusCode, Json<JobAccepted>), JobError> {
    let accepted = state.create_job(request).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

async fn list_jobs(State(state): State<AppState>) -> Result<Json<Value>, JobError> {
    let jobs: Vec<JobRecord> = state.list_jobs().await?;
    Ok(Json(serde_json::json!({
        "jobs": jobs,
        "count": jobs.len()
    })))
}

async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDetail>, JobError> {
    Ok(Json(state.get_job_detail(&JobId::new(id)).await?))
}

async fn cancel_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobCancelled>, JobError> {
    Ok(Json(state.cancel_job(&JobId::new(id)).await?))
}

async fn delete_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<JobDeleted>, JobError> {
    Ok(Json(state.delete_job(&JobId::new(id)).await?))
}
