use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Multipart, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use datastory_core::JobId;
use datastory_infra::Orchestrator;
use datastory_jobs::ErrorCode;

use crate::app::{dto, errors};
use crate::context::UserContext;

pub(crate) fn parse_job_id(id: &str) -> Result<JobId, Response> {
    id.parse().map_err(|_| {
        errors::json_error(StatusCode::NOT_FOUND, ErrorCode::JobNotFound, format!("job not found: {id}"))
    })
}

pub async fn submit_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(user): Extension<UserContext>,
    multipart: Multipart,
) -> Response {
    let upload = match dto::read_upload(multipart, orchestrator.settings().max_upload_bytes).await {
        Ok(u) => u,
        Err(res) => return res,
    };

    match orchestrator.submit(user.user_id(), upload).await {
        Ok(job) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "jobId": job.id,
                "status": job.status,
            })),
        )
            .into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn get_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match orchestrator.status(job_id, user.user_id()).await {
        Ok(view) => (StatusCode::OK, Json(view)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

pub async fn retry_job(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    match orchestrator.retry(job_id, user.user_id()).await {
        Ok(job) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "jobId": job.id,
                "status": job.status,
                "attempts": job.attempts,
            })),
        )
            .into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
