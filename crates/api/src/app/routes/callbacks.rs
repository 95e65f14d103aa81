use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use datastory_infra::{Orchestrator, OrchestratorError};
use datastory_jobs::{ErrorCode, TransitionOutcome};

use crate::app::{dto, errors};
use crate::app::routes::jobs::parse_job_id;

/// `POST /callbacks/jobs/{jobId}`. The signature middleware has already
/// checked the raw body by the time this runs.
pub async fn job_callback(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Path(id): Path<String>,
    body: Bytes,
) -> Response {
    let job_id = match parse_job_id(&id) {
        Ok(v) => v,
        Err(res) => return res,
    };

    let body: dto::CallbackBody = match serde_json::from_slice(&body) {
        Ok(b) => b,
        Err(e) => {
            return errors::json_error(
                StatusCode::BAD_REQUEST,
                ErrorCode::InvalidCallback,
                format!("malformed callback body: {e}"),
            );
        }
    };
    let signal = match body.into_signal() {
        Ok(s) => s,
        Err(msg) => return errors::orchestrator_error_to_response(OrchestratorError::InvalidCallback(msg)),
    };

    match orchestrator.handle_callback(job_id, signal).await {
        Ok(outcome) => (
            StatusCode::OK,
            Json(json!({
                "success": true,
                "outcome": outcome_label(&outcome),
            })),
        )
            .into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}

fn outcome_label(outcome: &TransitionOutcome) -> &'static str {
    match outcome {
        TransitionOutcome::Applied => "applied",
        TransitionOutcome::Duplicate => "duplicate",
        TransitionOutcome::Discarded(_) => "discarded",
    }
}
