use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Map, Value, json};
use tracing::error;

use datastory_infra::OrchestratorError;
use datastory_jobs::{ErrorCode, TransitionError};
use datastory_quota::QuotaError;

pub fn json_error(status: StatusCode, code: ErrorCode, message: impl Into<String>) -> Response {
    json_error_with(status, code, message, Map::new())
}

/// Error body with extra machine-readable fields next to `error` and `message`.
pub fn json_error_with(
    status: StatusCode,
    code: ErrorCode,
    message: impl Into<String>,
    details: Map<String, Value>,
) -> Response {
    let mut body = Map::new();
    body.insert("error".to_string(), Value::from(code.as_str()));
    body.insert("message".to_string(), Value::from(message.into()));
    body.extend(details);
    (status, axum::Json(Value::Object(body))).into_response()
}

fn details(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

pub fn orchestrator_error_to_response(err: OrchestratorError) -> Response {
    let code = err.code();
    let message = err.to_string();
    match err {
        OrchestratorError::InvalidFileType(_)
        | OrchestratorError::UnreadableDataset(_)
        | OrchestratorError::InvalidCallback(_) => json_error(StatusCode::BAD_REQUEST, code, message),
        OrchestratorError::FileTooLarge { size, limit } => json_error_with(
            StatusCode::BAD_REQUEST,
            code,
            message,
            details(json!({ "size": size, "limit": limit })),
        ),
        OrchestratorError::Quota(QuotaError::RowLimitExceeded { rows, limit }) => json_error_with(
            StatusCode::BAD_REQUEST,
            code,
            message,
            details(json!({ "rows": rows, "limit": limit })),
        ),
        OrchestratorError::Quota(QuotaError::QuotaExceeded {
            used,
            limit,
            reset_at,
        }) => json_error_with(
            StatusCode::FORBIDDEN,
            code,
            message,
            details(json!({ "used": used, "limit": limit, "periodResetAt": reset_at })),
        ),
        OrchestratorError::JobNotFound(_) | OrchestratorError::StoryNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, code, message)
        }
        OrchestratorError::Forbidden => json_error(StatusCode::FORBIDDEN, code, message),
        OrchestratorError::Transition(TransitionError::MaxRetriesExceeded {
            attempts,
            max_attempts,
        }) => json_error_with(
            StatusCode::BAD_REQUEST,
            code,
            message,
            details(json!({ "attempts": attempts, "maxAttempts": max_attempts })),
        ),
        OrchestratorError::Transition(TransitionError::InvalidProgress(_)) => {
            json_error(StatusCode::BAD_REQUEST, code, message)
        }
        OrchestratorError::Transition(
            TransitionError::Inconsistent { .. } | TransitionError::NotRetryable { .. },
        ) => json_error(StatusCode::CONFLICT, code, message),
        OrchestratorError::Quota(_) | OrchestratorError::Storage(_) | OrchestratorError::Internal(_) => {
            error!(code = %code, error = %message, "request failed");
            json_error(StatusCode::INTERNAL_SERVER_ERROR, code, "internal error")
        }
    }
}
