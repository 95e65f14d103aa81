use std::sync::Arc;

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use datastory_infra::Orchestrator;

use crate::app::errors;
use crate::context::UserContext;

pub async fn my_quota(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(user): Extension<UserContext>,
) -> Response {
    match orchestrator.quota(user.user_id()).await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
