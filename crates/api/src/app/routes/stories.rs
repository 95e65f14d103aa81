use std::sync::Arc;

use axum::{
    Json,
    extract::{Extension, Path},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use datastory_core::StoryId;
use datastory_infra::Orchestrator;
use datastory_jobs::ErrorCode;

use crate::app::errors;
use crate::context::UserContext;

pub async fn get_story(
    Extension(orchestrator): Extension<Arc<Orchestrator>>,
    Extension(user): Extension<UserContext>,
    Path(id): Path<String>,
) -> Response {
    let story_id: StoryId = match id.parse() {
        Ok(v) => v,
        Err(_) => {
            return errors::json_error(
                StatusCode::NOT_FOUND,
                ErrorCode::StoryNotFound,
                format!("story not found: {id}"),
            );
        }
    };

    match orchestrator.story(story_id, user.user_id()).await {
        Ok(story) => (StatusCode::OK, Json(story)).into_response(),
        Err(e) => errors::orchestrator_error_to_response(e),
    }
}
