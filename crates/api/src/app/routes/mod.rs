use axum::{
    Router,
    routing::{get, post},
};

pub mod callbacks;
pub mod jobs;
pub mod quota;
pub mod stories;
pub mod system;

/// Router for all user-authenticated endpoints.
pub fn router() -> Router {
    Router::new()
        .route("/jobs", post(jobs::submit_job))
        .route("/jobs/:id", get(jobs::get_job))
        .route("/jobs/:id/retry", post(jobs::retry_job))
        .route("/stories/:id", get(stories::get_story))
        .route("/me/quota", get(quota::my_quota))
}

/// Router for worker callbacks; authenticated by body signature, not by user.
pub fn callback_router() -> Router {
    Router::new().route("/callbacks/jobs/:id", post(callbacks::job_callback))
}
