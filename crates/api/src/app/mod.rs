//! HTTP API application wiring (Axum router + service wiring).
//!
//! - `services.rs`: stores, object storage and worker client behind one orchestrator
//! - `routes/`: HTTP routes + handlers (one file per resource)
//! - `dto.rs`: upload and callback body parsing
//! - `errors.rs`: consistent error responses

use std::sync::Arc;

use anyhow::Context;
use axum::{Extension, Router, extract::DefaultBodyLimit, routing::get};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use datastory_auth::{CallbackSigner, Hs256JwtValidator};
use datastory_infra::{AppConfig, Orchestrator};

use crate::middleware;

pub mod dto;
pub mod errors;
pub mod routes;
pub mod services;

/// Room for multipart framing and the `options` part on top of the file.
const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// Completion payloads carry charts and statistics; cap them separately.
const CALLBACK_BODY_LIMIT: usize = 16 * 1024 * 1024;

/// Build the full HTTP router around an already wired orchestrator.
pub fn build_app(config: &AppConfig, orchestrator: Arc<Orchestrator>) -> anyhow::Result<Router> {
    let jwt = Arc::new(Hs256JwtValidator::new(config.jwt_secret.as_bytes()));
    let auth_state = middleware::AuthState {
        jwt,
        orchestrator: orchestrator.clone(),
    };

    let signer = CallbackSigner::new(config.callback_secret.as_bytes()).context("invalid CALLBACK_SECRET")?;
    let callback_state = middleware::CallbackState {
        signer: Arc::new(signer),
        max_body_bytes: CALLBACK_BODY_LIMIT,
    };

    let upload_limit = usize::try_from(orchestrator.settings().max_upload_bytes)
        .unwrap_or(usize::MAX)
        .saturating_add(MULTIPART_OVERHEAD);

    // User routes: bearer token + provisioned owner record.
    let protected = routes::router()
        .layer(DefaultBodyLimit::max(upload_limit))
        .layer(axum::middleware::from_fn_with_state(
            auth_state,
            middleware::auth_middleware,
        ));

    // Worker routes: signed body, no user.
    let callbacks = routes::callback_router()
        .layer(DefaultBodyLimit::max(CALLBACK_BODY_LIMIT))
        .layer(axum::middleware::from_fn_with_state(
            callback_state,
            middleware::callback_signature_middleware,
        ));

    Ok(Router::new()
        .route("/health", get(routes::system::health))
        .merge(protected)
        .merge(callbacks)
        .layer(Extension(orchestrator))
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http())))
}
