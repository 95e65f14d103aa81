use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use tracing::{debug, warn};

use datastory_auth::{CallbackSigner, JwtValidator, SIGNATURE_HEADER};
use datastory_infra::Orchestrator;
use datastory_jobs::ErrorCode;

use crate::app::errors::{json_error, orchestrator_error_to_response};
use crate::context::UserContext;

#[derive(Clone)]
pub struct AuthState {
    pub jwt: Arc<dyn JwtValidator>,
    pub orchestrator: Arc<Orchestrator>,
}

/// Authenticate the bearer token and provision the caller's owner record.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let token = extract_bearer(req.headers()).ok_or_else(unauthenticated)?;

    let claims = state.jwt.validate(token, Utc::now()).map_err(|e| {
        debug!(error = %e, "rejected bearer token");
        unauthenticated()
    })?;

    state
        .orchestrator
        .ensure_account(claims.sub, claims.tier)
        .await
        .map_err(orchestrator_error_to_response)?;

    req.extensions_mut()
        .insert(UserContext::new(claims.sub, claims.tier));

    Ok(next.run(req).await)
}

#[derive(Clone)]
pub struct CallbackState {
    pub signer: Arc<CallbackSigner>,
    /// Largest callback body accepted before the signature is checked.
    pub max_body_bytes: usize,
}

/// Verify the worker's HMAC signature over the request path and raw body
/// before any handler sees the request.
pub async fn callback_signature_middleware(
    State(state): State<CallbackState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, state.max_body_bytes)
        .await
        .map_err(|_| {
            json_error(
                StatusCode::PAYLOAD_TOO_LARGE,
                ErrorCode::InvalidCallback,
                "callback body too large",
            )
        })?;

    let signature = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());
    if let Err(e) = state.signer.verify(signature, parts.uri.path(), &bytes) {
        warn!(path = %parts.uri.path(), error = %e, "rejected unsigned callback");
        return Err(json_error(
            StatusCode::UNAUTHORIZED,
            ErrorCode::Unauthenticated,
            "invalid callback signature",
        ));
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

fn unauthenticated() -> Response {
    json_error(
        StatusCode::UNAUTHORIZED,
        ErrorCode::Unauthenticated,
        "missing or invalid bearer token",
    )
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let header = headers.get(axum::http::header::AUTHORIZATION)?;
    let header = header.to_str().ok()?;
    let token = header.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        return None;
    }
    Some(token)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(value).unwrap(),
        );
        headers
    }

    #[test]
    fn bearer_token_is_extracted() {
        assert_eq!(extract_bearer(&headers("Bearer abc.def")), Some("abc.def"));
        assert_eq!(extract_bearer(&headers("Bearer   ")), None);
        assert_eq!(extract_bearer(&headers("Basic abc")), None);
        assert_eq!(extract_bearer(&HeaderMap::new()), None);
    }
}
