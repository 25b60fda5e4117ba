//! Authentication gate (§6 "Authentication gate" collaborator).
//!
//! The core assumes the request is already authenticated (§6); this module
//! is the concrete collaborator the binary wires in front of `/scim/v2`:
//! a single service-level API key compared against a Bearer token. Basic
//! auth / OAuth negotiation with the IdP is out of scope (§1).
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::config::AppConfig;
use crate::error::scim_error_response;

pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let provided = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if token == config.auth.api_key => Ok(next.run(request).await),
        _ => {
            let (status, body) = scim_error_response(StatusCode::UNAUTHORIZED, None, "authentication required");
            Err((status, body).into_response())
        }
    }
}
