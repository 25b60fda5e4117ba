use axum::{http::StatusCode, Json};
use serde_json::json;
use std::fmt;

/// Application-wide error type.
///
/// Variants map onto the SCIM error taxonomy of the request processor
/// (validation, not-found, conflict, forbidden, invariant violation,
/// upstream directory-tool failure) rather than onto the underlying Rust
/// error types, so a single `to_response` can render every failure as a
/// SCIM Error envelope.
#[derive(Debug)]
pub enum AppError {
    /// 400 — missing/empty required field, malformed PATCH body.
    Validation(String),
    /// 404 — id not present in the cache.
    NotFound(String),
    /// 409 — duplicate sAMAccountName.
    Conflict(String),
    /// Directory-tool failure, pre-classified into (status, scimType, detail).
    Upstream {
        status: StatusCode,
        scim_type: Option<&'static str>,
        detail: String,
    },
    /// 500 — cache row missing both objectGUID and sAMAccountName, or other
    /// broken invariant.
    Invariant(String),
    /// 500 — cache I/O failure. Distinct from `Invariant` only for logging.
    Cache(sqlx::Error),
    /// 500 — config file missing/malformed.
    Configuration(String),
    Serialization(serde_json::Error),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "validation error: {}", e),
            AppError::NotFound(e) => write!(f, "not found: {}", e),
            AppError::Conflict(e) => write!(f, "conflict: {}", e),
            AppError::Upstream { detail, .. } => write!(f, "directory tool error: {}", detail),
            AppError::Invariant(e) => write!(f, "invariant violation: {}", e),
            AppError::Cache(e) => write!(f, "cache error: {}", e),
            AppError::Configuration(e) => write!(f, "configuration error: {}", e),
            AppError::Serialization(e) => write!(f, "serialization error: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Cache(e) => Some(e),
            AppError::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Cache(err)
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err)
    }
}

pub type AppResult<T> = Result<T, AppError>;

/// SCIM 2.0 standard error response helper (§4.H Error envelope).
pub fn scim_error_response(
    status: StatusCode,
    scim_type: Option<&str>,
    detail: &str,
) -> (StatusCode, Json<serde_json::Value>) {
    let mut body = json!({
        "schemas": ["urn:ietf:params:scim:api:messages:2.0:Error"],
        "detail": detail,
        "status": status.as_u16().to_string(),
    });
    if let Some(scim_type) = scim_type {
        body["scimType"] = json!(scim_type);
    }
    (status, Json(body))
}

impl AppError {
    pub fn to_response(&self) -> (StatusCode, Json<serde_json::Value>) {
        match self {
            AppError::Validation(detail) => {
                scim_error_response(StatusCode::BAD_REQUEST, Some("invalidValue"), detail)
            }
            AppError::NotFound(detail) => {
                scim_error_response(StatusCode::NOT_FOUND, Some("noTarget"), detail)
            }
            AppError::Conflict(detail) => {
                scim_error_response(StatusCode::CONFLICT, Some("uniqueness"), detail)
            }
            AppError::Upstream {
                status,
                scim_type,
                detail,
            } => scim_error_response(*status, *scim_type, detail),
            AppError::Invariant(detail) => {
                tracing::error!(%detail, "invariant violation");
                scim_error_response(StatusCode::INTERNAL_SERVER_ERROR, None, "internal error")
            }
            AppError::Cache(e) => {
                tracing::error!(error = %e, "cache error");
                scim_error_response(StatusCode::INTERNAL_SERVER_ERROR, None, "internal error")
            }
            AppError::Configuration(e) => {
                tracing::error!(error = %e, "configuration error");
                scim_error_response(StatusCode::INTERNAL_SERVER_ERROR, None, "internal error")
            }
            AppError::Serialization(e) => {
                tracing::error!(error = %e, "serialization error");
                scim_error_response(StatusCode::INTERNAL_SERVER_ERROR, None, "internal error")
            }
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = self.to_response();
        (status, body).into_response()
    }
}
