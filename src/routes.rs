//! Transport: wires `/scim/v2/Users` handlers onto the request processor
//! and formats their results with §4.H. The authentication gate (`auth.rs`)
//! wraps this router but not the health probe (SPEC_FULL.md "Health probe").
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use serde_json::Value;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::error::AppError;
use crate::extractors::ScimJson;
use crate::model::PatchOp;
use crate::processor::Processor;
use crate::response::{format_list_response, format_user};

pub struct AppState {
    pub processor: Processor,
    pub config: Arc<AppConfig>,
}

const SCIM_CONTENT_TYPE: &str = "application/scim+json";

fn scim_response(status: StatusCode, body: Value) -> Response {
    let mut response = (status, Json(body)).into_response();
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, HeaderValue::from_static(SCIM_CONTENT_TYPE));
    response
}

pub fn build_router(state: Arc<AppState>) -> Router {
    let scim_routes = Router::new()
        .route("/", get(list_users).post(create_user))
        .route(
            "/{id}",
            get(get_user)
                .put(replace_user)
                .patch(patch_user)
                .delete(delete_user),
        )
        .route_layer(middleware::from_fn_with_state(state.config.clone(), auth_middleware))
        .with_state(state.clone());

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/scim/v2/Users", scim_routes)
        .layer(middleware::from_fn(crate::logging::logging_middleware))
        .with_state(state)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    filter: Option<String>,
    #[serde(rename = "startIndex", default = "default_start_index")]
    start_index: i64,
    #[serde(default = "default_count")]
    count: i64,
}

fn default_start_index() -> i64 {
    1
}

fn default_count() -> i64 {
    100
}

async fn list_users(State(state): State<Arc<AppState>>, Query(query): Query<ListQuery>) -> Response {
    match state
        .processor
        .list(query.filter.as_deref(), query.start_index, query.count)
        .await
    {
        Ok((rows, total, start_index)) => {
            let body = format_list_response(&rows, total, start_index, &state.config.server.base_url);
            scim_response(StatusCode::OK, body)
        }
        Err(err) => err.into_response(),
    }
}

async fn get_user(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.processor.get(&id).await {
        Ok(row) => scim_response(StatusCode::OK, format_user(&row, &state.config.server.base_url)),
        Err(err) => err.into_response(),
    }
}

async fn create_user(State(state): State<Arc<AppState>>, ScimJson(user): ScimJson<Value>) -> Response {
    match state.processor.create(user).await {
        Ok(outcome) => {
            let body = format_user(&outcome.row, &state.config.server.base_url);
            let location = format!("{}/scim/v2/Users/{}", state.config.server.base_url, outcome.row.id);
            let mut response = scim_response(StatusCode::CREATED, body);
            if let Ok(value) = HeaderValue::from_str(&location) {
                response.headers_mut().insert(header::LOCATION, value);
            }
            response
        }
        Err(err) => err.into_response(),
    }
}

async fn replace_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ScimJson(user): ScimJson<Value>,
) -> Response {
    match state.processor.replace(&id, user).await {
        Ok(row) => scim_response(StatusCode::OK, format_user(&row, &state.config.server.base_url)),
        Err(err) => err.into_response(),
    }
}

async fn patch_user(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    ScimJson(patch_op): ScimJson<PatchOp>,
) -> Response {
    if patch_op.operations.is_empty() {
        return AppError::Validation("Operations must be a non-empty list".to_string()).into_response();
    }
    match state.processor.patch(&id, patch_op).await {
        Ok(row) => scim_response(StatusCode::OK, format_user(&row, &state.config.server.base_url)),
        Err(err) => err.into_response(),
    }
}

async fn delete_user(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.processor.delete(&id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => err.into_response(),
    }
}
