//! Inbound HTTP surface.
//!
//! - `GET /openapi.json`: the synthesized document (`ETag` / `If-None-Match` aware)
//! - `POST /{tool-path}`: invoke one tool
//! - `GET /health`, `GET /map`: liveness and the path-to-tool table
//!
//! `/health` and `/map` also accept `POST`, which is routed to the tool whose path happens to
//! be `health` or `map`.

use crate::error::{BridgeError, Result};
use crate::invocation::{InvocationRequest, Outcome};
use crate::schema::ApiInfo;
use crate::session::SessionCache;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, Uri, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    sessions: Arc<SessionCache>,
    info: Arc<ApiInfo>,
}

impl AppState {
    #[must_use]
    pub fn new(sessions: Arc<SessionCache>, info: ApiInfo) -> Self {
        Self {
            sessions,
            info: Arc::new(info),
        }
    }

    #[must_use]
    pub fn sessions(&self) -> &Arc<SessionCache> {
        &self.sessions
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/openapi.json", get(openapi))
        .route("/health", get(health).post(invoke_tool))
        .route("/map", get(tool_map).post(invoke_tool))
        .route("/{tool}", post(invoke_tool))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn openapi(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    let snapshot = state.sessions.snapshot().await?;
    let doc = snapshot.schema(&state.info);

    if let Some(if_none_match) = headers
        .get(header::IF_NONE_MATCH)
        .and_then(|v| v.to_str().ok())
        && doc.matches_etag(if_none_match)
    {
        return Ok((StatusCode::NOT_MODIFIED, [(header::ETAG, doc.etag.clone())]).into_response());
    }

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "application/json".to_string()),
            (header::ETAG, doc.etag.clone()),
        ],
        doc.body.clone(),
    )
        .into_response())
}

async fn invoke_tool(State(state): State<AppState>, uri: Uri, body: Bytes) -> Result<Json<Value>> {
    let path = uri.path().trim_start_matches('/');
    let snapshot = state.sessions.snapshot().await?;

    let tool = snapshot
        .catalog()
        .resolve(path)
        .ok_or_else(|| BridgeError::UnknownTool(path.to_string()))?;
    let request = InvocationRequest::from_body(tool, &body).inspect_err(|e| {
        tracing::debug!(tool = %tool.name, error = %e, "rejected tool request");
    })?;

    let tool_name = request.tool_name.clone();
    let result = state.sessions.call(&snapshot, request).await?;
    let outcome = Outcome::from_result(&result);
    if outcome.is_tool_error() {
        tracing::info!(tool = %tool_name, "tool reported an execution error");
    }
    Ok(Json(outcome.into_body()))
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "upstream": state.sessions.status(),
    }))
}

async fn tool_map(State(state): State<AppState>) -> Result<Json<Value>> {
    let snapshot = state.sessions.snapshot().await?;
    Ok(Json(json!({ "tools": snapshot.catalog().mappings() })))
}
