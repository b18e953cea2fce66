#![allow(dead_code)]

use anyhow::Context as _;
use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt as _;
use mcp_openapi_bridge::catalog::ServerInfo;
use mcp_openapi_bridge::schema::ApiInfo;
use mcp_openapi_bridge::server::{AppState, router};
use mcp_openapi_bridge::session::{SessionCache, SessionSettings};
use mcp_openapi_bridge::upstream::{
    Connected, McpConnector, McpSession, UpstreamError, UpstreamResult,
};
use rmcp::model::{CallToolResult, JsonObject, ListToolsResult};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use tower::ServiceExt as _;

pub use mcp_openapi_bridge_test_support::{
    KillOnDrop, pick_unused_port, spawn_process, wait_http_ok,
};

/// In-process upstream that records what the bridge asked of it.
#[derive(Default)]
pub struct SpyUpstream {
    pub connects: AtomicUsize,
    pub calls: AtomicUsize,
    pub closes: AtomicUsize,
    pub fail_connect: AtomicBool,
    pub connect_delay: Option<Duration>,
    pub last_arguments: parking_lot::Mutex<Option<(String, JsonObject)>>,
}

impl SpyUpstream {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }
}

pub fn spy_tools() -> Vec<Value> {
    vec![
        json!({
            "name": "list-files",
            "description": "List a directory",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "dir": { "type": "string" },
                    "recursive": { "type": "boolean" }
                },
                "required": ["dir"]
            }
        }),
        json!({
            "name": "list files!",
            "inputSchema": { "type": "object", "properties": { "limit": { "type": "integer" } } }
        }),
        json!({
            "name": "fail",
            "inputSchema": { "type": "object" }
        }),
        json!({
            "name": "drop",
            "inputSchema": { "type": "object" }
        }),
        json!({
            "name": "health",
            "inputSchema": { "type": "object" }
        }),
    ]
}

struct SpyConnector(Arc<SpyUpstream>);

struct SpySession(Arc<SpyUpstream>);

#[async_trait]
impl McpConnector for SpyConnector {
    async fn connect(&self) -> UpstreamResult<Connected> {
        self.0.connects.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.0.connect_delay {
            tokio::time::sleep(delay).await;
        }
        if self.0.fail_connect.load(Ordering::SeqCst) {
            return Err(UpstreamError::Transport("connection refused".to_string()));
        }
        Ok(Connected {
            session: Arc::new(SpySession(Arc::clone(&self.0))),
            server: ServerInfo {
                name: Some("spy".to_string()),
                version: Some("1.0.0".to_string()),
            },
        })
    }
}

#[async_trait]
impl McpSession for SpySession {
    async fn list_tools(&self, cursor: Option<String>) -> UpstreamResult<ListToolsResult> {
        // Two pages: the first tool alone, then the rest.
        let tools = spy_tools();
        let page = match cursor.as_deref() {
            None => json!({ "tools": &tools[..1], "nextCursor": "page-2" }),
            Some(_) => json!({ "tools": &tools[1..] }),
        };
        Ok(serde_json::from_value(page).expect("tools/list page"))
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> UpstreamResult<CallToolResult> {
        self.0.calls.fetch_add(1, Ordering::SeqCst);
        *self.0.last_arguments.lock() = Some((name.to_string(), arguments.clone()));

        let result = match name {
            "drop" => return Err(UpstreamError::Transport("connection reset".to_string())),
            "fail" => json!({
                "content": [{ "type": "text", "text": "disk on fire" }],
                "isError": true
            }),
            _ => json!({
                "content": [{ "type": "text", "text": format!("called {name}") }],
                "structuredContent": { "arguments": arguments }
            }),
        };
        Ok(serde_json::from_value(result).expect("call result"))
    }

    async fn close(&self) {
        self.0.closes.fetch_add(1, Ordering::SeqCst);
    }
}

pub fn spy_app(spy: &Arc<SpyUpstream>) -> (Router, Arc<SessionCache>) {
    let sessions = Arc::new(SessionCache::new(
        Arc::new(SpyConnector(Arc::clone(spy))),
        SessionSettings::default(),
    ));
    let app = router(AppState::new(Arc::clone(&sessions), ApiInfo::default()));
    (app, sessions)
}

pub async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    body: Option<&str>,
) -> anyhow::Result<(StatusCode, Value)> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body.map_or_else(Body::empty, |b| Body::from(b.to_string())))?;
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = response.into_body().collect().await?.to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).context("response body is not JSON")?
    };
    Ok((status, json))
}

pub fn spawn_mock_upstream(port: u16) -> anyhow::Result<KillOnDrop> {
    let bind = format!("127.0.0.1:{port}");
    spawn_process(
        env!("CARGO_BIN_EXE_mcp-openapi-bridge-mock-upstream"),
        &["--bind", bind.as_str()],
    )
}

pub fn spawn_bridge(
    upstream_port: u16,
    port: u16,
    extra_args: &[&str],
) -> anyhow::Result<KillOnDrop> {
    let upstream = format!("http://127.0.0.1:{upstream_port}/mcp");
    let bind = format!("127.0.0.1:{port}");
    let mut args = vec!["--upstream-url", upstream.as_str(), "--bind", bind.as_str()];
    args.extend_from_slice(extra_args);
    spawn_process(env!("CARGO_BIN_EXE_mcp-openapi-bridge"), &args)
}
