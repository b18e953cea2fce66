//! Minimal streamable-HTTP MCP server used only for bridge integration tests.
//!
//! Speaks JSON-RPC directly instead of going through the bridge's client code, so both sides of
//! the wire are exercised independently. `tools/call` replies arrive as SSE with a progress
//! notification in front; everything else is plain JSON.

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use clap::Parser;
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const SESSION_HEADER: &str = "mcp-session-id";
const PAGE_SIZE: usize = 2;

#[derive(Parser)]
struct Args {
    #[arg(long, default_value = "127.0.0.1:3001")]
    bind: SocketAddr,
}

#[derive(Default)]
struct MockState {
    sessions: Mutex<HashSet<String>>,
    next_session: AtomicU64,
    initialize: AtomicU64,
    tools_list: AtomicU64,
    tools_call: AtomicU64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();
    let args = Args::parse();

    let state = Arc::new(MockState::default());
    let app = Router::new()
        .route("/mcp", post(handle_post).delete(handle_delete))
        .route("/stats", get(stats))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "mock MCP upstream listening");
    axum::serve(listener, app).await?;
    Ok(())
}

async fn handle_post(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let Ok(msg) = serde_json::from_slice::<Value>(&body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let Some(method) = msg.get("method").and_then(Value::as_str) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    if method == "initialize" {
        state.initialize.fetch_add(1, Ordering::SeqCst);
        let sid = format!(
            "mock-session-{}",
            state.next_session.fetch_add(1, Ordering::SeqCst)
        );
        state.sessions.lock().insert(sid.clone());
        let id = msg.get("id").cloned().unwrap_or(Value::Null);
        return (
            [(SESSION_HEADER, sid)],
            Json(jsonrpc_ok(&id, &initialize_result(&msg))),
        )
            .into_response();
    }

    let known_session = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|sid| state.sessions.lock().contains(sid));
    if !known_session {
        return StatusCode::NOT_FOUND.into_response();
    }

    // Notifications carry no `id`.
    let Some(id) = msg.get("id").cloned() else {
        return StatusCode::ACCEPTED.into_response();
    };

    match method {
        "tools/list" => {
            state.tools_list.fetch_add(1, Ordering::SeqCst);
            Json(jsonrpc_ok(&id, &tools_list_result(&msg))).into_response()
        }
        "tools/call" => {
            state.tools_call.fetch_add(1, Ordering::SeqCst);
            let reply = match tools_call_result(&msg) {
                Ok(result) => jsonrpc_ok(&id, &result),
                Err(error) => jsonrpc_err(&id, &error),
            };
            sse_reply(&reply)
        }
        _ => {
            let error = json!({ "code": -32601, "message": "method not found" });
            Json(jsonrpc_err(&id, &error)).into_response()
        }
    }
}

async fn handle_delete(State(state): State<Arc<MockState>>, headers: HeaderMap) -> StatusCode {
    let removed = headers
        .get(SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|sid| state.sessions.lock().remove(sid));
    if removed {
        StatusCode::OK
    } else {
        StatusCode::NOT_FOUND
    }
}

async fn stats(State(state): State<Arc<MockState>>) -> Json<Value> {
    Json(json!({
        "initialize": state.initialize.load(Ordering::SeqCst),
        "toolsList": state.tools_list.load(Ordering::SeqCst),
        "toolsCall": state.tools_call.load(Ordering::SeqCst),
        "openSessions": state.sessions.lock().len(),
    }))
}

fn sse_reply(reply: &Value) -> Response {
    let progress = json!({
        "jsonrpc": "2.0",
        "method": "notifications/progress",
        "params": { "progressToken": 0, "progress": 1 }
    });
    let body = format!("event: message\ndata: {progress}\n\nevent: message\ndata: {reply}\n\n");
    ([(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

fn initialize_result(msg: &Value) -> Value {
    let protocol_version = msg
        .get("params")
        .and_then(|p| p.get("protocolVersion"))
        .and_then(Value::as_str)
        .unwrap_or("2025-06-18")
        .to_string();

    json!({
        "protocolVersion": protocol_version,
        "capabilities": { "tools": {} },
        "serverInfo": { "name": "mock-upstream", "version": "0.1.0" }
    })
}

fn tools() -> Vec<Value> {
    vec![
        json!({
            "name": "list-files",
            "description": "List a directory",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "dir": { "type": "string", "description": "Directory to list" },
                    "recursive": { "type": "boolean" }
                },
                "required": ["dir"]
            }
        }),
        json!({
            "name": "list files!",
            "inputSchema": {
                "type": "object",
                "properties": { "limit": { "type": "integer" } }
            }
        }),
        json!({
            "name": "echo",
            "description": "Echo a message back",
            "inputSchema": {
                "type": "object",
                "properties": { "message": { "type": "string" } },
                "required": ["message"]
            }
        }),
        json!({
            "name": "fail",
            "description": "Always reports a tool error",
            "inputSchema": { "type": "object" }
        }),
        json!({
            "name": "health",
            "description": "A tool whose path shadows the bridge's health route",
            "inputSchema": { "type": "object" }
        }),
    ]
}

fn tools_list_result(msg: &Value) -> Value {
    let start: usize = msg
        .get("params")
        .and_then(|p| p.get("cursor"))
        .and_then(Value::as_str)
        .and_then(|c| c.parse().ok())
        .unwrap_or(0);

    let all = tools();
    let page: Vec<Value> = all.iter().skip(start).take(PAGE_SIZE).cloned().collect();
    let mut result = json!({ "tools": page });
    if start + PAGE_SIZE < all.len() {
        result["nextCursor"] = json!((start + PAGE_SIZE).to_string());
    }
    result
}

fn tools_call_result(msg: &Value) -> Result<Value, Value> {
    let params = msg.get("params").cloned().unwrap_or_default();
    let name = params.get("name").and_then(Value::as_str).unwrap_or("");
    let args = params.get("arguments").cloned().unwrap_or_else(|| json!({}));

    match name {
        "list-files" => {
            let dir = args.get("dir").and_then(Value::as_str).unwrap_or("");
            Ok(json!({
                "content": [
                    { "type": "text", "text": format!("{dir}/a.txt") },
                    { "type": "text", "text": format!("{dir}/b.txt") }
                ]
            }))
        }
        "list files!" => Ok(json!({
            "content": [{ "type": "text", "text": format!("arguments: {args}") }]
        })),
        "echo" => {
            let message = args.get("message").cloned().unwrap_or(Value::Null);
            Ok(json!({
                "content": [
                    { "type": "text", "text": message.as_str().unwrap_or_default() },
                    { "type": "image", "data": "aGk=", "mimeType": "image/png" }
                ],
                "structuredContent": { "message": message, "arguments": args }
            }))
        }
        "fail" => Ok(json!({
            "content": [{ "type": "text", "text": "something went wrong" }],
            "isError": true
        })),
        "health" => Ok(json!({
            "content": [{ "type": "text", "text": "tool health" }]
        })),
        _ => Err(json!({ "code": -32602, "message": format!("unknown tool: {name}") })),
    }
}

fn jsonrpc_ok(id: &Value, result: &Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn jsonrpc_err(id: &Value, error: &Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "error": error })
}
