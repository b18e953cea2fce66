//! Upstream MCP connection.
//!
//! [`McpConnector`] performs the handshake and hands back an [`McpSession`]; the session cache
//! only talks to these traits, so tests can swap in a spy upstream.

use crate::catalog::ServerInfo;
use crate::config::{UpstreamAuth, UpstreamConfig};
use crate::error::BridgeError;
use crate::streamable_http::{self, HttpError};
use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use rmcp::model::{
    CallToolRequest, CallToolRequestParams, CallToolResult, ClientCapabilities, ClientInfo,
    ClientJsonRpcMessage, ClientNotification, ClientRequest, Extensions, Implementation,
    InitializeRequest, InitializeResult, InitializedNotification, JsonObject, ListToolsRequest,
    ListToolsRequestMethod, ListToolsResult, PaginatedRequestParams, ProtocolVersion, RequestId,
    ServerResult,
};
use rmcp::transport::streamable_http_client::{
    StreamableHttpClient as _, StreamableHttpPostResponse,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error(transparent)]
    Http(#[from] HttpError),

    /// JSON-RPC `error` response. The transport itself is fine.
    #[error("upstream JSON-RPC error {code}: {message}")]
    Rpc { code: i32, message: String },

    #[error("invalid {method} result: {source}")]
    Decode {
        method: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Connection-level failure reported by a non-HTTP session implementation.
    #[error("{0}")]
    Transport(String),
}

impl UpstreamError {
    /// Whether the session should be re-established before the next call.
    #[must_use]
    pub fn invalidates_session(&self) -> bool {
        match self {
            Self::Http(_) | Self::Transport(_) => true,
            Self::Rpc { .. } | Self::Decode { .. } => false,
        }
    }
}

impl From<UpstreamError> for BridgeError {
    fn from(e: UpstreamError) -> Self {
        BridgeError::Transport(e.to_string())
    }
}

pub type UpstreamResult<T> = std::result::Result<T, UpstreamError>;

/// An established upstream session.
pub struct Connected {
    pub session: Arc<dyn McpSession>,
    pub server: ServerInfo,
}

#[async_trait]
pub trait McpConnector: Send + Sync + 'static {
    /// Open a session and complete the MCP handshake.
    async fn connect(&self) -> UpstreamResult<Connected>;
}

#[async_trait]
pub trait McpSession: Send + Sync {
    /// One `tools/list` page.
    async fn list_tools(&self, cursor: Option<String>) -> UpstreamResult<ListToolsResult>;

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> UpstreamResult<CallToolResult>;

    /// Best-effort session teardown.
    async fn close(&self) {}
}

/// Streamable-HTTP upstream.
pub struct HttpConnector {
    /// Carries the credential headers only; sessions get their own client with the
    /// negotiated protocol version added.
    http: reqwest::Client,
    url: Arc<str>,
    headers: HeaderMap,
}

impl HttpConnector {
    /// # Errors
    ///
    /// Fails if the HTTP client cannot be built (e.g. no TLS backend).
    pub fn new(config: &UpstreamConfig) -> UpstreamResult<Self> {
        let headers = build_upstream_headers(config.auth.as_ref());
        Ok(Self {
            http: streamable_http::client(headers.clone(), None)?,
            url: config.url.as_str().into(),
            headers,
        })
    }
}

pub(crate) fn build_upstream_headers(auth: Option<&UpstreamAuth>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    let Some(auth) = auth else {
        return headers;
    };
    match auth {
        UpstreamAuth::Bearer { token } => {
            if let Ok(v) = HeaderValue::from_str(&format!("Bearer {token}")) {
                headers.insert(AUTHORIZATION, v);
            }
        }
        UpstreamAuth::Header { name, value } => {
            if let Ok(n) = HeaderName::from_bytes(name.as_bytes())
                && let Ok(v) = HeaderValue::from_str(value)
            {
                headers.insert(n, v);
            }
        }
    }
    headers
}

fn initialize_request() -> ClientRequest {
    ClientRequest::InitializeRequest(InitializeRequest::new(ClientInfo {
        meta: None,
        protocol_version: ProtocolVersion::LATEST,
        capabilities: ClientCapabilities::default(),
        client_info: Implementation {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            ..Implementation::default()
        },
    }))
}

fn list_tools_request(cursor: Option<String>) -> ClientRequest {
    ClientRequest::ListToolsRequest(ListToolsRequest {
        method: ListToolsRequestMethod,
        params: cursor.map(|cursor| PaginatedRequestParams {
            meta: None,
            cursor: Some(cursor),
        }),
        extensions: Extensions::default(),
    })
}

fn call_tool_request(name: &str, arguments: JsonObject) -> ClientRequest {
    ClientRequest::CallToolRequest(CallToolRequest::new(CallToolRequestParams {
        meta: None,
        name: name.to_string().into(),
        arguments: Some(arguments),
        task: None,
    }))
}

/// Re-read a result as `T` when the untagged `ServerResult` picked another variant.
fn decode_as<T: DeserializeOwned>(
    method: &'static str,
    result: ServerResult,
) -> UpstreamResult<T> {
    serde_json::to_value(result)
        .and_then(serde_json::from_value)
        .map_err(|source| UpstreamError::Decode { method, source })
}

#[async_trait]
impl McpConnector for HttpConnector {
    async fn connect(&self) -> UpstreamResult<Connected> {
        let id = RequestId::Number(0);
        let init = ClientJsonRpcMessage::request(initialize_request(), id.clone());
        let resp = self
            .http
            .post_message(Arc::clone(&self.url), init, None, None)
            .await?;
        let (message, session_id) = resp.expect_initialized::<reqwest::Error>().await?;
        let result: InitializeResult = match streamable_http::expect_response(message, &id)? {
            ServerResult::InitializeResult(result) => result,
            other => decode_as("initialize", other)?,
        };

        let session_id: Option<Arc<str>> = session_id.map(Into::into);
        let http = streamable_http::client(self.headers.clone(), Some(&result.protocol_version))?;

        // MCP handshake: client must send `notifications/initialized` after `initialize`.
        let initialized = ClientJsonRpcMessage::notification(
            ClientNotification::InitializedNotification(InitializedNotification::default()),
        );
        match http
            .post_message(Arc::clone(&self.url), initialized, session_id.clone(), None)
            .await?
        {
            StreamableHttpPostResponse::Accepted => {}
            other => {
                return Err(HttpError::UnexpectedServerResponse(
                    format!("unexpected response to notifications/initialized: {other:?}").into(),
                )
                .into());
            }
        }

        tracing::info!(
            upstream = %self.url,
            server = %result.server_info.name,
            protocol_version = %result.protocol_version,
            stateful = session_id.is_some(),
            "upstream MCP session established"
        );

        Ok(Connected {
            session: Arc::new(HttpSession {
                http,
                url: Arc::clone(&self.url),
                session_id,
                next_id: AtomicI64::new(1),
            }),
            server: ServerInfo {
                name: Some(result.server_info.name),
                version: Some(result.server_info.version),
            },
        })
    }
}

/// Each request is its own POST, so calls on one session may run concurrently.
struct HttpSession {
    http: reqwest::Client,
    url: Arc<str>,
    session_id: Option<Arc<str>>,
    next_id: AtomicI64,
}

impl HttpSession {
    async fn request(&self, request: ClientRequest) -> UpstreamResult<ServerResult> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let message = ClientJsonRpcMessage::request(request, id.clone());
        let resp = self
            .http
            .post_message(Arc::clone(&self.url), message, self.session_id.clone(), None)
            .await?;
        streamable_http::read_response(resp, &id).await
    }
}

#[async_trait]
impl McpSession for HttpSession {
    async fn list_tools(&self, cursor: Option<String>) -> UpstreamResult<ListToolsResult> {
        match self.request(list_tools_request(cursor)).await? {
            ServerResult::ListToolsResult(page) => Ok(page),
            other => decode_as("tools/list", other),
        }
    }

    async fn call_tool(&self, name: &str, arguments: JsonObject) -> UpstreamResult<CallToolResult> {
        match self.request(call_tool_request(name, arguments)).await? {
            ServerResult::CallToolResult(result) => Ok(result),
            other => decode_as("tools/call", other),
        }
    }

    async fn close(&self) {
        let Some(session_id) = &self.session_id else {
            return;
        };
        if let Err(e) = self
            .http
            .delete_session(Arc::clone(&self.url), Arc::clone(session_id), None)
            .await
        {
            tracing::debug!(error = %e, "failed to close upstream session");
        }
    }
}
