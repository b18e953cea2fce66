//! Reply handling on top of rmcp's streamable-HTTP client.
//!
//! rmcp posts the message and classifies the reply (`202`, JSON or SSE). This module picks the
//! response that answers a given request out of that reply.

use crate::upstream::{UpstreamError, UpstreamResult};
use futures::StreamExt as _;
use reqwest::header::{HeaderMap, HeaderValue};
use rmcp::model::{ProtocolVersion, RequestId, ServerJsonRpcMessage, ServerResult};
use rmcp::transport::streamable_http_client::{StreamableHttpError, StreamableHttpPostResponse};

pub type HttpError = StreamableHttpError<reqwest::Error>;

pub const HEADER_PROTOCOL_VERSION: &str = "mcp-protocol-version";

/// A client that sends `headers` with every request.
///
/// rmcp's `StreamableHttpClient` impl only adds the session header, so credentials and the
/// negotiated protocol version ride along as default headers.
pub fn client(
    mut headers: HeaderMap,
    protocol_version: Option<&ProtocolVersion>,
) -> Result<reqwest::Client, HttpError> {
    if let Some(version) = protocol_version
        && let Ok(v) = HeaderValue::from_str(&version.to_string())
    {
        headers.insert(HEADER_PROTOCOL_VERSION, v);
    }
    Ok(reqwest::Client::builder().default_headers(headers).build()?)
}

/// Wait for the response to request `id` and return its result.
///
/// Server-initiated requests and notifications interleaved on an SSE stream are skipped.
pub async fn read_response(
    resp: StreamableHttpPostResponse,
    id: &RequestId,
) -> UpstreamResult<ServerResult> {
    match resp {
        StreamableHttpPostResponse::Json(message, _) => expect_response(message, id),
        StreamableHttpPostResponse::Sse(mut stream, _) => {
            while let Some(event) = stream.next().await {
                let event = event.map_err(HttpError::Sse)?;
                let payload = event.data.unwrap_or_default();
                if payload.trim().is_empty() {
                    continue;
                }
                let message: ServerJsonRpcMessage =
                    serde_json::from_str(&payload).map_err(HttpError::Deserialize)?;
                if let Some(result) = take_response(message, id)? {
                    return Ok(result);
                }
            }
            Err(HttpError::UnexpectedEndOfStream.into())
        }
        StreamableHttpPostResponse::Accepted => {
            Err(HttpError::UnexpectedServerResponse("202 Accepted for a request".into()).into())
        }
    }
}

/// The result carried by a single reply message, which must answer request `id`.
pub fn expect_response(
    message: ServerJsonRpcMessage,
    id: &RequestId,
) -> UpstreamResult<ServerResult> {
    take_response(message, id)?.ok_or_else(|| {
        HttpError::UnexpectedServerResponse(format!("no response for request {id}").into()).into()
    })
}

/// `Ok(Some(result))` for the matching response, `Ok(None)` for unrelated messages.
fn take_response(
    message: ServerJsonRpcMessage,
    id: &RequestId,
) -> UpstreamResult<Option<ServerResult>> {
    match message {
        ServerJsonRpcMessage::Response(r) if r.id == *id => Ok(Some(r.result)),
        ServerJsonRpcMessage::Error(e) if e.id == *id => Err(UpstreamError::Rpc {
            code: e.error.code.0,
            message: e.error.message.into_owned(),
        }),
        _ => Ok(None),
    }
}
