//! Error types for the bridge.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::{Value, json};
use thiserror::Error;

/// Stable, client-visible error classification (`error.kind` in JSON payloads).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ErrorKind {
    Config,
    InvalidBody,
    MissingArgument,
    UnknownTool,
    BridgeTransportError,
    ToolExecutionError,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Config => "Config",
            Self::InvalidBody => "InvalidBody",
            Self::MissingArgument => "MissingArgument",
            Self::UnknownTool => "UnknownTool",
            Self::BridgeTransportError => "BridgeTransportError",
            Self::ToolExecutionError => "ToolExecutionError",
        }
    }
}

/// Main error type for the bridge.
///
/// Tool-reported failures (`isError: true`) are *not* errors at this level: the bridge
/// succeeded, so they travel as a regular invocation outcome (see `invocation::Outcome`).
#[derive(Error, Debug)]
pub enum BridgeError {
    /// Configuration errors (missing upstream URL, invalid values). Fatal at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The request body is not a JSON object.
    #[error("Invalid request body: {0}")]
    InvalidBody(String),

    /// Required tool arguments absent from the request body.
    #[error("Missing required argument(s) for tool '{tool}': {}", .missing.join(", "))]
    MissingArgument { tool: String, missing: Vec<String> },

    /// The path does not resolve to any discovered tool.
    #[error("Unknown tool path '/{0}'")]
    UnknownTool(String),

    /// Upstream connection, handshake, discovery or call failed (or timed out).
    #[error("Upstream transport error: {0}")]
    Transport(String),
}

impl BridgeError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::InvalidBody(_) => ErrorKind::InvalidBody,
            Self::MissingArgument { .. } => ErrorKind::MissingArgument,
            Self::UnknownTool(_) => ErrorKind::UnknownTool,
            Self::Transport(_) => ErrorKind::BridgeTransportError,
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingArgument { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::UnknownTool(_) => StatusCode::NOT_FOUND,
            Self::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }

    /// JSON payload: `{"error": {"kind", "message", ...}}`.
    #[must_use]
    pub fn to_payload(&self) -> Value {
        let mut error = json!({
            "kind": self.kind().as_str(),
            "message": self.to_string(),
        });
        if let Self::MissingArgument { missing, .. } = self {
            error["missing"] = json!(missing);
        }
        json!({ "error": error })
    }

    pub(crate) fn transport(context: &str, err: impl std::fmt::Display) -> Self {
        Self::Transport(format!("{context}: {err}"))
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.to_payload())).into_response()
    }
}

/// Result type alias for bridge operations.
pub type Result<T> = std::result::Result<T, BridgeError>;
