//! Request/response translation for tool invocations.

use crate::descriptor::ToolDescriptor;
use crate::error::{BridgeError, ErrorKind, Result};
use rmcp::model::{CallToolResult, Content, JsonObject, RawContent};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// One tool call, split into declared and pass-through arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationRequest {
    /// Original MCP tool name.
    pub tool_name: String,
    /// Arguments declared in the tool's input schema.
    pub known: BTreeMap<String, Value>,
    /// Arguments the schema does not mention; forwarded untouched.
    pub extra: Map<String, Value>,
}

impl InvocationRequest {
    /// Parse and validate a raw HTTP body. An empty body is an empty argument object.
    ///
    /// # Errors
    ///
    /// `InvalidBody` if the body is not a JSON object, `MissingArgument` if required
    /// parameters are absent.
    pub fn from_body(tool: &ToolDescriptor, body: &[u8]) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Self::from_object(tool, Map::new());
        }

        let value: Value = serde_json::from_slice(body)
            .map_err(|e| BridgeError::InvalidBody(format!("invalid JSON: {e}")))?;
        match value {
            Value::Object(obj) => Self::from_object(tool, obj),
            other => Err(BridgeError::InvalidBody(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    /// # Errors
    ///
    /// `MissingArgument` listing every required parameter absent from `args`.
    pub fn from_object(tool: &ToolDescriptor, args: Map<String, Value>) -> Result<Self> {
        let missing: Vec<String> = tool
            .required_params()
            .filter(|name| !args.contains_key(*name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(BridgeError::MissingArgument {
                tool: tool.name.clone(),
                missing,
            });
        }

        let mut known = BTreeMap::new();
        let mut extra = Map::new();
        for (name, value) in args {
            if tool.params.contains_key(&name) {
                known.insert(name, value);
            } else {
                extra.insert(name, value);
            }
        }

        Ok(Self {
            tool_name: tool.name.clone(),
            known,
            extra,
        })
    }

    /// Merged MCP `arguments` object.
    #[must_use]
    pub fn into_arguments(self) -> JsonObject {
        let mut args: JsonObject = self.extra;
        args.extend(self.known);
        args
    }
}

/// How an upstream `CallToolResult` is surfaced over HTTP. Both variants are `200`.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// `{"content": [...], "structuredContent"?: ...}`
    Success(Value),
    /// `{"error": {"kind": "ToolExecutionError", "message", "content"}}`
    ToolError(Value),
}

impl Outcome {
    #[must_use]
    pub fn from_result(result: &CallToolResult) -> Self {
        let content: Vec<Value> = result.content.iter().map(content_value).collect();

        if result.is_error.unwrap_or(false) {
            let message = error_message(&result.content);
            return Self::ToolError(json!({
                "error": {
                    "kind": ErrorKind::ToolExecutionError.as_str(),
                    "message": message,
                    "content": content,
                }
            }));
        }

        let mut body = json!({ "content": content });
        if let Some(structured) = &result.structured_content {
            body["structuredContent"] = structured.clone();
        }
        Self::Success(body)
    }

    #[must_use]
    pub fn is_tool_error(&self) -> bool {
        matches!(self, Self::ToolError(_))
    }

    #[must_use]
    pub fn into_body(self) -> Value {
        match self {
            Self::Success(v) | Self::ToolError(v) => v,
        }
    }
}

/// Text blocks become plain strings; every other block keeps its MCP JSON form.
fn content_value(content: &Content) -> Value {
    match &content.raw {
        RawContent::Text(text) => Value::String(text.text.clone()),
        _ => content_object(serde_json::to_value(content)),
    }
}

/// A block that cannot be re-encoded is replaced by `{"type": "unserializable", "error": ...}`
/// so every content item stays a string or an object.
fn content_object(encoded: serde_json::Result<Value>) -> Value {
    match encoded {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(error = %e, "dropping unserializable tool result content");
            json!({ "type": "unserializable", "error": e.to_string() })
        }
    }
}

fn error_message(content: &[Content]) -> String {
    let texts: Vec<&str> = content
        .iter()
        .filter_map(|c| match &c.raw {
            RawContent::Text(t) => Some(t.text.as_str()),
            _ => None,
        })
        .collect();
    if texts.is_empty() {
        "tool reported an error".to_string()
    } else {
        texts.join("\n")
    }
}

fn json_type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ParamSpec, ParamType};

    #[test]
    fn unserializable_content_becomes_a_placeholder_object() {
        let err = serde_json::from_str::<Value>("{").expect_err("truncated");
        let item = content_object(Err(err));
        assert!(item.is_object());
        assert_eq!(item["type"], "unserializable");
        assert!(item["error"].is_string());

        let image = json!({"type": "image", "data": "aGk=", "mimeType": "image/png"});
        assert_eq!(content_object(Ok(image.clone())), image);
    }

    fn read_file() -> ToolDescriptor {
        let mut params = BTreeMap::new();
        params.insert(
            "path".to_string(),
            ParamSpec {
                ty: ParamType::String,
                required: true,
                description: None,
            },
        );
        params.insert(
            "limit".to_string(),
            ParamSpec {
                ty: ParamType::Number,
                required: false,
                description: None,
            },
        );
        ToolDescriptor {
            name: "read file".to_string(),
            description: None,
            params,
        }
    }

    #[test]
    fn splits_known_and_extra_arguments() {
        let req = InvocationRequest::from_body(
            &read_file(),
            br#"{"path": "/tmp/a", "limit": 3, "encoding": "utf-8"}"#,
        )
        .expect("valid");

        assert_eq!(req.tool_name, "read file");
        assert_eq!(req.known.len(), 2);
        assert_eq!(req.extra.get("encoding"), Some(&json!("utf-8")));

        let args = req.into_arguments();
        assert_eq!(
            Value::Object(args),
            json!({"path": "/tmp/a", "limit": 3, "encoding": "utf-8"})
        );
    }

    #[test]
    fn missing_required_argument_is_reported() {
        let err = InvocationRequest::from_body(&read_file(), br#"{"limit": 1}"#)
            .expect_err("missing path");
        match err {
            BridgeError::MissingArgument { tool, missing } => {
                assert_eq!(tool, "read file");
                assert_eq!(missing, vec!["path".to_string()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_body_is_an_empty_object() {
        let err = InvocationRequest::from_body(&read_file(), b"  \n").expect_err("missing path");
        assert!(matches!(err, BridgeError::MissingArgument { .. }));

        let no_params = ToolDescriptor {
            name: "ping".to_string(),
            description: None,
            params: BTreeMap::new(),
        };
        let req = InvocationRequest::from_body(&no_params, b"").expect("empty ok");
        assert!(req.into_arguments().is_empty());
    }

    #[test]
    fn non_object_bodies_are_rejected() {
        for body in [&b"[1, 2]"[..], &b"\"path\""[..], &b"{not json"[..]] {
            let err = InvocationRequest::from_body(&read_file(), body).expect_err("invalid");
            assert!(matches!(err, BridgeError::InvalidBody(_)), "{err:?}");
        }
    }

    #[test]
    fn success_flattens_text_and_passes_other_blocks_through() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"}
            ],
            "structuredContent": {"count": 1},
            "isError": false
        }))
        .expect("result json");

        let outcome = Outcome::from_result(&result);
        assert!(!outcome.is_tool_error());

        let body = outcome.into_body();
        assert_eq!(body["content"][0], "hello");
        assert_eq!(body["content"][1]["type"], "image");
        assert_eq!(body["content"][1]["mimeType"], "image/png");
        assert_eq!(body["structuredContent"], json!({"count": 1}));
    }

    #[test]
    fn tool_error_carries_tool_text() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [{"type": "text", "text": "file not found"}],
            "isError": true
        }))
        .expect("result json");

        let outcome = Outcome::from_result(&result);
        assert!(outcome.is_tool_error());
        let body = outcome.into_body();
        assert_eq!(body["error"]["kind"], "ToolExecutionError");
        assert_eq!(body["error"]["message"], "file not found");
        assert_eq!(body["error"]["content"], json!(["file not found"]));
    }

    #[test]
    fn tool_error_without_text_gets_generic_message() {
        let result: CallToolResult = serde_json::from_value(json!({
            "content": [],
            "isError": true
        }))
        .expect("result json");
        let body = Outcome::from_result(&result).into_body();
        assert_eq!(body["error"]["message"], "tool reported an error");
    }
}
