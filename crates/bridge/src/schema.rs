//! OpenAPI document synthesis.
//!
//! Every catalog entry becomes one `POST /{path}` operation. The request schema is derived from
//! the [`ToolDescriptor`] and the response schemas describe exactly what
//! [`crate::invocation`] produces, so the document and the forwarding logic share one source
//! of truth.

use crate::catalog::ToolCatalog;
use crate::descriptor::ToolDescriptor;
use crate::error::ErrorKind;
use serde_json::{Map, Value, json};
use sha2::{Digest as _, Sha256};

pub const OPENAPI_VERSION: &str = "3.1.0";
const DEFAULT_TITLE: &str = "MCP OpenAPI Bridge";

const TOOL_RESULT: &str = "ToolResult";
const TOOL_EXECUTION_FAILURE: &str = "ToolExecutionFailure";
const BRIDGE_ERROR: &str = "BridgeError";

/// Operator-provided `info` overrides.
#[derive(Debug, Clone, Default)]
pub struct ApiInfo {
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
}

/// A rendered OpenAPI document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    /// Serialized JSON. Byte-identical for an unchanged catalog.
    pub body: String,
    /// Strong `ETag` (quoted SHA-256 of `body`).
    pub etag: String,
}

impl SchemaDocument {
    #[must_use]
    pub fn render(catalog: &ToolCatalog, info: &ApiInfo) -> Self {
        let body = build_document(catalog, info).to_string();
        let etag = format!("\"{}\"", hex::encode(Sha256::digest(body.as_bytes())));
        Self { body, etag }
    }

    /// `If-None-Match` check (handles `*` and comma-separated lists).
    #[must_use]
    pub fn matches_etag(&self, if_none_match: &str) -> bool {
        if_none_match
            .split(',')
            .map(str::trim)
            .any(|tag| tag == "*" || tag.trim_start_matches("W/") == self.etag)
    }
}

/// Build the OpenAPI document for a catalog.
#[must_use]
pub fn build_document(catalog: &ToolCatalog, info: &ApiInfo) -> Value {
    let mut paths = Map::new();
    let mut schemas = Map::new();

    for (path, tool) in catalog.routes() {
        let input_name = input_schema_name(path);
        schemas.insert(input_name.clone(), input_schema(tool));
        paths.insert(format!("/{path}"), json!({ "post": operation(path, tool, &input_name) }));
    }

    schemas.insert(TOOL_RESULT.to_string(), tool_result_schema());
    schemas.insert(
        TOOL_EXECUTION_FAILURE.to_string(),
        tool_execution_failure_schema(),
    );
    schemas.insert(BRIDGE_ERROR.to_string(), bridge_error_schema());

    json!({
        "openapi": OPENAPI_VERSION,
        "info": info_object(catalog, info),
        "paths": paths,
        "components": { "schemas": schemas },
    })
}

fn info_object(catalog: &ToolCatalog, info: &ApiInfo) -> Value {
    let server = catalog.server();
    let title = info
        .title
        .clone()
        .or_else(|| server.name.clone())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let version = info
        .version
        .clone()
        .or_else(|| server.version.clone())
        .unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    let mut obj = json!({ "title": title, "version": version });
    if let Some(desc) = &info.description {
        obj["description"] = json!(desc);
    }
    obj
}

fn input_schema_name(path: &str) -> String {
    format!("{path}_input")
}

fn schema_ref(name: &str) -> Value {
    json!({ "$ref": format!("#/components/schemas/{name}") })
}

/// Request body schema. Extra properties are allowed: they are forwarded as-is.
fn input_schema(tool: &ToolDescriptor) -> Value {
    let properties: Map<String, Value> = tool
        .params
        .iter()
        .map(|(name, spec)| (name.clone(), spec.to_json_schema()))
        .collect();
    let required: Vec<&str> = tool.required_params().collect();

    let mut schema = json!({
        "type": "object",
        "properties": properties,
        "additionalProperties": true,
    });
    if !required.is_empty() {
        schema["required"] = json!(required);
    }
    schema
}

fn operation(path: &str, tool: &ToolDescriptor, input_name: &str) -> Value {
    let error_response = |description: &str| {
        json!({
            "description": description,
            "content": { "application/json": { "schema": schema_ref(BRIDGE_ERROR) } }
        })
    };

    let mut op = json!({
        "operationId": path,
        "summary": tool.name,
        "x-mcp-tool": tool.name,
        "requestBody": {
            "required": tool.has_required_params(),
            "content": { "application/json": { "schema": schema_ref(input_name) } }
        },
        "responses": {
            "200": {
                "description": "Tool result, or a failure reported by the tool itself",
                "content": {
                    "application/json": {
                        "schema": {
                            "oneOf": [schema_ref(TOOL_RESULT), schema_ref(TOOL_EXECUTION_FAILURE)]
                        }
                    }
                }
            },
            "400": error_response("Request body is not a JSON object"),
            "404": error_response("Unknown tool"),
            "422": error_response("Missing required argument"),
            "502": error_response("Upstream MCP server unavailable or timed out"),
        }
    });
    if let Some(desc) = &tool.description {
        op["description"] = json!(desc);
    }
    op
}

fn content_schema() -> Value {
    json!({
        "type": "array",
        "description": "Content blocks in upstream order: text blocks as strings, other blocks verbatim or as an `unserializable` placeholder object",
        "items": { "oneOf": [{ "type": "string" }, { "type": "object" }] }
    })
}

fn tool_result_schema() -> Value {
    json!({
        "type": "object",
        "required": ["content"],
        "properties": {
            "content": content_schema(),
            "structuredContent": { "type": "object" }
        },
        "additionalProperties": false
    })
}

fn tool_execution_failure_schema() -> Value {
    json!({
        "type": "object",
        "required": ["error"],
        "properties": {
            "error": {
                "type": "object",
                "required": ["kind", "message", "content"],
                "properties": {
                    "kind": { "const": ErrorKind::ToolExecutionError.as_str() },
                    "message": { "type": "string" },
                    "content": content_schema()
                }
            }
        },
        "additionalProperties": false
    })
}

fn bridge_error_schema() -> Value {
    let kinds = [
        ErrorKind::InvalidBody,
        ErrorKind::MissingArgument,
        ErrorKind::UnknownTool,
        ErrorKind::BridgeTransportError,
    ]
    .map(ErrorKind::as_str);

    json!({
        "type": "object",
        "required": ["error"],
        "properties": {
            "error": {
                "type": "object",
                "required": ["kind", "message"],
                "properties": {
                    "kind": { "type": "string", "enum": kinds },
                    "message": { "type": "string" },
                    "missing": { "type": "array", "items": { "type": "string" } }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ServerInfo;
    use crate::descriptor::{ParamSpec, ParamType};
    use std::collections::BTreeMap;

    fn tool(name: &str, params: &[(&str, ParamType, bool)]) -> ToolDescriptor {
        ToolDescriptor {
            name: name.to_string(),
            description: Some(format!("{name} tool")),
            params: params
                .iter()
                .map(|(n, ty, required)| {
                    (
                        (*n).to_string(),
                        ParamSpec {
                            ty: ty.clone(),
                            required: *required,
                            description: None,
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
        }
    }

    fn catalog() -> ToolCatalog {
        ToolCatalog::from_descriptors(
            ServerInfo {
                name: Some("files".to_string()),
                version: Some("1.2.3".to_string()),
            },
            vec![
                tool("list-files", &[("dir", ParamType::String, true)]),
                tool(
                    "list files!",
                    &[("recursive", ParamType::Boolean, false), ("x", ParamType::Any, false)],
                ),
            ],
        )
    }

    #[test]
    fn one_post_operation_per_tool() {
        let doc = build_document(&catalog(), &ApiInfo::default());

        assert_eq!(doc["openapi"], OPENAPI_VERSION);
        let paths = doc["paths"].as_object().expect("paths");
        assert_eq!(paths.len(), 2);

        let op = &doc["paths"]["/list-files-2"]["post"];
        assert_eq!(op["operationId"], "list-files-2");
        assert_eq!(op["x-mcp-tool"], "list files!");
        assert_eq!(op["requestBody"]["required"], false);
        assert_eq!(
            op["requestBody"]["content"]["application/json"]["schema"]["$ref"],
            "#/components/schemas/list-files-2_input"
        );
        assert!(op["responses"]["502"].is_object());
    }

    #[test]
    fn input_schema_mirrors_descriptor() {
        let doc = build_document(&catalog(), &ApiInfo::default());
        let schemas = &doc["components"]["schemas"];

        assert_eq!(
            schemas["list-files_input"],
            json!({
                "type": "object",
                "properties": { "dir": { "type": "string" } },
                "required": ["dir"],
                "additionalProperties": true
            })
        );

        let loose = &schemas["list-files-2_input"];
        assert!(loose.get("required").is_none());
        assert_eq!(loose["properties"]["x"], json!({}));
        assert_eq!(loose["properties"]["recursive"]["type"], "boolean");
    }

    #[test]
    fn info_prefers_overrides_then_upstream() {
        let doc = build_document(&catalog(), &ApiInfo::default());
        assert_eq!(doc["info"]["title"], "files");
        assert_eq!(doc["info"]["version"], "1.2.3");

        let info = ApiInfo {
            title: Some("My Tools".to_string()),
            version: None,
            description: Some("desc".to_string()),
        };
        let doc = build_document(&catalog(), &info);
        assert_eq!(doc["info"]["title"], "My Tools");
        assert_eq!(doc["info"]["description"], "desc");

        let empty = ToolCatalog::default();
        let doc = build_document(&empty, &ApiInfo::default());
        assert_eq!(doc["info"]["title"], DEFAULT_TITLE);
        assert_eq!(doc["paths"], json!({}));
    }

    #[test]
    fn rendering_is_deterministic() {
        let info = ApiInfo::default();
        let a = SchemaDocument::render(&catalog(), &info);
        let b = SchemaDocument::render(&catalog(), &info);
        assert_eq!(a.body, b.body);
        assert_eq!(a.etag, b.etag);
        assert!(a.etag.starts_with('"') && a.etag.ends_with('"'));
    }

    #[test]
    fn etag_matching() {
        let doc = SchemaDocument::render(&catalog(), &ApiInfo::default());
        assert!(doc.matches_etag(&doc.etag));
        assert!(doc.matches_etag(&format!("\"other\", W/{}", doc.etag)));
        assert!(doc.matches_etag("*"));
        assert!(!doc.matches_etag("\"other\""));
    }
}
