//! Normalized view of upstream MCP tools.
//!
//! MCP tools carry free-form JSON Schema. The bridge only needs the top-level parameter set
//! and a coarse type per parameter, so schemas are folded into a closed set of [`ParamType`]s.
//! Anything the bridge cannot classify degrades to [`ParamType::Any`].

use rmcp::model::Tool;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;

/// Coarse JSON-Schema type of a tool parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array(Box<ParamType>),
    Any,
}

impl ParamType {
    /// Classify a (sub)schema.
    #[must_use]
    pub fn from_schema(schema: &Value) -> Self {
        let Some(obj) = schema.as_object() else {
            return Self::Any;
        };

        match obj.get("type") {
            Some(Value::String(name)) => Self::from_type_name(name, obj),
            // Nullable unions (`["string", "null"]`) collapse to their single non-null member.
            Some(Value::Array(names)) => {
                let mut non_null = names
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|n| *n != "null");
                match (non_null.next(), non_null.next()) {
                    (Some(name), None) => Self::from_type_name(name, obj),
                    _ => Self::Any,
                }
            }
            Some(_) => Self::Any,
            None if obj.contains_key("properties") => Self::Object,
            None if obj.contains_key("items") => Self::Array(Box::new(Self::items_of(obj))),
            None => Self::Any,
        }
    }

    fn from_type_name(name: &str, obj: &Map<String, Value>) -> Self {
        match name {
            "string" => Self::String,
            "number" | "integer" => Self::Number,
            "boolean" => Self::Boolean,
            "object" => Self::Object,
            "array" => Self::Array(Box::new(Self::items_of(obj))),
            _ => Self::Any,
        }
    }

    fn items_of(obj: &Map<String, Value>) -> Self {
        obj.get("items").map_or(Self::Any, Self::from_schema)
    }

    /// JSON Schema for this type. `Any` is the unconstrained schema `{}`.
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::String => json!({ "type": "string" }),
            Self::Number => json!({ "type": "number" }),
            Self::Boolean => json!({ "type": "boolean" }),
            Self::Object => json!({ "type": "object" }),
            Self::Array(items) => json!({ "type": "array", "items": items.to_json_schema() }),
            Self::Any => json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    pub ty: ParamType,
    pub required: bool,
    pub description: Option<String>,
}

impl ParamSpec {
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        let mut schema = self.ty.to_json_schema();
        if let (Some(desc), Some(obj)) = (&self.description, schema.as_object_mut()) {
            obj.insert("description".to_string(), json!(desc));
        }
        schema
    }
}

/// One upstream tool: its name, description and top-level parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: Option<String>,
    pub params: BTreeMap<String, ParamSpec>,
}

impl ToolDescriptor {
    #[must_use]
    pub fn from_tool(tool: &Tool) -> Self {
        Self::from_input_schema(
            tool.name.to_string(),
            tool.description.as_deref().map(str::to_string),
            tool.input_schema.as_ref(),
        )
    }

    #[must_use]
    pub fn from_input_schema(
        name: String,
        description: Option<String>,
        input_schema: &Map<String, Value>,
    ) -> Self {
        let required: Vec<&str> = input_schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let mut params = BTreeMap::new();
        if let Some(props) = input_schema.get("properties").and_then(Value::as_object) {
            for (param, schema) in props {
                params.insert(
                    param.clone(),
                    ParamSpec {
                        ty: ParamType::from_schema(schema),
                        required: required.contains(&param.as_str()),
                        description: schema
                            .get("description")
                            .and_then(Value::as_str)
                            .map(str::to_string),
                    },
                );
            }
        }

        // `required` may name parameters without a property schema.
        for param in required {
            params.entry(param.to_string()).or_insert(ParamSpec {
                ty: ParamType::Any,
                required: true,
                description: None,
            });
        }

        Self {
            name,
            description,
            params,
        }
    }

    pub fn required_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|(_, spec)| spec.required)
            .map(|(name, _)| name.as_str())
    }

    #[must_use]
    pub fn has_required_params(&self) -> bool {
        self.params.values().any(|p| p.required)
    }
}
