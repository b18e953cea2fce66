//! Tool catalog built from one discovery pass.

use crate::descriptor::ToolDescriptor;
use crate::sanitize::PathMap;
use rmcp::model::Tool;
use serde::Serialize;
use std::collections::HashMap;

/// Upstream identity reported in the `initialize` result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: Option<String>,
    pub version: Option<String>,
}

/// Mapping entry for the `/map` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ToolMapping {
    /// Path segment (`POST /{path}`)
    pub path: String,
    /// Original MCP tool name
    pub tool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Immutable set of tool descriptors plus their path mapping.
#[derive(Debug, Clone, Default)]
pub struct ToolCatalog {
    server: ServerInfo,
    /// Descriptors in discovery order.
    tools: Vec<ToolDescriptor>,
    /// Tool name -> index into `tools`.
    index: HashMap<String, usize>,
    paths: PathMap,
}

impl ToolCatalog {
    /// Build a catalog from a `tools/list` result.
    ///
    /// Duplicate tool names are skipped (first one wins).
    #[must_use]
    pub fn build(server: ServerInfo, tools: &[Tool]) -> Self {
        Self::from_descriptors(server, tools.iter().map(ToolDescriptor::from_tool))
    }

    #[must_use]
    pub fn from_descriptors(
        server: ServerInfo,
        descriptors: impl IntoIterator<Item = ToolDescriptor>,
    ) -> Self {
        let mut catalog = Self {
            server,
            ..Self::default()
        };

        for descriptor in descriptors {
            if catalog.paths.insert(&descriptor.name).is_none() {
                tracing::warn!(tool = %descriptor.name, "duplicate tool name; skipping");
                continue;
            }
            catalog
                .index
                .insert(descriptor.name.clone(), catalog.tools.len());
            catalog.tools.push(descriptor);
        }

        catalog
    }

    #[must_use]
    pub fn server(&self) -> &ServerInfo {
        &self.server
    }

    /// Descriptors in discovery order.
    #[must_use]
    pub fn tools(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    #[must_use]
    pub fn paths(&self) -> &PathMap {
        &self.paths
    }

    #[must_use]
    pub fn get(&self, tool_name: &str) -> Option<&ToolDescriptor> {
        self.index.get(tool_name).map(|&i| &self.tools[i])
    }

    /// Resolve a request path segment to its tool.
    #[must_use]
    pub fn resolve(&self, path: &str) -> Option<&ToolDescriptor> {
        self.paths.tool_name(path).and_then(|name| self.get(name))
    }

    /// Iterate `(path, descriptor)` pairs in discovery order.
    pub fn routes(&self) -> impl Iterator<Item = (&str, &ToolDescriptor)> {
        self.tools.iter().filter_map(|d| {
            self.paths
                .path_for(&d.name)
                .map(|path| (path, d))
        })
    }

    #[must_use]
    pub fn mappings(&self) -> Vec<ToolMapping> {
        self.routes()
            .map(|(path, d)| ToolMapping {
                path: path.to_string(),
                tool: d.name.clone(),
                description: d.description.clone(),
            })
            .collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
