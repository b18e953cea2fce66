//! Tool name ↔ URL path segment mapping.
//!
//! MCP tool names are arbitrary strings; paths and `operationId`s are not. Names are slugged
//! deterministically and collisions get a numeric suffix (`-2`, `-3`, ...) in discovery order,
//! so the map is a bijection for the lifetime of one discovery session.

use std::collections::HashMap;

const MAX_SLUG_LEN: usize = 64;
const EMPTY_SLUG: &str = "tool";

/// Slug a tool name into `[A-Za-z0-9_-]+`.
#[must_use]
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }

    let mut slug = slug.trim_matches('-').to_string();
    // ASCII only, so byte truncation is char-safe.
    slug.truncate(MAX_SLUG_LEN);
    let slug = slug.trim_end_matches('-');

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Bidirectional tool name ↔ path segment map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathMap {
    /// path segment -> original tool name
    by_path: HashMap<String, String>,
    /// original tool name -> path segment
    by_name: HashMap<String, String>,
}

impl PathMap {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve a path for `name`.
    ///
    /// Returns `None` (and leaves the map untouched) if `name` is already mapped.
    pub fn insert(&mut self, name: &str) -> Option<String> {
        if self.by_name.contains_key(name) {
            return None;
        }

        let base = slugify(name);
        let path = if self.by_path.contains_key(&base) {
            let mut counter = 2;
            loop {
                let candidate = format!("{base}-{counter}");
                if !self.by_path.contains_key(&candidate) {
                    break candidate;
                }
                counter += 1;
            }
        } else {
            base
        };

        self.by_path.insert(path.clone(), name.to_string());
        self.by_name.insert(name.to_string(), path.clone());
        Some(path)
    }

    /// Resolve a path segment back to the original tool name.
    #[must_use]
    pub fn tool_name(&self, path: &str) -> Option<&str> {
        self.by_path.get(path).map(String::as_str)
    }

    #[must_use]
    pub fn path_for(&self, name: &str) -> Option<&str> {
        self.by_name.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_path.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_path.is_empty()
    }
}
