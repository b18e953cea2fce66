//! Expose the tools of an MCP server as a plain HTTP API described by OpenAPI 3.1.
//!
//! The bridge keeps one streamable-HTTP session to the upstream MCP server, discovers its
//! tools, publishes one `POST /{tool-path}` operation per tool and forwards each call.

pub mod catalog;
pub mod config;
pub mod descriptor;
pub mod error;
pub mod invocation;
pub mod sanitize;
pub mod schema;
pub mod server;
pub mod session;
pub mod streamable_http;
pub mod upstream;

pub use error::{BridgeError, Result};
