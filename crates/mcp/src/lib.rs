//! Toolplan MCP (Model Context Protocol) client
//!
//! This crate provides the tool invoker used by the plan interpreter when
//! tools live behind an MCP server speaking the streamable HTTP transport.
//!
//! ## Architecture
//!
//! - `McpToolInvoker`: session-aware client implementing `ToolInvoker`
//! - `protocol`: JSON-RPC envelopes, tool descriptors and SSE body decoding
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::time::Duration;
//! use toolplan_core::{Plan, PlanInterpreter};
//! use toolplan_mcp::McpToolInvoker;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let invoker =
//!         McpToolInvoker::new("http://localhost:8000/mcp", Duration::from_secs(120), None)?;
//!     let plan = Plan::from_json_str(r#"{"steps": [{"tool": "list_regions"}]}"#)?;
//!     let result = PlanInterpreter.execute(&plan, &invoker).await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

mod client;
pub mod protocol;

pub use client::McpToolInvoker;
pub use protocol::ToolDescriptor;

use thiserror::Error;
use toolplan_core::InvocationError;

/// Errors raised while talking to an MCP server
#[derive(Error, Debug)]
pub enum McpError {
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),

    #[error("request to MCP server failed: {0}")]
    Network(String),

    #[error("MCP server returned HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("could not decode MCP response: {0}")]
    Decode(String),

    #[error("MCP error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("tool `{tool}` reported an error: {message}")]
    ToolFailed { tool: String, message: String },
}

impl From<McpError> for InvocationError {
    fn from(error: McpError) -> Self {
        match error {
            McpError::Rpc { message, .. } => InvocationError::Tool(message),
            McpError::ToolFailed { message, .. } => InvocationError::Tool(message),
            other => InvocationError::Transport(other.to_string()),
        }
    }
}

/// Result type for MCP operations
pub type McpResult<T> = Result<T, McpError>;

#[cfg(test)]
mod tests {
    use toolplan_core::{ErrorKind, InvocationError};

    use super::McpError;

    #[test]
    fn rpc_and_tool_failures_map_to_tool_errors() {
        let rpc: InvocationError =
            McpError::Rpc { code: -32602, message: "unknown tool: nope".to_string() }.into();
        assert_eq!(rpc.kind(), ErrorKind::ToolError);
        assert_eq!(rpc.to_string(), InvocationError::Tool("unknown tool: nope".into()).to_string());

        let failed: InvocationError = McpError::ToolFailed {
            tool: "get_compartment".to_string(),
            message: "compartment not found".to_string(),
        }
        .into();
        assert_eq!(failed.kind(), ErrorKind::ToolError);
    }

    #[test]
    fn wire_failures_map_to_transport_errors() {
        let errors = [
            McpError::Network("connection refused".to_string()),
            McpError::Http { status: 502, body: "bad gateway".to_string() },
            McpError::Decode("expected value".to_string()),
        ];

        for error in errors {
            let mapped: InvocationError = error.into();
            assert_eq!(mapped.kind(), ErrorKind::TransportError);
        }
    }
}
