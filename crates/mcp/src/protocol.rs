//! JSON-RPC envelopes for the MCP streamable HTTP transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::McpError;

pub const JSONRPC_VERSION: &str = "2.0";
pub const PROTOCOL_VERSION: &str = "2025-03-26";
pub const SESSION_HEADER: &str = "mcp-session-id";
pub const PROTOCOL_VERSION_HEADER: &str = "mcp-protocol-version";
pub const ACCEPT_HEADER_VALUE: &str = "application/json, text/event-stream";

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl<'a> JsonRpcRequest<'a> {
    pub fn call(id: u64, method: &'a str, params: Value) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id: Some(id), method, params: Some(params) }
    }

    /// Requests without an id expect no response body.
    pub fn notification(method: &'a str) -> Self {
        Self { jsonrpc: JSONRPC_VERSION, id: None, method, params: None }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn into_result(self) -> Result<Value, McpError> {
        if let Some(error) = self.error {
            return Err(McpError::Rpc { code: error.code, message: error.message });
        }
        self.result
            .ok_or_else(|| McpError::Decode("response has neither 'result' nor 'error'".into()))
    }
}

/// A tool advertised by `tools/list`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub input_schema: Value,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

pub fn initialize_params(client_name: &str, client_version: &str) -> Value {
    serde_json::json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {},
        "clientInfo": {
            "name": client_name,
            "version": client_version
        }
    })
}

/// Decodes a response body that is either plain JSON or an SSE stream
/// whose `data:` frames carry the JSON-RPC message.
pub fn decode_body(body: &str) -> Result<JsonRpcResponse, McpError> {
    let payload = extract_sse_data(body).unwrap_or_else(|| body.trim().to_string());
    serde_json::from_str(&payload).map_err(|error| {
        let preview: String = payload.chars().take(200).collect();
        McpError::Decode(format!("{error} (body: {preview})"))
    })
}

/// Returns the last SSE event whose data is a JSON document.
pub fn extract_sse_data(body: &str) -> Option<String> {
    let mut events: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut in_data = false;

    for line in body.lines() {
        let trimmed = line.trim_end_matches('\r').trim_start();
        if let Some(rest) = trimmed.strip_prefix("data:") {
            if !in_data {
                current.clear();
                in_data = true;
            }
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(rest.trim_start());
            continue;
        }
        if trimmed.is_empty() || trimmed.starts_with("event:") {
            if in_data && !current.is_empty() {
                events.push(std::mem::take(&mut current));
            }
            in_data = false;
        }
    }
    if in_data && !current.is_empty() {
        events.push(current);
    }

    events.into_iter().rev().find(|event| {
        let trimmed = event.trim_start();
        (trimmed.starts_with('{') || trimmed.starts_with('['))
            && serde_json::from_str::<Value>(trimmed).is_ok()
    })
}
