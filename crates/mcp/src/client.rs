use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, info};

use toolplan_core::config::McpConfig;
use toolplan_core::{InvocationError, RawToolResult, ToolInvoker};

use crate::protocol::{
    decode_body, initialize_params, JsonRpcRequest, ToolDescriptor, ToolsListResult,
    ACCEPT_HEADER_VALUE, PROTOCOL_VERSION, PROTOCOL_VERSION_HEADER, SESSION_HEADER,
};
use crate::{McpError, McpResult};

const CLIENT_NAME: &str = "toolplan";

#[derive(Clone, Debug, Default)]
struct Session {
    id: Option<String>,
}

/// MCP client over the streamable HTTP transport.
///
/// The session is opened lazily on first use and reused for every later
/// request. Servers that do not hand out a session id are treated as
/// stateless.
pub struct McpToolInvoker {
    http: reqwest::Client,
    endpoint: String,
    auth_header: Option<HeaderValue>,
    session: Mutex<Option<Session>>,
    next_id: AtomicU64,
}

impl McpToolInvoker {
    pub fn new(
        endpoint: impl Into<String>,
        timeout: Duration,
        auth_token: Option<SecretString>,
    ) -> McpResult<Self> {
        let endpoint = endpoint.into();
        if endpoint.trim().is_empty() {
            return Err(McpError::InvalidConfig("endpoint must not be empty".to_string()));
        }

        let auth_header = match auth_token {
            Some(token) => {
                let mut value = HeaderValue::from_str(token.expose_secret()).map_err(|_| {
                    McpError::InvalidConfig("auth token is not a valid header value".to_string())
                })?;
                value.set_sensitive(true);
                Some(value)
            }
            None => None,
        };

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| McpError::InvalidConfig(error.to_string()))?;

        Ok(Self { http, endpoint, auth_header, session: Mutex::new(None), next_id: AtomicU64::new(1) })
    }

    pub fn from_config(config: &McpConfig) -> McpResult<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
            config.auth_token.clone(),
        )
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Session id assigned by the server, if a session is open and has one.
    pub async fn session_id(&self) -> Option<String> {
        self.session.lock().await.as_ref().and_then(|session| session.id.clone())
    }

    pub async fn list_tools(&self) -> McpResult<Vec<ToolDescriptor>> {
        let result = self.request("tools/list", serde_json::json!({})).await?;
        let listed: ToolsListResult = serde_json::from_value(result)
            .map_err(|error| McpError::Decode(format!("tools/list result: {error}")))?;
        Ok(listed.tools)
    }

    /// Calls a tool. A result flagged `isError` becomes [`McpError::ToolFailed`].
    pub async fn call_tool(&self, tool: &str, args: &Map<String, Value>) -> McpResult<RawToolResult> {
        let params = serde_json::json!({ "name": tool, "arguments": args });
        let result = self.request("tools/call", params).await?;
        let raw: RawToolResult = serde_json::from_value(result)
            .map_err(|error| McpError::Decode(format!("tools/call result: {error}")))?;

        if raw.is_error {
            let message = raw.joined_text();
            let message =
                if message.is_empty() { "tool reported an error".to_string() } else { message };
            return Err(McpError::ToolFailed { tool: tool.to_string(), message });
        }

        Ok(raw)
    }

    async fn request(&self, method: &str, params: Value) -> McpResult<Value> {
        let session_id = self.ensure_session().await?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(event_name = "mcp.request", method, id, "sending MCP request");

        let (body, _) =
            self.post(&JsonRpcRequest::call(id, method, params), session_id.as_deref()).await?;
        decode_body(&body)?.into_result()
    }

    async fn ensure_session(&self) -> McpResult<Option<String>> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            return Ok(session.id.clone());
        }

        let session = self.open_session().await?;
        let id = session.id.clone();
        *guard = Some(session);
        Ok(id)
    }

    async fn open_session(&self) -> McpResult<Session> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let params = initialize_params(CLIENT_NAME, env!("CARGO_PKG_VERSION"));
        let (body, session_id) =
            self.post(&JsonRpcRequest::call(id, "initialize", params), None).await?;
        let result = decode_body(&body)?.into_result()?;

        let server = result
            .get("serverInfo")
            .and_then(|info| info.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            event_name = "mcp.session.opened",
            endpoint = %self.endpoint,
            server,
            stateful = session_id.is_some(),
            "MCP session initialized"
        );

        self.post(&JsonRpcRequest::notification("notifications/initialized"), session_id.as_deref())
            .await?;

        Ok(Session { id: session_id })
    }

    /// Posts one JSON-RPC message; returns the body and any session id header.
    async fn post(
        &self,
        message: &JsonRpcRequest<'_>,
        session_id: Option<&str>,
    ) -> McpResult<(String, Option<String>)> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_HEADER_VALUE));
        headers.insert(PROTOCOL_VERSION_HEADER, HeaderValue::from_static(PROTOCOL_VERSION));
        if let Some(session_id) = session_id {
            let value = HeaderValue::from_str(session_id).map_err(|_| {
                McpError::Decode(format!("server issued an invalid session id `{session_id}`"))
            })?;
            headers.insert(SESSION_HEADER, value);
        }
        if let Some(auth) = &self.auth_header {
            headers.insert(AUTHORIZATION, auth.clone());
        }

        let response = self
            .http
            .post(&self.endpoint)
            .headers(headers)
            .json(message)
            .send()
            .await
            .map_err(|error| McpError::Network(error.to_string()))?;

        let status = response.status();
        let issued_session = response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let body = response.text().await.map_err(|error| McpError::Network(error.to_string()))?;

        if !status.is_success() {
            let preview: String = body.chars().take(200).collect();
            return Err(McpError::Http { status: status.as_u16(), body: preview });
        }

        Ok((body, issued_session))
    }
}

#[async_trait]
impl ToolInvoker for McpToolInvoker {
    async fn invoke(
        &self,
        tool: &str,
        args: &Map<String, Value>,
    ) -> Result<RawToolResult, InvocationError> {
        self.call_tool(tool, args).await.map_err(InvocationError::from)
    }
}
