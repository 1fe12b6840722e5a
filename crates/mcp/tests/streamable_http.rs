//! Integration tests for the MCP client against an in-process fake server.
//!
//! These tests verify that the client correctly handles:
//! - Lazy session initialization and session id propagation
//! - Structured, text and SSE-framed tool results
//! - Tool-level and JSON-RPC errors
//! - End-to-end plan execution through the interpreter

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use toolplan_core::{ErrorKind, Plan, PlanError, PlanInterpreter, ToolInvoker};
use toolplan_mcp::{McpError, McpToolInvoker};

const SESSION_ID: &str = "session-7f3a";

#[derive(Clone, Debug)]
struct Recorded {
    method: String,
    session: Option<String>,
    authorization: Option<String>,
    params: Value,
}

#[derive(Default)]
struct FakeServer {
    requests: Mutex<Vec<Recorded>>,
}

impl FakeServer {
    fn requests(&self) -> Vec<Recorded> {
        match self.requests.lock() {
            Ok(requests) => requests.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn methods(&self) -> Vec<String> {
        self.requests().into_iter().map(|request| request.method).collect()
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers.get(name).and_then(|value| value.to_str().ok()).map(str::to_string)
}

async fn handle(
    State(server): State<Arc<FakeServer>>,
    headers: HeaderMap,
    Json(request): Json<Value>,
) -> Response {
    let method = request["method"].as_str().unwrap_or_default().to_string();
    let session = header(&headers, "mcp-session-id");
    if let Ok(mut requests) = server.requests.lock() {
        requests.push(Recorded {
            method: method.clone(),
            session: session.clone(),
            authorization: header(&headers, "authorization"),
            params: request["params"].clone(),
        });
    }

    let id = request["id"].clone();
    if method == "initialize" {
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2025-03-26",
                "capabilities": {"tools": {}},
                "serverInfo": {"name": "fake-tools", "version": "0.0.1"}
            }
        });
        return (StatusCode::OK, [("mcp-session-id", SESSION_ID)], Json(body)).into_response();
    }

    if session.as_deref() != Some(SESSION_ID) {
        return (StatusCode::BAD_REQUEST, "missing or unknown session").into_response();
    }

    match method.as_str() {
        "notifications/initialized" => StatusCode::ACCEPTED.into_response(),
        "tools/list" => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {"tools": [
                {"name": "get_id", "description": "Look up an id", "inputSchema": {"type": "object"}},
                {"name": "list_items", "inputSchema": {"type": "object"}}
            ]}
        }))
        .into_response(),
        "tools/call" => call_tool(id, &request["params"]),
        _ => Json(json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": {"code": -32601, "message": format!("Method not found: {method}")}
        }))
        .into_response(),
    }
}

fn call_tool(id: Value, params: &Value) -> Response {
    let name = params["name"].as_str().unwrap_or_default();
    let arguments = params["arguments"].clone();

    let result = match name {
        "get_id" => json!({
            "content": [{"type": "text", "text": "{\"result\": \"ocid1.compartment.oc1..abc\"}"}],
            "structuredContent": {"result": "ocid1.compartment.oc1..abc"},
            "isError": false
        }),
        "list_items" => json!({
            "content": [{
                "type": "text",
                "text": json!([{"name": "vm-1", "compartment": arguments["compartment_id"]}])
                    .to_string()
            }],
            "isError": false
        }),
        "streamed" => {
            let body = json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {"content": [{"type": "text", "text": "streamed hello"}]}
            });
            let framed = format!("event: message\ndata: {body}\n\n");
            return ([("content-type", "text/event-stream")], framed).into_response();
        }
        "broken" => json!({
            "content": [{"type": "text", "text": "compartment not found"}],
            "isError": true
        }),
        other => {
            return Json(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32602, "message": format!("Unknown tool: {other}")}
            }))
            .into_response();
        }
    };

    Json(json!({"jsonrpc": "2.0", "id": id, "result": result})).into_response()
}

async fn spawn_server() -> (Arc<FakeServer>, String) {
    let server = Arc::new(FakeServer::default());
    let app = Router::new().route("/mcp", post(handle)).with_state(server.clone());
    let listener =
        tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("listener should bind");
    let address = listener.local_addr().expect("listener address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (server, format!("http://{address}/mcp"))
}

fn invoker(endpoint: &str) -> McpToolInvoker {
    McpToolInvoker::new(endpoint, Duration::from_secs(5), None).expect("client should build")
}

#[tokio::test]
async fn session_is_opened_once_and_reused() {
    let (server, endpoint) = spawn_server().await;
    let client = invoker(&endpoint);

    let tools = client.list_tools().await.expect("tools/list should succeed");
    let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
    assert_eq!(names, vec!["get_id", "list_items"]);
    assert_eq!(tools[0].description.as_deref(), Some("Look up an id"));

    client.call_tool("get_id", &Map::new()).await.expect("tools/call should succeed");

    assert_eq!(
        server.methods(),
        vec!["initialize", "notifications/initialized", "tools/list", "tools/call"]
    );
    let requests = server.requests();
    assert_eq!(requests[0].session, None);
    assert!(requests[1..].iter().all(|request| request.session.as_deref() == Some(SESSION_ID)));
    assert_eq!(requests[0].params["protocolVersion"], json!("2025-03-26"));
    assert_eq!(client.session_id().await.as_deref(), Some(SESSION_ID));
}

#[tokio::test]
async fn call_tool_sends_name_and_arguments() {
    let (server, endpoint) = spawn_server().await;
    let client = invoker(&endpoint);

    let mut args = Map::new();
    args.insert("compartment_id".to_string(), json!("ocid1.compartment.oc1..abc"));
    let raw = client.call_tool("list_items", &args).await.expect("call should succeed");

    assert_eq!(raw.structured_content, None);
    assert_eq!(raw.content.len(), 1);

    let call = server
        .requests()
        .into_iter()
        .find(|request| request.method == "tools/call")
        .expect("a tools/call request should be recorded");
    assert_eq!(call.params["name"], json!("list_items"));
    assert_eq!(call.params["arguments"], json!({"compartment_id": "ocid1.compartment.oc1..abc"}));
}

#[tokio::test]
async fn sse_framed_results_are_decoded() {
    let (_server, endpoint) = spawn_server().await;
    let client = invoker(&endpoint);

    let raw = client.call_tool("streamed", &Map::new()).await.expect("sse call should succeed");
    assert_eq!(raw.joined_text(), "streamed hello");
}

#[tokio::test]
async fn tool_errors_and_rpc_errors_are_tool_failures() {
    let (_server, endpoint) = spawn_server().await;
    let client = invoker(&endpoint);

    match client.call_tool("broken", &Map::new()).await {
        Err(McpError::ToolFailed { tool, message }) => {
            assert_eq!(tool, "broken");
            assert_eq!(message, "compartment not found");
        }
        other => panic!("expected tool failure, got {other:?}"),
    }

    let error = client.invoke("missing_tool", &Map::new()).await.expect_err("unknown tool fails");
    assert_eq!(error.kind(), ErrorKind::ToolError);
    assert!(error.to_string().contains("Unknown tool: missing_tool"));
}

#[tokio::test]
async fn auth_token_is_forwarded_as_is() {
    let (server, endpoint) = spawn_server().await;
    let client = McpToolInvoker::new(
        endpoint,
        Duration::from_secs(5),
        Some("Bearer local-token".to_string().into()),
    )
    .expect("client should build");

    client.list_tools().await.expect("tools/list should succeed");

    assert!(server
        .requests()
        .iter()
        .all(|request| request.authorization.as_deref() == Some("Bearer local-token")));
}

#[tokio::test]
async fn plan_runs_end_to_end_over_mcp() {
    let (_server, endpoint) = spawn_server().await;
    let client = invoker(&endpoint);
    let plan = Plan::from_json_str(
        r#"{"steps": [
            {"tool": "get_id", "args": {"path": "odi/x"}, "save_as": "id"},
            {"tool": "list_items", "args": {"compartment_id": "$id"}, "save_as": "items"}
        ]}"#,
    )
    .expect("plan should parse");

    let result = PlanInterpreter.execute(&plan, &client).await.expect("plan should run");

    assert_eq!(result.variables.get("id"), Some(&json!("ocid1.compartment.oc1..abc")));
    assert_eq!(
        result.variables.get("items"),
        Some(&json!([{"name": "vm-1", "compartment": "ocid1.compartment.oc1..abc"}]))
    );
    assert_eq!(result.steps.len(), 2);
}

#[tokio::test]
async fn failing_step_reports_tool_error_with_position() {
    let (_server, endpoint) = spawn_server().await;
    let client = invoker(&endpoint);
    let plan = Plan::from_json_str(
        r#"{"steps": [
            {"tool": "get_id", "save_as": "id"},
            {"tool": "broken", "args": {"compartment_id": "$id"}}
        ]}"#,
    )
    .expect("plan should parse");

    match PlanInterpreter.execute(&plan, &client).await {
        Err(error @ PlanError::Invocation { .. }) => {
            assert_eq!(error.kind(), ErrorKind::ToolError);
            assert_eq!(error.step(), Some(2));
            assert_eq!(error.tool(), Some("broken"));
        }
        other => panic!("expected invocation failure, got {other:?}"),
    }
}
