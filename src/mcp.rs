use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::{debug, info, warn};

use crate::engine::LogEngine;
use crate::error::{LogQueryError, Result};
use crate::model::{AggregateRequest, QueryFilter};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "json-logs-mcp";

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const ENGINE_ERROR: i32 = -32001;

#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    #[serde(default)]
    pub id: Value,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl RpcRequest {
    fn is_notification(&self) -> bool {
        self.id.is_null()
    }
}

#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

#[derive(Debug, Serialize)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcResponse {
    fn ok(id: Value, result: Value) -> Self {
        Self { jsonrpc: "2.0", id, result: Some(result), error: None }
    }

    fn err(id: Value, code: i32, message: String, data: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            result: None,
            error: Some(RpcError { code, message, data }),
        }
    }
}

/// Failure of a tool call: either a protocol problem or an engine error.
enum ToolFailure {
    Protocol(i32, String),
    Engine(LogQueryError),
}

pub async fn run_stdio(engine: Arc<LogEngine>) -> Result<()> {
    info!("serving MCP over stdio");
    serve_lines(engine, BufReader::new(tokio::io::stdin()), tokio::io::stdout()).await
}

/// Newline-delimited JSON-RPC loop. Requests are answered one at a time, in
/// order; each one is processed on the blocking pool.
pub async fn serve_lines<R, W>(engine: Arc<LogEngine>, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }
        let resp = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(req) => {
                let engine = engine.clone();
                tokio::task::spawn_blocking(move || process_request(&engine, req))
                    .await
                    .map_err(|e| LogQueryError::Io(std::io::Error::other(e.to_string())))?
            }
            Err(e) => Some(RpcResponse::err(Value::Null, PARSE_ERROR, format!("parse error: {e}"), None)),
        };
        if let Some(resp) = resp {
            write_response(&mut writer, &resp).await?;
        }
    }
    Ok(())
}

/// Dispatch one request. Notifications produce no response.
pub fn process_request(engine: &LogEngine, req: RpcRequest) -> Option<RpcResponse> {
    debug!("rpc method {}", req.method);
    let resp = match req.method.as_str() {
        "initialize" => RpcResponse::ok(req.id.clone(), initialize_result()),
        "notifications/initialized" | "notifications/cancelled" => {
            if req.is_notification() {
                return None;
            }
            RpcResponse::ok(req.id.clone(), json!({}))
        }
        "ping" => RpcResponse::ok(req.id.clone(), json!({})),
        "tools/list" | "list_tools" => RpcResponse::ok(req.id.clone(), json!({ "tools": tool_definitions() })),
        "tools/call" => handle_tool_call(engine, &req),
        "resources/list" => match engine.list_resources() {
            Ok(list) => RpcResponse::ok(req.id.clone(), json!({ "resources": list })),
            Err(e) => engine_error(&req, e),
        },
        "resources/read" => handle_read_resource(engine, &req),
        "list_log_files" | "query_logs" | "aggregate_logs" | "get_log_stats" => {
            match call_tool(engine, &req.method, req.params.clone()) {
                Ok(value) => RpcResponse::ok(req.id.clone(), value),
                Err(ToolFailure::Protocol(code, msg)) => RpcResponse::err(req.id.clone(), code, msg, None),
                Err(ToolFailure::Engine(e)) => engine_error(&req, e),
            }
        }
        _ => {
            if req.is_notification() {
                return None;
            }
            RpcResponse::err(
                req.id.clone(),
                METHOD_NOT_FOUND,
                format!("method not found: {}", req.method),
                None,
            )
        }
    };
    Some(resp)
}

fn initialize_result() -> Value {
    json!({
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "tools": {},
            "resources": {}
        },
        "serverInfo": {
            "name": SERVER_NAME,
            "version": env!("CARGO_PKG_VERSION")
        }
    })
}

#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

fn handle_tool_call(engine: &LogEngine, req: &RpcRequest) -> RpcResponse {
    let params: ToolCallParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return RpcResponse::err(req.id.clone(), INVALID_PARAMS, format!("invalid params: {e}"), None),
    };

    match call_tool(engine, &params.name, params.arguments) {
        Ok(value) => {
            let text = serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string());
            RpcResponse::ok(
                req.id.clone(),
                json!({
                    "content": [{ "type": "text", "text": text }],
                    "structuredContent": value,
                    "isError": false
                }),
            )
        }
        Err(ToolFailure::Protocol(code, msg)) => RpcResponse::err(req.id.clone(), code, msg, None),
        Err(ToolFailure::Engine(e)) => {
            warn!("tool {} failed: {}", params.name, e);
            RpcResponse::ok(
                req.id.clone(),
                json!({
                    "content": [{ "type": "text", "text": format!("Error: {e}") }],
                    "structuredContent": e.to_json(),
                    "isError": true
                }),
            )
        }
    }
}

fn call_tool(engine: &LogEngine, name: &str, arguments: Value) -> std::result::Result<Value, ToolFailure> {
    // clients send either no arguments or an empty object for argument-less tools
    let arguments = if arguments.is_null() { json!({}) } else { arguments };
    let result = match name {
        "list_log_files" => engine.list_log_files().map(to_value),
        "query_logs" => {
            let filter: QueryFilter = decode_args(arguments)?;
            engine.query_logs(&filter).map(to_value)
        }
        "aggregate_logs" => {
            let args: AggregateRequest = decode_args(arguments)?;
            engine.aggregate_logs(args.files.as_deref(), &args.group_by).map(to_value)
        }
        "get_log_stats" => engine.get_log_stats().map(to_value),
        other => return Err(ToolFailure::Protocol(INVALID_PARAMS, format!("unknown tool: {other}"))),
    };
    result.map_err(ToolFailure::Engine)
}

fn decode_args<T: serde::de::DeserializeOwned>(arguments: Value) -> std::result::Result<T, ToolFailure> {
    serde_json::from_value(arguments)
        .map_err(|e| ToolFailure::Protocol(INVALID_PARAMS, format!("invalid arguments: {e}")))
}

fn to_value<T: Serialize>(v: T) -> Value {
    serde_json::to_value(v).unwrap_or(Value::Null)
}

#[derive(Debug, Deserialize)]
struct ReadResourceParams {
    uri: String,
}

fn handle_read_resource(engine: &LogEngine, req: &RpcRequest) -> RpcResponse {
    let params: ReadResourceParams = match serde_json::from_value(req.params.clone()) {
        Ok(p) => p,
        Err(e) => return RpcResponse::err(req.id.clone(), INVALID_PARAMS, format!("invalid params: {e}"), None),
    };
    match engine.read_resource(&params.uri) {
        Ok(text) => RpcResponse::ok(
            req.id.clone(),
            json!({
                "contents": [{
                    "uri": params.uri,
                    "mimeType": "application/json",
                    "text": text
                }]
            }),
        ),
        Err(e) => engine_error(req, e),
    }
}

fn engine_error(req: &RpcRequest, e: LogQueryError) -> RpcResponse {
    let code = if e.is_validation() { INVALID_PARAMS } else { ENGINE_ERROR };
    RpcResponse::err(req.id.clone(), code, e.to_string(), Some(e.to_json()))
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, resp: &RpcResponse) -> Result<()> {
    let line = serde_json::to_string(resp).unwrap_or_else(|_| "{}".to_string());
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

pub fn tool_definitions() -> Vec<Value> {
    let files_prop = json!({
        "type": "array",
        "items": { "type": "string" },
        "description": "Log file names to include (default: all files)"
    });
    vec![
        json!({
            "name": "query_logs",
            "description": "Search and filter log entries across log files",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "files": files_prop,
                    "level": { "type": "string", "description": "Filter by log level (DEBUG, INFO, WARNING, ERROR, CRITICAL), case-insensitive" },
                    "module": { "type": "string", "description": "Filter by module name; a trailing * matches a prefix" },
                    "function": { "type": "string", "description": "Filter by function name; a trailing * matches a prefix" },
                    "message_contains": { "type": "string", "description": "Filter by message content (case-insensitive)" },
                    "start_time": { "type": "string", "description": "Inclusive start time (ISO 8601)" },
                    "end_time": { "type": "string", "description": "Inclusive end time (ISO 8601)" },
                    "limit": { "type": "integer", "minimum": 1, "default": 100, "description": "Maximum number of results" }
                }
            }
        }),
        json!({
            "name": "aggregate_logs",
            "description": "Aggregate log data by specified criteria",
            "inputSchema": {
                "type": "object",
                "required": ["group_by"],
                "properties": {
                    "files": files_prop,
                    "group_by": {
                        "type": "string",
                        "enum": ["level", "module", "function", "hour"],
                        "description": "Field to group by"
                    }
                }
            }
        }),
        json!({
            "name": "get_log_stats",
            "description": "Get overall statistics for all log files",
            "inputSchema": { "type": "object", "properties": {} }
        }),
        json!({
            "name": "list_log_files",
            "description": "List available log files with metadata",
            "inputSchema": { "type": "object", "properties": {} }
        }),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use tempfile::tempdir;

    fn engine_for(dir: &std::path::Path) -> LogEngine {
        LogEngine::new(Arc::new(Config::new(dir)))
    }

    fn request(v: Value) -> RpcRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn initialize_and_list_tools() {
        let dir = tempdir().unwrap();
        let engine = engine_for(dir.path());

        let resp = process_request(&engine, request(json!({"id": 1, "method": "initialize"}))).unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], SERVER_NAME);

        let resp = process_request(&engine, request(json!({"id": 2, "method": "tools/list"}))).unwrap();
        let names: Vec<String> = resp.result.unwrap()["tools"]
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["query_logs", "aggregate_logs", "get_log_stats", "list_log_files"]);
    }

    #[test]
    fn initialized_notification_has_no_response() {
        let dir = tempdir().unwrap();
        let engine = engine_for(dir.path());
        let resp = process_request(&engine, request(json!({"method": "notifications/initialized"})));
        assert!(resp.is_none());
    }

    #[test]
    fn tool_call_returns_structured_content() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("app.log"), "{\"level\":\"ERROR\",\"message\":\"boom\"}\n").unwrap();
        let engine = engine_for(dir.path());

        let resp = process_request(
            &engine,
            request(json!({
                "id": 3,
                "method": "tools/call",
                "params": { "name": "query_logs", "arguments": { "level": "error" } }
            })),
        )
        .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["structuredContent"]["total_matched"], 1);
        assert!(result["content"][0]["text"].as_str().unwrap().contains("boom"));
    }

    #[test]
    fn engine_errors_are_flagged_not_empty() {
        let dir = tempdir().unwrap();
        let engine = engine_for(&dir.path().join("missing"));

        let resp = process_request(
            &engine,
            request(json!({
                "id": 4,
                "method": "tools/call",
                "params": { "name": "get_log_stats", "arguments": {} }
            })),
        )
        .unwrap();
        let result = resp.result.unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["structuredContent"]["error"]["kind"], "directory_not_found");
    }

    #[test]
    fn unknown_tool_and_bad_arguments_are_rpc_errors() {
        let dir = tempdir().unwrap();
        let engine = engine_for(dir.path());

        let resp = process_request(
            &engine,
            request(json!({"id": 5, "method": "tools/call", "params": {"name": "drop_logs"}})),
        )
        .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let resp = process_request(
            &engine,
            request(json!({"id": 6, "method": "tools/call", "params": {"name": "query_logs", "arguments": {"limit": "ten"}}})),
        )
        .unwrap();
        assert_eq!(resp.error.unwrap().code, INVALID_PARAMS);

        let resp = process_request(&engine, request(json!({"id": 7, "method": "nope"}))).unwrap();
        assert_eq!(resp.error.unwrap().code, METHOD_NOT_FOUND);
    }

    #[test]
    fn direct_method_maps_validation_errors() {
        let dir = tempdir().unwrap();
        let engine = engine_for(dir.path());
        let resp = process_request(
            &engine,
            request(json!({"id": 8, "method": "aggregate_logs", "params": {"group_by": "weekday"}})),
        )
        .unwrap();
        let err = resp.error.unwrap();
        assert_eq!(err.code, INVALID_PARAMS);
        assert_eq!(err.data.unwrap()["error"]["kind"], "invalid_group_key");
    }

    #[tokio::test]
    async fn serve_lines_answers_in_order() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.log"), "{}\n").unwrap();
        let engine = Arc::new(engine_for(dir.path()));

        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "garbage\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"list_log_files\"}\n",
        );
        let mut out: Vec<u8> = Vec::new();
        serve_lines(engine, input.as_bytes(), &mut out).await.unwrap();

        let lines: Vec<Value> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(lines[2]["result"]["files"][0]["name"], "a.log");
    }

    #[tokio::test(flavor = "current_thread")]
    async fn stdio_loop_keeps_the_runtime_free() {
        let dir = tempdir().unwrap();
        let body: String = (0..2000).map(|i| format!("{{\"level\":\"INFO\",\"line\":{i}}}\n")).collect();
        std::fs::write(dir.path().join("big.log"), body).unwrap();
        let engine = Arc::new(engine_for(dir.path()));

        let input: String = (1..=20)
            .map(|id| format!("{{\"jsonrpc\":\"2.0\",\"id\":{id},\"method\":\"get_log_stats\"}}\n"))
            .collect();
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = ticks.clone();
        let ticker = tokio::spawn(async move {
            loop {
                counter.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                tokio::task::yield_now().await;
            }
        });

        let mut out: Vec<u8> = Vec::new();
        serve_lines(engine, std::io::Cursor::new(input.into_bytes()), &mut out).await.unwrap();
        ticker.abort();

        let answered = String::from_utf8(out).unwrap().lines().count();
        assert_eq!(answered, 20);
        // the single runtime thread kept running other tasks while requests were processed
        assert!(ticks.load(std::sync::atomic::Ordering::Relaxed) > 0);
    }
}
