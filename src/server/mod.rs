//! Stdio MCP server loop
//!
//! Reads line-delimited JSON-RPC from stdin, writes responses to stdout.
//! Tool calls run as spawned tasks so a slow upstream request does not
//! block the read loop; a single writer task serializes output lines.

use std::sync::Arc;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::error::rpc_codes;
use crate::protocol::{
    CallToolParams, CallToolResult, Content, Info, InitializeResult, JsonRpcMessage,
    JsonRpcRequest, JsonRpcResponse, ListToolsResult, PROTOCOL_VERSION, ServerCapabilities,
    ToolsCapability,
};
use crate::tools::ToolRegistry;
use crate::Result;

/// MCP server over stdio
pub struct Server {
    registry: Arc<ToolRegistry>,
}

impl Server {
    /// Create a server over the given tool registry
    #[must_use]
    pub fn new(registry: ToolRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    /// Run until stdin closes
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();

        let (tx, mut rx) = mpsc::unbounded_channel::<String>();

        // Single writer task so concurrent handlers never interleave lines
        let writer = tokio::spawn(async move {
            let mut stdout = tokio::io::stdout();
            while let Some(line) = rx.recv().await {
                if stdout.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if stdout.write_all(b"\n").await.is_err() {
                    break;
                }
                if stdout.flush().await.is_err() {
                    break;
                }
            }
        });

        info!("MCP server listening on stdio");

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }

            let message: JsonRpcMessage = match serde_json::from_str(&line) {
                Ok(message) => message,
                Err(e) => {
                    warn!(error = %e, "Failed to parse incoming message");
                    send(
                        &tx,
                        &JsonRpcResponse::error(None, rpc_codes::PARSE_ERROR, "Parse error"),
                    );
                    continue;
                }
            };

            match message {
                JsonRpcMessage::Request(request) => {
                    let registry = Arc::clone(&self.registry);
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let response = handle_request(&registry, request).await;
                        send(&tx, &response);
                    });
                }
                JsonRpcMessage::Notification(notification) => {
                    debug!(method = %notification.method, "Notification received");
                }
            }
        }

        drop(tx);
        let _ = writer.await;
        info!("stdin closed, shutting down");
        Ok(())
    }
}

fn send(tx: &mpsc::UnboundedSender<String>, response: &JsonRpcResponse) {
    match serde_json::to_string(response) {
        Ok(line) => {
            let _ = tx.send(line);
        }
        Err(e) => error!(error = %e, "Failed to serialize response"),
    }
}

async fn handle_request(registry: &ToolRegistry, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.clone();
    debug!(method = %request.method, id = %id, "Handling request");

    match request.method.as_str() {
        "initialize" => JsonRpcResponse::success(id, initialize_result()),
        "ping" => JsonRpcResponse::success(id, json!({})),
        "tools/list" => {
            let result = ListToolsResult {
                tools: registry.list(),
            };
            match serde_json::to_value(&result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => {
                    JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string())
                }
            }
        }
        "tools/call" => {
            let params: CallToolParams =
                match serde_json::from_value(request.params.unwrap_or(Value::Null)) {
                    Ok(params) => params,
                    Err(e) => {
                        return JsonRpcResponse::error(
                            Some(id),
                            rpc_codes::INVALID_PARAMS,
                            format!("Invalid tools/call params: {e}"),
                        );
                    }
                };

            let result = call_tool(registry, &params.name, &params.arguments).await;
            match serde_json::to_value(&result) {
                Ok(value) => JsonRpcResponse::success(id, value),
                Err(e) => {
                    JsonRpcResponse::error(Some(id), rpc_codes::INTERNAL_ERROR, e.to_string())
                }
            }
        }
        other => JsonRpcResponse::error(
            Some(id),
            rpc_codes::METHOD_NOT_FOUND,
            format!("Method not found: {other}"),
        ),
    }
}

fn initialize_result() -> Value {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_string(),
        capabilities: ServerCapabilities {
            tools: Some(ToolsCapability {
                list_changed: Some(false),
            }),
        },
        server_info: Info {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
    };
    // InitializeResult contains only plain fields, serialization cannot fail
    serde_json::to_value(&result).unwrap_or_else(|_| json!({}))
}

/// Run one tool and fold failures into a `CallToolResult` with `isError`
/// set, so the assistant sees a structured error instead of an RPC fault.
async fn call_tool(registry: &ToolRegistry, name: &str, args: &Value) -> CallToolResult {
    match registry.call(name, args).await {
        Ok(value) => CallToolResult {
            content: vec![Content::Text {
                text: serde_json::to_string_pretty(&value).unwrap_or_else(|_| value.to_string()),
            }],
            is_error: None,
        },
        Err(e) => {
            warn!(tool = %name, error = %e, "Tool call failed");
            let body = json!({
                "error": true,
                "error_type": e.kind(),
                "message": e.to_string(),
            });
            CallToolResult {
                content: vec![Content::Text {
                    text: body.to_string(),
                }],
                is_error: Some(true),
            }
        }
    }
}
