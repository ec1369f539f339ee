use crate::error::{BridgeError, Result};
use crate::index::IndexManager;
use crate::mcp::tools;
use crate::mcp::types::*;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader as AsyncBufReader};

/// MCP server speaking JSON-RPC 2.0 over stdio, newline-delimited.
///
/// Logs go to stderr; stdout carries only protocol frames.
pub struct McpServer {
    manager: IndexManager,
}

impl McpServer {
    pub fn new(manager: IndexManager) -> Self {
        Self { manager }
    }

    /// Process one JSON-RPC request and produce the response to send, if any
    /// (notifications get none).
    pub async fn process_request(
        &self,
        request: JsonRpcRequest,
        initialized: &mut bool,
    ) -> Option<JsonRpcResponse> {
        let id = match &request.id {
            Some(id) => id.clone(),
            None => {
                if request.method == "notifications/initialized" {
                    *initialized = true;
                }
                return None;
            }
        };

        let response = match request.method.as_str() {
            "initialize" => self.handle_initialize(&id, &request.params),
            "tools/list" => self.handle_tools_list(&id),
            "tools/call" => self.handle_tools_call(&id, &request.params).await,
            "shutdown" => Ok(result_response(&id, Value::Null)),
            _ => Ok(error_response(
                &id,
                error_codes::METHOD_NOT_FOUND,
                &format!("Unknown method: {}", request.method),
            )),
        };

        Some(response.unwrap_or_else(|e| {
            error_response(&id, error_codes::INTERNAL_ERROR, &format!("Internal error: {}", e))
        }))
    }

    /// Run the server loop: read requests from stdin, write responses to
    /// stdout, until the client disconnects.
    pub async fn run(&self) -> Result<()> {
        let stdin = tokio::io::stdin();
        let mut reader = AsyncBufReader::new(stdin);
        let mut stdout = tokio::io::stdout();

        let mut line = String::new();
        let mut initialized = false;

        log::info!("ctxbridge MCP server v{} ready", env!("CARGO_PKG_VERSION"));

        loop {
            line.clear();
            let bytes_read = reader
                .read_line(&mut line)
                .await
                .map_err(BridgeError::Io)?;
            if bytes_read == 0 {
                break; // EOF, client disconnected
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let request: JsonRpcRequest = match serde_json::from_str(trimmed) {
                Ok(request) => request,
                Err(e) => {
                    if let Some(id) = extract_id_from_line(trimmed) {
                        let response = JsonRpcResponse {
                            jsonrpc: "2.0".to_string(),
                            id,
                            payload: JsonRpcResponsePayload::Error {
                                error: JsonRpcError {
                                    code: error_codes::PARSE_ERROR,
                                    message: format!("Parse error: {}", e),
                                    data: None,
                                },
                            },
                        };
                        send_response(&mut stdout, &response).await?;
                    }
                    continue;
                }
            };

            if let Some(response) = self.process_request(request, &mut initialized).await {
                send_response(&mut stdout, &response).await?;
            }
        }

        log::info!("MCP server shutting down");
        Ok(())
    }

    fn handle_initialize(&self, id: &JsonRpcId, params: &Option<Value>) -> Result<JsonRpcResponse> {
        let params: InitializeParams =
            serde_json::from_value(params.clone().unwrap_or_else(|| serde_json::json!({})))
                .map_err(|e| BridgeError::Config(format!("invalid initialize params: {}", e)))?;

        // Clients on the 2024/2025 protocol revisions are answered with the
        // stable version; anything else is echoed back
        let protocol_version = if params.protocol_version.starts_with("2024")
            || params.protocol_version.starts_with("2025")
        {
            "2024-11-05".to_string()
        } else {
            params.protocol_version.clone()
        };

        let result = InitializeResult {
            protocol_version,
            capabilities: serde_json::json!({ "tools": {} }),
            server_info: ServerInfo {
                name: "ctxbridge".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            },
        };

        Ok(result_response(
            id,
            serde_json::to_value(&result)
                .map_err(|e| BridgeError::Config(format!("JSON serialization error: {}", e)))?,
        ))
    }

    fn handle_tools_list(&self, id: &JsonRpcId) -> Result<JsonRpcResponse> {
        let result = ToolsListResult {
            tools: tools::get_tool_definitions(),
        };
        Ok(result_response(
            id,
            serde_json::to_value(&result)
                .map_err(|e| BridgeError::Config(format!("JSON serialization error: {}", e)))?,
        ))
    }

    async fn handle_tools_call(
        &self,
        id: &JsonRpcId,
        params: &Option<Value>,
    ) -> Result<JsonRpcResponse> {
        let params: ToolsCallParams = serde_json::from_value(
            params
                .clone()
                .ok_or_else(|| BridgeError::Config("missing params for tools/call".to_string()))?,
        )
        .map_err(|e| BridgeError::Config(format!("invalid tools/call params: {}", e)))?;

        // Closed dispatch: the supported tool set is this match
        let result = match params.name.as_str() {
            "search_context" => {
                tools::handle_search_context(&self.manager, &params.arguments).await?
            }
            _ => {
                return Ok(error_response(
                    id,
                    error_codes::INVALID_PARAMS,
                    &format!("Unknown tool: {}", params.name),
                ));
            }
        };

        Ok(result_response(
            id,
            serde_json::to_value(&result)
                .map_err(|e| BridgeError::Config(format!("JSON serialization error: {}", e)))?,
        ))
    }
}

fn result_response(id: &JsonRpcId, result: Value) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.clone().into(),
        payload: JsonRpcResponsePayload::Result { result },
    }
}

fn error_response(id: &JsonRpcId, code: i32, message: &str) -> JsonRpcResponse {
    JsonRpcResponse {
        jsonrpc: "2.0".to_string(),
        id: id.clone().into(),
        payload: JsonRpcResponsePayload::Error {
            error: JsonRpcError {
                code,
                message: message.to_string(),
                data: None,
            },
        },
    }
}

/// Send one newline-delimited JSON-RPC response frame
async fn send_response(stdout: &mut tokio::io::Stdout, response: &JsonRpcResponse) -> Result<()> {
    let json = serde_json::to_string(response)
        .map_err(|e| BridgeError::Config(format!("JSON serialization error: {}", e)))?;
    stdout.write_all(json.as_bytes()).await.map_err(BridgeError::Io)?;
    stdout.write_all(b"\n").await.map_err(BridgeError::Io)?;
    stdout.flush().await.map_err(BridgeError::Io)?;
    Ok(())
}

/// Best-effort ID recovery from a line that failed to parse, so the parse
/// error can still be correlated by the client
fn extract_id_from_line(line: &str) -> Option<Value> {
    let id_start = line.find(r#""id":"#)?;
    let id_str = &line[id_start + 5..];
    let id_end = id_str.find([',', '}'])?;
    let id_val = id_str[..id_end].trim();
    if id_val.starts_with('"') && id_val.ends_with('"') && id_val.len() >= 2 {
        return Some(Value::String(id_val[1..id_val.len() - 1].to_string()));
    }
    id_val.parse::<i64>().ok().map(|n| Value::Number(n.into()))
}
