pub mod prompts;
pub mod query;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::bridge::WolframBridge;
use crate::protocol::{
    CallToolResult, GetPromptParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ToolCallParams,
};

pub const SERVER_NAME: &str = "mcp-wolfram-alpha";
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// Dispatch a JSON-RPC request to the appropriate handler.
///
/// Returns `None` for notifications (no response required).
/// `notifications/cancelled` is handled by the server loop, which owns
/// the in-flight request table.
pub async fn dispatch(
    req: &JsonRpcRequest,
    bridge: &Arc<WolframBridge>,
    cancel: CancellationToken,
) -> Option<JsonRpcResponse> {
    match req.method.as_str() {
        "initialize" => {
            let result = serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {},
                    "prompts": {}
                },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION")
                }
            });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "notifications/initialized" | "notifications/cancelled" => None,

        "ping" => Some(JsonRpcResponse::success(req.id.clone(), serde_json::json!({}))),

        "tools/list" => {
            let max_chars = bridge.normalizer().max_chars();
            let result = serde_json::json!({ "tools": [query::definition(max_chars)] });
            Some(JsonRpcResponse::success(req.id.clone(), result))
        }

        "tools/call" => {
            let params: ToolCallParams = match parse_params(req, "tools/call") {
                Ok(p) => p,
                Err(err) => return Some(JsonRpcResponse::error(req.id.clone(), err)),
            };

            let tool_result = dispatch_tool_call(&params, bridge, cancel).await;
            let response = match serde_json::to_value(&tool_result) {
                Ok(result_json) => JsonRpcResponse::success(req.id.clone(), result_json),
                Err(e) => JsonRpcResponse::error(
                    req.id.clone(),
                    JsonRpcError::internal_error(format!("Tool result serialization failed: {e}")),
                ),
            };
            Some(response)
        }

        "prompts/list" => Some(JsonRpcResponse::success(req.id.clone(), prompts::list())),

        "prompts/get" => {
            let params: GetPromptParams = match parse_params(req, "prompts/get") {
                Ok(p) => p,
                Err(err) => return Some(JsonRpcResponse::error(req.id.clone(), err)),
            };
            Some(match prompts::get(&params) {
                Ok(result) => JsonRpcResponse::success(req.id.clone(), result),
                Err(err) => JsonRpcResponse::error(req.id.clone(), err),
            })
        }

        _ if req.id.is_none() => None,

        _ => Some(JsonRpcResponse::error(
            req.id.clone(),
            JsonRpcError::method_not_found(&req.method),
        )),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    method: &str,
) -> Result<T, JsonRpcError> {
    match &req.params {
        Some(v) => serde_json::from_value(v.clone())
            .map_err(|e| JsonRpcError::invalid_params(format!("Invalid {method} params: {e}"))),
        None => Err(JsonRpcError::invalid_params(format!("Missing params for {method}"))),
    }
}

async fn dispatch_tool_call(
    params: &ToolCallParams,
    bridge: &Arc<WolframBridge>,
    cancel: CancellationToken,
) -> CallToolResult {
    match params.name.as_str() {
        query::TOOL_NAME => {
            query::handle(params.arguments.as_ref(), Arc::clone(bridge), cancel).await
        }
        _ => CallToolResult::error(format!("Unknown tool: {}", params.name)),
    }
}
