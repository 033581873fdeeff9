pub mod request;
pub mod response;

pub use request::{CancelledParams, GetPromptParams, JsonRpcRequest, RpcId, ToolCallParams};
pub use response::{
    CallToolResult, JsonRpcError, JsonRpcResponse, McpError, McpErrorResponse, ToolResultContent,
};
