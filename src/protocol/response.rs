use serde::{Deserialize, Serialize};

use super::request::RpcId;
use crate::outcome::{Answer, Failure, FailureAction, FailureKind, ImageAttachment, ToolResult};

// ---------------------------------------------------------------------------
// JSON-RPC 2.0 response layer
// ---------------------------------------------------------------------------

/// JSON-RPC 2.0 response envelope.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RpcId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<RpcId>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn error(id: Option<RpcId>, error: JsonRpcError) -> Self {
        Self {
            jsonrpc: "2.0".into(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

/// JSON-RPC 2.0 error object (protocol-level errors).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl JsonRpcError {
    pub fn parse_error() -> Self {
        Self { code: -32700, message: "Parse error".into(), data: None }
    }

    pub fn invalid_request() -> Self {
        Self { code: -32600, message: "Invalid Request".into(), data: None }
    }

    pub fn invalid_request_with(detail: impl Into<String>) -> Self {
        Self { code: -32600, message: detail.into(), data: None }
    }

    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    pub fn invalid_params(detail: impl Into<String>) -> Self {
        Self { code: -32602, message: detail.into(), data: None }
    }

    pub fn internal_error(detail: impl Into<String>) -> Self {
        Self { code: -32603, message: detail.into(), data: None }
    }
}

// ---------------------------------------------------------------------------
// MCP tool result layer (returned inside a *successful* JSON-RPC response)
// ---------------------------------------------------------------------------

/// MCP `tools/call` result.
#[derive(Debug, Clone, Serialize)]
pub struct CallToolResult {
    pub content: Vec<ToolResultContent>,
    #[serde(rename = "structuredContent", skip_serializing_if = "Option::is_none")]
    pub structured_content: Option<serde_json::Value>,
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

/// A single content block inside a tool result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolResultContent {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

impl ToolResultContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text { text } => Some(text),
            Self::Image { .. } => None,
        }
    }
}

impl CallToolResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::text(text)],
            structured_content: None,
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolResultContent::text(text)],
            structured_content: None,
            is_error: true,
        }
    }
}

impl From<ToolResult> for CallToolResult {
    fn from(result: ToolResult) -> Self {
        match result {
            ToolResult::Answer(answer) => answer.into(),
            ToolResult::Failure(failure) => McpErrorResponse::from(failure).into(),
        }
    }
}

/// First block: the answer text. Second block (when the engine returned
/// sections): a readable rendering of every section. Then one `image` block
/// per downloaded image, or a text placeholder where the download failed.
/// The full answer is also carried as `structuredContent`.
impl From<Answer> for CallToolResult {
    fn from(answer: Answer) -> Self {
        let structured_content = serde_json::to_value(&answer).ok();

        let mut content = vec![ToolResultContent::text(answer.text.clone())];
        if !answer.sections.is_empty() {
            content.push(ToolResultContent::text(render_sections(&answer)));
        }
        content.extend(answer.images.into_iter().map(|image| match image {
            ImageAttachment::Inline {
                mime_type, data, ..
            } => ToolResultContent::Image { data, mime_type },
            ImageAttachment::Unavailable { src, reason } => {
                ToolResultContent::text(format!("[Image unavailable ({reason}): {src}]"))
            }
        }));

        Self {
            content,
            structured_content,
            is_error: false,
        }
    }
}

fn render_sections(answer: &Answer) -> String {
    let mut out = format!("Wolfram|Alpha results for: {}\n", answer.query);
    for section in &answer.sections {
        out.push('\n');
        if !section.title.trim().is_empty() {
            out.push_str(&format!("## {}\n", section.title));
        }
        for text in &section.texts {
            out.push_str(&format!("- {text}\n"));
        }
        for image in &section.images {
            let alt = image.alt.as_deref().unwrap_or("image");
            out.push_str(&format!("- [{alt}]({})\n", image.src));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// MCP error payload (carried as text in an `isError` tool result)
// ---------------------------------------------------------------------------

/// MCP error object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpError {
    pub code: FailureKind,
    pub message: String,
    pub action: FailureAction,
}

/// MCP error response (top-level)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct McpErrorResponse {
    pub error: McpError,
}

impl McpErrorResponse {
    pub fn new(code: FailureKind, message: impl Into<String>) -> Self {
        Self {
            error: McpError {
                action: code.action(),
                code,
                message: message.into(),
            },
        }
    }

    /// Construct with the canonical message for a given kind.
    pub fn canonical(code: FailureKind) -> Self {
        let message = match &code {
            FailureKind::InvalidQuery => "Query is invalid",
            FailureKind::QueryTooLong => "Query is too long",
            FailureKind::RateLimited => "Local rate limit reached",
            FailureKind::NetworkFailure => "Wolfram|Alpha could not be reached",
            FailureKind::QueryNotUnderstood => "Wolfram|Alpha did not understand the query",
            FailureKind::RemoteRateLimited => "Wolfram|Alpha is throttling requests",
            FailureKind::MalformedResponse => "Wolfram|Alpha returned an unreadable response",
            FailureKind::CredentialRejected => "Wolfram|Alpha rejected the configured app id",
            FailureKind::Cancelled => "Request was cancelled",
            FailureKind::InternalError => "Internal error",
        };
        Self::new(code, message)
    }
}

impl From<Failure> for McpErrorResponse {
    fn from(failure: Failure) -> Self {
        Self::new(failure.kind, failure.message)
    }
}

/// Convert an MCP domain error into a JSON-RPC error.
///
/// The JSON-RPC `code` is derived from the failure kind.
/// The JSON-RPC `message` is the human-readable message.
/// The full MCP error object is carried in `data` for structured clients.
impl From<McpErrorResponse> for JsonRpcError {
    fn from(mcp: McpErrorResponse) -> Self {
        Self {
            code: mcp.error.code.json_rpc_code(),
            message: mcp.error.message.clone(),
            data: serde_json::to_value(&mcp).ok(),
        }
    }
}

/// Convert an MCP domain error into a tool result with `isError: true`.
///
/// The text content is the JSON-serialized `McpErrorResponse`, preserving
/// the structured error for clients that inspect tool output.
impl From<McpErrorResponse> for CallToolResult {
    fn from(mcp: McpErrorResponse) -> Self {
        match serde_json::to_string(&mcp) {
            Ok(json) => Self::error(format!("{json}\n")),
            Err(_) => Self::error(mcp.error.message),
        }
    }
}
