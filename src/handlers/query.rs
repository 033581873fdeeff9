use std::sync::Arc;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use crate::bridge::WolframBridge;
use crate::outcome::{FailureKind, ToolResult};
use crate::protocol::CallToolResult;

pub const TOOL_NAME: &str = "query-wolfram-alpha";

/// `tools/list` entry. `maxLength` mirrors the normalizer bound.
pub fn definition(max_query_chars: usize) -> Value {
    json!({
        "name": TOOL_NAME,
        "description": "Query the Wolfram|Alpha computational knowledge engine. Use it for \
            mathematical calculations and equations, scientific data, statistics, unit \
            conversions, factual lookups and step-by-step solutions. Examples: \
            'derivative of x^2 + 3x', 'population of Japan in 2023', \
            'convert 100 meters to feet', 'solve 2x + 5 = 15'.",
        "inputSchema": {
            "type": "object",
            "required": ["query"],
            "additionalProperties": false,
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Question or calculation for Wolfram|Alpha (e.g. 'What is 2+2?', 'integrate sin(x) dx', 'population of France')",
                    "minLength": 1,
                    "maxLength": max_query_chars
                }
            }
        }
    })
}

/// Handle a `query-wolfram-alpha` tool call.
///
/// Argument shape problems are reported as `invalid_query` tool errors,
/// never as protocol errors. The query text itself is never coerced.
pub async fn handle(
    arguments: Option<&Value>,
    bridge: Arc<WolframBridge>,
    cancel: CancellationToken,
) -> CallToolResult {
    let raw = match arguments {
        None | Some(Value::Null) => None,
        Some(Value::Object(args)) => match args.get("query") {
            None | Some(Value::Null) => None,
            Some(Value::String(query)) => Some(query.clone()),
            Some(_) => {
                return ToolResult::failure(FailureKind::InvalidQuery, "Query must be a string")
                    .into()
            }
        },
        Some(_) => {
            return ToolResult::failure(
                FailureKind::InvalidQuery,
                "Arguments for query-wolfram-alpha must be an object",
            )
            .into()
        }
    };

    bridge.call(raw, cancel).await.into()
}
