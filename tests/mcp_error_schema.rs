use jsonschema::validator_for;
use serde_json::Value;

use mcp_wolfram_alpha::outcome::FailureKind;
use mcp_wolfram_alpha::protocol::{CallToolResult, JsonRpcError, McpErrorResponse};

const ERROR_SCHEMA: &str = r#"{
  "$schema": "https://json-schema.org/draft/2020-12/schema",
  "title": "Wolfram|Alpha tool error v1",
  "type": "object",
  "required": ["error"],
  "additionalProperties": false,
  "properties": {
    "error": {
      "type": "object",
      "required": ["code", "message", "action"],
      "additionalProperties": false,
      "properties": {
        "code": {
          "type": "string",
          "enum": [
            "invalid_query",
            "query_too_long",
            "rate_limited",
            "network_failure",
            "query_not_understood",
            "remote_rate_limited",
            "malformed_response",
            "credential_rejected",
            "cancelled",
            "internal_error"
          ]
        },
        "message": { "type": "string", "minLength": 1 },
        "action": {
          "type": "string",
          "enum": ["fix_query", "retry_later", "check_configuration"]
        }
      }
    }
  }
}"#;

const ALL_KINDS: [FailureKind; 10] = [
    FailureKind::InvalidQuery,
    FailureKind::QueryTooLong,
    FailureKind::RateLimited,
    FailureKind::NetworkFailure,
    FailureKind::QueryNotUnderstood,
    FailureKind::RemoteRateLimited,
    FailureKind::MalformedResponse,
    FailureKind::CredentialRejected,
    FailureKind::Cancelled,
    FailureKind::InternalError,
];

#[test]
fn golden_mcp_error_schema_validation() {
    let response = McpErrorResponse::new(FailureKind::RateLimited, "Local rate limit reached");

    let json_str = serde_json::to_string_pretty(&response).unwrap();
    let json_value: Value = serde_json::from_str(&json_str).unwrap();

    let schema_json: Value = serde_json::from_str(ERROR_SCHEMA).unwrap();
    let validator = validator_for(&schema_json).unwrap();
    assert!(validator.is_valid(&json_value), "MCP error JSON must satisfy v1 schema");

    // Golden snapshot (byte-identical, stable)
    let expected = r#"{
  "error": {
    "code": "rate_limited",
    "message": "Local rate limit reached",
    "action": "retry_later"
  }
}"#;

    assert_eq!(json_str.trim(), expected.trim(), "MCP error JSON snapshot mismatch");
}

#[test]
fn every_canonical_error_satisfies_schema() {
    let schema_json: Value = serde_json::from_str(ERROR_SCHEMA).unwrap();
    let validator = validator_for(&schema_json).unwrap();

    for kind in ALL_KINDS {
        let value = serde_json::to_value(McpErrorResponse::canonical(kind)).unwrap();
        assert!(validator.is_valid(&value), "{kind:?} violates the error schema");
    }
}

#[test]
fn tool_error_text_round_trips() {
    let response = McpErrorResponse::new(FailureKind::NetworkFailure, "unreachable");
    let result = CallToolResult::from(response.clone());

    assert!(result.is_error);
    assert_eq!(result.content.len(), 1);
    let parsed: McpErrorResponse = serde_json::from_str(result.content[0].as_text().unwrap().trim()).unwrap();
    assert_eq!(parsed, response);
}

#[test]
fn json_rpc_codes_follow_failure_class() {
    let input: JsonRpcError = McpErrorResponse::canonical(FailureKind::QueryTooLong).into();
    assert_eq!(input.code, -32602);

    let remote: JsonRpcError = McpErrorResponse::canonical(FailureKind::NetworkFailure).into();
    assert_eq!(remote.code, -32603);
    assert_eq!(remote.data.unwrap()["error"]["code"], "network_failure");
}
