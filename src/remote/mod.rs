//! Outbound side: request/response types, the transport seam, and the
//! retrying engine client.

pub mod client;
pub mod http;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::credential::Credential;
use crate::normalize::NormalizedQuery;

pub use client::{EngineClient, RemoteFailure, RetryPolicy};
pub use http::HttpTransport;

/// Engine output format requested on every call.
pub const OUTPUT_FORMAT: &str = "json";
/// Pod content formats requested on every call.
pub const POD_FORMATS: &str = "plaintext,image";

/// The normalized query plus fixed engine parameters. One per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteRequest {
    pub input: String,
    pub computation_timeout: Duration,
}

impl RemoteRequest {
    pub fn new(query: &NormalizedQuery, computation_timeout: Duration) -> Self {
        Self {
            input: query.as_str().to_string(),
            computation_timeout,
        }
    }

    /// Query-string parameters, excluding the credential.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("input", self.input.clone()),
            ("output", OUTPUT_FORMAT.to_string()),
            ("format", POD_FORMATS.to_string()),
            ("totaltimeout", self.computation_timeout.as_secs().to_string()),
        ]
    }
}

/// Raw HTTP reply handed back by a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("connection interrupted: {0}")]
    Interrupted(String),
    #[error("request could not be built: {0}")]
    Invalid(String),
}

impl TransportError {
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::Invalid(_))
    }
}

/// One network round trip to the engine.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        request: &RemoteRequest,
        credential: &Credential,
    ) -> Result<HttpReply, TransportError>;
}

/// Engine payload, as classified by the engine client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteResponse {
    /// Body reporting at least one result pod, or a body whose shape could
    /// not be classified (left for the interpreter to reject).
    Success(String),
    NoResult,
    Error { code: String, message: String },
    Throttled,
}

/// Error code used when the engine reports `success: false` without an error object.
pub const NOT_UNDERSTOOD: &str = "not_understood";

impl RemoteResponse {
    /// Classify a 2xx body by the `queryresult` status flags only.
    pub fn from_body(body: String) -> Self {
        let Ok(doc) = serde_json::from_str::<Value>(&body) else {
            return Self::Success(body);
        };
        let Some(result) = doc.get("queryresult") else {
            return Self::Success(body);
        };

        if let Some(err) = result.get("error").filter(|e| e.is_object()) {
            return Self::Error {
                code: scalar_text(err.get("code")).unwrap_or_else(|| "unknown".into()),
                message: scalar_text(err.get("msg"))
                    .unwrap_or_else(|| "The engine reported an error".into()),
            };
        }

        match result.get("success").and_then(Value::as_bool) {
            Some(false) => Self::Error {
                code: NOT_UNDERSTOOD.into(),
                message: not_understood_message(result),
            },
            Some(true) if pod_count(result) == Some(0) => Self::NoResult,
            _ => Self::Success(body),
        }
    }
}

fn pod_count(result: &Value) -> Option<u64> {
    match result.get("numpods") {
        Some(n) => n.as_u64().or_else(|| n.as_str().and_then(|s| s.parse().ok())),
        None => match result.get("pods") {
            Some(Value::Array(pods)) => Some(pods.len() as u64),
            Some(_) => None,
            None => Some(0),
        },
    }
}

fn not_understood_message(result: &Value) -> String {
    let mut message = String::from("Wolfram|Alpha did not understand the query.");

    let suggestions = list_field(result.get("didyoumeans"), "val");
    if !suggestions.is_empty() {
        message.push_str(&format!(" Did you mean: {}?", suggestions.join(", ")));
    }

    let tips = list_field(result.get("tips"), "text");
    if !tips.is_empty() {
        message.push_str(&format!(" Tips: {}", tips.join(" ")));
    }

    message
}

/// Collect `key` from a field that may be a single object or an array of them.
fn list_field(value: Option<&Value>, key: &str) -> Vec<String> {
    let items: Vec<&Value> = match value {
        Some(Value::Array(items)) => items.iter().collect(),
        Some(item @ Value::Object(_)) => vec![item],
        _ => Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| scalar_text(item.get(key)))
        .collect()
}

fn scalar_text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_object_is_classified_as_engine_error() {
        let body = r#"{"queryresult":{"success":false,"error":{"code":"1","msg":"Invalid appid"}}}"#;
        assert_eq!(
            RemoteResponse::from_body(body.into()),
            RemoteResponse::Error {
                code: "1".into(),
                message: "Invalid appid".into()
            }
        );
    }

    #[test]
    fn unsuccessful_query_carries_suggestions() {
        let body = r#"{"queryresult":{"success":false,"error":false,"numpods":0,
            "didyoumeans":{"score":"0.4","level":"medium","val":"pi"},
            "tips":[{"text":"Check your spelling"}]}}"#;
        match RemoteResponse::from_body(body.into()) {
            RemoteResponse::Error { code, message } => {
                assert_eq!(code, NOT_UNDERSTOOD);
                assert!(message.contains("Did you mean: pi?"));
                assert!(message.contains("Check your spelling"));
            }
            other => panic!("unexpected classification: {other:?}"),
        }
    }

    #[test]
    fn zero_pods_is_no_result() {
        let body = r#"{"queryresult":{"success":true,"error":false,"numpods":0}}"#;
        assert_eq!(RemoteResponse::from_body(body.into()), RemoteResponse::NoResult);
    }

    #[test]
    fn unparseable_body_is_left_for_the_interpreter() {
        let body = "<queryresult success='true'/>";
        assert_eq!(
            RemoteResponse::from_body(body.into()),
            RemoteResponse::Success(body.into())
        );
    }

    #[test]
    fn params_exclude_the_credential() {
        let query = crate::normalize::QueryNormalizer::default().normalize("2+2").unwrap();
        let req = RemoteRequest::new(&query, Duration::from_secs(20));
        let params = req.params();
        assert!(params.iter().all(|(k, _)| *k != "appid"));
        assert!(params.contains(&("totaltimeout", "20".to_string())));
    }
}
