use serde::{Deserialize, Serialize};

/// Failure classification returned across the tool boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    InvalidQuery,
    QueryTooLong,
    RateLimited,
    NetworkFailure,
    QueryNotUnderstood,
    RemoteRateLimited,
    MalformedResponse,
    CredentialRejected,
    Cancelled,
    InternalError,
}

/// What the caller should do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureAction {
    FixQuery,
    RetryLater,
    CheckConfiguration,
}

impl FailureKind {
    /// Map to the corresponding JSON-RPC 2.0 error code.
    ///
    /// Input validation failures → -32602 (Invalid params)
    /// Everything else           → -32603 (Internal error)
    pub fn json_rpc_code(&self) -> i32 {
        match self {
            Self::InvalidQuery | Self::QueryTooLong | Self::QueryNotUnderstood => -32602,
            _ => -32603,
        }
    }

    pub fn action(&self) -> FailureAction {
        match self {
            Self::InvalidQuery | Self::QueryTooLong | Self::QueryNotUnderstood => {
                FailureAction::FixQuery
            }
            Self::CredentialRejected => FailureAction::CheckConfiguration,
            Self::RateLimited
            | Self::NetworkFailure
            | Self::RemoteRateLimited
            | Self::MalformedResponse
            | Self::Cancelled
            | Self::InternalError => FailureAction::RetryLater,
        }
    }
}

/// A typed failure: kind plus a human-readable message.
///
/// Messages never contain the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStatus {
    /// The engine computed at least one result section.
    Found,
    /// The engine understood the query but had nothing to report.
    NoResult,
}

/// A labelled unit of engine output (a "pod").
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub primary: bool,
    pub texts: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageRef>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    pub src: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// A section image downloaded for inline delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImageAttachment {
    /// Base64 body plus MIME type.
    Inline {
        src: String,
        mime_type: String,
        data: String,
    },
    Unavailable { src: String, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub query: String,
    pub status: AnswerStatus,
    pub text: String,
    /// Every section the engine returned, in engine order.
    pub sections: Vec<Section>,
    /// Downloaded section images. Not part of the structured answer, which
    /// already carries their URLs.
    #[serde(skip)]
    pub images: Vec<ImageAttachment>,
}

/// The only shape returned by the tool bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolResult {
    Answer(Answer),
    Failure(Failure),
}

impl ToolResult {
    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(Failure {
            kind,
            message: message.into(),
        })
    }

    pub fn no_result(query: &str) -> Self {
        Self::Answer(Answer {
            query: query.to_string(),
            status: AnswerStatus::NoResult,
            text: format!(
                "No results found for '{query}'. Try rephrasing the question or being more specific."
            ),
            sections: Vec::new(),
            images: Vec::new(),
        })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure(_))
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Failure(f) => Some(f.kind),
            Self::Answer(_) => None,
        }
    }
}
