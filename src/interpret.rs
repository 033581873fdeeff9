//! Converts classified engine payloads into [`ToolResult`]s.
//!
//! Parse failures are values here, never panics: any body that does not
//! match the expected pod layout becomes `MalformedResponse`.

use serde::Deserialize;

use crate::normalize::NormalizedQuery;
use crate::outcome::{Answer, AnswerStatus, FailureKind, ImageRef, Section, ToolResult};
use crate::remote::RemoteResponse;

/// Engine error codes meaning the app id is invalid or missing.
const CREDENTIAL_ERROR_CODES: &[&str] = &["1", "2"];

#[derive(Debug, Deserialize)]
struct Document {
    queryresult: QueryResult,
}

#[derive(Debug, Deserialize)]
struct QueryResult {
    #[serde(default)]
    pods: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    title: String,
    id: Option<String>,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    subpods: Vec<SubPod>,
}

#[derive(Debug, Deserialize)]
struct SubPod {
    plaintext: Option<String>,
    img: Option<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    src: String,
    alt: Option<String>,
}

pub fn interpret(query: &NormalizedQuery, response: RemoteResponse) -> ToolResult {
    match response {
        RemoteResponse::Success(body) => interpret_pods(query.as_str(), &body),
        RemoteResponse::NoResult => ToolResult::no_result(query.as_str()),
        RemoteResponse::Error { code, message } => {
            if CREDENTIAL_ERROR_CODES.contains(&code.as_str()) {
                ToolResult::failure(
                    FailureKind::CredentialRejected,
                    format!("Wolfram|Alpha rejected the configured app id: {message}"),
                )
            } else {
                ToolResult::failure(FailureKind::QueryNotUnderstood, message)
            }
        }
        RemoteResponse::Throttled => ToolResult::failure(
            FailureKind::RemoteRateLimited,
            "Wolfram|Alpha is throttling requests for this app id; wait before retrying",
        ),
    }
}

fn interpret_pods(query: &str, body: &str) -> ToolResult {
    let doc: Document = match serde_json::from_str(body) {
        Ok(doc) => doc,
        Err(e) => {
            tracing::warn!(error = %e, "engine payload did not match the expected shape");
            return ToolResult::failure(
                FailureKind::MalformedResponse,
                format!("Wolfram|Alpha returned a payload that could not be parsed: {e}"),
            );
        }
    };

    if doc.queryresult.pods.is_empty() {
        return ToolResult::failure(
            FailureKind::MalformedResponse,
            "Wolfram|Alpha reported results but the payload contained no pods",
        );
    }

    let sections: Vec<Section> = doc.queryresult.pods.into_iter().map(to_section).collect();
    let text = primary_text(&sections).unwrap_or_else(|| {
        format!(
            "Wolfram|Alpha returned {} result section(s) without plain text; see the image references.",
            sections.len()
        )
    });

    ToolResult::Answer(Answer {
        query: query.to_string(),
        status: AnswerStatus::Found,
        text,
        sections,
        images: Vec::new(),
    })
}

fn to_section(pod: Pod) -> Section {
    let mut texts = Vec::new();
    let mut images = Vec::new();
    for subpod in pod.subpods {
        if let Some(text) = subpod.plaintext.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
            texts.push(text.to_string());
        }
        if let Some(img) = subpod.img.filter(|img| !img.src.is_empty()) {
            images.push(ImageRef {
                src: img.src,
                alt: img.alt,
            });
        }
    }

    Section {
        title: pod.title,
        id: pod.id,
        primary: pod.primary,
        texts,
        images,
    }
}

fn is_input_echo(section: &Section) -> bool {
    section.id.as_deref() == Some("Input") || section.title.starts_with("Input")
}

/// Pick the answer text: the engine's primary pod, else the first
/// non-input pod with text, else any pod with text.
fn primary_text(sections: &[Section]) -> Option<String> {
    let with_text = || sections.iter().filter(|s| !s.texts.is_empty());

    with_text()
        .find(|s| s.primary)
        .or_else(|| with_text().find(|s| !is_input_echo(s)))
        .or_else(|| with_text().next())
        .map(|s| s.texts.join("\n"))
}
