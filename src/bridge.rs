//! The `query-wolfram-alpha` pipeline.
//!
//! Each call walks `Idle → Validating → RateCheck → Dispatching →
//! Interpreting → Done` in order and ends with exactly one [`ToolResult`].
//! A failing stage jumps straight to `Done` with a typed failure.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::clock::{Clock, SystemClock};
use crate::config::ServerConfig;
use crate::governor::{GovernorError, RateGovernor};
use crate::interpret::interpret;
use crate::media::ImageFetcher;
use crate::normalize::{NormalizeError, QueryNormalizer};
use crate::outcome::{FailureKind, ToolResult};
use crate::remote::{EngineClient, HttpTransport, RemoteFailure, RemoteRequest, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Idle,
    Validating,
    RateCheck,
    Dispatching,
    Interpreting,
    Done,
}

impl Stage {
    fn next(self) -> Stage {
        match self {
            Stage::Idle => Stage::Validating,
            Stage::Validating => Stage::RateCheck,
            Stage::RateCheck => Stage::Dispatching,
            Stage::Dispatching => Stage::Interpreting,
            Stage::Interpreting | Stage::Done => Stage::Done,
        }
    }
}

/// Per-request stage tracker.
#[derive(Debug)]
struct Run {
    stage: Stage,
}

impl Run {
    fn new() -> Self {
        Self { stage: Stage::Idle }
    }

    fn advance(&mut self, to: Stage) {
        debug_assert_eq!(to, self.stage.next(), "pipeline stages must not be skipped");
        tracing::debug!(from = ?self.stage, to = ?to, "pipeline stage");
        self.stage = to;
    }

    fn finish(mut self, result: ToolResult) -> ToolResult {
        debug_assert_ne!(self.stage, Stage::Done);
        match &result {
            ToolResult::Answer(a) => {
                tracing::debug!(stage = ?self.stage, status = ?a.status, "query answered")
            }
            ToolResult::Failure(f) => {
                tracing::info!(stage = ?self.stage, kind = ?f.kind, "query failed")
            }
        }
        self.stage = Stage::Done;
        result
    }
}

pub struct WolframBridge {
    normalizer: QueryNormalizer,
    governor: Arc<RateGovernor>,
    client: EngineClient,
    computation_timeout: Duration,
    images: Option<ImageFetcher>,
}

impl WolframBridge {
    pub fn new(
        normalizer: QueryNormalizer,
        governor: Arc<RateGovernor>,
        client: EngineClient,
        computation_timeout: Duration,
    ) -> Self {
        Self {
            normalizer,
            governor,
            client,
            computation_timeout,
            images: None,
        }
    }

    /// Download section images into each answer.
    pub fn with_images(mut self, images: ImageFetcher) -> Self {
        self.images = Some(images);
        self
    }

    /// Wire the production collaborators: reqwest transport, system clock.
    pub fn from_config(config: &ServerConfig) -> Result<Self, TransportError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock::new());
        let transport = Arc::new(HttpTransport::new(
            config.api_url.clone(),
            config.request_timeout,
        )?);
        let client = EngineClient::new(
            transport.clone(),
            config.credential.clone(),
            config.retry.clone(),
            clock.clone(),
        );
        let governor = Arc::new(RateGovernor::new(config.rate_limit.clone(), clock));

        let bridge = Self::new(
            QueryNormalizer::new(config.max_query_chars),
            governor,
            client,
            config.computation_timeout,
        );
        if config.images.max_images == 0 {
            return Ok(bridge);
        }
        Ok(bridge.with_images(ImageFetcher::new(transport, config.images.clone())))
    }

    pub fn normalizer(&self) -> &QueryNormalizer {
        &self.normalizer
    }

    /// Run one request through the pipeline. `None` means the caller sent
    /// no `query` string at all.
    pub async fn query(&self, raw: Option<&str>, cancel: &CancellationToken) -> ToolResult {
        let mut run = Run::new();

        run.advance(Stage::Validating);
        let query = match raw.map(|raw| self.normalizer.normalize(raw)) {
            Some(Ok(query)) => query,
            None => {
                return run.finish(ToolResult::failure(
                    FailureKind::InvalidQuery,
                    "Missing 'query' parameter for query-wolfram-alpha",
                ))
            }
            Some(Err(err @ NormalizeError::Empty)) => {
                return run.finish(ToolResult::failure(FailureKind::InvalidQuery, err.to_string()))
            }
            Some(Err(err @ NormalizeError::TooLong { .. })) => {
                return run.finish(ToolResult::failure(FailureKind::QueryTooLong, err.to_string()))
            }
        };

        run.advance(Stage::RateCheck);
        if let Err(err) = self.governor.acquire(cancel).await {
            let kind = match err {
                GovernorError::Limited { .. } => FailureKind::RateLimited,
                GovernorError::Cancelled => FailureKind::Cancelled,
            };
            return run.finish(ToolResult::failure(kind, err.to_string()));
        }

        run.advance(Stage::Dispatching);
        let request = RemoteRequest::new(&query, self.computation_timeout);
        let response = match self.client.execute(&request, cancel).await {
            Ok(response) => response,
            Err(failure) => return run.finish(remote_failure(failure)),
        };

        run.advance(Stage::Interpreting);
        let mut result = interpret(&query, response);
        if let (ToolResult::Answer(answer), Some(images)) = (&mut result, &self.images) {
            images.attach(answer, cancel).await;
        }
        run.finish(result)
    }

    /// Like [`WolframBridge::query`], but on a dedicated task so a panic
    /// inside the pipeline becomes an `InternalError` failure.
    pub async fn call(
        self: Arc<Self>,
        raw: Option<String>,
        cancel: CancellationToken,
    ) -> ToolResult {
        let task = tokio::spawn(async move { self.query(raw.as_deref(), &cancel).await });

        match task.await {
            Ok(result) => result,
            Err(join_err) => {
                tracing::error!(error = %join_err, "query task failed");
                ToolResult::failure(FailureKind::InternalError, "Internal error while processing the query")
            }
        }
    }
}

fn remote_failure(failure: RemoteFailure) -> ToolResult {
    let kind = match failure {
        RemoteFailure::CredentialRejected { .. } => FailureKind::CredentialRejected,
        RemoteFailure::Cancelled => FailureKind::Cancelled,
        RemoteFailure::Exhausted { .. }
        | RemoteFailure::Rejected { .. }
        | RemoteFailure::Unsendable(_) => FailureKind::NetworkFailure,
    };
    ToolResult::failure(kind, failure.to_string())
}
