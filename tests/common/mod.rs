//! Shared fixtures: a scripted engine transport and bridge builders.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use mcp_wolfram_alpha::bridge::WolframBridge;
use mcp_wolfram_alpha::clock::{Clock, ManualClock};
use mcp_wolfram_alpha::credential::Credential;
use mcp_wolfram_alpha::governor::{RateGovernor, RateLimitConfig};
use mcp_wolfram_alpha::media::{FetchedImage, ImageError, ImageFetcher, ImagePolicy, ImageSource};
use mcp_wolfram_alpha::normalize::QueryNormalizer;
use mcp_wolfram_alpha::remote::{
    EngineClient, HttpReply, RemoteRequest, RetryPolicy, Transport, TransportError,
};

pub const TEST_APP_ID: &str = "TEST-APPID-0001";

/// Replays a fixed sequence of replies, one per call, and counts calls.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpReply, TransportError>>>,
    calls: AtomicUsize,
    inputs: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub fn new(script: Vec<Result<HttpReply, TransportError>>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        })
    }

    /// Answers every call with the same successful body.
    pub fn always(body: String) -> Arc<Self> {
        Self::new((0..64).map(|_| Ok(HttpReply::new(200, body.clone()))).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn inputs(&self) -> Vec<String> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        request: &RemoteRequest,
        _credential: &Credential,
    ) -> Result<HttpReply, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inputs.lock().unwrap().push(request.input.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::Invalid("script exhausted".into())))
    }
}

/// Never replies; only cancellation ends a call.
pub struct HangingTransport;

#[async_trait]
impl Transport for HangingTransport {
    async fn send(
        &self,
        _request: &RemoteRequest,
        _credential: &Credential,
    ) -> Result<HttpReply, TransportError> {
        std::future::pending::<Result<HttpReply, TransportError>>().await
    }
}

/// Answers every call with the `2+2` body after a real delay.
pub struct SlowTransport(pub Duration);

#[async_trait]
impl Transport for SlowTransport {
    async fn send(
        &self,
        _request: &RemoteRequest,
        _credential: &Credential,
    ) -> Result<HttpReply, TransportError> {
        tokio::time::sleep(self.0).await;
        Ok(HttpReply::new(200, two_plus_two()))
    }
}

/// Serves images from a fixed table; unknown URLs are HTTP 404.
#[derive(Default)]
pub struct ScriptedImages {
    images: HashMap<String, Result<FetchedImage, ImageError>>,
    fetched: Mutex<Vec<String>>,
}

impl ScriptedImages {
    pub fn new(images: Vec<(&str, Result<FetchedImage, ImageError>)>) -> Arc<Self> {
        Arc::new(Self {
            images: images
                .into_iter()
                .map(|(url, image)| (url.to_string(), image))
                .collect(),
            ..Default::default()
        })
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl ImageSource for ScriptedImages {
    async fn fetch(&self, url: &str, _max_bytes: usize) -> Result<FetchedImage, ImageError> {
        self.fetched.lock().unwrap().push(url.to_string());
        self.images
            .get(url)
            .cloned()
            .unwrap_or(Err(ImageError::Status(404)))
    }
}

pub fn gif() -> Result<FetchedImage, ImageError> {
    Ok(FetchedImage {
        content_type: Some("image/gif".into()),
        bytes: b"GIF89a".to_vec(),
    })
}

/// Base64 of the `gif()` body.
pub const GIF_BASE64: &str = "R0lGODlh";

pub fn credential() -> Credential {
    Credential::from_raw(Some(TEST_APP_ID.to_string())).unwrap()
}

pub fn no_jitter() -> RetryPolicy {
    RetryPolicy {
        max_retries: 2,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(8),
        jitter: false,
    }
}

pub fn generous_rate() -> RateLimitConfig {
    RateLimitConfig {
        capacity: 100,
        refill_per_sec: 100.0,
        max_wait: Duration::from_secs(5),
    }
}

pub struct Harness {
    pub bridge: Arc<WolframBridge>,
    pub clock: ManualClock,
}

pub fn harness_with(
    transport: Arc<dyn Transport>,
    rate: RateLimitConfig,
    retry: RetryPolicy,
    max_chars: usize,
) -> Harness {
    build(transport, rate, retry, max_chars, None)
}

pub fn harness_with_images(
    transport: Arc<dyn Transport>,
    images: Arc<dyn ImageSource>,
    max_images: usize,
) -> Harness {
    let policy = ImagePolicy {
        max_images,
        max_bytes: 1024,
    };
    let fetcher = ImageFetcher::new(images, policy);
    build(transport, generous_rate(), no_jitter(), 2000, Some(fetcher))
}

fn build(
    transport: Arc<dyn Transport>,
    rate: RateLimitConfig,
    retry: RetryPolicy,
    max_chars: usize,
    images: Option<ImageFetcher>,
) -> Harness {
    let clock = ManualClock::new();
    let shared: Arc<dyn Clock> = Arc::new(clock.clone());
    let client = EngineClient::new(transport, credential(), retry, shared.clone());
    let governor = Arc::new(RateGovernor::new(rate, shared));
    let mut bridge = WolframBridge::new(
        QueryNormalizer::new(max_chars),
        governor,
        client,
        Duration::from_secs(20),
    );
    if let Some(images) = images {
        bridge = bridge.with_images(images);
    }
    Harness {
        bridge: Arc::new(bridge),
        clock,
    }
}

pub fn harness(transport: Arc<dyn Transport>) -> Harness {
    harness_with(transport, generous_rate(), no_jitter(), 2000)
}

/// A Full Results API body with one pod per `(title, plaintext, primary)`.
pub fn pods_body(pods: &[(&str, &str, bool)]) -> String {
    let pods: Vec<_> = pods
        .iter()
        .map(|(title, text, primary)| {
            json!({
                "title": title,
                "id": title.replace(' ', ""),
                "primary": primary,
                "subpods": [{ "title": "", "plaintext": text }]
            })
        })
        .collect();
    json!({
        "queryresult": {
            "success": true,
            "error": false,
            "numpods": pods.len(),
            "pods": pods
        }
    })
    .to_string()
}

pub fn two_plus_two() -> String {
    pods_body(&[("Input", "2 + 2", false), ("Result", "4", true)])
}

/// Four pods with images: `input.gif`, `plot.gif`, `alt.gif`, `number.gif`.
/// The primary `Plot` pod has no plain text.
pub fn plot_body() -> String {
    json!({
        "queryresult": {
            "success": true,
            "error": false,
            "numpods": 4,
            "pods": [
                { "title": "Input", "id": "Input", "subpods": [
                    { "plaintext": "plot sin(x)", "img": { "src": "https://img.test/input.gif", "alt": "plot sin(x)" } }
                ] },
                { "title": "Plot", "id": "Plot", "primary": true, "subpods": [
                    { "plaintext": "", "img": { "src": "https://img.test/plot.gif", "alt": "plot" } }
                ] },
                { "title": "Alternate form", "id": "AlternateForm", "subpods": [
                    { "plaintext": "-(i/2) (e^(i x) - e^(-i x))", "img": { "src": "https://img.test/alt.gif" } }
                ] },
                { "title": "Number line", "subpods": [
                    { "img": { "src": "https://img.test/number.gif" } }
                ] }
            ]
        }
    })
    .to_string()
}

pub fn no_pods() -> String {
    json!({ "queryresult": { "success": true, "error": false, "numpods": 0 } }).to_string()
}
