use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;

use super::{HttpReply, RemoteRequest, Transport, TransportError};
use crate::credential::Credential;
use crate::media::{FetchedImage, ImageError, ImageSource};

/// Default Full Results API endpoint.
pub const DEFAULT_API_URL: &str = "https://api.wolframalpha.com/v2/query";

/// reqwest-backed transport for the Full Results API.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    url: String,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, TransportError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("mcp-wolfram-alpha/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError::Invalid(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        request: &RemoteRequest,
        credential: &Credential,
    ) -> Result<HttpReply, TransportError> {
        let mut params = request.params();
        params.push(("appid", credential.expose().to_string()));

        let response = self
            .client
            .get(&self.url)
            .query(&params)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.text().await.map_err(classify)?;
        Ok(HttpReply { status, body })
    }
}

/// Image downloads share the engine client and its timeout. No app id is sent.
#[async_trait]
impl ImageSource for HttpTransport {
    async fn fetch(&self, url: &str, max_bytes: usize) -> Result<FetchedImage, ImageError> {
        let mut response = self.client.get(url).send().await.map_err(classify)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::Status(status.as_u16()));
        }
        let too_large = ImageError::TooLarge { limit: max_bytes };
        if response.content_length().is_some_and(|len| len > max_bytes as u64) {
            return Err(too_large);
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(classify)? {
            if bytes.len() + chunk.len() > max_bytes {
                return Err(too_large);
            }
            bytes.extend_from_slice(&chunk);
        }

        Ok(FetchedImage { content_type, bytes })
    }
}

/// The request URL carries the app id, so it is dropped before formatting.
fn classify(err: reqwest::Error) -> TransportError {
    let err = err.without_url();
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else if err.is_builder() {
        TransportError::Invalid(err.to_string())
    } else {
        TransportError::Interrupted(err.to_string())
    }
}
