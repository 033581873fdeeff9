//! Inline images for answers.
//!
//! Sections reference plots and rendered formulas by URL. Clients that
//! cannot follow URLs get them as base64 `image` content instead, so each
//! answer's images are downloaded (up to a count and size bound) after the
//! payload has been interpreted. A failed download becomes a placeholder;
//! it never fails the answer.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tokio_util::sync::CancellationToken;

use crate::outcome::{Answer, ImageAttachment};
use crate::remote::TransportError;

pub const DEFAULT_MAX_IMAGES: usize = 5;
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 512 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePolicy {
    /// Images fetched per answer, in section order. Zero disables fetching.
    pub max_images: usize,
    /// Largest accepted image body.
    pub max_bytes: usize,
}

impl Default for ImagePolicy {
    fn default() -> Self {
        Self {
            max_images: DEFAULT_MAX_IMAGES,
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ImageError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("larger than {limit} bytes")]
    TooLarge { limit: usize },
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Downloads one image.
#[async_trait]
pub trait ImageSource: Send + Sync {
    /// Fetch `url`, reading no more than `max_bytes` of body.
    async fn fetch(&self, url: &str, max_bytes: usize) -> Result<FetchedImage, ImageError>;
}

/// MIME type for an image content block. Engine images are GIFs; anything
/// unrecognised is labelled PNG.
pub fn mime_type(content_type: Option<&str>) -> &'static str {
    let content_type = content_type.unwrap_or_default().to_ascii_lowercase();
    if content_type.contains("gif") {
        "image/gif"
    } else if content_type.contains("jpeg") || content_type.contains("jpg") {
        "image/jpeg"
    } else {
        "image/png"
    }
}

pub struct ImageFetcher {
    source: Arc<dyn ImageSource>,
    policy: ImagePolicy,
}

impl ImageFetcher {
    pub fn new(source: Arc<dyn ImageSource>, policy: ImagePolicy) -> Self {
        Self { source, policy }
    }

    /// Fill `answer.images` from the image references in its sections.
    ///
    /// Stops early on cancellation; whatever was fetched so far is kept.
    pub async fn attach(&self, answer: &mut Answer, cancel: &CancellationToken) {
        let refs: Vec<String> = answer
            .sections
            .iter()
            .flat_map(|section| section.images.iter())
            .take(self.policy.max_images)
            .map(|image| image.src.clone())
            .collect();

        for src in refs {
            let fetched = tokio::select! {
                _ = cancel.cancelled() => None,
                fetched = self.source.fetch(&src, self.policy.max_bytes) => Some(fetched),
            };
            let Some(fetched) = fetched else {
                tracing::debug!("image fetch abandoned");
                break;
            };

            answer.images.push(match fetched {
                Ok(image) => ImageAttachment::Inline {
                    mime_type: mime_type(image.content_type.as_deref()).to_string(),
                    data: STANDARD.encode(&image.bytes),
                    src,
                },
                Err(err) => {
                    tracing::debug!(error = %err, "image unavailable");
                    ImageAttachment::Unavailable {
                        src,
                        reason: err.to_string(),
                    }
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mime_type_follows_content_type() {
        assert_eq!(mime_type(Some("image/gif")), "image/gif");
        assert_eq!(mime_type(Some("IMAGE/JPEG; charset=binary")), "image/jpeg");
        assert_eq!(mime_type(Some("application/octet-stream")), "image/png");
        assert_eq!(mime_type(None), "image/png");
    }
}
