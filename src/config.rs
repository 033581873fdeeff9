use std::str::FromStr;
use std::time::Duration;

use crate::credential::{Credential, CredentialError};
use crate::governor::RateLimitConfig;
use crate::media::ImagePolicy;
use crate::normalize::DEFAULT_MAX_QUERY_CHARS;
use crate::remote::http::DEFAULT_API_URL;
use crate::remote::RetryPolicy;

/// Default HTTP timeout per engine call (30 seconds).
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
/// Default engine-side computation budget (20 seconds).
const DEFAULT_COMPUTE_TIMEOUT_SECS: u64 = 20;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(#[from] CredentialError),
    #[error("{var} {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub credential: Credential,
    pub api_url: String,
    pub request_timeout: Duration,
    pub computation_timeout: Duration,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub max_query_chars: usize,
    pub images: ImagePolicy,
    /// How long calls received before EOF may run on. `None`: until done.
    pub drain_grace: Option<Duration>,
}

impl ServerConfig {
    /// Load configuration from the environment, after reading `.env` if present.
    ///
    /// - `WOLFRAM_API_KEY` (required): Wolfram|Alpha app id
    /// - `WOLFRAM_API_URL` (optional): engine endpoint
    /// - `WOLFRAM_TIMEOUT_SECS` (optional, default 30): HTTP timeout per call
    /// - `WOLFRAM_COMPUTE_TIMEOUT_SECS` (optional, default 20): engine computation budget
    /// - `WOLFRAM_MAX_RETRIES` (optional, default 2)
    /// - `WOLFRAM_RETRY_BASE_MS` / `WOLFRAM_RETRY_MAX_MS` (optional, default 500 / 8000)
    /// - `WOLFRAM_RATE_PER_SEC` / `WOLFRAM_RATE_BURST` (optional, default 1.0 / 1)
    /// - `WOLFRAM_RATE_MAX_WAIT_MS` (optional, default 5000)
    /// - `WOLFRAM_MAX_QUERY_CHARS` (optional, default 2000)
    /// - `WOLFRAM_MAX_IMAGES` / `WOLFRAM_MAX_IMAGE_BYTES` (optional, default 5 / 524288; 0 images disables downloads)
    /// - `WOLFRAM_DRAIN_GRACE_SECS` (optional, unset waits for in-flight calls after EOF)
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] against an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let credential = Credential::from_raw(lookup("WOLFRAM_API_KEY"))?;

        let api_url = lookup("WOLFRAM_API_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let request_timeout_secs: u64 =
            parse_or(&lookup, "WOLFRAM_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?;
        let compute_timeout_secs: u64 =
            parse_or(&lookup, "WOLFRAM_COMPUTE_TIMEOUT_SECS", DEFAULT_COMPUTE_TIMEOUT_SECS)?;
        if request_timeout_secs == 0 || compute_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "WOLFRAM_TIMEOUT_SECS",
                reason: "and WOLFRAM_COMPUTE_TIMEOUT_SECS must be greater than zero".into(),
            });
        }

        let default_retry = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&lookup, "WOLFRAM_MAX_RETRIES", default_retry.max_retries)?,
            base_delay: Duration::from_millis(parse_or(
                &lookup,
                "WOLFRAM_RETRY_BASE_MS",
                default_retry.base_delay.as_millis() as u64,
            )?),
            max_delay: Duration::from_millis(parse_or(
                &lookup,
                "WOLFRAM_RETRY_MAX_MS",
                default_retry.max_delay.as_millis() as u64,
            )?),
            jitter: true,
        };

        let default_rate = RateLimitConfig::default();
        let refill_per_sec: f64 =
            parse_or(&lookup, "WOLFRAM_RATE_PER_SEC", default_rate.refill_per_sec)?;
        if !refill_per_sec.is_finite() || refill_per_sec <= 0.0 {
            return Err(ConfigError::Invalid {
                var: "WOLFRAM_RATE_PER_SEC",
                reason: "must be a positive number".into(),
            });
        }
        let capacity: u32 = parse_or(&lookup, "WOLFRAM_RATE_BURST", default_rate.capacity)?;
        if capacity == 0 {
            return Err(ConfigError::Invalid {
                var: "WOLFRAM_RATE_BURST",
                reason: "must be at least 1".into(),
            });
        }
        let rate_limit = RateLimitConfig {
            capacity,
            refill_per_sec,
            max_wait: Duration::from_millis(parse_or(
                &lookup,
                "WOLFRAM_RATE_MAX_WAIT_MS",
                default_rate.max_wait.as_millis() as u64,
            )?),
        };

        let max_query_chars: usize =
            parse_or(&lookup, "WOLFRAM_MAX_QUERY_CHARS", DEFAULT_MAX_QUERY_CHARS)?;
        if max_query_chars == 0 {
            return Err(ConfigError::Invalid {
                var: "WOLFRAM_MAX_QUERY_CHARS",
                reason: "must be at least 1".into(),
            });
        }

        let default_images = ImagePolicy::default();
        let images = ImagePolicy {
            max_images: parse_or(&lookup, "WOLFRAM_MAX_IMAGES", default_images.max_images)?,
            max_bytes: parse_or(&lookup, "WOLFRAM_MAX_IMAGE_BYTES", default_images.max_bytes)?,
        };

        let drain_grace =
            parse_opt::<_, u64>(&lookup, "WOLFRAM_DRAIN_GRACE_SECS")?.map(Duration::from_secs);

        Ok(Self {
            credential,
            api_url,
            request_timeout: Duration::from_secs(request_timeout_secs),
            computation_timeout: Duration::from_secs(compute_timeout_secs),
            retry,
            rate_limit,
            max_query_chars,
            images,
            drain_grace,
        })
    }
}

fn parse_opt<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(var)
        .map(|raw| {
            raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid {
                var,
                reason: format!("must be a valid {}", std::any::type_name::<T>()),
            })
        })
        .transpose()
}

fn parse_or<F, T>(lookup: &F, var: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    Ok(parse_opt(lookup, var)?.unwrap_or(default))
}
