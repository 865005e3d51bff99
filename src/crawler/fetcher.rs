//! Rate-limited HTTP fetcher
//!
//! This module handles every request the harvester makes:
//! - Building the HTTP client with the configured user agent and timeouts
//! - Waiting out HTTP 429 responses using the server's `retry-after` value
//! - Giving up after too many consecutive 429s for the same URL
//!
//! Statuses other than 429 are returned to the caller untouched.

use crate::config::{BackoffConfig, CrawlerConfig, UserAgentConfig};
use crate::HarvestError;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

/// A fetched page
#[derive(Debug, Clone)]
pub struct PageContent {
    /// URL that was requested
    pub url: String,
    /// Final HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// 429 responses waited out before this response arrived
    pub rate_limit_waits: u32,
}

impl PageContent {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// How long to wait after a 429 and when to give up
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Multiplier applied to the server's `retry-after` seconds
    pub damping: f64,
    /// Added to the damped wait
    pub safety_margin: Duration,
    /// Stands in for a missing or unparsable `retry-after`
    pub default_retry_after: Duration,
    /// Consecutive 429s that abort the fetch (0 = never)
    pub max_consecutive: u32,
}

impl BackoffPolicy {
    /// Computes the sleep before retrying
    ///
    /// The damped value is truncated to whole seconds before the margin is
    /// added, so `retry-after: 10` with the default policy waits 13 seconds.
    pub fn wait_for(&self, retry_after_secs: Option<u64>) -> Duration {
        let retry_after = retry_after_secs.unwrap_or(self.default_retry_after.as_secs());
        let damped = (retry_after as f64 * self.damping).floor() as u64;
        Duration::from_secs(damped).saturating_add(self.safety_margin)
    }

    fn gives_up_after(&self, consecutive: u32) -> bool {
        self.max_consecutive > 0 && consecutive >= self.max_consecutive
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::from(&BackoffConfig::default())
    }
}

impl From<&BackoffConfig> for BackoffPolicy {
    fn from(config: &BackoffConfig) -> Self {
        Self {
            damping: config.damping,
            safety_margin: Duration::from_secs(config.safety_margin_secs),
            default_retry_after: Duration::from_secs(config.default_retry_after_secs),
            max_consecutive: config.max_consecutive_rate_limits,
        }
    }
}

/// Reads a `retry-after` header given in whole seconds
///
/// HTTP-date values and garbage yield `None`.
pub fn parse_retry_after(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use story_harvest::config::{CrawlerConfig, UserAgentConfig};
/// use story_harvest::crawler::build_http_client;
///
/// let user_agent = UserAgentConfig {
///     crawler_name: "StoryHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&CrawlerConfig::default(), &user_agent).unwrap();
/// ```
pub fn build_http_client(
    crawler: &CrawlerConfig,
    user_agent: &UserAgentConfig,
) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(user_agent.header_value())
        .timeout(Duration::from_secs(crawler.request_timeout_secs))
        .connect_timeout(Duration::from_secs(crawler.connect_timeout_secs))
        .gzip(true)
        .brotli(true)
        .build()
}

/// HTTP fetcher that waits out rate limiting
#[derive(Debug, Clone)]
pub struct RateLimitedFetcher {
    client: Client,
    policy: BackoffPolicy,
}

impl RateLimitedFetcher {
    pub fn new(client: Client, policy: BackoffPolicy) -> Self {
        Self { client, policy }
    }

    /// Builds a fetcher from configuration
    pub fn from_config(
        crawler: &CrawlerConfig,
        backoff: &BackoffConfig,
        user_agent: &UserAgentConfig,
    ) -> Result<Self, HarvestError> {
        let client = build_http_client(crawler, user_agent)?;
        Ok(Self::new(client, BackoffPolicy::from(backoff)))
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Fetches a URL, retrying for as long as the server answers 429
    ///
    /// Each 429 is logged and followed by a sleep computed by
    /// [`BackoffPolicy::wait_for`]. Transport failures are returned
    /// immediately.
    ///
    /// # Errors
    ///
    /// * `HarvestError::TransientServer` - the policy's consecutive-429 limit was hit
    /// * `HarvestError::Http` - the request or body read failed
    pub async fn fetch(&self, url: &Url) -> Result<PageContent, HarvestError> {
        let mut consecutive = 0u32;

        loop {
            let response = self
                .client
                .get(url.as_str())
                .send()
                .await
                .map_err(|source| HarvestError::Http {
                    url: url.to_string(),
                    source,
                })?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                consecutive += 1;
                if self.policy.gives_up_after(consecutive) {
                    tracing::error!(
                        "Giving up on {} after {} consecutive 429 responses",
                        url,
                        consecutive
                    );
                    return Err(HarvestError::TransientServer {
                        url: url.to_string(),
                        attempts: consecutive,
                    });
                }

                let retry_after = parse_retry_after(response.headers());
                if retry_after.is_none() {
                    tracing::warn!("429 from {} without a usable retry-after header", url);
                }
                let wait = self.policy.wait_for(retry_after);
                tracing::warn!(
                    "429 Error, trying again in {} seconds (attempt {})",
                    wait.as_secs(),
                    consecutive
                );
                tokio::time::sleep(wait).await;
                continue;
            }

            let body = response.text().await.map_err(|source| HarvestError::Http {
                url: url.to_string(),
                source,
            })?;

            return Ok(PageContent {
                url: url.to_string(),
                status: status.as_u16(),
                body,
                rate_limit_waits: consecutive,
            });
        }
    }
}
