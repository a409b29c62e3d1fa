//! Rate-limited HTTP fetching with a browser-like profile.
//!
//! Two throttles compose here: a global requests-per-second cap shared by
//! every domain, and the per-domain courtesy delay from
//! [`DomainRateLimiter`]. Both are awaited before a request leaves.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use governor::{
    clock::DefaultClock, state::InMemoryState, state::NotKeyed, Quota, RateLimiter,
};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use url::Url;

use crate::domain::errors::ScrapeError;

use super::config::FetchConfig;
use super::rate_limiter::DomainRateLimiter;

/// A fetched page body plus the response metadata extraction cares about.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL as requested.
    pub url: String,
    /// URL after redirects; used for platform detection and canonical links.
    pub final_url: String,
    pub status: u16,
    pub body: String,
}

/// Seam between the orchestration layer and the network. Tests swap in stub
/// implementations; production uses [`HttpClient`].
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, ScrapeError>;
}

pub struct HttpClient {
    client: reqwest::Client,
    global_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    domain_limiter: Arc<DomainRateLimiter>,
}

impl HttpClient {
    pub fn new(config: &FetchConfig) -> Result<Self, ScrapeError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_str(&config.accept_language)
                .map_err(|e| ScrapeError::Validation(format!("accept_language: {e}")))?,
        );

        let client = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(10))
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| ScrapeError::Fetch(format!("client build: {e}")))?;

        let rps = NonZeroU32::new(config.global_rps.max(1))
            .ok_or_else(|| ScrapeError::Validation("global_rps must be positive".into()))?;

        Ok(Self {
            client,
            global_limiter: RateLimiter::direct(Quota::per_second(rps)),
            domain_limiter: Arc::new(DomainRateLimiter::from_millis(
                config.min_delay_ms,
                config.max_delay_ms,
            )),
        })
    }

    async fn fetch_inner(&self, url: &str) -> Result<FetchedPage, ScrapeError> {
        let parsed = Url::parse(url)
            .map_err(|e| ScrapeError::InvalidInput(format!("invalid url {url}: {e}")))?;
        let domain = parsed
            .host_str()
            .ok_or_else(|| ScrapeError::InvalidInput(format!("url without host: {url}")))?
            .to_string();

        self.global_limiter.until_ready().await;
        self.domain_limiter.acquire(&domain).await;

        debug!(%url, "fetching page");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ScrapeError::Fetch(format!("request to {domain} failed: {e}")))?;

        let status = response.status();
        let final_url = response.url().to_string();

        if status.as_u16() == 403 || status.as_u16() == 429 {
            warn!(%url, status = status.as_u16(), "request blocked by remote");
            return Err(ScrapeError::Blocked {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(ScrapeError::Fetch(format!(
                "{domain} answered HTTP {}",
                status.as_u16()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ScrapeError::Fetch(format!("body read from {domain} failed: {e}")))?;

        Ok(FetchedPage {
            url: url.to_string(),
            final_url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpClient {
    async fn fetch(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<FetchedPage, ScrapeError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(ScrapeError::Cancelled),
            result = self.fetch_inner(url) => result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_with_default_config() {
        let client = HttpClient::new(&FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn invalid_url_is_rejected_before_any_network_io() {
        let client = HttpClient::new(&FetchConfig::default()).unwrap();
        let err = client
            .fetch("not a url", &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn pre_cancelled_token_short_circuits() {
        let client = HttpClient::new(&FetchConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = client
            .fetch("https://example.com/", &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ScrapeError::Cancelled));
    }
}
