//! Batch orchestration: fan a list of product URLs out over a bounded
//! worker pool, run fetch/extract/normalize per URL, and fold the outcomes
//! into a single report.
//!
//! One bad URL never fails the batch. Blocks are terminal for the attempt,
//! cached outcomes are shared between concurrent requests for the same
//! product, and every history-worthy snapshot is appended to the price
//! history as a side effect.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::errors::ScrapeError;
use crate::domain::normalize::Normalizer;
use crate::domain::product::{PriceSnapshot, ProductSnapshot};
use crate::infrastructure::cache::{canonical_cache_key, TtlCache};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::extraction::{self, Platform};
use crate::infrastructure::history_repository::PriceHistory;
use crate::infrastructure::http_client::PageFetcher;

use super::dto::{BatchReport, ItemResult};
use super::search;

#[derive(Debug, Clone)]
struct Settings {
    max_concurrency: usize,
    max_batch_size: usize,
    max_search_results: usize,
    max_query_len: usize,
    max_retries: u32,
    retry_base_delay_ms: u64,
    cache_enabled: bool,
}

pub struct Orchestrator {
    fetcher: Arc<dyn PageFetcher>,
    cache: TtlCache<ItemResult>,
    normalizer: Normalizer,
    history: Option<Arc<PriceHistory>>,
    settings: Settings,
}

impl Orchestrator {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        history: Option<Arc<PriceHistory>>,
        config: &AppConfig,
    ) -> Self {
        Self {
            fetcher,
            cache: TtlCache::new(Duration::from_secs(config.cache.ttl_secs)),
            normalizer: Normalizer::new((&config.normalizer).into()),
            history,
            settings: Settings {
                max_concurrency: config.batch.max_concurrency,
                max_batch_size: config.batch.max_batch_size,
                max_search_results: config.batch.max_search_results,
                max_query_len: config.batch.max_query_len,
                max_retries: config.fetch.max_retries,
                retry_base_delay_ms: config.fetch.retry_base_delay_ms,
                cache_enabled: config.cache.enabled,
            },
        }
    }

    /// Scrapes every URL in the batch and reports per-item outcomes in
    /// input order. Rejects empty and oversized batches up front.
    pub async fn compare(
        self: &Arc<Self>,
        urls: &[String],
        use_cache: bool,
    ) -> Result<BatchReport, ScrapeError> {
        self.compare_with_cancel(urls, use_cache, CancellationToken::new())
            .await
    }

    pub async fn compare_with_cancel(
        self: &Arc<Self>,
        urls: &[String],
        use_cache: bool,
        cancel: CancellationToken,
    ) -> Result<BatchReport, ScrapeError> {
        if urls.is_empty() {
            return Err(ScrapeError::InvalidInput("empty url batch".into()));
        }
        if urls.len() > self.settings.max_batch_size {
            return Err(ScrapeError::InvalidInput(format!(
                "batch of {} urls exceeds the limit of {}",
                urls.len(),
                self.settings.max_batch_size
            )));
        }

        info!(total = urls.len(), use_cache, "starting batch");
        let semaphore = Arc::new(Semaphore::new(self.settings.max_concurrency));

        let mut handles = Vec::with_capacity(urls.len());
        for url in urls {
            let this = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let cancel = cancel.clone();
            let url = url.clone();
            handles.push(tokio::spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return ItemResult::failed(&url, "cancelled", "batch aborted".to_string())
                    }
                };
                this.process_one(&url, use_cache, &cancel).await
            }));
        }

        let joined = futures::future::join_all(handles).await;
        let mut results = Vec::with_capacity(urls.len());
        for (index, outcome) in joined.into_iter().enumerate() {
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!(url = %urls[index], "worker task failed: {e}");
                    results.push(ItemResult::failed(
                        &urls[index],
                        "error",
                        "worker task failed".to_string(),
                    ));
                }
            }
        }

        let warnings = block_warnings(&results);
        let report = BatchReport::from_results(results, warnings);
        info!(
            successful = report.successful,
            failed = report.failed,
            "batch finished"
        );
        Ok(report)
    }

    /// Expands a free-text query into marketplace listings, pulls product
    /// links from each, and scrapes them as a batch.
    pub async fn search(
        self: &Arc<Self>,
        query: &str,
        use_cache: bool,
    ) -> Result<BatchReport, ScrapeError> {
        self.search_with_cancel(query, use_cache, CancellationToken::new())
            .await
    }

    /// Like [`search`](Self::search), but cancellable: the token aborts both
    /// the listing fetches and the product batch they expand into.
    pub async fn search_with_cancel(
        self: &Arc<Self>,
        query: &str,
        use_cache: bool,
        cancel: CancellationToken,
    ) -> Result<BatchReport, ScrapeError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ScrapeError::InvalidInput("empty search query".into()));
        }
        if query.chars().count() > self.settings.max_query_len {
            return Err(ScrapeError::InvalidInput(format!(
                "query longer than {} characters",
                self.settings.max_query_len
            )));
        }

        let per_platform = (self.settings.max_search_results / 2).max(1);
        let mut product_urls: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        for (platform, listing_url) in search::search_urls(query) {
            match self.fetch_with_retry(&listing_url, &cancel).await {
                Ok(page) => {
                    if extraction::is_blocked_page(&page.body) {
                        warn!(platform = platform.label(), "listing page blocked");
                        warnings.push(format!("{}: listing page blocked", platform.label()));
                        continue;
                    }
                    let links = search::extract_listing_links(platform, &page.body, per_platform);
                    if links.is_empty() {
                        warnings.push(format!(
                            "{}: no results for \"{query}\"",
                            platform.label()
                        ));
                    }
                    product_urls.extend(links);
                }
                Err(e) => {
                    warnings.push(format!(
                        "{}: listing fetch failed: {e}",
                        platform.label()
                    ));
                }
            }
        }

        product_urls.truncate(self.settings.max_search_results);
        if product_urls.is_empty() {
            return Ok(BatchReport::from_results(Vec::new(), warnings));
        }

        let mut report = self
            .compare_with_cancel(&product_urls, use_cache, cancel)
            .await?;
        warnings.append(&mut report.warnings);
        report.warnings = warnings;
        Ok(report)
    }

    pub async fn price_history(
        &self,
        url: &str,
        limit: Option<usize>,
    ) -> Result<Vec<PriceSnapshot>, ScrapeError> {
        let history = self
            .history
            .as_ref()
            .ok_or_else(|| ScrapeError::History("price history not configured".into()))?;
        history.history(url, limit).await
    }

    pub async fn clear_cache(&self) {
        self.cache.clear().await;
    }

    async fn process_one(
        self: Arc<Self>,
        url: &str,
        use_cache: bool,
        cancel: &CancellationToken,
    ) -> ItemResult {
        if let Err(e) = validate_product_url(url) {
            return ItemResult::failed(url, e.status_label(), e.to_string());
        }

        let key = canonical_cache_key(url);
        if use_cache && self.settings.cache_enabled {
            let outcome = self
                .cache
                .get_or_fetch(&key, || self.run_item_cacheable(url, cancel))
                .await;
            match outcome {
                Ok(item) => item,
                Err(e) => ItemResult::failed(url, e.status_label(), e.to_string()),
            }
        } else {
            let item = self.run_item(url, cancel).await;
            if self.settings.cache_enabled && item.status != "cancelled" {
                self.cache.put(&key, item.clone()).await;
            }
            item
        }
    }

    /// Outcomes are cached success or failure alike; cancellation is the one
    /// exception, since it describes the batch rather than the page and must
    /// not stick for the whole TTL.
    async fn run_item_cacheable(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ItemResult, ScrapeError> {
        let item = self.run_item(url, cancel).await;
        if item.status == "cancelled" {
            Err(ScrapeError::Cancelled)
        } else {
            Ok(item)
        }
    }

    async fn run_item(&self, url: &str, cancel: &CancellationToken) -> ItemResult {
        match self.run_pipeline(url, cancel).await {
            Ok(item) => item,
            Err(e) => {
                debug!(%url, error = %e, "item failed");
                ItemResult::failed(url, e.status_label(), e.to_string())
            }
        }
    }

    async fn run_pipeline(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<ItemResult, ScrapeError> {
        let page = self.fetch_with_retry(url, cancel).await?;

        let raw = extraction::extract(&page);
        if raw.blocked {
            return Err(ScrapeError::Captcha);
        }
        if raw.is_empty() {
            return Err(ScrapeError::Parse(format!("no product data at {url}")));
        }

        let snapshot = self.normalizer.normalize(raw);
        self.record_history(&snapshot).await;
        Ok(ItemResult::ok(url, snapshot))
    }

    /// Retries transient fetch errors with exponential backoff and jitter.
    /// Blocks and cancellations pass through untouched.
    async fn fetch_with_retry(
        &self,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<crate::infrastructure::http_client::FetchedPage, ScrapeError> {
        let mut attempt: u32 = 0;
        loop {
            match self.fetcher.fetch(url, cancel).await {
                Ok(page) => return Ok(page),
                Err(e) if e.is_transient() && attempt < self.settings.max_retries => {
                    attempt += 1;
                    let base = self.settings.retry_base_delay_ms;
                    let delay = base * (1 << (attempt - 1)) + fastrand::u64(0..=base);
                    warn!(%url, attempt, delay_ms = delay, "retrying after {e}");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(ScrapeError::Cancelled),
                        _ = tokio::time::sleep(Duration::from_millis(delay)) => {}
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn record_history(&self, snapshot: &ProductSnapshot) {
        let Some(history) = &self.history else {
            return;
        };
        let Some(row) = PriceSnapshot::from_product(snapshot) else {
            return;
        };
        if let Err(e) = history.append(&row).await {
            // History is a side effect; the item result still succeeds.
            warn!(url = %row.source_url, "history append failed: {e}");
        }
    }
}

fn validate_product_url(url: &str) -> Result<(), ScrapeError> {
    let parsed = Url::parse(url)
        .map_err(|e| ScrapeError::InvalidInput(format!("invalid url {url}: {e}")))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ScrapeError::InvalidInput(format!(
            "unsupported scheme in {url}"
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ScrapeError::InvalidInput(format!("url without host: {url}")));
    }
    Ok(())
}

/// One warning per platform that had blocked requests.
fn block_warnings(results: &[ItemResult]) -> Vec<String> {
    let mut per_platform: Vec<(&'static str, usize, usize)> = Vec::new();
    for result in results {
        let platform = Platform::detect(&result.url).label();
        let index = match per_platform.iter().position(|(p, _, _)| *p == platform) {
            Some(index) => index,
            None => {
                per_platform.push((platform, 0, 0));
                per_platform.len() - 1
            }
        };
        per_platform[index].1 += 1;
        if result.status == "blocked" {
            per_platform[index].2 += 1;
        }
    }

    per_platform
        .into_iter()
        .filter(|(_, _, blocked)| *blocked > 0)
        .map(|(platform, total, blocked)| {
            format!("{platform}: {blocked} of {total} requests blocked")
        })
        .collect()
}
