//! TTL cache with request coalescing.
//!
//! Concurrent misses for the same key share a single in-flight computation;
//! everyone else waits on the flight lock and then reads the fresh entry.
//! Failed computations are never cached.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::debug;
use url::Url;

use crate::domain::errors::ScrapeError;

/// Query parameters that change what a page shows. Everything else
/// (tracking ids, session tokens) is stripped so equivalent URLs share one
/// cache slot.
const SIGNIFICANT_PARAMS: &[&str] = &["k", "q", "rh", "p", "page", "s", "sort", "orderId"];

struct Entry<V> {
    value: V,
    inserted: Instant,
}

pub struct TtlCache<V> {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry<V>>>,
    flights: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<V: Clone> TtlCache<V> {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
            flights: Mutex::new(HashMap::new()),
        }
    }

    /// Returns a clone of the live entry, dropping it if it has expired.
    pub async fn get(&self, key: &str) -> Option<V> {
        let mut entries = self.entries.lock().await;
        match entries.get(key) {
            Some(entry) if entry.inserted.elapsed() < self.ttl => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, key: &str, value: V) {
        let mut entries = self.entries.lock().await;
        entries.insert(
            key.to_string(),
            Entry {
                value,
                inserted: Instant::now(),
            },
        );
    }

    pub async fn clear(&self) {
        self.entries.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, e| e.inserted.elapsed() < self.ttl);
        entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Cache hit, or compute-and-store with single-flight semantics: when
    /// several callers miss on the same key at once, exactly one runs
    /// `fetch` and the rest reuse its result.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, ScrapeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ScrapeError>>,
    {
        if let Some(value) = self.get(key).await {
            debug!(%key, "cache hit");
            return Ok(value);
        }

        let flight = {
            let mut flights = self.flights.lock().await;
            flights.entry(key.to_string()).or_default().clone()
        };
        let guard = flight.lock().await;

        // A coalesced caller may have populated the entry while we waited.
        if let Some(value) = self.get(key).await {
            debug!(%key, "cache hit after coalescing");
            drop(guard);
            self.release_flight(key).await;
            return Ok(value);
        }

        let result = fetch().await;
        if let Ok(ref value) = result {
            self.put(key, value.clone()).await;
        }
        drop(guard);
        self.release_flight(key).await;
        result
    }

    async fn release_flight(&self, key: &str) {
        let mut flights = self.flights.lock().await;
        if let Some(flight) = flights.get(key) {
            if Arc::strong_count(flight) <= 2 {
                flights.remove(key);
            }
        }
    }
}

/// Canonical cache key for a product or listing URL: scheme, host and path,
/// plus only the significant query parameters in sorted order. Fragments
/// are dropped. Unparseable input falls back to the trimmed raw string.
pub fn canonical_cache_key(url: &str) -> String {
    let parsed = match Url::parse(url.trim()) {
        Ok(u) => u,
        Err(_) => return url.trim().to_string(),
    };

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(name, _)| SIGNIFICANT_PARAMS.contains(&name.as_ref()))
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();
    params.sort();

    let host = parsed.host_str().unwrap_or("");
    let base = format!("{}://{}{}", parsed.scheme(), host, parsed.path());
    if params.is_empty() {
        base
    } else {
        let query: Vec<String> = params
            .into_iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("{}?{}", base, query.join("&"))
    }
}
