//! Per-domain courtesy delays.
//!
//! Each domain gets its own lock so that waiting on mercadolivre.com.br never
//! blocks a request to amazon.com.br. The lock is held across the sleep,
//! which serializes same-domain requests and spaces them by a jittered delay.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::trace;

#[derive(Debug, Default)]
struct DomainState {
    last_request: Option<Instant>,
}

#[derive(Debug)]
pub struct DomainRateLimiter {
    min_delay: Duration,
    max_delay: Duration,
    domains: Mutex<HashMap<String, Arc<Mutex<DomainState>>>>,
}

impl DomainRateLimiter {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
            domains: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_millis(min_ms: u64, max_ms: u64) -> Self {
        Self::new(Duration::from_millis(min_ms), Duration::from_millis(max_ms))
    }

    /// Waits until this domain may be hit again, then records the hit.
    /// Returns once the caller is clear to send.
    pub async fn acquire(&self, domain: &str) {
        let state = {
            let mut domains = self.domains.lock().await;
            domains.entry(domain.to_string()).or_default().clone()
        };

        let mut state = state.lock().await;
        if let Some(last) = state.last_request {
            let delay = self.jittered_delay();
            let elapsed = last.elapsed();
            if elapsed < delay {
                let wait = delay - elapsed;
                trace!(domain, wait_ms = wait.as_millis() as u64, "pacing request");
                tokio::time::sleep(wait).await;
            }
        }
        state.last_request = Some(Instant::now());
    }

    fn jittered_delay(&self) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = self.max_delay.as_millis() as u64;
        if max > min {
            Duration::from_millis(fastrand::u64(min..=max))
        } else {
            self.min_delay
        }
    }
}
