//! Adapters to the outside world: HTTP, page extraction, the TTL cache,
//! SQLite persistence, configuration and logging.

pub mod cache;
pub mod config;
pub mod extraction;
pub mod history_repository;
pub mod http_client;
pub mod logging;
pub mod rate_limiter;

pub use cache::{canonical_cache_key, TtlCache};
pub use config::AppConfig;
pub use extraction::Platform;
pub use history_repository::PriceHistory;
pub use http_client::{FetchedPage, HttpClient, PageFetcher};
pub use rate_limiter::DomainRateLimiter;
