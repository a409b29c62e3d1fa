//! Layered application configuration.
//!
//! Defaults are compiled in; an optional `price-scout.toml` next to the
//! binary overrides them, and `PRICE_SCOUT_*` environment variables override
//! both (e.g. `PRICE_SCOUT_FETCH__MAX_CONCURRENCY=3`).

use std::path::Path;

use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};

use crate::domain::errors::ScrapeError;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub fetch: FetchConfig,
    pub cache: CacheConfig,
    pub batch: BatchConfig,
    pub history: HistoryConfig,
    pub normalizer: NormalizerSettings,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Lower bound of the per-domain courtesy delay, in milliseconds.
    /// The 2000-5000 default is conservative; 600-1200 works when the
    /// target tolerates higher request rates.
    pub min_delay_ms: u64,
    /// Upper bound of the per-domain courtesy delay, in milliseconds.
    pub max_delay_ms: u64,
    pub request_timeout_secs: u64,
    /// Global cap across all domains, requests per second.
    pub global_rps: u32,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub user_agent: String,
    pub accept_language: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: 2_000,
            max_delay_ms: 5_000,
            request_timeout_secs: 25,
            global_rps: 4,
            max_retries: 2,
            retry_base_delay_ms: 1_000,
            user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                         (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36"
                .to_string(),
            accept_language: "pt-BR,pt;q=0.9,en-US;q=0.8,en;q=0.7".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub ttl_secs: u64,
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            enabled: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    pub max_concurrency: usize,
    pub max_batch_size: usize,
    pub max_search_results: usize,
    pub max_query_len: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 6,
            max_batch_size: 50,
            max_search_results: 20,
            max_query_len: 100,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// SQLite URL, e.g. `sqlite://price_history.db?mode=rwc`.
    pub database_url: String,
    /// Snapshots for the same URL within this window are dropped as
    /// duplicates.
    pub dedup_window_secs: i64,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://price_history.db?mode=rwc".to_string(),
            dedup_window_secs: 120,
            default_limit: 30,
            max_limit: 100,
        }
    }
}

/// Mirror of [`crate::domain::NormalizerConfig`] as it appears on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerSettings {
    pub min_price: f64,
    pub max_price: f64,
    pub min_installment_value: f64,
    pub max_installment_value: f64,
    pub installment_precision_floor: f64,
}

impl Default for NormalizerSettings {
    fn default() -> Self {
        let d = crate::domain::NormalizerConfig::default();
        Self {
            min_price: d.min_price,
            max_price: d.max_price,
            min_installment_value: d.min_installment_value,
            max_installment_value: d.max_installment_value,
            installment_precision_floor: d.installment_precision_floor,
        }
    }
}

impl From<&NormalizerSettings> for crate::domain::NormalizerConfig {
    fn from(s: &NormalizerSettings) -> Self {
        Self {
            min_price: s.min_price,
            max_price: s.max_price,
            min_installment_value: s.min_installment_value,
            max_installment_value: s.max_installment_value,
            installment_precision_floor: s.installment_precision_floor,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive, overridable via `RUST_LOG`.
    pub filter: String,
    pub json: bool,
    /// When set, logs also go to a daily-rotated file in this directory.
    pub file_dir: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info,price_scout=debug".to_string(),
            json: false,
            file_dir: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the optional TOML file, then `PRICE_SCOUT_*` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ScrapeError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default())
            .map_err(|e| ScrapeError::Validation(format!("default config: {e}")))?);

        match path {
            Some(p) => builder = builder.add_source(File::from(p)),
            None => builder = builder.add_source(File::with_name("price-scout").required(false)),
        }

        builder = builder.add_source(Environment::with_prefix("PRICE_SCOUT").separator("__"));

        let config = builder
            .build()
            .map_err(|e| ScrapeError::Validation(format!("config load: {e}")))?;
        let mut loaded: AppConfig = config
            .try_deserialize()
            .map_err(|e| ScrapeError::Validation(format!("config shape: {e}")))?;
        loaded.validate()?;
        Ok(loaded)
    }

    fn validate(&mut self) -> Result<(), ScrapeError> {
        if self.fetch.min_delay_ms > self.fetch.max_delay_ms {
            return Err(ScrapeError::Validation(
                "fetch.min_delay_ms must not exceed fetch.max_delay_ms".into(),
            ));
        }
        if self.batch.max_concurrency == 0 || self.batch.max_batch_size == 0 {
            return Err(ScrapeError::Validation(
                "batch.max_concurrency and batch.max_batch_size must be positive".into(),
            ));
        }
        if self.history.max_limit < self.history.default_limit {
            self.history.max_limit = self.history.default_limit;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_coherent() {
        let config = AppConfig::default();
        assert_eq!(config.cache.ttl_secs, 600);
        assert_eq!(config.batch.max_concurrency, 6);
        assert_eq!(config.batch.max_batch_size, 50);
        assert!(config.fetch.min_delay_ms <= config.fetch.max_delay_ms);
        assert!(config.fetch.user_agent.contains("Chrome/120"));
    }

    #[test]
    fn toml_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price-scout.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[cache]\nttl_secs = 60\n\n[batch]\nmax_concurrency = 2").unwrap();

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.cache.ttl_secs, 60);
        assert_eq!(config.batch.max_concurrency, 2);
        // untouched sections keep their defaults
        assert_eq!(config.batch.max_batch_size, 50);
    }

    #[test]
    fn inverted_delay_bounds_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("price-scout.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "[fetch]\nmin_delay_ms = 9000\nmax_delay_ms = 100").unwrap();

        assert!(AppConfig::load(Some(&path)).is_err());
    }
}
