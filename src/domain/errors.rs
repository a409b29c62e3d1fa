//! Error taxonomy for the scraping pipeline
//!
//! Per-item failures are caught by the orchestrator and folded into item
//! results; only `InvalidInput` rejects a batch before dispatch.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    /// The origin actively refused service (HTTP 403/429). Permanent for
    /// this attempt; retrying only deepens the block.
    #[error("blocked by origin (HTTP {status})")]
    Blocked { status: u16 },

    /// The body was a captcha or bot-check interstitial behind a 200.
    #[error("blocked by origin (captcha challenge)")]
    Captcha,

    /// Network-level failure or timeout. Transient; the orchestrator may
    /// retry.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// Neither embedded JSON nor HTML selectors produced usable data.
    #[error("no usable product data: {0}")]
    Parse(String),

    /// A normalized value fell outside its plausibility bounds.
    #[error("value outside plausible range: {0}")]
    Validation(String),

    /// Structural problem with the batch request itself.
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// Price-history persistence failure.
    #[error("history store error: {0}")]
    History(String),

    /// The batch's cancellation token fired before this item finished.
    #[error("cancelled")]
    Cancelled,
}

impl ScrapeError {
    /// Whether the orchestrator's retry policy may re-attempt this error.
    /// Blocks are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScrapeError::Fetch(_))
    }

    /// Whether this failure should surface as a batch-level warning in
    /// addition to the per-item error.
    pub fn is_block(&self) -> bool {
        matches!(self, ScrapeError::Blocked { .. } | ScrapeError::Captcha)
    }

    /// Stable label carried on item results.
    pub fn status_label(&self) -> &'static str {
        match self {
            ScrapeError::Blocked { .. } | ScrapeError::Captcha => "blocked",
            ScrapeError::Fetch(_) => "fetch_error",
            ScrapeError::Parse(_) => "parse_error",
            ScrapeError::InvalidInput(_) => "invalid_input",
            ScrapeError::Cancelled => "cancelled",
            ScrapeError::Validation(_) | ScrapeError::History(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_fetch_errors_are_transient() {
        assert!(ScrapeError::Fetch("timeout".into()).is_transient());
        assert!(!ScrapeError::Blocked { status: 403 }.is_transient());
        assert!(!ScrapeError::Captcha.is_transient());
        assert!(!ScrapeError::Parse("empty".into()).is_transient());
    }

    #[test]
    fn blocks_surface_as_warnings() {
        assert!(ScrapeError::Blocked { status: 429 }.is_block());
        assert!(ScrapeError::Captcha.is_block());
        assert!(!ScrapeError::Fetch("reset".into()).is_block());
    }
}
