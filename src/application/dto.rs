//! Wire-shaped results returned by the orchestrator.

use serde::{Deserialize, Serialize};

use crate::domain::product::ProductSnapshot;

/// Outcome for one URL in a batch. Failures carry a message and a status
/// label instead of failing the whole batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemResult {
    pub success: bool,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ProductSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Machine-friendly label: `ok`, `blocked`, `fetch_error`, `parse_error`,
    /// `invalid_input`, `cancelled`, `error`.
    pub status: String,
}

impl ItemResult {
    pub fn ok(url: impl Into<String>, data: ProductSnapshot) -> Self {
        Self {
            success: true,
            url: url.into(),
            data: Some(data),
            error: None,
            status: "ok".to_string(),
        }
    }

    pub fn failed(url: impl Into<String>, status: impl Into<String>, error: String) -> Self {
        Self {
            success: false,
            url: url.into(),
            data: None,
            error: Some(error),
            status: status.into(),
        }
    }
}

/// Price history for one URL, newest first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryReport {
    pub total: usize,
    pub history: Vec<crate::domain::product::PriceSnapshot>,
}

impl From<Vec<crate::domain::product::PriceSnapshot>> for HistoryReport {
    fn from(history: Vec<crate::domain::product::PriceSnapshot>) -> Self {
        Self {
            total: history.len(),
            history,
        }
    }
}

/// Aggregate over a whole batch, in input order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ItemResult>,
    /// Operator-facing notices, e.g. "mercadolivre blocked 3 of 5 requests".
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub warnings: Vec<String>,
    /// Successful results per platform label.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub platform_counts: Vec<(String, usize)>,
}

impl BatchReport {
    pub fn from_results(results: Vec<ItemResult>, warnings: Vec<String>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let failed = results.len() - successful;

        let mut counts: Vec<(String, usize)> = Vec::new();
        for result in results.iter().filter(|r| r.success) {
            if let Some(data) = &result.data {
                match counts.iter_mut().find(|(p, _)| *p == data.platform) {
                    Some((_, n)) => *n += 1,
                    None => counts.push((data.platform.clone(), 1)),
                }
            }
        }

        Self {
            total: results.len(),
            successful,
            failed,
            results,
            warnings,
            platform_counts: counts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::product::{FreeShipping, ParseStatus};
    use chrono::Utc;

    fn product(platform: &str) -> ProductSnapshot {
        ProductSnapshot {
            platform: platform.to_string(),
            title: Some("P".to_string()),
            price: Some(10.0),
            currency: "BRL".to_string(),
            image: None,
            free_shipping: FreeShipping::Unknown,
            shipping_text: None,
            previous_price: None,
            discount_percent: None,
            discount_value: None,
            installment_count: None,
            installment_value: None,
            installment_total: None,
            interest_free: None,
            installment_precision: None,
            rating: None,
            review_count: None,
            official_store: false,
            source_url: "https://example.com/p".to_string(),
            collected_at: Utc::now(),
            parse_status: ParseStatus::Ok,
            missing_fields: Vec::new(),
        }
    }

    #[test]
    fn report_tallies_and_platform_counts() {
        let results = vec![
            ItemResult::ok("u1", product("amazon")),
            ItemResult::failed("u2", "blocked", "HTTP 403".to_string()),
            ItemResult::ok("u3", product("amazon")),
            ItemResult::ok("u4", product("mercadolivre")),
        ];
        let report = BatchReport::from_results(results, vec!["w".to_string()]);

        assert_eq!(report.total, 4);
        assert_eq!(report.successful, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.platform_counts, vec![
            ("amazon".to_string(), 2),
            ("mercadolivre".to_string(), 1),
        ]);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn failure_serializes_without_data_field() {
        let json = serde_json::to_string(&ItemResult::failed(
            "u",
            "fetch_error",
            "timeout".to_string(),
        ))
        .unwrap();
        assert!(!json.contains("\"data\""));
        assert!(json.contains("\"status\":\"fetch_error\""));
    }
}
