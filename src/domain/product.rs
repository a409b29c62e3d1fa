//! Product entities shared across the extraction pipeline
//!
//! `RawProduct` is the transient field map produced by one extraction pass;
//! `ProductSnapshot` is the canonical record the pipeline hands to callers,
//! the cache, and the price history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Tri-state free-shipping flag.
///
/// Serialized as the strings `"true"` / `"false"` / `"unknown"` so downstream
/// consumers can distinguish "explicitly paid shipping" from "page said
/// nothing".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum FreeShipping {
    #[serde(rename = "true")]
    Free,
    #[serde(rename = "false")]
    Paid,
    #[serde(rename = "unknown")]
    #[default]
    Unknown,
}

/// Outcome classification of one extract+normalize pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ParseStatus {
    /// All essential and important fields present.
    #[default]
    Ok,
    /// Essential fields present but some data missing.
    Partial,
    /// The page content was a block/captcha interstitial.
    Blocked,
    /// The page could not be parsed at all.
    Error,
}

impl ParseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseStatus::Ok => "ok",
            ParseStatus::Partial => "partial",
            ParseStatus::Blocked => "blocked",
            ParseStatus::Error => "error",
        }
    }

    /// Inverse of [`as_str`](Self::as_str); unknown labels read as `Error`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "ok" => ParseStatus::Ok,
            "partial" => ParseStatus::Partial,
            "blocked" => ParseStatus::Blocked,
            _ => ParseStatus::Error,
        }
    }
}

/// A price as found on the page, before normalization.
///
/// Embedded JSON usually carries numbers; HTML carries display text such as
/// `"R$ 1.234,56"` that still needs locale-aware parsing.
#[derive(Debug, Clone, PartialEq)]
pub enum RawPrice {
    Number(f64),
    Text(String),
}

/// Raw field map extracted from a single product page.
///
/// Every optional field is an explicit `None` when neither the embedded JSON
/// nor the HTML selectors produced a value; the extractor never guesses.
#[derive(Debug, Clone, Default)]
pub struct RawProduct {
    /// Page host with the `www.` prefix stripped.
    pub platform: String,
    pub source_url: String,
    pub collected_at: Option<DateTime<Utc>>,
    pub title: Option<String>,
    pub price: Option<RawPrice>,
    /// Struck-through "from" price, when shown next to the current one.
    pub previous_price: Option<f64>,
    pub currency: Option<String>,
    pub image: Option<String>,
    /// Shipping/delivery text exactly as shown on the page.
    pub shipping_text: Option<String>,
    pub installment_count: Option<u32>,
    pub installment_value: Option<f64>,
    /// Total financed price ("ou R$ 1.299,00 em 12x").
    pub installment_total: Option<f64>,
    pub interest_free: Option<bool>,
    pub discount_percent: Option<f64>,
    pub rating: Option<f64>,
    pub review_count: Option<u32>,
    pub official_store: bool,
    /// Set when the body matched a block/captcha signature; all other fields
    /// are meaningless in that case.
    pub blocked: bool,
}

impl RawProduct {
    pub fn new(platform: impl Into<String>, source_url: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            source_url: source_url.into(),
            collected_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// True when neither a title nor any price form was found.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.price.is_none()
    }
}

/// Canonical, immutable product record produced by the normalizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSnapshot {
    pub platform: String,
    pub title: Option<String>,
    /// Always non-negative when present.
    pub price: Option<f64>,
    /// ISO-4217 code; defaults to `BRL` when the page gave no hint.
    pub currency: String,
    pub image: Option<String>,
    pub free_shipping: FreeShipping,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shipping_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_price: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_percent: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discount_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_total: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interest_free: Option<bool>,
    /// Agreement (0-100%) between listing and detail-page installment values.
    /// Advisory only; see `NormalizerConfig::installment_precision_floor`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub installment_precision: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<u32>,
    pub official_store: bool,
    pub source_url: String,
    pub collected_at: DateTime<Utc>,
    pub parse_status: ParseStatus,
    /// Human-readable names of fields that could not be extracted.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub missing_fields: Vec<String>,
}

impl ProductSnapshot {
    /// Whether this snapshot qualifies for the price history: a usable price
    /// and a parse that actually saw product data.
    pub fn history_worthy(&self) -> bool {
        matches!(self.parse_status, ParseStatus::Ok | ParseStatus::Partial)
            && self.price.map(|p| p > 0.0).unwrap_or(false)
            && !self.source_url.is_empty()
    }
}

/// One row of the append-only price history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceSnapshot {
    pub source_url: String,
    pub platform: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub price: f64,
    pub currency: String,
    pub collected_at: DateTime<Utc>,
    pub parse_status: ParseStatus,
}

impl PriceSnapshot {
    /// Build a history row from a snapshot, if it qualifies.
    pub fn from_product(product: &ProductSnapshot) -> Option<Self> {
        if !product.history_worthy() {
            return None;
        }
        Some(Self {
            source_url: product.source_url.clone(),
            platform: product.platform.clone(),
            title: product.title.clone(),
            price: product.price?,
            currency: product.currency.clone(),
            collected_at: product.collected_at,
            parse_status: product.parse_status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> ProductSnapshot {
        ProductSnapshot {
            platform: "mercadolivre.com.br".to_string(),
            title: Some("Teclado mecânico".to_string()),
            price: Some(249.9),
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
            source_url: "https://mercadolivre.com.br/p/1".to_string(),
            collected_at: Utc::now(),
            parse_status: ParseStatus::Ok,
            missing_fields: Vec::new(),
        }
    }

    #[test]
    fn free_shipping_serializes_as_legacy_strings() {
        assert_eq!(serde_json::to_string(&FreeShipping::Free).unwrap(), "\"true\"");
        assert_eq!(serde_json::to_string(&FreeShipping::Paid).unwrap(), "\"false\"");
        assert_eq!(
            serde_json::to_string(&FreeShipping::Unknown).unwrap(),
            "\"unknown\""
        );
    }

    #[test]
    fn history_worthy_requires_positive_price_and_clean_parse() {
        let mut product = snapshot();
        assert!(product.history_worthy());

        product.price = Some(0.0);
        assert!(!product.history_worthy());

        product.price = Some(10.0);
        product.parse_status = ParseStatus::Blocked;
        assert!(!product.history_worthy());
        assert!(PriceSnapshot::from_product(&product).is_none());
    }

    #[test]
    fn partial_snapshots_still_reach_history() {
        let mut product = snapshot();
        product.parse_status = ParseStatus::Partial;
        let row = PriceSnapshot::from_product(&product).unwrap();
        assert_eq!(row.price, 249.9);
        assert_eq!(row.parse_status, ParseStatus::Partial);
    }
}
