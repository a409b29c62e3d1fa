//! Product data extraction from fetched pages.
//!
//! Two passes over every page: embedded JSON first (ld+json and framework
//! state blobs), then CSS selectors for whatever the JSON pass left empty.
//! JSON wins because marketplaces A/B-test their markup far more often than
//! their structured data.

pub mod html;
pub mod json_embedded;
pub mod selectors;

use scraper::Html;
use tracing::{debug, warn};
use url::Url;

use crate::domain::product::RawProduct;

use super::http_client::FetchedPage;

/// Body fragments that identify an anti-bot interstitial rather than a
/// product page. Checked case-insensitively against the head of the body.
const BLOCK_SIGNATURES: &[&str] = &[
    "captcha",
    "just a moment",
    "cloudflare",
    "robot check",
    "automated access",
    "digite os caracteres",
    "verifique que",
];

/// Only the head of the page is scanned; a legitimate product page can
/// mention "captcha" in a review far below the fold.
const BLOCK_SCAN_CHARS: usize = 8_192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MercadoLivre,
    Amazon,
    Generic,
}

impl Platform {
    pub fn detect(url: &str) -> Self {
        let host = Url::parse(url)
            .ok()
            .and_then(|u| u.host_str().map(str::to_lowercase))
            .unwrap_or_default();
        if host.contains("mercadolivre") || host.contains("mercadolibre") {
            Platform::MercadoLivre
        } else if host.contains("amazon.") {
            Platform::Amazon
        } else {
            Platform::Generic
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Platform::MercadoLivre => "mercadolivre",
            Platform::Amazon => "amazon",
            Platform::Generic => "generic",
        }
    }
}

pub fn is_blocked_page(body: &str) -> bool {
    let head: String = body
        .chars()
        .take(BLOCK_SCAN_CHARS)
        .collect::<String>()
        .to_lowercase();
    BLOCK_SIGNATURES.iter().any(|sig| head.contains(sig))
}

/// Runs both extraction passes over a fetched page.
pub fn extract(page: &FetchedPage) -> RawProduct {
    let platform = Platform::detect(&page.final_url);
    let mut raw = RawProduct::new(platform.label(), page.url.clone());

    if is_blocked_page(&page.body) {
        warn!(url = %page.url, "page matched a block signature");
        raw.blocked = true;
        return raw;
    }

    let document = Html::parse_document(&page.body);

    json_embedded::fill(&mut raw, &document, &page.body);
    html::fill(&mut raw, platform, &document);

    if raw.is_empty() {
        debug!(url = %page.url, "no product data found in page");
    }
    raw
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, body: &str) -> FetchedPage {
        FetchedPage {
            url: url.to_string(),
            final_url: url.to_string(),
            status: 200,
            body: body.to_string(),
        }
    }

    #[test]
    fn platform_detection_by_host() {
        assert_eq!(
            Platform::detect("https://www.mercadolivre.com.br/p/MLB123"),
            Platform::MercadoLivre
        );
        assert_eq!(
            Platform::detect("https://produto.mercadolivre.com.br/MLB-456"),
            Platform::MercadoLivre
        );
        assert_eq!(
            Platform::detect("https://www.amazon.com.br/dp/B0ABC"),
            Platform::Amazon
        );
        assert_eq!(Platform::detect("https://loja.example.com/p/1"), Platform::Generic);
        assert_eq!(Platform::detect("not a url"), Platform::Generic);
    }

    #[test]
    fn captcha_page_is_flagged_blocked() {
        let body = "<html><head><title>Robot Check</title></head>\
                    <body>Digite os caracteres que voce ve</body></html>";
        let raw = extract(&page("https://www.amazon.com.br/dp/B0ABC", body));
        assert!(raw.blocked);
        assert!(raw.title.is_none());
    }

    #[test]
    fn block_keyword_deep_in_body_is_ignored() {
        let padding = "x".repeat(BLOCK_SCAN_CHARS);
        let body = format!("<html><body>{padding} review mentions captcha</body></html>");
        assert!(!is_blocked_page(&body));
    }

    #[test]
    fn json_data_wins_over_conflicting_markup() {
        let body = r#"<html><head>
            <script type="application/ld+json">
            {"@type":"Product","name":"Fone JSON","offers":{"price":"199.90","priceCurrency":"BRL"}}
            </script></head>
            <body><h1 class="ui-pdp-title">Fone HTML</h1>
            <div class="ui-pdp-price__second-line">
              <span class="andes-money-amount__fraction">299</span>
              <span class="andes-money-amount__cents">90</span>
            </div></body></html>"#;
        let raw = extract(&page("https://www.mercadolivre.com.br/p/MLB1", body));
        assert_eq!(raw.title.as_deref(), Some("Fone JSON"));
        assert_eq!(
            raw.price,
            Some(crate::domain::product::RawPrice::Number(199.90))
        );
    }

    #[test]
    fn markup_fills_fields_json_left_empty() {
        let body = r#"<html><head>
            <script type="application/ld+json">
            {"@type":"Product","name":"Fone JSON"}
            </script></head>
            <body>
            <div class="ui-pdp-price__second-line">
              <span class="andes-money-amount__fraction">1.299</span>
              <span class="andes-money-amount__cents">00</span>
            </div></body></html>"#;
        let raw = extract(&page("https://www.mercadolivre.com.br/p/MLB1", body));
        assert_eq!(raw.title.as_deref(), Some("Fone JSON"));
        assert_eq!(
            raw.price,
            Some(crate::domain::product::RawPrice::Text("1.299,00".to_string()))
        );
    }
}
