//! Selector-based extraction, the fallback pass after embedded JSON.
//!
//! Only fields still empty on the record are written. Marketplace quirks
//! live here: Mercado Livre splits prices into fraction and cents nodes,
//! Amazon keeps a screen-reader copy of the full price in `.a-offscreen`.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::domain::product::{RawPrice, RawProduct};

use super::selectors::{self, SelectorSet};
use super::Platform;

static INSTALLMENT_COUNT_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(\d{1,2})\s*x\s*(?:de\s*)?R\$\s*([\d.,]+)").unwrap());
static INSTALLMENT_TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)R\$\s*([\d.,]+)\s*em\s*(?:at[eé]\s*)?\d{1,2}\s*x").unwrap());
static RATING_VALUE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d[.,]\d)").unwrap());
static LEADING_INT: Lazy<Regex> = Lazy::new(|| Regex::new(r"([\d.]+)").unwrap());

pub fn fill(raw: &mut RawProduct, platform: Platform, document: &Html) {
    let set = selectors::for_platform(platform);

    if raw.title.is_none() {
        raw.title = first_text(document, set.title);
    }
    if raw.price.is_none() {
        raw.price = extract_price(document, set);
    }
    if raw.previous_price.is_none() {
        raw.previous_price = first_text(document, set.previous_price)
            .and_then(|t| parse_marketplace_price(&t));
    }
    if raw.image.is_none() {
        raw.image = first_image(document, set.image);
    }
    if raw.shipping_text.is_none() {
        raw.shipping_text = first_text(document, set.shipping);
    }

    if raw.installment_count.is_none() {
        if let Some(text) = first_text(document, set.installments) {
            apply_installments(raw, &text);
        }
    }

    if raw.rating.is_none() {
        raw.rating = first_text(document, set.rating).and_then(|t| {
            RATING_VALUE
                .captures(&t)
                .and_then(|c| c[1].replace(',', ".").parse::<f64>().ok())
                .filter(|r| (0.0..=5.0).contains(r))
        });
    }
    if raw.review_count.is_none() {
        raw.review_count = first_text(document, set.review_count).and_then(|t| {
            LEADING_INT
                .captures(&t)
                .and_then(|c| c[1].replace('.', "").parse::<u32>().ok())
        });
    }

    if !raw.official_store {
        raw.official_store = first_text(document, set.official_store)
            .map(|t| {
                let lower = t.to_lowercase();
                lower.contains("loja oficial") || lower.contains("official store")
            })
            .unwrap_or(false);
    }
}

fn extract_price(document: &Html, set: &SelectorSet) -> Option<RawPrice> {
    if let Some(text) = first_text(document, set.price_full) {
        return Some(RawPrice::Text(text));
    }

    // Split layout: integer part in one node, cents in a sibling.
    let whole = first_text(document, set.price_whole)?;
    let whole = whole.trim_end_matches([',', '.']).to_string();
    match first_text(document, set.price_cents) {
        Some(cents) => Some(RawPrice::Text(format!("{whole},{cents}"))),
        // A lone fraction node's dots are thousands separators.
        None => Some(RawPrice::Text(whole.replace('.', ""))),
    }
}

/// Price text from a fraction-only node, where every dot is a thousands
/// separator ("1.499" is 1499, not 1.499).
fn parse_marketplace_price(text: &str) -> Option<f64> {
    let cleaned = text.trim().trim_start_matches("R$").trim();
    if cleaned.contains(',') {
        crate::domain::normalize::parse_price_text(cleaned)
    } else {
        cleaned.replace('.', "").parse::<f64>().ok()
    }
}

fn apply_installments(raw: &mut RawProduct, text: &str) {
    if let Some(captures) = INSTALLMENT_COUNT_VALUE.captures(text) {
        raw.installment_count = captures[1].parse::<u32>().ok();
        raw.installment_value = crate::domain::normalize::parse_price_text(&captures[2]);
    }
    if let Some(captures) = INSTALLMENT_TOTAL.captures(text) {
        raw.installment_total = crate::domain::normalize::parse_price_text(&captures[1]);
        if raw.installment_count.is_none() {
            if let Some(c) = INSTALLMENT_COUNT_VALUE.captures(text) {
                raw.installment_count = c[1].parse::<u32>().ok();
            }
        }
    }

    let lower = text.to_lowercase();
    if lower.contains("sem juros") {
        raw.interest_free = Some(true);
    } else if lower.contains("com juros") || lower.contains("com acr") {
        raw.interest_free = Some(false);
    }
}

fn first_text(document: &Html, selector_list: &[&str]) -> Option<String> {
    for selector in selector_list {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        if let Some(element) = document.select(&parsed).next() {
            if let Some(text) = element_text(element) {
                return Some(text);
            }
        }
    }
    None
}

/// Visible text, or the `content` attribute for `<meta>` selectors.
fn element_text(element: ElementRef) -> Option<String> {
    if element.value().name() == "meta" {
        return element
            .value()
            .attr("content")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
    }
    let text = element
        .text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_image(document: &Html, selector_list: &[&str]) -> Option<String> {
    for selector in selector_list {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&parsed) {
            let value = element.value();
            let candidate = if value.name() == "meta" {
                value.attr("content")
            } else {
                value
                    .attr("data-zoom")
                    .or_else(|| value.attr("src"))
                    .or_else(|| value.attr("data-src"))
            };
            if let Some(url) = candidate.map(str::trim).filter(|u| u.starts_with("http")) {
                return Some(url.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_platform(platform: Platform, body: &str) -> RawProduct {
        let mut raw = RawProduct::new(platform.label(), "https://example.com/p");
        let document = Html::parse_document(body);
        fill(&mut raw, platform, &document);
        raw
    }

    #[test]
    fn mercado_livre_split_price_and_title() {
        let raw = fill_platform(
            Platform::MercadoLivre,
            r#"<h1 class="ui-pdp-title">Fone Bluetooth XYZ</h1>
            <div class="ui-pdp-price__second-line">
              <span class="andes-money-amount__fraction">1.299</span>
              <span class="andes-money-amount__cents">90</span>
            </div>
            <p class="ui-pdp-color--GREEN">Frete grátis</p>"#,
        );
        assert_eq!(raw.title.as_deref(), Some("Fone Bluetooth XYZ"));
        assert_eq!(raw.price, Some(RawPrice::Text("1.299,90".to_string())));
        assert_eq!(raw.shipping_text.as_deref(), Some("Frete grátis"));
    }

    #[test]
    fn mercado_livre_fraction_without_cents_drops_thousand_dots() {
        let raw = fill_platform(
            Platform::MercadoLivre,
            r#"<div class="ui-pdp-price__second-line">
              <span class="andes-money-amount__fraction">1.299</span>
            </div>"#,
        );
        assert_eq!(raw.price, Some(RawPrice::Text("1299".to_string())));
    }

    #[test]
    fn mercado_livre_previous_price_and_installments() {
        let raw = fill_platform(
            Platform::MercadoLivre,
            r#"<s class="andes-money-amount--previous">
              <span class="andes-money-amount__fraction">1.499</span>
            </s>
            <div class="ui-pdp-price__subtitles">em 12x de R$ 108,25 sem juros</div>"#,
        );
        assert_eq!(raw.previous_price, Some(1499.0));
        assert_eq!(raw.installment_count, Some(12));
        assert_eq!(raw.installment_value, Some(108.25));
        assert_eq!(raw.interest_free, Some(true));
    }

    #[test]
    fn amazon_offscreen_price_and_rating() {
        let raw = fill_platform(
            Platform::Amazon,
            r#"<span id="productTitle"> Echo Dot 5a geração </span>
            <div id="corePriceDisplay_desktop_feature_div">
              <span class="a-price"><span class="a-offscreen">R$ 379,00</span></span>
            </div>
            <span id="acrPopover"><span class="a-icon-alt">4,6 de 5 estrelas</span></span>
            <span id="acrCustomerReviewText">12.852 avaliações</span>"#,
        );
        assert_eq!(raw.title.as_deref(), Some("Echo Dot 5a geração"));
        assert_eq!(raw.price, Some(RawPrice::Text("R$ 379,00".to_string())));
        assert_eq!(raw.rating, Some(4.6));
        assert_eq!(raw.review_count, Some(12852));
    }

    #[test]
    fn amazon_installment_total_phrase() {
        let raw = fill_platform(
            Platform::Amazon,
            r#"<div id="installmentCalculator_feature_div">
              ou R$ 1.299,00 em até 10x R$ 129,90 sem juros
            </div>"#,
        );
        assert_eq!(raw.installment_total, Some(1299.0));
        assert_eq!(raw.installment_count, Some(10));
        assert_eq!(raw.installment_value, Some(129.90));
        assert_eq!(raw.interest_free, Some(true));
    }

    #[test]
    fn generic_page_uses_open_graph_meta() {
        let raw = fill_platform(
            Platform::Generic,
            r#"<head>
              <meta property="og:title" content="Produto Generico">
              <meta property="og:image" content="https://img.example/g.jpg">
            </head>
            <body><span itemprop="price">R$ 59,90</span></body>"#,
        );
        // h1 is preferred but absent, og:title fills in
        assert_eq!(raw.title.as_deref(), Some("Produto Generico"));
        assert_eq!(raw.image.as_deref(), Some("https://img.example/g.jpg"));
        assert_eq!(raw.price, Some(RawPrice::Text("R$ 59,90".to_string())));
    }

    #[test]
    fn official_store_badge() {
        let raw = fill_platform(
            Platform::MercadoLivre,
            r#"<div class="ui-pdp-seller__header__title">Loja oficial Samsung</div>"#,
        );
        assert!(raw.official_store);
    }

    #[test]
    fn empty_page_yields_empty_record() {
        let raw = fill_platform(Platform::Amazon, "<html><body></body></html>");
        assert!(raw.is_empty());
        assert!(raw.image.is_none());
    }
}
