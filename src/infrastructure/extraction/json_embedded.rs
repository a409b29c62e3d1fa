//! Extraction from JSON embedded in product pages.
//!
//! Sources, in order: `application/ld+json` blocks (schema.org Product),
//! Next.js `__NEXT_DATA__`, and `window.__PRELOADED_STATE__` style
//! assignments. Fields already present on the record are never overwritten,
//! so earlier sources take precedence.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde_json::Value;
use tracing::trace;

use crate::domain::normalize::parse_price_text;
use crate::domain::product::{RawPrice, RawProduct};

static LD_JSON_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse(r#"script[type="application/ld+json"]"#).unwrap());
static NEXT_DATA_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("script#__NEXT_DATA__").unwrap());
static STATE_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)window\.__(?:PRELOADED_STATE|INITIAL_STATE|STATE)__\s*=\s*(\{.*?\})\s*;")
        .unwrap()
});

const MAX_WALK_DEPTH: usize = 12;

pub fn fill(raw: &mut RawProduct, document: &Html, body: &str) {
    for script in document.select(&LD_JSON_SELECTOR) {
        let text = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            apply_ld_tree(raw, &value);
        }
    }

    if let Some(script) = document.select(&NEXT_DATA_SELECTOR).next() {
        let text = script.text().collect::<String>();
        if let Ok(value) = serde_json::from_str::<Value>(&text) {
            trace!("walking __NEXT_DATA__ blob");
            walk_state(raw, &value, 0);
        }
    }

    for capture in STATE_ASSIGNMENT.captures_iter(body) {
        if let Ok(value) = serde_json::from_str::<Value>(&capture[1]) {
            trace!("walking window state blob");
            walk_state(raw, &value, 0);
        }
    }
}

/// Recurses through arrays and `@graph` wrappers looking for Product nodes.
fn apply_ld_tree(raw: &mut RawProduct, value: &Value) {
    match value {
        Value::Array(items) => {
            for item in items {
                apply_ld_tree(raw, item);
            }
        }
        Value::Object(map) => {
            if is_ld_product(value) {
                apply_ld_product(raw, map);
            }
            if let Some(graph) = map.get("@graph") {
                apply_ld_tree(raw, graph);
            }
        }
        _ => {}
    }
}

fn is_ld_product(value: &Value) -> bool {
    match value.get("@type") {
        Some(Value::String(t)) => t.eq_ignore_ascii_case("product"),
        Some(Value::Array(types)) => types
            .iter()
            .filter_map(Value::as_str)
            .any(|t| t.eq_ignore_ascii_case("product")),
        _ => false,
    }
}

fn apply_ld_product(raw: &mut RawProduct, map: &serde_json::Map<String, Value>) {
    if raw.title.is_none() {
        raw.title = map
            .get("name")
            .and_then(Value::as_str)
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
    }
    if raw.image.is_none() {
        raw.image = image_from(map.get("image"));
    }

    if let Some(offers) = map.get("offers").map(first_of) {
        if raw.price.is_none() {
            raw.price = offers
                .get("price")
                .or_else(|| offers.get("lowPrice"))
                .and_then(price_from);
        }
        if raw.currency.is_none() {
            raw.currency = offers
                .get("priceCurrency")
                .and_then(Value::as_str)
                .map(str::to_string);
        }
    }

    if let Some(rating) = map.get("aggregateRating").map(first_of) {
        if raw.rating.is_none() {
            raw.rating = rating.get("ratingValue").and_then(number_from);
        }
        if raw.review_count.is_none() {
            raw.review_count = rating
                .get("reviewCount")
                .or_else(|| rating.get("ratingCount"))
                .and_then(number_from)
                .map(|n| n as u32);
        }
    }
}

/// `offers` and friends may be a single object or an array of them.
fn first_of(value: &Value) -> &Value {
    match value {
        Value::Array(items) => items.first().unwrap_or(value),
        other => other,
    }
}

fn image_from(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Array(items) => items
            .iter()
            .find_map(|i| image_from(Some(i))),
        Value::Object(map) => map
            .get("url")
            .or_else(|| map.get("contentUrl"))
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn price_from(value: &Value) -> Option<RawPrice> {
    match value {
        Value::Number(n) => n.as_f64().map(RawPrice::Number),
        Value::String(s) => {
            // ld+json prices are dot-decimal; fall back to text heuristics
            // for anything odd.
            s.trim()
                .parse::<f64>()
                .ok()
                .map(RawPrice::Number)
                .or_else(|| parse_price_text(s).map(RawPrice::Number))
        }
        Value::Object(map) => map
            .get("amount")
            .or_else(|| map.get("value"))
            .and_then(price_from),
        _ => None,
    }
}

fn number_from(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse::<f64>().ok(),
        _ => None,
    }
}

/// Depth-first search through a framework state blob for the first object
/// that looks like a product: a price field next to a name or title.
fn walk_state(raw: &mut RawProduct, value: &Value, depth: usize) {
    if depth > MAX_WALK_DEPTH || !(raw.title.is_none() || raw.price.is_none()) {
        return;
    }
    match value {
        Value::Object(map) => {
            let name = map
                .get("name")
                .or_else(|| map.get("title"))
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|s| s.len() >= 5);
            let price = map.get("price").and_then(price_from);

            if let (Some(name), Some(price)) = (name, price) {
                if raw.title.is_none() {
                    raw.title = Some(name.to_string());
                }
                if raw.price.is_none() {
                    raw.price = Some(price);
                }
                if raw.image.is_none() {
                    raw.image = image_from(map.get("thumbnail").or_else(|| map.get("picture")));
                }
                return;
            }
            for child in map.values() {
                walk_state(raw, child, depth + 1);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk_state(raw, item, depth + 1);
            }
        }
        _ => {}
    }
}
