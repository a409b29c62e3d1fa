//! Normalization of raw extracted fields into canonical product records
//!
//! Pure and deterministic: no I/O, no clock reads beyond the timestamp the
//! extractor already stamped. Ambiguous input degrades to `None` rather than
//! a guess.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use super::product::{FreeShipping, ParseStatus, ProductSnapshot, RawPrice, RawProduct};

/// Plausibility bounds and heuristics knobs.
///
/// The bounds drop out-of-band values to `None`; they never fail an item.
#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    pub min_price: f64,
    pub max_price: f64,
    pub min_installment_value: f64,
    pub max_installment_value: f64,
    /// Advisory floor for the listing-vs-detail installment agreement score.
    pub installment_precision_floor: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            min_price: 1.0,
            max_price: 1_000_000.0,
            min_installment_value: 1.0,
            max_installment_value: 10_000.0,
            installment_precision_floor: 99.0,
        }
    }
}

static CURRENCY_SYMBOLS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[R]?\$|€|£|¥").unwrap());
static SHIPPING_AMOUNT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+[.,]\d+").unwrap());
static SHIPPING_CURRENCY_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)R?\$\s*\d+").unwrap());

const FREE_SHIPPING_MARKERS: &[&str] = &[
    "frete grátis",
    "frete gratis",
    "frete gratuito",
    "entrega grátis",
    "entrega gratis",
    "entrega gratuita",
    "envio grátis",
    "envio gratis",
    "envio gratuito",
    "free shipping",
    "frete zero",
    "sem frete",
    "sem custo de envio",
];

const PAID_SHIPPING_MARKERS: &[&str] = &[
    "frete a partir de",
    "frete de",
    "custo de envio",
    "taxa de entrega",
    "valor do frete",
    "calcular frete",
    "consulte o frete",
];

/// Converts a `RawProduct` into the canonical `ProductSnapshot`.
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn normalize(&self, raw: RawProduct) -> ProductSnapshot {
        let price = raw.price.as_ref().and_then(|p| self.normalize_price(p));
        let previous_price = raw
            .previous_price
            .filter(|p| self.price_in_bounds(*p));

        let (discount_value, discount_percent) =
            resolve_discount(price, previous_price, raw.discount_percent);

        let (installment_count, installment_value, installment_total) = self
            .resolve_installments(
                raw.installment_count,
                raw.installment_value,
                raw.installment_total,
                price,
            );

        let free_shipping = interpret_shipping(raw.shipping_text.as_deref());

        let mut snapshot = ProductSnapshot {
            platform: raw.platform,
            title: raw.title,
            price,
            currency: normalize_currency(raw.currency.as_deref()),
            image: raw.image,
            free_shipping,
            shipping_text: raw.shipping_text,
            previous_price,
            discount_percent,
            discount_value,
            installment_count,
            installment_value,
            installment_total,
            interest_free: raw.interest_free,
            installment_precision: None,
            rating: raw.rating,
            review_count: raw.review_count,
            official_store: raw.official_store,
            source_url: raw.source_url,
            collected_at: raw.collected_at.unwrap_or_else(Utc::now),
            parse_status: ParseStatus::Ok,
            missing_fields: Vec::new(),
        };

        let (status, missing) = determine_status(&snapshot);
        snapshot.parse_status = status;
        snapshot.missing_fields = missing;
        snapshot
    }

    fn normalize_price(&self, raw: &RawPrice) -> Option<f64> {
        let value = match raw {
            RawPrice::Number(n) => Some(*n),
            RawPrice::Text(text) => parse_price_text(text),
        }?;
        self.price_in_bounds(value).then_some(value)
    }

    fn price_in_bounds(&self, value: f64) -> bool {
        value.is_finite() && value >= self.config.min_price && value <= self.config.max_price
    }

    /// Per-installment value priority: explicit extracted value, then
    /// financed-total divided by count, then at-sight price divided by count.
    fn resolve_installments(
        &self,
        count: Option<u32>,
        explicit: Option<f64>,
        total: Option<f64>,
        price: Option<f64>,
    ) -> (Option<u32>, Option<f64>, Option<f64>) {
        let count = match count.filter(|c| (1..=48).contains(c)) {
            Some(c) => c,
            None => return (None, None, None),
        };

        let value = explicit
            .filter(|v| self.installment_in_band(*v))
            .or_else(|| {
                total
                    .map(|t| round2(t / count as f64))
                    .filter(|v| self.installment_in_band(*v))
            })
            .or_else(|| {
                price
                    .map(|p| round2(p / count as f64))
                    .filter(|v| self.installment_in_band(*v))
            });

        match value {
            Some(v) => {
                let total = total
                    .filter(|t| self.price_in_bounds(*t))
                    .unwrap_or_else(|| round2(count as f64 * v));
                (Some(count), Some(v), Some(total))
            }
            None => (Some(count), None, None),
        }
    }

    fn installment_in_band(&self, value: f64) -> bool {
        value.is_finite()
            && value >= self.config.min_installment_value
            && value <= self.config.max_installment_value
    }

    /// Agreement score (0-100%) between the installment value seen on a
    /// listing and the one on the product detail page. Advisory; callers
    /// compare it against `installment_precision_floor` for display only.
    pub fn installment_precision(&self, listing: f64, detail: f64) -> f64 {
        let reference = listing.max(detail).max(0.01);
        let deviation = ((detail - listing).abs() / reference) * 100.0;
        round2((100.0 - deviation).max(0.0))
    }

    pub fn precision_floor(&self) -> f64 {
        self.config.installment_precision_floor
    }
}

/// Parses Brazilian-format price text: `"R$ 1.234,56"` -> `1234.56`.
///
/// Decimal-separator heuristics: with both separators the dot is thousands
/// and the comma decimal; a lone comma followed by at most two digits is a
/// decimal mark, otherwise a thousands separator. Unparseable text yields
/// `None`, never a guess.
pub fn parse_price_text(text: &str) -> Option<f64> {
    let cleaned = CURRENCY_SYMBOLS.replace_all(text.trim(), "");
    let cleaned: String = cleaned.chars().filter(|c| !c.is_whitespace()).collect();
    if cleaned.is_empty() || !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    if cleaned
        .chars()
        .any(|c| !c.is_ascii_digit() && c != '.' && c != ',')
    {
        return None;
    }

    let has_comma = cleaned.contains(',');
    let has_dot = cleaned.contains('.');

    let num = if has_comma && has_dot {
        cleaned.replace('.', "").replace(',', ".")
    } else if has_comma {
        let parts: Vec<&str> = cleaned.split(',').collect();
        if parts.len() == 2 && parts[1].len() <= 2 {
            cleaned.replace(',', ".")
        } else {
            cleaned.replace(',', "")
        }
    } else {
        cleaned
    };

    num.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0)
}

/// Maps currency symbols/names to ISO-4217, defaulting to BRL.
pub fn normalize_currency(hint: Option<&str>) -> String {
    let hint = match hint {
        Some(h) if !h.trim().is_empty() => h.trim().to_uppercase(),
        _ => return "BRL".to_string(),
    };
    match hint.as_str() {
        "R$" | "REAL" | "REAIS" | "BRL" => "BRL".to_string(),
        "USD" | "US$" => "USD".to_string(),
        "EUR" | "EUR€" | "€" => "EUR".to_string(),
        "GBP" | "£" => "GBP".to_string(),
        "ARS" => "ARS".to_string(),
        other if other.len() >= 3 && other.chars().all(|c| c.is_ascii_alphabetic()) => {
            other[..3].to_string()
        }
        _ => "BRL".to_string(),
    }
}

/// Tri-state shipping classification from the page's delivery text.
pub fn interpret_shipping(text: Option<&str>) -> FreeShipping {
    let text = match text {
        Some(t) if !t.trim().is_empty() => t,
        _ => return FreeShipping::Unknown,
    };
    let lower = text.to_lowercase();

    if FREE_SHIPPING_MARKERS.iter().any(|kw| lower.contains(kw)) {
        return FreeShipping::Free;
    }

    if PAID_SHIPPING_MARKERS.iter().any(|kw| lower.contains(kw))
        && SHIPPING_AMOUNT.is_match(text)
    {
        return FreeShipping::Paid;
    }

    // A shipping cost with a currency amount but no free-marker reads as paid.
    if SHIPPING_CURRENCY_AMOUNT.is_match(text) {
        return FreeShipping::Paid;
    }

    FreeShipping::Unknown
}

fn resolve_discount(
    price: Option<f64>,
    previous: Option<f64>,
    extracted_percent: Option<f64>,
) -> (Option<f64>, Option<f64>) {
    match (price, previous) {
        (Some(now), Some(before)) if before > now => {
            let value = round2(before - now);
            let percent =
                extracted_percent.unwrap_or_else(|| (value / before * 100.0 * 10.0).round() / 10.0);
            (Some(value), Some(percent))
        }
        _ => (None, extracted_percent),
    }
}

/// Essential fields: title, price, source URL. Important but non-essential:
/// image and shipping information. Missing essentials or importants demote
/// the status to `Partial`.
fn determine_status(snapshot: &ProductSnapshot) -> (ParseStatus, Vec<String>) {
    let mut missing = Vec::new();

    if snapshot.title.as_deref().map(str::trim).unwrap_or("").is_empty() {
        missing.push("Título".to_string());
    }
    if snapshot.price.is_none() {
        missing.push("Preço".to_string());
    }
    if snapshot.source_url.is_empty() {
        missing.push("URL do produto".to_string());
    }

    if !missing.is_empty() {
        return (ParseStatus::Partial, missing);
    }

    if snapshot.image.is_none() {
        missing.push("Imagem".to_string());
    }
    if snapshot.free_shipping == FreeShipping::Unknown {
        missing.push("Informação de frete".to_string());
    }

    if missing.is_empty() {
        (ParseStatus::Ok, missing)
    } else {
        (ParseStatus::Partial, missing)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("R$ 1.234,56", Some(1234.56))]
    #[case("R$68,34", Some(68.34))]
    #[case("68.34", Some(68.34))]
    #[case("1.299", Some(1.299))] // dot-only input parses as written
    #[case("2,499", Some(2499.0))] // comma followed by 3 digits is thousands
    #[case("R$ 12", Some(12.0))]
    #[case("€ 99,90", Some(99.9))]
    #[case("", None)]
    #[case("grátis", None)]
    #[case("12x de R$ 10", None)] // mixed text is ambiguous, not a price
    fn price_text_parsing(#[case] input: &str, #[case] expected: Option<f64>) {
        let parsed = parse_price_text(input);
        match (parsed, expected) {
            (Some(got), Some(want)) => assert!((got - want).abs() < 1e-9, "{input}: {got}"),
            (None, None) => {}
            other => panic!("{input}: unexpected {other:?}"),
        }
    }

    #[rstest]
    #[case(None, "BRL")]
    #[case(Some("R$"), "BRL")]
    #[case(Some("reais"), "BRL")]
    #[case(Some("usd"), "USD")]
    #[case(Some("EUR€"), "EUR")]
    #[case(Some("ARS"), "ARS")]
    #[case(Some("???"), "BRL")]
    fn currency_mapping(#[case] hint: Option<&str>, #[case] expected: &str) {
        assert_eq!(normalize_currency(hint), expected);
    }

    #[rstest]
    #[case(None, FreeShipping::Unknown)]
    #[case(Some("Frete grátis para todo o Brasil"), FreeShipping::Free)]
    #[case(Some("Free shipping"), FreeShipping::Free)]
    #[case(Some("Frete a partir de R$ 12,90"), FreeShipping::Paid)]
    #[case(Some("Entrega: R$ 25"), FreeShipping::Paid)]
    #[case(Some("Chega amanhã"), FreeShipping::Unknown)]
    fn shipping_interpretation(#[case] text: Option<&str>, #[case] expected: FreeShipping) {
        assert_eq!(interpret_shipping(text), expected);
    }

    #[test]
    fn normalizes_brazilian_price_text_to_brl() {
        let mut raw = RawProduct::new("example.com", "https://example.com/p/1");
        raw.title = Some("Produto".to_string());
        raw.price = Some(RawPrice::Text("R$ 1.234,56".to_string()));

        let snapshot = Normalizer::default().normalize(raw);
        assert_eq!(snapshot.price, Some(1234.56));
        assert_eq!(snapshot.currency, "BRL");
    }

    #[test]
    fn unparseable_price_becomes_none_not_a_crash() {
        let mut raw = RawProduct::new("example.com", "https://example.com/p/1");
        raw.title = Some("Produto".to_string());
        raw.price = Some(RawPrice::Text("consulte o vendedor".to_string()));

        let snapshot = Normalizer::default().normalize(raw);
        assert_eq!(snapshot.price, None);
        assert_eq!(snapshot.parse_status, ParseStatus::Partial);
        assert!(snapshot.missing_fields.contains(&"Preço".to_string()));
    }

    #[test]
    fn out_of_bounds_price_is_dropped() {
        let mut raw = RawProduct::new("example.com", "https://example.com/p/1");
        raw.price = Some(RawPrice::Number(5_000_000.0));
        let snapshot = Normalizer::default().normalize(raw);
        assert_eq!(snapshot.price, None);
    }

    #[test]
    fn installment_value_priority_explicit_over_derived() {
        let normalizer = Normalizer::default();
        let (count, value, total) =
            normalizer.resolve_installments(Some(12), Some(108.25), Some(1200.0), Some(1100.0));
        assert_eq!(count, Some(12));
        assert_eq!(value, Some(108.25));
        assert_eq!(total, Some(1200.0));
    }

    #[test]
    fn installment_value_falls_back_to_total_then_price() {
        let normalizer = Normalizer::default();

        let (_, value, total) =
            normalizer.resolve_installments(Some(10), None, Some(1500.0), Some(1400.0));
        assert_eq!(value, Some(150.0));
        assert_eq!(total, Some(1500.0));

        let (_, value, total) = normalizer.resolve_installments(Some(10), None, None, Some(1400.0));
        assert_eq!(value, Some(140.0));
        assert_eq!(total, Some(1400.0));
    }

    #[test]
    fn implausible_installment_value_is_rejected() {
        let normalizer = Normalizer::default();
        let (count, value, _) =
            normalizer.resolve_installments(Some(12), Some(55_000.0), None, None);
        assert_eq!(count, Some(12));
        assert_eq!(value, None);
    }

    #[test]
    fn discount_derived_from_previous_price() {
        let mut raw = RawProduct::new("example.com", "https://example.com/p/1");
        raw.title = Some("Produto".to_string());
        raw.price = Some(RawPrice::Number(80.0));
        raw.previous_price = Some(100.0);

        let snapshot = Normalizer::default().normalize(raw);
        assert_eq!(snapshot.discount_value, Some(20.0));
        assert_eq!(snapshot.discount_percent, Some(20.0));
    }

    #[test]
    fn precision_score_reflects_listing_detail_agreement() {
        let normalizer = Normalizer::default();
        assert_eq!(normalizer.installment_precision(100.0, 100.0), 100.0);
        let score = normalizer.installment_precision(100.0, 90.0);
        assert!(score < normalizer.precision_floor());
    }
}
