//! CSS selector tables per marketplace.
//!
//! Each field lists selectors in preference order; extraction takes the
//! first that matches. Keeping them in one table per platform makes layout
//! churn a data edit, not a code edit.

use super::Platform;

#[derive(Debug)]
pub struct SelectorSet {
    pub title: &'static [&'static str],
    /// Selectors yielding the full price text in one node.
    pub price_full: &'static [&'static str],
    /// Integer part when the price is split across nodes.
    pub price_whole: &'static [&'static str],
    /// Cents part when the price is split across nodes.
    pub price_cents: &'static [&'static str],
    pub previous_price: &'static [&'static str],
    pub image: &'static [&'static str],
    pub shipping: &'static [&'static str],
    pub installments: &'static [&'static str],
    pub rating: &'static [&'static str],
    pub review_count: &'static [&'static str],
    pub official_store: &'static [&'static str],
}

static MERCADO_LIVRE: SelectorSet = SelectorSet {
    title: &["h1.ui-pdp-title"],
    price_full: &[],
    price_whole: &[
        ".ui-pdp-price__second-line .andes-money-amount__fraction",
        ".ui-pdp-price .andes-money-amount__fraction",
    ],
    price_cents: &[
        ".ui-pdp-price__second-line .andes-money-amount__cents",
        ".ui-pdp-price .andes-money-amount__cents",
    ],
    previous_price: &[
        "s.andes-money-amount--previous .andes-money-amount__fraction",
        ".ui-pdp-price__original-value .andes-money-amount__fraction",
    ],
    image: &[
        "figure.ui-pdp-gallery__figure img.ui-pdp-image",
        ".ui-pdp-gallery img",
    ],
    shipping: &[
        ".ui-pdp-media__title",
        ".ui-pdp-color--GREEN",
        ".ui-pdp-shipping-summary__title",
    ],
    installments: &[
        ".ui-pdp-price__subtitles",
        "#pricing_price_subtitle",
    ],
    rating: &[".ui-pdp-review__rating"],
    review_count: &[".ui-pdp-review__amount"],
    official_store: &[".ui-pdp-seller__header__title", ".ui-vpp-store-info__title"],
};

static AMAZON: SelectorSet = SelectorSet {
    title: &["#productTitle", "#title span"],
    price_full: &[
        "#corePriceDisplay_desktop_feature_div .a-price .a-offscreen",
        "#corePrice_feature_div .a-price .a-offscreen",
        // a-text-price is the struck-through list price, not the offer
        ".a-price:not(.a-text-price) .a-offscreen",
    ],
    price_whole: &[".a-price-whole"],
    price_cents: &[".a-price-fraction"],
    previous_price: &[
        ".basisPrice .a-price.a-text-price .a-offscreen",
        "span.a-price.a-text-price[data-a-strike] .a-offscreen",
    ],
    image: &["#landingImage", "#imgBlkFront", "#main-image"],
    shipping: &[
        "#deliveryBlockMessage",
        "#mir-layout-DELIVERY_BLOCK",
        "#amazonGlobal_feature_div",
    ],
    installments: &[
        "#installmentCalculator_feature_div",
        "#apex_desktop .best-offer-name",
        "#creditPaymentsSummaryDiv",
    ],
    rating: &["#acrPopover .a-icon-alt", "span[data-hook=rating-out-of-text]"],
    review_count: &["#acrCustomerReviewText"],
    official_store: &["#bylineInfo"],
};

static GENERIC: SelectorSet = SelectorSet {
    title: &["h1", "meta[property=\"og:title\"]"],
    price_full: &["[itemprop=price]", ".price", ".product-price"],
    price_whole: &[],
    price_cents: &[],
    previous_price: &[".old-price", "del .price", "s .price"],
    image: &["meta[property=\"og:image\"]", "[itemprop=image]"],
    shipping: &[".shipping", ".frete"],
    installments: &[".installments", ".parcelamento"],
    rating: &["[itemprop=ratingValue]"],
    review_count: &["[itemprop=reviewCount]"],
    official_store: &[],
};

pub fn for_platform(platform: Platform) -> &'static SelectorSet {
    match platform {
        Platform::MercadoLivre => &MERCADO_LIVRE,
        Platform::Amazon => &AMAZON,
        Platform::Generic => &GENERIC,
    }
}
