//! Query expansion: turn a free-text search into marketplace listing URLs,
//! then pull product links out of the listing pages.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::infrastructure::extraction::Platform;

static AMAZON_ASIN: Lazy<Regex> = Lazy::new(|| Regex::new(r"/dp/([A-Z0-9]{10})").unwrap());

const ML_LINK_SELECTORS: &[&str] = &[
    "li.ui-search-layout__item a.ui-search-link",
    "a.ui-search-item__group__element.ui-search-link",
    "div.ui-search-result__wrapper a.ui-search-link",
    "h2.ui-search-item__title a",
];

const AMAZON_LINK_SELECTORS: &[&str] = &[
    "div.s-result-item[data-asin] h2 a",
    "div.s-result-item a.a-link-normal.s-no-outline",
];

/// Listing-page URL for a query on each supported marketplace.
pub fn search_urls(query: &str) -> Vec<(Platform, String)> {
    let slug = query
        .trim()
        .to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-");

    let ml = format!("https://lista.mercadolivre.com.br/{slug}");

    // Url handles the percent-encoding of the k parameter.
    let amazon = Url::parse_with_params("https://www.amazon.com.br/s", &[("k", query.trim())])
        .map(|u| u.to_string())
        .unwrap_or_else(|_| format!("https://www.amazon.com.br/s?k={slug}"));

    vec![(Platform::MercadoLivre, ml), (Platform::Amazon, amazon)]
}

/// Product links from a listing page, in page order, deduplicated and capped.
pub fn extract_listing_links(platform: Platform, body: &str, max: usize) -> Vec<String> {
    let document = Html::parse_document(body);
    let selectors = match platform {
        Platform::MercadoLivre => ML_LINK_SELECTORS,
        Platform::Amazon => AMAZON_LINK_SELECTORS,
        Platform::Generic => return Vec::new(),
    };

    let mut links: Vec<String> = Vec::new();
    for selector in selectors {
        let Ok(parsed) = Selector::parse(selector) else {
            continue;
        };
        for element in document.select(&parsed) {
            let Some(href) = element.value().attr("href") else {
                continue;
            };
            let Some(link) = canonicalize_link(platform, href) else {
                continue;
            };
            if !links.contains(&link) {
                links.push(link);
            }
            if links.len() >= max {
                return links;
            }
        }
    }
    links
}

/// Strips tracking query and fragment; Amazon links collapse to their ASIN
/// detail page.
fn canonicalize_link(platform: Platform, href: &str) -> Option<String> {
    match platform {
        Platform::Amazon => {
            let asin = AMAZON_ASIN.captures(href)?;
            Some(format!("https://www.amazon.com.br/dp/{}", &asin[1]))
        }
        Platform::MercadoLivre => {
            if !href.starts_with("http") || !href.contains("mercadoli") {
                return None;
            }
            let bare = href.split(['?', '#']).next().unwrap_or(href);
            Some(bare.to_string())
        }
        Platform::Generic => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_listing_url_per_marketplace() {
        let urls = search_urls("Mouse Gamer RGB");
        assert_eq!(urls.len(), 2);
        assert_eq!(
            urls[0],
            (
                Platform::MercadoLivre,
                "https://lista.mercadolivre.com.br/mouse-gamer-rgb".to_string()
            )
        );
        assert_eq!(urls[1].0, Platform::Amazon);
        assert!(urls[1].1.starts_with("https://www.amazon.com.br/s?k=Mouse"));
        assert!(urls[1].1.contains("Mouse%20Gamer%20RGB") || urls[1].1.contains("Mouse+Gamer+RGB"));
    }

    #[test]
    fn mercado_livre_links_are_stripped_and_deduped() {
        let body = r#"
            <ol>
              <li class="ui-search-layout__item">
                <a class="ui-search-link" href="https://produto.mercadolivre.com.br/MLB-111?searchVariation=a#tracking">Um</a>
              </li>
              <li class="ui-search-layout__item">
                <a class="ui-search-link" href="https://produto.mercadolivre.com.br/MLB-111?other=b">Duplicado</a>
              </li>
              <li class="ui-search-layout__item">
                <a class="ui-search-link" href="https://produto.mercadolivre.com.br/MLB-222">Dois</a>
              </li>
              <li class="ui-search-layout__item">
                <a class="ui-search-link" href="/relative/ignored">Ruim</a>
              </li>
            </ol>"#;
        let links = extract_listing_links(Platform::MercadoLivre, body, 20);
        assert_eq!(
            links,
            vec![
                "https://produto.mercadolivre.com.br/MLB-111".to_string(),
                "https://produto.mercadolivre.com.br/MLB-222".to_string(),
            ]
        );
    }

    #[test]
    fn amazon_links_collapse_to_asin() {
        let body = r#"
            <div class="s-result-item" data-asin="B0AAAAAAA1">
              <h2><a href="/Echo-Dot/dp/B0AAAAAAA1/ref=sr_1_1?keywords=echo">Echo</a></h2>
            </div>
            <div class="s-result-item" data-asin="B0BBBBBBB2">
              <h2><a href="/dp/B0BBBBBBB2/ref=sr_1_2">Outro</a></h2>
            </div>
            <div class="s-result-item" data-asin="">
              <h2><a href="/gp/slredirect/something">Patrocinado</a></h2>
            </div>"#;
        let links = extract_listing_links(Platform::Amazon, body, 20);
        assert_eq!(
            links,
            vec![
                "https://www.amazon.com.br/dp/B0AAAAAAA1".to_string(),
                "https://www.amazon.com.br/dp/B0BBBBBBB2".to_string(),
            ]
        );
    }

    #[test]
    fn result_cap_is_enforced() {
        let items: String = (0..30)
            .map(|i| {
                format!(
                    r#"<li class="ui-search-layout__item">
                       <a class="ui-search-link" href="https://produto.mercadolivre.com.br/MLB-{i}">x</a>
                       </li>"#
                )
            })
            .collect();
        let links = extract_listing_links(Platform::MercadoLivre, &items, 10);
        assert_eq!(links.len(), 10);
    }
}
