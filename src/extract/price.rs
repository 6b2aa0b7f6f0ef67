//! Price resolution
//!
//! A product page carries its listed price in a `meta[itemprop=price]` tag.
//! A promotional price, when there is one, only appears inside the inline
//! state script as `price:"<number>"`. This module combines the two.

use crate::extract::selectors::SELECTORS;
use regex::Regex;
use scraper::Html;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static PROMO_PRICE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"price:"([^"]+)""#).expect("hardcoded regex pattern is valid"));

/// Marker the shop's state script uses around promotional prices
const PROMO_SCRIPT_MARKER: &str = "specialPrice";

/// Resolved price of a product
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    /// What the customer pays now
    pub current: Option<f64>,
    /// The listed (pre-discount) price
    pub original: Option<f64>,
    /// e.g. "Discount 25.13%", present only for a real discount
    pub discount_label: Option<String>,
}

/// Resolves the price of a product page
///
/// # Algorithm
///
/// 1. Promotional price: `price:"…"` in `script`, parsed as `f64`
/// 2. Original price: `content` of the listed-price meta tag, parsed as `f64`
/// 3. `current` is the promotional price if present, else the original
/// 4. A discount label is produced only when `original > promotional`
///
/// A value that does not parse is treated as absent, for that price only.
///
/// # Arguments
///
/// * `html` - The product page
/// * `script` - Inline script text that may hold the promotional price
/// * `discount_prefix` - Word placed before the percentage in the label
pub fn resolve_price(html: &Html, script: Option<&str>, discount_prefix: &str) -> Price {
    let promotional = script.and_then(parse_promotional_price);
    let original = parse_listed_price(html);

    let discount_label = match (original, promotional) {
        (Some(original), Some(promotional)) => discount_percent(original, promotional)
            .map(|percent| format_discount_label(discount_prefix, percent)),
        _ => None,
    };

    Price {
        current: promotional.or(original),
        original,
        discount_label,
    }
}

/// Finds the inline script that may carry a promotional price
///
/// Only the script mentioning `specialPrice` is considered. Other scripts
/// (analytics, related items) may contain `price:"…"` too and are ignored.
pub fn promotional_script(html: &Html) -> Option<String> {
    html.select(&SELECTORS.script)
        .map(|script| script.text().collect::<String>())
        .find(|text| text.contains(PROMO_SCRIPT_MARKER))
}

/// Parses the first `price:"…"` expression of a script blob
///
/// Non-numeric, non-finite and non-positive values count as no promotion.
pub fn parse_promotional_price(script: &str) -> Option<f64> {
    let captures = PROMO_PRICE_REGEX.captures(script)?;
    parse_amount(captures.get(1)?.as_str()).filter(|price| *price > 0.0)
}

/// Reads the listed price from the price meta tag
pub fn parse_listed_price(html: &Html) -> Option<f64> {
    html.select(&SELECTORS.listed_price)
        .next()
        .and_then(|meta| meta.value().attr("content"))
        .and_then(parse_amount)
}

/// Percentage saved, or None unless `original > promotional`
pub fn discount_percent(original: f64, promotional: f64) -> Option<f64> {
    if original > promotional && original > 0.0 {
        Some((original - promotional) / original * 100.0)
    } else {
        None
    }
}

/// Formats a discount as `"<prefix> NN.NN%"`
pub fn format_discount_label(prefix: &str, percent: f64) -> String {
    format!("{} {:.2}%", prefix, percent)
}

fn parse_amount(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
}
