//! Field extractors
//!
//! One pure function per product field. Every extractor follows the same
//! "first match or default" policy: a missing element yields an empty string,
//! an empty list or `false`, never an error.
//!
//! Text is read from an element's own text nodes (not its descendants), and
//! whitespace-only nodes are skipped, so indentation between tags never turns
//! into a value.

use crate::extract::product::{Assets, Stock, DESCRIPTION_KEY};
use crate::extract::selectors::SELECTORS;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;

/// The availability value that means "in stock"
pub const IN_STOCK: &str = "https://schema.org/InStock";

/// Extracts the site-assigned product code
pub fn extract_rpc(html: &Html) -> String {
    first_own_text(html, &SELECTORS.rpc)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Extracts the display title: base title, then color, then volume
///
/// Empty parts are left out entirely, so a product without color or volume
/// gets its bare title with no trailing comma.
///
/// # Example
///
/// ```
/// use catalog_harvest::extract::fields::extract_title;
/// use scraper::Html;
///
/// let html = Html::parse_document(
///     r#"<h1 class="title"> Shampoo </h1><span class="volume"><b>250 ml</b></span>"#,
/// );
/// assert_eq!(extract_title(&html), "Shampoo, 250 ml");
/// ```
pub fn extract_title(html: &Html) -> String {
    [
        first_own_text(html, &SELECTORS.title),
        first_own_text(html, &SELECTORS.color),
        first_own_text(html, &SELECTORS.volume),
    ]
    .into_iter()
    .flatten()
    .map(str::trim)
    .filter(|part| !part.is_empty())
    .collect::<Vec<_>>()
    .join(", ")
}

/// Extracts the brand from the first row of the properties block
pub fn extract_brand(html: &Html) -> String {
    first_own_text(html, &SELECTORS.brand)
        .map(|text| text.trim().to_string())
        .unwrap_or_default()
}

/// Extracts promotional badges ("special" markers)
pub fn extract_marketing_tags(html: &Html) -> Vec<String> {
    html.select(&SELECTORS.marketing_tag)
        .flat_map(own_text)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts the breadcrumb trail from root to leaf category
///
/// Blank crumbs are dropped, so the result never contains an empty string.
pub fn extract_section(html: &Html) -> Vec<String> {
    html.select(&SELECTORS.breadcrumb)
        .flat_map(own_text)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extracts stock information
///
/// The shop publishes availability only, never a quantity, so `count` is
/// always 0.
pub fn extract_stock(html: &Html) -> Stock {
    let in_stock = first_attr(html, &SELECTORS.availability, "content")
        .map(|value| value.trim() == IN_STOCK)
        .unwrap_or(false);

    Stock { in_stock, count: 0 }
}

/// Extracts images and video
///
/// # Arguments
///
/// * `html` - The product page
/// * `missing_image` - Placeholder used when the page has no main image
pub fn extract_assets(html: &Html, missing_image: &str) -> Assets {
    let main_image = first_attr(html, &SELECTORS.main_image, "src")
        .unwrap_or(missing_image)
        .to_string();

    Assets {
        main_image,
        gallery_images: attr_values(html, &SELECTORS.gallery_image, "href"),
        zoom_images: attr_values(html, &SELECTORS.zoom_image, "src"),
        video_links: first_attr(html, &SELECTORS.video, "src")
            .map(str::to_string)
            .into_iter()
            .collect(),
    }
}

/// Extracts the description and the label/value property rows
///
/// The description is stored under [`DESCRIPTION_KEY`]. A property row is
/// kept only when both its label and its value are non-empty after trimming;
/// a label seen twice keeps the later value.
pub fn extract_metadata(html: &Html) -> BTreeMap<String, String> {
    let mut metadata = BTreeMap::new();

    let description = first_own_text(html, &SELECTORS.description)
        .map(|text| text.trim().to_string())
        .unwrap_or_default();
    metadata.insert(DESCRIPTION_KEY.to_string(), description);

    for row in html.select(&SELECTORS.property_row) {
        let label = first_own_text_in(row, &SELECTORS.property_label).map(str::trim);
        let value = first_own_text_in(row, &SELECTORS.property_value).map(str::trim);

        if let (Some(label), Some(value)) = (label, value) {
            if !label.is_empty() && !value.is_empty() {
                metadata.insert(label.to_string(), value.to_string());
            }
        }
    }

    metadata
}

/// Counts selectable visual variants; a product without thumbnails has one
pub fn extract_variants(html: &Html) -> u32 {
    let count = html.select(&SELECTORS.variant_thumb).count();
    if count == 0 {
        1
    } else {
        u32::try_from(count).unwrap_or(u32::MAX)
    }
}

// ===== Text helpers =====

/// Direct text children of an element, skipping whitespace-only nodes
fn own_text<'a>(element: ElementRef<'a>) -> impl Iterator<Item = &'a str> + 'a {
    element
        .children()
        .filter_map(|node| node.value().as_text())
        .map(|text| &**text)
        .filter(|text| !text.trim().is_empty())
}

fn first_own_text<'a>(html: &'a Html, selector: &Selector) -> Option<&'a str> {
    html.select(selector).flat_map(own_text).next()
}

fn first_own_text_in<'a>(element: ElementRef<'a>, selector: &Selector) -> Option<&'a str> {
    element.select(selector).flat_map(own_text).next()
}

fn first_attr<'a>(html: &'a Html, selector: &Selector, attr: &str) -> Option<&'a str> {
    html.select(selector)
        .find_map(|element| element.value().attr(attr))
}

fn attr_values(html: &Html, selector: &Selector, attr: &str) -> Vec<String> {
    html.select(selector)
        .filter_map(|element| element.value().attr(attr))
        .map(str::to_string)
        .collect()
}
