//! Product page handler
//!
//! Assembles a [`ProductRecord`] from one product page by running every field
//! extractor and the price resolver in a fixed order.

use crate::config::LocaleConfig;
use crate::extract::fields::{
    extract_assets, extract_brand, extract_marketing_tags, extract_metadata, extract_rpc,
    extract_section, extract_stock, extract_title, extract_variants,
};
use crate::extract::price::{promotional_script, resolve_price, Price};
use crate::extract::{Document, ExtractResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::Url;

/// Metadata key holding the free-text description
pub const DESCRIPTION_KEY: &str = "__description";

/// Stock information
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stock {
    pub in_stock: bool,
    /// Always 0, the shop does not publish quantities
    pub count: u32,
}

/// Images and video of a product
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assets {
    /// Main image, or the locale's placeholder when the page has none
    pub main_image: String,
    pub gallery_images: Vec<String>,
    pub zoom_images: Vec<String>,
    /// Zero or one embedded player URL
    pub video_links: Vec<String>,
}

/// The structured record produced for every product page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductRecord {
    /// Capture time (Unix seconds)
    pub timestamp: i64,
    pub rpc: String,
    /// Final URL of the product page
    pub url: String,
    pub title: String,
    pub brand: String,
    pub marketing_tags: Vec<String>,
    /// Breadcrumb trail, root first
    pub section: Vec<String>,
    pub price: Price,
    pub stock: Stock,
    pub assets: Assets,
    pub metadata: BTreeMap<String, String>,
    pub variant_count: u32,
}

impl ProductRecord {
    /// The free-text description, if the page had one
    pub fn description(&self) -> &str {
        self.metadata
            .get(DESCRIPTION_KEY)
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Whether the record carries a discount
    pub fn is_discounted(&self) -> bool {
        self.price.discount_label.is_some()
    }
}

/// Presentation settings used while building records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Word placed before the percentage of a discount label
    pub discount_prefix: String,
    /// Main image placeholder
    pub missing_image: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self::from(&LocaleConfig::default())
    }
}

impl From<&LocaleConfig> for ExtractOptions {
    fn from(locale: &LocaleConfig) -> Self {
        Self {
            discount_prefix: locale.discount_prefix.clone(),
            missing_image: locale.missing_image.clone(),
        }
    }
}

/// Builds the record for one product page
///
/// The capture timestamp is taken when this function runs. Missing elements
/// never fail: every field falls back to its default.
///
/// # Arguments
///
/// * `document` - The parsed product page and the URL it was served from
/// * `options` - Locale-dependent presentation settings
pub fn handle_product_page(document: &Document, options: &ExtractOptions) -> ProductRecord {
    build_record(document, options, chrono::Utc::now().timestamp())
}

/// Parses a response body and builds its record
///
/// # Returns
///
/// * `Ok(ProductRecord)` - Exactly one record for the page
/// * `Err(ExtractError::Unparseable)` - The body is not a document
pub fn extract_product(
    body: &str,
    url: Url,
    options: &ExtractOptions,
) -> ExtractResult<ProductRecord> {
    let document = Document::parse(body, url)?;
    Ok(handle_product_page(&document, options))
}

fn build_record(document: &Document, options: &ExtractOptions, timestamp: i64) -> ProductRecord {
    let html = document.html();
    let script = promotional_script(html);

    ProductRecord {
        timestamp,
        rpc: extract_rpc(html),
        url: document.url().to_string(),
        title: extract_title(html),
        brand: extract_brand(html),
        marketing_tags: extract_marketing_tags(html),
        section: extract_section(html),
        price: resolve_price(html, script.as_deref(), &options.discount_prefix),
        stock: extract_stock(html),
        assets: extract_assets(html, &options.missing_image),
        metadata: extract_metadata(html),
        variant_count: extract_variants(html),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::ExtractError;

    const PRODUCT_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <script>window.analytics = {page:"product"};</script>
  <script>window.__NUXT__={product:{id:1},specialPrice:{price:"149.00",till:"2024-12-31"}}</script>
</head>
<body>
  <div class="breadcrumbs">
    <span>Main</span>
    <span>  </span>
    <span>Cosmetics</span>
    <span>Hair care</span>
  </div>
  <h1 class="title">Shampoo Fresh</h1>
  <span class="color"><span>Green</span></span>
  <span class="volume"><span>400 ml</span></span>
  <p class="special-auth">Hit</p>
  <div class="product-images">
    <img class="normal" src="https://img.example.com/main.jpg">
    <link itemprop="contentUrl" href="https://img.example.com/g1.jpg">
    <link itemprop="contentUrl" href="https://img.example.com/g2.jpg">
    <img class="zoom" src="https://img.example.com/z1.jpg">
    <iframe id="rt-player" src="https://video.example.com/embed/1"></iframe>
  </div>
  <img class="thumbs-image" src="/t1.jpg">
  <img class="thumbs-image" src="/t2.jpg">
  <img class="thumbs-image" src="/t3.jpg">
  <div class="price-quantity-block"><div><meta itemprop="price" content="199.00"></div></div>
  <meta itemprop="availability" content="https://schema.org/InStock">
  <div class="product-details"><div class="description"> Gentle daily shampoo. </div></div>
  <div class="properties">
    <p class="property"><span class="title">Brand</span><span class="value"><a href="/brand/fresh">Fresh Line</a></span></p>
    <p class="property"><span class="title">Code</span><span class="value">5000153</span></p>
    <p class="property"><span class="title">Country</span><span class="value">Russia</span></p>
  </div>
</body>
</html>"#;

    fn product_url() -> Url {
        Url::parse("https://shop.example.com/catalog/hair/p-5000153-shampoo").unwrap()
    }

    fn record(body: &str) -> ProductRecord {
        let document = Document::parse(body, product_url()).unwrap();
        build_record(&document, &ExtractOptions::default(), 1_700_000_000)
    }

    #[test]
    fn test_full_record() {
        let record = record(PRODUCT_PAGE);

        assert_eq!(record.timestamp, 1_700_000_000);
        assert_eq!(record.rpc, "5000153");
        assert_eq!(
            record.url,
            "https://shop.example.com/catalog/hair/p-5000153-shampoo"
        );
        assert_eq!(record.title, "Shampoo Fresh, Green, 400 ml");
        assert_eq!(record.brand, "Fresh Line");
        assert_eq!(record.marketing_tags, vec!["Hit"]);
        assert_eq!(record.section, vec!["Main", "Cosmetics", "Hair care"]);

        assert_eq!(record.price.current, Some(149.0));
        assert_eq!(record.price.original, Some(199.0));
        assert_eq!(
            record.price.discount_label.as_deref(),
            Some("Discount 25.13%")
        );
        assert!(record.is_discounted());

        assert!(record.stock.in_stock);
        assert_eq!(record.stock.count, 0);

        assert_eq!(record.assets.main_image, "https://img.example.com/main.jpg");
        assert_eq!(record.assets.gallery_images.len(), 2);
        assert_eq!(record.assets.zoom_images, vec!["https://img.example.com/z1.jpg"]);
        assert_eq!(
            record.assets.video_links,
            vec!["https://video.example.com/embed/1"]
        );

        assert_eq!(record.description(), "Gentle daily shampoo.");
        assert_eq!(record.metadata.get("Country").map(String::as_str), Some("Russia"));
        assert_eq!(record.metadata.get("Code").map(String::as_str), Some("5000153"));
        assert_eq!(record.variant_count, 3);
    }

    #[test]
    fn test_bare_page_gets_defaults() {
        let record = record("<html><body><h1 class=\"title\">Sponge</h1></body></html>");

        assert_eq!(record.rpc, "");
        assert_eq!(record.title, "Sponge");
        assert_eq!(record.brand, "");
        assert!(record.marketing_tags.is_empty());
        assert!(record.section.is_empty());
        assert_eq!(record.price.current, None);
        assert_eq!(record.price.original, None);
        assert!(!record.stock.in_stock);
        assert_eq!(record.assets.main_image, "No image");
        assert!(record.assets.video_links.is_empty());
        assert_eq!(record.description(), "");
        assert_eq!(record.variant_count, 1);
    }

    #[test]
    fn test_custom_locale() {
        let document = Document::parse(PRODUCT_PAGE, product_url()).unwrap();
        let options = ExtractOptions {
            discount_prefix: "Скидка".to_string(),
            missing_image: "Нет изображения".to_string(),
        };
        let record = handle_product_page(&document, &options);
        assert_eq!(record.price.discount_label.as_deref(), Some("Скидка 25.13%"));
        assert!(record.timestamp > 0);
    }

    #[test]
    fn test_extract_product_rejects_empty_body() {
        let result = extract_product("", product_url(), &ExtractOptions::default());
        assert!(matches!(result, Err(ExtractError::Unparseable { .. })));
    }

    #[test]
    fn test_record_serializes_with_stable_field_names() {
        let record = record(PRODUCT_PAGE);
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["price"]["current"], 149.0);
        assert_eq!(json["stock"]["count"], 0);
        assert_eq!(json["metadata"]["__description"], "Gentle daily shampoo.");
        assert_eq!(json["variant_count"], 3);

        let back: ProductRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }
}
