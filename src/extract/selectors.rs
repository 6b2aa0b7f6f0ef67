//! CSS selectors for the shop's listing and product markup
//!
//! Compiled once on first use and shared by every extractor.

use scraper::Selector;
use std::sync::LazyLock;

pub(crate) static SELECTORS: LazyLock<Selectors> = LazyLock::new(Selectors::new);

pub(crate) struct Selectors {
    // ===== Listing pages =====
    pub product_link: Selector,
    pub next_page: Selector,
    pub page_number: Selector,

    // ===== Product pages =====
    pub rpc: Selector,
    pub title: Selector,
    pub color: Selector,
    pub volume: Selector,
    pub brand: Selector,
    pub marketing_tag: Selector,
    pub breadcrumb: Selector,
    pub listed_price: Selector,
    pub availability: Selector,
    pub main_image: Selector,
    pub gallery_image: Selector,
    pub zoom_image: Selector,
    pub video: Selector,
    pub description: Selector,
    pub property_row: Selector,
    pub property_label: Selector,
    pub property_value: Selector,
    pub variant_thumb: Selector,
    pub script: Selector,
}

impl Selectors {
    fn new() -> Self {
        Self {
            product_link: compile("a.title[href]"),
            next_page: compile("a.pagination-next[href]"),
            page_number: compile("div.pagination a.number[href]"),

            rpc: compile("span.value"),
            title: compile("h1.title"),
            color: compile("span.color *"),
            volume: compile("span.volume *"),
            brand: compile(".properties p:nth-child(1) .value a"),
            marketing_tag: compile("p.special-auth"),
            breadcrumb: compile("div.breadcrumbs span"),
            listed_price: compile(r#"div.price-quantity-block > div > meta[itemprop="price"]"#),
            availability: compile(r#"meta[itemprop="availability"]"#),
            main_image: compile("div.product-images img.normal[src]"),
            gallery_image: compile(r#"div.product-images link[itemprop="contentUrl"][href]"#),
            zoom_image: compile("div.product-images img.zoom[src]"),
            video: compile("iframe#rt-player[src]"),
            description: compile(".product-details .description"),
            property_row: compile("div.properties p.property"),
            property_label: compile("span.title"),
            property_value: compile("span.value"),
            variant_thumb: compile("img.thumbs-image[src]"),
            script: compile("script"),
        }
    }
}

fn compile(css: &str) -> Selector {
    Selector::parse(css).expect("hardcoded selector is valid")
}
