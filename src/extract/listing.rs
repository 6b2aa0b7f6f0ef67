//! Listing traversal
//!
//! A listing page yields product links plus the pagination links that lead
//! to more of the same listing. The handler only emits requests; queueing
//! and deduplication belong to the crawler.

use crate::extract::selectors::SELECTORS;
use crate::extract::Document;
use crate::state::PageKind;
use scraper::{Html, Selector};
use url::Url;

/// A page the crawler should fetch next, and how to handle it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowRequest {
    pub url: Url,
    pub kind: PageKind,
}

impl FollowRequest {
    fn product(url: Url) -> Self {
        Self {
            url,
            kind: PageKind::Product,
        }
    }

    fn listing(url: Url) -> Self {
        Self {
            url,
            kind: PageKind::Listing,
        }
    }
}

/// Emits the follow requests of one listing page
///
/// # Traversal Rules
///
/// 1. Every product link (`a.title`) becomes a product request
/// 2. A "next page" control with a non-empty href is present; it becomes the
///    only listing request, or none at all when its href does not resolve
/// 3. Otherwise every numbered pagination link becomes a listing request
///
/// Links are resolved against the document URL; links that do not resolve
/// to HTTP(S) are skipped. A page with nothing to follow returns an empty
/// vector.
///
/// # Example
///
/// ```
/// use catalog_harvest::extract::{handle_listing_page, Document};
/// use catalog_harvest::PageKind;
/// use url::Url;
///
/// let body = r#"<a class="title" href="/p/1">Soap</a>
///               <a class="pagination-next" href="?page=2">Next</a>"#;
/// let url = Url::parse("https://shop.example.com/catalog/soap").unwrap();
/// let requests = handle_listing_page(&Document::parse(body, url).unwrap());
///
/// assert_eq!(requests.len(), 2);
/// assert_eq!(requests[0].kind, PageKind::Product);
/// assert_eq!(requests[1].url.as_str(), "https://shop.example.com/catalog/soap?page=2");
/// ```
pub fn handle_listing_page(document: &Document) -> Vec<FollowRequest> {
    let html = document.html();
    let base_url = document.url();

    let mut requests: Vec<FollowRequest> = resolved_links(html, &SELECTORS.product_link, base_url)
        .map(FollowRequest::product)
        .collect();

    // A next-page control with any href counts as present, even a disabled
    // one; numbered links are then never scanned.
    let next_page = html
        .select(&SELECTORS.next_page)
        .filter_map(|element| element.value().attr("href"))
        .find(|href| !href.trim().is_empty());

    match next_page {
        Some(href) => {
            requests.extend(resolve_link(href, base_url).map(FollowRequest::listing));
        }
        None => {
            requests.extend(
                resolved_links(html, &SELECTORS.page_number, base_url)
                    .map(FollowRequest::listing),
            );
        }
    }

    requests
}

fn resolved_links<'a>(
    html: &'a Html,
    selector: &'a Selector,
    base_url: &'a Url,
) -> impl Iterator<Item = Url> + 'a {
    html.select(selector)
        .filter_map(|element| element.value().attr("href"))
        .filter_map(move |href| resolve_link(href, base_url))
}

/// Resolves a link href to an absolute URL and validates it
///
/// Returns None if the link should be excluded:
/// - javascript:, mailto:, tel: schemes
/// - data: URIs
/// - Fragment-only links
/// - Invalid URLs
/// - Non-HTTP(S) URLs after resolution
fn resolve_link(href: &str, base_url: &Url) -> Option<Url> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lowered = href.to_ascii_lowercase();
    if ["javascript:", "mailto:", "tel:", "data:"]
        .iter()
        .any(|scheme| lowered.starts_with(scheme))
    {
        return None;
    }

    let absolute_url = base_url.join(href).ok()?;
    match absolute_url.scheme() {
        "http" | "https" => Some(absolute_url),
        _ => None,
    }
}
