//! URL handling module for Catalog-Harvest
//!
//! This module provides URL normalization, host extraction and the
//! allowed-domain check that keeps the crawl on the shop being harvested.

mod normalize;

pub use normalize::normalize_url;

use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use catalog_harvest::url::extract_domain;
///
/// let url = Url::parse("https://SHOP.example.com:8443/catalog").unwrap();
/// assert_eq!(extract_domain(&url), Some("shop.example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Checks if a domain matches an allowed-domain pattern
///
/// A pattern matches the domain itself and every subdomain of it, so
/// "shop.com" allows "www.shop.com". The "*.shop.com" form is accepted
/// and means the same thing.
///
/// Both sides are expected to be lowercase already.
pub fn matches_domain_pattern(pattern: &str, candidate: &str) -> bool {
    let base = pattern.strip_prefix("*.").unwrap_or(pattern);
    candidate == base
        || candidate
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// Returns true when the domain matches any of the allowed patterns
///
/// # Examples
///
/// ```
/// use catalog_harvest::url::is_allowed_domain;
///
/// let allowed = vec!["*.shop.com".to_string()];
/// assert!(is_allowed_domain("img.shop.com", &allowed));
/// assert!(!is_allowed_domain("tracker.net", &allowed));
/// ```
pub fn is_allowed_domain(domain: &str, allowed: &[String]) -> bool {
    allowed
        .iter()
        .any(|pattern| matches_domain_pattern(pattern, domain))
}

/// Returns true when the URL's host is on the allowed list
pub fn is_allowed_url(url: &Url, allowed: &[String]) -> bool {
    extract_domain(url)
        .map(|domain| is_allowed_domain(&domain, allowed))
        .unwrap_or(false)
}
