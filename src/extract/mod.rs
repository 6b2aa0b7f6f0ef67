//! Product extraction core
//!
//! Everything in this module is synchronous and free of I/O: it takes one
//! already-fetched page and returns data. The crawler decides what to fetch,
//! this module decides what a page means.
//!
//! - [`handle_listing_page`] turns a category listing into follow requests
//! - [`handle_product_page`] turns a product page into a [`ProductRecord`]
//! - [`fields`] holds one pure extractor per record field
//! - [`price`] resolves listed and promotional prices into a [`Price`]

pub mod fields;
mod listing;
pub mod price;
mod product;
mod selectors;

pub use listing::{handle_listing_page, FollowRequest};
pub use price::{resolve_price, Price};
pub use product::{
    extract_product, handle_product_page, Assets, ExtractOptions, ProductRecord, Stock,
    DESCRIPTION_KEY,
};

use scraper::Html;
use thiserror::Error;
use url::Url;

/// Errors raised by the extraction core
///
/// Missing elements and malformed numbers are never errors; they resolve to
/// the field's default. Only a body that is not a document at all is.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("Unparseable document at {url}: {reason}")]
    Unparseable { url: String, reason: String },
}

/// Result type for extraction operations
pub type ExtractResult<T> = Result<T, ExtractError>;

/// A fetched page, parsed, together with the URL it was served from
pub struct Document {
    url: Url,
    html: Html,
}

impl Document {
    /// Parses a response body into a document
    ///
    /// HTML parsing itself is error-tolerant, so the only bodies rejected here
    /// are those that cannot be a document: empty (or whitespace-only) bodies
    /// and bodies carrying NUL bytes, which only binary payloads do.
    ///
    /// # Arguments
    ///
    /// * `body` - The response body
    /// * `url` - The final URL of the response, used to resolve relative links
    ///
    /// # Returns
    ///
    /// * `Ok(Document)` - The parsed document
    /// * `Err(ExtractError::Unparseable)` - The body is not a document
    pub fn parse(body: &str, url: Url) -> ExtractResult<Self> {
        if body.trim().is_empty() {
            return Err(ExtractError::Unparseable {
                url: url.to_string(),
                reason: "empty body".to_string(),
            });
        }

        if body.contains('\0') {
            return Err(ExtractError::Unparseable {
                url: url.to_string(),
                reason: "binary content".to_string(),
            });
        }

        Ok(Self {
            url,
            html: Html::parse_document(body),
        })
    }

    /// The URL this document was served from
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The parsed HTML tree
    pub fn html(&self) -> &Html {
        &self.html
    }
}
