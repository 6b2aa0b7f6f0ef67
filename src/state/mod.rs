//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `PageState`: Tracks the state of individual pages (discovered, queued, fetching, processed, etc.)
//! - `PageKind`: Whether a page is a listing or a product page
//! - `DomainState`: Tracks per-domain politeness and the robots.txt cache

mod domain_state;
mod page_state;

pub use domain_state::{CachedRobots, DomainState};
pub use page_state::{PageKind, PageState};
