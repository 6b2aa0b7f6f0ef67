//! Output module for product feeds and crawl reports
//!
//! This module handles:
//! - Product sinks fed by the crawler (JSON Lines feed)
//! - Rebuilding the feed from the database
//! - Markdown summaries and terminal statistics

mod jsonl;
mod markdown;
pub mod stats;
mod traits;

pub use jsonl::{write_feed, JsonLinesSink};
pub use markdown::{format_markdown_summary, generate_markdown_summary};
pub use stats::{load_statistics, print_statistics, CrawlStatistics};
pub use traits::{CrawlSummary, OutputError, OutputResult, ProductSink};

use crate::storage::Storage;
use chrono::{DateTime, Utc};
use std::path::Path;

/// Number of breadcrumb trails listed in the summary
const TOP_SECTIONS: usize = 10;

/// Generates a crawl summary from storage
///
/// # Arguments
///
/// * `storage` - The storage backend containing crawl data
///
/// # Returns
///
/// * `Ok(CrawlSummary)` - Summary of the latest run and all stored products
/// * `Err(OutputError::NoRuns)` - The database has never been crawled into
pub fn generate_summary(storage: &dyn Storage) -> OutputResult<CrawlSummary> {
    let run = storage.get_latest_run()?.ok_or(OutputError::NoRuns)?;

    let duration_seconds = match (
        run.started_at.parse::<DateTime<Utc>>(),
        run.finished_at.as_deref().map(str::parse::<DateTime<Utc>>),
    ) {
        (Ok(started), Some(Ok(finished))) => {
            Some((finished - started).num_seconds().max(0) as u64)
        }
        _ => None,
    };

    let stats = load_statistics(storage)?;
    let top_sections = storage.get_section_breakdown(TOP_SECTIONS)?;

    Ok(CrawlSummary {
        run_id: run.id,
        started_at: run.started_at,
        finished_at: run.finished_at,
        duration_seconds,
        status: run.status.to_db_string().to_string(),
        config_hash: run.config_hash,
        total_pages: stats.total_pages,
        listing_pages: stats.pages_of(crate::state::PageKind::Listing),
        product_pages: stats.pages_of(crate::state::PageKind::Product),
        pages_by_state: stats.pages_by_state,
        error_summary: stats.error_summary,
        total_products: stats.total_products,
        products_in_stock: stats.products_in_stock,
        discounted_products: stats.discounted_products,
        top_sections,
    })
}

/// Rewrites the JSON Lines feed from every stored product
///
/// # Returns
///
/// The number of records written
pub fn export_feed(storage: &dyn Storage, path: &Path) -> OutputResult<u64> {
    let products = storage.load_products()?;
    write_feed(path, &products)
}
