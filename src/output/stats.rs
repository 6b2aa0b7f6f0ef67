//! Statistics generation from crawl database
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer.

use crate::output::traits::OutputResult;
use crate::state::{PageKind, PageState};
use crate::storage::Storage;
use std::collections::HashMap;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Total number of pages discovered
    pub total_pages: u64,

    /// Count of pages by state
    pub pages_by_state: HashMap<PageState, u64>,

    /// Count of pages by kind
    pub pages_by_kind: HashMap<PageKind, u64>,

    /// Error summary (error states and their counts)
    pub error_summary: HashMap<PageState, u64>,

    /// Products in the database
    pub total_products: u64,

    /// Products currently in stock
    pub products_in_stock: u64,

    /// Products with a discount label
    pub discounted_products: u64,
}

impl CrawlStatistics {
    /// Pages that ended in the given state
    pub fn pages_in(&self, state: PageState) -> u64 {
        self.pages_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Pages of the given kind
    pub fn pages_of(&self, kind: PageKind) -> u64 {
        self.pages_by_kind.get(&kind).copied().unwrap_or(0)
    }
}

/// Loads statistics from storage
///
/// # Arguments
///
/// * `storage` - The storage backend to query
///
/// # Returns
///
/// * `Ok(CrawlStatistics)` - Successfully loaded statistics
/// * `Err(OutputError)` - Failed to query statistics
pub fn load_statistics(storage: &dyn Storage) -> OutputResult<CrawlStatistics> {
    let mut pages_by_state = HashMap::new();
    for state in PageState::all_states() {
        let count = storage.count_pages_by_state(state)?;
        if count > 0 {
            pages_by_state.insert(state, count);
        }
    }

    let mut pages_by_kind = HashMap::new();
    for kind in [PageKind::Listing, PageKind::Product] {
        pages_by_kind.insert(kind, storage.count_pages_by_kind(kind)?);
    }

    Ok(CrawlStatistics {
        total_pages: storage.count_total_pages()?,
        pages_by_state,
        pages_by_kind,
        error_summary: storage.get_error_summary()?,
        total_products: storage.count_products()?,
        products_in_stock: storage.count_products_in_stock()?,
        discounted_products: storage.count_discounted_products()?,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Overview:");
    println!("  Total pages discovered: {}", stats.total_pages);
    println!("  Listing pages: {}", stats.pages_of(PageKind::Listing));
    println!("  Product pages: {}", stats.pages_of(PageKind::Product));
    println!();

    println!("Pages by State:");
    // Sort states by count (descending)
    let mut state_counts: Vec<_> = stats.pages_by_state.iter().collect();
    state_counts.sort_by(|a, b| b.1.cmp(a.1));

    for (state, count) in state_counts {
        let percentage = if stats.total_pages > 0 {
            (*count as f64 / stats.total_pages as f64) * 100.0
        } else {
            0.0
        };
        println!("  {:?}: {} ({:.1}%)", state, count, percentage);
    }
    println!();

    if !stats.error_summary.is_empty() {
        println!("Error Summary:");
        let mut error_counts: Vec<_> = stats.error_summary.iter().collect();
        error_counts.sort_by(|a, b| b.1.cmp(a.1));

        for (state, count) in error_counts {
            println!("  {:?}: {}", state, count);
        }
        println!();
    }

    println!("Products:");
    println!("  Stored: {}", stats.total_products);
    println!("  In stock: {}", stats.products_in_stock);
    println!("  Discounted: {}", stats.discounted_products);
    println!();

    let processed = stats.pages_in(PageState::Processed);
    let success_rate = if stats.total_pages > 0 {
        (processed as f64 / stats.total_pages as f64) * 100.0
    } else {
        0.0
    };

    println!(
        "Success Rate: {:.1}% ({} / {} pages successfully processed)",
        success_rate, processed, stats.total_pages
    );
}
