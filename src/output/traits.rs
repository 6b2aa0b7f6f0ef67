//! Product sink trait and summary types
//!
//! A sink receives every product record the crawler emits. The SQLite
//! `products` table is written by the crawler itself; sinks are the seam for
//! everything else (the JSON Lines feed, test collectors).

use crate::extract::ProductRecord;
use crate::state::PageState;
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::storage::StorageError),

    #[error("No crawl runs found in database")]
    NoRuns,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// Receives product records as they are extracted
///
/// Records arrive in completion order, which is not the discovery order.
pub trait ProductSink: Send {
    /// Takes one finished record
    fn accept(&mut self, record: &ProductRecord) -> OutputResult<()>;

    /// Flushes whatever the sink buffers; called once when the crawl ends
    fn finish(&mut self) -> OutputResult<()>;
}

/// Summary of a crawl, as written to the markdown report
#[derive(Debug, Clone, Default)]
pub struct CrawlSummary {
    // Run metadata
    pub run_id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub duration_seconds: Option<u64>,
    pub status: String,
    pub config_hash: String,

    // Pages
    pub total_pages: u64,
    pub listing_pages: u64,
    pub product_pages: u64,
    pub pages_by_state: HashMap<PageState, u64>,
    pub error_summary: HashMap<PageState, u64>,

    // Products
    pub total_products: u64,
    pub products_in_stock: u64,
    pub discounted_products: u64,

    /// Breadcrumb trail -> product count, largest first
    pub top_sections: Vec<(String, u64)>,
}

impl CrawlSummary {
    /// Creates a new empty crawl summary
    pub fn new() -> Self {
        Self::default()
    }

    /// Pages that ended in the given state
    pub fn pages_in(&self, state: PageState) -> u64 {
        self.pages_by_state.get(&state).copied().unwrap_or(0)
    }

    /// Returns the total number of pages in terminal states
    pub fn total_terminal_pages(&self) -> u64 {
        self.pages_by_state
            .iter()
            .filter(|(state, _)| state.is_terminal())
            .map(|(_, count)| count)
            .sum()
    }

    /// Returns the success rate as a percentage
    pub fn success_rate(&self) -> f64 {
        let terminal = self.total_terminal_pages();
        if terminal == 0 {
            return 0.0;
        }
        (self.pages_in(PageState::Processed) as f64 / terminal as f64) * 100.0
    }

    /// Share of stored products that are in stock, as a percentage
    pub fn in_stock_rate(&self) -> f64 {
        if self.total_products == 0 {
            return 0.0;
        }
        (self.products_in_stock as f64 / self.total_products as f64) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_summary_new() {
        let summary = CrawlSummary::new();
        assert_eq!(summary.total_pages, 0);
        assert_eq!(summary.total_products, 0);
    }

    #[test]
    fn test_terminal_pages_skip_active_states() {
        let mut summary = CrawlSummary::new();
        summary.pages_by_state.insert(PageState::Processed, 100);
        summary.pages_by_state.insert(PageState::Failed, 10);
        summary.pages_by_state.insert(PageState::Queued, 7);

        assert_eq!(summary.total_terminal_pages(), 110);
    }

    #[test]
    fn test_success_rate() {
        let mut summary = CrawlSummary::new();
        summary.pages_by_state.insert(PageState::Processed, 80);
        summary.pages_by_state.insert(PageState::DeadLink, 20);

        assert!((summary.success_rate() - 80.0).abs() < 0.01);
    }

    #[test]
    fn test_rates_without_data() {
        let summary = CrawlSummary::new();
        assert_eq!(summary.success_rate(), 0.0);
        assert_eq!(summary.in_stock_rate(), 0.0);
    }

    #[test]
    fn test_in_stock_rate() {
        let summary = CrawlSummary {
            total_products: 8,
            products_in_stock: 6,
            ..CrawlSummary::default()
        };
        assert!((summary.in_stock_rate() - 75.0).abs() < 0.01);
    }
}
