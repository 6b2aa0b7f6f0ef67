//! Storage traits and error types

use crate::extract::ProductRecord;
use crate::state::{DomainState, PageKind, PageState};
use crate::storage::{PageRecord, RunRecord, RunStatus};
use std::collections::HashMap;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Page not found: {0}")]
    PageNotFound(String),

    #[error("Run not found: {0}")]
    RunNotFound(i64),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// This trait defines all database operations needed by the crawler and the
/// report commands.
pub trait Storage {
    // ===== Run Management =====

    /// Creates a new crawl run
    ///
    /// # Arguments
    ///
    /// * `config_hash` - Hash of the configuration file
    ///
    /// # Returns
    ///
    /// The ID of the newly created run
    fn create_run(&mut self, config_hash: &str) -> StorageResult<i64>;

    /// Gets a run by ID
    fn get_run(&self, run_id: i64) -> StorageResult<RunRecord>;

    /// Gets the most recent run
    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>>;

    /// Updates the status of a run
    fn update_run_status(&mut self, run_id: i64, status: RunStatus) -> StorageResult<()>;

    /// Marks a run as completed with a finish timestamp
    fn complete_run(&mut self, run_id: i64) -> StorageResult<()>;

    // ===== Page Management =====

    /// Inserts a page unless its URL is already known
    ///
    /// This is the crawler's deduplication point: a URL gets a row once and
    /// only the first caller is told to queue it.
    ///
    /// # Arguments
    ///
    /// * `url` - The normalized URL
    /// * `domain` - The domain extracted from the URL
    /// * `kind` - Listing or product page
    /// * `discovered_run` - The run ID that discovered this page
    ///
    /// # Returns
    ///
    /// * `Some(page_id)` - The page is new
    /// * `None` - The URL was already known
    fn insert_page_if_new(
        &mut self,
        url: &str,
        domain: &str,
        kind: PageKind,
        discovered_run: i64,
    ) -> StorageResult<Option<i64>>;

    /// Gets a page by ID
    fn get_page(&self, page_id: i64) -> StorageResult<PageRecord>;

    /// Gets a page by URL
    fn get_page_by_url(&self, url: &str) -> StorageResult<Option<PageRecord>>;

    /// Updates the state of a page
    fn update_page_state(
        &mut self,
        page_id: i64,
        state: PageState,
        status_code: Option<u16>,
        content_type: Option<&str>,
        error_message: Option<&str>,
    ) -> StorageResult<()>;

    /// Increments the retry count for a page and returns the new count
    fn increment_retry_count(&mut self, page_id: i64) -> StorageResult<u32>;

    /// Gets all pages in a specific state
    fn get_pages_by_state(&self, state: PageState) -> StorageResult<Vec<PageRecord>>;

    /// Puts pages left in `Fetching` by a crash back into `Queued`
    ///
    /// # Returns
    ///
    /// The pages that were reset
    fn reset_interrupted_pages(&mut self) -> StorageResult<Vec<PageRecord>>;

    /// Forgets every page, the frontier and all domain states
    ///
    /// Used by `--fresh`. Products and runs are kept.
    fn reset_crawl_state(&mut self) -> StorageResult<()>;

    // ===== Frontier Management =====

    /// Adds a page to the crawl frontier (lower priority value is fetched first)
    fn add_to_frontier(&mut self, page_id: i64, priority: i32) -> StorageResult<()>;

    /// Removes a page from the frontier once it is dispatched
    fn remove_from_frontier(&mut self, page_id: i64) -> StorageResult<()>;

    /// Loads the entire frontier into memory, in fetch order
    fn load_frontier(&self) -> StorageResult<Vec<(i64, i32)>>;

    /// Clears the frontier
    fn clear_frontier(&mut self) -> StorageResult<()>;

    // ===== Domain State Persistence =====

    /// Loads all domain states from the database
    fn load_domain_states(&self) -> StorageResult<HashMap<String, DomainState>>;

    /// Saves domain states to the database
    fn save_domain_states(&mut self, states: &HashMap<String, DomainState>) -> StorageResult<()>;

    /// Updates a single domain state
    fn update_domain_state(&mut self, domain: &str, state: &DomainState) -> StorageResult<()>;

    // ===== Products =====

    /// Inserts a product record, replacing an earlier one for the same URL
    fn upsert_product(&mut self, record: &ProductRecord, run_id: i64) -> StorageResult<()>;

    /// Gets the stored record of a product URL
    fn get_product(&self, url: &str) -> StorageResult<Option<ProductRecord>>;

    /// Loads every stored product, oldest row first
    fn load_products(&self) -> StorageResult<Vec<ProductRecord>>;

    /// Counts stored products
    fn count_products(&self) -> StorageResult<u64>;

    /// Counts stored products that are in stock
    fn count_products_in_stock(&self) -> StorageResult<u64>;

    /// Counts stored products with a discount
    fn count_discounted_products(&self) -> StorageResult<u64>;

    /// Product counts per breadcrumb trail, largest first
    fn get_section_breakdown(&self, limit: usize) -> StorageResult<Vec<(String, u64)>>;

    // ===== Statistics =====

    /// Counts pages by state
    fn count_pages_by_state(&self, state: PageState) -> StorageResult<u64>;

    /// Counts pages by kind
    fn count_pages_by_kind(&self, kind: PageKind) -> StorageResult<u64>;

    /// Gets total page count
    fn count_total_pages(&self) -> StorageResult<u64>;

    /// Gets error summary (state -> count)
    fn get_error_summary(&self) -> StorageResult<HashMap<PageState, u64>>;
}
