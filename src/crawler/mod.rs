//! Crawler module: the fetch-and-dispatch driver around the extraction core
//!
//! This module contains the crawling logic, including:
//! - HTTP fetching with retry logic
//! - Request scheduling, politeness and concurrency limits
//! - Overall crawl coordination and resumption

mod coordinator;
mod fetcher;
mod scheduler;

pub use coordinator::{run_crawl, Coordinator, CrawlReport, RunMode};
pub use fetcher::{build_http_client, fetch_url, FetchResult, RetryPolicy};
pub use scheduler::{Dispatch, QueuedRequest, ScheduledFetch, Scheduler};

use crate::config::Config;
use crate::output::{JsonLinesSink, ProductSink};
use std::path::Path;

/// Options for [`crawl`] that come from the command line
#[derive(Debug, Clone, Copy, Default)]
pub struct CrawlOptions {
    pub mode: RunMode,
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the database and start or resume a run
/// 2. Open the JSON Lines feed, when one is configured (appending on resume)
/// 3. Fetch listings and product pages until the frontier is drained
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `config_hash` - Hash of the configuration file
/// * `options` - Run mode selected on the command line
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl completed successfully
/// * `Err(HarvestError)` - Crawl failed
pub async fn crawl(
    config: Config,
    config_hash: &str,
    options: CrawlOptions,
) -> crate::Result<CrawlReport> {
    let feed_path = config.output.feed_path.clone();
    let mut coordinator = Coordinator::new(config, options.mode, config_hash)?;

    if let Some(path) = feed_path {
        let path = Path::new(&path);
        let sink = if coordinator.is_resumed() {
            JsonLinesSink::append(path)?
        } else {
            JsonLinesSink::create(path)?
        };
        let sink: Box<dyn ProductSink> = Box::new(sink);
        coordinator.add_sink(sink);
    }

    coordinator.run().await
}
