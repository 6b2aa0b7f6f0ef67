//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Starting, resuming and seeding runs
//! - Dispatching ready requests to concurrent fetch tasks
//! - Handing listing and product responses to their handlers
//! - Deduplicating and queueing follow requests
//! - Writing products to the database and the sinks

use crate::config::Config;
use crate::crawler::fetcher::{build_http_client, fetch_url, FetchResult, RetryPolicy};
use crate::crawler::scheduler::{Dispatch, QueuedRequest, ScheduledFetch, Scheduler};
use crate::extract::{
    handle_listing_page, handle_product_page, Document, ExtractOptions, FollowRequest,
    ProductRecord,
};
use crate::output::ProductSink;
use crate::robots::{fetch_robots, is_allowed, ParsedRobots};
use crate::state::{DomainState, PageKind, PageState};
use crate::storage::{RunStatus, SqliteStorage, Storage};
use crate::url::{extract_domain, is_allowed_domain, normalize_url};
use crate::UrlError;
use reqwest::Client;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

/// Pages between progress log lines
const PROGRESS_INTERVAL: u64 = 10;

/// Pages between domain state checkpoints
const CHECKPOINT_INTERVAL: u64 = 50;

/// What a fetch task learned about its page
#[derive(Debug)]
enum PageOutcome {
    Listing {
        follow: Vec<FollowRequest>,
        status_code: u16,
        content_type: String,
    },
    Product {
        record: Box<ProductRecord>,
        status_code: u16,
        content_type: String,
    },
    Unparseable {
        status_code: u16,
        content_type: String,
        error: String,
    },
    RateLimited {
        status_code: u16,
    },
    Failed {
        state: PageState,
        status_code: Option<u16>,
        content_type: Option<String>,
        error: String,
    },
}

/// How the coordinator should pick its run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunMode {
    /// Resume an interrupted run if there is one, otherwise start a new run
    #[default]
    Auto,

    /// Forget all pages and start a new run
    Fresh,

    /// Resume an interrupted run; fail if there is none
    Resume,
}

/// Totals of one `Coordinator::run`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CrawlReport {
    pub run_id: i64,
    pub pages_handled: u64,
    pub listings_processed: u64,
    pub products_extracted: u64,
    pub pages_failed: u64,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    storage: SqliteStorage,
    scheduler: Scheduler,
    client: Client,
    options: Arc<ExtractOptions>,
    retry_policy: RetryPolicy,
    allowed_domains: Vec<String>,
    obey_robots: bool,
    agent: String,
    run_id: i64,
    resumed: bool,
    sinks: Vec<Box<dyn ProductSink>>,
    report: CrawlReport,
}

impl Coordinator {
    /// Creates a new coordinator instance
    ///
    /// Opens the database, picks or creates the run, and rebuilds the
    /// in-memory frontier. A new run is seeded with the configured start
    /// URLs as listing requests.
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `mode` - Whether to resume, start fresh, or decide automatically
    /// * `config_hash` - Hash of the configuration file, recorded with the run
    ///
    /// # Returns
    ///
    /// * `Ok(Coordinator)` - Successfully created coordinator
    /// * `Err(HarvestError)` - Failed to initialize
    pub fn new(config: Config, mode: RunMode, config_hash: &str) -> crate::Result<Self> {
        let mut storage = SqliteStorage::new(Path::new(&config.output.database_path))?;

        let interrupted = storage
            .get_latest_run()?
            .filter(|run| run.status == RunStatus::Running);

        let resumed = interrupted.is_some() && mode != RunMode::Fresh;
        let (run_id, frontier) = match (mode, interrupted) {
            (RunMode::Fresh, interrupted) => {
                if let Some(run) = interrupted {
                    info!("Abandoning interrupted run {}", run.id);
                    storage.update_run_status(run.id, RunStatus::Interrupted)?;
                }
                start_new_run(&mut storage, &config, config_hash)?
            }
            (RunMode::Resume | RunMode::Auto, Some(run)) => {
                info!("Resuming interrupted run {}", run.id);
                (run.id, load_frontier(&mut storage)?)
            }
            (RunMode::Resume, None) => {
                return Err(crate::ConfigError::Validation(
                    "There is no interrupted run to resume".to_string(),
                )
                .into());
            }
            (RunMode::Auto, None) => start_new_run(&mut storage, &config, config_hash)?,
        };

        let agent = config.user_agent.crawler_name.clone();
        let mut domain_states = storage.load_domain_states()?;
        if config.site.obey_robots {
            restore_crawl_delays(&mut domain_states, &agent);
        }

        let client = build_http_client(&config)?;
        let scheduler = Scheduler::new(config.crawler.clone(), frontier, domain_states);

        Ok(Self {
            storage,
            scheduler,
            client,
            options: Arc::new(ExtractOptions::from(&config.locale)),
            retry_policy: RetryPolicy::from(&config.crawler),
            allowed_domains: config.site.allowed_domains.clone(),
            obey_robots: config.site.obey_robots,
            agent,
            run_id,
            resumed,
            sinks: Vec::new(),
            report: CrawlReport {
                run_id,
                ..CrawlReport::default()
            },
        })
    }

    /// Adds a sink that receives every extracted product
    pub fn add_sink(&mut self, sink: Box<dyn ProductSink>) {
        self.sinks.push(sink);
    }

    /// Builder form of [`Coordinator::add_sink`]
    pub fn with_sink(mut self, sink: Box<dyn ProductSink>) -> Self {
        self.add_sink(sink);
        self
    }

    /// The ID of the run this coordinator drives
    pub fn run_id(&self) -> i64 {
        self.run_id
    }

    /// Whether an interrupted run is being continued
    pub fn is_resumed(&self) -> bool {
        self.resumed
    }

    /// Runs the main crawl loop until the frontier is drained
    ///
    /// Ready requests are spawned onto a [`JoinSet`] while permits last. When
    /// nothing can be dispatched, the loop waits for either a finished fetch
    /// or the next domain to become ready. Results are applied one at a time
    /// on this task, so storage is never shared.
    pub async fn run(&mut self) -> crate::Result<CrawlReport> {
        info!(
            "Starting crawl run {} with {} queued pages",
            self.run_id,
            self.scheduler.frontier_size()
        );

        let start_time = Instant::now();
        let mut tasks: JoinSet<(QueuedRequest, PageOutcome)> = JoinSet::new();

        loop {
            let wait = loop {
                match self.scheduler.next_ready(Instant::now()) {
                    Dispatch::Ready(fetch) => self.dispatch(fetch, &mut tasks).await?,
                    Dispatch::LimitHit(request) => self.skip_over_budget(&request)?,
                    Dispatch::Wait(wait) => break Some(wait),
                    Dispatch::Busy | Dispatch::Empty => break None,
                }
            };

            if tasks.is_empty() {
                match wait {
                    Some(wait) => {
                        tokio::time::sleep(wait).await;
                        continue;
                    }
                    None if self.scheduler.is_empty() => {
                        info!("Frontier is empty, crawl complete");
                        break;
                    }
                    None => {
                        tokio::task::yield_now().await;
                        continue;
                    }
                }
            }

            let joined = match wait {
                Some(wait) => tokio::select! {
                    joined = tasks.join_next() => joined,
                    _ = tokio::time::sleep(wait) => continue,
                },
                None => tasks.join_next().await,
            };

            match joined {
                Some(Ok((request, outcome))) => {
                    self.apply_outcome(request, outcome)?;
                    self.report_progress(start_time)?;
                }
                Some(Err(e)) => warn!("Fetch task failed: {}", e),
                None => {}
            }
        }

        self.save_domain_states()?;
        for sink in &mut self.sinks {
            sink.finish()?;
        }
        self.storage.complete_run(self.run_id)?;

        info!(
            "Crawl completed: {} pages handled, {} products extracted in {:?}",
            self.report.pages_handled,
            self.report.products_extracted,
            start_time.elapsed()
        );

        Ok(self.report)
    }

    /// Starts the fetch of one ready request
    async fn dispatch(
        &mut self,
        fetch: ScheduledFetch,
        tasks: &mut JoinSet<(QueuedRequest, PageOutcome)>,
    ) -> crate::Result<()> {
        let ScheduledFetch { request, permit } = fetch;

        self.scheduler.record_request(&request.domain);
        self.storage.remove_from_frontier(request.page_id)?;

        if self.obey_robots && !self.robots_allow(&request).await {
            info!("{} disallowed by robots.txt", request.url);
            self.storage.update_page_state(
                request.page_id,
                PageState::RobotsDenied,
                None,
                None,
                Some("Disallowed by robots.txt"),
            )?;
            return Ok(());
        }

        self.storage
            .update_page_state(request.page_id, PageState::Fetching, None, None, None)?;
        debug!("Fetching {} page {}", request.kind, request.url);

        let client = self.client.clone();
        let options = Arc::clone(&self.options);
        let policy = self.retry_policy;

        tasks.spawn(async move {
            let outcome = fetch_and_handle(&client, &request, policy, &options).await;
            drop(permit);
            (request, outcome)
        });

        Ok(())
    }

    /// Checks robots.txt for a request, refreshing the domain's cached copy if stale
    async fn robots_allow(&mut self, request: &QueuedRequest) -> bool {
        let stale = self
            .scheduler
            .get_domain_state(&request.domain)
            .map_or(true, DomainState::is_robots_stale);

        let robots = if stale {
            debug!("Fetching robots.txt for domain: {}", request.domain);
            let robots = fetch_robots(&self.client, &request.url).await;
            let state = self.scheduler.domain_state_mut(&request.domain);
            state.update_robots(robots.content().to_string());
            state.crawl_delay = crawl_delay(&robots, &self.agent);
            robots
        } else {
            self.scheduler
                .get_domain_state(&request.domain)
                .and_then(|state| state.robots_txt.as_ref())
                .map_or_else(ParsedRobots::allow_all, |cached| {
                    ParsedRobots::from_content(&cached.content)
                })
        };

        is_allowed(&robots, &request.url, &self.agent)
    }

    /// Marks a request whose domain has used its budget
    fn skip_over_budget(&mut self, request: &QueuedRequest) -> crate::Result<()> {
        debug!("Request limit reached for {}, skipping {}", request.domain, request.url);
        self.storage.remove_from_frontier(request.page_id)?;
        self.storage.update_page_state(
            request.page_id,
            PageState::RequestLimitHit,
            None,
            None,
            Some("Domain request limit reached"),
        )?;
        Ok(())
    }

    /// Records a finished fetch and queues what it discovered
    fn apply_outcome(&mut self, request: QueuedRequest, outcome: PageOutcome) -> crate::Result<()> {
        let page_id = request.page_id;
        self.report.pages_handled += 1;

        match outcome {
            PageOutcome::Listing {
                follow,
                status_code,
                content_type,
            } => {
                self.storage.update_page_state(
                    page_id,
                    PageState::Processed,
                    Some(status_code),
                    Some(&content_type),
                    None,
                )?;
                let found = follow.len();
                let queued = self.enqueue_follow_requests(follow)?;
                debug!("{}: {} links, {} new", request.url, found, queued);
                self.report.listings_processed += 1;
            }

            PageOutcome::Product {
                record,
                status_code,
                content_type,
            } => {
                self.storage.upsert_product(&record, self.run_id)?;
                for sink in &mut self.sinks {
                    sink.accept(&record)?;
                }
                self.storage.update_page_state(
                    page_id,
                    PageState::Processed,
                    Some(status_code),
                    Some(&content_type),
                    None,
                )?;
                debug!("Extracted product {} ({})", record.rpc, record.url);
                self.report.products_extracted += 1;
            }

            PageOutcome::Unparseable {
                status_code,
                content_type,
                error,
            } => {
                warn!("{}", error);
                self.storage.update_page_state(
                    page_id,
                    PageState::Failed,
                    Some(status_code),
                    Some(&content_type),
                    Some(&error),
                )?;
                self.report.pages_failed += 1;
            }

            PageOutcome::RateLimited { status_code } => {
                self.retry_rate_limited(request, status_code)?;
            }

            PageOutcome::Failed {
                state,
                status_code,
                content_type,
                error,
            } => {
                warn!("Failed to fetch {}: {}", request.url, error);
                self.storage.update_page_state(
                    page_id,
                    state,
                    status_code,
                    content_type.as_deref(),
                    Some(&error),
                )?;
                self.report.pages_failed += 1;
            }
        }

        Ok(())
    }

    /// Cools the domain down and requeues the page, until retries run out
    fn retry_rate_limited(&mut self, request: QueuedRequest, status_code: u16) -> crate::Result<()> {
        let retries = self.storage.increment_retry_count(request.page_id)?;

        if retries > self.retry_policy.max_retries {
            warn!(
                "Giving up on {} after {} rate-limited attempts",
                request.url, retries
            );
            self.storage.update_page_state(
                request.page_id,
                PageState::RateLimited,
                Some(status_code),
                None,
                Some(&format!("HTTP {}", status_code)),
            )?;
            self.report.pages_failed += 1;
            return Ok(());
        }

        info!(
            "Rate limited by {}, pausing domain before retry {} of {}",
            request.domain, retries, self.retry_policy.max_retries
        );
        self.scheduler.mark_rate_limited(&request.domain);
        self.storage
            .update_page_state(request.page_id, PageState::Queued, Some(status_code), None, None)?;
        self.storage.add_to_frontier(request.page_id, request.priority)?;
        self.scheduler.add_to_frontier(request);
        Ok(())
    }

    /// Normalizes, filters and deduplicates follow requests, then queues the new ones
    ///
    /// # Returns
    ///
    /// The number of pages that were new and got queued
    fn enqueue_follow_requests(&mut self, requests: Vec<FollowRequest>) -> crate::Result<usize> {
        let mut queued = 0;

        for follow in requests {
            let normalized = match normalize_url(follow.url.as_str()) {
                Ok(url) => url,
                Err(e) => {
                    debug!("Failed to normalize URL {}: {}", follow.url, e);
                    continue;
                }
            };

            let Some(domain) = extract_domain(&normalized) else {
                debug!("Failed to extract domain from {}", normalized);
                continue;
            };

            if !is_allowed_domain(&domain, &self.allowed_domains) {
                debug!("Dropping offsite request {}", normalized);
                continue;
            }

            if self.queue_page(normalized, domain, follow.kind)? {
                queued += 1;
            }
        }

        Ok(queued)
    }

    /// Queues a page unless its URL is already known
    fn queue_page(&mut self, url: Url, domain: String, kind: PageKind) -> crate::Result<bool> {
        let Some(page_id) = queue_new_page(&mut self.storage, &url, &domain, kind, self.run_id)?
        else {
            return Ok(false);
        };

        self.scheduler
            .add_to_frontier(QueuedRequest::new(url, domain, kind, page_id));
        Ok(true)
    }

    fn report_progress(&mut self, start_time: Instant) -> crate::Result<()> {
        let handled = self.report.pages_handled;

        if handled % PROGRESS_INTERVAL == 0 {
            let rate = handled as f64 / start_time.elapsed().as_secs_f64().max(f64::EPSILON);
            info!(
                "Progress: {} pages handled, {} products, {} in frontier, {:.2} pages/sec",
                handled,
                self.report.products_extracted,
                self.scheduler.frontier_size(),
                rate
            );
        }

        if handled % CHECKPOINT_INTERVAL == 0 {
            self.save_domain_states()?;
        }

        Ok(())
    }

    /// Saves all domain states to the database
    fn save_domain_states(&mut self) -> crate::Result<()> {
        let domain_states = self.scheduler.get_all_domain_states();
        self.storage.save_domain_states(domain_states)?;
        debug!("Saved {} domain states to database", domain_states.len());
        Ok(())
    }
}

/// Fetches one page and runs the handler for its kind
async fn fetch_and_handle(
    client: &Client,
    request: &QueuedRequest,
    policy: RetryPolicy,
    options: &ExtractOptions,
) -> PageOutcome {
    match fetch_url(client, &request.url, policy).await {
        FetchResult::Success {
            final_url,
            status_code,
            content_type,
            body,
        } => handle_body(request.kind, &body, final_url, status_code, content_type, options),

        FetchResult::ContentMismatch {
            status_code,
            content_type,
        } => PageOutcome::Failed {
            state: PageState::ContentMismatch,
            status_code: Some(status_code),
            error: format!("Expected HTML, got {}", content_type),
            content_type: Some(content_type),
        },

        FetchResult::RateLimited { status_code } => PageOutcome::RateLimited { status_code },

        FetchResult::HttpError { status_code, state } => PageOutcome::Failed {
            state,
            status_code: Some(status_code),
            content_type: None,
            error: format!("HTTP {}", status_code),
        },

        FetchResult::NetworkError { error, state } => PageOutcome::Failed {
            state,
            status_code: None,
            content_type: None,
            error,
        },
    }
}

/// Parses a fetched body and hands it to the listing or product handler
///
/// Kept synchronous: the parsed tree never lives across an await point.
fn handle_body(
    kind: PageKind,
    body: &str,
    final_url: Url,
    status_code: u16,
    content_type: String,
    options: &ExtractOptions,
) -> PageOutcome {
    let document = match Document::parse(body, final_url) {
        Ok(document) => document,
        Err(e) => {
            return PageOutcome::Unparseable {
                status_code,
                content_type,
                error: e.to_string(),
            }
        }
    };

    match kind {
        PageKind::Listing => PageOutcome::Listing {
            follow: handle_listing_page(&document),
            status_code,
            content_type,
        },
        PageKind::Product => PageOutcome::Product {
            record: Box::new(handle_product_page(&document, options)),
            status_code,
            content_type,
        },
    }
}

/// Inserts a page and puts it on the persisted frontier if its URL is new
fn queue_new_page(
    storage: &mut SqliteStorage,
    url: &Url,
    domain: &str,
    kind: PageKind,
    run_id: i64,
) -> crate::Result<Option<i64>> {
    let Some(page_id) = storage.insert_page_if_new(url.as_str(), domain, kind, run_id)? else {
        return Ok(None);
    };

    storage.update_page_state(page_id, PageState::Queued, None, None, None)?;
    storage.add_to_frontier(page_id, kind.default_priority())?;
    Ok(Some(page_id))
}

/// Creates a run over a clean page table and seeds the start URLs
fn start_new_run(
    storage: &mut SqliteStorage,
    config: &Config,
    config_hash: &str,
) -> crate::Result<(i64, Vec<QueuedRequest>)> {
    storage.reset_crawl_state()?;
    let run_id = storage.create_run(config_hash)?;
    info!("Starting new run {}", run_id);

    let mut frontier = Vec::new();
    for start_url in &config.site.start_urls {
        let url = normalize_url(start_url)?;
        let domain = extract_domain(&url).ok_or(UrlError::MissingDomain)?;

        if let Some(page_id) = queue_new_page(storage, &url, &domain, PageKind::Listing, run_id)? {
            frontier.push(QueuedRequest::new(url, domain, PageKind::Listing, page_id));
        }
    }

    info!("Seeded {} start URLs", frontier.len());
    Ok((run_id, frontier))
}

/// Rebuilds the in-memory frontier of an interrupted run
fn load_frontier(storage: &mut SqliteStorage) -> crate::Result<Vec<QueuedRequest>> {
    for page in storage.reset_interrupted_pages()? {
        debug!("Requeueing interrupted fetch of {}", page.url);
        storage.add_to_frontier(page.id, page.kind.default_priority())?;
    }

    let mut frontier = Vec::new();
    for (page_id, priority) in storage.load_frontier()? {
        let page = storage.get_page(page_id)?;
        let mut request = QueuedRequest::new(Url::parse(&page.url)?, page.domain, page.kind, page_id);
        request.priority = priority;
        frontier.push(request);
    }

    info!("Loaded {} pages from frontier", frontier.len());
    Ok(frontier)
}

/// Re-derives robots.txt crawl delays from the cached bodies
fn restore_crawl_delays(domain_states: &mut HashMap<String, DomainState>, agent: &str) {
    for state in domain_states.values_mut() {
        if let Some(cached) = &state.robots_txt {
            state.crawl_delay = crawl_delay(&ParsedRobots::from_content(&cached.content), agent);
        }
    }
}

fn crawl_delay(robots: &ParsedRobots, agent: &str) -> Option<Duration> {
    robots
        .crawl_delay(agent)
        .and_then(|seconds| Duration::try_from_secs_f64(seconds).ok())
}

/// Runs a crawl with the default run mode and no extra sinks
///
/// # Example
///
/// ```no_run
/// use catalog_harvest::config::load_config_with_hash;
/// use catalog_harvest::crawler::run_crawl;
/// use std::path::Path;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let (config, hash) = load_config_with_hash(Path::new("config.toml"))?;
/// let report = run_crawl(config, &hash).await?;
/// println!("{} products", report.products_extracted);
/// # Ok(())
/// # }
/// ```
pub async fn run_crawl(config: Config, config_hash: &str) -> crate::Result<CrawlReport> {
    let mut coordinator = Coordinator::new(config, RunMode::Auto, config_hash)?;
    coordinator.run().await
}
