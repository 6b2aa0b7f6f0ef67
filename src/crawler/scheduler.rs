//! Scheduler for managing the crawl frontier and politeness
//!
//! This module handles:
//! - Priority queue management for pages to fetch
//! - Global concurrency limiting via semaphores
//! - Per-domain download delay, 429 cooldown and request budget

use crate::config::CrawlerConfig;
use crate::state::{DomainState, PageKind};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// A page queued for fetching
#[derive(Debug, Clone)]
pub struct QueuedRequest {
    /// The URL to fetch
    pub url: Url,

    /// The domain of this URL
    pub domain: String,

    /// How the response will be handled
    pub kind: PageKind,

    /// Priority value (lower is fetched first)
    pub priority: i32,

    /// Database page ID
    pub page_id: i64,
}

impl QueuedRequest {
    /// Queues a page with its kind's default priority
    pub fn new(url: Url, domain: String, kind: PageKind, page_id: i64) -> Self {
        Self {
            url,
            domain,
            kind,
            priority: kind.default_priority(),
            page_id,
        }
    }
}

// BinaryHeap pops the greatest element: lower priority values and earlier
// page IDs compare greater
impl Ord for QueuedRequest {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.page_id.cmp(&self.page_id))
    }
}

impl PartialOrd for QueuedRequest {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for QueuedRequest {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.page_id == other.page_id
    }
}

impl Eq for QueuedRequest {}

/// A request cleared for fetching, holding its concurrency permit
pub struct ScheduledFetch {
    pub request: QueuedRequest,

    /// Released when the fetch task finishes
    pub permit: OwnedSemaphorePermit,
}

/// What the scheduler can hand out right now
pub enum Dispatch {
    /// A request that may be fetched now
    Ready(ScheduledFetch),

    /// A request whose domain has used up its request budget
    LimitHit(QueuedRequest),

    /// Requests are queued but no domain is ready; check again after this long
    Wait(Duration),

    /// Every permit is in use
    Busy,

    /// Nothing is queued
    Empty,
}

/// Scheduler manages the frontier queue and rate limiting
///
/// The scheduler coordinates:
/// - Global concurrency limits (max concurrent requests)
/// - Per-domain download delay and 429 cooldown
/// - Per-domain request counts (max requests per domain)
/// - Priority-based selection from the frontier
pub struct Scheduler {
    /// Global semaphore for limiting concurrent fetches
    global_semaphore: Arc<Semaphore>,

    /// Per-domain state tracking
    domain_states: HashMap<String, DomainState>,

    /// Frontier, one priority queue per domain
    frontier: HashMap<String, BinaryHeap<QueuedRequest>>,

    /// Crawler configuration
    config: CrawlerConfig,
}

impl Scheduler {
    /// Creates a new scheduler
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `initial_frontier` - Pages to fetch
    /// * `initial_domain_states` - Existing domain states (for resume)
    pub fn new(
        config: CrawlerConfig,
        initial_frontier: Vec<QueuedRequest>,
        initial_domain_states: HashMap<String, DomainState>,
    ) -> Self {
        let permits = config.max_concurrent_requests.max(1) as usize;

        let mut scheduler = Self {
            global_semaphore: Arc::new(Semaphore::new(permits)),
            domain_states: initial_domain_states,
            frontier: HashMap::new(),
            config,
        };
        for request in initial_frontier {
            scheduler.add_to_frontier(request);
        }
        scheduler
    }

    /// Picks the next request to dispatch without waiting
    ///
    /// Only the head of each domain's queue is examined. Among domains that
    /// accept a request now (or have used up their budget) the head with the
    /// best priority is returned; domains still cooling down keep their
    /// requests queued in place.
    ///
    /// # Arguments
    ///
    /// * `now` - The current time instant
    pub fn next_ready(&mut self, now: Instant) -> Dispatch {
        if self.frontier.is_empty() {
            return Dispatch::Empty;
        }

        let Ok(permit) = self.global_semaphore.clone().try_acquire_owned() else {
            return Dispatch::Busy;
        };

        let mut chosen: Option<(&String, &QueuedRequest)> = None;
        for (domain, queue) in &self.frontier {
            let Some(head) = queue.peek() else {
                continue;
            };
            let eligible = self.domain_states.get(domain).map_or(true, |state| {
                state.has_exceeded_limit(&self.config) || state.can_request(&self.config, now)
            });
            if eligible && chosen.map_or(true, |(_, best)| head > best) {
                chosen = Some((domain, head));
            }
        }

        let Some(domain) = chosen.map(|(domain, _)| domain.clone()) else {
            return Dispatch::Wait(self.calculate_minimum_wait_time(now));
        };
        let Some(queued) = self.pop_from(&domain) else {
            return Dispatch::Wait(self.calculate_minimum_wait_time(now));
        };

        let budget_spent = self
            .domain_states
            .get(&domain)
            .is_some_and(|state| state.has_exceeded_limit(&self.config));
        if budget_spent {
            return Dispatch::LimitHit(queued);
        }

        tracing::trace!("Dispatching {}", queued.url);
        Dispatch::Ready(ScheduledFetch {
            request: queued,
            permit,
        })
    }

    fn pop_from(&mut self, domain: &str) -> Option<QueuedRequest> {
        let queue = self.frontier.get_mut(domain)?;
        let queued = queue.pop();
        if queue.is_empty() {
            self.frontier.remove(domain);
        }
        queued
    }

    /// Calculates the minimum time to wait before any queued domain is ready
    fn calculate_minimum_wait_time(&self, now: Instant) -> Duration {
        self.frontier
            .keys()
            .filter_map(|domain| {
                self.domain_states
                    .get(domain)
                    .map(|state| state.time_until_next_request(&self.config, now))
                    .unwrap_or(Some(Duration::ZERO))
            })
            .min()
            .unwrap_or(Duration::from_millis(100))
            + Duration::from_millis(10)
    }

    /// Adds a request to the frontier
    pub fn add_to_frontier(&mut self, request: QueuedRequest) {
        self.frontier
            .entry(request.domain.clone())
            .or_default()
            .push(request);
    }

    /// Records that a request was made to a domain
    pub fn record_request(&mut self, domain: &str) {
        self.domain_state_mut(domain).record_request(Instant::now());
    }

    /// Pauses a domain after HTTP 429
    pub fn mark_rate_limited(&mut self, domain: &str) {
        let config = self.config.clone();
        self.domain_state_mut(domain)
            .mark_rate_limited(&config, Instant::now());
    }

    /// Returns the number of requests in the frontier
    pub fn frontier_size(&self) -> usize {
        self.frontier.values().map(BinaryHeap::len).sum()
    }

    /// Returns whether the frontier is empty
    pub fn is_empty(&self) -> bool {
        self.frontier.is_empty()
    }

    /// Gets the domain state for a specific domain
    pub fn get_domain_state(&self, domain: &str) -> Option<&DomainState> {
        self.domain_states.get(domain)
    }

    /// Gets the domain state for a domain, creating it on first use
    pub fn domain_state_mut(&mut self, domain: &str) -> &mut DomainState {
        self.domain_states
            .entry(domain.to_string())
            .or_insert_with(DomainState::new)
    }

    /// Gets all domain states (for persistence)
    pub fn get_all_domain_states(&self) -> &HashMap<String, DomainState> {
        &self.domain_states
    }
}
