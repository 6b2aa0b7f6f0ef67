use crate::config::CrawlerConfig;
use chrono::{DateTime, Utc};
use std::time::{Duration, Instant};

/// A domain's robots.txt body and when it was fetched
#[derive(Debug, Clone)]
pub struct CachedRobots {
    pub content: String,
    pub fetched_at: DateTime<Utc>,
}

/// Tracks the state of a domain during crawling
///
/// Holds what the scheduler needs for politeness (download delay, 429
/// cooldown, request budget) and the robots.txt cache.
#[derive(Debug, Clone)]
pub struct DomainState {
    /// Number of requests made to this domain in the current run
    pub request_count: u32,

    /// Timestamp of the last request to this domain
    pub last_request_time: Option<Instant>,

    /// Set after an HTTP 429; no request goes out before this instant
    pub rate_limited_until: Option<Instant>,

    /// Cached robots.txt data for this domain
    pub robots_txt: Option<CachedRobots>,

    /// robots.txt `Crawl-delay`, applied on top of the download delay
    pub crawl_delay: Option<Duration>,
}

impl DomainState {
    /// Creates a new DomainState with default values
    pub fn new() -> Self {
        Self {
            request_count: 0,
            last_request_time: None,
            rate_limited_until: None,
            robots_txt: None,
            crawl_delay: None,
        }
    }

    /// Checks if a request can be made to this domain
    ///
    /// This method enforces:
    /// - The cooldown after HTTP 429
    /// - Maximum requests per domain
    /// - The download delay between requests to the same domain
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration containing limits
    /// * `now` - The current time instant
    pub fn can_request(&self, config: &CrawlerConfig, now: Instant) -> bool {
        if self.is_rate_limited(now) {
            return false;
        }

        if self.has_exceeded_limit(config) {
            return false;
        }

        self.time_until_next_request(config, now).is_none()
    }

    /// Records that a request was made to this domain
    pub fn record_request(&mut self, now: Instant) {
        self.request_count += 1;
        self.last_request_time = Some(now);
    }

    /// Pauses this domain for the configured cooldown
    pub fn mark_rate_limited(&mut self, config: &CrawlerConfig, now: Instant) {
        self.rate_limited_until = Some(now + Duration::from_millis(config.rate_limit_cooldown));
    }

    /// Whether the 429 cooldown is still running at `now`
    pub fn is_rate_limited(&self, now: Instant) -> bool {
        self.rate_limited_until.is_some_and(|until| now < until)
    }

    /// Checks if this domain has exhausted its request budget
    pub fn has_exceeded_limit(&self, config: &CrawlerConfig) -> bool {
        self.request_count >= config.max_domain_requests
    }

    /// Returns the number of requests remaining for this domain
    pub fn requests_remaining(&self, config: &CrawlerConfig) -> u32 {
        config
            .max_domain_requests
            .saturating_sub(self.request_count)
    }

    /// Calculates the time until the next request can be made
    ///
    /// Covers both the download delay and a running cooldown. Returns None
    /// if a request can be made now.
    pub fn time_until_next_request(
        &self,
        config: &CrawlerConfig,
        now: Instant,
    ) -> Option<Duration> {
        let cooldown = self
            .rate_limited_until
            .filter(|until| now < *until)
            .map(|until| until - now);

        let delay = self.last_request_time.and_then(|last| {
            let min_delay = self.effective_delay(config);
            let elapsed = now.saturating_duration_since(last);
            (elapsed < min_delay).then(|| min_delay - elapsed)
        });

        match (cooldown, delay) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// The larger of the configured download delay and the robots.txt crawl delay
    pub fn effective_delay(&self, config: &CrawlerConfig) -> Duration {
        let configured = Duration::from_millis(config.download_delay);
        self.crawl_delay.map_or(configured, |delay| delay.max(configured))
    }

    /// Checks if the robots.txt cache is stale (older than 24 hours)
    pub fn is_robots_stale(&self) -> bool {
        match &self.robots_txt {
            Some(cached) => Utc::now() - cached.fetched_at > chrono::Duration::hours(24),
            None => true,
        }
    }

    /// Updates the robots.txt cache
    pub fn update_robots(&mut self, content: String) {
        self.robots_txt = Some(CachedRobots {
            content,
            fetched_at: Utc::now(),
        });
    }
}

impl Default for DomainState {
    fn default() -> Self {
        Self::new()
    }
}
