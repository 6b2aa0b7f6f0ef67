use serde::Deserialize;
use std::collections::BTreeMap;

/// Main configuration structure for Catalog-Harvest
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub crawler: CrawlerConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub site: SiteConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub locale: LocaleConfig,
}

/// Crawler behavior configuration
#[derive(Debug, Clone, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum number of requests in flight at once
    #[serde(rename = "max-concurrent-requests")]
    pub max_concurrent_requests: u32,

    /// Minimum time between requests to the same domain (milliseconds)
    #[serde(rename = "download-delay", default)]
    pub download_delay: u64,

    /// Maximum number of requests per domain
    #[serde(rename = "max-domain-requests")]
    pub max_domain_requests: u32,

    /// Retries for server errors, timeouts and HTTP 429
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Pause before a retry (milliseconds)
    #[serde(rename = "retry-delay", default = "default_retry_delay")]
    pub retry_delay: u64,

    /// Whole-request timeout (seconds)
    #[serde(rename = "request-timeout", default = "default_request_timeout")]
    pub request_timeout: u64,

    /// How long a domain is paused after HTTP 429 (milliseconds)
    #[serde(rename = "rate-limit-cooldown", default = "default_rate_limit_cooldown")]
    pub rate_limit_cooldown: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_rate_limit_cooldown() -> u64 {
    60_000
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

impl UserAgentConfig {
    /// Formats the header value: `Name/Version (+ContactURL; ContactEmail)`
    pub fn header_value(&self) -> String {
        format!(
            "{}/{} (+{}; {})",
            self.crawler_name, self.crawler_version, self.contact_url, self.contact_email
        )
    }
}

/// The shop being harvested
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Domain patterns requests may go to (e.g., "shop.com" or "*.shop.com")
    #[serde(rename = "allowed-domains")]
    pub allowed_domains: Vec<String>,

    /// Category listing pages the crawl starts from, in order
    #[serde(rename = "start-urls")]
    pub start_urls: Vec<String>,

    /// Whether robots.txt is consulted before fetching
    #[serde(rename = "obey-robots", default)]
    pub obey_robots: bool,

    /// Cookies sent with every request (values are sent verbatim)
    #[serde(default)]
    pub cookies: BTreeMap<String, String>,
}

impl SiteConfig {
    /// Builds a `Cookie` header value, or None when no cookies are configured
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    /// Path to the SQLite database file
    #[serde(rename = "database-path")]
    pub database_path: String,

    /// Path to the JSON Lines product feed
    #[serde(rename = "feed-path", default)]
    pub feed_path: Option<String>,

    /// Path to the markdown summary file
    #[serde(rename = "summary-path")]
    pub summary_path: String,
}

/// Presentation strings baked into product records
#[derive(Debug, Clone, Deserialize)]
pub struct LocaleConfig {
    /// Word placed before the discount percentage
    #[serde(rename = "discount-prefix", default = "default_discount_prefix")]
    pub discount_prefix: String,

    /// Main image value when a product has no picture
    #[serde(rename = "missing-image", default = "default_missing_image")]
    pub missing_image: String,
}

fn default_discount_prefix() -> String {
    "Discount".to_string()
}

fn default_missing_image() -> String {
    "No image".to_string()
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            discount_prefix: default_discount_prefix(),
            missing_image: default_missing_image(),
        }
    }
}
