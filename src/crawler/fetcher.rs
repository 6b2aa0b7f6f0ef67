//! HTTP fetcher implementation
//!
//! This module handles all HTTP requests for the crawler, including:
//! - Building the HTTP client (user agent, locality cookies, timeouts)
//! - GET requests with redirect following
//! - Retry logic for transient failures
//! - Error classification into page states

use crate::config::{Config, CrawlerConfig};
use crate::state::PageState;
use crate::ConfigError;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, COOKIE};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use url::Url;

/// Maximum number of redirects followed for one request
const MAX_REDIRECTS: usize = 10;

/// Result of a fetch operation
#[derive(Debug)]
pub enum FetchResult {
    /// Successfully fetched an HTML page
    Success {
        /// Final URL after redirects
        final_url: Url,
        /// HTTP status code
        status_code: u16,
        /// Content-Type header value
        content_type: String,
        /// Page body content
        body: String,
    },

    /// Page is not HTML (Content-Type mismatch)
    ContentMismatch {
        status_code: u16,
        /// The actual Content-Type received
        content_type: String,
    },

    /// HTTP 429; the caller decides whether to cool down and retry
    RateLimited { status_code: u16 },

    /// HTTP error that maps to a specific page state
    HttpError {
        /// The HTTP status code
        status_code: u16,
        /// The page state this error maps to
        state: PageState,
    },

    /// Network error (connection refused, timeout, too many redirects, etc.)
    NetworkError {
        /// Error description
        error: String,
        /// The page state this error maps to
        state: PageState,
    },
}

/// Retry settings for one fetch
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub retry_delay: Duration,
}

impl From<&CrawlerConfig> for RetryPolicy {
    fn from(config: &CrawlerConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay),
        }
    }
}

/// Builds an HTTP client with proper configuration
///
/// Every request made with the client carries:
/// - The identifying user agent `Name/Version (+ContactURL; ContactEmail)`
/// - The configured site cookies as a single `Cookie` header
///
/// # Arguments
///
/// * `config` - The full crawler configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(HarvestError)` - A cookie is not a valid header value, or the client failed to build
pub fn build_http_client(config: &Config) -> crate::Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(cookie) = config.site.cookie_header() {
        let value = HeaderValue::from_str(&cookie)
            .map_err(|e| ConfigError::Validation(format!("Invalid cookie value: {}", e)))?;
        headers.insert(COOKIE, value);
    }

    let client = Client::builder()
        .user_agent(config.user_agent.header_value())
        .default_headers(headers)
        .timeout(Duration::from_secs(config.crawler.request_timeout))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true)
        .build()?;

    Ok(client)
}

/// Fetches a URL with full error handling and retry logic
///
/// # Retry Logic
///
/// | Condition | Action |
/// |-----------|--------|
/// | HTTP 404 / 410 | Immediate → DeadLink |
/// | HTTP 429 | Immediate → RateLimited (caller cools the domain down) |
/// | Other 4xx | Immediate → Failed |
/// | HTTP 5xx | Retry up to `max_retries`, then → Failed |
/// | Timeout | Retry up to `max_retries`, then → Unreachable |
/// | Connection refused / DNS / TLS | Immediate → Unreachable |
/// | Redirect chain > 10 | Immediate → Failed |
/// | Non-HTML Content-Type | Immediate → ContentMismatch |
///
/// # Arguments
///
/// * `client` - The HTTP client to use
/// * `url` - The URL to fetch
/// * `policy` - How often and how long to wait before retrying
pub async fn fetch_url(client: &Client, url: &Url, policy: RetryPolicy) -> FetchResult {
    let mut attempt = 0;

    loop {
        let result = fetch_once(client, url).await;

        let retryable = match &result {
            FetchResult::HttpError { status_code, .. } => *status_code >= 500,
            FetchResult::NetworkError { error, .. } => error == TIMEOUT_ERROR,
            _ => false,
        };

        if !retryable || attempt >= policy.max_retries {
            return result;
        }

        attempt += 1;
        tracing::debug!(
            "Retrying {} ({}/{}) after {:?}",
            url,
            attempt,
            policy.max_retries,
            policy.retry_delay
        );
        tokio::time::sleep(policy.retry_delay).await;
    }
}

const TIMEOUT_ERROR: &str = "Request timeout";

async fn fetch_once(client: &Client, url: &Url) -> FetchResult {
    let response = match client.get(url.clone()).send().await {
        Ok(response) => response,
        Err(e) => return classify_error(&e),
    };

    let status = response.status();
    let status_code = status.as_u16();

    if status == StatusCode::NOT_FOUND || status == StatusCode::GONE {
        return FetchResult::HttpError {
            status_code,
            state: PageState::DeadLink,
        };
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        return FetchResult::RateLimited { status_code };
    }

    if !status.is_success() {
        return FetchResult::HttpError {
            status_code,
            state: PageState::Failed,
        };
    }

    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    if !is_html(&content_type) {
        return FetchResult::ContentMismatch {
            status_code,
            content_type,
        };
    }

    let final_url = response.url().clone();
    match response.text().await {
        Ok(body) => FetchResult::Success {
            final_url,
            status_code,
            content_type,
            body,
        },
        Err(e) => classify_error(&e),
    }
}

/// Whether a Content-Type names an HTML document
///
/// A missing header is given the benefit of the doubt.
fn is_html(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime.is_empty() || mime == "text/html" || mime == "application/xhtml+xml"
}

fn classify_error(e: &reqwest::Error) -> FetchResult {
    if e.is_timeout() {
        FetchResult::NetworkError {
            error: TIMEOUT_ERROR.to_string(),
            state: PageState::Unreachable,
        }
    } else if e.is_connect() {
        FetchResult::NetworkError {
            error: format!("Connection failed: {}", e),
            state: PageState::Unreachable,
        }
    } else if e.is_redirect() {
        FetchResult::NetworkError {
            error: format!("Too many redirects: {}", e),
            state: PageState::Failed,
        }
    } else {
        FetchResult::NetworkError {
            error: e.to_string(),
            state: PageState::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{LocaleConfig, OutputConfig, SiteConfig, UserAgentConfig};
    use std::collections::BTreeMap;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn create_test_config(cookies: &[(&str, &str)]) -> Config {
        Config {
            crawler: CrawlerConfig {
                max_concurrent_requests: 2,
                download_delay: 0,
                max_domain_requests: 100,
                max_retries: 2,
                retry_delay: 10,
                request_timeout: 5,
                rate_limit_cooldown: 100,
            },
            user_agent: UserAgentConfig {
                crawler_name: "TestHarvest".to_string(),
                crawler_version: "1.0".to_string(),
                contact_url: "https://example.com/about".to_string(),
                contact_email: "admin@example.com".to_string(),
            },
            site: SiteConfig {
                allowed_domains: vec!["127.0.0.1".to_string()],
                start_urls: vec![],
                obey_robots: false,
                cookies: cookies
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect::<BTreeMap<_, _>>(),
            },
            output: OutputConfig {
                database_path: "./test.db".to_string(),
                feed_path: None,
                summary_path: "./summary.md".to_string(),
            },
            locale: LocaleConfig::default(),
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_retries: 2,
            retry_delay: Duration::from_millis(10),
        }
    }

    fn url(server: &MockServer, page: &str) -> Url {
        Url::parse(&format!("{}{}", server.uri(), page)).unwrap()
    }

    #[test]
    fn test_is_html() {
        assert!(is_html("text/html; charset=utf-8"));
        assert!(is_html("TEXT/HTML"));
        assert!(is_html(""));
        assert!(!is_html("application/json"));
        assert!(!is_html("image/png"));
    }

    #[test]
    fn test_invalid_cookie_is_rejected() {
        let config = create_test_config(&[("locality", "bad\nvalue")]);
        assert!(build_http_client(&config).is_err());
    }

    #[tokio::test]
    async fn test_sends_user_agent_and_cookie() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/catalog"))
            .and(header("cookie", "city=55; locality=%7B%22city%22%3A55%7D"))
            .and(header(
                "user-agent",
                "TestHarvest/1.0 (+https://example.com/about; admin@example.com)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;

        let config = create_test_config(&[("locality", "%7B%22city%22%3A55%7D"), ("city", "55")]);
        let client = build_http_client(&config).unwrap();

        let result = fetch_url(&client, &url(&server, "/catalog"), policy()).await;
        assert!(matches!(result, FetchResult::Success { status_code: 200, .. }));
    }

    #[tokio::test]
    async fn test_dead_link() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(&[])).unwrap();
        let result = fetch_url(&client, &url(&server, "/gone"), policy()).await;
        assert!(matches!(
            result,
            FetchResult::HttpError {
                status_code: 410,
                state: PageState::DeadLink
            }
        ));
    }

    #[tokio::test]
    async fn test_server_error_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/flaky"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(&[])).unwrap();
        let result = fetch_url(&client, &url(&server, "/flaky"), policy()).await;
        assert!(matches!(
            result,
            FetchResult::HttpError {
                status_code: 503,
                state: PageState::Failed
            }
        ));
    }

    #[tokio::test]
    async fn test_rate_limited_is_not_retried_here() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/busy"))
            .respond_with(ResponseTemplate::new(429))
            .expect(1)
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(&[])).unwrap();
        let result = fetch_url(&client, &url(&server, "/busy"), policy()).await;
        assert!(matches!(result, FetchResult::RateLimited { status_code: 429 }));
    }

    #[tokio::test]
    async fn test_content_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/image.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(vec![0x89, 0x50], "image/png"))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(&[])).unwrap();
        let result = fetch_url(&client, &url(&server, "/image.png"), policy()).await;
        assert!(matches!(result, FetchResult::ContentMismatch { .. }));
    }

    #[tokio::test]
    async fn test_redirect_reports_final_url() {
        let server = MockServer::start().await;
        let location = format!("{}/new", server.uri());
        Mock::given(method("GET"))
            .and(path("/old"))
            .respond_with(ResponseTemplate::new(301).insert_header("location", location.as_str()))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/new"))
            .respond_with(ResponseTemplate::new(200).set_body_raw("<html></html>", "text/html"))
            .mount(&server)
            .await;

        let client = build_http_client(&create_test_config(&[])).unwrap();
        match fetch_url(&client, &url(&server, "/old"), policy()).await {
            FetchResult::Success { final_url, .. } => assert_eq!(final_url.path(), "/new"),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_connection_refused_is_unreachable() {
        let client = build_http_client(&create_test_config(&[])).unwrap();
        let url = Url::parse("http://127.0.0.1:9/catalog").unwrap();
        let result = fetch_url(&client, &url, policy()).await;
        assert!(matches!(
            result,
            FetchResult::NetworkError {
                state: PageState::Unreachable,
                ..
            }
        ));
    }
}
