//! Robots.txt handling module
//!
//! Only consulted when `obey-robots = true`. The parsed rules are cached per
//! domain in [`DomainState`](crate::state::DomainState) for 24 hours.

mod parser;

pub use parser::ParsedRobots;

use reqwest::Client;
use tracing::{debug, warn};
use url::Url;

/// Fetches robots.txt for the host of `page_url`
///
/// A missing file (4xx) means no restrictions. A server error or a network
/// failure is logged and also treated as no restrictions, so an unreachable
/// robots.txt never blocks the crawl.
///
/// # Arguments
///
/// * `client` - The crawler's HTTP client (carries user agent and cookies)
/// * `page_url` - Any URL on the host whose robots.txt is wanted
pub async fn fetch_robots(client: &Client, page_url: &Url) -> ParsedRobots {
    let Ok(robots_url) = page_url.join("/robots.txt") else {
        return ParsedRobots::allow_all();
    };

    match client.get(robots_url.clone()).send().await {
        Ok(response) if response.status().is_success() => match response.text().await {
            Ok(body) => {
                debug!("Fetched {}", robots_url);
                ParsedRobots::from_content(&body)
            }
            Err(e) => {
                warn!("Failed to read {}: {}", robots_url, e);
                ParsedRobots::allow_all()
            }
        },
        Ok(response) => {
            debug!("{} returned {}", robots_url, response.status());
            ParsedRobots::allow_all()
        }
        Err(e) => {
            warn!("Failed to fetch {}: {}", robots_url, e);
            ParsedRobots::allow_all()
        }
    }
}

/// Checks if a URL is allowed by robots.txt
pub fn is_allowed(robots: &ParsedRobots, url: &Url, agent: &str) -> bool {
    robots.is_allowed(url.as_str(), agent)
}
