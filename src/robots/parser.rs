//! robots.txt rules backed by the robotstxt crate

use robotstxt::DefaultMatcher;

/// The robots.txt rules of one shop host
#[derive(Debug, Clone, Default)]
pub struct ParsedRobots {
    /// Raw robots.txt body; empty means everything is allowed
    content: String,
}

impl ParsedRobots {
    /// Wraps a robots.txt body
    pub fn from_content(content: &str) -> Self {
        Self {
            content: content.to_string(),
        }
    }

    /// Rules that allow every path, used when no robots.txt is available
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// The raw robots.txt body
    pub fn content(&self) -> &str {
        &self.content
    }

    /// Checks whether `url` may be fetched by `agent`
    ///
    /// # Arguments
    ///
    /// * `url` - The absolute URL to check
    /// * `agent` - The crawler's product token (e.g. "CatalogHarvest")
    pub fn is_allowed(&self, url: &str, agent: &str) -> bool {
        if self.content.trim().is_empty() {
            return true;
        }

        let mut matcher = DefaultMatcher::default();
        matcher.one_agent_allowed_by_robots(&self.content, agent, url)
    }

    /// The `Crawl-delay` for `agent`, in seconds
    ///
    /// A group naming the agent wins over the `*` group.
    pub fn crawl_delay(&self, agent: &str) -> Option<f64> {
        let agent = agent.to_lowercase();
        let mut group: Vec<String> = Vec::new();
        let mut in_rules = false;
        let mut wildcard = None;
        let mut specific = None;

        for line in self.content.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            let Some((key, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();

            match key.trim().to_lowercase().as_str() {
                "user-agent" => {
                    if in_rules {
                        group.clear();
                        in_rules = false;
                    }
                    group.push(value.to_lowercase());
                }
                "crawl-delay" => {
                    in_rules = true;
                    let Ok(delay) = value.parse::<f64>() else {
                        continue;
                    };
                    if group.iter().any(|ua| ua != "*" && agent.contains(ua.as_str())) {
                        specific = Some(delay);
                    } else if group.iter().any(|ua| ua == "*") {
                        wildcard = Some(delay);
                    }
                }
                _ => in_rules = true,
            }
        }

        specific.or(wildcard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const AGENT: &str = "CatalogHarvest";

    #[test]
    fn test_allow_all() {
        let robots = ParsedRobots::allow_all();
        assert!(robots.is_allowed("https://shop.example.com/cart", AGENT));
    }

    #[test]
    fn test_disallow_specific_path() {
        let robots = ParsedRobots::from_content("User-agent: *\nDisallow: /cart\nDisallow: /personal");
        assert!(robots.is_allowed("https://shop.example.com/catalog/soap", AGENT));
        assert!(!robots.is_allowed("https://shop.example.com/cart", AGENT));
        assert!(!robots.is_allowed("https://shop.example.com/personal/orders", AGENT));
    }

    #[test]
    fn test_specific_agent_group() {
        let robots = ParsedRobots::from_content(
            "User-agent: CatalogHarvest\nDisallow: /\n\nUser-agent: *\nAllow: /",
        );
        assert!(!robots.is_allowed("https://shop.example.com/catalog", AGENT));
        assert!(robots.is_allowed("https://shop.example.com/catalog", "OtherBot"));
    }

    #[test]
    fn test_garbage_allows_everything() {
        let robots = ParsedRobots::from_content("<html>not a robots file</html>");
        assert!(robots.is_allowed("https://shop.example.com/catalog", AGENT));
    }

    #[test]
    fn test_crawl_delay() {
        let robots = ParsedRobots::from_content(
            "User-agent: CatalogHarvest\nCrawl-delay: 2.5\n\nUser-agent: *\nCrawl-delay: 10\nDisallow: /cart",
        );
        assert_eq!(robots.crawl_delay(AGENT), Some(2.5));
        assert_eq!(robots.crawl_delay("OtherBot"), Some(10.0));
        assert_eq!(ParsedRobots::allow_all().crawl_delay(AGENT), None);
    }

    #[test]
    fn test_crawl_delay_shared_group() {
        let robots = ParsedRobots::from_content("User-agent: BotA\nUser-agent: BotB\nCrawl-delay: 3");
        assert_eq!(robots.crawl_delay("BotB"), Some(3.0));
        assert_eq!(robots.crawl_delay("BotC"), None);
    }
}
