//! Page state and page kind definitions for tracking crawl progress
use std::fmt;

/// What a queued page is expected to be, decided when it is discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageKind {
    /// A category listing or one of its pagination pages
    Listing,

    /// A single product page
    Product,
}

impl PageKind {
    /// Converts the page kind to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Listing => "listing",
            Self::Product => "product",
        }
    }

    /// Parses a page kind from its database string representation
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "listing" => Some(Self::Listing),
            "product" => Some(Self::Product),
            _ => None,
        }
    }

    /// Frontier priority for pages of this kind
    ///
    /// Products are drained before further listing pages are opened, which
    /// keeps the frontier short on large catalogs.
    pub fn default_priority(&self) -> i32 {
        match self {
            Self::Listing => 10,
            Self::Product => 0,
        }
    }
}

impl fmt::Display for PageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Represents the current state of a page in the crawl process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PageState {
    // ===== Active States =====
    /// Page has been discovered but not yet queued for fetching
    Discovered,

    /// Page is queued and waiting to be fetched
    Queued,

    /// Page is currently being fetched
    Fetching,

    // ===== Terminal Success States =====
    /// Page was fetched and handed to its handler
    Processed,

    // ===== Terminal Error States =====
    /// Page returned HTTP 404 or 410
    DeadLink,

    /// Page could not be reached (connection refused, DNS failure, TLS error)
    Unreachable,

    /// Page kept returning HTTP 429 after every retry
    RateLimited,

    /// Page fetch or extraction failed for other reasons
    Failed,

    // ===== Special States =====
    /// Domain has hit the maximum request limit
    RequestLimitHit,

    /// Page Content-Type is not HTML
    ContentMismatch,

    /// robots.txt disallows the page
    RobotsDenied,
}

impl PageState {
    /// Returns true if this is a terminal state (no further processing needed)
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }

    /// Returns true if this is an active state (page may still be processed)
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Discovered | Self::Queued | Self::Fetching)
    }

    /// Returns true if this represents a successful completion
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Processed)
    }

    /// Returns true if this represents an error state
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::DeadLink
                | Self::Unreachable
                | Self::RateLimited
                | Self::Failed
                | Self::RequestLimitHit
                | Self::ContentMismatch
                | Self::RobotsDenied
        )
    }

    /// Converts the page state to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Discovered => "discovered",
            Self::Queued => "queued",
            Self::Fetching => "fetching",
            Self::Processed => "processed",
            Self::DeadLink => "dead_link",
            Self::Unreachable => "unreachable",
            Self::RateLimited => "rate_limited",
            Self::Failed => "failed",
            Self::RequestLimitHit => "request_limit_hit",
            Self::ContentMismatch => "content_mismatch",
            Self::RobotsDenied => "robots_denied",
        }
    }

    /// Parses a page state from a database string representation
    ///
    /// Returns None if the string doesn't match any known state.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "discovered" => Some(Self::Discovered),
            "queued" => Some(Self::Queued),
            "fetching" => Some(Self::Fetching),
            "processed" => Some(Self::Processed),
            "dead_link" => Some(Self::DeadLink),
            "unreachable" => Some(Self::Unreachable),
            "rate_limited" => Some(Self::RateLimited),
            "failed" => Some(Self::Failed),
            "request_limit_hit" => Some(Self::RequestLimitHit),
            "content_mismatch" => Some(Self::ContentMismatch),
            "robots_denied" => Some(Self::RobotsDenied),
            _ => None,
        }
    }

    /// Returns all possible page states
    pub fn all_states() -> Vec<Self> {
        vec![
            Self::Discovered,
            Self::Queued,
            Self::Fetching,
            Self::Processed,
            Self::DeadLink,
            Self::Unreachable,
            Self::RateLimited,
            Self::Failed,
            Self::RequestLimitHit,
            Self::ContentMismatch,
            Self::RobotsDenied,
        ]
    }
}

impl fmt::Display for PageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
