//! Error types for the conversion pipeline and its collaborators

use std::time::Duration;

use thiserror::Error;

/// Errors surfaced by the single-URL conversion pipeline
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("cleaning failed: {0}")]
    Cleaning(String),
    #[error("markdown conversion failed: {0}")]
    Converter(String),
    #[error("cache error: {0}")]
    Cache(String),
    #[error("webhook error: {0}")]
    Webhook(String),
    #[error("cancelled")]
    Cancelled,
}

impl ConvertError {
    /// Transient errors are retried in place, preserving the current
    /// fallback stage. Matches browser-level failures by message: CDP
    /// network errors ("net::ERR_*"), navigation timeouts, and protocol
    /// errors.
    pub fn is_transient(&self) -> bool {
        match self {
            ConvertError::Navigation(msg) | ConvertError::Converter(msg) => {
                msg.contains("net::")
                    || msg.contains("Navigation timeout")
                    || msg.contains("Protocol error")
            }
            _ => false,
        }
    }
}

/// Errors from the headless browser collaborator
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("failed to launch browser: {0}")]
    Launch(String),
    #[error("failed to open page: {0}")]
    Page(String),
    #[error("navigation failed: {0}")]
    Navigation(String),
    #[error("Navigation timeout after {}ms", .0.as_millis())]
    NavigationTimeout(Duration),
    #[error("script evaluation failed: {0}")]
    Evaluate(String),
    #[error("failed to close page: {0}")]
    Close(String),
}

impl From<BrowserError> for ConvertError {
    fn from(e: BrowserError) -> Self {
        match e {
            BrowserError::Evaluate(_) => ConvertError::Cleaning(e.to_string()),
            other => ConvertError::Navigation(other.to_string()),
        }
    }
}

/// Errors from the cache tiers. These never fail a conversion: callers
/// log them and treat the operation as a miss/no-op.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("failed to connect to cache: {0}")]
    Connect(String),
    #[error("cache probe failed: {0}")]
    Probe(String),
    #[error("cache operation failed: {0}")]
    Operation(String),
    #[error("failed to encode cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Errors from sitemap enumeration
#[derive(Debug, Error)]
pub enum SitemapError {
    #[error("failed to fetch sitemap: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("failed to parse sitemap XML: {0}")]
    Parse(String),
}

/// Errors from webhook delivery. Logged, never alter job state.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("webhook returned status {0}")]
    Status(u16),
}
