//! Headless browser collaborator
//!
//! The pipeline consumes the browser through a small capability set:
//! acquire a page, navigate it, evaluate scripts in it, release it.
//! Pages are exclusive to one conversion and must be released on every
//! exit path; `PageGuard` enforces that with an explicit async release
//! plus a Drop fallback.

mod chrome;

pub use chrome::ChromeBrowser;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::BrowserError;

/// One browser page. Exclusively owned by the conversion that acquired it.
#[async_trait]
pub trait BrowserPage: Send + Sync {
    /// Navigate and wait for the load to settle, bounded by `timeout`.
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError>;

    /// Execute a script in the page and return its JSON value.
    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError>;

    /// Close the page, releasing its browser-side resources.
    async fn close(&self) -> Result<(), BrowserError>;
}

/// Long-lived browser providing cheap page acquisition after warm-up.
#[async_trait]
pub trait Browser: Send + Sync {
    async fn acquire_page(&self) -> Result<PageGuard, BrowserError>;
}

/// RAII guard around a page.
///
/// Preferred cleanup is the explicit `release().await`, which is
/// idempotent. If a guard is dropped while still holding a page, close
/// is spawned in the background so error paths cannot leak pages.
pub struct PageGuard {
    page: Option<Box<dyn BrowserPage>>,
}

impl PageGuard {
    pub fn new(page: Box<dyn BrowserPage>) -> Self {
        Self { page: Some(page) }
    }

    pub fn is_released(&self) -> bool {
        self.page.is_none()
    }

    pub async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        match &self.page {
            Some(page) => page.navigate(url, timeout).await,
            None => Err(BrowserError::Page("page already released".to_string())),
        }
    }

    pub async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        match &self.page {
            Some(page) => page.evaluate(script).await,
            None => Err(BrowserError::Page("page already released".to_string())),
        }
    }

    /// Release the page. Safe to call more than once.
    pub async fn release(&mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                warn!(error = %e, "failed to close page");
            }
        }
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        if let Some(page) = self.page.take() {
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(e) = page.close().await {
                        tracing::debug!(error = %e, "page close during drop failed");
                    }
                });
            }
        }
    }
}
