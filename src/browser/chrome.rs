//! Chromium-backed browser implementation
//!
//! Wraps chromiumoxide: one long-lived browser process, one CDP page
//! per conversion. The event handler loop runs on its own task for the
//! lifetime of the browser.

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use futures::StreamExt;
use serde_json::Value;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Browser, BrowserPage, PageGuard};
use crate::error::BrowserError;

/// Shared headless Chromium instance
pub struct ChromeBrowser {
    browser: chromiumoxide::Browser,
    handler_task: JoinHandle<()>,
}

impl ChromeBrowser {
    /// Launch a headless browser and start its event loop.
    pub async fn launch(user_agent: &str) -> Result<Self, BrowserError> {
        let config = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", user_agent))
            .build()
            .map_err(BrowserError::Launch)?;

        let (browser, mut handler) = chromiumoxide::Browser::launch(config)
            .await
            .map_err(|e| BrowserError::Launch(e.to_string()))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!(error = %e, "browser handler event error");
                }
            }
        });

        info!("headless browser launched");
        Ok(Self {
            browser,
            handler_task,
        })
    }

    /// Shut the browser down and stop its event loop.
    pub async fn shutdown(mut self) {
        if let Err(e) = self.browser.close().await {
            debug!(error = %e, "browser close failed");
        }
        self.handler_task.abort();
    }
}

#[async_trait]
impl Browser for ChromeBrowser {
    async fn acquire_page(&self) -> Result<PageGuard, BrowserError> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| BrowserError::Page(e.to_string()))?;
        Ok(PageGuard::new(Box::new(ChromePage { page })))
    }
}

struct ChromePage {
    page: chromiumoxide::Page,
}

#[async_trait]
impl BrowserPage for ChromePage {
    async fn navigate(&self, url: &str, timeout: Duration) -> Result<(), BrowserError> {
        let navigation = async {
            self.page.goto(url).await?;
            self.page.wait_for_navigation().await?;
            Ok::<(), chromiumoxide::error::CdpError>(())
        };

        match tokio::time::timeout(timeout, navigation).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(BrowserError::Navigation(e.to_string())),
            Err(_) => Err(BrowserError::NavigationTimeout(timeout)),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| BrowserError::Evaluate(e.to_string()))?;
        // Scripts yielding undefined deserialize to null
        Ok(result.into_value().unwrap_or(Value::Null))
    }

    async fn close(&self) -> Result<(), BrowserError> {
        self.page
            .clone()
            .close()
            .await
            .map_err(|e| BrowserError::Close(e.to_string()))
    }
}
