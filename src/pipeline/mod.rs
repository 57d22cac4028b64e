//! Single-URL conversion pipeline
//!
//! Orchestrates navigation, the dynamic-content fallback ladder,
//! cleaning, Markdown conversion, and the cache. Each ladder stage
//! acquires and releases its own page; a page is released on every exit
//! path.

pub mod cleaner;
pub mod markdown;
pub mod metadata;
pub mod rules;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{Browser, PageGuard};
use crate::cache::{fingerprint, ConversionCache};
use crate::config::PipelineConfig;
use crate::error::ConvertError;
use crate::metrics::PipelineMetrics;
use crate::types::{Artifact, ConversionOptions};
use self::rules::RulesStore;

/// Script returning the page's content richness probe
const RICHNESS_PROBE_SCRIPT: &str = r#"
(() => ({
    textLength: document.body ? (document.body.innerText || '').length : 0,
    elementCount: document.body ? document.body.querySelectorAll('*').length : 0,
}))()
"#;

/// Script scrolling to the bottom of the page for lazy-loaded content
const SCROLL_SCRIPT: &str = "window.scrollTo(0, document.body ? document.body.scrollHeight : 0)";

/// Script polled while waiting for the body to become non-empty
const BODY_LENGTH_SCRIPT: &str = "document.body ? document.body.innerHTML.length : 0";

/// Highest stage of the fallback ladder
const MAX_STAGE: u8 = 2;

/// Poll interval while waiting for the body after navigation
const BODY_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Content richness measured after navigation
#[derive(Debug, Clone, Copy, Default)]
struct RichnessProbe {
    text_length: usize,
    #[allow(dead_code)]
    element_count: usize,
}

/// The per-URL conversion pipeline. Shared across requests and jobs.
pub struct ConversionPipeline {
    browser: Arc<dyn Browser>,
    cache: Arc<ConversionCache>,
    metrics: Arc<PipelineMetrics>,
    config: PipelineConfig,
    rules: Arc<RulesStore>,
}

impl ConversionPipeline {
    pub fn new(
        browser: Arc<dyn Browser>,
        cache: Arc<ConversionCache>,
        metrics: Arc<PipelineMetrics>,
        config: PipelineConfig,
        rules: Arc<RulesStore>,
    ) -> Self {
        Self {
            browser,
            cache,
            metrics,
            config,
            rules,
        }
    }

    /// Options pre-filled from the pipeline configuration defaults.
    pub fn default_options(&self) -> ConversionOptions {
        ConversionOptions {
            aggressive_cleaning: self.config.aggressive_cleaning,
            remove_images: self.config.remove_images,
            min_content_length: self.config.min_content_length,
            scroll_wait_ms: self.config.scroll_wait_ms,
            ..ConversionOptions::default()
        }
    }

    /// Convert one URL into an artifact.
    pub async fn convert(
        &self,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<Artifact, ConvertError> {
        let url = normalize_url(url)?;
        let key = fingerprint(&url, options);
        let caching = !options.no_cache;

        if caching {
            if let Some(hit) = self.cache.get(&key).await {
                debug!(url = %url, "cache hit");
                return Ok(hit);
            }
        }

        let started = Instant::now();
        match self.run_ladder(&url, options).await {
            Ok(artifact) => {
                self.metrics.record(true, started.elapsed());
                if caching {
                    self.cache.set(&key, &artifact).await;
                }
                Ok(artifact)
            }
            Err(e) => {
                self.metrics.record(false, started.elapsed());
                if caching {
                    // Emergency fallback: a previously cached artifact
                    // beats surfacing the failure
                    if let Some(hit) = self.cache.get(&key).await {
                        warn!(url = %url, error = %e, "conversion failed, serving cached artifact");
                        return Ok(hit);
                    }
                }
                Err(e)
            }
        }
    }

    /// Run the three-stage fallback ladder. Transient errors are
    /// retried in place, preserving the current stage; the retry budget
    /// spans the whole ladder.
    async fn run_ladder(
        &self,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<Artifact, ConvertError> {
        let threshold = options.min_content_length;
        let mut retries_left = self.config.max_retries;
        let mut best: Option<String> = None;
        let mut metadata_block = String::new();

        for stage in 0..=MAX_STAGE {
            let (markdown, meta) = loop {
                match self.run_stage(stage, url, options).await {
                    Ok(output) => break output,
                    Err(e) if e.is_transient() && retries_left > 0 => {
                        retries_left -= 1;
                        warn!(
                            url = %url,
                            stage,
                            retries_left,
                            error = %e,
                            "transient error, retrying stage"
                        );
                    }
                    Err(e) => return Err(e),
                }
            };
            metadata_block = meta;

            let length = markdown.trim().len();
            if length >= threshold {
                debug!(url = %url, stage, length, "stage output accepted");
                return Ok(self.compose(url, metadata_block, markdown));
            }

            info!(
                url = %url,
                stage,
                length,
                threshold,
                "stage output below threshold"
            );
            if best.as_ref().map(|b| length > b.trim().len()).unwrap_or(true) {
                best = Some(markdown);
            }
        }

        // Ladder exhausted: accept the best-effort output
        let markdown = best.unwrap_or_default();
        Ok(self.compose(url, metadata_block, markdown))
    }

    /// Run one ladder stage on a fresh page. The page is released on
    /// every exit path.
    async fn run_stage(
        &self,
        stage: u8,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<(String, String), ConvertError> {
        let mut page = self.browser.acquire_page().await?;
        let result = self.stage_inner(stage, &page, url, options).await;
        page.release().await;
        result
    }

    async fn stage_inner(
        &self,
        stage: u8,
        page: &PageGuard,
        url: &str,
        options: &ConversionOptions,
    ) -> Result<(String, String), ConvertError> {
        self.navigate_and_wait(page, url).await?;

        let probe = self.probe_richness(page).await;
        // Stage 0 scrolls only when the page looks thin; later stages
        // always scroll before re-cleaning
        let should_scroll = match stage {
            0 => probe.text_length < options.min_content_length,
            _ => true,
        };
        if should_scroll {
            self.scroll_and_wait(page, options.scroll_wait_ms).await;
        }

        let meta = metadata::extract(page).await;
        let metadata_block = metadata::format_metadata(&meta);

        let stage_options = match stage {
            0 => options.clone(),
            1 => ConversionOptions {
                aggressive_cleaning: true,
                ..options.clone()
            },
            _ => ConversionOptions {
                aggressive_cleaning: false,
                ..options.clone()
            },
        };

        let html = cleaner::clean(page, &stage_options, &self.rules).await?;
        let markdown = markdown::to_markdown(
            &html,
            stage_options.remove_images,
            &self.rules.patterns,
        );

        Ok((markdown, metadata_block))
    }

    async fn navigate_and_wait(&self, page: &PageGuard, url: &str) -> Result<(), ConvertError> {
        let timeout = Duration::from_millis(self.config.page_timeout_ms);
        page.navigate(url, timeout).await?;

        let deadline = Instant::now() + timeout;
        loop {
            if let Ok(value) = page.evaluate(BODY_LENGTH_SCRIPT).await {
                if value.as_u64().unwrap_or(0) > 0 {
                    return Ok(());
                }
            }
            if Instant::now() >= deadline {
                return Err(ConvertError::Navigation(format!(
                    "Navigation timeout after {}ms waiting for page body",
                    self.config.page_timeout_ms
                )));
            }
            tokio::time::sleep(BODY_POLL_INTERVAL).await;
        }
    }

    async fn probe_richness(&self, page: &PageGuard) -> RichnessProbe {
        match page.evaluate(RICHNESS_PROBE_SCRIPT).await {
            Ok(value) => RichnessProbe {
                text_length: value
                    .get("textLength")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
                element_count: value
                    .get("elementCount")
                    .and_then(|v| v.as_u64())
                    .unwrap_or(0) as usize,
            },
            Err(e) => {
                warn!(error = %e, "richness probe failed");
                RichnessProbe::default()
            }
        }
    }

    async fn scroll_and_wait(&self, page: &PageGuard, wait_ms: u64) {
        if let Err(e) = page.evaluate(SCROLL_SCRIPT).await {
            warn!(error = %e, "scroll failed");
        }
        tokio::time::sleep(Duration::from_millis(wait_ms)).await;
    }

    fn compose(&self, url: &str, metadata: String, markdown: String) -> Artifact {
        Artifact {
            url: url.to_string(),
            metadata,
            markdown,
            timestamp: Utc::now(),
        }
    }
}

/// Validate a URL, prepending `https://` when the scheme is missing.
pub fn normalize_url(raw: &str) -> Result<String, ConvertError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConvertError::InvalidInput("empty URL".to_string()));
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&candidate)
        .map_err(|e| ConvertError::InvalidInput(format!("malformed URL '{}': {}", raw, e)))?;

    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return Err(ConvertError::InvalidInput(format!(
            "unsupported scheme '{}'",
            parsed.scheme()
        )));
    }
    if parsed.host_str().is_none() {
        return Err(ConvertError::InvalidInput(format!(
            "URL '{}' has no host",
            raw
        )));
    }

    Ok(parsed.to_string())
}
