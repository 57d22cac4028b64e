//! Shared test fixtures: a scripted browser and a webhook sink.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;

use sitemark::browser::{Browser, BrowserPage, PageGuard};
use sitemark::cache::ConversionCache;
use sitemark::config::{PipelineConfig, DEFAULT_USER_AGENT};
use sitemark::error::BrowserError;
use sitemark::metrics::PipelineMetrics;
use sitemark::pipeline::{rules::RulesStore, ConversionPipeline};

/// What one acquired page serves
#[derive(Debug, Clone)]
pub struct PageScript {
    pub html: String,
    pub text_length: usize,
}

impl PageScript {
    pub fn with_text(len: usize) -> Self {
        let html = format!("<p>{}</p>", "x".repeat(len));
        Self {
            html,
            text_length: len,
        }
    }

    pub fn with_html(html: impl Into<String>) -> Self {
        let html = html.into();
        let text_length = html.len();
        Self { html, text_length }
    }
}

/// Scripted browser: the Nth acquired page serves the Nth script (the
/// last one repeats), and every navigation is counted.
pub struct FakeBrowser {
    scripts: Vec<PageScript>,
    pub navigations: Arc<AtomicUsize>,
    pages_acquired: AtomicUsize,
    /// Fail the first N navigations with this message
    nav_failures: AtomicUsize,
    nav_failure_message: String,
    /// Delay applied to every navigation
    nav_delay: Duration,
}

impl FakeBrowser {
    pub fn new(scripts: Vec<PageScript>) -> Self {
        Self {
            scripts,
            navigations: Arc::new(AtomicUsize::new(0)),
            pages_acquired: AtomicUsize::new(0),
            nav_failures: AtomicUsize::new(0),
            nav_failure_message: String::new(),
            nav_delay: Duration::ZERO,
        }
    }

    pub fn single_page(script: PageScript) -> Self {
        Self::new(vec![script])
    }

    pub fn failing_navigations(mut self, count: usize, message: &str) -> Self {
        self.nav_failures = AtomicUsize::new(count);
        self.nav_failure_message = message.to_string();
        self
    }

    pub fn with_nav_delay(mut self, delay: Duration) -> Self {
        self.nav_delay = delay;
        self
    }

    pub fn navigation_count(&self) -> usize {
        self.navigations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Browser for FakeBrowser {
    async fn acquire_page(&self) -> Result<PageGuard, BrowserError> {
        let index = self.pages_acquired.fetch_add(1, Ordering::SeqCst);
        let script = self
            .scripts
            .get(index.min(self.scripts.len().saturating_sub(1)))
            .cloned()
            .unwrap_or_else(|| PageScript::with_html("<p>empty</p>"));

        let fail_navigation = {
            let remaining = self.nav_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.nav_failures.store(remaining - 1, Ordering::SeqCst);
                Some(self.nav_failure_message.clone())
            } else {
                None
            }
        };

        Ok(PageGuard::new(Box::new(FakePage {
            script,
            navigations: Arc::clone(&self.navigations),
            fail_navigation,
            nav_delay: self.nav_delay,
        })))
    }
}

struct FakePage {
    script: PageScript,
    navigations: Arc<AtomicUsize>,
    fail_navigation: Option<String>,
    nav_delay: Duration,
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, _url: &str, _timeout: Duration) -> Result<(), BrowserError> {
        self.navigations.fetch_add(1, Ordering::SeqCst);
        if !self.nav_delay.is_zero() {
            tokio::time::sleep(self.nav_delay).await;
        }
        match &self.fail_navigation {
            Some(message) => Err(BrowserError::Navigation(message.clone())),
            None => Ok(()),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<Value, BrowserError> {
        // Dispatch on distinctive fragments of the pipeline's scripts
        if script.contains("innerHTML.length") {
            return Ok(json!(self.script.html.len()));
        }
        if script.contains("textLength") {
            return Ok(json!({
                "textLength": self.script.text_length,
                "elementCount": 10,
            }));
        }
        if script.contains("scrollTo") {
            return Ok(Value::Null);
        }
        if script.contains("og:title") {
            return Ok(json!({
                "title": "Fixture Page",
                "description": "A page served by the fake browser",
                "author": null,
                "published": null,
                "language": "en",
                "canonical": null,
                "site_name": null,
            }));
        }
        if script.contains("removeEl")
            || script.contains("outerHTML")
            || script.contains("holdsImage")
        {
            return Ok(json!(0));
        }
        if script.contains("innerHTML") {
            return Ok(Value::String(self.script.html.clone()));
        }
        Ok(Value::Null)
    }

    async fn close(&self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Pipeline over a fake browser and an in-process cache.
pub fn test_pipeline(browser: Arc<FakeBrowser>) -> ConversionPipeline {
    let config = PipelineConfig {
        max_retries: 2,
        page_timeout_ms: 5_000,
        min_content_length: 500,
        scroll_wait_ms: 1,
        aggressive_cleaning: true,
        remove_images: false,
        rules_path: None,
        user_agent: DEFAULT_USER_AGENT.to_string(),
    };
    ConversionPipeline::new(
        browser,
        Arc::new(ConversionCache::in_memory(3_600_000)),
        PipelineMetrics::shared(),
        config,
        Arc::new(RulesStore::defaults()),
    )
}

/// Minimal HTTP sink recording every JSON payload POSTed to it.
pub async fn spawn_webhook_sink() -> (String, Arc<Mutex<Vec<Value>>>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind webhook sink");
    let addr = listener.local_addr().expect("sink addr");
    let received: Arc<Mutex<Vec<Value>>> = Arc::new(Mutex::new(Vec::new()));

    let store = Arc::clone(&received);
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let store = Arc::clone(&store);
            tokio::spawn(handle_sink_connection(socket, store));
        }
    });

    (format!("http://{}/hook", addr), received)
}

async fn handle_sink_connection(
    mut socket: tokio::net::TcpStream,
    store: Arc<Mutex<Vec<Value>>>,
) {
    let mut buf: Vec<u8> = Vec::new();
    let mut tmp = [0u8; 4096];

    let (body_start, content_length) = loop {
        let Ok(n) = socket.read(&mut tmp).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&tmp[..n]);
        if let Some(pos) = find_subsequence(&buf, b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..pos]).to_string();
            let content_length = headers
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            break (pos + 4, content_length);
        }
    };

    while buf.len() < body_start + content_length {
        let Ok(n) = socket.read(&mut tmp).await else {
            break;
        };
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }

    if buf.len() >= body_start + content_length {
        if let Ok(value) = serde_json::from_slice(&buf[body_start..body_start + content_length]) {
            store.lock().await.push(value);
        }
    }

    let _ = socket
        .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
        .await;
    let _ = socket.shutdown().await;
}

fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
