//! Sitemap enumeration
//!
//! Fetches and parses sitemap XML. A sitemap index recurses into its
//! child sitemaps with a bounded fan-out and a hard depth cap, then
//! flattens the results. Only syntactically valid http(s) URLs survive,
//! deduplicated in first-seen order.

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use quick_xml::events::Event;
use quick_xml::reader::Reader;
use tracing::{debug, warn};
use url::Url;

use super::worker_pool::run_bounded;
use crate::error::SitemapError;

/// Sitemap-index recursion is capped; the wild web nests deeper than
/// anyone should follow.
pub const MAX_SITEMAP_DEPTH: usize = 3;

/// Concurrent child-sitemap fetches
const SUB_SITEMAP_CONCURRENCY: usize = 5;

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// A parsed sitemap document
#[derive(Debug, PartialEq)]
pub enum ParsedSitemap {
    /// `<urlset>`: page URLs
    UrlSet(Vec<String>),
    /// `<sitemapindex>`: child sitemap URLs
    Index(Vec<String>),
}

/// Parse sitemap XML into either a URL set or an index.
pub fn parse_sitemap(xml: &[u8]) -> Result<ParsedSitemap, SitemapError> {
    let mut reader = Reader::from_reader(xml);
    let mut buf = Vec::with_capacity(1024);

    let mut root: Option<String> = None;
    let mut in_loc = false;
    let mut text_buf = String::new();
    let mut locs: Vec<String> = Vec::new();

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| SitemapError::Parse(e.to_string()))?;

        match event {
            Event::Start(ref e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if root.is_none() {
                    root = Some(name);
                } else if name == "loc" {
                    in_loc = true;
                    text_buf.clear();
                }
            }
            Event::Text(ref e) => {
                if in_loc {
                    if let Ok(text) = e.unescape() {
                        text_buf.push_str(&text);
                    }
                }
            }
            Event::CData(ref e) => {
                if in_loc {
                    if let Ok(text) = String::from_utf8(e.to_vec()) {
                        text_buf.push_str(&text);
                    }
                }
            }
            Event::End(ref e) => {
                if in_loc && e.local_name().as_ref() == b"loc" {
                    let loc = text_buf.trim().to_string();
                    if !loc.is_empty() {
                        locs.push(loc);
                    }
                    in_loc = false;
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    match root.as_deref() {
        Some("urlset") => Ok(ParsedSitemap::UrlSet(locs)),
        Some("sitemapindex") => Ok(ParsedSitemap::Index(locs)),
        Some(other) => Err(SitemapError::Parse(format!(
            "unexpected root element '{}'",
            other
        ))),
        None => Err(SitemapError::Parse("no root element".to_string())),
    }
}

/// Keep syntactically valid http(s) URLs, deduplicated in first-seen
/// order.
pub fn filter_valid_urls(candidates: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut urls = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        match Url::parse(&candidate) {
            Ok(parsed) if parsed.scheme() == "http" || parsed.scheme() == "https" => {
                let normalized = parsed.to_string();
                if seen.insert(normalized.clone()) {
                    urls.push(normalized);
                }
            }
            _ => debug!(url = %candidate, "skipping invalid sitemap URL"),
        }
    }
    urls
}

/// Fetches sitemaps over HTTP and enumerates their URLs
#[derive(Clone)]
pub struct SitemapFetcher {
    client: reqwest::Client,
}

impl SitemapFetcher {
    pub fn new(user_agent: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(user_agent)
            .gzip(true)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Enumerate every page URL reachable from a sitemap, recursing
    /// through index files.
    pub async fn enumerate(&self, sitemap_url: &str) -> Result<Vec<String>, SitemapError> {
        let urls = enumerate_at_depth(self.clone(), sitemap_url.to_string(), 0).await?;
        Ok(filter_valid_urls(urls))
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, SitemapError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn enumerate_at_depth(
    fetcher: SitemapFetcher,
    url: String,
    depth: usize,
) -> Pin<Box<dyn Future<Output = Result<Vec<String>, SitemapError>> + Send>> {
    Box::pin(async move {
        let body = fetcher.fetch(&url).await?;
        match parse_sitemap(&body)? {
            ParsedSitemap::UrlSet(urls) => {
                debug!(sitemap = %url, count = urls.len(), "parsed urlset");
                Ok(urls)
            }
            ParsedSitemap::Index(children) => {
                if depth + 1 >= MAX_SITEMAP_DEPTH {
                    warn!(
                        sitemap = %url,
                        depth,
                        "sitemap index exceeds recursion cap, skipping children"
                    );
                    return Ok(Vec::new());
                }
                debug!(sitemap = %url, children = children.len(), "recursing into sitemap index");

                let outcomes = run_bounded(children, SUB_SITEMAP_CONCURRENCY, move |child| {
                    enumerate_at_depth(fetcher.clone(), child, depth + 1)
                })
                .await;

                let mut all = Vec::new();
                for outcome in outcomes {
                    match outcome {
                        Ok(Ok(urls)) => all.extend(urls),
                        Ok(Err(e)) => warn!(error = %e, "child sitemap failed"),
                        Err(failure) => warn!(error = %failure.error, "child sitemap task failed"),
                    }
                }
                Ok(all)
            }
        }
    })
}
