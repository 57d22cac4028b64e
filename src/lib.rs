//! Sitemark: web pages to clean Markdown for LLM consumption
//!
//! A conversion service built around three parts:
//! - a per-URL pipeline: headless-browser navigation, a three-stage
//!   dynamic-content fallback ladder, DOM cleaning, and HTML→Markdown
//!   transformation
//! - a job orchestrator: bounded-concurrency batches over a sitemap or
//!   URL list, with retries, cancellation, progress webhooks, and
//!   persisted reports
//! - a layered cache: fingerprint-keyed Redis tier with an in-process
//!   LRU fallback

pub mod browser;
pub mod cache;
pub mod config;
pub mod error;
pub mod jobs;
pub mod metrics;
pub mod pipeline;
pub mod types;

pub use config::Config;
pub use types::*;
