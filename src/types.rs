//! Core data model: conversion options, artifacts, and job types

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique, time-ordered job identifier
pub type JobId = Uuid;

/// Options controlling a single conversion. Frozen per request; every
/// field is defaulted at creation so nothing downstream distinguishes
/// absent from default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversionOptions {
    /// CSS selectors isolating the content area, applied in order
    pub target_selectors: Vec<String>,
    /// CSS selectors removed from the page, applied in order
    pub remove_selectors: Vec<String>,
    /// Run the full DOM cleaning pipeline (false = raw body)
    pub aggressive_cleaning: bool,
    /// Drop images instead of preserving them through cleaning
    pub remove_images: bool,
    /// Minimum Markdown length before the fallback ladder escalates
    pub min_content_length: usize,
    /// Wait after scrolling for lazy content to load (ms)
    pub scroll_wait_ms: u64,
    /// Bypass the cache for this request (read and write)
    pub no_cache: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            target_selectors: Vec::new(),
            remove_selectors: Vec::new(),
            aggressive_cleaning: true,
            remove_images: false,
            min_content_length: 500,
            scroll_wait_ms: 200,
            no_cache: false,
        }
    }
}

/// The final composed record for one URL
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub url: String,
    /// Formatted metadata block ("Title: ...", "Description: ...")
    pub metadata: String,
    pub markdown: String,
    pub timestamp: DateTime<Utc>,
}

impl Artifact {
    /// Render the full document: header block, metadata, separator, body.
    pub fn document(&self) -> String {
        format!(
            "URL: {}\n\n{}\n\n---\n\n{}",
            self.url, self.metadata, self.markdown
        )
    }
}

/// Job lifecycle status. Terminal on the first of completed, failed,
/// or cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of processing one URL within a job. Exactly one per URL per
/// job; replaced wholesale on retry, never appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub url: String,
    pub success: bool,
    pub markdown: Option<String>,
    pub metadata: Option<String>,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn ok(artifact: &Artifact) -> Self {
        Self {
            url: artifact.url.clone(),
            success: true,
            markdown: Some(artifact.markdown.clone()),
            metadata: Some(artifact.metadata.clone()),
            error: None,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(url: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            success: false,
            markdown: None,
            metadata: None,
            error: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

/// Webhook destination and payload decoration for a job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSpec {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Arbitrary key-values merged into every payload
    #[serde(default)]
    pub extra_fields: serde_json::Map<String, serde_json::Value>,
    /// Emit a progress webhook after every batch
    #[serde(default)]
    pub progress_updates: bool,
}

impl WebhookSpec {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::new(),
            extra_fields: serde_json::Map::new(),
            progress_updates: false,
        }
    }
}

/// Where a job's URLs come from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobSource {
    Sitemap { url: String },
    Urls { urls: Vec<String> },
}

/// Frozen configuration for a batch job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub source: JobSource,
    pub options: ConversionOptions,
    pub max_concurrent: usize,
    pub batch_size: usize,
    pub processing_delay_ms: u64,
    /// Full pipeline re-invocations for a failed URL
    pub retry_count: u32,
    pub retry_delay_ms: u64,
    pub webhook: Option<WebhookSpec>,
}

/// Aggregate counters for a job, always recomputed from its URL state
/// before any externally observable event.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct JobCounts {
    pub total: usize,
    pub processed: usize,
    pub success: usize,
    pub failed: usize,
    pub current_batch: usize,
    pub total_batches: usize,
}
