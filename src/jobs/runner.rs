//! Batch job driver
//!
//! One driver task per job owns the job's URL state end to end:
//! enumerate the source, process fixed-size batches through a bounded
//! worker group, persist and report at every batch boundary, reconcile
//! skipped URLs, and finish with the terminal webhook. Counters are
//! always recomputed from the URL state before anything observable
//! happens.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tracing::{info, warn};

use super::report::{self, JobReport, ReportConfig, ReportSummary};
use super::sitemap::SitemapFetcher;
use super::webhook::WebhookSender;
use super::worker_pool::run_bounded;
use super::JobHandle;
use crate::pipeline::{normalize_url, ConversionPipeline};
use crate::types::{
    ConversionOptions, JobConfig, JobCounts, JobId, JobSource, JobStatus, ProcessingResult,
};

/// Synthetic failure recorded for URLs the workers never reported on
pub const SKIPPED_ERROR: &str = "URL was skipped during processing";

/// Everything the driver task needs, moved into its spawn
pub(super) struct JobContext {
    pub id: JobId,
    pub config: JobConfig,
    pub jobs: Arc<DashMap<JobId, JobHandle>>,
    pub pipeline: Arc<ConversionPipeline>,
    pub sitemaps: SitemapFetcher,
    pub webhooks: WebhookSender,
    pub reports_dir: PathBuf,
    pub cancelled: Arc<AtomicBool>,
}

pub(super) async fn run_job(ctx: JobContext) {
    let started_at = Utc::now();
    let start_instant = Instant::now();
    publish(&ctx, JobStatus::Processing, &JobCounts::default(), None, None);

    // 1. Enumerate and deduplicate the source URLs
    let urls = match enumerate_source(&ctx).await {
        Ok(urls) if !urls.is_empty() => urls,
        Ok(_) => {
            fail_job(&ctx, started_at, start_instant, "source contained no valid URLs").await;
            return;
        }
        Err(e) => {
            fail_job(&ctx, started_at, start_instant, &e).await;
            return;
        }
    };

    let total = urls.len();
    let batches: Vec<Vec<String>> = urls
        .chunks(ctx.config.batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect();
    let total_batches = batches.len();
    info!(
        job_id = %ctx.id,
        total,
        batches = total_batches,
        max_concurrent = ctx.config.max_concurrent,
        "job started"
    );

    let mut url_state: HashMap<String, ProcessingResult> = HashMap::new();

    // 3. Strictly serial batches, parallel URLs within each
    for (batch_index, batch) in batches.iter().enumerate() {
        if ctx.cancelled.load(Ordering::Relaxed) {
            finish_cancelled(
                &ctx,
                started_at,
                start_instant,
                total,
                batch_index,
                total_batches,
                &url_state,
            )
            .await;
            return;
        }

        // At-most-once: skip anything already recorded
        let work: Vec<String> = batch
            .iter()
            .filter(|url| !url_state.contains_key(*url))
            .cloned()
            .collect();

        let pipeline = Arc::clone(&ctx.pipeline);
        let options = ctx.config.options.clone();
        let retry_count = ctx.config.retry_count;
        let retry_delay_ms = ctx.config.retry_delay_ms;
        let outcomes = run_bounded(work, ctx.config.max_concurrent, move |url: String| {
            process_one(
                Arc::clone(&pipeline),
                options.clone(),
                retry_count,
                retry_delay_ms,
                url,
            )
        })
        .await;

        for outcome in outcomes {
            match outcome {
                Ok(result) => {
                    url_state.insert(result.url.clone(), result);
                }
                Err(failure) => {
                    if let Some(url) = failure.item {
                        url_state
                            .insert(url.clone(), ProcessingResult::failed(url, failure.error));
                    } else {
                        warn!(job_id = %ctx.id, error = %failure.error, "worker failed without an item");
                    }
                }
            }
        }

        let counts = recompute_counts(&url_state, total, batch_index + 1, total_batches);
        publish(&ctx, JobStatus::Processing, &counts, None, None);
        persist_state(
            &ctx,
            JobStatus::Processing,
            started_at,
            None,
            &counts,
            &url_state,
            start_instant.elapsed().as_millis() as u64,
            None,
        )
        .await;

        if let Some(webhook) = &ctx.config.webhook {
            if webhook.progress_updates {
                ctx.webhooks.send_progress(webhook, ctx.id, &counts).await;
            }
        }

        if batch_index + 1 < total_batches && ctx.config.processing_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(ctx.config.processing_delay_ms)).await;
        }
    }

    if ctx.cancelled.load(Ordering::Relaxed) {
        finish_cancelled(
            &ctx,
            started_at,
            start_instant,
            total,
            total_batches,
            total_batches,
            &url_state,
        )
        .await;
        return;
    }

    // 4. Reconcile URLs that slipped through without a result
    let skipped = reconcile_skipped(&urls, &mut url_state);
    if skipped > 0 {
        warn!(job_id = %ctx.id, skipped, "reconciled silently skipped URLs");
    }

    let counts = recompute_counts(&url_state, total, total_batches, total_batches);
    let ended_at = Utc::now();
    let elapsed_ms = start_instant.elapsed().as_millis() as u64;

    // Persist before the status flip so a status read never races a
    // missing report
    persist_state(
        &ctx,
        JobStatus::Completed,
        started_at,
        Some(ended_at),
        &counts,
        &url_state,
        elapsed_ms,
        None,
    )
    .await;
    publish(&ctx, JobStatus::Completed, &counts, Some(ended_at), None);

    if let Some(webhook) = &ctx.config.webhook {
        let results = sorted_results(&url_state);
        ctx.webhooks
            .send_final(webhook, ctx.id, JobStatus::Completed, &counts, &results, elapsed_ms)
            .await;
    }

    info!(
        job_id = %ctx.id,
        total = counts.total,
        success = counts.success,
        failed = counts.failed,
        elapsed_ms,
        "job completed"
    );
}

/// Convert one URL, re-invoking the pipeline up to `retry_count` times
/// on failure. The final outcome replaces any earlier one.
async fn process_one(
    pipeline: Arc<ConversionPipeline>,
    options: ConversionOptions,
    retry_count: u32,
    retry_delay_ms: u64,
    url: String,
) -> ProcessingResult {
    let mut attempt = 0u32;
    loop {
        match pipeline.convert(&url, &options).await {
            Ok(artifact) => return ProcessingResult::ok(&artifact),
            Err(e) if attempt < retry_count => {
                attempt += 1;
                warn!(url = %url, attempt, error = %e, "conversion failed, retrying URL");
                if retry_delay_ms > 0 {
                    tokio::time::sleep(Duration::from_millis(retry_delay_ms)).await;
                }
            }
            Err(e) => return ProcessingResult::failed(url, e.to_string()),
        }
    }
}

/// Enumerate, validate, and deduplicate the job's source URLs.
async fn enumerate_source(ctx: &JobContext) -> Result<Vec<String>, String> {
    match &ctx.config.source {
        JobSource::Sitemap { url } => ctx
            .sitemaps
            .enumerate(url)
            .await
            .map_err(|e| e.to_string()),
        JobSource::Urls { urls } => {
            let mut seen: HashSet<String> = HashSet::new();
            let mut out = Vec::with_capacity(urls.len());
            for raw in urls {
                match normalize_url(raw) {
                    Ok(url) => {
                        if seen.insert(url.clone()) {
                            out.push(url);
                        }
                    }
                    Err(e) => warn!(url = %raw, error = %e, "skipping invalid URL"),
                }
            }
            Ok(out)
        }
    }
}

/// Recompute the job counters from the URL state. `processed` is
/// derived, never incremented, so it cannot drift from the state map.
pub(crate) fn recompute_counts(
    url_state: &HashMap<String, ProcessingResult>,
    total: usize,
    current_batch: usize,
    total_batches: usize,
) -> JobCounts {
    let processed = url_state.len();
    let success = url_state.values().filter(|r| r.success).count();
    JobCounts {
        total,
        processed,
        success,
        failed: processed - success,
        current_batch,
        total_batches,
    }
}

/// Insert a synthetic failure for every enumerated URL missing from the
/// state map. Returns how many were inserted.
pub(crate) fn reconcile_skipped(
    urls: &[String],
    url_state: &mut HashMap<String, ProcessingResult>,
) -> usize {
    let mut inserted = 0;
    for url in urls {
        if !url_state.contains_key(url) {
            url_state.insert(
                url.clone(),
                ProcessingResult::failed(url.clone(), SKIPPED_ERROR),
            );
            inserted += 1;
        }
    }
    inserted
}

fn sorted_results(url_state: &HashMap<String, ProcessingResult>) -> Vec<ProcessingResult> {
    let mut results: Vec<ProcessingResult> = url_state.values().cloned().collect();
    results.sort_by(|a, b| a.url.cmp(&b.url));
    results
}

/// Update the externally visible job handle. A cancelled status is
/// never overwritten by a non-cancelled one.
fn publish(
    ctx: &JobContext,
    status: JobStatus,
    counts: &JobCounts,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
) {
    if let Some(mut handle) = ctx.jobs.get_mut(&ctx.id) {
        if handle.status != JobStatus::Cancelled || status == JobStatus::Cancelled {
            handle.status = status;
        }
        handle.counts = *counts;
        if ended_at.is_some() {
            handle.ended_at = ended_at;
            handle.completed_at = Some(Instant::now());
        }
        if error.is_some() {
            handle.error = error;
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn persist_state(
    ctx: &JobContext,
    status: JobStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
    counts: &JobCounts,
    url_state: &HashMap<String, ProcessingResult>,
    elapsed_ms: u64,
    error: Option<String>,
) {
    let report = JobReport {
        id: ctx.id,
        status,
        start_time: started_at,
        end_time: ended_at,
        duration: ended_at.map(|e| (e - started_at).num_milliseconds().max(0) as u64),
        config: ReportConfig {
            source: ctx.config.source.clone(),
            batch_size: ctx.config.batch_size,
            max_concurrent: ctx.config.max_concurrent,
            retry_count: ctx.config.retry_count,
        },
        summary: ReportSummary::from_counts(counts, elapsed_ms),
        results: sorted_results(url_state),
        error,
    };
    if let Err(e) = report::persist(&ctx.reports_dir, &report).await {
        warn!(job_id = %ctx.id, error = %e, "failed to persist job report");
    }
}

/// Cancelled: final persist, counts from state, no final webhook.
async fn finish_cancelled(
    ctx: &JobContext,
    started_at: DateTime<Utc>,
    start_instant: Instant,
    total: usize,
    current_batch: usize,
    total_batches: usize,
    url_state: &HashMap<String, ProcessingResult>,
) {
    let counts = recompute_counts(url_state, total, current_batch, total_batches);
    let ended_at = Utc::now();
    persist_state(
        ctx,
        JobStatus::Cancelled,
        started_at,
        Some(ended_at),
        &counts,
        url_state,
        start_instant.elapsed().as_millis() as u64,
        None,
    )
    .await;
    publish(ctx, JobStatus::Cancelled, &counts, Some(ended_at), None);
    info!(job_id = %ctx.id, processed = counts.processed, "job cancelled");
}

/// Failed before processing: persist, report through the final webhook.
async fn fail_job(ctx: &JobContext, started_at: DateTime<Utc>, start_instant: Instant, error: &str) {
    let counts = JobCounts::default();
    let ended_at = Utc::now();
    let elapsed_ms = start_instant.elapsed().as_millis() as u64;
    persist_state(
        ctx,
        JobStatus::Failed,
        started_at,
        Some(ended_at),
        &counts,
        &HashMap::new(),
        elapsed_ms,
        Some(error.to_string()),
    )
    .await;
    publish(
        ctx,
        JobStatus::Failed,
        &counts,
        Some(ended_at),
        Some(error.to_string()),
    );
    if let Some(webhook) = &ctx.config.webhook {
        ctx.webhooks
            .send_final(webhook, ctx.id, JobStatus::Failed, &counts, &[], elapsed_ms)
            .await;
    }
    warn!(job_id = %ctx.id, error, "job failed");
}
