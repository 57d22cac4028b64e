//! Background job orchestration
//!
//! `JobManager` creates, tracks, and cancels batch conversion jobs.
//! Creation returns immediately; a spawned driver task owns the job's
//! state and publishes snapshots into the shared job table.

pub mod report;
pub mod runner;
pub mod sitemap;
pub mod webhook;
pub mod worker_pool;

pub use runner::SKIPPED_ERROR;
pub use sitemap::SitemapFetcher;
pub use webhook::WebhookSender;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::config::JobDefaults;
use crate::pipeline::ConversionPipeline;
use crate::types::{
    ConversionOptions, JobConfig, JobCounts, JobId, JobSource, JobStatus, WebhookSpec,
};

/// How long terminal jobs stay in the table before cleanup
const JOB_RETENTION: Duration = Duration::from_secs(3600);

/// Externally visible state of one job
pub struct JobHandle {
    pub id: JobId,
    pub status: JobStatus,
    pub counts: JobCounts,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub(crate) completed_at: Option<Instant>,
    pub(crate) cancelled: Arc<AtomicBool>,
}

/// Point-in-time view of a job for status reads
#[derive(Debug, Clone, Serialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub status: JobStatus,
    pub counts: JobCounts,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

/// Creates and tracks background jobs
pub struct JobManager {
    jobs: Arc<DashMap<JobId, JobHandle>>,
    pipeline: Arc<ConversionPipeline>,
    sitemaps: SitemapFetcher,
    webhooks: WebhookSender,
    defaults: JobDefaults,
}

impl JobManager {
    pub fn new(
        pipeline: Arc<ConversionPipeline>,
        defaults: JobDefaults,
        user_agent: &str,
    ) -> Self {
        Self {
            jobs: Arc::new(DashMap::new()),
            pipeline,
            sitemaps: SitemapFetcher::new(user_agent),
            webhooks: WebhookSender::new(),
            defaults,
        }
    }

    /// Assemble a job configuration, filling unset knobs from the
    /// process defaults.
    pub fn build_config(
        &self,
        source: JobSource,
        options: ConversionOptions,
        webhook: Option<WebhookSpec>,
    ) -> JobConfig {
        JobConfig {
            source,
            options,
            max_concurrent: self.defaults.max_concurrent,
            batch_size: self.defaults.batch_size,
            processing_delay_ms: self.defaults.processing_delay_ms,
            retry_count: self.defaults.retry_count,
            retry_delay_ms: self.defaults.retry_delay_ms,
            webhook,
        }
    }

    /// Create a job and spawn its driver. Returns immediately.
    pub fn create_job(&self, config: JobConfig) -> JobId {
        self.cleanup_old_jobs();

        let id = Uuid::now_v7();
        let cancelled = Arc::new(AtomicBool::new(false));

        self.jobs.insert(
            id,
            JobHandle {
                id,
                status: JobStatus::Pending,
                counts: JobCounts::default(),
                started_at: Utc::now(),
                ended_at: None,
                error: None,
                completed_at: None,
                cancelled: Arc::clone(&cancelled),
            },
        );

        let ctx = runner::JobContext {
            id,
            config,
            jobs: Arc::clone(&self.jobs),
            pipeline: Arc::clone(&self.pipeline),
            sitemaps: self.sitemaps.clone(),
            webhooks: self.webhooks.clone(),
            reports_dir: self.reports_dir(),
            cancelled,
        };
        tokio::spawn(runner::run_job(ctx));

        info!(job_id = %id, "job created");
        id
    }

    /// Cancel a job. The first call on a live job transitions it;
    /// repeated calls and calls on terminal jobs are no-ops.
    pub fn cancel_job(&self, id: JobId) -> bool {
        if let Some(mut handle) = self.jobs.get_mut(&id) {
            if !handle.status.is_terminal() {
                handle.status = JobStatus::Cancelled;
                handle.cancelled.store(true, Ordering::Relaxed);
                info!(job_id = %id, "job cancelled");
                return true;
            }
        }
        false
    }

    /// Read a job's current state.
    pub fn job_status(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.get(&id).map(|handle| JobSnapshot {
            id: handle.id,
            status: handle.status,
            counts: handle.counts,
            started_at: handle.started_at,
            ended_at: handle.ended_at,
            error: handle.error.clone(),
        })
    }

    /// Number of jobs still running.
    pub fn active_count(&self) -> usize {
        self.jobs
            .iter()
            .filter(|entry| !entry.status.is_terminal())
            .count()
    }

    /// Directory receiving `{job_id}.json` reports.
    pub fn reports_dir(&self) -> PathBuf {
        self.defaults.reports_dir.clone()
    }

    /// Drop terminal jobs older than the retention window.
    fn cleanup_old_jobs(&self) {
        self.jobs.retain(|_, handle| {
            !handle.status.is_terminal()
                || handle
                    .completed_at
                    .map(|t| t.elapsed() < JOB_RETENTION)
                    .unwrap_or(true)
        });
    }
}
