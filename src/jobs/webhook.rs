//! Webhook delivery
//!
//! Typed progress and final payloads, POSTed with the job's configured
//! headers and extra fields merged in. Delivery is best-effort:
//! failures are logged and never alter job state.

use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::WebhookError;
use crate::types::{JobCounts, JobId, JobStatus, ProcessingResult, WebhookSpec};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends job webhooks
#[derive(Clone)]
pub struct WebhookSender {
    client: reqwest::Client,
}

impl Default for WebhookSender {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookSender {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self { client }
    }

    /// Send a per-batch progress update.
    pub async fn send_progress(&self, spec: &WebhookSpec, job_id: JobId, counts: &JobCounts) {
        let payload = progress_payload(job_id, counts, spec);
        if let Err(e) = self.post(spec, &payload).await {
            warn!(job_id = %job_id, error = %e, "progress webhook failed");
        } else {
            debug!(job_id = %job_id, batch = counts.current_batch, "progress webhook sent");
        }
    }

    /// Send the terminal webhook with the full per-URL results.
    pub async fn send_final(
        &self,
        spec: &WebhookSpec,
        job_id: JobId,
        status: JobStatus,
        counts: &JobCounts,
        results: &[ProcessingResult],
        processing_time_ms: u64,
    ) {
        let payload = final_payload(job_id, status, counts, results, processing_time_ms, spec);
        if let Err(e) = self.post(spec, &payload).await {
            warn!(job_id = %job_id, error = %e, "final webhook failed");
        } else {
            debug!(job_id = %job_id, status = %status, "final webhook sent");
        }
    }

    async fn post(&self, spec: &WebhookSpec, payload: &Value) -> Result<(), WebhookError> {
        let mut request = self.client.post(&spec.url).json(payload);
        for (name, value) in &spec.headers {
            request = request.header(name, value);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebhookError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Build the progress payload.
pub fn progress_payload(job_id: JobId, counts: &JobCounts, spec: &WebhookSpec) -> Value {
    let percentage = if counts.total > 0 {
        (counts.processed as f64 / counts.total as f64 * 100.0).round()
    } else {
        0.0
    };

    let mut payload = json!({
        "jobId": job_id,
        "status": "in_progress",
        "progress": {
            "processed": counts.processed,
            "total": counts.total,
            "percentage": percentage,
            "success": counts.success,
            "failed": counts.failed,
            "batch": {
                "current": counts.current_batch,
                "total": counts.total_batches,
            },
        },
        "timestamp": Utc::now().to_rfc3339(),
    });
    merge_extra_fields(&mut payload, spec);
    payload
}

/// Build the terminal payload with split successful/failed results.
pub fn final_payload(
    job_id: JobId,
    status: JobStatus,
    counts: &JobCounts,
    results: &[ProcessingResult],
    processing_time_ms: u64,
    spec: &WebhookSpec,
) -> Value {
    let successful: Vec<Value> = results
        .iter()
        .filter(|r| r.success)
        .map(|r| {
            json!({
                "url": r.url,
                "status": "success",
                "markdown": r.markdown,
                "error": Value::Null,
                "timestamp": r.timestamp.to_rfc3339(),
                "metadata": r.metadata,
            })
        })
        .collect();
    let failed: Vec<Value> = results
        .iter()
        .filter(|r| !r.success)
        .map(|r| {
            json!({
                "url": r.url,
                "status": "failed",
                "markdown": Value::Null,
                "error": r.error,
                "timestamp": r.timestamp.to_rfc3339(),
            })
        })
        .collect();

    let mut payload = json!({
        "jobId": job_id,
        "status": status.as_str(),
        "summary": {
            "total": counts.total,
            "processed": counts.processed,
            "successful": counts.success,
            "failed": counts.failed,
            "processingTime": processing_time_ms,
        },
        "results": {
            "successful": successful,
            "failed": failed,
        },
        "timestamp": Utc::now().to_rfc3339(),
    });
    merge_extra_fields(&mut payload, spec);
    payload
}

fn merge_extra_fields(payload: &mut Value, spec: &WebhookSpec) {
    if let Some(map) = payload.as_object_mut() {
        for (key, value) in &spec.extra_fields {
            map.insert(key.clone(), value.clone());
        }
    }
}
