//! Job report persistence
//!
//! Each job writes `reports/{job_id}.json` at every batch boundary and
//! on its terminal transition. Writes go through a temp file + rename
//! so a crash never leaves a torn report.

use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{JobCounts, JobId, JobSource, JobStatus, ProcessingResult};

/// Subset of the job configuration recorded in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportConfig {
    pub source: JobSource,
    pub batch_size: usize,
    pub max_concurrent: usize,
    pub retry_count: u32,
}

/// Aggregate counters recorded in the report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    pub total: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub processing_time: u64,
}

impl ReportSummary {
    pub fn from_counts(counts: &JobCounts, processing_time_ms: u64) -> Self {
        Self {
            total: counts.total,
            processed: counts.processed,
            successful: counts.success,
            failed: counts.failed,
            processing_time: processing_time_ms,
        }
    }
}

/// The persisted job report
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobReport {
    pub id: JobId,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Wall-clock duration in milliseconds, present once terminal
    pub duration: Option<u64>,
    pub config: ReportConfig,
    pub summary: ReportSummary,
    pub results: Vec<ProcessingResult>,
    pub error: Option<String>,
}

/// Path of the report file for a job.
pub fn report_path(dir: &Path, job_id: JobId) -> PathBuf {
    dir.join(format!("{}.json", job_id))
}

/// Atomically persist a report, creating the directory if needed.
pub async fn persist(dir: &Path, report: &JobReport) -> io::Result<PathBuf> {
    tokio::fs::create_dir_all(dir).await?;

    let path = report_path(dir, report.id);
    let tmp = dir.join(format!("{}.json.tmp", report.id));
    let data = serde_json::to_vec_pretty(report).map_err(io::Error::other)?;

    tokio::fs::write(&tmp, &data).await?;
    tokio::fs::rename(&tmp, &path).await?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn sample_report() -> JobReport {
        JobReport {
            id: Uuid::now_v7(),
            status: JobStatus::Completed,
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            duration: Some(500),
            config: ReportConfig {
                source: JobSource::Urls {
                    urls: vec!["https://example.com/".to_string()],
                },
                batch_size: 10,
                max_concurrent: 5,
                retry_count: 2,
            },
            summary: ReportSummary {
                total: 1,
                processed: 1,
                successful: 0,
                failed: 1,
                processing_time: 500,
            },
            results: vec![ProcessingResult::failed("https://example.com/", "x")],
            error: None,
        }
    }

    #[tokio::test]
    async fn persist_writes_and_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let report = sample_report();

        let path = persist(dir.path(), &report).await.unwrap();
        assert_eq!(path, report_path(dir.path(), report.id));

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let loaded: JobReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.id, report.id);
        assert_eq!(loaded.status, JobStatus::Completed);
        assert_eq!(loaded.summary.total, 1);
    }

    #[tokio::test]
    async fn persist_overwrites_previous_report() {
        let dir = tempfile::tempdir().unwrap();
        let mut report = sample_report();

        persist(dir.path(), &report).await.unwrap();
        report.status = JobStatus::Failed;
        report.error = Some("later".to_string());
        let path = persist(dir.path(), &report).await.unwrap();

        let raw = tokio::fs::read_to_string(&path).await.unwrap();
        let loaded: JobReport = serde_json::from_str(&raw).unwrap();
        assert_eq!(loaded.status, JobStatus::Failed);
        assert_eq!(loaded.error.as_deref(), Some("later"));
    }

    #[test]
    fn report_uses_camel_case_keys() {
        let report = sample_report();
        let value = serde_json::to_value(&report).unwrap();
        assert!(value.get("startTime").is_some());
        assert!(value.get("endTime").is_some());
        assert!(value["summary"].get("processingTime").is_some());
    }
}
