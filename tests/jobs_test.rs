//! Job orchestrator tests: batching, count invariants, webhooks,
//! cancellation, and report persistence.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{spawn_webhook_sink, test_pipeline, FakeBrowser, PageScript};
use sitemark::config::JobDefaults;
use sitemark::jobs::{JobManager, JobSnapshot};
use sitemark::types::{ConversionOptions, JobSource, JobStatus, WebhookSpec};

fn job_urls(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://example.com/page-{}", i))
        .collect()
}

fn job_options() -> ConversionOptions {
    ConversionOptions {
        min_content_length: 10,
        scroll_wait_ms: 1,
        ..ConversionOptions::default()
    }
}

fn manager_with(
    browser: Arc<FakeBrowser>,
    reports_dir: std::path::PathBuf,
) -> JobManager {
    let pipeline = Arc::new(test_pipeline(browser));
    let defaults = JobDefaults {
        max_concurrent: 5,
        batch_size: 10,
        processing_delay_ms: 1,
        retry_count: 0,
        retry_delay_ms: 1,
        reports_dir,
    };
    JobManager::new(pipeline, defaults, "sitemark-tests")
}

async fn wait_for_terminal(manager: &JobManager, id: sitemark::types::JobId) -> JobSnapshot {
    for _ in 0..600 {
        tokio::time::sleep(Duration::from_millis(10)).await;
        if let Some(snapshot) = manager.job_status(id) {
            if snapshot.status.is_terminal() {
                return snapshot;
            }
        }
    }
    panic!("job did not reach a terminal state in time");
}

#[tokio::test]
async fn twenty_three_urls_run_as_three_batches_with_closed_counts() {
    let reports = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::single_page(PageScript::with_text(200)));
    let manager = manager_with(browser, reports.path().to_path_buf());

    let config = manager.build_config(
        JobSource::Urls { urls: job_urls(23) },
        job_options(),
        None,
    );
    let id = manager.create_job(config);
    let snapshot = wait_for_terminal(&manager, id).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.counts.total, 23);
    assert_eq!(snapshot.counts.processed, 23);
    assert_eq!(
        snapshot.counts.processed,
        snapshot.counts.success + snapshot.counts.failed
    );
    assert_eq!(snapshot.counts.total_batches, 3);
    assert_eq!(snapshot.counts.current_batch, 3);

    // Report persisted with a matching summary and one result per URL
    let path = reports.path().join(format!("{}.json", id));
    let raw = tokio::fs::read_to_string(&path).await.expect("report file");
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(report["status"], "completed");
    assert_eq!(report["summary"]["total"], 23);
    assert_eq!(report["summary"]["processed"], 23);
    assert_eq!(report["results"].as_array().unwrap().len(), 23);
    assert!(report["endTime"].is_string());
    assert!(report["duration"].is_number());
}

#[tokio::test]
async fn duplicate_source_urls_are_processed_at_most_once() {
    let reports = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::single_page(PageScript::with_text(200)));
    let manager = manager_with(Arc::clone(&browser), reports.path().to_path_buf());

    let mut urls = job_urls(5);
    urls.extend(job_urls(5)); // every URL twice
    let config = manager.build_config(JobSource::Urls { urls }, job_options(), None);
    let id = manager.create_job(config);
    let snapshot = wait_for_terminal(&manager, id).await;

    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.counts.total, 5);
    assert_eq!(snapshot.counts.processed, 5);

    let path = reports.path().join(format!("{}.json", id));
    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(report["results"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn progress_and_final_webhooks_are_delivered() {
    let reports = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::single_page(PageScript::with_text(200)));
    let manager = manager_with(browser, reports.path().to_path_buf());

    let (sink_url, received) = spawn_webhook_sink().await;
    let mut spec = WebhookSpec::new(sink_url);
    spec.progress_updates = true;
    spec.extra_fields
        .insert("tenant".to_string(), serde_json::json!("acme"));

    let config = manager.build_config(
        JobSource::Urls { urls: job_urls(23) },
        job_options(),
        Some(spec),
    );
    let id = manager.create_job(config);
    let snapshot = wait_for_terminal(&manager, id).await;
    assert_eq!(snapshot.status, JobStatus::Completed);

    // Allow the final webhook to land after the status flip
    tokio::time::sleep(Duration::from_millis(300)).await;
    let payloads = received.lock().await;

    let progress: Vec<_> = payloads
        .iter()
        .filter(|p| p["status"] == "in_progress")
        .collect();
    let finals: Vec<_> = payloads
        .iter()
        .filter(|p| p["status"] == "completed")
        .collect();

    // One progress webhook per batch, exactly one final
    assert_eq!(progress.len(), 3);
    assert_eq!(finals.len(), 1);

    let last_progress = progress.last().unwrap();
    assert_eq!(last_progress["progress"]["total"], 23);
    assert_eq!(last_progress["progress"]["batch"]["total"], 3);
    assert_eq!(last_progress["tenant"], "acme");

    let final_payload = finals[0];
    assert_eq!(final_payload["summary"]["total"], 23);
    assert_eq!(final_payload["summary"]["processed"], 23);
    let successful = final_payload["results"]["successful"].as_array().unwrap();
    let failed = final_payload["results"]["failed"].as_array().unwrap();
    assert_eq!(successful.len() + failed.len(), 23);
    assert_eq!(final_payload["tenant"], "acme");
}

#[tokio::test]
async fn cancellation_stops_batches_and_sends_no_final_webhook() {
    let reports = tempfile::tempdir().unwrap();
    let browser = Arc::new(
        FakeBrowser::single_page(PageScript::with_text(200))
            .with_nav_delay(Duration::from_millis(20)),
    );
    let manager = manager_with(browser, reports.path().to_path_buf());

    let (sink_url, received) = spawn_webhook_sink().await;
    let mut spec = WebhookSpec::new(sink_url);
    spec.progress_updates = true;

    let config = manager.build_config(
        JobSource::Urls {
            urls: job_urls(100),
        },
        job_options(),
        Some(spec),
    );
    let id = manager.create_job(config);

    // Wait until at least one batch has landed, then cancel
    for _ in 0..600 {
        tokio::time::sleep(Duration::from_millis(5)).await;
        if let Some(snapshot) = manager.job_status(id) {
            if snapshot.counts.processed >= 10 {
                break;
            }
        }
    }
    assert!(manager.cancel_job(id));
    // Repeated cancel is a no-op
    assert!(!manager.cancel_job(id));

    let snapshot = wait_for_terminal(&manager, id).await;
    assert_eq!(snapshot.status, JobStatus::Cancelled);
    assert!(snapshot.counts.processed < 100);
    assert_eq!(
        snapshot.counts.processed,
        snapshot.counts.success + snapshot.counts.failed
    );

    // No final webhook after cancellation, only progress payloads
    tokio::time::sleep(Duration::from_millis(300)).await;
    let payloads = received.lock().await;
    assert!(payloads.iter().all(|p| p["status"] == "in_progress"));

    // The final persist recorded the cancelled state
    let path = reports.path().join(format!("{}.json", id));
    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(report["status"], "cancelled");
}

#[tokio::test]
async fn cancelling_an_unknown_job_is_a_no_op() {
    let reports = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::single_page(PageScript::with_text(200)));
    let manager = manager_with(browser, reports.path().to_path_buf());

    assert!(!manager.cancel_job(uuid::Uuid::now_v7()));
}

#[tokio::test]
async fn source_with_no_valid_urls_fails_the_job() {
    let reports = tempfile::tempdir().unwrap();
    let browser = Arc::new(FakeBrowser::single_page(PageScript::with_text(200)));
    let manager = manager_with(browser, reports.path().to_path_buf());

    let config = manager.build_config(
        JobSource::Urls {
            urls: vec!["not a url".to_string(), "ftp://x/".to_string()],
        },
        job_options(),
        None,
    );
    let id = manager.create_job(config);
    let snapshot = wait_for_terminal(&manager, id).await;

    assert_eq!(snapshot.status, JobStatus::Failed);
    assert!(snapshot.error.is_some());
}

#[tokio::test]
async fn failed_urls_are_recorded_inside_the_results() {
    let reports = tempfile::tempdir().unwrap();
    // Every navigation fails permanently
    let browser = Arc::new(
        FakeBrowser::single_page(PageScript::with_text(200))
            .failing_navigations(usize::MAX, "404 not found"),
    );
    let manager = manager_with(browser, reports.path().to_path_buf());

    let config = manager.build_config(
        JobSource::Urls { urls: job_urls(3) },
        job_options(),
        None,
    );
    let id = manager.create_job(config);
    let snapshot = wait_for_terminal(&manager, id).await;

    // The job itself completes; failures live in the per-URL results
    assert_eq!(snapshot.status, JobStatus::Completed);
    assert_eq!(snapshot.counts.processed, 3);
    assert_eq!(snapshot.counts.failed, 3);
    assert_eq!(snapshot.counts.success, 0);

    let path = reports.path().join(format!("{}.json", id));
    let raw = tokio::fs::read_to_string(&path).await.unwrap();
    let report: serde_json::Value = serde_json::from_str(&raw).unwrap();
    for result in report["results"].as_array().unwrap() {
        assert_eq!(result["success"], false);
        assert!(result["error"].is_string());
    }
}
