//! Integration tests: real processes through the Dispatcher and ToolRunner.

#![cfg(unix)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use mdl_core::worker::ToolRunner;
use mdl_core::{Dispatcher, DownloadRequest, JobKind, JobStatus, JobStore};
use tempfile::tempdir;

fn dispatcher(tool: &std::path::Path, download_dir: &std::path::Path, slots: usize) -> Dispatcher {
    let runner = ToolRunner::new(tool, download_dir).with_kill_grace(Duration::from_secs(1));
    let d = Dispatcher::new(JobStore::in_memory(), Arc::new(runner), slots);
    d.start();
    d
}

fn request(url: &str) -> DownloadRequest {
    DownloadRequest::for_url(url)
}

#[tokio::test]
async fn successful_run_completes_with_output_path() {
    let tools = tempdir().unwrap();
    let downloads = tempdir().unwrap();
    let tool = common::succeeding_tool(tools.path());
    let d = dispatcher(&tool, downloads.path(), 1);

    let id = d.submit(JobKind::Single, request("https://example.com/v")).unwrap();
    let job = common::wait_for(d.store(), &id, |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Completed);
    let path = job.output_path.expect("output path");
    assert!(path.ends_with("clip.mp4"), "{path}");
    assert!(std::path::Path::new(&path).exists());
    assert_eq!(job.progress.percentage, 100.0);
    assert_eq!(job.progress.filename.as_deref(), Some("clip.mp4"));
    assert!(job.error.is_none());
}

#[tokio::test]
async fn subdirectory_requests_land_under_download_dir() {
    let tools = tempdir().unwrap();
    let downloads = tempdir().unwrap();
    let tool = common::succeeding_tool(tools.path());
    let d = dispatcher(&tool, downloads.path(), 1);

    let mut req = request("https://example.com/v");
    req.path = Some("music/live".to_string());
    let id = d.submit(JobKind::Single, req).unwrap();
    let job = common::wait_for(d.store(), &id, |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Completed);
    assert!(downloads.path().join("music/live/clip.mp4").exists());
}

#[tokio::test]
async fn nonzero_exit_is_errored_with_diagnostic() {
    let tools = tempdir().unwrap();
    let downloads = tempdir().unwrap();
    let tool = common::failing_tool(tools.path());
    let d = dispatcher(&tool, downloads.path(), 1);

    let id = d.submit(JobKind::Single, request("https://example.com/v")).unwrap();
    let job = common::wait_for(d.store(), &id, |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Errored);
    let error = job.error.expect("error recorded");
    assert!(error.starts_with("exit status 2"), "{error}");
    assert!(error.contains("Unsupported URL"), "{error}");
    assert!(job.output_path.is_none());
}

#[tokio::test]
async fn missing_tool_is_errored_not_rejected() {
    let downloads = tempdir().unwrap();
    let d = dispatcher(
        std::path::Path::new("/nonexistent/mdl-tool"),
        downloads.path(),
        1,
    );

    let id = d.submit(JobKind::Single, request("https://example.com/v")).unwrap();
    let job = common::wait_for(d.store(), &id, |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Errored);
    assert!(job.error.unwrap().starts_with("failed to start tool"));
}

#[tokio::test]
async fn cancel_terminates_process_and_keeps_progress() {
    let tools = tempdir().unwrap();
    let downloads = tempdir().unwrap();
    let tool = common::hanging_tool(tools.path());
    let d = dispatcher(&tool, downloads.path(), 1);

    let id = d.submit(JobKind::Livestream, request("https://example.com/live")).unwrap();
    common::wait_for(d.store(), &id, |j| {
        j.status == JobStatus::Running && j.progress.percentage >= 42.0
    })
    .await;

    let started = tokio::time::Instant::now();
    d.cancel(&id).unwrap();
    let job = common::wait_for(d.store(), &id, |j| j.status.is_terminal()).await;

    assert_eq!(job.status, JobStatus::Canceled);
    assert!(started.elapsed() < Duration::from_secs(5));
    assert_eq!(job.progress.percentage, 42.0);
    assert!(job.error.is_none());
    assert!(d.running().is_empty());
}

#[tokio::test]
async fn two_slots_three_jobs() {
    let tools = tempdir().unwrap();
    let downloads = tempdir().unwrap();
    let gate = tools.path().join("go");
    let tool = common::gated_tool(tools.path(), &gate);
    let d = dispatcher(&tool, downloads.path(), 2);

    let ids: Vec<_> = (1..=3)
        .map(|i| {
            d.submit(JobKind::Single, request(&format!("https://example.com/{i}")))
                .unwrap()
        })
        .collect();

    common::wait_for(d.store(), &ids[1], |j| j.status == JobStatus::Running).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(d.running().len(), 2);
    let pending = d.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, ids[2]);

    std::fs::write(&gate, b"").unwrap();
    for id in &ids {
        let job = common::wait_for(d.store(), id, |j| j.status.is_terminal()).await;
        assert_eq!(job.status, JobStatus::Completed);
    }
}

#[cfg(target_os = "linux")]
#[tokio::test]
async fn dropped_run_kills_whole_process_group() {
    use mdl_core::worker::JobRunner;
    use mdl_core::Job;
    use tokio_util::sync::CancellationToken;

    let tools = tempdir().unwrap();
    let downloads = tempdir().unwrap();
    let pid_file = tools.path().join("helper.pid");
    let tool = common::forking_tool(tools.path(), &pid_file);
    let runner = ToolRunner::new(&tool, downloads.path());
    let store = JobStore::in_memory();
    let job = store.put(Job::new(JobKind::Single, request("https://example.com/v")));

    let task = tokio::spawn(async move {
        runner.run(&job, &store, CancellationToken::new()).await;
    });

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    let helper: u32 = loop {
        if let Ok(text) = std::fs::read_to_string(&pid_file) {
            break text.trim().parse().unwrap();
        }
        assert!(tokio::time::Instant::now() < deadline, "helper never started");
        tokio::time::sleep(Duration::from_millis(20)).await;
    };
    assert!(common::process_alive(helper));

    task.abort();
    let _ = task.await;

    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while common::process_alive(helper) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "helper {helper} outlived the dropped run"
        );
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}
