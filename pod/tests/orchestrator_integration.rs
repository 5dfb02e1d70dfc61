//! End-to-end orchestrator tests: submit, poll, fetch results.
//!
//! Covers local and remote lifecycles, the still-running and not-found
//! paths, eager rejection of bad requests, events and shutdown.

use std::sync::Arc;
use std::time::Duration;

use pod::*;
use pod_testkit::{
    local_request, regions, remote_request, MockTaskProvider, MockTransport, RecordingExecutor,
};
use tokio::time::timeout;

const TASKS: [&str; 3] = ["title", "links", "headings"];

async fn started(builder: OrchestratorBuilder) -> Orchestrator {
    let orchestrator = builder.build().unwrap();
    orchestrator.start().await.unwrap();
    orchestrator
}

async fn wait_terminal(orchestrator: &Orchestrator, run_id: &RunId) -> RunStatus {
    timeout(Duration::from_secs(5), async {
        loop {
            let status = orchestrator.status(run_id).await.unwrap();
            if status.state != JobState::Running {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("run did not reach a terminal state")
}

#[tokio::test]
async fn test_local_run_lifecycle() {
    let provider = MockTaskProvider::new(TASKS);
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_provider(Arc::new(provider.clone())),
    )
    .await;

    let request = local_request(&[
        ("title", "https://a.test"),
        ("links", "https://a.test"),
        ("headings", "https://b.test"),
    ]);
    let SubmitResponse { run_id } = orchestrator.submit(request).await.unwrap();

    let status = wait_terminal(&orchestrator, &run_id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.total_jobs, 2);
    assert_eq!(status.completed_jobs, 2);
    assert_eq!(status.failed_jobs, 0);

    let summary = orchestrator.results(&run_id).await.unwrap();
    assert_eq!(summary.run_id, run_id);
    assert_eq!(summary.summary.total, 3);
    assert_eq!(summary.summary.passed, 3);
    assert!(summary.completed_at.is_some());

    provider.assert_call_count_eq(2);
    orchestrator.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_failing_runner_is_counted_but_run_completes() {
    let provider = MockTaskProvider::new(TASKS)
        .with_result(RunnerResult::fail("links"))
        .with_result(RunnerResult::error("headings", "selector not found"));
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default()).with_provider(Arc::new(provider)),
    )
    .await;

    let request = local_request(&[
        ("title", "https://a.test"),
        ("links", "https://a.test"),
        ("headings", "https://a.test"),
    ]);
    let run_id = orchestrator.submit(request).await.unwrap().run_id;
    wait_terminal(&orchestrator, &run_id).await;

    let summary = orchestrator.results(&run_id).await.unwrap();
    assert_eq!(summary.state, JobState::Completed);
    assert_eq!(summary.summary.total, 3);
    assert_eq!(summary.summary.passed, 1);
    assert_eq!(summary.summary.failed, 1);
    assert_eq!(summary.summary.errored, 1);
}

#[tokio::test]
async fn test_provider_error_fails_the_run_summary() {
    let provider = MockTaskProvider::new(TASKS).failing("browser crashed");
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default()).with_provider(Arc::new(provider)),
    )
    .await;

    let run_id = orchestrator
        .submit(local_request(&[("title", "https://a.test")]))
        .await
        .unwrap()
        .run_id;
    let status = wait_terminal(&orchestrator, &run_id).await;
    assert_eq!(status.state, JobState::Failed);
    assert_eq!(status.failed_jobs, 1);

    let summary = orchestrator.results(&run_id).await.unwrap();
    assert_eq!(summary.jobs.len(), 1);
    assert!(summary.jobs[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("browser crashed"));
}

#[tokio::test]
async fn test_results_while_running_is_still_running() {
    let provider = MockTaskProvider::new(TASKS).gated();
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_provider(Arc::new(provider.clone())),
    )
    .await;

    let run_id = orchestrator
        .submit(local_request(&[("title", "https://a.test")]))
        .await
        .unwrap()
        .run_id;

    let status = orchestrator.status(&run_id).await.unwrap();
    assert_eq!(status.state, JobState::Running);
    assert_eq!(status.total_jobs, 0);

    let err = orchestrator.results(&run_id).await.unwrap_err();
    assert!(matches!(err, PodError::StillRunning { .. }));
    assert_eq!(err.http_status(), 409);

    provider.release();
    let status = wait_terminal(&orchestrator, &run_id).await;
    assert_eq!(status.state, JobState::Completed);
}

#[tokio::test]
async fn test_unknown_run_is_not_found() {
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_provider(Arc::new(MockTaskProvider::new(TASKS))),
    )
    .await;

    let missing = RunId::from("run-missing");
    let err = orchestrator.status(&missing).await.unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.http_status(), 404);

    let err = orchestrator.results(&missing).await.unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn test_duplicate_run_id_is_conflict() {
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_provider(Arc::new(MockTaskProvider::new(TASKS))),
    )
    .await;

    let request = local_request(&[("title", "https://a.test")]).with_run_id("nightly-1");
    let accepted = orchestrator.submit(request.clone()).await.unwrap();
    assert_eq!(accepted.run_id.as_str(), "nightly-1");

    let err = orchestrator.submit(request).await.unwrap_err();
    assert!(matches!(err, PodError::Conflict { .. }));
}

#[tokio::test]
async fn test_invalid_requests_are_rejected_before_recording() {
    let store = Arc::new(InMemoryRunStore::new());
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_store(store.clone())
            .with_provider(Arc::new(MockTaskProvider::new(TASKS))),
    )
    .await;

    let empty = RunRequest::new(RunMode::Local, Vec::new());
    let err = orchestrator.submit(empty).await.unwrap_err();
    assert!(matches!(err, PodError::Validation { .. }));
    assert_eq!(err.http_status(), 400);

    let no_url = RunRequest::new(RunMode::Local, vec![RunnerConfig::new("title")]);
    let err = orchestrator.submit(no_url).await.unwrap_err();
    assert!(matches!(err, PodError::Configuration { .. }));

    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_remote_run_dispatches_per_region() {
    let transport = MockTransport::new();
    let config = OrchestratorConfig::default().with_regions(regions(&[
        ("us-east", "http://us.peer/run"),
        ("eu-west", "http://eu.peer/run"),
    ]));
    let orchestrator = started(
        OrchestratorBuilder::new(config).with_transport(Arc::new(transport.clone())),
    )
    .await;

    let request = remote_request(&[
        ("title", "us-east", "https://a.test"),
        ("links", "us-east", "https://a.test"),
        ("title", "eu-west", "https://a.test"),
    ]);
    let run_id = orchestrator.submit(request).await.unwrap().run_id;
    let status = wait_terminal(&orchestrator, &run_id).await;
    assert_eq!(status.state, JobState::Completed);
    assert_eq!(status.total_jobs, 2);

    let mut endpoints: Vec<String> = transport.calls().into_iter().map(|c| c.endpoint).collect();
    endpoints.sort();
    assert_eq!(endpoints, vec!["http://eu.peer/run", "http://us.peer/run"]);

    let summary = orchestrator.results(&run_id).await.unwrap();
    assert_eq!(summary.jobs[0].region.as_deref(), Some("us-east"));
    assert_eq!(summary.jobs[1].region.as_deref(), Some("eu-west"));
    assert_eq!(summary.summary.passed, 3);
}

#[tokio::test]
async fn test_remote_timeout_is_timed_out() {
    let transport = MockTransport::new().time_out_endpoint("http://eu.peer/run");
    let config = OrchestratorConfig::default().with_regions(regions(&[
        ("us-east", "http://us.peer/run"),
        ("eu-west", "http://eu.peer/run"),
    ]));
    let orchestrator =
        started(OrchestratorBuilder::new(config).with_transport(Arc::new(transport))).await;

    let request = remote_request(&[
        ("title", "us-east", "https://a.test"),
        ("title", "eu-west", "https://a.test"),
    ]);
    let run_id = orchestrator.submit(request).await.unwrap().run_id;
    let status = wait_terminal(&orchestrator, &run_id).await;

    assert_eq!(status.state, JobState::TimedOut);
    assert_eq!(status.completed_jobs, 1);
    assert_eq!(status.failed_jobs, 1);

    let summary = orchestrator.results(&run_id).await.unwrap();
    assert_eq!(summary.jobs[1].state, JobState::TimedOut);
}

#[tokio::test]
async fn test_remote_timeout_outranks_failure() {
    let transport = MockTransport::new()
        .time_out_endpoint("http://eu.peer/run")
        .fail_endpoint("http://us.peer/run", "peer returned 500");
    let config = OrchestratorConfig::default().with_regions(regions(&[
        ("us-east", "http://us.peer/run"),
        ("eu-west", "http://eu.peer/run"),
    ]));
    let orchestrator =
        started(OrchestratorBuilder::new(config).with_transport(Arc::new(transport))).await;

    let request = remote_request(&[
        ("title", "us-east", "https://a.test"),
        ("title", "eu-west", "https://a.test"),
    ]);
    let run_id = orchestrator.submit(request).await.unwrap().run_id;
    let status = wait_terminal(&orchestrator, &run_id).await;
    assert_eq!(status.state, JobState::TimedOut);
    assert_eq!(status.failed_jobs, 2);

    let summary = orchestrator.results(&run_id).await.unwrap();
    assert_eq!(summary.jobs[0].state, JobState::Failed);
    assert!(summary.jobs[0]
        .error
        .as_deref()
        .unwrap_or_default()
        .contains("peer returned 500"));
}

#[tokio::test]
async fn test_unmapped_region_is_rejected_at_submit() {
    let transport = MockTransport::new();
    let config = OrchestratorConfig::default()
        .with_regions(regions(&[("us-east", "http://us.peer/run")]));
    let store = Arc::new(InMemoryRunStore::new());
    let orchestrator = started(
        OrchestratorBuilder::new(config)
            .with_store(store.clone())
            .with_transport(Arc::new(transport.clone())),
    )
    .await;

    let request = remote_request(&[
        ("title", "us-east", "https://a.test"),
        ("title", "ap-south", "https://a.test"),
    ]);
    let err = orchestrator.submit(request).await.unwrap_err();
    assert!(matches!(err, PodError::Configuration { .. }));
    assert!(err.to_string().contains("ap-south"));

    transport.assert_call_count_eq(0);
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn test_concurrency_limit_bounds_parallel_jobs() {
    let executor = RecordingExecutor::new(RunMode::Local).with_delay(Duration::from_millis(20));
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_executor(RunMode::Local, Arc::new(executor.clone())),
    )
    .await;

    let request = local_request(&[
        ("title", "https://a.test"),
        ("title", "https://b.test"),
        ("title", "https://c.test"),
        ("title", "https://d.test"),
        ("title", "https://e.test"),
    ])
    .with_concurrency(2);
    let run_id = orchestrator.submit(request).await.unwrap().run_id;
    let status = wait_terminal(&orchestrator, &run_id).await;

    assert_eq!(status.total_jobs, 5);
    assert_eq!(executor.jobs().len(), 5);
    assert_eq!(executor.peak_concurrency(), 2);
}

#[tokio::test]
async fn test_events_follow_run_lifecycle() {
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default())
            .with_provider(Arc::new(MockTaskProvider::new(TASKS))),
    )
    .await;
    let mut events = orchestrator.subscribe();

    let request = local_request(&[("title", "https://a.test"), ("links", "https://b.test")]);
    let run_id = orchestrator.submit(request).await.unwrap().run_id;

    let mut kinds = Vec::new();
    timeout(Duration::from_secs(5), async {
        loop {
            let event = events.recv().await.unwrap();
            assert_eq!(event.run_id(), &run_id);
            let terminal = event.is_terminal();
            kinds.push(match event {
                RunEvent::Submitted { jobs, .. } => {
                    assert_eq!(jobs, 2);
                    "submitted"
                }
                RunEvent::JobFinished { .. } => "job_finished",
                RunEvent::Completed { .. } => "completed",
                RunEvent::Failed { .. } => "failed",
                _ => "other",
            });
            if terminal {
                break;
            }
        }
    })
    .await
    .expect("terminal event not received");

    assert_eq!(
        kinds,
        vec!["submitted", "job_finished", "job_finished", "completed"]
    );

    // The store is updated before the terminal event is broadcast.
    let status = orchestrator.status(&run_id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);
}

#[tokio::test]
async fn test_shutdown_drains_in_flight_runs() {
    let provider = MockTaskProvider::new(TASKS).with_delay(Duration::from_millis(50));
    let orchestrator = started(
        OrchestratorBuilder::new(OrchestratorConfig::default()).with_provider(Arc::new(provider)),
    )
    .await;

    let run_id = orchestrator
        .submit(local_request(&[("title", "https://a.test")]))
        .await
        .unwrap()
        .run_id;
    orchestrator.shutdown().await.unwrap();

    let status = orchestrator.status(&run_id).await.unwrap();
    assert_eq!(status.state, JobState::Completed);

    let err = orchestrator
        .submit(local_request(&[("title", "https://a.test")]))
        .await
        .unwrap_err();
    assert!(matches!(err, PodError::ShuttingDown));
    assert_eq!(err.http_status(), 503);
}
