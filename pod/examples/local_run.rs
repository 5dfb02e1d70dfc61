//! Local-mode run with an in-process task provider.
//!
//! Submits three runners against two targets, polls until the run is done
//! and prints the summary as JSON.
//!
//! Run with: `RUST_LOG=pod=debug cargo run --example local_run`

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use pod::*;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Pretends to inspect a page: "title" always passes, "links" fails on
/// targets without a path, anything else is unknown.
struct PageTasks;

#[async_trait]
impl TaskProvider for PageTasks {
    fn has_task(&self, name: &str) -> bool {
        matches!(name, "title" | "links")
    }

    async fn run_tasks(&self, batch: TaskBatch) -> anyhow::Result<TaskBatchOutput> {
        tokio::time::sleep(Duration::from_millis(100)).await;
        let results = batch
            .runners
            .iter()
            .map(|task| {
                let url = task.input.get("url").and_then(|v| v.as_str()).unwrap_or("");
                match task.name.as_str() {
                    "links" if !url.trim_end_matches('/').contains("/docs") => {
                        RunnerResult::fail(&task.name)
                    }
                    _ => RunnerResult::pass(&task.name),
                }
            })
            .collect();
        Ok(TaskBatchOutput { results })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("pod=info")),
        )
        .init();

    let config = OrchestratorConfig::default().with_default_job_timeout(5_000);
    let orchestrator = OrchestratorBuilder::new(config)
        .with_provider(Arc::new(PageTasks))
        .build()?;
    orchestrator.start().await?;

    let request = RunRequest::new(
        RunMode::Local,
        vec![
            RunnerConfig::new("title").with_input("url", "https://example.com"),
            RunnerConfig::new("links").with_input("url", "https://example.com"),
            RunnerConfig::new("links").with_input("url", "https://example.com/docs"),
        ],
    )
    .with_concurrency(1);

    let SubmitResponse { run_id } = orchestrator.submit(request).await?;
    println!("submitted {run_id}");

    let summary = loop {
        match orchestrator.results(&run_id).await {
            Err(PodError::StillRunning { .. }) => {
                let status = orchestrator.status(&run_id).await?;
                println!("state: {:?}", status.state);
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            other => break other?,
        }
    };

    println!("{}", serde_json::to_string_pretty(&summary)?);
    orchestrator.shutdown().await?;
    Ok(())
}
