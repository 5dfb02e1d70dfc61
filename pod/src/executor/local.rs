use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::JobExecutor;
use crate::job::{Job, JobResult};
use crate::provider::{missing_tasks, TaskBatch, TaskProvider};
use crate::run::RunMode;

/// Runs jobs in-process through a [`TaskProvider`].
///
/// All runners of a job go to the provider in a single call so they can
/// share one page load. When the job has a timeout the call is raced
/// against it and a lost race reports the job as `timed_out`; this only
/// happens for providers that overrun the deadline they were handed in
/// [`TaskBatch::timeout`]. Errors the provider returns itself, including
/// its own deadline errors, are reported as `failed` without classification.
#[derive(Clone)]
pub struct LocalExecutor {
    provider: Arc<dyn TaskProvider>,
}

impl std::fmt::Debug for LocalExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalExecutor").finish_non_exhaustive()
    }
}

impl LocalExecutor {
    /// Creates an executor backed by `provider`.
    pub fn new(provider: Arc<dyn TaskProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl JobExecutor for LocalExecutor {
    async fn execute(&self, job: &Job) -> JobResult {
        let started_at = Utc::now();

        let missing = missing_tasks(
            self.provider.as_ref(),
            job.runners.iter().map(|r| r.name.as_str()),
        );
        if !missing.is_empty() {
            tracing::warn!(job_id = %job.job_id, missing = ?missing, "unknown runners requested");
            return JobResult::failed(
                job,
                started_at,
                format!("unknown runners: {}", missing.join(", ")),
            );
        }

        let call = self.provider.run_tasks(TaskBatch::for_job(job));
        let outcome = match job.timeout_duration() {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    tracing::warn!(job_id = %job.job_id, timeout_ms = ?job.timeout, "local job timed out");
                    return JobResult::timed_out(
                        job,
                        started_at,
                        format!("job timed out after {} ms", limit.as_millis()),
                    );
                }
            },
            None => call.await,
        };

        match outcome {
            Ok(output) => JobResult::completed(job, started_at, output.results),
            Err(err) => {
                tracing::warn!(job_id = %job.job_id, error = %format!("{err:#}"), "local job failed");
                JobResult::failed(job, started_at, format!("{err:#}"))
            }
        }
    }

    fn mode(&self) -> RunMode {
        RunMode::Local
    }
}
