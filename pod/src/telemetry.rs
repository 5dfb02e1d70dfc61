//! Tracing and telemetry instrumentation for pod.
//!
//! Span constructors for the run lifecycle (plan, run pipeline, job
//! execution) and `record_*` helpers that log the event and, with the
//! `metrics` feature, update the Prometheus metrics in [`crate::metrics`].
//! Every helper works with the feature disabled.
//!
//! # Example
//!
//! ```ignore
//! use pod::telemetry::{job_execute_span, record_job_finished};
//!
//! let span = job_execute_span(&job, RunMode::Local);
//! let result = executor.execute(&job).instrument(span).await;
//! record_job_finished(&result, RunMode::Local);
//! ```

use std::future::Future;
use tracing::{info_span, Instrument, Span};

use crate::job::{Job, JobResult, JobState};
use crate::run::RunMode;

/// Span covering planning of one submission.
#[must_use]
pub fn plan_span(run_id: impl AsRef<str>, mode: impl AsRef<str>) -> Span {
    info_span!(
        "pod.plan",
        run_id = %run_id.as_ref(),
        mode = %mode.as_ref(),
    )
}

/// Span covering the schedule and aggregate pipeline of one run.
///
/// `jobs` is the planned job count; the span lives as long as the
/// pipeline task, so per-job spans nest under it.
#[must_use]
pub fn run_span(run_id: impl AsRef<str>, mode: RunMode, jobs: usize) -> Span {
    info_span!(
        "pod.run",
        run_id = %run_id.as_ref(),
        mode = %mode,
        jobs = jobs,
    )
}

/// Span covering a single `JobExecutor::execute` call.
#[must_use]
pub fn job_execute_span(job: &Job, mode: RunMode) -> Span {
    info_span!(
        "pod.execute",
        run_id = %job.run_id,
        job_id = %job.job_id,
        mode = %mode,
        region = job.region.as_deref().unwrap_or("-"),
        runners = job.runners.len(),
    )
}

/// Attach a job execution span to `future`.
pub fn instrument_execute<F>(job: &Job, mode: RunMode, future: F) -> impl Future<Output = F::Output>
where
    F: Future,
{
    future.instrument(job_execute_span(job, mode))
}

/// Record an accepted submission.
pub fn record_run_submitted(run_id: impl AsRef<str>, mode: RunMode, jobs: usize) {
    tracing::info!(
        run_id = %run_id.as_ref(),
        mode = %mode,
        jobs = jobs,
        "run submitted"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_submitted(mode.as_str());
}

/// Record a run that reached a summary.
///
/// `state` is the aggregated run state.
pub fn record_run_finished(run_id: impl AsRef<str>, state: JobState, duration_ms: Option<u64>) {
    if state.is_failure() {
        tracing::warn!(
            run_id = %run_id.as_ref(),
            state = %state,
            duration_ms = ?duration_ms,
            "run finished"
        );
    } else {
        tracing::info!(
            run_id = %run_id.as_ref(),
            state = %state,
            duration_ms = ?duration_ms,
            "run finished"
        );
    }

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_finished(state.as_str());
}

/// Record a run whose pipeline failed before producing a summary.
pub fn record_run_failed(run_id: impl AsRef<str>, error: impl AsRef<str>) {
    tracing::error!(
        run_id = %run_id.as_ref(),
        error = %error.as_ref(),
        "run pipeline failed"
    );

    #[cfg(feature = "metrics")]
    crate::metrics::record_run_finished(JobState::Failed.as_str());
}

/// Record one job outcome and its duration.
pub fn record_job_finished(result: &JobResult, mode: RunMode) {
    match result.state {
        JobState::Completed => tracing::info!(
            job_id = %result.job_id,
            state = %result.state,
            duration_ms = result.duration_ms,
            runners = result.results.len(),
            "job finished"
        ),
        _ => tracing::warn!(
            job_id = %result.job_id,
            state = %result.state,
            duration_ms = result.duration_ms,
            error = result.error.as_deref().unwrap_or(""),
            "job finished"
        ),
    }

    #[cfg(feature = "metrics")]
    crate::metrics::record_job_finished(
        mode.as_str(),
        result.state.as_str(),
        result.duration_ms as f64 / 1_000.0,
    );
    #[cfg(not(feature = "metrics"))]
    let _ = mode;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;
    use crate::run::{RunId, RunnerConfig};
    use chrono::Utc;

    fn job() -> Job {
        Job {
            job_id: JobId::new(),
            region: Some("eu".into()),
            runners: vec![RunnerConfig::new("a")],
            run_id: RunId::from("run-1"),
            timeout: None,
        }
    }

    #[test]
    fn test_span_names() {
        assert_eq!(plan_span("run-1", "local").metadata().unwrap().name(), "pod.plan");
        assert_eq!(
            run_span("run-1", RunMode::Remote, 3).metadata().unwrap().name(),
            "pod.run"
        );
        assert_eq!(
            job_execute_span(&job(), RunMode::Local).metadata().unwrap().name(),
            "pod.execute"
        );
    }

    #[tokio::test]
    async fn test_instrument_execute_passes_output_through() {
        let value = instrument_execute(&job(), RunMode::Local, async { 7 }).await;
        assert_eq!(value, 7);
    }

    #[test]
    fn test_record_helpers_do_not_panic() {
        let job = job();
        record_run_submitted("run-1", RunMode::Local, 2);
        record_job_finished(&JobResult::completed(&job, Utc::now(), Vec::new()), RunMode::Local);
        record_job_finished(&JobResult::timed_out(&job, Utc::now(), "late"), RunMode::Remote);
        record_run_finished("run-1", JobState::TimedOut, Some(12));
        record_run_failed("run-1", "pipeline panicked");
    }
}
