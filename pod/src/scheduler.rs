//! Concurrency-bounded execution of a run's jobs.
//!
//! Jobs run in fixed batches: batch `n + 1` is not started until every job
//! of batch `n` has produced its result. `JobExecutor::execute` never fails,
//! so a failed or slow job only delays the batch that follows it.

use futures::future::join_all;

use crate::executor::JobExecutor;
use crate::job::{Job, JobResult};
use crate::telemetry;

/// Execute every job through `executor` with at most `concurrency` in flight.
///
/// `concurrency == 0` means unbounded. Returns exactly one result per job,
/// in input order.
pub async fn run_all(jobs: &[Job], executor: &dyn JobExecutor, concurrency: usize) -> Vec<JobResult> {
    if jobs.is_empty() {
        return Vec::new();
    }

    let effective = effective_concurrency(concurrency, jobs.len());
    tracing::debug!(
        jobs = jobs.len(),
        concurrency = effective,
        batches = jobs.len().div_ceil(effective),
        "scheduling jobs"
    );

    let mut results = Vec::with_capacity(jobs.len());
    for batch in jobs.chunks(effective) {
        let finished = join_all(batch.iter().map(|job| execute_one(job, executor))).await;
        results.extend(finished);
    }
    results
}

/// Batch size used for `len` jobs under the requested limit.
pub fn effective_concurrency(concurrency: usize, len: usize) -> usize {
    match concurrency {
        0 => len.max(1),
        limit => limit.min(len.max(1)),
    }
}

async fn execute_one(job: &Job, executor: &dyn JobExecutor) -> JobResult {
    let mode = executor.mode();
    let result = telemetry::instrument_execute(job, mode, executor.execute(job)).await;
    telemetry::record_job_finished(&result, mode);
    result
}
