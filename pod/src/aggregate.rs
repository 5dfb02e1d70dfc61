use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::job::{millis_between, Job, JobId, JobResult, JobState, RunnerStatus};
use crate::run::{RunId, RunSummary, SummaryCounts};

/// Reduce a run's job results into its summary.
///
/// Results are ordered by `jobs`; results for jobs not in the list keep
/// their relative order at the end.
pub fn aggregate(
    run_id: &RunId,
    jobs: &[Job],
    results: Vec<JobResult>,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
) -> RunSummary {
    let results = order_by_jobs(jobs, results);
    let state = overall_state(&results);
    let summary = count_runners(&results);

    RunSummary {
        run_id: run_id.clone(),
        state,
        jobs: results,
        summary,
        created_at,
        completed_at,
        duration_ms: completed_at.map(|end| millis_between(created_at, end)),
    }
}

/// Run state from job states, first matching rule wins:
/// all queued, any running, any timed out, any failed, all completed,
/// else failed.
pub fn overall_state(results: &[JobResult]) -> JobState {
    let all = |state: JobState| results.iter().all(|r| r.state == state);
    let any = |state: JobState| results.iter().any(|r| r.state == state);

    if all(JobState::Queued) {
        JobState::Queued
    } else if any(JobState::Running) {
        JobState::Running
    } else if any(JobState::TimedOut) {
        JobState::TimedOut
    } else if any(JobState::Failed) {
        JobState::Failed
    } else if all(JobState::Completed) {
        JobState::Completed
    } else {
        JobState::Failed
    }
}

fn count_runners(results: &[JobResult]) -> SummaryCounts {
    let mut counts = SummaryCounts::default();
    for runner in results.iter().flat_map(|r| &r.results) {
        counts.total += 1;
        match runner.status {
            RunnerStatus::Pass => counts.passed += 1,
            RunnerStatus::Fail => counts.failed += 1,
            RunnerStatus::Error => counts.errored += 1,
        }
    }
    counts
}

fn order_by_jobs(jobs: &[Job], results: Vec<JobResult>) -> Vec<JobResult> {
    let position: HashMap<JobId, usize> = jobs
        .iter()
        .enumerate()
        .map(|(index, job)| (job.job_id, index))
        .collect();

    let mut indexed: Vec<(usize, usize, JobResult)> = results
        .into_iter()
        .enumerate()
        .map(|(arrival, result)| {
            let slot = position.get(&result.job_id).copied().unwrap_or(usize::MAX);
            (slot, arrival, result)
        })
        .collect();
    indexed.sort_by_key(|(slot, arrival, _)| (*slot, *arrival));
    indexed.into_iter().map(|(_, _, result)| result).collect()
}
