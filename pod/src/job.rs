use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use uuid::Uuid;

use crate::run::{RunId, RunnerConfig};

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub Uuid);

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl JobId {
    /// Creates a new time-ordered job id.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state shared by jobs and runs.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl JobState {
    /// Returns the state as its wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Queued => "queued",
            JobState::Running => "running",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::TimedOut => "timed_out",
        }
    }

    /// Failed or timed out.
    pub fn is_failure(&self) -> bool {
        matches!(self, JobState::Failed | JobState::TimedOut)
    }
}

impl Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A group of runners executed together against one target.
///
/// Jobs are produced by the planner and never mutated afterwards. Every
/// runner in a job shares the same `url` input (and, in remote mode, the
/// same region).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// Unique id of this job.
    pub job_id: JobId,
    /// Region the job runs in; set in remote mode only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Runners executed together by this job.
    pub runners: Vec<RunnerConfig>,
    /// The run this job belongs to.
    pub run_id: RunId,
    /// Per-job timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl Job {
    /// The URL of the first runner; the planner guarantees all runners agree.
    pub fn url(&self) -> Option<&str> {
        self.runners.first().and_then(RunnerConfig::url)
    }

    /// `timeout` as a `Duration`.
    pub fn timeout_duration(&self) -> Option<std::time::Duration> {
        self.timeout.map(std::time::Duration::from_millis)
    }

    /// Names of the job's runners, in order.
    pub fn runner_names(&self) -> Vec<&str> {
        self.runners.iter().map(|r| r.name.as_str()).collect()
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    Pass,
    Fail,
    Error,
}

/// Outcome of one runner inside a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerResult {
    /// Name of the task that produced this result.
    pub name: String,
    /// Outcome of the task.
    pub status: RunnerStatus,
    /// Task-specific output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Map<String, serde_json::Value>>,
    /// Why the task errored.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Wall time the task took, when the provider reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunnerResult {
    /// A passing result for `name`.
    pub fn pass(name: impl Into<String>) -> Self {
        Self::with_status(name, RunnerStatus::Pass)
    }

    /// A failing result for `name`.
    pub fn fail(name: impl Into<String>) -> Self {
        Self::with_status(name, RunnerStatus::Fail)
    }

    /// An errored result for `name` carrying `message`.
    pub fn error(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_message: Some(message.into()),
            ..Self::with_status(name, RunnerStatus::Error)
        }
    }

    fn with_status(name: impl Into<String>, status: RunnerStatus) -> Self {
        Self {
            name: name.into(),
            status,
            details: None,
            error_message: None,
            duration_ms: None,
        }
    }
}

/// Outcome of executing one job. Produced exactly once per job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobResult {
    /// The job this result is for.
    pub job_id: JobId,
    /// Region the job ran in, copied from the job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// How the job ended.
    pub state: JobState,
    /// Per-runner results; empty when the job failed as a whole.
    pub results: Vec<RunnerResult>,
    /// Why the job failed or timed out.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When execution started.
    pub started_at: DateTime<Utc>,
    /// When execution finished.
    pub completed_at: DateTime<Utc>,
    /// Wall time from start to finish in milliseconds.
    pub duration_ms: u64,
}

impl JobResult {
    /// Build a result for `job` that finished now.
    pub fn finish(
        job: &Job,
        started_at: DateTime<Utc>,
        state: JobState,
        results: Vec<RunnerResult>,
        error: Option<String>,
    ) -> Self {
        let completed_at = Utc::now();
        Self {
            job_id: job.job_id,
            region: job.region.clone(),
            state,
            results,
            error,
            started_at,
            completed_at,
            duration_ms: millis_between(started_at, completed_at),
        }
    }

    /// A completed result carrying the provider's runner results.
    pub fn completed(
        job: &Job,
        started_at: DateTime<Utc>,
        results: Vec<RunnerResult>,
    ) -> Self {
        Self::finish(job, started_at, JobState::Completed, results, None)
    }

    /// A failed result with no runner results.
    pub fn failed(
        job: &Job,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self::finish(
            job,
            started_at,
            JobState::Failed,
            Vec::new(),
            Some(error.into()),
        )
    }

    /// A timed-out result with no runner results.
    pub fn timed_out(
        job: &Job,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self::finish(
            job,
            started_at,
            JobState::TimedOut,
            Vec::new(),
            Some(error.into()),
        )
    }
}

/// Whole milliseconds from `start` to `end`, clamped at zero.
pub(crate) fn millis_between(start: DateTime<Utc>, end: DateTime<Utc>) -> u64 {
    u64::try_from((end - start).num_milliseconds()).unwrap_or(0)
}
