use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use uuid::Uuid;

use crate::error::{PodError, Result};
use crate::job::{JobResult, JobState};

/// Opaque per-runner input, passed through to the task untouched.
pub type RunnerInput = Map<String, Value>;

/// Identifier of a run; either caller-supplied or a generated UUID v7.
#[derive(Clone, Debug, Eq, PartialEq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    /// Creates a new time-ordered run id.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RunId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<String> for RunId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for RunId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Where a run's jobs execute.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Execute jobs in-process through the task provider.
    Local,
    /// Dispatch each job to the peer serving its region.
    Remote,
}

impl RunMode {
    /// Returns the mode as its wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Local => "local",
            RunMode::Remote => "remote",
        }
    }
}

impl Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One requested task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunnerConfig {
    /// Name of the task to run; must be known to the executing provider.
    pub name: String,
    /// Region whose peer runs this task; required in remote mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Task input; `url` selects the target page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<RunnerInput>,
}

impl RunnerConfig {
    /// Creates a runner with no region and no input.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: None,
            input: None,
        }
    }

    /// Sets the region.
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    /// Sets one input key, creating the input map if needed.
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    /// The target URL, when `input.url` is a non-empty string.
    pub fn url(&self) -> Option<&str> {
        self.input
            .as_ref()
            .and_then(|input| input.get("url"))
            .and_then(Value::as_str)
            .filter(|url| !url.is_empty())
    }

    /// The region, when set and non-empty.
    pub fn region(&self) -> Option<&str> {
        self.region.as_deref().filter(|region| !region.is_empty())
    }
}

/// Inbound request to execute a set of runners.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRequest {
    /// Runners to execute; at least one.
    pub runners: Vec<RunnerConfig>,
    /// Execution mode for every runner.
    pub mode: RunMode,
    /// Maximum jobs in flight; absent or non-positive means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<i64>,
    /// Per-job timeout in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Caller metadata; carried but not interpreted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Map<String, Value>>,
    /// Caller-supplied run id; generated when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
}

impl RunRequest {
    /// Creates a request with no limits, tags or caller-supplied id.
    pub fn new(mode: RunMode, runners: Vec<RunnerConfig>) -> Self {
        Self {
            runners,
            mode,
            concurrency: None,
            timeout: None,
            tags: None,
            run_id: None,
        }
    }

    /// Sets the maximum number of jobs in flight.
    pub fn with_concurrency(mut self, concurrency: i64) -> Self {
        self.concurrency = Some(concurrency);
        self
    }

    /// Sets the per-job timeout in milliseconds.
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout = Some(timeout_ms);
        self
    }

    /// Uses `run_id` instead of a generated id.
    pub fn with_run_id(mut self, run_id: impl Into<RunId>) -> Self {
        self.run_id = Some(run_id.into());
        self
    }

    /// Parse and validate a JSON request body.
    pub fn from_json(body: &[u8]) -> Result<Self> {
        let request: Self = serde_json::from_slice(body)
            .map_err(|err| PodError::validation(err.to_string()))?;
        request.validate()?;
        Ok(request)
    }

    /// Structural checks that do not depend on the mode's grouping rules.
    pub fn validate(&self) -> Result<()> {
        if self.runners.is_empty() {
            return Err(PodError::validation("at least one runner is required"));
        }
        if let Some(index) = self
            .runners
            .iter()
            .position(|runner| runner.name.trim().is_empty())
        {
            return Err(PodError::validation(format!(
                "runner at index {index} has an empty name"
            )));
        }
        if self.timeout == Some(0) {
            return Err(PodError::validation("timeout must be greater than zero"));
        }
        if let Some(run_id) = &self.run_id {
            if run_id.as_str().trim().is_empty() {
                return Err(PodError::validation("runId must not be empty"));
            }
        }
        Ok(())
    }

    /// Concurrency limit for the scheduler; `0` means unbounded.
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency
            .filter(|c| *c > 0)
            .and_then(|c| usize::try_from(c).ok())
            .unwrap_or(0)
    }
}

/// Runner result tallies across every job of a run.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct SummaryCounts {
    /// Runner results reported.
    pub total: usize,
    /// Results with status `pass`.
    pub passed: usize,
    /// Results with status `fail`.
    pub failed: usize,
    /// Results with status `error`.
    pub errored: usize,
}

/// Terminal artifact of a run, returned by `results`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// The summarized run.
    pub run_id: RunId,
    /// Overall state derived from the job states.
    pub state: JobState,
    /// One result per job, in planned job order.
    pub jobs: Vec<JobResult>,
    /// Runner result tallies.
    pub summary: SummaryCounts,
    /// When the run was submitted.
    pub created_at: DateTime<Utc>,
    /// When aggregation finished.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds from submission to completion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
}

impl RunSummary {
    /// Number of jobs whose state matches `predicate`.
    pub fn count_jobs(&self, predicate: impl Fn(JobState) -> bool) -> usize {
        self.jobs.iter().filter(|job| predicate(job.state)).count()
    }
}

/// Status of a run record in the store.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunRecordStatus {
    Running,
    Completed,
    Failed,
}

impl RunRecordStatus {
    /// Returns the status as stored and serialized.
    pub fn as_str(&self) -> &'static str {
        match self {
            RunRecordStatus::Running => "running",
            RunRecordStatus::Completed => "completed",
            RunRecordStatus::Failed => "failed",
        }
    }

    /// True for `completed` and `failed`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunRecordStatus::Running)
    }
}

impl std::str::FromStr for RunRecordStatus {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> anyhow::Result<Self> {
        match value {
            "running" => Ok(RunRecordStatus::Running),
            "completed" => Ok(RunRecordStatus::Completed),
            "failed" => Ok(RunRecordStatus::Failed),
            other => Err(anyhow::anyhow!("invalid run status: {other}")),
        }
    }
}

/// Store record for one run.
///
/// `summary` is set only once `status` is completed, `error` only once it
/// is failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    /// The run this record tracks.
    pub run_id: RunId,
    /// Lifecycle status.
    pub status: RunRecordStatus,
    /// Final summary of a completed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    /// Failure reason of a failed run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When the run was submitted.
    pub created_at: DateTime<Utc>,
    /// When the record last changed.
    pub updated_at: DateTime<Utc>,
}

impl RunRecord {
    /// A fresh record for a run that has just been accepted.
    pub fn running(run_id: RunId, created_at: DateTime<Utc>) -> Self {
        Self {
            run_id,
            status: RunRecordStatus::Running,
            summary: None,
            error: None,
            created_at,
            updated_at: created_at,
        }
    }
}

/// Response of `status`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStatus {
    /// The queried run.
    pub run_id: RunId,
    /// `running` until the run finishes, then the summary's overall state.
    pub state: JobState,
    /// Jobs in the summary; zero while running.
    pub total_jobs: usize,
    /// Jobs that completed.
    pub completed_jobs: usize,
    /// Jobs that failed or timed out.
    pub failed_jobs: usize,
    /// When the run was submitted.
    pub created_at: DateTime<Utc>,
    /// When the run record last changed.
    pub updated_at: DateTime<Utc>,
    /// Failure reason when the run pipeline itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&RunRecord> for RunStatus {
    fn from(record: &RunRecord) -> Self {
        let mut status = Self {
            run_id: record.run_id.clone(),
            state: JobState::Running,
            total_jobs: 0,
            completed_jobs: 0,
            failed_jobs: 0,
            created_at: record.created_at,
            updated_at: record.updated_at,
            error: None,
        };

        match (record.status, &record.summary) {
            (RunRecordStatus::Running, _) => {}
            (RunRecordStatus::Completed, Some(summary)) => {
                status.state = summary.state;
                status.total_jobs = summary.jobs.len();
                status.completed_jobs =
                    summary.count_jobs(|state| state == JobState::Completed);
                status.failed_jobs = summary.count_jobs(|state| state.is_failure());
            }
            (RunRecordStatus::Completed, None) | (RunRecordStatus::Failed, _) => {
                status.state = JobState::Failed;
                status.error = record.error.clone();
            }
        }

        status
    }
}

/// Response of `submit`.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    /// Id to poll with `status` and `results`.
    pub run_id: RunId,
}
