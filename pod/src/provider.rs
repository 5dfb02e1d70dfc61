//! The task-execution contract consumed by the executors.
//!
//! A [`TaskProvider`] knows which named tasks exist and runs a batch of them
//! against one target. The same contract is spoken over HTTP between the
//! orchestrator and its regional peers: [`RemoteTaskRequest`] goes out,
//! [`TaskBatchOutput`] comes back, and [`serve_remote`] is the entry point a
//! peer calls with whatever it decoded off the wire.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::job::{Job, RunnerResult};
use crate::run::{RunId, RunnerInput};

/// One task to run, with its own input (already containing `url`).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TaskInvocation {
    /// Task name.
    pub name: String,
    /// Task input.
    #[serde(default)]
    pub input: RunnerInput,
}

/// A batch of tasks executed in one provider call.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBatch {
    /// Tasks to run.
    pub runners: Vec<TaskInvocation>,
    /// Region the batch runs for, in remote mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    /// Run the batch belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunId>,
    /// Milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl TaskBatch {
    /// Every runner of `job`, with the job's region, run and timeout.
    pub fn for_job(job: &Job) -> Self {
        Self {
            runners: invocations(job),
            region: job.region.clone(),
            run_id: Some(job.run_id.clone()),
            timeout: job.timeout,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskBatchOutput {
    /// One result per task.
    pub results: Vec<RunnerResult>,
}

/// Payload posted to a regional peer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTaskRequest {
    /// Target URL shared by every task.
    pub url: String,
    /// Tasks to run.
    pub runners: Vec<TaskInvocation>,
    /// Run the request belongs to.
    pub run_id: RunId,
    /// Region the peer serves.
    pub region: String,
    /// Deadline for the whole batch in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

impl RemoteTaskRequest {
    /// The batch a peer hands to its local provider.
    pub fn into_batch(self) -> TaskBatch {
        TaskBatch {
            runners: self.runners,
            region: Some(self.region),
            run_id: Some(self.run_id),
            timeout: self.timeout,
        }
    }
}

/// Executes named tasks. Implemented by the browser-automation layer.
#[async_trait]
pub trait TaskProvider: Send + Sync {
    /// Whether a task with this name is registered.
    fn has_task(&self, name: &str) -> bool;

    /// Run every task of the batch and return one result per task.
    async fn run_tasks(&self, batch: TaskBatch) -> anyhow::Result<TaskBatchOutput>;
}

/// Names in `names` the provider does not know, in request order.
pub fn missing_tasks<'a, P>(provider: &P, names: impl IntoIterator<Item = &'a str>) -> Vec<String>
where
    P: TaskProvider + ?Sized,
{
    names
        .into_iter()
        .filter(|name| !provider.has_task(name))
        .map(str::to_string)
        .collect()
}

pub(crate) fn invocations(job: &Job) -> Vec<TaskInvocation> {
    job.runners
        .iter()
        .map(|runner| TaskInvocation {
            name: runner.name.clone(),
            input: runner.input.clone().unwrap_or_default(),
        })
        .collect()
}

/// Handle a remote task request on the peer side.
///
/// # Errors
///
/// Fails without running anything when a requested task is unknown, and
/// propagates provider errors unchanged.
pub async fn serve_remote<P>(
    provider: &P,
    request: RemoteTaskRequest,
) -> anyhow::Result<TaskBatchOutput>
where
    P: TaskProvider + ?Sized,
{
    let missing = missing_tasks(provider, request.runners.iter().map(|r| r.name.as_str()));
    if !missing.is_empty() {
        anyhow::bail!("unknown runners: {}", missing.join(", "));
    }

    tracing::info!(
        run_id = %request.run_id,
        region = %request.region,
        url = %request.url,
        runners = request.runners.len(),
        "serving remote task request"
    );
    provider.run_tasks(request.into_batch()).await
}
