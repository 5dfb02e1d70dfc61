use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use super::classify::{classify_failure, FailureKind};
use super::transport::RemoteTransport;
use super::JobExecutor;
use crate::config::RegionEndpoints;
use crate::error::PodError;
use crate::job::{Job, JobResult};
use crate::provider::{invocations, RemoteTaskRequest};
use crate::run::RunMode;

/// Dispatches each job to the peer serving its region.
#[derive(Clone)]
pub struct RemoteExecutor {
    regions: RegionEndpoints,
    transport: Arc<dyn RemoteTransport>,
}

impl std::fmt::Debug for RemoteExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteExecutor")
            .field("regions", &self.regions)
            .finish_non_exhaustive()
    }
}

impl RemoteExecutor {
    /// Creates an executor dispatching through `transport`.
    pub fn new(regions: RegionEndpoints, transport: Arc<dyn RemoteTransport>) -> Self {
        Self { regions, transport }
    }

    /// The region to endpoint map used for dispatch.
    pub fn regions(&self) -> &RegionEndpoints {
        &self.regions
    }

    /// Build the peer request, or explain why the job cannot be sent.
    fn prepare<'a>(&'a self, job: &Job) -> Result<(&'a str, RemoteTaskRequest), String> {
        let region = job
            .region
            .as_deref()
            .ok_or_else(|| format!("job {} has no region; remote execution requires one", job.job_id))?;
        let endpoint = self.regions.resolve(region).map_err(|err| err.to_string())?;

        let urls: BTreeSet<Option<&str>> = job.runners.iter().map(|r| r.url()).collect();
        let url = match urls.into_iter().collect::<Vec<_>>().as_slice() {
            [Some(url)] => (*url).to_string(),
            [] | [None] => return Err(format!("job {} has no target url", job.job_id)),
            many => {
                let listed: Vec<&str> = many.iter().map(|u| u.unwrap_or("<missing>")).collect();
                return Err(format!(
                    "runners in job {} do not share a single url: {}",
                    job.job_id,
                    listed.join(", ")
                ));
            }
        };

        Ok((
            endpoint,
            RemoteTaskRequest {
                url,
                runners: invocations(job),
                run_id: job.run_id.clone(),
                region: region.to_string(),
                timeout: job.timeout,
            },
        ))
    }
}

#[async_trait]
impl JobExecutor for RemoteExecutor {
    async fn execute(&self, job: &Job) -> JobResult {
        let started_at = Utc::now();

        let (endpoint, request) = match self.prepare(job) {
            Ok(prepared) => prepared,
            Err(message) => {
                tracing::warn!(job_id = %job.job_id, error = %message, "remote job rejected before dispatch");
                return JobResult::failed(job, started_at, message);
            }
        };

        tracing::debug!(
            job_id = %job.job_id,
            region = %request.region,
            endpoint = %endpoint,
            "dispatching job to peer"
        );

        match self
            .transport
            .run_tasks(endpoint, &request, job.timeout_duration())
            .await
        {
            Ok(output) => JobResult::completed(job, started_at, output.results),
            Err(err) => {
                let message = format!("{err:#}");
                match classify_failure(&err) {
                    FailureKind::TimedOut => {
                        tracing::warn!(job_id = %job.job_id, region = %request.region, error = %message, "remote job timed out");
                        JobResult::timed_out(job, started_at, message)
                    }
                    FailureKind::Failed => {
                        tracing::warn!(job_id = %job.job_id, region = %request.region, error = %message, "remote job failed");
                        JobResult::failed(job, started_at, message)
                    }
                }
            }
        }
    }

    fn mode(&self) -> RunMode {
        RunMode::Remote
    }

    fn preflight(&self, job: &Job) -> crate::error::Result<()> {
        match job.region.as_deref() {
            Some(region) => self.regions.resolve(region).map(|_| ()),
            None => Err(PodError::configuration(format!(
                "job {} has no region; remote execution requires one",
                job.job_id
            ))),
        }
    }
}
