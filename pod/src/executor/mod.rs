/// Timeout classification over error source chains.
pub mod classify;
/// In-process execution through a [`crate::provider::TaskProvider`].
pub mod local;
/// Region-routed execution on remote peers.
pub mod remote;
/// Wire transport used by the remote executor.
pub mod transport;

use async_trait::async_trait;

use crate::error::Result;
use crate::job::{Job, JobResult};
use crate::run::RunMode;

pub use classify::{classify_failure, FailureKind, TIMEOUT_SIGNATURES};
pub use local::LocalExecutor;
pub use remote::RemoteExecutor;
pub use transport::{HttpTransport, RemoteTransport, TransportError};

/// Executes one job.
///
/// `execute` never fails: every problem ends up in the returned result's
/// `state` and `error`, so one job cannot abort its siblings.
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Run `job` and report its outcome.
    async fn execute(&self, job: &Job) -> JobResult;

    /// The run mode this executor serves, used for telemetry labels.
    fn mode(&self) -> RunMode;

    /// Reject a planned job before any run state exists.
    ///
    /// Called by `submit` for every job; the default accepts everything.
    fn preflight(&self, _job: &Job) -> Result<()> {
        Ok(())
    }
}
