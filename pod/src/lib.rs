//! Pod - run orchestration for named browser tasks.
//!
//! A caller submits a [`RunRequest`]: a list of named runners, each with its
//! own input (usually a target `url`) and, in remote mode, a region. Pod
//! fans the request out into jobs, executes them in-process or on regional
//! peers with bounded parallelism, classifies failures and timeouts, and
//! folds the outcomes into a [`RunSummary`] that can be polled later.
//!
//! # Core Concepts
//!
//! - **Run**: one submission, identified by a [`RunId`]. Its lifecycle lives
//!   in a [`RunStore`] as a [`RunRecord`].
//!
//! - **Job**: a group of runners sharing one target, produced by
//!   [`planner::plan`]. Every job yields exactly one [`JobResult`].
//!
//! - **Executors**: [`LocalExecutor`] calls a [`TaskProvider`] directly;
//!   [`RemoteExecutor`] posts to the peer serving the job's region through a
//!   [`RemoteTransport`]. Both implement [`JobExecutor`].
//!
//! - **Scheduling**: [`scheduler::run_all`] runs a job list in batches of at
//!   most `concurrency` jobs.
//!
//! - **Runtime**: the [`Orchestrator`] ties everything together behind
//!   `submit`, `status` and `results`.
//!
//! # Feature Flags
//!
//! - `postgres` - [`store::PostgresRunStore`] via sqlx
//! - `metrics` - Prometheus metrics
//!
//! # Example
//!
//! ```ignore
//! use pod::*;
//!
//! let orchestrator = OrchestratorBuilder::new(OrchestratorConfig::default())
//!     .with_provider(provider)
//!     .build()?;
//! orchestrator.start().await?;
//!
//! let request = RunRequest::new(
//!     RunMode::Local,
//!     vec![RunnerConfig::new("title").with_input("url", "https://example.com")],
//! );
//! let SubmitResponse { run_id } = orchestrator.submit(request).await?;
//! let status = orchestrator.status(&run_id).await?;
//! ```

/// Reduction of job results into a run summary.
pub mod aggregate;

/// Orchestrator configuration and region endpoint mapping.
pub mod config;

/// Errors returned by the orchestrator API.
pub mod error;

/// Run lifecycle events and the in-process event bus.
pub mod events;

/// Job execution strategies.
///
/// The `executor` module provides the [`JobExecutor`] trait and its two
/// implementations, the HTTP transport used for remote peers, and timeout
/// classification of remote failures.
pub mod executor;

/// Jobs and their results.
pub mod job;

#[cfg(feature = "metrics")]
/// Prometheus metrics, enabled by the `metrics` feature.
pub mod metrics;

/// Fan-out of a run request into jobs.
pub mod planner;

/// The task-execution contract and its wire types.
pub mod provider;

/// Run requests, records, statuses and summaries.
pub mod run;

/// The orchestrator and its builder.
pub mod runtime;

/// Concurrency-bounded job execution.
pub mod scheduler;

/// Run state storage.
pub mod store;

/// Tracing spans and event recording helpers.
pub mod telemetry;

pub use aggregate::aggregate;
pub use config::{OrchestratorConfig, RegionEndpoints};
pub use error::PodError;
pub use events::{RunEvent, RunEventBus};
pub use executor::{
    classify_failure, FailureKind, HttpTransport, JobExecutor, LocalExecutor, RemoteExecutor,
    RemoteTransport, TransportError,
};
pub use job::{Job, JobId, JobResult, JobState, RunnerResult, RunnerStatus};
pub use planner::plan;
pub use provider::{
    serve_remote, RemoteTaskRequest, TaskBatch, TaskBatchOutput, TaskInvocation, TaskProvider,
};
pub use run::{
    RunId, RunMode, RunRecord, RunRecordStatus, RunRequest, RunStatus, RunSummary, RunnerConfig,
    RunnerInput, SubmitResponse, SummaryCounts,
};
pub use runtime::{Orchestrator, OrchestratorBuilder, ShutdownToken};
pub use scheduler::run_all;
pub use store::{InMemoryRunStore, RunStore, RunTransition, StoreError};
#[cfg(feature = "postgres")]
pub use store::PostgresRunStore;
