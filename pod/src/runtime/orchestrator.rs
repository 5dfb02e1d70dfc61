use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Notify};
use tokio::task::{JoinError, JoinHandle};
use tracing::Instrument;

use crate::aggregate::aggregate;
use crate::config::OrchestratorConfig;
use crate::error::{PodError, Result};
use crate::events::{RunEvent, RunEventBus};
use crate::executor::JobExecutor;
use crate::job::{Job, JobResult};
use crate::planner::plan;
use crate::run::{
    RunId, RunMode, RunRecord, RunRecordStatus, RunRequest, RunStatus, RunSummary, SubmitResponse,
};
use crate::scheduler::run_all;
use crate::store::{RunStore, RunTransition, StoreError};
use crate::telemetry;

/// Token for signaling graceful shutdown.
#[derive(Clone, Debug)]
pub struct ShutdownToken {
    inner: Arc<ShutdownTokenInner>,
}

#[derive(Debug)]
struct ShutdownTokenInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl ShutdownToken {
    /// Creates a token that is not yet cancelled.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ShutdownTokenInner {
                cancelled: AtomicBool::new(false),
                notify: Notify::new(),
            }),
        }
    }

    /// Cancels the token and wakes every waiter.
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Returns true once `cancel` has been called.
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Wait until cancelled.
    pub async fn cancelled(&self) {
        let notified = self.inner.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }
}

impl Default for ShutdownToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Accepts run requests and tracks them to completion.
///
/// `submit` plans the request, records the run as running and spawns the
/// schedule and aggregate pipeline in the background. Pipelines never touch
/// the store themselves: they report a terminal [`RunEvent`] over a channel
/// to a single state-update handler (started by [`Orchestrator::start`]),
/// which writes it to the [`RunStore`] and then re-broadcasts it.
pub struct Orchestrator {
    config: OrchestratorConfig,
    store: Arc<dyn RunStore>,
    executors: HashMap<RunMode, Arc<dyn JobExecutor>>,
    events: RunEventBus,
    updates: Mutex<Option<mpsc::UnboundedSender<RunEvent>>>,
    pending_updates: Mutex<Option<mpsc::UnboundedReceiver<RunEvent>>>,
    handler: Mutex<Option<JoinHandle<()>>>,
    shutdown_token: ShutdownToken,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut modes: Vec<&str> = self.executors.keys().map(RunMode::as_str).collect();
        modes.sort_unstable();

        f.debug_struct("Orchestrator")
            .field("config", &self.config)
            .field("modes", &modes)
            .field("events", &self.events)
            .field("started", &self.handler.lock().is_some())
            .field("shutdown_cancelled", &self.shutdown_token.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Assembles an orchestrator; prefer [`super::OrchestratorBuilder`].
    pub fn new(
        config: OrchestratorConfig,
        store: Arc<dyn RunStore>,
        executors: HashMap<RunMode, Arc<dyn JobExecutor>>,
        events: RunEventBus,
    ) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            config,
            store,
            executors,
            events,
            updates: Mutex::new(Some(sender)),
            pending_updates: Mutex::new(Some(receiver)),
            handler: Mutex::new(None),
            shutdown_token: ShutdownToken::new(),
        }
    }

    /// The configuration this orchestrator was built with.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The run store.
    pub fn store(&self) -> Arc<dyn RunStore> {
        Arc::clone(&self.store)
    }

    /// The event bus runs are published on.
    pub fn events(&self) -> &RunEventBus {
        &self.events
    }

    /// Subscribe to run lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.events.subscribe()
    }

    /// Returns true when an executor is configured for `mode`.
    pub fn supports(&self, mode: RunMode) -> bool {
        self.executors.contains_key(&mode)
    }

    /// Start the state-update handler.
    ///
    /// Runs submitted before `start` keep their terminal events queued until
    /// the handler is running.
    pub async fn start(&self) -> anyhow::Result<()> {
        let receiver = self
            .pending_updates
            .lock()
            .take()
            .ok_or_else(|| anyhow::anyhow!("orchestrator already started"))?;

        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let handle = tokio::spawn(Self::state_update_loop(store, events, receiver));
        *self.handler.lock() = Some(handle);

        tracing::info!(modes = self.executors.len(), "orchestrator started");
        Ok(())
    }

    /// Stop accepting runs and wait for in-flight runs to be recorded.
    ///
    /// The wait is bounded by `shutdown_timeout_ms`; runs still executing
    /// after that stay `running` in the store.
    pub async fn shutdown(&self) -> anyhow::Result<()> {
        tracing::info!("initiating graceful shutdown of orchestrator");

        self.shutdown_token.cancel();
        drop(self.updates.lock().take());

        let handle = self.handler.lock().take();
        if let Some(handle) = handle {
            match tokio::time::timeout(self.config.shutdown_timeout(), handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::warn!("state-update handler failed: {:?}", e),
                Err(_) => tracing::warn!("state-update handler timed out during shutdown"),
            }
        }

        tracing::info!("orchestrator shutdown complete");
        Ok(())
    }

    /// Returns true once `shutdown` has begun.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Validate, plan and start a run. Returns once the run is recorded;
    /// execution continues in the background.
    pub async fn submit(&self, request: RunRequest) -> Result<SubmitResponse> {
        if self.is_shutting_down() {
            return Err(PodError::ShuttingDown);
        }

        request.validate()?;
        let run_id = request.run_id.clone().unwrap_or_else(RunId::generate);
        let mode = request.mode;

        let jobs = plan(&request, &run_id, self.config.default_job_timeout_ms)?;
        let executor = self.executor_for(mode)?;
        for job in &jobs {
            executor.preflight(job)?;
        }

        let sender = self.updates.lock().clone().ok_or(PodError::ShuttingDown)?;

        let created_at = Utc::now();
        self.store
            .create(RunRecord::running(run_id.clone(), created_at))
            .await
            .map_err(|err| match err.downcast_ref::<StoreError>() {
                Some(StoreError::Duplicate { .. }) => PodError::Conflict {
                    run_id: run_id.clone(),
                },
                _ => PodError::Store(err),
            })?;

        telemetry::record_run_submitted(&run_id, mode, jobs.len());
        self.events.publish(RunEvent::Submitted {
            run_id: run_id.clone(),
            mode,
            jobs: jobs.len(),
            at: created_at,
        });

        self.spawn_pipeline(Pipeline {
            run_id: run_id.clone(),
            mode,
            jobs,
            executor,
            concurrency: request.concurrency_limit(),
            created_at,
            events: self.events.clone(),
            sender,
        });

        Ok(SubmitResponse { run_id })
    }

    /// Current status of a run.
    pub async fn status(&self, run_id: &RunId) -> Result<RunStatus> {
        let record = self.record(run_id).await?;
        Ok(RunStatus::from(&record))
    }

    /// Summary of a completed run.
    pub async fn results(&self, run_id: &RunId) -> Result<RunSummary> {
        let record = self.record(run_id).await?;
        match record.status {
            RunRecordStatus::Running => Err(PodError::StillRunning {
                run_id: run_id.clone(),
            }),
            RunRecordStatus::Failed => Err(PodError::RunFailed {
                run_id: run_id.clone(),
                message: record.error.unwrap_or_default(),
            }),
            RunRecordStatus::Completed => record.summary.ok_or_else(|| {
                PodError::Store(anyhow::anyhow!("run {run_id} is completed but has no summary"))
            }),
        }
    }

    async fn record(&self, run_id: &RunId) -> Result<RunRecord> {
        self.store
            .get(run_id)
            .await
            .map_err(PodError::Store)?
            .ok_or_else(|| PodError::NotFound {
                run_id: run_id.clone(),
            })
    }

    fn executor_for(&self, mode: RunMode) -> Result<Arc<dyn JobExecutor>> {
        self.executors.get(&mode).cloned().ok_or_else(|| {
            PodError::configuration(format!("no executor configured for {mode} mode"))
        })
    }

    fn spawn_pipeline(&self, pipeline: Pipeline) {
        tokio::spawn(async move {
            let Pipeline {
                run_id,
                mode,
                jobs,
                executor,
                concurrency,
                created_at,
                events,
                sender,
            } = pipeline;

            let span = telemetry::run_span(&run_id, mode, jobs.len());
            let task_run_id = run_id.clone();
            // nested task so a panic surfaces as a JoinError instead of
            // leaving the run stuck in running
            let work = tokio::spawn(
                async move {
                    execute_run(task_run_id, jobs, executor, concurrency, created_at, events).await
                }
                .instrument(span),
            );

            let event = match work.await {
                Ok(summary) => RunEvent::Completed { run_id, summary },
                Err(err) => RunEvent::Failed {
                    run_id,
                    error: join_error_message(err),
                },
            };

            if let Err(unsent) = sender.send(event) {
                tracing::warn!(
                    run_id = %unsent.0.run_id(),
                    "state-update handler gone; run outcome not recorded"
                );
            }
        });
    }

    async fn state_update_loop(
        store: Arc<dyn RunStore>,
        events: RunEventBus,
        mut receiver: mpsc::UnboundedReceiver<RunEvent>,
    ) {
        while let Some(event) = receiver.recv().await {
            let transition = match &event {
                RunEvent::Completed { run_id, summary } => {
                    telemetry::record_run_finished(run_id, summary.state, summary.duration_ms);
                    Some(RunTransition::Completed(summary.clone()))
                }
                RunEvent::Failed { run_id, error } => {
                    telemetry::record_run_failed(run_id, error);
                    Some(RunTransition::Failed(error.clone()))
                }
                _ => None,
            };

            if let Some(transition) = transition {
                if let Err(err) = store.update(event.run_id(), transition).await {
                    tracing::error!(
                        run_id = %event.run_id(),
                        error = %format!("{err:#}"),
                        "failed to record run outcome"
                    );
                }
            }

            events.publish(event);
        }

        tracing::info!("state-update handler stopped");
    }
}

struct Pipeline {
    run_id: RunId,
    mode: RunMode,
    jobs: Vec<Job>,
    executor: Arc<dyn JobExecutor>,
    concurrency: usize,
    created_at: DateTime<Utc>,
    events: RunEventBus,
    sender: mpsc::UnboundedSender<RunEvent>,
}

async fn execute_run(
    run_id: RunId,
    jobs: Vec<Job>,
    executor: Arc<dyn JobExecutor>,
    concurrency: usize,
    created_at: DateTime<Utc>,
    events: RunEventBus,
) -> RunSummary {
    let reporting = ReportingExecutor {
        inner: executor,
        run_id: run_id.clone(),
        events,
    };
    let results = run_all(&jobs, &reporting, concurrency).await;
    aggregate(&run_id, &jobs, results, created_at, Some(Utc::now()))
}

/// Publishes `JobFinished` as soon as each job's result is in.
struct ReportingExecutor {
    inner: Arc<dyn JobExecutor>,
    run_id: RunId,
    events: RunEventBus,
}

#[async_trait]
impl JobExecutor for ReportingExecutor {
    async fn execute(&self, job: &Job) -> JobResult {
        let result = self.inner.execute(job).await;
        self.events.publish(RunEvent::JobFinished {
            run_id: self.run_id.clone(),
            result: result.clone(),
        });
        result
    }

    fn mode(&self) -> RunMode {
        self.inner.mode()
    }

    fn preflight(&self, job: &Job) -> Result<()> {
        self.inner.preflight(job)
    }
}

fn join_error_message(err: JoinError) -> String {
    if !err.is_panic() {
        return "run pipeline was cancelled".to_string();
    }
    let payload = err.into_panic();
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("run pipeline panicked: {detail}")
}
