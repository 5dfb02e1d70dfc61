use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use pod::*;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Task provider that knows a fixed set of task names.
///
/// Every known task passes unless given an override; the provider can be
/// made to fail, to sleep, or to block until [`MockTaskProvider::release`].
#[derive(Clone)]
pub struct MockTaskProvider {
    known: Arc<Mutex<HashSet<String>>>,
    overrides: Arc<Mutex<HashMap<String, RunnerResult>>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    gate: Arc<watch::Sender<bool>>,
    batches: Arc<Mutex<Vec<TaskBatch>>>,
}

impl MockTaskProvider {
    pub fn new<'a>(tasks: impl IntoIterator<Item = &'a str>) -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            known: Arc::new(Mutex::new(tasks.into_iter().map(str::to_string).collect())),
            overrides: Arc::new(Mutex::new(HashMap::new())),
            failure: Arc::new(Mutex::new(None)),
            delay: Arc::new(Mutex::new(None)),
            gate: Arc::new(gate),
            batches: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Report `result` whenever the task named `result.name` runs.
    pub fn with_result(self, result: RunnerResult) -> Self {
        self.overrides.lock().insert(result.name.clone(), result);
        self
    }

    /// Fail every batch with `message`.
    pub fn failing(self, message: impl Into<String>) -> Self {
        *self.failure.lock() = Some(message.into());
        self
    }

    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock() = Some(delay);
        self
    }

    /// Hold every batch until [`MockTaskProvider::release`] is called.
    pub fn gated(self) -> Self {
        self.gate.send_replace(false);
        self
    }

    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    pub fn batches(&self) -> Vec<TaskBatch> {
        self.batches.lock().clone()
    }

    pub fn assert_call_count_eq(&self, expected: usize) {
        let actual = self.batches.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} provider calls, got {}",
            expected, actual
        );
    }
}

#[async_trait]
impl TaskProvider for MockTaskProvider {
    fn has_task(&self, name: &str) -> bool {
        self.known.lock().contains(name)
    }

    async fn run_tasks(&self, batch: TaskBatch) -> anyhow::Result<TaskBatchOutput> {
        self.batches.lock().push(batch.clone());

        let mut gate = self.gate.subscribe();
        gate.wait_for(|open| *open).await?;

        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().clone() {
            anyhow::bail!(message);
        }

        let overrides = self.overrides.lock();
        let results = batch
            .runners
            .iter()
            .map(|runner| {
                overrides
                    .get(&runner.name)
                    .cloned()
                    .unwrap_or_else(|| RunnerResult::pass(runner.name.clone()))
            })
            .collect();
        Ok(TaskBatchOutput { results })
    }
}

#[derive(Clone, Debug)]
pub struct TransportCall {
    pub endpoint: String,
    pub request: RemoteTaskRequest,
    pub timeout: Option<Duration>,
}

#[derive(Clone, Debug)]
enum Outcome {
    Error(String),
    TimedOut(String),
}

/// Remote transport that answers in-process.
///
/// Endpoints pass every runner unless told to fail or time out.
#[derive(Clone, Default)]
pub struct MockTransport {
    calls: Arc<Mutex<Vec<TransportCall>>>,
    outcomes: Arc<Mutex<HashMap<String, Outcome>>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls to `endpoint` fail with `message`.
    pub fn fail_endpoint(self, endpoint: &str, message: &str) -> Self {
        self.outcomes
            .lock()
            .insert(endpoint.to_string(), Outcome::Error(message.to_string()));
        self
    }

    /// Calls to `endpoint` fail with an `ETIMEDOUT` buried in the chain.
    pub fn time_out_endpoint(self, endpoint: &str) -> Self {
        self.outcomes.lock().insert(
            endpoint.to_string(),
            Outcome::TimedOut(format!("connect ETIMEDOUT {endpoint}")),
        );
        self
    }

    pub fn calls(&self) -> Vec<TransportCall> {
        self.calls.lock().clone()
    }

    pub fn assert_call_count_eq(&self, expected: usize) {
        let actual = self.calls.lock().len();
        assert_eq!(
            actual, expected,
            "Expected {} transport calls, got {}",
            expected, actual
        );
    }
}

#[async_trait]
impl RemoteTransport for MockTransport {
    async fn run_tasks(
        &self,
        endpoint: &str,
        request: &RemoteTaskRequest,
        timeout: Option<Duration>,
    ) -> anyhow::Result<TaskBatchOutput> {
        self.calls.lock().push(TransportCall {
            endpoint: endpoint.to_string(),
            request: request.clone(),
            timeout,
        });

        let outcome = self.outcomes.lock().get(endpoint).cloned();
        match outcome {
            None => Ok(TaskBatchOutput {
                results: request
                    .runners
                    .iter()
                    .map(|runner| RunnerResult::pass(runner.name.clone()))
                    .collect(),
            }),
            Some(Outcome::Error(message)) => {
                Err(anyhow::anyhow!(message).context(format!("request to {endpoint} failed")))
            }
            Some(Outcome::TimedOut(code)) => Err(anyhow::Error::new(io::Error::new(
                io::ErrorKind::Other,
                code,
            ))
            .context("socket hang up")
            .context(format!("request to {endpoint} failed"))),
        }
    }
}

/// Executor that records the jobs it runs and how many overlapped.
#[derive(Clone)]
pub struct RecordingExecutor {
    mode: RunMode,
    delay: Duration,
    jobs: Arc<Mutex<Vec<Job>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl RecordingExecutor {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            delay: Duration::from_millis(10),
            jobs: Arc::new(Mutex::new(Vec::new())),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn jobs(&self) -> Vec<Job> {
        self.jobs.lock().clone()
    }

    /// Highest number of `execute` calls seen in flight at once.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobExecutor for RecordingExecutor {
    async fn execute(&self, job: &Job) -> JobResult {
        let started_at = Utc::now();
        self.jobs.lock().push(job.clone());
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.active.fetch_sub(1, Ordering::SeqCst);
        let results = job
            .runners
            .iter()
            .map(|runner| RunnerResult::pass(runner.name.clone()))
            .collect();
        JobResult::completed(job, started_at, results)
    }

    fn mode(&self) -> RunMode {
        self.mode
    }
}
