//! Prometheus metrics for pod.
//!
//! Compiled only with the `metrics` feature.
//!
//! # Metrics
//!
//! ## Counters
//! - `pod_runs_submitted_total{mode}` - Runs accepted by `submit`
//! - `pod_runs_finished_total{state}` - Runs that reached a terminal state
//! - `pod_jobs_finished_total{mode,state}` - Jobs that produced a result
//!
//! ## Histograms
//! - `pod_job_duration_seconds{mode,state}` - Job execution duration
#![cfg(feature = "metrics")]

use prometheus::{exponential_buckets, CounterVec, HistogramOpts, HistogramVec, Opts, Registry};
use std::sync::LazyLock;

/// Registry holding every pod metric.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub static RUNS_SUBMITTED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("pod_runs_submitted_total", "Total number of runs submitted");
    CounterVec::new(opts, &["mode"]).expect("pod_runs_submitted_total metric creation failed")
});

/// Labels: `state` is the run's terminal state (`completed`, `failed`,
/// `timed_out`, ...).
pub static RUNS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("pod_runs_finished_total", "Total number of runs finished");
    CounterVec::new(opts, &["state"]).expect("pod_runs_finished_total metric creation failed")
});

pub static JOBS_FINISHED_TOTAL: LazyLock<CounterVec> = LazyLock::new(|| {
    let opts = Opts::new("pod_jobs_finished_total", "Total number of jobs finished");
    CounterVec::new(opts, &["mode", "state"])
        .expect("pod_jobs_finished_total metric creation failed")
});

pub static JOB_DURATION_SECONDS: LazyLock<HistogramVec> = LazyLock::new(|| {
    let buckets = exponential_buckets(0.01, 2.0, 14).expect("bucket creation failed");
    let opts = HistogramOpts::new(
        "pod_job_duration_seconds",
        "Job execution duration in seconds",
    )
    .buckets(buckets);
    HistogramVec::new(opts, &["mode", "state"])
        .expect("pod_job_duration_seconds metric creation failed")
});

/// Register every metric with [`REGISTRY`]. Safe to call repeatedly.
pub fn init_metrics() -> anyhow::Result<()> {
    let registry = &*REGISTRY;

    for metric in [
        Box::new(RUNS_SUBMITTED_TOTAL.clone()) as Box<dyn prometheus::core::Collector>,
        Box::new(RUNS_FINISHED_TOTAL.clone()),
        Box::new(JOBS_FINISHED_TOTAL.clone()),
        Box::new(JOB_DURATION_SECONDS.clone()),
    ] {
        if let Err(e) = registry.register(metric) {
            if !matches!(e, prometheus::Error::AlreadyReg) {
                return Err(e.into());
            }
        }
    }

    Ok(())
}

/// Counts a submitted run by mode.
pub fn record_run_submitted(mode: &str) {
    RUNS_SUBMITTED_TOTAL.with_label_values(&[mode]).inc();
}

/// Counts a finished run by terminal state.
pub fn record_run_finished(state: &str) {
    RUNS_FINISHED_TOTAL.with_label_values(&[state]).inc();
}

/// Counts a finished job and records its duration.
pub fn record_job_finished(mode: &str, state: &str, duration_secs: f64) {
    JOBS_FINISHED_TOTAL.with_label_values(&[mode, state]).inc();
    JOB_DURATION_SECONDS
        .with_label_values(&[mode, state])
        .observe(duration_secs);
}

/// Gather all registered metrics in Prometheus text format.
pub fn gather_metrics() -> anyhow::Result<String> {
    let encoder = prometheus::TextEncoder::new();
    encoder
        .encode_to_string(&REGISTRY.gather())
        .map_err(Into::into)
}
