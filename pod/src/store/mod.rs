//! Run state storage.
//!
//! A [`RunStore`] holds one [`RunRecord`] per run. Records are created as
//! running by `submit` and receive exactly one terminal transition from the
//! orchestrator's state-update handler; nothing is ever deleted.

/// In-memory store for tests and single-process deployments.
pub mod memory;
/// PostgreSQL-backed store.
#[cfg(feature = "postgres")]
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::run::{RunId, RunRecord, RunRecordStatus, RunSummary};

pub use memory::InMemoryRunStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresRunStore;

/// Terminal transition applied to a running record.
#[derive(Clone, Debug, PartialEq)]
pub enum RunTransition {
    Completed(RunSummary),
    Failed(String),
}

impl RunTransition {
    /// The record status this transition leads to.
    pub fn status(&self) -> RunRecordStatus {
        match self {
            RunTransition::Completed(_) => RunRecordStatus::Completed,
            RunTransition::Failed(_) => RunRecordStatus::Failed,
        }
    }
}

/// Rejections a store reports for lifecycle violations.
///
/// Stores return these inside `anyhow::Error` so callers can downcast.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("run {run_id} already exists")]
    Duplicate { run_id: RunId },

    #[error("run {run_id} does not exist")]
    Unknown { run_id: RunId },

    #[error("run {run_id} is already {status}")]
    AlreadyTerminal {
        run_id: RunId,
        status: &'static str,
    },
}

#[async_trait]
pub trait RunStore: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::Duplicate`] when the id
    /// is taken.
    async fn create(&self, record: RunRecord) -> anyhow::Result<()>;

    async fn get(&self, run_id: &RunId) -> anyhow::Result<Option<RunRecord>>;

    /// Move a running record to its terminal state and return it.
    ///
    /// Fails with [`StoreError::Unknown`] or [`StoreError::AlreadyTerminal`].
    async fn update(&self, run_id: &RunId, transition: RunTransition) -> anyhow::Result<RunRecord>;
}

/// Apply `transition` to a running `record`, stamping `updated_at`.
pub(crate) fn apply_transition(
    record: &mut RunRecord,
    transition: RunTransition,
    at: DateTime<Utc>,
) -> Result<(), StoreError> {
    if record.status.is_terminal() {
        return Err(StoreError::AlreadyTerminal {
            run_id: record.run_id.clone(),
            status: record.status.as_str(),
        });
    }

    record.status = transition.status();
    match transition {
        RunTransition::Completed(summary) => record.summary = Some(summary),
        RunTransition::Failed(error) => record.error = Some(error),
    }
    record.updated_at = at;
    Ok(())
}
