use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::job::JobResult;
use crate::run::{RunId, RunMode, RunSummary};

/// Lifecycle message for a run.
///
/// `Completed` and `Failed` are terminal and are applied to the run store by
/// the orchestrator's state-update handler before being re-broadcast.
/// `Submitted` and `JobFinished` are informational only; `JobFinished` is
/// published as soon as each job's result is in, while the run continues.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
#[non_exhaustive]
pub enum RunEvent {
    Submitted {
        run_id: RunId,
        mode: RunMode,
        jobs: usize,
        at: DateTime<Utc>,
    },
    JobFinished {
        run_id: RunId,
        result: JobResult,
    },
    Completed {
        run_id: RunId,
        summary: RunSummary,
    },
    Failed {
        run_id: RunId,
        error: String,
    },
}

impl RunEvent {
    /// The run this event belongs to.
    pub fn run_id(&self) -> &RunId {
        match self {
            RunEvent::Submitted { run_id, .. }
            | RunEvent::JobFinished { run_id, .. }
            | RunEvent::Completed { run_id, .. }
            | RunEvent::Failed { run_id, .. } => run_id,
        }
    }

    /// True for `Completed` and `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunEvent::Completed { .. } | RunEvent::Failed { .. })
    }
}

/// In-process fan-out of run events over a tokio broadcast channel.
///
/// Publishing never waits on subscribers; a subscriber that falls more than
/// `capacity` events behind receives `RecvError::Lagged`.
#[derive(Clone)]
pub struct RunEventBus {
    sender: broadcast::Sender<RunEvent>,
    capacity: usize,
}

impl std::fmt::Debug for RunEventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunEventBus")
            .field("capacity", &self.capacity)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}

impl RunEventBus {
    /// Creates a bus buffering up to `capacity` events (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self { sender, capacity }
    }

    /// Maximum number of buffered events per subscriber.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Broadcast `event`; dropped silently when nobody is subscribed.
    pub fn publish(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<RunEvent> {
        self.sender.subscribe()
    }
}
