//! Error types surfaced by the orchestrator API.

use crate::run::RunId;

/// Result alias used by the orchestrator API.
pub type Result<T> = std::result::Result<T, PodError>;

/// Errors returned synchronously by `submit`, `status` and `results`.
///
/// Job-level failures never show up here; they are captured inside the
/// run's [`crate::job::JobResult`]s.
#[derive(Debug, thiserror::Error)]
pub enum PodError {
    /// The run request is malformed.
    #[error("invalid run request: {message}")]
    Validation {
        /// What was wrong with the request.
        message: String,
    },

    /// The request is well formed but cannot be planned or routed with the
    /// current configuration (missing URL or region, unmapped region).
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// A run with the caller-supplied id already exists.
    #[error("run already exists: {run_id}")]
    Conflict {
        /// The duplicate run id.
        run_id: RunId,
    },

    /// No run is recorded under this id.
    #[error("run not found: {run_id}")]
    NotFound {
        /// The unknown run id.
        run_id: RunId,
    },

    /// Results were requested before the run reached a terminal state.
    #[error("run {run_id} is still running; poll its status first")]
    StillRunning {
        /// The run being queried.
        run_id: RunId,
    },

    /// The run pipeline failed; carries the stored failure reason.
    #[error("run {run_id} failed: {message}")]
    RunFailed {
        /// The failed run.
        run_id: RunId,
        /// The failure reason recorded for the run.
        message: String,
    },

    /// The orchestrator no longer accepts submissions.
    #[error("orchestrator is shutting down")]
    ShuttingDown,

    /// The run store failed.
    #[error("run store error: {0:#}")]
    Store(anyhow::Error),
}

impl PodError {
    /// Creates a validation error.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Returns true if the error means the run id is unknown.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// The HTTP status code a transport adapter should answer with.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } | Self::Configuration { .. } => 400,
            Self::NotFound { .. } => 404,
            Self::Conflict { .. } | Self::StillRunning { .. } => 409,
            Self::ShuttingDown => 503,
            Self::RunFailed { .. } | Self::Store(_) => 500,
        }
    }
}
