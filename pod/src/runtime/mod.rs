/// Builder for assembling an orchestrator from its dependencies.
pub mod builder;
/// The orchestrator: submission, status, results and shutdown.
pub mod orchestrator;

pub use builder::OrchestratorBuilder;
pub use orchestrator::{Orchestrator, ShutdownToken};
