use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::config::OrchestratorConfig;
use crate::events::RunEventBus;
use crate::executor::{HttpTransport, JobExecutor, LocalExecutor, RemoteExecutor, RemoteTransport};
use crate::provider::TaskProvider;
use crate::run::RunMode;
use crate::store::{InMemoryRunStore, RunStore};

use super::orchestrator::Orchestrator;

/// Builder for an [`Orchestrator`] with explicit dependencies.
///
/// Local mode is enabled by a task provider, remote mode by region
/// endpoints in the config (talking through `HttpTransport` unless a
/// transport is given). Either mode can also be served by a custom executor.
/// The store defaults to [`InMemoryRunStore`].
///
/// # Example
///
/// ```ignore
/// use pod::*;
///
/// let orchestrator = OrchestratorBuilder::new(config)
///     .with_store(store)
///     .with_provider(provider)
///     .build()?;
/// orchestrator.start().await?;
/// ```
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    store: Option<Arc<dyn RunStore>>,
    provider: Option<Arc<dyn TaskProvider>>,
    transport: Option<Arc<dyn RemoteTransport>>,
    executors: HashMap<RunMode, Arc<dyn JobExecutor>>,
    events: Option<RunEventBus>,
}

impl fmt::Debug for OrchestratorBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestratorBuilder")
            .field("config", &self.config)
            .field("store_set", &self.store.is_some())
            .field("provider_set", &self.provider.is_some())
            .field("transport_set", &self.transport.is_some())
            .field("custom_executors", &self.executors.len())
            .field("events_set", &self.events.is_some())
            .finish()
    }
}

impl OrchestratorBuilder {
    /// Starts a builder from `config`.
    pub fn new(config: OrchestratorConfig) -> Self {
        Self {
            config,
            store: None,
            provider: None,
            transport: None,
            executors: HashMap::new(),
            events: None,
        }
    }

    /// Sets the run store; defaults to [`InMemoryRunStore`].
    pub fn with_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Set the task provider used by local mode.
    pub fn with_provider(mut self, provider: Arc<dyn TaskProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Set the transport used by remote mode.
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Serve `mode` with a custom executor instead of the built-in one.
    pub fn with_executor(mut self, mode: RunMode, executor: Arc<dyn JobExecutor>) -> Self {
        self.executors.insert(mode, executor);
        self
    }

    /// Sets the event bus; defaults to a new bus sized by the config.
    pub fn with_events(mut self, events: RunEventBus) -> Self {
        self.events = Some(events);
        self
    }

    /// Wires executors and defaults into an [`Orchestrator`].
    pub fn build(self) -> anyhow::Result<Orchestrator> {
        let mut executors = self.executors;

        if let Some(provider) = self.provider {
            executors
                .entry(RunMode::Local)
                .or_insert_with(|| {
                    Arc::new(LocalExecutor::new(provider)) as Arc<dyn JobExecutor>
                });
        }

        if !executors.contains_key(&RunMode::Remote) {
            let transport = match self.transport {
                Some(transport) => Some(transport),
                None if !self.config.regions.is_empty() => {
                    let http = HttpTransport::new(self.config.rpc_timeout())?;
                    Some(Arc::new(http) as Arc<dyn RemoteTransport>)
                }
                None => None,
            };
            if let Some(transport) = transport {
                executors.insert(
                    RunMode::Remote,
                    Arc::new(RemoteExecutor::new(self.config.regions.clone(), transport)),
                );
            }
        }

        if executors.is_empty() {
            anyhow::bail!(
                "executor dependency missing: configure a task provider, region endpoints or an executor"
            );
        }

        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryRunStore::new()));
        let events = self
            .events
            .unwrap_or_else(|| RunEventBus::new(self.config.event_capacity));

        Ok(Orchestrator::new(self.config, store, executors, events))
    }
}
