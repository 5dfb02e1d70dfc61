use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::error::{PodError, Result};

/// Mapping from region name to the endpoint URL of the peer serving it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionEndpoints(BTreeMap<String, String>);

impl RegionEndpoints {
    /// Creates an empty region map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a JSON object such as `{"eu": "https://eu.peer/run"}`.
    pub fn from_json(raw: &str) -> Result<Self> {
        let endpoints: Self = serde_json::from_str(raw).map_err(|err| {
            PodError::configuration(format!("invalid region endpoint map: {err}"))
        })?;
        if let Some((region, _)) = endpoints.0.iter().find(|(_, url)| url.trim().is_empty()) {
            return Err(PodError::configuration(format!(
                "region {region} has an empty endpoint URL"
            )));
        }
        Ok(endpoints)
    }

    /// Adds or replaces the endpoint for `region`.
    pub fn with_region(mut self, region: impl Into<String>, endpoint: impl Into<String>) -> Self {
        self.0.insert(region.into(), endpoint.into());
        self
    }

    /// Adds or replaces the endpoint for `region` in place.
    pub fn insert(&mut self, region: impl Into<String>, endpoint: impl Into<String>) {
        self.0.insert(region.into(), endpoint.into());
    }

    /// Look up the endpoint for `region`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when the region is unmapped.
    pub fn resolve(&self, region: &str) -> Result<&str> {
        self.0
            .get(region)
            .map(String::as_str)
            .ok_or_else(|| {
                PodError::configuration(format!("no endpoint configured for region {region}"))
            })
    }

    /// Returns true when `region` has an endpoint.
    pub fn contains(&self, region: &str) -> bool {
        self.0.contains_key(region)
    }

    /// Returns true when no region is mapped.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of mapped regions.
    pub fn len(&self) -> usize {
        self.0.len()
    }
}

/// Configuration for the orchestrator runtime.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Region to peer endpoint mapping used in remote mode.
    #[serde(default)]
    pub regions: RegionEndpoints,
    /// Job timeout applied when a request does not carry one, in milliseconds.
    #[serde(default)]
    pub default_job_timeout_ms: Option<u64>,
    /// Deadline for remote calls of jobs without a timeout, in milliseconds.
    pub rpc_timeout_ms: u64,
    /// Buffer size of the run event broadcast channel.
    pub event_capacity: usize,
    /// How long `shutdown` waits for in-flight runs, in milliseconds.
    pub shutdown_timeout_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            regions: RegionEndpoints::default(),
            default_job_timeout_ms: None,
            rpc_timeout_ms: 120_000,
            event_capacity: 256,
            shutdown_timeout_ms: 30_000,
        }
    }
}

impl OrchestratorConfig {
    /// Sets the region endpoint map.
    pub fn with_regions(mut self, regions: RegionEndpoints) -> Self {
        self.regions = regions;
        self
    }

    /// Sets the job timeout used when a request has none.
    pub fn with_default_job_timeout(mut self, ms: u64) -> Self {
        self.default_job_timeout_ms = Some(ms);
        self
    }

    /// Sets the remote call timeout for jobs without a deadline.
    pub fn with_rpc_timeout(mut self, ms: u64) -> Self {
        self.rpc_timeout_ms = ms;
        self
    }

    /// Sets the event bus buffer size.
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Sets how long `shutdown` waits for in-flight runs.
    pub fn with_shutdown_timeout(mut self, ms: u64) -> Self {
        self.shutdown_timeout_ms = ms;
        self
    }

    /// `rpc_timeout_ms` as a `Duration`.
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    /// `shutdown_timeout_ms` as a `Duration`.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}
