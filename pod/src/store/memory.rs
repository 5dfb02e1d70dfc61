use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::{apply_transition, RunStore, RunTransition, StoreError};
use crate::run::{RunId, RunRecord};

/// Process-local run store.
#[derive(Debug, Default)]
pub struct InMemoryRunStore {
    runs: RwLock<HashMap<RunId, RunRecord>>,
}

impl InMemoryRunStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded runs.
    pub async fn len(&self) -> usize {
        self.runs.read().await.len()
    }

    /// Returns true when no run is recorded.
    pub async fn is_empty(&self) -> bool {
        self.runs.read().await.is_empty()
    }
}

#[async_trait]
impl RunStore for InMemoryRunStore {
    async fn create(&self, record: RunRecord) -> anyhow::Result<()> {
        let mut runs = self.runs.write().await;
        if runs.contains_key(&record.run_id) {
            return Err(StoreError::Duplicate {
                run_id: record.run_id,
            }
            .into());
        }
        runs.insert(record.run_id.clone(), record);
        Ok(())
    }

    async fn get(&self, run_id: &RunId) -> anyhow::Result<Option<RunRecord>> {
        Ok(self.runs.read().await.get(run_id).cloned())
    }

    async fn update(&self, run_id: &RunId, transition: RunTransition) -> anyhow::Result<RunRecord> {
        let mut runs = self.runs.write().await;
        let record = runs.get_mut(run_id).ok_or_else(|| StoreError::Unknown {
            run_id: run_id.clone(),
        })?;
        apply_transition(record, transition, Utc::now())?;
        Ok(record.clone())
    }
}
