use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::debug;

use super::{RunStore, RunTransition, StoreError};
use crate::run::{RunId, RunRecord, RunSummary};

const SCHEMA: &str = include_str!("../../migrations/0001_pod_runs.sql");

/// PostgreSQL-backed run store over the `pod_runs` table.
///
/// The summary is stored as JSONB. Terminal transitions use a conditional
/// `UPDATE ... WHERE status = 'running'`, so concurrent writers cannot
/// overwrite a terminal record.
#[derive(Clone, Debug)]
pub struct PostgresRunStore {
    pool: PgPool,
}

impl PostgresRunStore {
    /// Creates a store over `pool`; call `ensure_schema` before first use.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the `pod_runs` table and its index when missing.
    pub async fn ensure_schema(&self) -> anyhow::Result<()> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        Ok(())
    }

    fn record_from_row(row: &PgRow) -> anyhow::Result<RunRecord> {
        let status: String = row.try_get("status")?;
        let summary: Option<serde_json::Value> = row.try_get("summary")?;
        let summary = summary
            .map(serde_json::from_value::<RunSummary>)
            .transpose()?;

        Ok(RunRecord {
            run_id: RunId::from(row.try_get::<String, _>("run_id")?),
            status: status.parse()?,
            summary,
            error: row.try_get("error")?,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }
}

#[async_trait]
impl RunStore for PostgresRunStore {
    async fn create(&self, record: RunRecord) -> anyhow::Result<()> {
        let summary = record.summary.as_ref().map(serde_json::to_value).transpose()?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO pod_runs (run_id, status, summary, error, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (run_id) DO NOTHING
            "#,
        )
        .bind(record.run_id.as_str())
        .bind(record.status.as_str())
        .bind(&summary)
        .bind(&record.error)
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(StoreError::Duplicate {
                run_id: record.run_id,
            }
            .into());
        }

        debug!(run_id = %record.run_id, "run record created");
        Ok(())
    }

    async fn get(&self, run_id: &RunId) -> anyhow::Result<Option<RunRecord>> {
        let row = sqlx::query(
            r#"
            SELECT run_id, status, summary, error, created_at, updated_at
            FROM pod_runs
            WHERE run_id = $1
            "#,
        )
        .bind(run_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(Self::record_from_row).transpose()
    }

    async fn update(&self, run_id: &RunId, transition: RunTransition) -> anyhow::Result<RunRecord> {
        let status = transition.status();
        let (summary, error) = match transition {
            RunTransition::Completed(summary) => (Some(serde_json::to_value(&summary)?), None),
            RunTransition::Failed(error) => (None, Some(error)),
        };

        let row = sqlx::query(
            r#"
            UPDATE pod_runs
            SET status = $2,
                summary = $3,
                error = $4,
                updated_at = NOW()
            WHERE run_id = $1
              AND status = 'running'
            RETURNING run_id, status, summary, error, created_at, updated_at
            "#,
        )
        .bind(run_id.as_str())
        .bind(status.as_str())
        .bind(&summary)
        .bind(&error)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            debug!(run_id = %run_id, status = status.as_str(), "run record updated");
            return Self::record_from_row(&row);
        }

        // nothing updated: either unknown or already terminal
        match self.get(run_id).await? {
            None => Err(StoreError::Unknown {
                run_id: run_id.clone(),
            }
            .into()),
            Some(existing) => Err(StoreError::AlreadyTerminal {
                run_id: run_id.clone(),
                status: existing.status.as_str(),
            }
            .into()),
        }
    }
}

