//! Validation-run persistence.

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use osa_handlers::ports::ValidationRunStore;
use osa_types::{HookResult, RunStatus, Srn, ValidationRun};

pub struct PgValidationRunStore {
    pool: PgPool,
}

impl PgValidationRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ValidationRunStore for PgValidationRunStore {
    async fn save(&self, run: &ValidationRun) -> Result<()> {
        sqlx::query(
            r#"
            insert into validation_runs (srn, status, results, started_at, completed_at, expires_at)
            values ($1, $2, $3, $4, $5, $6)
            on conflict (srn) do update
               set status       = excluded.status,
                   results      = excluded.results,
                   started_at   = excluded.started_at,
                   completed_at = excluded.completed_at,
                   expires_at   = excluded.expires_at
            "#,
        )
        .bind(run.srn.to_string())
        .bind(run.status.as_str())
        .bind(serde_json::to_value(&run.results)?)
        .bind(run.started_at)
        .bind(run.completed_at)
        .bind(run.expires_at)
        .execute(&self.pool)
        .await
        .context("save validation run failed")?;

        Ok(())
    }

    async fn get(&self, srn: &Srn) -> Result<Option<ValidationRun>> {
        let row = sqlx::query(
            r#"
            select srn, status, results, started_at, completed_at, expires_at
            from validation_runs
            where srn = $1
            "#,
        )
        .bind(srn.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("get validation run failed")?;

        let Some(row) = row else { return Ok(None) };

        let srn: Srn = row
            .try_get::<String, _>("srn")?
            .parse()
            .map_err(|e| anyhow!("stored srn invalid: {e}"))?;
        let status = RunStatus::parse(row.try_get("status")?)
            .ok_or_else(|| anyhow!("unknown validation run status"))?;
        let results: Vec<HookResult> = serde_json::from_value(row.try_get("results")?)
            .context("deserialize hook results")?;
        let started_at: Option<DateTime<Utc>> = row.try_get("started_at")?;
        let completed_at: Option<DateTime<Utc>> = row.try_get("completed_at")?;
        let expires_at: Option<DateTime<Utc>> = row.try_get("expires_at")?;

        Ok(Some(ValidationRun {
            srn,
            status,
            results,
            started_at,
            completed_at,
            expires_at,
        }))
    }
}
