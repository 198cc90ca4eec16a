//! Deposition persistence and status machine.
//!
//! Transitions are enforced in the UPDATE predicates, not by read-then-write:
//! `draft → submitted` and `submitted|published → draft` either match a row
//! in the right state or touch nothing.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use osa_handlers::ports::{Deposition, DepositionStatus, DepositionStore};
use osa_types::{Srn, SrnKind};

pub struct PgDepositionStore {
    pool: PgPool,
    node_domain: String,
}

impl PgDepositionStore {
    pub fn new(pool: PgPool, node_domain: impl Into<String>) -> Self {
        Self {
            pool,
            node_domain: node_domain.into(),
        }
    }
}

fn deposition_from_row(row: &sqlx::postgres::PgRow) -> Result<Deposition> {
    let srn: Srn = row
        .try_get::<String, _>("srn")?
        .parse()
        .map_err(|e| anyhow!("stored srn invalid: {e}"))?;
    let convention_srn: Srn = row
        .try_get::<String, _>("convention_srn")?
        .parse()
        .map_err(|e| anyhow!("stored convention srn invalid: {e}"))?;
    let status = DepositionStatus::parse(row.try_get("status")?)
        .ok_or_else(|| anyhow!("unknown deposition status"))?;
    let record_srn: Option<Srn> = row
        .try_get::<Option<String>, _>("record_srn")?
        .map(|s| s.parse())
        .transpose()
        .map_err(|e| anyhow!("stored record srn invalid: {e}"))?;
    let metadata: Value = row.try_get("metadata")?;
    let owner_id: Uuid = row.try_get("owner_id")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;

    Ok(Deposition {
        srn,
        convention_srn,
        owner_id,
        status,
        metadata,
        record_srn,
        created_at,
        updated_at,
    })
}

const COLUMNS: &str =
    "srn, convention_srn, owner_id, status, metadata, record_srn, created_at, updated_at";

#[async_trait]
impl DepositionStore for PgDepositionStore {
    async fn create(&self, convention_srn: &Srn, owner_id: Uuid) -> Result<Deposition> {
        let srn = Srn::unversioned(
            self.node_domain.clone(),
            SrnKind::Deposition,
            Uuid::new_v4().to_string(),
        )?;

        let row = sqlx::query(&format!(
            r#"
            insert into depositions (srn, convention_srn, owner_id, status)
            values ($1, $2, $3, 'draft')
            returning {COLUMNS}
            "#
        ))
        .bind(srn.to_string())
        .bind(convention_srn.to_string())
        .bind(owner_id)
        .fetch_one(&self.pool)
        .await
        .context("insert deposition failed")?;

        deposition_from_row(&row)
    }

    async fn get(&self, srn: &Srn) -> Result<Option<Deposition>> {
        let row = sqlx::query(&format!(
            "select {COLUMNS} from depositions where srn = $1"
        ))
        .bind(srn.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("get deposition failed")?;

        row.as_ref().map(deposition_from_row).transpose()
    }

    async fn update_metadata(&self, srn: &Srn, metadata: &Value) -> Result<bool> {
        let result = sqlx::query(
            r#"
            update depositions
               set metadata = $2, updated_at = now()
             where srn = $1
            "#,
        )
        .bind(srn.to_string())
        .bind(metadata)
        .execute(&self.pool)
        .await
        .context("update deposition metadata failed")?;

        Ok(result.rows_affected() > 0)
    }

    async fn submit(&self, srn: &Srn) -> Result<bool> {
        let row: Option<(String,)> = sqlx::query_as(
            r#"
            update depositions
               set status = 'submitted', updated_at = now()
             where srn = $1 and status = 'draft'
            returning status
            "#,
        )
        .bind(srn.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("submit deposition failed")?;

        if row.is_some() {
            return Ok(true);
        }

        // No transition happened: distinguish the idempotent re-submit from
        // genuinely invalid states.
        match self.get(srn).await? {
            Some(dep) if dep.status == DepositionStatus::Submitted => Ok(false),
            Some(dep) => bail!(
                "cannot submit deposition {srn} in state {}",
                dep.status.as_str()
            ),
            None => bail!("deposition not found: {srn}"),
        }
    }

    async fn return_to_draft(&self, srn: &Srn) -> Result<bool> {
        let result = sqlx::query(
            r#"
            update depositions
               set status = 'draft', updated_at = now()
             where srn = $1
            "#,
        )
        .bind(srn.to_string())
        .execute(&self.pool)
        .await
        .context("return_to_draft failed")?;

        Ok(result.rows_affected() > 0)
    }
}
