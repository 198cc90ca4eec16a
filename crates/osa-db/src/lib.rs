//! osa-db
//!
//! Postgres persistence for the pipeline: pool bootstrap, embedded
//! migrations, the transactional outbox, validation runs, depositions, and
//! the dynamic feature store.

use anyhow::{Context, Result};
use sqlx::{postgres::PgPoolOptions, PgPool};

mod depositions;
mod feature_store;
mod outbox;
mod validation_runs;

pub use depositions::PgDepositionStore;
pub use feature_store::{pg_type_for, PgFeatureStore, FEATURES_SCHEMA};
pub use outbox::{PgOutbox, QueueDepth};
pub use validation_runs::PgValidationRunStore;

pub const ENV_DB_URL: &str = "OSA_DATABASE_URL";

/// Connect to Postgres using OSA_DATABASE_URL.
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DB_URL).with_context(|| format!("missing env var {ENV_DB_URL}"))?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&url)
        .await
        .context("failed to connect to Postgres")?;

    Ok(pool)
}

/// Run embedded SQLx migrations.
pub async fn migrate(pool: &PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .context("db migrate failed")?;
    Ok(())
}

/// Test helper used by integration tests: connect from env and ensure
/// migrations are applied.
pub async fn testkit_db_pool() -> Result<PgPool> {
    let pool = connect_from_env().await?;
    migrate(&pool).await?;
    Ok(pool)
}

/// Simple status query (connectivity + schema presence).
pub async fn status(pool: &PgPool) -> Result<DbStatus> {
    let (one,): (i32,) = sqlx::query_as("select 1")
        .fetch_one(pool)
        .await
        .context("status connectivity query failed")?;

    let (exists,): (bool,) = sqlx::query_as(
        r#"
        select exists (
            select 1
            from information_schema.tables
            where table_schema = 'public' and table_name = 'deliveries'
        )
        "#,
    )
    .fetch_one(pool)
    .await
    .context("status table-exists query failed")?;

    Ok(DbStatus {
        ok: one == 1,
        has_deliveries_table: exists,
    })
}

#[derive(Debug, Clone)]
pub struct DbStatus {
    pub ok: bool,
    pub has_deliveries_table: bool,
}
