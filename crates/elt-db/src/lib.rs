//! The Medallion Writer (§4.3) and State Store (§4.6): Postgres-backed
//! persistence for every layer a sync run touches, plus the replication
//! state that lets incremental syncs resume.

pub mod batch;
pub mod bind;
pub mod business;
pub mod cdc;
pub mod dedup;
pub mod ident;
pub mod raw;
pub mod schema_infer;
pub mod state_store;
pub mod validated;

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub const ENV_DATABASE_URL: &str = "DATABASE_URL";

/// Connect to Postgres using `DATABASE_URL` (min 5 / max 20 connections
/// per §5 "Shared resources").
pub async fn connect_from_env() -> Result<PgPool> {
    let url = std::env::var(ENV_DATABASE_URL)
        .with_context(|| format!("missing env var {ENV_DATABASE_URL}"))?;
    connect(&url).await
}

pub async fn connect(url: &str) -> Result<PgPool> {
    PgPoolOptions::new()
        .min_connections(5)
        .max_connections(20)
        .connect(url)
        .await
        .context("failed to connect to Postgres")
}

pub use batch::{write_in_batches, WriteCounts, DEFAULT_BATCH_SIZE, MAX_BATCH_SIZE};
pub use business::business_land;
pub use cdc::{cdc_write, CdcOp, CdcRecord};
pub use dedup::{dedup_write, upsert_write, DedupCounts, UpsertCounts};
pub use raw::raw_land;
pub use state_store::{FileStateStore, PgStateStore, StateStore};
pub use validated::{validated_land, ValidatedMetadata};

/// Opens the Postgres-backed state store, falling back to the file-per-source
/// JSON store when the database is unreachable (§4.6 "Secondary backend ...
/// chosen automatically on database failure").
pub async fn open_state_store(database_url: &str, fallback_dir: impl Into<std::path::PathBuf>) -> Result<Box<dyn StateStore>> {
    match connect(database_url).await {
        Ok(pool) => match PgStateStore::connect(pool).await {
            Ok(store) => return Ok(Box::new(store)),
            Err(err) => tracing::warn!(error = %err, "state store Postgres init failed, falling back to file backend"),
        },
        Err(err) => tracing::warn!(error = %err, "state store Postgres connect failed, falling back to file backend"),
    }

    let store = FileStateStore::open(fallback_dir).await?;
    Ok(Box::new(store))
}
