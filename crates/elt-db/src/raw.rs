//! Raw land (§4.3, §6 "Raw-layer table shape"): every record as an opaque
//! JSON blob, batch-inserted in a single transaction per batch with
//! retry-then-per-row fallback.

use crate::batch::{clamp_batch_size, log_progress, write_in_batches, WriteCounts};
use crate::ident::quote_qualified;
use anyhow::{Context, Result};
use elt_core::table_name::{qualified_table_name, Layer};
use elt_schemas::value::Fields;
use sqlx::PgPool;
use uuid::Uuid;

async fn ensure_raw_table(pool: &PgPool, schema: &str, table: &str) -> Result<()> {
    let qualified = quote_qualified(schema, table);
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", crate::ident::quote_ident(schema)))
        .execute(pool)
        .await
        .context("create raw schema failed")?;

    sqlx::query(&format!(
        r#"
        CREATE TABLE IF NOT EXISTS {qualified} (
            id BIGSERIAL PRIMARY KEY,
            run_id UUID NOT NULL,
            source_system TEXT,
            raw_data JSON NOT NULL,
            ingested_at TIMESTAMP DEFAULT now(),
            partition_date DATE GENERATED ALWAYS AS (ingested_at::date) STORED,
            created_at TIMESTAMP
        )
        "#
    ))
    .execute(pool)
    .await
    .context("create raw table failed")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_run_id ON {qualified} (run_id)"
    ))
    .execute(pool)
    .await
    .context("create raw run_id index failed")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_partition_date ON {qualified} (partition_date)"
    ))
    .execute(pool)
    .await
    .context("create raw partition_date index failed")?;

    Ok(())
}

async fn insert_batch(
    pool: &PgPool,
    qualified: &str,
    run_id: Uuid,
    source_system: &str,
    rows: &[Fields],
) -> Result<()> {
    let mut tx = pool.begin().await.context("begin raw batch transaction")?;
    for row in rows {
        let data_json = serde_json::to_value(
            row.iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<serde_json::Map<_, _>>(),
        )?;
        sqlx::query(&format!(
            "INSERT INTO {qualified} (run_id, source_system, raw_data, created_at) VALUES ($1, $2, $3, now())"
        ))
        .bind(run_id)
        .bind(source_system)
        .bind(data_json)
        .execute(&mut *tx)
        .await
        .context("raw batch row insert failed")?;
    }
    tx.commit().await.context("commit raw batch transaction")?;
    Ok(())
}

async fn insert_row(pool: &PgPool, qualified: &str, run_id: Uuid, source_system: &str, row: &Fields) -> Result<()> {
    let data_json = serde_json::to_value(
        row.iter()
            .map(|(k, v)| (k.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>(),
    )?;
    sqlx::query(&format!(
        "INSERT INTO {qualified} (run_id, source_system, raw_data, created_at) VALUES ($1, $2, $3, now())"
    ))
    .bind(run_id)
    .bind(source_system)
    .bind(data_json)
    .execute(pool)
    .await
    .context("raw row insert failed")?;
    Ok(())
}

/// Lands a batch of raw records for `(source_id, stream, run_id)` (§4.3
/// "Raw land"). Ensures the target table exists, then writes in batches of
/// `batch_size` (clamped to `[1, MAX_BATCH_SIZE]`), retrying a failed batch
/// once before falling back to per-row inserts.
pub async fn raw_land(
    pool: &PgPool,
    source_id: &str,
    stream: &str,
    run_id: Uuid,
    records: &[Fields],
    batch_size: usize,
) -> Result<WriteCounts> {
    let (schema, table) = qualified_table_name(source_id, stream, Layer::Raw);
    ensure_raw_table(pool, &schema, &table).await?;
    let qualified = quote_qualified(&schema, &table);

    let mut counts = WriteCounts::default();
    let total = records.len() as u64;
    let batch_size = clamp_batch_size(batch_size);

    for chunk in write_in_batches(records, batch_size) {
        if insert_batch(pool, &qualified, run_id, source_id, chunk).await.is_ok() {
            counts.written += chunk.len() as u64;
            log_progress(&table, counts.written, total);
            continue;
        }

        tracing::warn!(table = %table, rows = chunk.len(), "raw batch insert failed, retrying once");
        if insert_batch(pool, &qualified, run_id, source_id, chunk).await.is_ok() {
            counts.written += chunk.len() as u64;
            log_progress(&table, counts.written, total);
            continue;
        }

        tracing::warn!(table = %table, rows = chunk.len(), "raw batch retry failed, falling back to per-row");
        for row in chunk {
            match insert_row(pool, &qualified, run_id, source_id, row).await {
                Ok(()) => counts.written += 1,
                Err(err) => {
                    counts.failed += 1;
                    tracing::error!(table = %table, error = %err, "raw row insert failed");
                }
            }
            log_progress(&table, counts.written, total);
        }
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoted_table_name_is_schema_qualified() {
        let (schema, table) = qualified_table_name("src", "orders", Layer::Raw);
        assert_eq!(schema, "explore");
        let qualified = quote_qualified(&schema, &table);
        assert_eq!(qualified, "\"explore\".\"src_orders_raw\"");
    }
}
