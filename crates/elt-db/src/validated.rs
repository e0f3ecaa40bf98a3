//! Validated land (§4.3, §6 "Validated-layer table shape"): first-call
//! schema inference plus the fixed metadata columns every row carries.

use crate::batch::{clamp_batch_size, log_progress, write_in_batches, WriteCounts};
use crate::bind::bind_dynamic;
use crate::ident::quote_qualified;
use crate::schema_infer::{infer_schema, InferredColumn};
use anyhow::{Context, Result};
use elt_core::table_name::{qualified_table_name, Layer};
use elt_schemas::value::TabularView;
use sqlx::PgPool;
use uuid::Uuid;

/// Per-batch metadata attached to every validated row (§4.4 step 8).
#[derive(Debug, Clone, Copy)]
pub struct ValidatedMetadata {
    pub run_id: Uuid,
    pub pii_checked: bool,
    pub quality_score: f64,
}

async fn ensure_validated_table(pool: &PgPool, schema: &str, table: &str, columns: &[InferredColumn]) -> Result<()> {
    let qualified = quote_qualified(schema, table);
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", crate::ident::quote_ident(schema)))
        .execute(pool)
        .await
        .context("create validated schema failed")?;

    let mut column_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", crate::ident::quote_ident(&c.name), c.sql_type.ddl()))
        .collect();
    column_defs.push("run_id UUID NOT NULL".to_string());
    column_defs.push("validated_at TIMESTAMP".to_string());
    column_defs.push("pii_checked BOOLEAN".to_string());
    column_defs.push("quality_score NUMERIC(5,2)".to_string());
    column_defs.push("created_at TIMESTAMP".to_string());
    column_defs.push("id BIGSERIAL PRIMARY KEY".to_string());

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {qualified} ({})",
        column_defs.join(", ")
    ))
    .execute(pool)
    .await
    .context("create validated table failed")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_run_id ON {qualified} (run_id)"
    ))
    .execute(pool)
    .await
    .context("create validated run_id index failed")?;

    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS idx_{table}_quality_low ON {qualified} (quality_score) WHERE quality_score < 80"
    ))
    .execute(pool)
    .await
    .context("create validated quality_score partial index failed")?;

    Ok(())
}

/// Lands a validated batch (§4.3 "Validated land"). Creates the table on
/// first call per `(source_id, stream)` using the schema inferred from
/// `view`, then writes every row plus the run's metadata.
pub async fn validated_land(
    pool: &PgPool,
    source_id: &str,
    stream: &str,
    view: &TabularView,
    metadata: ValidatedMetadata,
    batch_size: usize,
) -> Result<WriteCounts> {
    let (schema, table) = qualified_table_name(source_id, stream, Layer::Validated);
    let columns = infer_schema(view);
    ensure_validated_table(pool, &schema, &table, &columns).await?;
    let qualified = quote_qualified(&schema, &table);

    let mut counts = WriteCounts::default();
    let total = view.rows.len() as u64;
    let batch_size = clamp_batch_size(batch_size);

    for chunk in write_in_batches(&view.rows, batch_size) {
        let mut tx = pool.begin().await.context("begin validated batch transaction")?;
        let mut batch_ok = true;
        for row in chunk {
            let mut query = sqlx::query(&build_insert_sql(&qualified, &columns));
            for col in &columns {
                let value = view.column(row, &col.name_source(view));
                query = bind_dynamic(query, &value, col.sql_type);
            }
            query = query.bind(metadata.run_id).bind(metadata.pii_checked).bind(metadata.quality_score);
            if query.execute(&mut *tx).await.is_err() {
                batch_ok = false;
                break;
            }
        }
        if batch_ok && tx.commit().await.is_ok() {
            counts.written += chunk.len() as u64;
            log_progress(&table, counts.written, total);
            continue;
        }

        tracing::warn!(table = %table, rows = chunk.len(), "validated batch insert failed, falling back to per-row");
        for row in chunk {
            let mut query = sqlx::query(&build_insert_sql(&qualified, &columns));
            for col in &columns {
                let value = view.column(row, &col.name_source(view));
                query = bind_dynamic(query, &value, col.sql_type);
            }
            query = query.bind(metadata.run_id).bind(metadata.pii_checked).bind(metadata.quality_score);
            match query.execute(pool).await {
                Ok(_) => counts.written += 1,
                Err(err) => {
                    counts.failed += 1;
                    tracing::error!(table = %table, error = %err, "validated row insert failed");
                }
            }
            log_progress(&table, counts.written, total);
        }
    }

    Ok(counts)
}

fn build_insert_sql(qualified: &str, columns: &[InferredColumn]) -> String {
    let mut names: Vec<String> = columns.iter().map(|c| crate::ident::quote_ident(&c.name)).collect();
    names.push("run_id".to_string());
    names.push("validated_at".to_string());
    names.push("pii_checked".to_string());
    names.push("quality_score".to_string());
    names.push("created_at".to_string());

    let data_placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let run_id_ph = columns.len() + 1;
    let pii_ph = columns.len() + 2;
    let quality_ph = columns.len() + 3;

    format!(
        "INSERT INTO {qualified} ({}) VALUES ({}, ${run_id_ph}, now(), ${pii_ph}, ${quality_ph}, now())",
        names.join(", "),
        data_placeholders.join(", "),
    )
}

trait ColumnSourceName {
    fn name_source(&self, view: &TabularView) -> String;
}

impl ColumnSourceName for InferredColumn {
    /// The inferred column carries the *sanitized* name; row lookups need
    /// the original field key, which is the view's matching unsanitized
    /// column (sanitization is injective enough in practice that a direct
    /// linear match is sufficient here).
    fn name_source(&self, view: &TabularView) -> String {
        view.columns
            .iter()
            .find(|c| crate::ident::sanitize_column(c) == self.name)
            .cloned()
            .unwrap_or_else(|| self.name.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_schemas::value::{Fields, Value};

    #[test]
    fn insert_sql_places_metadata_after_data_columns() {
        let mut row = Fields::new();
        row.insert("id".into(), Value::Int(1));
        let view = TabularView::from_records(&[row]);
        let columns = infer_schema(&view);
        let sql = build_insert_sql("\"chart\".\"t\"", &columns);
        assert!(sql.contains("run_id"));
        assert!(sql.contains("$2"));
    }
}
