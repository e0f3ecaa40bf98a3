//! Business land (§4.3 "Business land (SCD-Type-2)", §6 "Business-layer
//! table shape"): one logically-current row per natural key, with prior
//! versions retained and closed off rather than overwritten.

use crate::batch::{log_progress, WriteCounts};
use crate::bind::bind_dynamic;
use crate::ident::quote_qualified;
use crate::schema_infer::{infer_schema, InferredColumn};
use anyhow::{Context, Result};
use elt_core::table_name::{qualified_table_name, Layer};
use elt_schemas::value::{Fields, TabularView};
use sqlx::PgPool;
use uuid::Uuid;

async fn ensure_business_table(pool: &PgPool, schema: &str, table: &str, columns: &[InferredColumn]) -> Result<()> {
    let qualified = quote_qualified(schema, table);
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", crate::ident::quote_ident(schema)))
        .execute(pool)
        .await
        .context("create business schema failed")?;

    let mut column_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", crate::ident::quote_ident(&c.name), c.sql_type.ddl()))
        .collect();
    column_defs.push("surrogate_key BIGSERIAL PRIMARY KEY".to_string());
    column_defs.push("natural_key TEXT NOT NULL".to_string());
    column_defs.push("valid_from TIMESTAMP DEFAULT now()".to_string());
    column_defs.push("valid_to TIMESTAMP DEFAULT '9999-12-31'".to_string());
    column_defs.push("is_current BOOLEAN DEFAULT true".to_string());
    column_defs.push("run_id UUID NOT NULL".to_string());
    column_defs.push("created_at TIMESTAMP".to_string());

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {qualified} ({})",
        column_defs.join(", ")
    ))
    .execute(pool)
    .await
    .context("create business table failed")?;

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_current_key ON {qualified} (natural_key) WHERE is_current = true"
    ))
    .execute(pool)
    .await
    .context("create business current-key partial unique index failed")?;

    Ok(())
}

fn row_source_key(view: &TabularView, sanitized: &str) -> String {
    view.columns
        .iter()
        .find(|c| crate::ident::sanitize_column(c) == sanitized)
        .cloned()
        .unwrap_or_else(|| sanitized.to_string())
}

fn row_as_json(view: &TabularView, row: &Fields, columns: &[InferredColumn]) -> serde_json::Value {
    let mut obj = serde_json::Map::new();
    for col in columns {
        let value = view.column(row, &row_source_key(view, &col.name));
        obj.insert(col.name.clone(), value.to_json());
    }
    serde_json::Value::Object(obj)
}

async fn insert_current_row(
    pool: &PgPool,
    qualified: &str,
    view: &TabularView,
    row: &Fields,
    columns: &[InferredColumn],
    natural_key: &str,
    run_id: Uuid,
) -> Result<()> {
    let mut names: Vec<String> = columns.iter().map(|c| crate::ident::quote_ident(&c.name)).collect();
    names.push("natural_key".to_string());
    names.push("run_id".to_string());
    names.push("created_at".to_string());

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let nk_ph = columns.len() + 1;
    let run_ph = columns.len() + 2;

    let sql = format!(
        "INSERT INTO {qualified} ({}) VALUES ({}, ${nk_ph}, ${run_ph}, now())",
        names.join(", "),
        placeholders.join(", "),
    );

    let mut query = sqlx::query(&sql);
    for col in columns {
        let value = view.column(row, &row_source_key(view, &col.name));
        query = bind_dynamic(query, &value, col.sql_type);
    }
    query = query.bind(natural_key).bind(run_id);
    query.execute(pool).await.context("business insert failed")?;
    Ok(())
}

/// Lands a typed view into the business layer under SCD-Type-2 semantics
/// (§4.3). `natural_key_column` defaults to the view's first column.
pub async fn business_land(
    pool: &PgPool,
    source_id: &str,
    stream: &str,
    view: &TabularView,
    natural_key_column: Option<&str>,
    run_id: Uuid,
) -> Result<WriteCounts> {
    let (schema, table) = qualified_table_name(source_id, stream, Layer::Business);
    let columns = infer_schema(view);
    ensure_business_table(pool, &schema, &table, &columns).await?;
    let qualified = quote_qualified(&schema, &table);

    let nk_col = natural_key_column
        .map(str::to_string)
        .or_else(|| view.columns.first().cloned())
        .context("business land requires at least one column to derive a natural key from")?;

    let mut counts = WriteCounts::default();
    let total = view.rows.len() as u64;

    for row in &view.rows {
        let natural_key = view.column(row, &nk_col).to_text();

        let existing: Option<(i64, serde_json::Value)> = sqlx::query_as(&format!(
            "SELECT surrogate_key, row_to_json(t.*) FROM (SELECT * FROM {qualified} WHERE natural_key = $1 AND is_current = true LIMIT 1) t"
        ))
        .bind(&natural_key)
        .fetch_optional(pool)
        .await
        .context("business current-row lookup failed")?;

        let new_json = row_as_json(view, row, &columns);

        match existing {
            None => {
                insert_current_row(pool, &qualified, view, row, &columns, &natural_key, run_id).await?;
            }
            Some((surrogate_key, existing_json)) => {
                let unchanged = columns
                    .iter()
                    .all(|c| elt_schemas::canonical_eq(existing_json.get(&c.name).unwrap_or(&serde_json::Value::Null), new_json.get(&c.name).unwrap_or(&serde_json::Value::Null)));

                if unchanged {
                    sqlx::query(&format!("UPDATE {qualified} SET run_id = $1 WHERE surrogate_key = $2"))
                        .bind(run_id)
                        .bind(surrogate_key)
                        .execute(pool)
                        .await
                        .context("business run_id-only update failed")?;
                } else {
                    sqlx::query(&format!(
                        "UPDATE {qualified} SET valid_to = now(), is_current = false WHERE surrogate_key = $1"
                    ))
                    .bind(surrogate_key)
                    .execute(pool)
                    .await
                    .context("business close-current-row update failed")?;

                    insert_current_row(pool, &qualified, view, row, &columns, &natural_key, run_id).await?;
                }
            }
        }

        counts.written += 1;
        log_progress(&table, counts.written, total);
    }

    Ok(counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_schemas::value::Value;

    #[test]
    fn row_as_json_uses_sanitized_names() {
        let mut row = Fields::new();
        row.insert("Order-ID".into(), Value::Int(5));
        let view = TabularView::from_records(&[row.clone()]);
        let columns = infer_schema(&view);
        let json = row_as_json(&view, &row, &columns);
        assert_eq!(json.get("order_id_"), Some(&serde_json::json!(5)));
    }
}
