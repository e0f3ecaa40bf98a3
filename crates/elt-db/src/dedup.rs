//! Deduplicated write (§4.3 "Deduplicated write"): a point-in-time upsert
//! alternative to validated land, in two strategies — row-hash diff and
//! native `ON CONFLICT` upsert.

use crate::batch::{log_progress, WriteCounts};
use crate::bind::bind_dynamic;
use crate::ident::quote_qualified;
use crate::schema_infer::{infer_schema, InferredColumn};
use anyhow::{Context, Result};
use elt_core::table_name::{qualified_table_name, Layer};
use elt_schemas::value::{Fields, TabularView, Value};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupCounts {
    pub inserted: u64,
    pub updated: u64,
    pub unchanged: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertCounts {
    pub processed: u64,
    pub conflicts: u64,
}

fn row_source_key(view: &TabularView, sanitized: &str) -> String {
    view.columns
        .iter()
        .find(|c| crate::ident::sanitize_column(c) == sanitized)
        .cloned()
        .unwrap_or_else(|| sanitized.to_string())
}

async fn ensure_dedup_table(
    pool: &PgPool,
    schema: &str,
    table: &str,
    columns: &[InferredColumn],
    key_columns: &[String],
) -> Result<()> {
    let qualified = quote_qualified(schema, table);
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", crate::ident::quote_ident(schema)))
        .execute(pool)
        .await
        .context("create dedup schema failed")?;

    let mut column_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", crate::ident::quote_ident(&c.name), c.sql_type.ddl()))
        .collect();
    column_defs.push("_row_hash TEXT".to_string());
    column_defs.push("run_id UUID NOT NULL".to_string());
    column_defs.push("updated_at TIMESTAMP".to_string());

    let key_idents: Vec<String> = key_columns
        .iter()
        .map(|k| crate::ident::quote_ident(&crate::ident::sanitize_column(k)))
        .collect();

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {qualified} ({}, PRIMARY KEY ({}))",
        column_defs.join(", "),
        key_idents.join(", "),
    ))
    .execute(pool)
    .await
    .context("create dedup table failed")?;

    Ok(())
}

fn key_values(view: &TabularView, row: &Fields, key_columns: &[String]) -> Vec<Value> {
    key_columns.iter().map(|k| view.column(row, k)).collect()
}

/// Row-hash diff strategy (§4.3): one SELECT per row to fetch the stored
/// hash, then insert/update/skip depending on whether it matches.
pub async fn dedup_write(
    pool: &PgPool,
    source_id: &str,
    stream: &str,
    view: &TabularView,
    key_columns: &[String],
    run_id: Uuid,
) -> Result<DedupCounts> {
    let (schema, table) = qualified_table_name(source_id, stream, Layer::Deduped);
    let columns = infer_schema(view);
    ensure_dedup_table(pool, &schema, &table, &columns, key_columns).await?;
    let qualified = quote_qualified(&schema, &table);

    let key_idents: Vec<String> = key_columns
        .iter()
        .map(|k| crate::ident::quote_ident(&crate::ident::sanitize_column(k)))
        .collect();

    let mut counts = DedupCounts::default();
    let total = view.rows.len() as u64;

    for row in &view.rows {
        let hash = elt_schemas::row_hash(row);
        let keys = key_values(view, row, key_columns);

        let where_clause: Vec<String> = key_idents
            .iter()
            .enumerate()
            .map(|(i, ident)| format!("{ident} = ${}", i + 1))
            .collect();

        let mut select = sqlx::query_as::<_, (String,)>(&format!(
            "SELECT _row_hash FROM {qualified} WHERE {}",
            where_clause.join(" AND ")
        ));
        for k in &keys {
            select = select.bind(k.to_text());
        }
        let existing_hash: Option<(String,)> = select
            .fetch_optional(pool)
            .await
            .context("dedup hash lookup failed")?;

        match existing_hash {
            None => {
                insert_dedup_row(pool, &qualified, view, row, &columns, &hash, run_id).await?;
                counts.inserted += 1;
            }
            Some((stored_hash,)) if stored_hash == hash => {
                counts.unchanged += 1;
            }
            Some(_) => {
                update_dedup_row(pool, &qualified, view, row, &columns, &key_idents, &keys, &hash, run_id).await?;
                counts.updated += 1;
            }
        }

        log_progress(&table, counts.inserted + counts.updated + counts.unchanged, total);
    }

    Ok(counts)
}

async fn insert_dedup_row(
    pool: &PgPool,
    qualified: &str,
    view: &TabularView,
    row: &Fields,
    columns: &[InferredColumn],
    hash: &str,
    run_id: Uuid,
) -> Result<()> {
    let mut names: Vec<String> = columns.iter().map(|c| crate::ident::quote_ident(&c.name)).collect();
    names.push("_row_hash".to_string());
    names.push("run_id".to_string());
    names.push("updated_at".to_string());

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let hash_ph = columns.len() + 1;
    let run_ph = columns.len() + 2;

    let sql = format!(
        "INSERT INTO {qualified} ({}) VALUES ({}, ${hash_ph}, ${run_ph}, now())",
        names.join(", "),
        placeholders.join(", "),
    );
    let mut query = sqlx::query(&sql);
    for col in columns {
        let value = view.column(row, &row_source_key(view, &col.name));
        query = bind_dynamic(query, &value, col.sql_type);
    }
    query = query.bind(hash).bind(run_id);
    query.execute(pool).await.context("dedup insert failed")?;
    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn update_dedup_row(
    pool: &PgPool,
    qualified: &str,
    view: &TabularView,
    row: &Fields,
    columns: &[InferredColumn],
    key_idents: &[String],
    keys: &[Value],
    hash: &str,
    run_id: Uuid,
) -> Result<()> {
    let set_clauses: Vec<String> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| format!("{} = ${}", crate::ident::quote_ident(&c.name), i + 1))
        .collect();
    let hash_ph = columns.len() + 1;
    let run_ph = columns.len() + 2;
    let where_start = columns.len() + 3;

    let where_clause: Vec<String> = key_idents
        .iter()
        .enumerate()
        .map(|(i, ident)| format!("{ident} = ${}", where_start + i))
        .collect();

    let sql = format!(
        "UPDATE {qualified} SET {}, _row_hash = ${hash_ph}, run_id = ${run_ph}, updated_at = now() WHERE {}",
        set_clauses.join(", "),
        where_clause.join(" AND "),
    );

    let mut query = sqlx::query(&sql);
    for col in columns {
        let value = view.column(row, &row_source_key(view, &col.name));
        query = bind_dynamic(query, &value, col.sql_type);
    }
    query = query.bind(hash).bind(run_id);
    for k in keys {
        query = query.bind(k.to_text());
    }
    query.execute(pool).await.context("dedup update failed")?;
    Ok(())
}

/// Native upsert strategy (§4.3): `INSERT ... ON CONFLICT(key) DO UPDATE`
/// in batches, using `xmax = 0` to tell insert from update per row.
pub async fn upsert_write(
    pool: &PgPool,
    source_id: &str,
    stream: &str,
    view: &TabularView,
    key_columns: &[String],
    run_id: Uuid,
) -> Result<UpsertCounts> {
    let (schema, table) = qualified_table_name(source_id, stream, Layer::Deduped);
    let columns = infer_schema(view);
    ensure_dedup_table(pool, &schema, &table, &columns, key_columns).await?;
    let qualified = quote_qualified(&schema, &table);

    let key_idents: Vec<String> = key_columns
        .iter()
        .map(|k| crate::ident::quote_ident(&crate::ident::sanitize_column(k)))
        .collect();

    let mut names: Vec<String> = columns.iter().map(|c| crate::ident::quote_ident(&c.name)).collect();
    names.push("run_id".to_string());
    names.push("updated_at".to_string());

    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
    let run_ph = columns.len() + 1;

    let update_set: Vec<String> = columns
        .iter()
        .map(|c| format!("{} = excluded.{}", crate::ident::quote_ident(&c.name), crate::ident::quote_ident(&c.name)))
        .collect();

    let sql = format!(
        "INSERT INTO {qualified} ({}) VALUES ({}, ${run_ph}, now()) \
         ON CONFLICT ({}) DO UPDATE SET {}, run_id = excluded.run_id, updated_at = now() \
         RETURNING (xmax = 0) AS inserted",
        names.join(", "),
        placeholders.join(", "),
        key_idents.join(", "),
        update_set.join(", "),
    );

    let mut counts = UpsertCounts::default();
    let total = view.rows.len() as u64;

    // `query_as` binding must stay type-aligned with the generated tuple, so
    // each row is bound directly rather than threaded through the
    // `Query`-typed `bind_dynamic` helper used elsewhere in this module.
    for row in &view.rows {
        let mut q = sqlx::query_as::<_, (bool,)>(&sql);
        for col in &columns {
            let value = view.column(row, &row_source_key(view, &col.name));
            q = bind_as_tuple(q, &value, col.sql_type);
        }
        q = q.bind(run_id);

        match q.fetch_one(pool).await {
            Ok((inserted,)) => {
                counts.processed += 1;
                if !inserted {
                    counts.conflicts += 1;
                }
            }
            Err(err) => {
                tracing::error!(table = %table, error = %err, "upsert row failed");
            }
        }
        log_progress(&table, counts.processed, total);
    }

    Ok(counts)
}

type TupleQuery<'q> = sqlx::query::QueryAs<'q, sqlx::Postgres, (bool,), sqlx::postgres::PgArguments>;

fn bind_as_tuple<'q>(query: TupleQuery<'q>, value: &'q Value, sql_type: crate::schema_infer::SqlType) -> TupleQuery<'q> {
    use crate::schema_infer::SqlType;
    match sql_type {
        SqlType::Integer => {
            let v: Option<i64> = match value {
                Value::Int(n) => Some(*n),
                Value::Float(f) => Some(*f as i64),
                Value::String(s) => s.parse().ok(),
                _ => None,
            };
            query.bind(v)
        }
        SqlType::Floating => {
            let v: Option<f64> = match value {
                Value::Float(f) => Some(*f),
                Value::Int(n) => Some(*n as f64),
                Value::String(s) => s.parse().ok(),
                _ => None,
            };
            query.bind(v)
        }
        SqlType::Boolean => {
            let v: Option<bool> = match value {
                Value::Bool(b) => Some(*b),
                _ => None,
            };
            query.bind(v)
        }
        SqlType::Timestamp => {
            let v: Option<chrono::DateTime<chrono::Utc>> = match value {
                Value::Timestamp(ts) => Some(*ts),
                _ => None,
            };
            query.bind(v)
        }
        SqlType::Date => {
            let v: Option<chrono::NaiveDate> = match value {
                Value::Date(d) => Some(*d),
                _ => None,
            };
            query.bind(v)
        }
        SqlType::Text => {
            let v: Option<String> = match value {
                Value::Null => None,
                other => Some(other.to_text()),
            };
            query.bind(v)
        }
        SqlType::Json => query.bind(value.to_json()),
    }
}

/// Reads back up to `limit` rows from a landed table as plain field maps
/// (introspection helper used by scheduler/CLI status reporting).
pub async fn sample_rows(pool: &PgPool, schema: &str, table: &str, limit: i64) -> Result<Vec<Fields>> {
    let qualified = quote_qualified(schema, table);
    let rows: Vec<(serde_json::Value,)> = sqlx::query_as(&format!(
        "SELECT row_to_json(t.*) FROM (SELECT * FROM {qualified} LIMIT $1) t"
    ))
    .bind(limit)
    .fetch_all(pool)
    .await
    .context("sample_rows query failed")?;

    Ok(rows
        .into_iter()
        .map(|(json,)| match json {
            serde_json::Value::Object(obj) => elt_schemas::fields_from_json_map(obj),
            _ => Fields::new(),
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_json_picks_integer_over_float_when_exact() {
        assert_eq!(Value::from_json(serde_json::json!(7)), Value::Int(7));
        assert_eq!(Value::from_json(serde_json::json!(7.5)), Value::Float(7.5));
    }
}
