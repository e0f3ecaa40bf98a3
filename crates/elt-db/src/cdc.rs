//! CDC write (§4.3 "CDC write"): records carrying `{op, lsn?, updated_at?,
//! deleted_at?}` land with soft-delete columns so deletes are representable
//! without losing history, and keys can be deleted then recreated.

use crate::batch::{log_progress, WriteCounts};
use crate::bind::bind_dynamic;
use crate::ident::quote_qualified;
use crate::schema_infer::{infer_schema, InferredColumn};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use elt_core::table_name::{qualified_table_name, Layer};
use elt_schemas::value::{Fields, TabularView};
use sqlx::PgPool;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CdcOp {
    Create,
    Read,
    Update,
    Delete,
}

impl CdcOp {
    pub fn parse(raw: &str) -> Option<CdcOp> {
        match raw {
            "c" => Some(CdcOp::Create),
            "r" => Some(CdcOp::Read),
            "u" => Some(CdcOp::Update),
            "d" => Some(CdcOp::Delete),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CdcRecord {
    pub data: Fields,
    pub op: CdcOp,
    pub lsn: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
}

fn row_source_key(view: &TabularView, sanitized: &str) -> String {
    view.columns
        .iter()
        .find(|c| crate::ident::sanitize_column(c) == sanitized)
        .cloned()
        .unwrap_or_else(|| sanitized.to_string())
}

async fn ensure_cdc_table(
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
        .context("create cdc schema failed")?;

    let mut column_defs: Vec<String> = columns
        .iter()
        .map(|c| format!("{} {}", crate::ident::quote_ident(&c.name), c.sql_type.ddl()))
        .collect();
    column_defs.push("_deleted BOOLEAN DEFAULT false".to_string());
    column_defs.push("_deleted_at TIMESTAMP".to_string());
    column_defs.push("_ab_cdc_lsn TEXT".to_string());
    column_defs.push("_ab_cdc_updated_at TIMESTAMP".to_string());
    column_defs.push("run_id UUID NOT NULL".to_string());
    column_defs.push("created_at TIMESTAMP".to_string());

    sqlx::query(&format!(
        "CREATE TABLE IF NOT EXISTS {qualified} ({})",
        column_defs.join(", ")
    ))
    .execute(pool)
    .await
    .context("create cdc table failed")?;

    let key_idents: Vec<String> = key_columns
        .iter()
        .map(|k| crate::ident::quote_ident(&crate::ident::sanitize_column(k)))
        .collect();

    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_{table}_active_key ON {qualified} ({}) WHERE _deleted = false",
        key_idents.join(", ")
    ))
    .execute(pool)
    .await
    .context("create cdc active-key partial unique index failed")?;

    Ok(())
}

fn where_on_keys(key_idents: &[String], start: usize) -> String {
    key_idents
        .iter()
        .enumerate()
        .map(|(i, ident)| format!("{ident} = ${}", start + i))
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Lands CDC-tagged records (§4.3 "CDC write"). `key_columns` identifies the
/// source's primary key within each record's `data`.
pub async fn cdc_write(
    pool: &PgPool,
    source_id: &str,
    stream: &str,
    records: &[CdcRecord],
    key_columns: &[String],
    run_id: Uuid,
) -> Result<WriteCounts> {
    let (schema, table) = qualified_table_name(source_id, stream, Layer::Cdc);
    let data_rows: Vec<Fields> = records.iter().map(|r| r.data.clone()).collect();
    let view = TabularView::from_records(&data_rows);
    let columns = infer_schema(&view);
    ensure_cdc_table(pool, &schema, &table, &columns, key_columns).await?;
    let qualified = quote_qualified(&schema, &table);

    let key_idents: Vec<String> = key_columns
        .iter()
        .map(|k| crate::ident::quote_ident(&crate::ident::sanitize_column(k)))
        .collect();

    let mut counts = WriteCounts::default();
    let total = records.len() as u64;

    for record in records {
        let keys: Vec<String> = key_columns
            .iter()
            .map(|k| view.column(&record.data, k).to_text())
            .collect();

        let result = match record.op {
            CdcOp::Create | CdcOp::Read => {
                upsert_active_row(pool, &qualified, &view, record, &columns, &key_idents, &keys, run_id).await
            }
            CdcOp::Update => {
                upsert_active_row(pool, &qualified, &view, record, &columns, &key_idents, &keys, run_id).await
            }
            CdcOp::Delete => mark_deleted(pool, &qualified, record, &key_idents, &keys, run_id).await,
        };

        match result {
            Ok(()) => counts.written += 1,
            Err(err) => {
                counts.failed += 1;
                tracing::error!(table = %table, error = %err, "cdc row write failed");
            }
        }
        log_progress(&table, counts.written, total);
    }

    Ok(counts)
}

#[allow(clippy::too_many_arguments)]
async fn upsert_active_row(
    pool: &PgPool,
    qualified: &str,
    view: &TabularView,
    record: &CdcRecord,
    columns: &[InferredColumn],
    key_idents: &[String],
    keys: &[String],
    run_id: Uuid,
) -> Result<()> {
    let where_clause = where_on_keys(key_idents, 1);
    let exists: Option<(bool,)> = {
        let mut q = sqlx::query_as(&format!("SELECT true FROM {qualified} WHERE {where_clause}"));
        for k in keys {
            q = q.bind(k);
        }
        q.fetch_optional(pool).await.context("cdc existence check failed")?
    };

    if exists.is_some() {
        let set_clauses: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{} = ${}", crate::ident::quote_ident(&c.name), i + 1))
            .collect();
        let lsn_ph = columns.len() + 1;
        let updated_ph = columns.len() + 2;
        let run_ph = columns.len() + 3;
        let where_start = columns.len() + 4;
        let where_clause = where_on_keys(key_idents, where_start);

        let sql = format!(
            "UPDATE {qualified} SET {}, _deleted = false, _deleted_at = NULL, _ab_cdc_lsn = ${lsn_ph}, _ab_cdc_updated_at = ${updated_ph}, run_id = ${run_ph} WHERE {where_clause}",
            set_clauses.join(", "),
        );
        let mut query = sqlx::query(&sql);
        for col in columns {
            let value = view.column(&record.data, &row_source_key(view, &col.name));
            query = bind_dynamic(query, &value, col.sql_type);
        }
        query = query.bind(&record.lsn).bind(record.updated_at).bind(run_id);
        for k in keys {
            query = query.bind(k);
        }
        query.execute(pool).await.context("cdc update failed")?;
    } else {
        let mut names: Vec<String> = columns.iter().map(|c| crate::ident::quote_ident(&c.name)).collect();
        names.push("_ab_cdc_lsn".to_string());
        names.push("_ab_cdc_updated_at".to_string());
        names.push("run_id".to_string());
        names.push("created_at".to_string());

        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("${i}")).collect();
        let lsn_ph = columns.len() + 1;
        let updated_ph = columns.len() + 2;
        let run_ph = columns.len() + 3;

        let sql = format!(
            "INSERT INTO {qualified} ({}) VALUES ({}, ${lsn_ph}, ${updated_ph}, ${run_ph}, now())",
            names.join(", "),
            placeholders.join(", "),
        );
        let mut query = sqlx::query(&sql);
        for col in columns {
            let value = view.column(&record.data, &row_source_key(view, &col.name));
            query = bind_dynamic(query, &value, col.sql_type);
        }
        query = query.bind(&record.lsn).bind(record.updated_at).bind(run_id);
        query.execute(pool).await.context("cdc insert failed")?;
    }

    Ok(())
}

async fn mark_deleted(
    pool: &PgPool,
    qualified: &str,
    record: &CdcRecord,
    key_idents: &[String],
    keys: &[String],
    run_id: Uuid,
) -> Result<()> {
    let where_clause = where_on_keys(key_idents, 2);
    let sql = format!(
        "UPDATE {qualified} SET _deleted = true, _deleted_at = $1 WHERE {where_clause}"
    );
    let mut query = sqlx::query(&sql).bind(record.deleted_at.unwrap_or_else(Utc::now));
    for k in keys {
        query = query.bind(k);
    }
    let result = query.execute(pool).await.context("cdc delete-mark failed")?;

    if result.rows_affected() == 0 {
        let mut names: Vec<String> = key_idents.to_vec();
        names.push("_deleted".to_string());
        names.push("_deleted_at".to_string());
        names.push("run_id".to_string());
        names.push("created_at".to_string());

        let key_placeholders: Vec<String> = (1..=keys.len()).map(|i| format!("${i}")).collect();
        let deleted_ph = keys.len() + 1;
        let run_ph = keys.len() + 2;

        let sql = format!(
            "INSERT INTO {qualified} ({}) VALUES ({}, true, ${deleted_ph}, ${run_ph}, now())",
            names.join(", "),
            key_placeholders.join(", "),
        );
        let mut query = sqlx::query(&sql);
        for k in keys {
            query = query.bind(k);
        }
        query = query.bind(record.deleted_at.unwrap_or_else(Utc::now)).bind(run_id);
        query.execute(pool).await.context("cdc tombstone insert failed")?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_char_op_codes() {
        assert_eq!(CdcOp::parse("c"), Some(CdcOp::Create));
        assert_eq!(CdcOp::parse("d"), Some(CdcOp::Delete));
        assert_eq!(CdcOp::parse("x"), None);
    }
}
