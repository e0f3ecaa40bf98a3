//! Deduplicated write (§4.3, §8 "Concrete scenario 4 — Duplicate dedup"):
//! row-hash diff and native upsert as point-in-time alternatives to
//! validated land.
//!
//! DB-backed, skipped if `DATABASE_URL` is not set.

use elt_schemas::value::{Fields, TabularView, Value};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

fn view_for(id: i64, payload: &str) -> TabularView {
    let mut row = Fields::new();
    row.insert("id".to_string(), Value::Int(id));
    row.insert("payload".to_string(), Value::String(payload.to_string()));
    TabularView::from_records(&[row])
}

#[tokio::test]
async fn row_hash_diff_aggregates_inserted_updated_unchanged() -> anyhow::Result<()> {
    let url = match std::env::var(elt_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    let source_id = format!("scenario-dedup-{}", Uuid::new_v4().simple());
    let key_columns = vec!["id".to_string()];

    // First call: two rows with identical primary key arrive in separate
    // writes: row 1 is new (insert), row 2 is new (insert).
    elt_db::dedup_write(&pool, &source_id, "users", &view_for(1, "a"), &key_columns, Uuid::new_v4()).await?;
    let second = elt_db::dedup_write(&pool, &source_id, "users", &view_for(1, "a"), &key_columns, Uuid::new_v4()).await?;
    assert_eq!(second.unchanged, 1, "identical payload must be a no-op");

    let third = elt_db::dedup_write(&pool, &source_id, "users", &view_for(1, "b"), &key_columns, Uuid::new_v4()).await?;
    assert_eq!(third.updated, 1, "changed payload must update, not insert a duplicate");

    Ok(())
}

#[tokio::test]
async fn native_upsert_reports_conflicts_on_repeat_keys() -> anyhow::Result<()> {
    let url = match std::env::var(elt_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    let source_id = format!("scenario-upsert-{}", Uuid::new_v4().simple());
    let key_columns = vec!["id".to_string()];

    let first = elt_db::upsert_write(&pool, &source_id, "users", &view_for(1, "a"), &key_columns, Uuid::new_v4()).await?;
    assert_eq!(first.processed, 1);
    assert_eq!(first.conflicts, 0);

    let second = elt_db::upsert_write(&pool, &source_id, "users", &view_for(1, "b"), &key_columns, Uuid::new_v4()).await?;
    assert_eq!(second.processed, 1);
    assert_eq!(second.conflicts, 1, "re-upserting an existing key is a conflict (update), not a fresh insert");

    Ok(())
}
