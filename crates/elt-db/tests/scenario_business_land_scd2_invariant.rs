//! Business land SCD-Type-2 (§4.3, §8 "SCD2 invariant"): exactly one
//! `is_current = true` row per natural key, an unchanged row produces no
//! new version, and a changed row closes the prior version.
//!
//! DB-backed, skipped if `DATABASE_URL` is not set.

use elt_core::table_name::{qualified_table_name, Layer};
use elt_schemas::value::{Fields, TabularView, Value};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

fn view_for(id: i64, status: &str) -> TabularView {
    let mut row = Fields::new();
    row.insert("id".to_string(), Value::Int(id));
    row.insert("status".to_string(), Value::String(status.to_string()));
    TabularView::from_records(&[row])
}

#[tokio::test]
async fn scd2_tracks_one_current_row_and_closes_changed_versions() -> anyhow::Result<()> {
    let url = match std::env::var(elt_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    let source_id = format!("scenario-business-{}", Uuid::new_v4().simple());

    // First sync: row is new, one current version.
    elt_db::business_land(&pool, &source_id, "users", &view_for(1, "active"), Some("id"), Uuid::new_v4()).await?;
    // Second sync: identical payload, must not create a new version.
    elt_db::business_land(&pool, &source_id, "users", &view_for(1, "active"), Some("id"), Uuid::new_v4()).await?;
    // Third sync: changed payload, must close the current row and insert a new one.
    elt_db::business_land(&pool, &source_id, "users", &view_for(1, "inactive"), Some("id"), Uuid::new_v4()).await?;

    let (schema, table) = qualified_table_name(&source_id, "users", Layer::Business);
    let qualified = elt_db::ident::quote_qualified(&schema, &table);

    let (current_count,): (i64,) =
        sqlx::query_as(&format!("SELECT count(*) FROM {qualified} WHERE natural_key = '1' AND is_current = true"))
            .fetch_one(&pool)
            .await?;
    assert_eq!(current_count, 1, "exactly one current row per natural key");

    let (total_versions,): (i64,) =
        sqlx::query_as(&format!("SELECT count(*) FROM {qualified} WHERE natural_key = '1'"))
            .fetch_one(&pool)
            .await?;
    assert_eq!(total_versions, 2, "unchanged resync must not add a version; changed resync must");

    let (gap_or_overlap,): (i64,) = sqlx::query_as(&format!(
        "SELECT count(*) FROM {qualified} WHERE natural_key = '1' AND valid_from >= valid_to"
    ))
    .fetch_one(&pool)
    .await?;
    assert_eq!(gap_or_overlap, 0, "valid_from must strictly precede valid_to for every version");

    Ok(())
}
