//! Validated land (§4.3, §6 "Validated-layer table shape"): first-call
//! schema inference plus the fixed metadata columns.
//!
//! DB-backed, skipped if `DATABASE_URL` is not set.

use elt_core::table_name::{qualified_table_name, Layer};
use elt_db::validated::ValidatedMetadata;
use elt_schemas::value::{Fields, TabularView, Value};
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

#[tokio::test]
async fn validated_land_infers_schema_and_stamps_metadata() -> anyhow::Result<()> {
    let url = match std::env::var(elt_db::ENV_DATABASE_URL) {
        Ok(v) => v,
        Err(_) => {
            eprintln!("SKIP: DATABASE_URL not set");
            return Ok(());
        }
    };
    let pool = PgPoolOptions::new().max_connections(2).connect(&url).await?;
    let source_id = format!("scenario-validated-{}", Uuid::new_v4().simple());

    let mut row_a = Fields::new();
    row_a.insert("id".to_string(), Value::Int(1));
    row_a.insert("name".to_string(), Value::String("alice".to_string()));
    let mut row_b = Fields::new();
    row_b.insert("id".to_string(), Value::Int(2));
    row_b.insert("name".to_string(), Value::String("bob".to_string()));
    let view = TabularView::from_records(&[row_a, row_b]);

    let run_id = Uuid::new_v4();
    let metadata = ValidatedMetadata { run_id, pii_checked: true, quality_score: 92.5 };
    let counts = elt_db::validated_land(&pool, &source_id, "users", &view, metadata, 1000).await?;
    assert_eq!(counts.written, 2);

    let (schema, table) = qualified_table_name(&source_id, "users", Layer::Validated);
    let qualified = elt_db::ident::quote_qualified(&schema, &table);

    let (run_ids,): (i64,) =
        sqlx::query_as(&format!("SELECT count(*) FROM {qualified} WHERE run_id = $1"))
            .bind(run_id)
            .fetch_one(&pool)
            .await?;
    assert_eq!(run_ids, 2);

    let (pii_checked_count,): (i64,) =
        sqlx::query_as(&format!("SELECT count(*) FROM {qualified} WHERE pii_checked = true"))
            .fetch_one(&pool)
            .await?;
    assert_eq!(pii_checked_count, 2);

    // Calling validated land again with no rows must leave the schema intact.
    let empty_view = TabularView::default();
    let repeat = elt_db::validated_land(&pool, &source_id, "users", &empty_view, metadata, 1000).await?;
    assert_eq!(repeat.written, 0);

    let (still_two,): (i64,) = sqlx::query_as(&format!("SELECT count(*) FROM {qualified}"))
        .fetch_one(&pool)
        .await?;
    assert_eq!(still_two, 2);

    Ok(())
}
