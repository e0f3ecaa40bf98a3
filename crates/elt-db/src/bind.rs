//! Binds a dynamically-typed [`Value`] onto a runtime-built `sqlx` query
//! according to the column's inferred [`SqlType`] (§9 "coerced-to-text
//! fallback" for anything that doesn't fit the sampled type).

use crate::schema_infer::SqlType;
use elt_schemas::value::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::Postgres;

pub type DynQuery<'q> = Query<'q, Postgres, PgArguments>;

pub fn bind_dynamic(query: DynQuery<'_>, value: &Value, sql_type: SqlType) -> DynQuery<'_> {
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
