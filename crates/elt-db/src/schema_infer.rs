//! Column-schema inference for the validated and business layers (§4.3
//! "infers a column schema from the data"): each column's SQL type is
//! decided from the first non-null sample seen across the view's rows.

use elt_schemas::value::{TabularView, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Integer,
    Floating,
    Boolean,
    Timestamp,
    Date,
    Text,
    Json,
}

impl SqlType {
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Integer => "BIGINT",
            SqlType::Floating => "DOUBLE PRECISION",
            SqlType::Boolean => "BOOLEAN",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Date => "DATE",
            SqlType::Text => "TEXT",
            SqlType::Json => "JSON",
        }
    }
}

fn infer_from_sample(value: &Value) -> SqlType {
    match value {
        Value::Null => SqlType::Text,
        Value::Bool(_) => SqlType::Boolean,
        Value::Int(_) => SqlType::Integer,
        Value::Float(_) => SqlType::Floating,
        Value::String(_) => SqlType::Text,
        Value::Timestamp(_) => SqlType::Timestamp,
        Value::Date(_) => SqlType::Date,
        Value::Json(_) => SqlType::Json,
    }
}

/// One inferred column: sanitized name paired with its SQL type, in the
/// view's first-seen column order.
#[derive(Debug, Clone)]
pub struct InferredColumn {
    pub name: String,
    pub sql_type: SqlType,
}

/// Infers a schema by scanning each column for its first non-null value.
/// A column that is null in every row falls back to `TEXT` (§4.3, §9
/// "coerced-to-text fallback").
pub fn infer_schema(view: &TabularView) -> Vec<InferredColumn> {
    view.columns
        .iter()
        .map(|col| {
            let sample = view
                .rows
                .iter()
                .map(|row| view.column(row, col))
                .find(|v| !v.is_null());
            let sql_type = sample.as_ref().map(infer_from_sample).unwrap_or(SqlType::Text);
            InferredColumn {
                name: crate::ident::sanitize_column(col),
                sql_type,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_schemas::value::Fields;

    #[test]
    fn infers_types_from_first_non_null_sample() {
        let mut row1 = Fields::new();
        row1.insert("id".into(), Value::Null);
        row1.insert("active".into(), Value::Bool(true));
        let mut row2 = Fields::new();
        row2.insert("id".into(), Value::Int(7));
        row2.insert("active".into(), Value::Null);

        let view = TabularView::from_records(&[row1, row2]);
        let schema = infer_schema(&view);

        let id_col = schema.iter().find(|c| c.name == "id").unwrap();
        assert_eq!(id_col.sql_type, SqlType::Integer);
        let active_col = schema.iter().find(|c| c.name == "active").unwrap();
        assert_eq!(active_col.sql_type, SqlType::Boolean);
    }

    #[test]
    fn all_null_column_falls_back_to_text() {
        let mut row = Fields::new();
        row.insert("mystery".into(), Value::Null);
        let view = TabularView::from_records(&[row]);
        let schema = infer_schema(&view);
        assert_eq!(schema[0].sql_type, SqlType::Text);
    }
}
