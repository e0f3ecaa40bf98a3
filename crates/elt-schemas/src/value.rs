use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::BTreeMap;

/// A single record value, picked from the closed set the wire protocol and
/// every downstream layer agree on.
///
/// `Timestamp` and `Date` are kept distinct from `String` even though both
/// serialize to strings on the wire: the medallion writer's schema
/// inference (§6 "inferred typed columns") picks a SQL column type from the
/// first non-null sample, and a timestamp-shaped string must become a
/// `TIMESTAMP` column, not `TEXT`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Date(NaiveDate),
    Json(Json),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Best-effort coercion to a display string, used when a column type
    /// mismatch forces the "coerced-to-text" fallback (§9).
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Timestamp(ts) => ts.to_rfc3339(),
            Value::Date(d) => d.to_string(),
            Value::Json(j) => j.to_string(),
        }
    }

    /// Convert to `serde_json::Value` for canonical comparison and JSON
    /// storage (raw layer blobs, `state_data` columns).
    pub fn to_json(&self) -> Json {
        match self {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            Value::String(s) => Json::String(s.clone()),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339()),
            Value::Date(d) => Json::String(d.to_string()),
            Value::Json(j) => j.clone(),
        }
    }

    /// Best-effort reconstruction from a plain `serde_json::Value`, used
    /// when a wire payload (connector RECORD data, a stored JSON column)
    /// needs to become a typed [`Value`] again. Numbers that fit in `i64`
    /// become `Int`; everything else numeric becomes `Float`. Timestamps
    /// and dates are not recovered from bare strings here — a string stays
    /// a `String` unless the caller already knows its shape, matching the
    /// wire protocol's `RecordPayload::data` (plain JSON, no stamped
    /// distinction between text and date-shaped text).
    pub fn from_json(v: Json) -> Value {
        match v {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            Json::String(s) => Value::String(s),
            other => Value::Json(other),
        }
    }
}

/// Converts a record's raw JSON field map into [`Fields`] (§9 "Dynamically
/// typed payloads").
pub fn fields_from_json_map(map: serde_json::Map<String, Json>) -> Fields {
    map.into_iter().map(|(k, v)| (k, Value::from_json(v))).collect()
}

/// A record is a name -> value map, plus the wire envelope fields carried
/// alongside it (§3 "Record").
pub type Fields = BTreeMap<String, Value>;

/// A typed tabular view materialized from a batch of records (§4.4 step 5):
/// a fixed column order plus one row per record. Columns absent from a
/// given row are represented as `Value::Null`.
#[derive(Debug, Clone, Default)]
pub struct TabularView {
    pub columns: Vec<String>,
    pub rows: Vec<Fields>,
}

impl TabularView {
    /// Build a view from raw record field maps, taking the union of all
    /// keys (in first-seen order) as the column set.
    pub fn from_records(records: &[Fields]) -> Self {
        let mut columns = Vec::new();
        let mut seen = std::collections::BTreeSet::new();
        for record in records {
            for key in record.keys() {
                if seen.insert(key.clone()) {
                    columns.push(key.clone());
                }
            }
        }
        TabularView {
            columns,
            rows: records.to_vec(),
        }
    }

    pub fn column(&self, row: &Fields, name: &str) -> Value {
        row.get(name).cloned().unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn to_json_roundtrips_primitives() {
        assert_eq!(Value::Int(7).to_json(), Json::from(7));
        assert_eq!(Value::Bool(true).to_json(), Json::from(true));
        assert_eq!(Value::String("x".into()).to_json(), Json::from("x"));
    }

    #[test]
    fn tabular_view_unions_columns_in_first_seen_order() {
        let mut a = Fields::new();
        a.insert("id".into(), Value::Int(1));
        a.insert("name".into(), Value::String("a".into()));
        let mut b = Fields::new();
        b.insert("id".into(), Value::Int(2));
        b.insert("extra".into(), Value::Bool(true));

        let view = TabularView::from_records(&[a, b]);
        assert_eq!(view.columns, vec!["extra", "id", "name"]);
        assert_eq!(view.len(), 2);
    }

    #[test]
    fn missing_column_reads_as_null() {
        let mut row = Fields::new();
        row.insert("id".into(), Value::Int(1));
        let view = TabularView::from_records(&[row.clone()]);
        assert_eq!(view.column(&row, "missing"), Value::Null);
    }
}
