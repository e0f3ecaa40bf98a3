//! Cursor extraction for incremental syncs (§4.4 step 10, §9 "Open question
//! — last-STATE semantics"): prefer the connector's own STATE message, and
//! fall back to a fixed, authoritative column order when none was seen.

use elt_core::model::{CursorValue, Record};
use elt_protocol::StatePayload;

/// The fallback column order when no STATE message was observed. Fixed by
/// §9 — ambiguity between candidates is resolved by this order, not by
/// further guessing.
const FALLBACK_COLUMNS: &[&str] = &["updated_at", "created_at", "timestamp", "id"];

/// Extracts a cursor field/value pair, preferring the last STATE message's
/// stream-scoped checkpoint and falling back to the first recognized column
/// on the last record.
pub fn extract_cursor(last_state: Option<&StatePayload>, last_record: Option<&Record>) -> Option<(String, CursorValue)> {
    if let Some(state) = last_state {
        if let Some(stream_state) = &state.stream {
            if let Some(pair) = state_to_cursor_pair(&stream_state.state) {
                return Some(pair);
            }
        }
        if let Some(global) = &state.global {
            if let Some(pair) = state_to_cursor_pair(&global.shared_state) {
                return Some(pair);
            }
        }
    }

    let record = last_record?;
    for column in FALLBACK_COLUMNS {
        if let Some(value) = record.data.get(*column) {
            if let Some(cursor_value) = field_value_to_cursor(value) {
                return Some((column.to_string(), cursor_value));
            }
        }
    }
    None
}

fn state_to_cursor_pair(state: &serde_json::Value) -> Option<(String, CursorValue)> {
    match state {
        serde_json::Value::Object(obj) => {
            let (key, value) = obj.iter().next()?;
            json_to_cursor(value).map(|v| (key.clone(), v))
        }
        other => json_to_cursor(other).map(|v| ("cursor".to_string(), v)),
    }
}

fn json_to_cursor(v: &serde_json::Value) -> Option<CursorValue> {
    match v {
        serde_json::Value::String(s) => Some(CursorValue::String(s.clone())),
        serde_json::Value::Number(n) => n.as_i64().map(CursorValue::Int),
        _ => None,
    }
}

fn field_value_to_cursor(value: &elt_schemas::value::Value) -> Option<CursorValue> {
    use elt_schemas::value::Value;
    match value {
        Value::String(s) => Some(CursorValue::String(s.clone())),
        Value::Int(n) => Some(CursorValue::Int(*n)),
        Value::Timestamp(ts) => Some(CursorValue::Timestamp(*ts)),
        Value::Date(d) => Some(CursorValue::String(d.to_string())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use elt_schemas::value::{Fields, Value};

    fn record_with(fields: &[(&str, Value)]) -> Record {
        let mut data = Fields::new();
        for (k, v) in fields {
            data.insert(k.to_string(), v.clone());
        }
        Record { stream: "s".into(), namespace: None, data, emitted_at: 0 }
    }

    #[test]
    fn falls_back_to_updated_at_before_created_at() {
        let record = record_with(&[
            ("created_at", Value::String("2020-01-01".into())),
            ("updated_at", Value::String("2020-01-02".into())),
        ]);
        let (field, value) = extract_cursor(None, Some(&record)).unwrap();
        assert_eq!(field, "updated_at");
        assert_eq!(value, CursorValue::String("2020-01-02".into()));
    }

    #[test]
    fn falls_back_to_id_when_nothing_else_present() {
        let record = record_with(&[("id", Value::Int(7))]);
        let (field, value) = extract_cursor(None, Some(&record)).unwrap();
        assert_eq!(field, "id");
        assert_eq!(value, CursorValue::Int(7));
    }

    #[test]
    fn no_state_and_no_record_yields_none() {
        assert!(extract_cursor(None, None).is_none());
    }
}
