use crate::value::{Fields, Value};
use sha2::{Digest, Sha256};

/// Deterministic SHA-256 over a row's column-name/value pairs in sorted
/// order (§4.3 "Row-hash diff"). `Fields` is already a `BTreeMap`, so
/// iteration order is the sort order for free; we still serialize
/// name/value pairs explicitly rather than hash the map's `Debug` output so
/// the digest is stable across representations.
pub fn row_hash(row: &Fields) -> String {
    let mut hasher = Sha256::new();
    for (name, value) in row.iter() {
        hasher.update(name.as_bytes());
        hasher.update([0u8]);
        hasher.update(canonical_bytes(value));
        hasher.update([0u8]);
    }
    hex::encode(hasher.finalize())
}

fn canonical_bytes(value: &Value) -> Vec<u8> {
    // serde_json's Value already serializes maps with sorted keys
    // (the "preserve_order" feature is not enabled here), giving a stable
    // byte representation for nested Value::Json payloads.
    serde_json::to_vec(&value.to_json()).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Fields {
        pairs.iter().cloned().map(|(k, v)| (k.to_string(), v)).collect()
    }

    #[test]
    fn identical_rows_hash_equal() {
        let a = row(&[("id", Value::Int(1)), ("name", Value::String("x".into()))]);
        let b = row(&[("name", Value::String("x".into())), ("id", Value::Int(1))]);
        assert_eq!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn changed_value_changes_hash() {
        let a = row(&[("id", Value::Int(1))]);
        let b = row(&[("id", Value::Int(2))]);
        assert_ne!(row_hash(&a), row_hash(&b));
    }

    #[test]
    fn hash_is_hex_sha256_length() {
        let a = row(&[("id", Value::Int(1))]);
        assert_eq!(row_hash(&a).len(), 64);
    }
}
