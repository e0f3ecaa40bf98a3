use serde_json::Value as Json;

/// Canonical JSON equality used by SCD2 change detection (§4.3 step 3) and
/// the dedup row-hash writer.
///
/// Object key order never matters (`serde_json::Value::Object` is a
/// `BTreeMap`-backed map already comparable structurally), but floats
/// compare by IEEE-754 bit pattern rather than by `PartialEq` on `f64` so
/// that `-0.0 != 0.0` and `NaN == NaN` for the purpose of change detection
/// (§9 "Open question — SCD2 equality": adopted here as specified; flagged
/// as lossy for derived/rounded floats, which is an accepted limitation).
pub fn canonical_eq(a: &Json, b: &Json) -> bool {
    match (a, b) {
        (Json::Number(x), Json::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.to_bits() == fy.to_bits(),
            _ => x == y,
        },
        (Json::Array(xs), Json::Array(ys)) => {
            xs.len() == ys.len() && xs.iter().zip(ys).all(|(x, y)| canonical_eq(x, y))
        }
        (Json::Object(xs), Json::Object(ys)) => {
            xs.len() == ys.len()
                && xs
                    .iter()
                    .all(|(k, v)| ys.get(k).is_some_and(|y| canonical_eq(v, y)))
        }
        (x, y) => x == y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identical_primitives_are_equal() {
        assert!(canonical_eq(&json!({"a": 1, "b": "x"}), &json!({"b": "x", "a": 1})));
    }

    #[test]
    fn negative_zero_differs_from_zero() {
        assert!(!canonical_eq(&json!(-0.0), &json!(0.0)));
    }

    #[test]
    fn epsilon_close_floats_are_unequal() {
        assert!(!canonical_eq(&json!(0.1_f64 + 0.2_f64), &json!(0.3_f64)));
    }

    #[test]
    fn nested_array_mismatch_detected() {
        assert!(!canonical_eq(&json!([1, 2, 3]), &json!([1, 2, 4])));
    }

    #[test]
    fn different_key_counts_are_unequal() {
        assert!(!canonical_eq(&json!({"a": 1}), &json!({"a": 1, "b": 2})));
    }
}
