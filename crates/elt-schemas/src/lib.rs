//! Dynamically typed record values and the canonical comparisons layered on
//! top of them.
//!
//! Records crossing the connector boundary carry values from a closed set
//! (§9 "Dynamically typed payloads"): `null`, `bool`, `i64`, `f64`,
//! `string`, `timestamp`, `date`, or a nested JSON blob. [`Value`] is that
//! set; everything downstream (schema inference, SCD2 equality, row
//! hashing) is built on it rather than on raw `serde_json::Value` so a
//! mismatch between, say, a timestamp and a string is a type error instead
//! of a JSON quirk.

pub mod canonical;
pub mod hash;
pub mod value;

pub use canonical::canonical_eq;
pub use hash::row_hash;
pub use value::{fields_from_json_map, Value};
