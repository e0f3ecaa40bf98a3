//! Table naming rule (§6): `S_T_<suffix>`, non-alphanumeric characters
//! folded to underscore, lowercased, and underscore-prefixed if the result
//! would start with a digit. Schema names are fixed per layer.

/// The five layers a `(source_id, stream)` pair can project into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Raw,
    Validated,
    Business,
    Deduped,
    Cdc,
}

impl Layer {
    pub fn suffix(&self) -> &'static str {
        match self {
            Layer::Raw => "raw",
            Layer::Validated => "validated",
            Layer::Business => "business",
            Layer::Deduped => "deduped",
            Layer::Cdc => "cdc",
        }
    }

    /// Fixed schema name per layer (§6).
    pub fn schema(&self) -> &'static str {
        match self {
            Layer::Raw => "explore",
            Layer::Validated | Layer::Deduped | Layer::Cdc => "chart",
            Layer::Business => "navigate",
        }
    }
}

fn sanitize(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

/// Compute the fully qualified `schema.table` name for `(source_id, stream,
/// layer)`.
pub fn qualified_table_name(source_id: &str, stream: &str, layer: Layer) -> (String, String) {
    let table = sanitize(&format!("{source_id}_{stream}_{}", layer.suffix()));
    (layer.schema().to_string(), table)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replaces_non_alphanumeric_and_lowercases() {
        let (schema, table) = qualified_table_name("My-Source!", "Orders Stream", Layer::Raw);
        assert_eq!(schema, "explore");
        assert_eq!(table, "my_source__orders_stream_raw");
    }

    #[test]
    fn prefixes_underscore_when_leading_digit() {
        let (_, table) = qualified_table_name("123src", "users", Layer::Validated);
        assert!(table.starts_with('_'));
    }

    #[test]
    fn schema_per_layer() {
        assert_eq!(Layer::Raw.schema(), "explore");
        assert_eq!(Layer::Validated.schema(), "chart");
        assert_eq!(Layer::Deduped.schema(), "chart");
        assert_eq!(Layer::Cdc.schema(), "chart");
        assert_eq!(Layer::Business.schema(), "navigate");
    }
}
