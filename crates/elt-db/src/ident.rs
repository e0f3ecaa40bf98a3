//! SQL identifiers built from record field names can't go through bind
//! parameters, so every name interpolated into a query string is folded
//! through here first: alphanumeric-and-underscore only, underscore-prefixed
//! if it would start with a digit. `elt_core::table_name` handles the
//! `(source_id, stream, layer)` triple; this handles column names drawn
//! from connector-supplied record keys.

pub fn sanitize_column(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>()
        .to_lowercase();
    if out.is_empty() {
        return "_col".to_string();
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

pub fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

pub fn quote_qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_to_lowercase_alnum_underscore() {
        assert_eq!(sanitize_column("Order-ID!"), "order_id_");
    }

    #[test]
    fn prefixes_leading_digit() {
        assert_eq!(sanitize_column("1st_seen"), "_1st_seen");
    }

    #[test]
    fn quoting_escapes_embedded_quotes() {
        assert_eq!(quote_ident("weird\"name"), "\"weird\"\"name\"");
    }
}
