//! Table identifier normalization.
//!
//! Matching is case-insensitive everywhere in the analysis pipeline, so
//! table identifiers are canonicalized once, here: upper-cased, quote-stripped,
//! and with the MSSQL default `dbo.` schema prefix removed.

/// Canonical form of a table reference: upper-case, quotes stripped from each
/// dotted part, and a leading `DBO.` removed.
pub fn normalize_table_name(name: &str) -> String {
    let trimmed = name.trim();
    let upper = trimmed.to_uppercase();

    let normalized = match upper.split_once('.') {
        Some((schema, table)) => {
            let schema = schema.trim().trim_matches('"');
            let table = table.trim().trim_matches('"');
            if schema.is_empty() {
                table.to_string()
            } else {
                format!("{schema}.{table}")
            }
        }
        None => upper.trim_matches('"').to_string(),
    };

    normalized
        .strip_prefix("DBO.")
        .map(str::to_string)
        .unwrap_or(normalized)
}

/// Joins a schema and table into the `schema.table` form, or just the table
/// when the schema is empty.
pub fn full_name(schema: &str, table: &str) -> String {
    if schema.is_empty() {
        table.to_string()
    } else {
        format!("{schema}.{table}")
    }
}

/// Splits a full name into `(schema, table)` at the first dot.
pub fn split_full_name(full: &str) -> (Option<&str>, &str) {
    match full.split_once('.') {
        Some((schema, table)) => (Some(schema), table),
        None => (None, full),
    }
}

/// Drops the schema qualifier, if any.
pub fn strip_schema(full: &str) -> &str {
    split_full_name(full).1
}
