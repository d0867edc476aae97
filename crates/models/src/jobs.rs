use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Column, TableRef};

/// A data-processing node within a job (reader, transformer, writer).
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Stage {
    pub identifier: String,
    pub name: String,
    pub ole_type: String,
    #[serde(default)]
    pub stage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// One DataStage job as recovered from a `BEGIN DSJOB … END DSJOB` block.
///
/// `columns` maps a table full name (as-found, not normalized) to the columns
/// attributed to it; entries are deduplicated by `(table, column name)` at
/// extraction time.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
pub struct Job {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub stages: Vec<Stage>,
    #[serde(default)]
    pub source_tables: Vec<TableRef>,
    #[serde(default)]
    pub target_tables: Vec<TableRef>,
    #[serde(default)]
    pub columns: BTreeMap<String, Vec<Column>>,
}

impl Job {
    /// Source and target references in declaration order. A table emitted
    /// into both lists (unknown Context) appears twice, once per role.
    pub fn all_tables(&self) -> impl Iterator<Item = &TableRef> {
        self.source_tables.iter().chain(self.target_tables.iter())
    }

    pub fn uses_table(&self, table: &str, schema: Option<&str>) -> bool {
        let full = crate::names::normalize_table_name(&crate::names::full_name(
            schema.unwrap_or(""),
            table,
        ));
        self.all_tables().any(|t| {
            t.normalized_name() == full || (schema.is_none() && t.matches(table, None))
        })
    }

    /// True when any extracted column of any table (or of `table`, when
    /// given) matches `column` case-insensitively.
    pub fn uses_column(&self, column: &str, table: Option<&str>) -> bool {
        self.columns
            .iter()
            .filter(|(full, _)| match table {
                Some(t) => {
                    crate::names::normalize_table_name(full) == crate::names::normalize_table_name(t)
                }
                None => true,
            })
            .any(|(_, cols)| cols.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
    }
}
