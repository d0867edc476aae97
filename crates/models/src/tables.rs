use serde::{Deserialize, Serialize};

use crate::names;

/// Direction of a table relative to the job that references it.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TableRole {
    Source,
    Target,
    #[default]
    Unknown,
}

/// Database family a table reference resolves to. Inferred from DataStage
/// parameter groups; `Unknown` when the reference carries no hint.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Vertica,
    Mssql,
    #[default]
    Unknown,
}

/// A table referenced by a job stage, as recovered from the DSX export.
///
/// When `is_parameter` is true, either `table_name` still holds the full
/// `#group.$name#` expression (schema-side parameter recovered from SQL text),
/// or the parameter has been resolved and `db_type` carries the inference.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct TableRef {
    #[serde(default)]
    pub schema: String,
    pub table_name: String,
    #[serde(default)]
    pub db_type: DbType,
    #[serde(default)]
    pub role: TableRole,
    #[serde(default)]
    pub stage_name: String,
    #[serde(default)]
    pub stage_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_parameter: Option<String>,
    #[serde(default, skip_serializing_if = "crate::is_false")]
    pub is_parameter: bool,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            table_name: table_name.into(),
            db_type: DbType::Unknown,
            role: TableRole::Unknown,
            stage_name: String::new(),
            stage_type: String::new(),
            original_parameter: None,
            is_parameter: false,
        }
    }

    /// `schema.table` as found, or just the table when schema is empty.
    pub fn full_name(&self) -> String {
        names::full_name(&self.schema, &self.table_name)
    }

    /// Canonical upper-case full name used as a graph/index key.
    pub fn normalized_name(&self) -> String {
        names::normalize_table_name(&self.full_name())
    }

    pub fn matches(&self, table: &str, schema: Option<&str>) -> bool {
        if !self.table_name.eq_ignore_ascii_case(table) {
            return false;
        }
        match schema {
            Some(s) => self.schema.eq_ignore_ascii_case(s),
            None => true,
        }
    }
}
