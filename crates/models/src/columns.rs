use serde::{Deserialize, Serialize};

/// A column observed flowing through a job, attributed to one table.
///
/// `column_type` is the type string exactly as the export spells it (an SQL
/// type, a DataStage `ustring[max=60]`, or `Unknown` for columns recovered by
/// the proximity fallback); no dialect interpretation is attempted.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub stage_name: String,
    #[serde(default)]
    pub stage_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_id: Option<String>,
}

impl Column {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            column_type: "Unknown".to_string(),
            nullable: None,
            stage_name: String::new(),
            stage_id: String::new(),
            link_id: None,
        }
    }
}
