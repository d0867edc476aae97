//! Column recovery from a job slice.
//!
//! Four patterns run over every DSRECORD, unioned under a global
//! `(table full name, column name)` deduplication set so higher-confidence
//! finds are never overwritten: stage-resident `Column` lines, Link
//! subrecord columns, `record(…)` schema literals, and a high-recall
//! proximity token scan. Proximity columns are tentative by design.

use std::collections::{BTreeMap, HashSet};

use lazy_static::lazy_static;
use regex::Regex;

use models::Column;

use crate::records::{self, RecordBlock};

lazy_static! {
    static ref TYPED_COLUMN: Regex =
        Regex::new(r#"Column\s+"([^"]+)"\s+Type\s+"([^"]+)""#).unwrap();
    static ref BARE_COLUMN: Regex = Regex::new(r#"Column\s+"([^"]+)""#).unwrap();
    static ref COLUMN_SUBRECORD: Regex =
        Regex::new(r#"(?s)BEGIN DSSUBRECORD\s+Name\s+"([^"]+)"(.*?)END DSSUBRECORD"#).unwrap();
    static ref SCHEMA_RECORD: Regex =
        Regex::new(r#"(?s)Name\s+"Schema"\s+Value\s+(?:[=+\s]+)?record\s*\((.*?)\)"#).unwrap();
    static ref SCHEMA_FIELD: Regex = Regex::new(r"(\w+)\s*:\s*(nullable\s+)?([^;]+);").unwrap();
    static ref UPPER_TOKEN: Regex = Regex::new(r#""([A-Z][A-Z0-9_]+)""#).unwrap();
}

/// A stage that resolved to a concrete table via its plain fields.
#[derive(Debug, Clone)]
struct StageTable {
    full_name: String,
    stage_name: String,
}

#[derive(Default)]
struct ColumnSink {
    by_table: BTreeMap<String, Vec<Column>>,
    seen: HashSet<(String, String)>,
}

impl ColumnSink {
    fn insert(&mut self, table_full_name: &str, column: Column) {
        let key = (table_full_name.to_string(), column.name.clone());
        if self.seen.insert(key) {
            self.by_table
                .entry(table_full_name.to_string())
                .or_default()
                .push(column);
        }
    }
}

pub fn extract_columns(slice: &str) -> BTreeMap<String, Vec<Column>> {
    let mut sink = ColumnSink::default();
    let stages = stage_tables(slice);

    // Pattern 1: columns declared on a record that names its table.
    for record in records::record_blocks(slice) {
        let Some(stage) = stages.get(record.identifier) else {
            continue;
        };
        for caps in TYPED_COLUMN.captures_iter(record.body) {
            sink.insert(
                &stage.full_name,
                stage_column(&caps[1], &caps[2], record.identifier, stage),
            );
        }
        for caps in BARE_COLUMN.captures_iter(record.body) {
            sink.insert(
                &stage.full_name,
                stage_column(&caps[1], "Unknown", record.identifier, stage),
            );
        }
    }

    // Patterns 2 and 3: link records carrying the schema that flows between
    // two stages; columns attach to both endpoint tables.
    for record in records::record_blocks(slice) {
        let ole_type = records::quoted_value(record.body, "OLEType");
        let link_name = records::quoted_value(record.body, "Name");
        let is_link = ole_type
            .as_deref()
            .is_some_and(|t| t.contains("Link") || t.contains("Output") || t.contains("Input"))
            || link_name.is_some();
        if !is_link {
            continue;
        }

        let endpoints = link_endpoints(&record, &stages);
        if endpoints.is_empty() {
            continue;
        }

        for caps in TYPED_COLUMN.captures_iter(record.body) {
            for (stage_id, stage) in &endpoints {
                sink.insert(
                    &stage.full_name,
                    link_column(&caps[1], &caps[2], None, stage_id, stage, record.identifier),
                );
            }
        }
        for caps in BARE_COLUMN.captures_iter(record.body) {
            for (stage_id, stage) in &endpoints {
                sink.insert(
                    &stage.full_name,
                    link_column(&caps[1], "Unknown", None, stage_id, stage, record.identifier),
                );
            }
        }

        if record.body.contains("Columns \"COutputColumn\"")
            || record.body.contains("Columns \"CInputColumn\"")
        {
            for caps in COLUMN_SUBRECORD.captures_iter(record.body) {
                let column_name = &caps[1];
                let subrecord = &caps[2];
                let sql_type =
                    records::quoted_value(subrecord, "SqlType").unwrap_or_else(|| "Unknown".into());
                let precision = records::quoted_value(subrecord, "Precision");
                let scale = records::quoted_value(subrecord, "Scale");
                let nullable = records::quoted_value(subrecord, "Nullable").map(|n| n == "1");

                let mut type_str = sql_type;
                if let Some(precision) = precision {
                    type_str.push('(');
                    type_str.push_str(&precision);
                    if let Some(scale) = scale {
                        type_str.push(',');
                        type_str.push_str(&scale);
                    }
                    type_str.push(')');
                }

                for (stage_id, stage) in &endpoints {
                    sink.insert(
                        &stage.full_name,
                        link_column(
                            column_name,
                            &type_str,
                            nullable,
                            stage_id,
                            stage,
                            record.identifier,
                        ),
                    );
                }
            }
        }

        if let Some(caps) = SCHEMA_RECORD.captures(record.body) {
            for field in SCHEMA_FIELD.captures_iter(&caps[1]) {
                let nullable = field.get(2).is_some();
                for (stage_id, stage) in &endpoints {
                    sink.insert(
                        &stage.full_name,
                        link_column(
                            &field[1],
                            field[3].trim(),
                            Some(nullable),
                            stage_id,
                            stage,
                            record.identifier,
                        ),
                    );
                }
            }
        }
    }

    // Pattern 4: proximity scan. Any upper-case token inside a link that
    // touches a stage with a known table is provisionally a column of it.
    for (stage_id, stage) in &stages {
        for record in records::record_blocks(slice) {
            let source = records::quoted_value(record.body, "SourceStage");
            let target = records::quoted_value(record.body, "TargetStage");
            if source.as_deref() != Some(stage_id) && target.as_deref() != Some(stage_id) {
                continue;
            }
            for caps in UPPER_TOKEN.captures_iter(record.body) {
                sink.insert(
                    &stage.full_name,
                    stage_column(&caps[1], "Unknown", stage_id, stage),
                );
            }
        }
    }

    let total: usize = sink.by_table.values().map(Vec::len).sum();
    tracing::debug!(
        tables = sink.by_table.len(),
        columns = total,
        "extracted columns"
    );
    sink.by_table
}

/// Stage id → table, for every record that names its table directly.
fn stage_tables(slice: &str) -> BTreeMap<String, StageTable> {
    let mut stages = BTreeMap::new();
    for record in records::record_blocks(slice) {
        let Some(table_name) = records::quoted_value(record.body, "TableName") else {
            continue;
        };
        let schema = records::quoted_value(record.body, "SchemaName").unwrap_or_default();
        let stage_name = records::quoted_value(record.body, "Name")
            .unwrap_or_else(|| record.identifier.to_string());
        stages.insert(
            record.identifier.to_string(),
            StageTable {
                full_name: models::full_name(&schema, &table_name),
                stage_name,
            },
        );
    }
    stages
}

/// Source and target endpoints of a link, resolved to stages with tables.
/// `SourceStage`/`TargetStage` are read directly, falling back to the
/// `Partner "src|srcPin|tgt|tgtPin"` field.
fn link_endpoints<'a>(
    record: &RecordBlock<'_>,
    stages: &'a BTreeMap<String, StageTable>,
) -> Vec<(String, &'a StageTable)> {
    let mut source = records::quoted_value(record.body, "SourceStage");
    let mut target = records::quoted_value(record.body, "TargetStage");
    if source.is_none() || target.is_none() {
        if let Some(partner) = records::quoted_value(record.body, "Partner") {
            let parts: Vec<&str> = partner.split('|').collect();
            if source.is_none() {
                source = parts.first().map(|s| s.to_string());
            }
            if target.is_none() && parts.len() >= 3 {
                target = Some(parts[2].to_string());
            }
        }
    }

    [source, target]
        .into_iter()
        .flatten()
        .filter_map(|id| stages.get(&id).map(|stage| (id, stage)))
        .collect()
}

fn stage_column(name: &str, column_type: &str, stage_id: &str, stage: &StageTable) -> Column {
    Column {
        name: name.to_string(),
        column_type: column_type.to_string(),
        nullable: None,
        stage_name: stage.stage_name.clone(),
        stage_id: stage_id.to_string(),
        link_id: None,
    }
}

fn link_column(
    name: &str,
    column_type: &str,
    nullable: Option<bool>,
    stage_id: &str,
    stage: &StageTable,
    link_id: &str,
) -> Column {
    Column {
        name: name.to_string(),
        column_type: column_type.to_string(),
        nullable,
        stage_name: stage.stage_name.clone(),
        stage_id: stage_id.to_string(),
        link_id: Some(link_id.to_string()),
    }
}
