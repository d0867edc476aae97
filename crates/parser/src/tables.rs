//! Table extraction from stage records.
//!
//! Three strategies run in order per DSRECORD, stopping at the first that
//! yields a table name: the plain `TableName`/`SchemaName` fields, the
//! embedded `XMLProperties` document (with a `FROM <tableref>` fallback over
//! its SQL payload), and a raw CDATA regex over the whole record. The
//! recovered reference is then split into schema and table, placeholder
//! forms are discarded, and parameter expressions are resolved.

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;

use models::{resolve_parameter, DbType, TableRef, TableRole};

use crate::records::{self, RecordBlock};

lazy_static! {
    static ref FROM_TABLE: Regex = Regex::new(r"(?is)FROM\s+([^\s,;]+(?:\.[^\s,;]+)*)").unwrap();
    static ref CDATA_TABLE: Regex =
        Regex::new(r"(?s)<TableName[^>]*><!\[CDATA\[(.*?)\]\]></TableName>").unwrap();
    static ref CDATA_SCHEMA: Regex =
        Regex::new(r"(?s)<SchemaName[^>]*><!\[CDATA\[(.*?)\]\]></SchemaName>").unwrap();
    static ref CONTEXT_VALUE: Regex =
        Regex::new(r"(?s)<Context[^>]*>(?:<!\[CDATA\[)?\s*(\d+)\s*(?:\]\]>)?</Context>").unwrap();
    static ref CDATA_SELECT: Regex =
        Regex::new(r"(?s)<SelectStatement[^>]*><!\[CDATA\[(.*?)\]\]></SelectStatement>").unwrap();
    static ref CDATA_SQL: Regex = Regex::new(r"(?s)<SQL[^>]*><!\[CDATA\[(.*?)\]\]></SQL>").unwrap();
}

/// Tables recovered from one job slice, split by role. A reference whose
/// Context is unknown is emitted into both lists, with a warning recorded.
#[derive(Debug, Default)]
pub struct ExtractedTables {
    pub source_tables: Vec<TableRef>,
    pub target_tables: Vec<TableRef>,
    pub warnings: Vec<String>,
}

pub fn extract_tables(slice: &str) -> ExtractedTables {
    let mut out = ExtractedTables::default();
    let mut seen_source: HashSet<(String, String, String)> = HashSet::new();
    let mut seen_target: HashSet<(String, String, String)> = HashSet::new();

    for record in records::record_blocks(slice) {
        let Some(table) = extract_record_table(&record) else {
            continue;
        };

        let key = (
            table.schema.clone(),
            table.table_name.clone(),
            table.stage_name.clone(),
        );
        match table.role {
            TableRole::Source => {
                if seen_source.insert(key) {
                    out.source_tables.push(table);
                }
            }
            TableRole::Target => {
                if seen_target.insert(key) {
                    out.target_tables.push(table);
                }
            }
            TableRole::Unknown => {
                out.warnings.push(format!(
                    "Context absent for table '{}' in stage '{}'; classified as both source and target",
                    table.full_name(),
                    table.stage_name,
                ));
                if seen_source.insert(key.clone()) {
                    out.source_tables.push(table.clone());
                }
                if seen_target.insert(key) {
                    out.target_tables.push(table);
                }
            }
        }
    }
    out
}

fn extract_record_table(record: &RecordBlock<'_>) -> Option<TableRef> {
    let ole_type = records::quoted_value(record.body, "OLEType");
    let stage_name = records::quoted_value(record.body, "Name")
        .unwrap_or_else(|| record.identifier.to_string());
    let stage_type_field = records::quoted_value(record.body, "StageType");

    // Strategy A: plain fields on the record itself.
    let mut table = records::quoted_value(record.body, "TableName");
    let mut schema = records::quoted_value(record.body, "SchemaName");
    let mut role = TableRole::Unknown;
    let mut sql_derived = false;

    // Strategy B: the embedded XMLProperties document. Context is read even
    // when strategy A already produced a table, since role lives only here.
    if let Some(xml) = records::subrecord_literal(record.body, "XMLProperties") {
        match roxmltree::Document::parse(&xml) {
            Ok(doc) => {
                if let Some(context) = element_text(&doc, "Context") {
                    role = role_from_context(&context);
                }
                if table.is_none() {
                    table = element_text(&doc, "TableName");
                }
                if schema.is_none() {
                    schema = element_text(&doc, "SchemaName");
                }
                if table.is_none() {
                    for tag in ["SelectStatement", "SQL"] {
                        if let Some(sql) = element_text(&doc, tag) {
                            if let Some((t, s)) = table_from_sql(&sql) {
                                table = Some(t);
                                schema = schema.or(s);
                                sql_derived = true;
                                break;
                            }
                        }
                    }
                }
            }
            Err(err) => {
                tracing::debug!(stage = record.identifier, error = %err, "XMLProperties did not parse; falling back to regex");
                if role == TableRole::Unknown {
                    if let Some(caps) = CONTEXT_VALUE.captures(&xml) {
                        role = role_from_context(caps[1].trim());
                    }
                }
                if table.is_none() {
                    table = first_capture(&CDATA_TABLE, &xml);
                }
                if schema.is_none() {
                    schema = first_capture(&CDATA_SCHEMA, &xml);
                }
                if table.is_none() {
                    for pattern in [&*CDATA_SELECT, &*CDATA_SQL] {
                        if let Some(sql) = first_capture(pattern, &xml) {
                            if let Some((t, s)) = table_from_sql(&sql) {
                                table = Some(t);
                                schema = schema.or(s);
                                sql_derived = true;
                                break;
                            }
                        }
                    }
                }
            }
        }
    }

    // Strategy C: raw CDATA anywhere in the record.
    if table.is_none() {
        table = first_capture(&CDATA_TABLE, record.body);
    }

    let mut table_name = table?.trim().trim_matches('"').to_string();
    let mut schema = schema.map(|s| s.trim().trim_matches('"').to_string())
        .unwrap_or_default();

    // Dotted reference with no explicit schema: the left side is either a
    // schema or the parameter part of a parameterized expression.
    if schema.is_empty() && table_name.contains('.') {
        if let Some((left, right)) = table_name.rsplit_once('.') {
            if !left.starts_with('#') && !right.is_empty() {
                schema = left.to_string();
                table_name = right.to_string();
            }
        }
    }

    // A reference ending in `#.` (or a lone `#`) is an unresolved placeholder
    // naming no concrete table.
    if table_name.ends_with("#.") || table_name == "#" || table_name.is_empty() {
        return None;
    }

    let mut db_type = DbType::Unknown;
    let mut original_parameter = None;
    let mut is_parameter = false;
    if table_name.starts_with('#') {
        let resolved = resolve_parameter(&table_name);
        db_type = resolved.db_type;
        original_parameter = Some(resolved.original);
        is_parameter = true;
        if sql_derived {
            // SQL-derived references keep the expression the job actually
            // executes; only the db inference and default schema attach.
            if schema.is_empty() {
                schema = resolved.schema;
            }
        } else if !resolved.table_name.is_empty() {
            table_name = resolved.table_name;
            schema = resolved.schema;
        }
    }

    Some(TableRef {
        schema,
        table_name,
        db_type,
        role,
        stage_name,
        stage_type: ole_type
            .or(stage_type_field)
            .unwrap_or_else(|| "Unknown".to_string()),
        original_parameter,
        is_parameter,
    })
}

fn element_text(doc: &roxmltree::Document<'_>, tag: &str) -> Option<String> {
    doc.descendants()
        .find(|node| node.has_tag_name(tag))
        .and_then(|node| node.text())
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

fn first_capture(pattern: &Regex, haystack: &str) -> Option<String> {
    pattern
        .captures(haystack)
        .map(|caps| caps[1].trim().to_string())
        .filter(|text| !text.is_empty())
}

fn role_from_context(context: &str) -> TableRole {
    match context {
        "1" => TableRole::Source,
        "2" => TableRole::Target,
        _ => TableRole::Unknown,
    }
}

/// Pulls the first `FROM <tableref>` out of a SQL string. Returns the table
/// reference and, for a plain `schema.table` form, the split schema. A
/// reference whose schema side is a parameter is returned whole.
fn table_from_sql(sql: &str) -> Option<(String, Option<String>)> {
    let reference = FROM_TABLE.captures(sql)?[1].trim().to_string();
    match reference.rsplit_once('.') {
        Some((left, right)) if !left.starts_with('#') && !right.is_empty() => {
            Some((right.to_string(), Some(left.to_string())))
        }
        _ => Some((reference, None)),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn record_fixture(body: &str) -> String {
        format!("BEGIN DSRECORD\n   Identifier \"V0S1\"\n{body}END DSRECORD\n")
    }

    fn xml_stage(xml: &str) -> String {
        record_fixture(&format!(
            "   OLEType \"CCustomInput\"\n   Name \"S_IN\"\n   BEGIN DSSUBRECORD\n      Name \"XMLProperties\"\n      Value =+=+=+=\n{xml}\n=+=+=+=\n   END DSSUBRECORD\n"
        ))
    }

    #[test]
    fn vertica_parameter_resolves_to_schema_and_table() {
        let content = xml_stage(
            "<?xml version='1.0'?><Properties><Common><Context type='int'>1</Context></Common><Usage><TableName><![CDATA[#P_DW_VER.$P_DW_VER_OWN_BIDWADM#.FT_AS_ACCP_RSLT]]></TableName></Usage></Properties>",
        );
        let extracted = extract_tables(&content);
        assert_eq!(extracted.source_tables.len(), 1);
        assert!(extracted.target_tables.is_empty());
        let table = &extracted.source_tables[0];
        assert_eq!(table.schema, "BIDWADM");
        assert_eq!(table.table_name, "FT_AS_ACCP_RSLT");
        assert_eq!(table.db_type, DbType::Vertica);
        assert_eq!(table.role, TableRole::Source);
        assert!(table.is_parameter);
    }

    #[test]
    fn select_statement_fallback_keeps_parameter_expression() {
        let content = xml_stage(
            "<?xml version='1.0'?><Properties><Common><Context type='int'>1</Context></Common><Usage><SelectStatement><![CDATA[SELECT * FROM #P_ERP_MS.$P_ERP_MS_OWN_FILA_ERP#.WM_WRHS_M]]></SelectStatement></Usage></Properties>",
        );
        let extracted = extract_tables(&content);
        assert_eq!(extracted.source_tables.len(), 1);
        let table = &extracted.source_tables[0];
        assert_eq!(table.db_type, DbType::Mssql);
        assert_eq!(table.schema, "dbo");
        assert_eq!(
            table.table_name,
            "#P_ERP_MS.$P_ERP_MS_OWN_FILA_ERP#.WM_WRHS_M"
        );
        assert!(table.is_parameter);
    }

    #[test]
    fn missing_context_lands_in_both_roles() {
        let content = xml_stage(
            "<?xml version='1.0'?><Properties><Usage><TableName><![CDATA[#P_DW_VER.$P_DW_VER_OWN_BIDWADM#.FT_AS_ACCP_RSLT]]></TableName></Usage></Properties>",
        );
        let extracted = extract_tables(&content);
        assert_eq!(extracted.source_tables.len(), 1);
        assert_eq!(extracted.target_tables.len(), 1);
        assert_eq!(extracted.source_tables[0].role, TableRole::Unknown);
        assert!(!extracted.warnings.is_empty());
    }

    #[test]
    fn placeholder_reference_is_discarded() {
        let content = xml_stage(
            "<?xml version='1.0'?><Properties><Usage><TableName><![CDATA[#P_DW_VER.$P_DW_VER_OWN_BIDWADM_CO#.]]></TableName></Usage></Properties>",
        );
        let extracted = extract_tables(&content);
        assert!(extracted.source_tables.is_empty());
        assert!(extracted.target_tables.is_empty());
    }

    #[test]
    fn direct_fields_split_schema_from_dotted_name() {
        let content = record_fixture(
            "   OLEType \"CCustomOutput\"\n   Name \"T_OUT\"\n   TableName \"BIDWODS.OD_WM_WRHS_M\"\n",
        );
        let extracted = extract_tables(&content);
        // No Context anywhere: both roles.
        assert_eq!(extracted.source_tables.len(), 1);
        let table = &extracted.source_tables[0];
        assert_eq!(table.schema, "BIDWODS");
        assert_eq!(table.table_name, "OD_WM_WRHS_M");
        assert!(!table.is_parameter);
    }

    #[test]
    fn malformed_xml_falls_back_to_regex() {
        let content = xml_stage(
            "<Properties><Common><Context type='int'>2</Context></Common><Usage><TableName><![CDATA[BIDWADM.FT_X]]></TableName><unclosed</Usage>",
        );
        let extracted = extract_tables(&content);
        assert_eq!(extracted.target_tables.len(), 1);
        assert!(extracted.source_tables.is_empty());
        assert_eq!(extracted.target_tables[0].table_name, "FT_X");
        assert_eq!(extracted.target_tables[0].schema, "BIDWADM");
    }

    #[test]
    fn duplicate_references_are_deduplicated_per_role() {
        let stage = xml_stage(
            "<?xml version='1.0'?><Properties><Common><Context type='int'>1</Context></Common><Usage><TableName><![CDATA[BIDWADM.FT_X]]></TableName></Usage></Properties>",
        );
        let content = format!("{stage}{stage}");
        let extracted = extract_tables(&content);
        assert_eq!(extracted.source_tables.len(), 1);
    }
}
