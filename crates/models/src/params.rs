//! Resolution of DataStage parameter expressions.
//!
//! Table references in an export frequently stand in for runtime job
//! parameters, e.g. `#P_DW_VER.$P_DW_VER_OWN_BIDWADM#.FT_AS_ACCP_RSLT`.
//! The group name hints at the database family and the `OWN_<schema>`
//! fragment reveals the owning schema.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{names, DbType};

lazy_static! {
    static ref OWNER_SCHEMA: Regex = Regex::new(r"\$P_[^#]*OWN_([^#]+)").unwrap();
}

/// Outcome of resolving a (possibly parameterized) table reference.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ResolvedTable {
    pub db_type: DbType,
    pub schema: String,
    pub table_name: String,
    pub full_name: String,
    pub original: String,
    pub is_parameter: bool,
}

/// Resolves a table reference of the form `#<group>.$<name>#.<table>` into a
/// concrete `(db_type, schema, table)` triple. Non-parameter references pass
/// through untouched. Pure; never fails.
pub fn resolve_parameter(reference: &str) -> ResolvedTable {
    if !reference.starts_with('#') {
        return ResolvedTable {
            db_type: DbType::Unknown,
            schema: String::new(),
            table_name: reference.to_string(),
            full_name: reference.to_string(),
            original: reference.to_string(),
            is_parameter: false,
        };
    }

    // The table is whatever follows the closing `#`-and-dot; a reference
    // ending in `#` is all parameter and names no table.
    let (param_part, table_name) = if reference.ends_with('#') {
        (reference, "")
    } else {
        match reference.rsplit_once('.') {
            Some((param, table)) => (param, table),
            None => (reference, ""),
        }
    };
    let param_upper = param_part.to_uppercase();

    let (db_type, schema) = if param_upper.contains("BIDW") {
        let schema = OWNER_SCHEMA
            .captures(param_part)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        (DbType::Vertica, schema)
    } else if param_upper.contains("ERP") {
        // ERP sources live in MSSQL, where the owner is the default schema.
        (DbType::Mssql, "dbo".to_string())
    } else {
        let schema = OWNER_SCHEMA
            .captures(param_part)
            .map(|c| c[1].to_string())
            .unwrap_or_default();
        (DbType::Unknown, schema)
    };

    ResolvedTable {
        db_type,
        full_name: names::full_name(&schema, table_name),
        schema,
        table_name: table_name.to_string(),
        original: reference.to_string(),
        is_parameter: true,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn bidw_group_resolves_to_vertica_with_owner_schema() {
        let resolved = resolve_parameter("#P_DW_VER.$P_DW_VER_OWN_BIDWADM#.FT_AS_ACCP_RSLT");
        assert_eq!(resolved.db_type, DbType::Vertica);
        assert_eq!(resolved.schema, "BIDWADM");
        assert_eq!(resolved.table_name, "FT_AS_ACCP_RSLT");
        assert_eq!(resolved.full_name, "BIDWADM.FT_AS_ACCP_RSLT");
        assert!(resolved.is_parameter);
    }

    #[test]
    fn erp_group_defaults_to_mssql_dbo() {
        let resolved = resolve_parameter("#P_ERP_MS.$P_ERP_MS_OWN_FILA_ERP#.WM_WRHS_M");
        assert_eq!(resolved.db_type, DbType::Mssql);
        assert_eq!(resolved.schema, "dbo");
        assert_eq!(resolved.table_name, "WM_WRHS_M");
    }

    #[test]
    fn unknown_group_keeps_owner_schema() {
        let resolved = resolve_parameter("#P_A.$P_A_OWN_B#.T");
        assert_eq!(resolved.db_type, DbType::Unknown);
        assert_eq!(resolved.schema, "B");
        assert_eq!(resolved.table_name, "T");
    }

    #[test]
    fn plain_reference_is_not_a_parameter() {
        let resolved = resolve_parameter("BIDWADM.FT_X");
        assert!(!resolved.is_parameter);
        assert_eq!(resolved.table_name, "BIDWADM.FT_X");
        assert_eq!(resolved.db_type, DbType::Unknown);
    }

    #[test]
    fn bare_parameter_has_no_table() {
        let resolved = resolve_parameter("#P_DW_VER.$P_DW_VER_OWN_BIDWADM#");
        assert_eq!(resolved.db_type, DbType::Vertica);
        assert_eq!(resolved.schema, "BIDWADM");
        assert_eq!(resolved.table_name, "");
        assert!(resolved.is_parameter);
    }
}
