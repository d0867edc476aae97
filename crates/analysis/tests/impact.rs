//! Analyzer scenarios over a small export corpus.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use analysis::{
    analyze_cascading_impact, analyze_column_change, analyze_pk_impact, CascadingRequest,
    ChangeKind, Config, CoreContext, ErpImpactConfig, ErpTierAnalyzer, FkReference,
    PkImpactRequest, ProviderError, SchemaColumn, SchemaProvider,
};
use graph::DependencyGraph;
use index::JobIndex;

fn dsx_job(job_name: &str, description: &str, source: &str, target: &str) -> String {
    format!(
        r#"BEGIN DSJOB
   Identifier "{job_name}"
   BEGIN DSRECORD
      Identifier "ROOT"
      OLEType "CJobDefn"
      Name "{job_name}"
      Description "{description}"
   END DSRECORD
   BEGIN DSRECORD
      Identifier "V0S1"
      OLEType "CCustomStage"
      Name "S_IN"
      BEGIN DSSUBRECORD
         Name "XMLProperties"
         Value =+=+=+=
<?xml version='1.0'?><Properties><Common><Context type='int'>1</Context></Common><Usage><TableName><![CDATA[{source}]]></TableName></Usage></Properties>
=+=+=+=
      END DSSUBRECORD
   END DSRECORD
   BEGIN DSRECORD
      Identifier "V0S3"
      OLEType "CCustomStage"
      Name "T_OUT"
      BEGIN DSSUBRECORD
         Name "XMLProperties"
         Value =+=+=+=
<?xml version='1.0'?><Properties><Common><Context type='int'>2</Context></Common><Usage><TableName><![CDATA[{target}]]></TableName></Usage></Properties>
=+=+=+=
      END DSSUBRECORD
   END DSRECORD
END DSJOB
"#
    )
}

fn write_export(dir: &Path, file: &str, jobs: &[(&str, &str, &str, &str)]) {
    let mut content = String::from("BEGIN HEADER\n   ServerName \"DS1\"\nEND HEADER\n");
    for (job, description, source, target) in jobs {
        content.push_str(&dsx_job(job, description, source, target));
    }
    fs::write(dir.join(file), content).unwrap();
}

struct Corpus {
    _export: tempfile::TempDir,
    _cache: tempfile::TempDir,
    export_path: std::path::PathBuf,
    ctx: CoreContext,
    index: JobIndex,
    graph: DependencyGraph,
}

/// J_T1: ERP.T → OD.S (mentions STYL_CD); J_T2: OD.S → FT.U; J_OTHER is
/// unrelated noise.
fn tiered_corpus() -> Corpus {
    let export = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    write_export(
        export.path(),
        "tier1.dsx",
        &[("J_T1", "maps STYL_CD from ERP", "ERP.T", "OD.S")],
    );
    write_export(export.path(), "tier2.dsx", &[("J_T2", "od to ft", "OD.S", "FT.U")]);
    write_export(
        export.path(),
        "other.dsx",
        &[("J_OTHER", "unrelated", "MISC.A", "MISC.B")],
    );

    let mut index = JobIndex::open(cache.path()).unwrap();
    index.build_index(export.path(), false).unwrap();
    let graph = DependencyGraph::from_jobs(index.all_jobs());

    let ctx = CoreContext::new(Config {
        erp_impact: ErpImpactConfig {
            od_schemas: BTreeSet::from(["OD".to_string()]),
            ft_schemas: BTreeSet::from(["FT".to_string()]),
            ..ErpImpactConfig::default()
        },
        ..Config::default()
    });
    let export_path = export.path().to_path_buf();
    Corpus {
        _export: export,
        _cache: cache,
        export_path,
        ctx,
        index,
        graph,
    }
}

#[test]
fn erp_tiered_analysis_finds_both_tiers() {
    let corpus = tiered_corpus();

    let mut erp_list = tempfile::NamedTempFile::new().unwrap();
    use std::io::Write;
    erp_list.write_all(b"ERP.T,STYL_CD\n").unwrap();

    let mut analyzer = ErpTierAnalyzer::new(&corpus.ctx);
    analyzer.load_erp_tables(erp_list.path()).unwrap();

    let report = analyzer
        .analyze_column(&corpus.ctx, &corpus.index, "STYL_CD", &corpus.export_path)
        .unwrap();

    let tier1: Vec<&str> = report.tier1_jobs.iter().map(|j| j.job_name.as_str()).collect();
    let tier2: Vec<&str> = report.tier2_jobs.iter().map(|j| j.job_name.as_str()).collect();
    assert_eq!(tier1, vec!["J_T1"]);
    assert_eq!(tier2, vec!["J_T2"]);
    assert_eq!(report.erp_tables, BTreeSet::from(["ERP.T".to_string()]));
    assert_eq!(report.summary.tier1_jobs, 1);
    assert_eq!(report.summary.tier2_jobs, 1);
    assert_eq!(report.summary.impacted_erp_tables, 1);
}

#[test]
fn table_cascade_walks_reader_levels() {
    let corpus = tiered_corpus();
    let report = analyze_cascading_impact(
        &corpus.ctx,
        &corpus.index,
        &corpus.graph,
        &CascadingRequest {
            table_name: Some("T".to_string()),
            schema: Some("ERP".to_string()),
            change_type: ChangeKind::Modify,
            max_level: 3,
            ..CascadingRequest::default()
        },
        &corpus.export_path,
    )
    .unwrap();

    assert_eq!(
        report.direct_impact.jobs,
        BTreeSet::from(["J_T1".to_string()])
    );
    // Level 0 carries the direct jobs and the tables they write.
    let level0 = &report.cascading_impact["0"];
    assert!(level0.jobs.contains("J_T1"));
    assert_eq!(level0.tables, BTreeSet::from(["OD.S".to_string()]));
    let level1 = &report.cascading_impact["1"];
    assert!(level1.jobs.contains("J_T2"));
    assert_eq!(level1.tables, BTreeSet::from(["FT.U".to_string()]));
    assert!(report.summary.total_impacted_jobs >= 2);
    assert_eq!(report.summary.total_impacted_tables, 2);
}

#[test]
fn column_cascade_unions_per_table_results() {
    let corpus = tiered_corpus();
    let report = analyze_cascading_impact(
        &corpus.ctx,
        &corpus.index,
        &corpus.graph,
        &CascadingRequest {
            column_name: Some("STYL_CD".to_string()),
            change_type: ChangeKind::Rename,
            new_name: Some("STYLE_CD".to_string()),
            max_level: 2,
            ..CascadingRequest::default()
        },
        &corpus.export_path,
    )
    .unwrap();

    assert_eq!(
        report.direct_impact.jobs,
        BTreeSet::from(["J_T1".to_string()])
    );
    // Cascades seeded from ERP.T and OD.S both land J_T2 at some level.
    let all_jobs: BTreeSet<&str> = report
        .cascading_impact
        .values()
        .flat_map(|level| level.jobs.iter().map(String::as_str))
        .collect();
    assert!(all_jobs.contains("J_T2"));
}

#[test]
fn requesting_neither_table_nor_column_is_an_error() {
    let corpus = tiered_corpus();
    let result = analyze_cascading_impact(
        &corpus.ctx,
        &corpus.index,
        &corpus.graph,
        &CascadingRequest::default(),
        &corpus.export_path,
    );
    assert!(result.is_err());
}

#[test]
fn column_change_report_carries_guides() {
    let corpus = tiered_corpus();
    let report = analyze_column_change(
        &corpus.ctx,
        "STYL_CD",
        ChangeKind::Rename,
        Some("STYLE_CD"),
        &corpus.export_path,
    )
    .unwrap();

    assert_eq!(report.summary.total_jobs, 1);
    assert!(!report.tables.is_empty());
    let guide = &report.jobs[0];
    assert_eq!(guide.job_name, "J_T1");
    assert_eq!(guide.file_name, "tier1.dsx");
    assert!(guide
        .change_actions
        .iter()
        .any(|action| action.contains("STYLE_CD")));
}

struct StubProvider;

impl SchemaProvider for StubProvider {
    fn table_schema(&self, _table: &str, _schema: &str) -> Result<Vec<SchemaColumn>, ProviderError> {
        Ok(vec![
            SchemaColumn {
                name: "S_ID".to_string(),
                data_type: "int".to_string(),
                is_pk: true,
                nullable: false,
            },
            SchemaColumn {
                name: "S_NM".to_string(),
                data_type: "varchar".to_string(),
                is_pk: false,
                nullable: true,
            },
        ])
    }

    fn foreign_keys_referencing(
        &self,
        _table: &str,
        _schema: &str,
    ) -> Result<Vec<FkReference>, ProviderError> {
        Ok(vec![FkReference {
            referencing_schema: "OD".to_string(),
            referencing_table: "S_CHILD".to_string(),
            referencing_column: "S_ID".to_string(),
        }])
    }
}

#[test]
fn pk_impact_reports_fk_references_and_cascade() {
    let corpus = tiered_corpus();
    let report = analyze_pk_impact(
        Some(&StubProvider),
        &corpus.index,
        &corpus.graph,
        &PkImpactRequest {
            table_name: "S".to_string(),
            schema: "OD".to_string(),
            db_type: models::DbType::Vertica,
            old_pk: None,
            new_pk: Some(vec!["S_ID".to_string(), "S_DT".to_string()]),
            max_level: 2,
        },
    )
    .unwrap();

    assert_eq!(report.old_pk, vec!["S_ID".to_string()]);
    assert!(report.error.is_none());
    assert_eq!(report.fk_references.count, 1);
    assert!(report
        .fk_references
        .referencing_tables
        .contains("OD.S_CHILD"));
    // OD.S is read by J_T2 and written by J_T1: both cascade at level 0.
    let level0 = &report.cascading_impact["0"];
    assert_eq!(
        level0.jobs,
        BTreeSet::from(["J_T1".to_string(), "J_T2".to_string()])
    );
}

#[test]
fn comprehensive_dispatch_routes_by_change_type() {
    let corpus = tiered_corpus();

    let report = analysis::comprehensive_impact(
        &corpus.ctx,
        &corpus.index,
        &corpus.graph,
        Some(&StubProvider),
        &analysis::ComprehensiveRequest {
            change_type: "pk_change".to_string(),
            table_name: Some("S".to_string()),
            column_name: None,
            schema: Some("OD".to_string()),
            old_pk: None,
            new_pk: Some(vec!["S_ID".to_string()]),
            new_name: None,
            db_type: models::DbType::Vertica,
            max_level: 2,
        },
        &corpus.export_path,
    )
    .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["change_type"], "pk_change");
    assert_eq!(json["old_pk"][0], "S_ID");
    assert!(json["analyzed_at"].is_string());

    let report = analysis::comprehensive_impact(
        &corpus.ctx,
        &corpus.index,
        &corpus.graph,
        None,
        &analysis::ComprehensiveRequest {
            change_type: "column_rename".to_string(),
            table_name: None,
            column_name: Some("STYL_CD".to_string()),
            schema: None,
            old_pk: None,
            new_pk: None,
            new_name: Some("STYLE_CD".to_string()),
            db_type: models::DbType::Unknown,
            max_level: 2,
        },
        &corpus.export_path,
    )
    .unwrap();
    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["change_type"], "column_rename");
    assert_eq!(json["direct_impact"]["jobs"][0], "J_T1");
}

#[test]
fn trace_walks_column_table_job_hops() {
    let corpus = tiered_corpus();
    let report = analysis::trace_column_impact(
        &corpus.ctx,
        &corpus.graph,
        "STYL_CD",
        &corpus.export_path,
        3,
    )
    .unwrap();

    assert!(report.initial_tables.contains("ERP.T"));
    let hop = report
        .impact_chain
        .iter()
        .find(|hop| hop.job == "J_T2")
        .expect("J_T2 appears in the chain");
    assert_eq!(hop.source_table, "OD.S");
    assert_eq!(hop.target_table, "FT.U");
}

#[test]
fn pk_impact_without_provider_degrades_to_partial_report() {
    let corpus = tiered_corpus();
    let report = analyze_pk_impact(
        None,
        &corpus.index,
        &corpus.graph,
        &PkImpactRequest {
            table_name: "S".to_string(),
            schema: "OD".to_string(),
            db_type: models::DbType::Vertica,
            old_pk: None,
            new_pk: None,
            max_level: 1,
        },
    )
    .unwrap();

    assert!(report.error.is_some());
    assert!(report.old_pk.is_empty());
    assert!(!report.warnings.is_empty());
    assert!(!report.cascading_impact.is_empty());
}
