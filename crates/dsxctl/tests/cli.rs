//! End-to-end runs of the dsxctl binary against a fixture export.

use std::fs;
use std::path::Path;

use assert_cmd::Command;

fn dsx_job(job_name: &str, source: &str, target: &str) -> String {
    format!(
        r#"BEGIN DSJOB
   Identifier "{job_name}"
   BEGIN DSRECORD
      Identifier "ROOT"
      OLEType "CJobDefn"
      Name "{job_name}"
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

fn seed_export(dir: &Path) {
    let mut content = String::from("BEGIN HEADER\n   ServerName \"DS1\"\nEND HEADER\n");
    content.push_str(&dsx_job("J1", "ERP.T_A", "OD.T_B"));
    content.push_str(&dsx_job("J2", "OD.T_B", "FT.T_C"));
    fs::write(dir.join("exportall.dsx"), content).unwrap();
}

fn dsxctl(export: &Path, cache: &Path) -> Command {
    let mut cmd = Command::cargo_bin("dsxctl").unwrap();
    cmd.arg("--export-dir")
        .arg(export)
        .arg("--cache-dir")
        .arg(cache);
    cmd
}

#[test]
fn build_index_then_stats() {
    let export = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    seed_export(export.path());

    let assert = dsxctl(export.path(), cache.path())
        .arg("build-index")
        .assert()
        .success();
    let stats: serde_json::Value =
        serde_json::from_slice(&assert.get_output().stdout).expect("stats are JSON");
    assert_eq!(stats["processed_files"], 1);
    assert_eq!(stats["cached_jobs"], 2);
    assert_eq!(stats["errors"], 0);

    let assert = dsxctl(export.path(), cache.path()).arg("stats").assert().success();
    let stats: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(stats["graph"]["total_jobs"], 2);
    assert_eq!(stats["index"]["total_jobs"], 2);
}

#[test]
fn table_impact_reports_cascading_levels() {
    let export = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    seed_export(export.path());

    let assert = dsxctl(export.path(), cache.path())
        .args(["table-impact", "T_A", "--schema", "ERP", "--max-level", "2"])
        .assert()
        .success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["direct_impact"]["jobs"][0], "J1");
    assert_eq!(report["cascading_impact"]["0"]["tables"][0], "OD.T_B");
    assert_eq!(report["cascading_impact"]["1"]["jobs"][0], "J2");
    assert_eq!(report["cascading_impact"]["1"]["tables"][0], "FT.T_C");
}

#[test]
fn job_deps_show_prerequisites_and_dependents() {
    let export = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    seed_export(export.path());

    let assert = dsxctl(export.path(), cache.path())
        .args(["job-deps", "J2"])
        .assert()
        .success();
    let report: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout).unwrap();
    assert_eq!(report["prerequisite_jobs"][0], "J1");
}

#[test]
fn missing_export_directory_exits_with_user_error() {
    let cache = tempfile::tempdir().unwrap();
    dsxctl(Path::new("/definitely/not/here"), cache.path())
        .arg("build-index")
        .assert()
        .failure()
        .code(1);
}

#[test]
fn erp_impact_requires_an_existing_list() {
    let export = tempfile::tempdir().unwrap();
    let cache = tempfile::tempdir().unwrap();
    seed_export(export.path());

    dsxctl(export.path(), cache.path())
        .args(["erp-impact", "ANY_COL", "--erp-list", "/missing.csv"])
        .assert()
        .failure()
        .code(1);
}
