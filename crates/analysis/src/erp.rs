//! ERP → OD → FT tiered impact classification.
//!
//! Tier 1 jobs read an enumerated ERP table and load an OD table; tier 2
//! jobs read one of those OD tables and load an FT table. ERP membership
//! comes from a CSV list, OD/FT membership from configured schema sets and
//! name prefixes.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use index::JobIndex;
use models::{normalize_table_name, strip_schema, Job, TableRole};

use crate::{AnalysisError, CoreContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableTier {
    Erp,
    Od,
    Ft,
    Other,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TierJob {
    pub job_name: String,
    pub file_path: String,
    pub sources: BTreeSet<String>,
    pub targets: BTreeSet<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct ErpImpactSummary {
    pub jobs_with_column: usize,
    pub tier1_jobs: usize,
    pub tier2_jobs: usize,
    pub impacted_erp_tables: usize,
    pub candidate_erp_tables: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErpImpactReport {
    pub column: String,
    pub erp_tables: BTreeSet<String>,
    pub tier1_jobs: Vec<TierJob>,
    pub tier2_jobs: Vec<TierJob>,
    pub summary: ErpImpactSummary,
    pub warnings: Vec<String>,
}

#[derive(Debug, Default)]
pub struct ErpTierAnalyzer {
    erp_tables: BTreeSet<String>,
    erp_tables_simple: BTreeSet<String>,
    /// column → ERP tables that carry it, from the optional second CSV field.
    erp_column_map: BTreeMap<String, BTreeSet<String>>,
    od_schemas: BTreeSet<String>,
    ft_schemas: BTreeSet<String>,
    od_prefixes: Vec<String>,
    ft_prefixes: Vec<String>,
}

impl ErpTierAnalyzer {
    pub fn new(ctx: &CoreContext) -> Self {
        let erp = &ctx.config.erp_impact;
        Self {
            od_schemas: erp.od_schemas.iter().map(|s| s.to_uppercase()).collect(),
            ft_schemas: erp.ft_schemas.iter().map(|s| s.to_uppercase()).collect(),
            od_prefixes: erp.od_prefixes.iter().map(|p| p.to_uppercase()).collect(),
            ft_prefixes: erp.ft_prefixes.iter().map(|p| p.to_uppercase()).collect(),
            ..Self::default()
        }
    }

    /// Loads the ERP table list: one `table[,column]` record per row, `#`
    /// comments and blank lines ignored, names normalized.
    pub fn load_erp_tables(&mut self, path: &Path) -> Result<(), AnalysisError> {
        if !path.is_file() {
            return Err(AnalysisError::InputMissing(path.to_path_buf()));
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_path(path)?;

        let mut tables = BTreeSet::new();
        let mut column_map: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for record in reader.records() {
            let record = record?;
            let Some(table_field) = record.get(0).map(str::trim) else {
                continue;
            };
            if table_field.is_empty() {
                continue;
            }
            let table = normalize_table_name(table_field);
            tables.insert(table.clone());

            if let Some(column) = record.get(1).map(str::trim) {
                if !column.is_empty() {
                    column_map
                        .entry(column.to_uppercase())
                        .or_default()
                        .insert(table);
                }
            }
        }
        if tables.is_empty() {
            return Err(AnalysisError::EmptyErpList(path.to_path_buf()));
        }

        tracing::info!(
            tables = tables.len(),
            mapped_columns = column_map.len(),
            "loaded ERP table list"
        );
        self.erp_tables_simple = tables.iter().map(|t| strip_schema(t).to_string()).collect();
        self.erp_tables = tables;
        self.erp_column_map = column_map;
        Ok(())
    }

    /// Tier of a table full name: ERP by list membership (full or bare
    /// name), then OD/FT by schema set or name prefix.
    pub fn classify(&self, full_name: &str) -> TableTier {
        let normalized = normalize_table_name(full_name);
        if self.erp_tables.contains(&normalized)
            || self.erp_tables_simple.contains(strip_schema(&normalized))
        {
            return TableTier::Erp;
        }

        let (schema, table) = match normalized.split_once('.') {
            Some((schema, table)) => (schema, table),
            None => ("", normalized.as_str()),
        };
        if self.matches_tier(schema, table, &self.od_schemas, &self.od_prefixes) {
            return TableTier::Od;
        }
        if self.matches_tier(schema, table, &self.ft_schemas, &self.ft_prefixes) {
            return TableTier::Ft;
        }
        TableTier::Other
    }

    fn matches_tier(
        &self,
        schema: &str,
        table: &str,
        schemas: &BTreeSet<String>,
        prefixes: &[String],
    ) -> bool {
        (!schema.is_empty() && schemas.contains(schema))
            || prefixes.iter().any(|p| table.starts_with(p.as_str()))
    }

    /// Full tiered analysis for one query column.
    pub fn analyze_column(
        &self,
        ctx: &CoreContext,
        job_index: &JobIndex,
        column: &str,
        export_dir: &Path,
    ) -> Result<ErpImpactReport, AnalysisError> {
        if self.erp_tables.is_empty() {
            return Err(AnalysisError::EmptyErpList(export_dir.to_path_buf()));
        }
        tracing::info!(column, "starting ERP tier analysis");

        let mut warnings = Vec::new();
        let allowed: BTreeSet<String> = match self.erp_column_map.get(&column.to_uppercase()) {
            Some(tables) => tables.clone(),
            None => {
                warnings.push(format!(
                    "column '{column}' is not mapped in the ERP list; considering all {} ERP tables",
                    self.erp_tables.len()
                ));
                self.erp_tables.clone()
            }
        };
        let allowed_simple: BTreeSet<String> =
            allowed.iter().map(|t| strip_schema(t).to_string()).collect();

        let hits = crate::search::find_jobs_using_column_only(ctx, column, export_dir)?;
        let job_meta: BTreeMap<&str, &Job> = job_index
            .all_jobs()
            .map(|job| (job.name.as_str(), job))
            .collect();

        // Tier 1: ERP sources crossed with OD targets, narrowed to jobs
        // that mention the column.
        let mut tier1_jobs = Vec::new();
        let mut tier1_od_targets: BTreeSet<String> = BTreeSet::new();
        let mut impacted_erp: BTreeSet<String> = BTreeSet::new();
        for hit in &hits {
            let Some(job) = job_meta.get(hit.job_name.as_str()) else {
                continue;
            };
            let mut erp_sources =
                self.collect_tier(job, TableRole::Source, TableTier::Erp, Some((&allowed, &allowed_simple)));
            let mut od_targets = self.collect_tier(job, TableRole::Target, TableTier::Od, None);
            if erp_sources.is_empty() {
                erp_sources = self.collect_names(
                    &hit.all_tables,
                    TableTier::Erp,
                    Some((&allowed, &allowed_simple)),
                );
            }
            if od_targets.is_empty() {
                od_targets = self.collect_names(&hit.all_tables, TableTier::Od, None);
            }
            if erp_sources.is_empty() || od_targets.is_empty() {
                continue;
            }
            tier1_od_targets.extend(od_targets.iter().cloned());
            impacted_erp.extend(erp_sources.iter().cloned());
            tier1_jobs.push(TierJob {
                job_name: hit.job_name.clone(),
                file_path: hit.file_path.clone(),
                sources: erp_sources,
                targets: od_targets,
            });
        }

        // Tier 2: OD tables written by tier 1 feeding FT tables.
        let mut tier2_jobs = Vec::new();
        if !tier1_od_targets.is_empty() {
            for job in job_meta.values() {
                let od_sources = self.collect_tier(job, TableRole::Source, TableTier::Od, None);
                if od_sources.is_disjoint(&tier1_od_targets) {
                    continue;
                }
                let ft_targets = self.collect_tier(job, TableRole::Target, TableTier::Ft, None);
                if ft_targets.is_empty() {
                    continue;
                }
                tier2_jobs.push(TierJob {
                    job_name: job.name.clone(),
                    file_path: job.file_path.clone(),
                    sources: od_sources,
                    targets: ft_targets,
                });
            }
        }
        tier2_jobs.sort_by(|a, b| a.job_name.cmp(&b.job_name));

        tracing::info!(
            tier1 = tier1_jobs.len(),
            tier2 = tier2_jobs.len(),
            "ERP tier analysis finished"
        );
        Ok(ErpImpactReport {
            column: column.to_string(),
            summary: ErpImpactSummary {
                jobs_with_column: hits.len(),
                tier1_jobs: tier1_jobs.len(),
                tier2_jobs: tier2_jobs.len(),
                impacted_erp_tables: impacted_erp.len(),
                candidate_erp_tables: allowed.len(),
            },
            erp_tables: impacted_erp,
            tier1_jobs,
            tier2_jobs,
            warnings,
        })
    }

    /// Tables of `job` on one side matching `tier`. List membership decides
    /// the side: a reference with unknown Context sits in both lists and so
    /// participates in both directions.
    fn collect_tier(
        &self,
        job: &Job,
        role: TableRole,
        tier: TableTier,
        allowed: Option<(&BTreeSet<String>, &BTreeSet<String>)>,
    ) -> BTreeSet<String> {
        let tables = match role {
            TableRole::Source => &job.source_tables,
            TableRole::Target => &job.target_tables,
            TableRole::Unknown => return BTreeSet::new(),
        };
        let mut collected = BTreeSet::new();
        for table in tables {
            let name = table.normalized_name();
            if name.is_empty() || self.classify(&name) != tier {
                continue;
            }
            if let Some((full, simple)) = allowed {
                if !full.contains(&name) && !simple.contains(strip_schema(&name)) {
                    continue;
                }
            }
            collected.insert(name);
        }
        collected
    }

    fn collect_names(
        &self,
        names: &[String],
        tier: TableTier,
        allowed: Option<(&BTreeSet<String>, &BTreeSet<String>)>,
    ) -> BTreeSet<String> {
        names
            .iter()
            .map(|name| normalize_table_name(name))
            .filter(|name| !name.is_empty() && self.classify(name) == tier)
            .filter(|name| match allowed {
                Some((full, simple)) => {
                    full.contains(name) || simple.contains(strip_schema(name))
                }
                None => true,
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{Config, ErpImpactConfig};
    use std::io::Write;

    fn analyzer_with(erp_rows: &str) -> ErpTierAnalyzer {
        let ctx = CoreContext::new(Config {
            erp_impact: ErpImpactConfig {
                od_schemas: BTreeSet::from(["OD".to_string()]),
                ft_schemas: BTreeSet::from(["FT".to_string()]),
                od_prefixes: vec!["OD_".to_string()],
                ft_prefixes: vec!["FT_".to_string()],
                ..ErpImpactConfig::default()
            },
            ..Config::default()
        });
        let mut analyzer = ErpTierAnalyzer::new(&ctx);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(erp_rows.as_bytes()).unwrap();
        analyzer.load_erp_tables(file.path()).unwrap();
        analyzer
    }

    #[test]
    fn classification_prefers_erp_membership() {
        let analyzer = analyzer_with("ERP.T,COL_A\n# a comment\n\ndbo.WM_WRHS_M\n");
        assert_eq!(analyzer.classify("ERP.T"), TableTier::Erp);
        // Bare-name membership also counts.
        assert_eq!(analyzer.classify("OTHER.T"), TableTier::Erp);
        assert_eq!(analyzer.classify("WM_WRHS_M"), TableTier::Erp);
        assert_eq!(analyzer.classify("OD.S"), TableTier::Od);
        assert_eq!(analyzer.classify("X.OD_S"), TableTier::Od);
        assert_eq!(analyzer.classify("FT.U"), TableTier::Ft);
        assert_eq!(analyzer.classify("ELSE.WHAT"), TableTier::Other);
    }

    #[test]
    fn empty_erp_list_is_rejected() {
        let ctx = CoreContext::default();
        let mut analyzer = ErpTierAnalyzer::new(&ctx);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"# only a comment\n").unwrap();
        assert!(analyzer.load_erp_tables(file.path()).is_err());
    }

    #[test]
    fn missing_erp_list_is_input_missing() {
        let ctx = CoreContext::default();
        let mut analyzer = ErpTierAnalyzer::new(&ctx);
        assert!(analyzer
            .load_erp_tables(Path::new("/not/there.csv"))
            .is_err());
    }
}
