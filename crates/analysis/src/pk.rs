//! Primary-key change impact.
//!
//! Live schema access is behind the `SchemaProvider` trait; when no provider
//! is available the analysis degrades to a partial report carrying an
//! `error` field, leaving the DSX-derived parts intact.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use graph::DependencyGraph;
use index::JobIndex;

use crate::cascading::LevelImpactReport;
use crate::AnalysisError;

#[derive(Debug, thiserror::Error)]
#[error("schema provider: {0}")]
pub struct ProviderError(pub String);

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SchemaColumn {
    pub name: String,
    pub data_type: String,
    pub is_pk: bool,
    pub nullable: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct FkReference {
    pub referencing_schema: String,
    pub referencing_table: String,
    pub referencing_column: String,
}

/// External collaborator answering live-database schema questions.
pub trait SchemaProvider {
    fn table_schema(&self, table: &str, schema: &str) -> Result<Vec<SchemaColumn>, ProviderError>;

    fn foreign_keys_referencing(
        &self,
        table: &str,
        schema: &str,
    ) -> Result<Vec<FkReference>, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct PkImpactRequest {
    pub table_name: String,
    pub schema: String,
    pub db_type: models::DbType,
    pub old_pk: Option<Vec<String>>,
    pub new_pk: Option<Vec<String>>,
    pub max_level: u32,
}

/// A job flagged because it uses a PK column; JOIN participation is a
/// heuristic hint, not parsed from SQL.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JoinLikelyJob {
    pub job_name: String,
    pub file_path: String,
    pub column: String,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct FkReferenceReport {
    pub referencing_tables: BTreeSet<String>,
    pub references: Vec<FkReference>,
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct PkImpactSummary {
    pub total_impacted_jobs: usize,
    pub fk_referencing_tables: usize,
    pub join_using_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PkImpactReport {
    pub table_name: String,
    pub schema: String,
    pub old_pk: Vec<String>,
    pub new_pk: Vec<String>,
    pub direct_impact: crate::cascading::DirectImpact,
    pub cascading_impact: BTreeMap<String, LevelImpactReport>,
    pub fk_references: FkReferenceReport,
    pub join_usage: Vec<JoinLikelyJob>,
    pub summary: PkImpactSummary,
    /// Populated when the schema provider was unavailable or failed; the
    /// rest of the report is still meaningful.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

pub fn analyze_pk_impact(
    provider: Option<&dyn SchemaProvider>,
    job_index: &JobIndex,
    dependency_graph: &DependencyGraph,
    request: &PkImpactRequest,
) -> Result<PkImpactReport, AnalysisError> {
    let table = &request.table_name;
    let schema = &request.schema;
    tracing::info!(table, schema, "analyzing PK change impact");

    let mut error = None;
    let mut warnings = Vec::new();

    let old_pk = match &request.old_pk {
        Some(columns) => columns.clone(),
        None => match provider {
            Some(provider) => match provider.table_schema(table, schema) {
                Ok(columns) => columns
                    .into_iter()
                    .filter(|c| c.is_pk)
                    .map(|c| c.name)
                    .collect(),
                Err(err) => {
                    error = Some(err.to_string());
                    Vec::new()
                }
            },
            None => {
                error = Some("no schema provider configured".to_string());
                Vec::new()
            }
        },
    };
    if old_pk.is_empty() {
        warnings.push(format!(
            "no PK columns known for {schema}.{table}; job impact limited to the table itself"
        ));
    }

    // Jobs touching any PK column of the table.
    let mut pk_jobs: BTreeSet<String> = BTreeSet::new();
    let mut join_usage: Vec<JoinLikelyJob> = Vec::new();
    for column in &old_pk {
        for job in job_index.jobs_by_column(column, Some(table), Some(schema)) {
            pk_jobs.insert(job.name.clone());
            if !join_usage.iter().any(|j| j.job_name == job.name) {
                join_usage.push(JoinLikelyJob {
                    job_name: job.name.clone(),
                    file_path: job.file_path.clone(),
                    column: column.clone(),
                    note: "likely used in a JOIN condition; verify in the job's SQL".to_string(),
                });
            }
        }
    }

    let cascading_impact: BTreeMap<String, LevelImpactReport> = dependency_graph
        .cascading_impact(table, Some(schema), request.max_level)
        .into_iter()
        .map(|(level, impact)| {
            (
                level.to_string(),
                LevelImpactReport {
                    jobs: impact.jobs,
                    tables: impact.tables,
                    job_count: impact.job_count,
                    table_count: impact.table_count,
                },
            )
        })
        .collect();

    let fk_references = match provider {
        Some(provider) => match provider.foreign_keys_referencing(table, schema) {
            Ok(references) => {
                let referencing_tables: BTreeSet<String> = references
                    .iter()
                    .map(|r| format!("{}.{}", r.referencing_schema, r.referencing_table))
                    .collect();
                FkReferenceReport {
                    count: referencing_tables.len(),
                    referencing_tables,
                    references,
                }
            }
            Err(err) => {
                if error.is_none() {
                    error = Some(err.to_string());
                }
                FkReferenceReport::default()
            }
        },
        None => FkReferenceReport::default(),
    };

    let mut all_jobs = pk_jobs.clone();
    for impact in cascading_impact.values() {
        all_jobs.extend(impact.jobs.iter().cloned());
    }

    Ok(PkImpactReport {
        table_name: table.clone(),
        schema: schema.clone(),
        old_pk,
        new_pk: request.new_pk.clone().unwrap_or_default(),
        direct_impact: crate::cascading::DirectImpact {
            job_count: pk_jobs.len(),
            jobs: pk_jobs,
        },
        cascading_impact,
        summary: PkImpactSummary {
            total_impacted_jobs: all_jobs.len(),
            fk_referencing_tables: fk_references.referencing_tables.len(),
            join_using_jobs: join_usage.len(),
        },
        fk_references,
        join_usage,
        error,
        warnings,
    })
}
