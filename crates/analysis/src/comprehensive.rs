//! Single entry point dispatching any change kind to its analyzer.

use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use graph::DependencyGraph;
use index::JobIndex;

use crate::cascading::{analyze_cascading_impact, CascadingReport, CascadingRequest};
use crate::pk::{analyze_pk_impact, PkImpactReport, PkImpactRequest, SchemaProvider};
use crate::{AnalysisError, ChangeKind, CoreContext};

#[derive(Debug, Clone)]
pub struct ComprehensiveRequest {
    /// One of `column_rename`, `column_delete`, `column_modify`,
    /// `column_add`, `pk_change`, `table_rename`, `table_delete`.
    pub change_type: String,
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub schema: Option<String>,
    pub old_pk: Option<Vec<String>>,
    pub new_pk: Option<Vec<String>>,
    pub new_name: Option<String>,
    pub db_type: models::DbType,
    pub max_level: u32,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ComprehensiveOutcome {
    Pk(PkImpactReport),
    Cascading(CascadingReport),
}

#[derive(Debug, Serialize)]
pub struct ComprehensiveReport {
    pub change_type: String,
    pub analyzed_at: DateTime<Utc>,
    #[serde(flatten)]
    pub outcome: ComprehensiveOutcome,
}

pub fn comprehensive_impact(
    ctx: &CoreContext,
    job_index: &JobIndex,
    dependency_graph: &DependencyGraph,
    provider: Option<&dyn SchemaProvider>,
    request: &ComprehensiveRequest,
    export_dir: &Path,
) -> Result<ComprehensiveReport, AnalysisError> {
    tracing::info!(change = %request.change_type, "comprehensive impact analysis");

    let outcome = match request.change_type.as_str() {
        "pk_change" => {
            let table_name = request
                .table_name
                .clone()
                .ok_or(AnalysisError::NothingToAnalyze)?;
            let report = analyze_pk_impact(
                provider,
                job_index,
                dependency_graph,
                &PkImpactRequest {
                    table_name,
                    schema: request.schema.clone().unwrap_or_else(|| "dbo".to_string()),
                    db_type: request.db_type,
                    old_pk: request.old_pk.clone(),
                    new_pk: request.new_pk.clone(),
                    max_level: request.max_level,
                },
            )?;
            ComprehensiveOutcome::Pk(report)
        }
        other => {
            // `column_rename` → rename, `table_delete` → delete, …
            let kind = other
                .rsplit('_')
                .next()
                .and_then(|suffix| ChangeKind::from_str(suffix).ok())
                .unwrap_or_default();
            let report = analyze_cascading_impact(
                ctx,
                job_index,
                dependency_graph,
                &CascadingRequest {
                    table_name: request.table_name.clone(),
                    column_name: request.column_name.clone(),
                    schema: request.schema.clone(),
                    change_type: kind,
                    new_name: request.new_name.clone(),
                    max_level: request.max_level,
                },
                export_dir,
            )?;
            ComprehensiveOutcome::Cascading(report)
        }
    };

    Ok(ComprehensiveReport {
        change_type: request.change_type.clone(),
        analyzed_at: Utc::now(),
        outcome,
    })
}
