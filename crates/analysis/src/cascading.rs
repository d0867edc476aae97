//! Multi-level cascading impact, dispatching on what is being changed.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::Serialize;

use graph::DependencyGraph;
use index::JobIndex;
use models::split_full_name;

use crate::search;
use crate::{AnalysisError, ChangeKind, CoreContext};

#[derive(Debug, Clone, Default)]
pub struct CascadingRequest {
    pub table_name: Option<String>,
    pub column_name: Option<String>,
    pub schema: Option<String>,
    pub change_type: ChangeKind,
    pub new_name: Option<String>,
    pub max_level: u32,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct DirectImpact {
    pub jobs: BTreeSet<String>,
    pub job_count: usize,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct LevelImpactReport {
    pub jobs: BTreeSet<String>,
    pub tables: BTreeSet<String>,
    pub job_count: usize,
    pub table_count: usize,
}

#[derive(Debug, Clone, Serialize, Default, PartialEq, Eq)]
pub struct CascadeSummary {
    pub total_impacted_jobs: usize,
    pub total_impacted_tables: usize,
    pub max_level: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CascadingReport {
    pub change_type: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    pub direct_impact: DirectImpact,
    /// Levels keyed by string-encoded integers for JSON stability.
    pub cascading_impact: BTreeMap<String, LevelImpactReport>,
    pub summary: CascadeSummary,
    pub warnings: Vec<String>,
}

pub fn analyze_cascading_impact(
    ctx: &CoreContext,
    job_index: &JobIndex,
    dependency_graph: &DependencyGraph,
    request: &CascadingRequest,
    export_dir: &Path,
) -> Result<CascadingReport, AnalysisError> {
    if request.table_name.is_none() && request.column_name.is_none() {
        return Err(AnalysisError::NothingToAnalyze);
    }

    let mut warnings = Vec::new();
    let (direct_jobs, levels) = match &request.column_name {
        Some(column) => column_cascade(ctx, dependency_graph, request, column, export_dir)?,
        None => table_cascade(
            job_index,
            dependency_graph,
            request.table_name.as_deref().unwrap_or_default(),
            request.schema.as_deref(),
            request.max_level,
            export_dir,
            &mut warnings,
        )?,
    };

    let mut all_jobs: BTreeSet<String> = direct_jobs.clone();
    let mut all_tables: BTreeSet<String> = BTreeSet::new();
    let mut max_level = 0;
    for (level, impact) in &levels {
        all_jobs.extend(impact.jobs.iter().cloned());
        all_tables.extend(impact.tables.iter().cloned());
        max_level = max_level.max(level.parse::<u32>().unwrap_or(0));
    }

    tracing::info!(
        direct = direct_jobs.len(),
        total = all_jobs.len(),
        levels = levels.len(),
        "cascading analysis finished"
    );

    Ok(CascadingReport {
        change_type: request.change_type,
        table_name: request.table_name.clone(),
        column_name: request.column_name.clone(),
        schema: request.schema.clone(),
        new_name: request.new_name.clone(),
        direct_impact: DirectImpact {
            job_count: direct_jobs.len(),
            jobs: direct_jobs,
        },
        cascading_impact: levels,
        summary: CascadeSummary {
            total_impacted_jobs: all_jobs.len(),
            total_impacted_tables: all_tables.len(),
            max_level,
        },
        warnings,
    })
}

type CascadeLevels = BTreeMap<String, LevelImpactReport>;

/// Column mode: the direct set comes from the content scan; every table
/// those jobs touch seeds a graph cascade, and the per-level results are
/// unioned.
fn column_cascade(
    ctx: &CoreContext,
    dependency_graph: &DependencyGraph,
    request: &CascadingRequest,
    column: &str,
    export_dir: &Path,
) -> Result<(BTreeSet<String>, CascadeLevels), AnalysisError> {
    let hits = search::find_jobs_using_column_only(ctx, column, export_dir)?;
    let direct_jobs: BTreeSet<String> = hits.iter().map(|hit| hit.job_name.clone()).collect();

    let mut affected_tables: BTreeSet<String> = BTreeSet::new();
    for hit in &hits {
        affected_tables.extend(hit.all_tables.iter().cloned());
    }

    // A (table, schema) filter narrows the cascade to the named table only.
    if let (Some(table), Some(schema)) = (&request.table_name, &request.schema) {
        let wanted = graph::table_key(table, Some(schema));
        affected_tables.retain(|t| *t == wanted);
    }

    let mut levels: CascadeLevels = BTreeMap::new();
    for table in &affected_tables {
        let (schema, bare) = split_full_name(table);
        let cascade = dependency_graph.cascading_impact(bare, schema, request.max_level);
        for (level, impact) in cascade {
            let entry = levels.entry(level.to_string()).or_default();
            entry.jobs.extend(impact.jobs);
            entry.tables.extend(impact.tables);
        }
    }
    for entry in levels.values_mut() {
        entry.job_count = entry.jobs.len();
        entry.table_count = entry.tables.len();
    }
    Ok((direct_jobs, levels))
}

/// Table mode: level 0 holds the direct set together with the tables those
/// jobs write; each further level takes the unvisited readers of the
/// previous level's tables and the new tables they write, mirroring
/// `DependencyGraph::cascading_impact`.
fn table_cascade(
    job_index: &JobIndex,
    dependency_graph: &DependencyGraph,
    table: &str,
    schema: Option<&str>,
    max_level: u32,
    export_dir: &Path,
    warnings: &mut Vec<String>,
) -> Result<(BTreeSet<String>, CascadeLevels), AnalysisError> {
    let hits = search::find_jobs_using_table(job_index, table, schema, export_dir)?;
    let direct_jobs: BTreeSet<String> = hits.iter().map(|hit| hit.job_name.clone()).collect();

    let mut levels: CascadeLevels = BTreeMap::new();
    if direct_jobs.is_empty() {
        warnings.push(format!("no job references table '{table}'"));
        return Ok((direct_jobs, levels));
    }

    let direct_targets: BTreeSet<String> = direct_jobs
        .iter()
        .flat_map(|job| dependency_graph.targets_of(job).into_iter().flatten())
        .cloned()
        .collect();
    levels.insert(
        "0".to_string(),
        LevelImpactReport {
            job_count: direct_jobs.len(),
            table_count: direct_targets.len(),
            jobs: direct_jobs.clone(),
            tables: direct_targets.clone(),
        },
    );

    let mut visited_jobs: BTreeSet<String> = direct_jobs.clone();
    let mut visited_tables: BTreeSet<String> = direct_targets.clone();
    let mut frontier = direct_targets;
    for level in 1..=max_level {
        let mut level_jobs = BTreeSet::new();
        let mut level_tables = BTreeSet::new();
        for table in &frontier {
            for reader in dependency_graph.readers_of(table).into_iter().flatten() {
                if !visited_jobs.insert(reader.clone()) {
                    continue;
                }
                level_jobs.insert(reader.clone());
                for target in dependency_graph.targets_of(reader).into_iter().flatten() {
                    if visited_tables.insert(target.clone()) {
                        level_tables.insert(target.clone());
                    }
                }
            }
        }
        if level_jobs.is_empty() && level_tables.is_empty() {
            break;
        }
        levels.insert(
            level.to_string(),
            LevelImpactReport {
                job_count: level_jobs.len(),
                table_count: level_tables.len(),
                jobs: level_jobs,
                tables: level_tables.clone(),
            },
        );
        frontier = level_tables;
        if frontier.is_empty() {
            break;
        }
    }
    Ok((direct_jobs, levels))
}
