//! Flat hop-by-hop trace of a column's downstream influence.

use std::collections::BTreeSet;
use std::path::Path;

use serde::Serialize;

use graph::DependencyGraph;

use crate::{search, AnalysisError, CoreContext};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TraceHop {
    pub level: u32,
    pub source_table: String,
    pub job: String,
    pub target_table: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceReport {
    pub column: String,
    pub initial_tables: BTreeSet<String>,
    pub impact_chain: Vec<TraceHop>,
}

/// Walks Column → Table → Job → target Table → … to `max_depth`, recording
/// each hop once.
pub fn trace_column_impact(
    ctx: &CoreContext,
    dependency_graph: &DependencyGraph,
    column: &str,
    export_dir: &Path,
    max_depth: u32,
) -> Result<TraceReport, AnalysisError> {
    let tables = search::find_tables_using_column(ctx, column, export_dir)?;
    let initial_tables: BTreeSet<String> =
        tables.into_iter().map(|table| table.full_name).collect();

    let mut impact_chain = Vec::new();
    let mut visited_jobs: BTreeSet<String> = BTreeSet::new();
    let mut visited_tables: BTreeSet<String> = initial_tables.clone();
    let mut frontier: BTreeSet<String> = initial_tables.clone();

    for level in 1..=max_depth {
        let mut next_frontier = BTreeSet::new();
        for table in &frontier {
            for job in dependency_graph.readers_of(table).into_iter().flatten() {
                if !visited_jobs.insert(job.clone()) {
                    continue;
                }
                for target in dependency_graph.targets_of(job).into_iter().flatten() {
                    impact_chain.push(TraceHop {
                        level,
                        source_table: table.clone(),
                        job: job.clone(),
                        target_table: target.clone(),
                    });
                    if visited_tables.insert(target.clone()) {
                        next_frontier.insert(target.clone());
                    }
                }
            }
        }
        if next_frontier.is_empty() {
            break;
        }
        frontier = next_frontier;
    }

    Ok(TraceReport {
        column: column.to_string(),
        initial_tables,
        impact_chain,
    })
}
