//! Column-change impact report with per-job change guides.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::search::{self, TableColumnHit};
use crate::{AnalysisError, CoreContext};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Rename,
    Delete,
    #[default]
    Modify,
    Add,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Rename => "rename",
            Self::Delete => "delete",
            Self::Modify => "modify",
            Self::Add => "add",
        };
        f.write_str(label)
    }
}

impl FromStr for ChangeKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "rename" => Ok(Self::Rename),
            "delete" => Ok(Self::Delete),
            "modify" => Ok(Self::Modify),
            "add" => Ok(Self::Add),
            other => Err(format!("unknown change kind '{other}'")),
        }
    }
}

/// Ordered, human-readable actions for one affected job. Strictly
/// descriptive: nothing here mutates an export.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct JobChangeGuide {
    pub job_name: String,
    pub file_path: String,
    pub file_name: String,
    pub affected_tables: BTreeSet<String>,
    pub change_actions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnChangeSummary {
    pub total_tables: usize,
    pub total_jobs: usize,
    pub unique_tables: usize,
    pub unique_jobs: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ColumnChangeReport {
    pub column_name: String,
    pub change_type: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
    pub summary: ColumnChangeSummary,
    pub tables: Vec<TableColumnHit>,
    pub jobs: Vec<JobChangeGuide>,
    pub warnings: Vec<String>,
}

pub fn analyze_column_change(
    ctx: &CoreContext,
    column_name: &str,
    change_type: ChangeKind,
    new_name: Option<&str>,
    export_dir: &Path,
) -> Result<ColumnChangeReport, AnalysisError> {
    tracing::info!(column = column_name, kind = %change_type, "analyzing column change");

    let tables_with_column = search::find_tables_using_column(ctx, column_name, export_dir)?;
    let jobs_with_column = search::find_jobs_using_column_only(ctx, column_name, export_dir)?;

    // Inverse relations, both scoped to this column.
    let mut job_to_tables: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for table in &tables_with_column {
        for related in &table.related_jobs {
            job_to_tables
                .entry(related.job_name.clone())
                .or_default()
                .insert(table.full_name.clone());
        }
    }

    let mut warnings = Vec::new();
    if jobs_with_column
        .iter()
        .any(|hit| hit.all_tables.len() > 1)
    {
        warnings.push(
            "some jobs matched by content scan only; their table attribution is tentative"
                .to_string(),
        );
    }

    let jobs: Vec<JobChangeGuide> = jobs_with_column
        .iter()
        .map(|hit| {
            let affected_tables = job_to_tables
                .get(&hit.job_name)
                .cloned()
                .unwrap_or_default();
            JobChangeGuide {
                job_name: hit.job_name.clone(),
                file_path: hit.file_path.clone(),
                file_name: Path::new(&hit.file_path)
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                change_actions: change_actions(
                    column_name,
                    change_type,
                    new_name,
                    &affected_tables,
                ),
                affected_tables,
            }
        })
        .collect();

    let unique_jobs: BTreeSet<&str> = jobs_with_column
        .iter()
        .map(|hit| hit.job_name.as_str())
        .collect();

    Ok(ColumnChangeReport {
        column_name: column_name.to_string(),
        change_type,
        new_name: new_name.map(str::to_string),
        summary: ColumnChangeSummary {
            total_tables: tables_with_column.len(),
            total_jobs: jobs_with_column.len(),
            unique_tables: job_to_tables.values().flatten().collect::<BTreeSet<_>>().len(),
            unique_jobs: unique_jobs.len(),
        },
        tables: tables_with_column,
        jobs,
        warnings,
    })
}

fn change_actions(
    column: &str,
    change_type: ChangeKind,
    new_name: Option<&str>,
    affected_tables: &BTreeSet<String>,
) -> Vec<String> {
    let mut actions = Vec::new();
    match change_type {
        ChangeKind::Rename => match new_name {
            Some(new_name) => {
                actions.push(format!("Rename column '{column}' to '{new_name}'"));
                actions.push(format!(
                    "Search the job's DSX for '{column}' and replace every occurrence with '{new_name}'"
                ));
            }
            None => actions.push(format!(
                "Rename column '{column}' (new name not yet decided)"
            )),
        },
        ChangeKind::Delete => {
            actions.push(format!("Drop column '{column}'"));
            actions.push(format!(
                "Remove every reference to '{column}' from the job's DSX (SELECT lists, mappings, constraints)"
            ));
        }
        ChangeKind::Modify => {
            actions.push(format!("Change the type or attributes of column '{column}'"));
            actions.push(format!(
                "Review every use of '{column}' in the job's DSX for the new type"
            ));
        }
        ChangeKind::Add => {
            actions.push(format!("Add column '{column}'"));
            actions.push(format!(
                "Extend the job's mappings to carry '{column}' where required"
            ));
        }
    }
    if !affected_tables.is_empty() {
        let mut preview: Vec<&str> = affected_tables.iter().map(String::as_str).take(3).collect();
        if affected_tables.len() > 3 {
            preview.push("…");
        }
        actions.push(format!("Affected tables: {}", preview.join(", ")));
    }
    actions.push("Redeploy the job and run a verification cycle".to_string());
    actions
}
