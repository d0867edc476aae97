mod columns;
mod records;
mod scan;
mod tables;

use std::path::Path;

pub use records::{job_slices, quoted_value, subrecord_literal, RecordBlock};
pub use scan::{dsx_files, looks_like_dsx};
pub use tables::ExtractedTables;

use models::{Job, Stage};

/// Error type returned by parse operations. Malformed records inside a file
/// are skipped with a warning and never surface here; only I/O does.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Parses a DSX file into its jobs, one per `BEGIN DSJOB … END DSJOB` block.
/// Illegal UTF-8 is replaced; a file without DSJOB blocks yields an empty
/// list.
pub fn parse_file(path: impl AsRef<Path>) -> Result<Vec<Job>, ParseError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let content = String::from_utf8_lossy(&bytes);
    Ok(parse_content(&content, &path.display().to_string()))
}

/// Parses in-memory DSX content. `file_path` is a label recorded on each job.
pub fn parse_content(content: &str, file_path: &str) -> Vec<Job> {
    let (server_name, project) = parse_header(content);

    let mut jobs = Vec::new();
    for slice in records::job_slices(content) {
        match parse_job_slice(slice, file_path) {
            Some(mut job) => {
                job.server_name = server_name.clone();
                job.project = project.clone();
                jobs.push(job);
            }
            None => {
                tracing::warn!(file = file_path, "skipping DSJOB block without a usable name");
            }
        }
    }
    tracing::debug!(file = file_path, jobs = jobs.len(), "parsed DSX content");
    jobs
}

/// Reads `ServerName` and `ToolInstanceID` from the `BEGIN HEADER` block.
fn parse_header(content: &str) -> (Option<String>, Option<String>) {
    let Some(header) = records::header_slice(content) else {
        return (None, None);
    };
    (
        records::quoted_value(header, "ServerName"),
        records::quoted_value(header, "ToolInstanceID"),
    )
}

/// Assembles one job from its DSJOB slice: identity from the DSJOB header
/// lines and the ROOT record, then stages, tables, and columns.
fn parse_job_slice(slice: &str, file_path: &str) -> Option<Job> {
    let identifier = records::quoted_value(slice, "Identifier");
    let date_modified = records::quoted_value(slice, "DateModified");
    let time_modified = records::quoted_value(slice, "TimeModified");

    let root = records::record_blocks(slice).find(|r| r.identifier == "ROOT");
    let (name, description, category) = match &root {
        Some(root) => (
            records::quoted_value(root.body, "Name"),
            records::quoted_value(root.body, "Description"),
            records::quoted_value(root.body, "Category"),
        ),
        None => (None, None, None),
    };

    let name = name.or_else(|| identifier.clone())?;

    let ExtractedTables {
        source_tables,
        target_tables,
        warnings,
    } = tables::extract_tables(slice);
    for warning in &warnings {
        tracing::warn!(file = file_path, job = %name, "{warning}");
    }

    Some(Job {
        name,
        identifier,
        description,
        category,
        date_modified,
        time_modified,
        server_name: None,
        project: None,
        file_path: file_path.to_string(),
        stages: extract_stages(slice),
        source_tables,
        target_tables,
        columns: columns::extract_columns(slice),
    })
}

/// A DSRECORD qualifies as a stage when its `OLEType` names one.
fn extract_stages(slice: &str) -> Vec<Stage> {
    let mut stages = Vec::new();
    for record in records::record_blocks(slice) {
        let Some(ole_type) = records::quoted_value(record.body, "OLEType") else {
            continue;
        };
        if !ole_type.contains("Stage") {
            continue;
        }
        let name = records::quoted_value(record.body, "Name")
            .unwrap_or_else(|| record.identifier.to_string());
        stages.push(Stage {
            identifier: record.identifier.to_string(),
            name,
            ole_type,
            stage_type: records::quoted_value(record.body, "StageType").unwrap_or_default(),
            description: records::quoted_value(record.body, "Description"),
        });
    }
    stages
}
