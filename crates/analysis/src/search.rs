//! Content-level scans over the export directory.
//!
//! These searches read DSX text directly instead of trusting extracted
//! metadata, so they also surface jobs whose column extraction was
//! incomplete. Scans are scoped per job slice, not per file, to attribute
//! hits correctly inside multi-job exports.

use std::collections::HashSet;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use serde::Serialize;

use models::normalize_table_name;

use crate::{AnalysisError, CoreContext, ScanLimits};

/// A job whose slice mentions the searched column.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ColumnJobHit {
    pub job_name: String,
    pub file_path: String,
    /// First table the column was located in (or the job's first table when
    /// column extraction found nothing).
    pub table_name: String,
    /// Every table the hit is attributed to, normalized.
    pub all_tables: Vec<String>,
    pub column_name: String,
}

/// A job referencing the searched table.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableJobHit {
    pub job_name: String,
    pub file_path: String,
    pub all_tables: Vec<String>,
}

/// A table grouped with the jobs that relate it to the searched column.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct TableColumnHit {
    pub full_name: String,
    pub schema: String,
    pub table_name: String,
    pub job_count: usize,
    pub related_jobs: Vec<RelatedJob>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct RelatedJob {
    pub job_name: String,
    pub file_path: String,
}

/// Upper-case variants a column may appear as in DSX text: verbatim, with
/// underscores dropped, and with underscores as spaces.
fn column_variants(column: &str) -> Vec<String> {
    let upper = column.to_uppercase();
    let mut variants = vec![upper.clone()];
    for variant in [upper.replace('_', ""), upper.replace('_', " ")] {
        if !variants.contains(&variant) {
            variants.push(variant);
        }
    }
    variants
}

fn contains_any(haystack_upper: &str, variants: &[String]) -> bool {
    variants.iter().any(|v| haystack_upper.contains(v))
}

/// Finds every job whose slice mentions `column` (in any variant spelling),
/// with the tables that contain the column per extraction. When extraction
/// found the column in no table, the job's tables stand in as candidates.
pub fn find_jobs_using_column_only(
    ctx: &CoreContext,
    column: &str,
    export_dir: &Path,
) -> Result<Vec<ColumnJobHit>, AnalysisError> {
    if !export_dir.is_dir() {
        return Err(AnalysisError::InputMissing(export_dir.to_path_buf()));
    }
    let variants = column_variants(column);
    let mut hits = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for file in list_files(export_dir)? {
        let file_path = file.display().to_string();
        let content = match read_guarded(&file, &variants, &ctx.config.scan) {
            Ok(Some(content)) => content,
            Ok(None) => {
                tracing::debug!(file = %file_path, "file too large and column absent from sample; skipped");
                continue;
            }
            Err(err) => {
                tracing::debug!(file = %file_path, error = %err, "unreadable; skipped");
                continue;
            }
        };
        if !contains_any(&content.to_uppercase(), &variants) {
            continue;
        }

        for slice in parser::job_slices(&content) {
            if !contains_any(&slice.to_uppercase(), &variants) {
                continue;
            }
            let Some(job) = parser::parse_content(slice, &file_path).into_iter().next() else {
                continue;
            };

            // Tables whose extracted columns contain the target.
            let mut found_in: Vec<String> = job
                .columns
                .iter()
                .filter(|(_, cols)| cols.iter().any(|c| c.name.eq_ignore_ascii_case(column)))
                .map(|(table, _)| normalize_table_name(table))
                .collect();
            if found_in.is_empty() {
                // Extraction may have missed the column; fall back to every
                // table the job touches.
                found_in = job
                    .all_tables()
                    .map(|t| t.normalized_name())
                    .filter(|name| !name.is_empty())
                    .collect();
            }
            found_in.sort();
            found_in.dedup();
            if found_in.is_empty() {
                continue;
            }

            let key = index::JobIndex::job_key(&job.name, &file_path);
            if !seen.insert(key) {
                continue;
            }
            hits.push(ColumnJobHit {
                job_name: job.name,
                file_path: file_path.clone(),
                table_name: found_in[0].clone(),
                all_tables: found_in,
                column_name: column.to_string(),
            });
        }
    }

    tracing::info!(column, jobs = hits.len(), "column content scan finished");
    Ok(hits)
}

/// Finds every job referencing `table`, preferring cached metadata and
/// falling back to a directory scan when the index is empty.
pub fn find_jobs_using_table(
    job_index: &index::JobIndex,
    table: &str,
    schema: Option<&str>,
    export_dir: &Path,
) -> Result<Vec<TableJobHit>, AnalysisError> {
    if !job_index.is_empty() {
        let jobs = job_index.jobs_by_table(table, schema);
        if !jobs.is_empty() {
            tracing::debug!(table, jobs = jobs.len(), "table lookup served from index");
            return Ok(jobs.into_iter().map(table_hit).collect());
        }
    }

    if !export_dir.is_dir() {
        return Err(AnalysisError::InputMissing(export_dir.to_path_buf()));
    }
    let mut hits = Vec::new();
    for file in list_files(export_dir)? {
        let jobs = match parser::parse_file(&file) {
            Ok(jobs) => jobs,
            Err(err) => {
                tracing::debug!(file = %file.display(), error = %err, "parse failed; skipped");
                continue;
            }
        };
        for job in jobs {
            if job.uses_table(table, schema) {
                hits.push(table_hit(&job));
            }
        }
    }
    Ok(hits)
}

fn table_hit(job: &models::Job) -> TableJobHit {
    let mut all_tables: Vec<String> = job
        .all_tables()
        .map(|t| t.normalized_name())
        .filter(|name| !name.is_empty())
        .collect();
    all_tables.sort();
    all_tables.dedup();
    TableJobHit {
        job_name: job.name.clone(),
        file_path: job.file_path.clone(),
        all_tables,
    }
}

/// Groups the tables related to `column` with the jobs connecting them.
pub fn find_tables_using_column(
    ctx: &CoreContext,
    column: &str,
    export_dir: &Path,
) -> Result<Vec<TableColumnHit>, AnalysisError> {
    let hits = find_jobs_using_column_only(ctx, column, export_dir)?;

    let mut tables: std::collections::BTreeMap<String, TableColumnHit> =
        std::collections::BTreeMap::new();
    for hit in &hits {
        for table in &hit.all_tables {
            if table.is_empty() || table == "UNKNOWN" {
                continue;
            }
            let entry = tables.entry(table.clone()).or_insert_with(|| {
                let (schema, table_name) = models::split_full_name(table);
                TableColumnHit {
                    full_name: table.clone(),
                    schema: schema.unwrap_or("").to_string(),
                    table_name: table_name.to_string(),
                    job_count: 0,
                    related_jobs: Vec::new(),
                }
            });
            entry.related_jobs.push(RelatedJob {
                job_name: hit.job_name.clone(),
                file_path: hit.file_path.clone(),
            });
            entry.job_count = entry.related_jobs.len();
        }
    }
    Ok(tables.into_values().collect())
}

fn list_files(export_dir: &Path) -> Result<Vec<std::path::PathBuf>, AnalysisError> {
    parser::dsx_files(export_dir).map_err(|source| AnalysisError::Io {
        path: export_dir.display().to_string(),
        source,
    })
}

/// Reads a file under the configured size limits. Returns `None` when the
/// file is over the skip threshold and the head+tail sample shows none of
/// the variants.
fn read_guarded(
    path: &Path,
    variants: &[String],
    limits: &ScanLimits,
) -> std::io::Result<Option<String>> {
    let size = fs::metadata(path)?.len();
    if size > limits.sample_threshold_bytes {
        let sample = read_sample(path, size, limits.sample_window_bytes)?;
        if !contains_any(&sample.to_uppercase(), variants) && size > limits.skip_threshold_bytes {
            return Ok(None);
        }
    }
    let bytes = fs::read(path)?;
    Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
}

fn read_sample(path: &Path, size: u64, window: u64) -> std::io::Result<String> {
    let mut file = fs::File::open(path)?;
    let mut head = vec![0u8; window.min(size) as usize];
    file.read_exact(&mut head)?;
    let mut sample = String::from_utf8_lossy(&head).into_owned();

    if size > 2 * window {
        file.seek(SeekFrom::End(-(window as i64)))?;
        let mut tail = Vec::with_capacity(window as usize);
        file.read_to_end(&mut tail)?;
        sample.push_str(&String::from_utf8_lossy(&tail));
    }
    Ok(sample)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn variants_cover_underscore_spellings() {
        let variants = column_variants("styl_cd");
        assert_eq!(variants, vec!["STYL_CD", "STYLCD", "STYL CD"]);
        assert_eq!(column_variants("NAME"), vec!["NAME"]);
    }
}
