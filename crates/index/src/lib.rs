//! Persistent job metadata index.
//!
//! Two JSON documents under the cache directory form the store: `lookup.json`
//! maps a job key to `(job_name, file_path, file_hash, cached_at)` and
//! `metadata.json` maps the same keys to full job records. Every mutation
//! writes both documents atomically (write to a temp name, then rename), so
//! a rebuild interrupted between files leaves a consistent snapshot behind.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use models::Job;

const LOOKUP_FILE: &str = "lookup.json";
const METADATA_FILE: &str = "metadata.json";

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("export directory not found: {0}")]
    ExportDirMissing(PathBuf),

    #[error("cache directory {path}: {source}")]
    CacheDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to persist index: {0}")]
    Persist(#[source] std::io::Error),

    #[error("failed to encode index: {0}")]
    Encode(#[from] serde_json::Error),
}

/// `lookup.json` entry for one cached job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LookupEntry {
    pub job_name: String,
    pub file_path: String,
    pub file_hash: String,
    pub cached_at: DateTime<Utc>,
}

/// Outcome of one `build_index` pass.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
pub struct BuildStats {
    pub total_files: usize,
    pub processed_files: usize,
    pub cached_jobs: usize,
    pub skipped_jobs: usize,
    pub errors: usize,
}

#[derive(Debug, Serialize)]
pub struct IndexStats {
    pub total_jobs: usize,
    pub total_tables: usize,
    pub total_columns: usize,
    pub most_used_tables: BTreeMap<String, usize>,
    pub most_used_columns: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct JobIndex {
    cache_dir: PathBuf,
    lookup: BTreeMap<String, LookupEntry>,
    metadata: BTreeMap<String, Job>,
}

impl JobIndex {
    /// Opens (or initializes) the index under `cache_dir`. A corrupt on-disk
    /// document falls back to an empty layer with a warning, never an error.
    pub fn open(cache_dir: impl Into<PathBuf>) -> Result<Self, IndexError> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir).map_err(|source| IndexError::CacheDir {
            path: cache_dir.clone(),
            source,
        })?;

        let lookup: BTreeMap<String, LookupEntry> = load_layer(&cache_dir.join(LOOKUP_FILE));
        let metadata: BTreeMap<String, Job> = load_layer(&cache_dir.join(METADATA_FILE));
        tracing::info!(
            cache_dir = %cache_dir.display(),
            jobs = lookup.len(),
            "opened job index"
        );
        Ok(Self {
            cache_dir,
            lookup,
            metadata,
        })
    }

    pub fn job_key(job_name: &str, file_path: &str) -> String {
        format!("{job_name}::{file_path}")
    }

    /// True when the job is cached and, if a hash is given, unchanged.
    pub fn is_cached(&self, job_name: &str, file_path: &str, file_hash: Option<&str>) -> bool {
        let Some(entry) = self.lookup.get(&Self::job_key(job_name, file_path)) else {
            return false;
        };
        match file_hash {
            Some(hash) => entry.file_hash == hash,
            None => true,
        }
    }

    pub fn get(&self, job_name: &str, file_path: &str) -> Option<&Job> {
        self.metadata.get(&Self::job_key(job_name, file_path))
    }

    /// Upserts both layers and writes through to disk.
    pub fn put(
        &mut self,
        job_name: &str,
        file_path: &str,
        job: Job,
        file_hash: &str,
    ) -> Result<(), IndexError> {
        let key = Self::job_key(job_name, file_path);
        self.lookup.insert(
            key.clone(),
            LookupEntry {
                job_name: job_name.to_string(),
                file_path: file_path.to_string(),
                file_hash: file_hash.to_string(),
                cached_at: Utc::now(),
            },
        );
        self.metadata.insert(key, job);
        self.persist()
    }

    pub fn invalidate_job(&mut self, job_name: &str, file_path: &str) -> Result<(), IndexError> {
        let key = Self::job_key(job_name, file_path);
        self.lookup.remove(&key);
        self.metadata.remove(&key);
        self.persist()
    }

    /// Drops every job cached from `file_path`.
    pub fn invalidate_file(&mut self, file_path: &str) -> Result<usize, IndexError> {
        let keys: Vec<String> = self
            .lookup
            .iter()
            .filter(|(_, entry)| entry.file_path == file_path)
            .map(|(key, _)| key.clone())
            .collect();
        for key in &keys {
            self.lookup.remove(key);
            self.metadata.remove(key);
        }
        self.persist()?;
        tracing::info!(file = file_path, jobs = keys.len(), "invalidated file");
        Ok(keys.len())
    }

    pub fn clear(&mut self) -> Result<(), IndexError> {
        self.lookup.clear();
        self.metadata.clear();
        self.persist()
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn all_jobs(&self) -> impl Iterator<Item = &Job> {
        self.metadata.values()
    }

    /// Jobs referencing the table, by normalized full name or bare name.
    pub fn jobs_by_table(&self, table: &str, schema: Option<&str>) -> Vec<&Job> {
        self.metadata
            .values()
            .filter(|job| job.uses_table(table, schema))
            .collect()
    }

    /// Jobs whose extracted columns contain `column`, optionally scoped to a
    /// table. Always a subset of `jobs_by_table` for that table.
    pub fn jobs_by_column(
        &self,
        column: &str,
        table: Option<&str>,
        schema: Option<&str>,
    ) -> Vec<&Job> {
        let scoped_table =
            table.map(|t| models::normalize_table_name(&models::full_name(schema.unwrap_or(""), t)));
        self.metadata
            .values()
            .filter(|job| job.uses_column(column, scoped_table.as_deref()))
            .collect()
    }

    pub fn stats(&self) -> IndexStats {
        let mut table_counts: BTreeMap<String, usize> = BTreeMap::new();
        let mut column_counts: BTreeMap<String, usize> = BTreeMap::new();
        for job in self.metadata.values() {
            for table in job.all_tables() {
                let name = table.normalized_name();
                if !name.is_empty() {
                    *table_counts.entry(name).or_default() += 1;
                }
            }
            for columns in job.columns.values() {
                for column in columns {
                    *column_counts.entry(column.name.clone()).or_default() += 1;
                }
            }
        }

        IndexStats {
            total_jobs: self.lookup.len(),
            total_tables: table_counts.len(),
            total_columns: column_counts.len(),
            most_used_tables: top_n(table_counts),
            most_used_columns: top_n(column_counts),
        }
    }

    /// Parses every DSX file under `export_dir` into the index. Files whose
    /// recorded hash still matches are skipped unless `force`; a parse error
    /// on one file is counted and the pass continues.
    pub fn build_index(&mut self, export_dir: &Path, force: bool) -> Result<BuildStats, IndexError> {
        if !export_dir.is_dir() {
            return Err(IndexError::ExportDirMissing(export_dir.to_path_buf()));
        }

        let files = parser::dsx_files(export_dir).map_err(IndexError::Persist)?;
        let mut stats = BuildStats {
            total_files: files.len(),
            ..BuildStats::default()
        };
        tracing::info!(files = files.len(), dir = %export_dir.display(), "building index");

        for file in files {
            let file_path = file.display().to_string();
            let hash = match file_hash(&file) {
                Ok(hash) => hash,
                Err(err) => {
                    tracing::debug!(file = %file_path, error = %err, "failed to stat file");
                    stats.errors += 1;
                    continue;
                }
            };

            if !force && self.is_file_cached(&file_path, &hash) {
                // Unchanged file: its jobs are served from cache as-is.
                stats.cached_jobs += self.jobs_cached_for(&file_path);
                continue;
            }

            let jobs = match parser::parse_file(&file) {
                Ok(jobs) => jobs,
                Err(err) => {
                    tracing::debug!(file = %file_path, error = %err, "parse failed");
                    stats.errors += 1;
                    continue;
                }
            };
            if jobs.is_empty() {
                continue;
            }

            stats.processed_files += 1;
            for job in jobs {
                let name = job.name.clone();
                match self.put(&name, &file_path, job, &hash) {
                    Ok(()) => stats.cached_jobs += 1,
                    Err(err) => {
                        tracing::warn!(job = %name, file = %file_path, error = %err, "failed to cache job");
                        stats.errors += 1;
                        stats.skipped_jobs += 1;
                    }
                }
            }
        }

        tracing::info!(
            processed = stats.processed_files,
            cached = stats.cached_jobs,
            skipped = stats.skipped_jobs,
            errors = stats.errors,
            "index build finished"
        );
        Ok(stats)
    }

    fn is_file_cached(&self, file_path: &str, hash: &str) -> bool {
        let mut any = false;
        for entry in self.lookup.values() {
            if entry.file_path != file_path {
                continue;
            }
            if entry.file_hash != hash {
                return false;
            }
            any = true;
        }
        any
    }

    fn jobs_cached_for(&self, file_path: &str) -> usize {
        self.lookup
            .values()
            .filter(|entry| entry.file_path == file_path)
            .count()
    }

    fn persist(&self) -> Result<(), IndexError> {
        write_atomic(&self.cache_dir.join(LOOKUP_FILE), &self.lookup)?;
        write_atomic(&self.cache_dir.join(METADATA_FILE), &self.metadata)
    }
}

/// Cheap content hash: `(file size, mtime seconds)`. Deliberately not a
/// digest, so a rename preserving both is not detected; callers use
/// `invalidate_file` in that case.
pub fn file_hash(path: &Path) -> std::io::Result<String> {
    let meta = fs::metadata(path)?;
    let mtime = meta
        .modified()?
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    Ok(format!("{}_{}", meta.len(), mtime))
}

fn load_layer<T: serde::de::DeserializeOwned + Default>(path: &Path) -> T {
    if !path.exists() {
        return T::default();
    }
    match fs::read(path).map_err(|e| e.to_string()).and_then(|bytes| {
        serde_json::from_slice(&bytes).map_err(|e| e.to_string())
    }) {
        Ok(layer) => layer,
        Err(err) => {
            tracing::warn!(file = %path.display(), error = %err, "corrupt index layer; starting empty");
            T::default()
        }
    }
}

fn write_atomic<T: Serialize>(path: &Path, value: &T) -> Result<(), IndexError> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).map_err(IndexError::Persist)?;
    fs::rename(&tmp, path).map_err(IndexError::Persist)
}

fn top_n(counts: BTreeMap<String, usize>) -> BTreeMap<String, usize> {
    let mut entries: Vec<(String, usize)> = counts.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    entries.truncate(10);
    entries.into_iter().collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use models::{Column, TableRef};

    fn sample_job(name: &str) -> Job {
        let mut job = Job {
            name: name.to_string(),
            file_path: "a.dsx".to_string(),
            ..Default::default()
        };
        job.source_tables.push(TableRef::new("dbo", "WM_WRHS_M"));
        job.columns
            .entry("dbo.WM_WRHS_M".to_string())
            .or_default()
            .push(Column::named("WRHS_CD"));
        job
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = JobIndex::open(dir.path()).unwrap();
        index
            .put("J1", "a.dsx", sample_job("J1"), "10_20")
            .unwrap();

        assert!(index.is_cached("J1", "a.dsx", None));
        assert!(index.is_cached("J1", "a.dsx", Some("10_20")));
        assert!(!index.is_cached("J1", "a.dsx", Some("11_20")));
        assert_eq!(index.get("J1", "a.dsx").unwrap().name, "J1");
    }

    #[test]
    fn reopen_reads_back_the_same_state() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut index = JobIndex::open(dir.path()).unwrap();
            index
                .put("J1", "a.dsx", sample_job("J1"), "10_20")
                .unwrap();
        }
        let index = JobIndex::open(dir.path()).unwrap();
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("J1", "a.dsx").unwrap(), &sample_job("J1"));
    }

    #[test]
    fn corrupt_layers_fall_back_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(LOOKUP_FILE), b"{not json").unwrap();
        fs::write(dir.path().join(METADATA_FILE), b"[]").unwrap();
        let index = JobIndex::open(dir.path()).unwrap();
        assert!(index.is_empty());
    }

    #[test]
    fn invalidate_file_removes_every_job_of_that_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = JobIndex::open(dir.path()).unwrap();
        index.put("J1", "a.dsx", sample_job("J1"), "1_1").unwrap();
        index.put("J2", "a.dsx", sample_job("J2"), "1_1").unwrap();
        index.put("J3", "b.dsx", sample_job("J3"), "1_1").unwrap();

        assert_eq!(index.invalidate_file("a.dsx").unwrap(), 2);
        assert_eq!(index.len(), 1);
        assert!(index.get("J3", "b.dsx").is_some());
    }

    #[test]
    fn column_lookup_refines_table_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = JobIndex::open(dir.path()).unwrap();
        index.put("J1", "a.dsx", sample_job("J1"), "1_1").unwrap();

        let by_table = index.jobs_by_table("WM_WRHS_M", None);
        let by_column = index.jobs_by_column("WRHS_CD", Some("WM_WRHS_M"), None);
        assert_eq!(by_table.len(), 1);
        assert_eq!(by_column.len(), 1);
        for job in &by_column {
            assert!(by_table.iter().any(|j| j.name == job.name));
        }
        assert!(index.jobs_by_column("NOPE", None, None).is_empty());
    }

    #[test]
    fn stats_count_tables_and_columns() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = JobIndex::open(dir.path()).unwrap();
        index.put("J1", "a.dsx", sample_job("J1"), "1_1").unwrap();
        index.put("J2", "b.dsx", sample_job("J2"), "1_1").unwrap();

        let stats = index.stats();
        assert_eq!(stats.total_jobs, 2);
        assert_eq!(stats.total_tables, 1);
        assert_eq!(stats.total_columns, 1);
        assert_eq!(stats.most_used_tables["WM_WRHS_M"], 2);
    }
}
