//! Bipartite Job ↔ Table dependency graph.
//!
//! Four adjacency maps give O(1) fan-out in either direction: job to its
//! source/target tables, and table to the jobs reading/writing it. Keys are
//! normalized table names and job names; the maps are the source of truth
//! and stay mutually symmetric by construction.

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

use serde::Serialize;

use models::{full_name, normalize_table_name, Job, TableRef, TableRole};

#[derive(Debug, Default)]
pub struct DependencyGraph {
    job_to_sources: BTreeMap<String, BTreeSet<String>>,
    job_to_targets: BTreeMap<String, BTreeSet<String>>,
    table_to_source_jobs: BTreeMap<String, BTreeSet<String>>,
    table_to_target_jobs: BTreeMap<String, BTreeSet<String>>,
    job_metadata: BTreeMap<String, Job>,
}

/// Jobs and tables first reached at one cascade level.
#[derive(Debug, Default, Serialize, PartialEq, Eq)]
pub struct LevelImpact {
    pub jobs: BTreeSet<String>,
    pub tables: BTreeSet<String>,
    pub job_count: usize,
    pub table_count: usize,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct JobDependencies {
    pub job_name: String,
    pub source_tables: BTreeSet<String>,
    pub target_tables: BTreeSet<String>,
    /// Jobs writing any of this job's source tables.
    pub prerequisite_jobs: BTreeSet<String>,
    /// Jobs reading any of this job's target tables.
    pub dependent_jobs: BTreeSet<String>,
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct UsageCount {
    pub name: String,
    pub count: usize,
}

#[derive(Debug, Serialize)]
pub struct GraphStatistics {
    pub total_jobs: usize,
    pub total_tables: usize,
    pub most_used_tables: Vec<UsageCount>,
    pub most_complex_jobs: Vec<UsageCount>,
    pub average_tables_per_job: f64,
}

const TOP_N: usize = 10;

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_jobs<'a>(jobs: impl IntoIterator<Item = &'a Job>) -> Self {
        let mut graph = Self::new();
        for job in jobs {
            graph.add_job(job);
        }
        tracing::info!(
            jobs = graph.job_metadata.len(),
            tables = graph.table_count(),
            "built dependency graph"
        );
        graph
    }

    /// Inserts a job's edges. Tables whose role could not be determined at
    /// extraction appear on both sides; when a job carries no role lists at
    /// all, stage cues classify each reference (defaulting to source).
    pub fn add_job(&mut self, job: &Job) {
        let mut sources: BTreeSet<String> = job
            .source_tables
            .iter()
            .map(TableRef::normalized_name)
            .filter(|name| !name.is_empty())
            .collect();
        let mut targets: BTreeSet<String> = job
            .target_tables
            .iter()
            .map(TableRef::normalized_name)
            .filter(|name| !name.is_empty())
            .collect();

        if sources.is_empty() && targets.is_empty() {
            for table in job.all_tables() {
                let name = table.normalized_name();
                if name.is_empty() {
                    continue;
                }
                match classify_role(table) {
                    TableRole::Target => targets.insert(name),
                    _ => sources.insert(name),
                };
            }
        }

        for table in &sources {
            self.table_to_source_jobs
                .entry(table.clone())
                .or_default()
                .insert(job.name.clone());
        }
        for table in &targets {
            self.table_to_target_jobs
                .entry(table.clone())
                .or_default()
                .insert(job.name.clone());
        }
        self.job_to_sources.insert(job.name.clone(), sources);
        self.job_to_targets.insert(job.name.clone(), targets);
        self.job_metadata.insert(job.name.clone(), job.clone());
    }

    /// Every job reading or writing the table, at its normalized name.
    pub fn direct_impact(&self, table: &str, schema: Option<&str>) -> BTreeSet<String> {
        let key = table_key(table, schema);
        let mut jobs = BTreeSet::new();
        if let Some(readers) = self.table_to_source_jobs.get(&key) {
            jobs.extend(readers.iter().cloned());
        }
        if let Some(writers) = self.table_to_target_jobs.get(&key) {
            jobs.extend(writers.iter().cloned());
        }
        jobs
    }

    /// Breadth-first cascade from a seed table. Level 0 holds the jobs
    /// touching the seed and the tables they write; each next level follows
    /// those tables. Every job and table appears at its first-seen level
    /// only, and traversal stops at `max_level` or when a frontier is empty.
    pub fn cascading_impact(
        &self,
        table: &str,
        schema: Option<&str>,
        max_level: u32,
    ) -> BTreeMap<u32, LevelImpact> {
        let seed = table_key(table, schema);
        let mut result = BTreeMap::new();
        let mut visited_jobs: HashSet<String> = HashSet::new();
        let mut visited_tables: HashSet<String> = HashSet::from([seed.clone()]);
        let mut frontier: BTreeSet<String> = BTreeSet::from([seed]);

        for level in 0..=max_level {
            let mut level_jobs = BTreeSet::new();
            let mut level_tables = BTreeSet::new();

            for table in &frontier {
                let readers = self.table_to_source_jobs.get(table).into_iter().flatten();
                let writers = self.table_to_target_jobs.get(table).into_iter().flatten();
                for job in readers.chain(writers) {
                    if !visited_jobs.insert(job.clone()) {
                        continue;
                    }
                    level_jobs.insert(job.clone());
                    for target in self.job_to_targets.get(job).into_iter().flatten() {
                        if visited_tables.insert(target.clone()) {
                            level_tables.insert(target.clone());
                        }
                    }
                }
            }

            if level_jobs.is_empty() && level_tables.is_empty() {
                break;
            }
            frontier = level_tables.clone();
            result.insert(
                level,
                LevelImpact {
                    job_count: level_jobs.len(),
                    table_count: level_tables.len(),
                    jobs: level_jobs,
                    tables: level_tables,
                },
            );
            if frontier.is_empty() {
                break;
            }
        }
        result
    }

    /// Enumerates paths `[table₀, job₁, table₁, …]` by following jobs that
    /// read each frontier table into the tables they write. Cycles are cut
    /// by a visited set over `(table, job, next_table)` hops. With no
    /// `end_table`, every reached path up to `max_depth` is returned.
    pub fn dependency_chain(
        &self,
        start_table: &str,
        end_table: Option<&str>,
        max_depth: usize,
    ) -> Vec<Vec<String>> {
        let start = normalize_table_name(start_table);
        let end = end_table.map(normalize_table_name);

        let mut chains = Vec::new();
        let mut visited: HashSet<(String, String, String)> = HashSet::new();
        let mut queue: VecDeque<(String, Vec<String>, usize)> =
            VecDeque::from([(start.clone(), vec![start], 0)]);

        while let Some((current, path, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            for job in self.table_to_source_jobs.get(&current).into_iter().flatten() {
                for next in self.job_to_targets.get(job).into_iter().flatten() {
                    let hop = (current.clone(), job.clone(), next.clone());
                    if !visited.insert(hop) {
                        continue;
                    }
                    let mut new_path = path.clone();
                    new_path.push(job.clone());
                    new_path.push(next.clone());

                    let reached_end = match &end {
                        None => true,
                        Some(end) => end == next,
                    };
                    if reached_end {
                        chains.push(new_path.clone());
                    }
                    if end.as_deref() != Some(next.as_str()) {
                        queue.push_back((next.clone(), new_path, depth + 1));
                    }
                }
            }
        }
        chains
    }

    pub fn job_dependencies(&self, job_name: &str) -> JobDependencies {
        let source_tables = self.job_to_sources.get(job_name).cloned().unwrap_or_default();
        let target_tables = self.job_to_targets.get(job_name).cloned().unwrap_or_default();

        let mut prerequisite_jobs = BTreeSet::new();
        for table in &source_tables {
            if let Some(writers) = self.table_to_target_jobs.get(table) {
                prerequisite_jobs.extend(writers.iter().cloned());
            }
        }
        prerequisite_jobs.remove(job_name);

        let mut dependent_jobs = BTreeSet::new();
        for table in &target_tables {
            if let Some(readers) = self.table_to_source_jobs.get(table) {
                dependent_jobs.extend(readers.iter().cloned());
            }
        }
        dependent_jobs.remove(job_name);

        JobDependencies {
            job_name: job_name.to_string(),
            source_tables,
            target_tables,
            prerequisite_jobs,
            dependent_jobs,
        }
    }

    pub fn statistics(&self) -> GraphStatistics {
        let mut table_usage: BTreeMap<&str, usize> = BTreeMap::new();
        for (table, jobs) in &self.table_to_source_jobs {
            *table_usage.entry(table).or_default() += jobs.len();
        }
        for (table, jobs) in &self.table_to_target_jobs {
            *table_usage.entry(table).or_default() += jobs.len();
        }

        let job_table_counts: BTreeMap<&str, usize> = self
            .job_to_sources
            .iter()
            .map(|(job, sources)| {
                let targets = self.job_to_targets.get(job).map_or(0, BTreeSet::len);
                (job.as_str(), sources.len() + targets)
            })
            .collect();

        let total_jobs = self.job_metadata.len();
        let total_table_refs: usize = job_table_counts.values().sum();

        GraphStatistics {
            total_jobs,
            total_tables: self.table_count(),
            most_used_tables: top_n(&table_usage),
            most_complex_jobs: top_n(&job_table_counts),
            average_tables_per_job: if total_jobs == 0 {
                0.0
            } else {
                total_table_refs as f64 / total_jobs as f64
            },
        }
    }

    pub fn job(&self, job_name: &str) -> Option<&Job> {
        self.job_metadata.get(job_name)
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.job_metadata.values()
    }

    pub fn targets_of(&self, job_name: &str) -> Option<&BTreeSet<String>> {
        self.job_to_targets.get(job_name)
    }

    pub fn sources_of(&self, job_name: &str) -> Option<&BTreeSet<String>> {
        self.job_to_sources.get(job_name)
    }

    pub fn readers_of(&self, table_key: &str) -> Option<&BTreeSet<String>> {
        self.table_to_source_jobs.get(table_key)
    }

    pub fn writers_of(&self, table_key: &str) -> Option<&BTreeSet<String>> {
        self.table_to_target_jobs.get(table_key)
    }

    pub fn table_count(&self) -> usize {
        self.table_to_source_jobs
            .keys()
            .chain(self.table_to_target_jobs.keys())
            .collect::<BTreeSet<_>>()
            .len()
    }

    pub fn clear(&mut self) {
        self.job_to_sources.clear();
        self.job_to_targets.clear();
        self.table_to_source_jobs.clear();
        self.table_to_target_jobs.clear();
        self.job_metadata.clear();
    }
}

/// Canonical graph key for a `(table, schema?)` pair.
pub fn table_key(table: &str, schema: Option<&str>) -> String {
    normalize_table_name(&full_name(schema.unwrap_or(""), table))
}

/// Role of a reference whose Context was not recorded, from stage cues:
/// explicit role first, then stage-type keywords, then conventional
/// stage-name prefixes, defaulting to source.
pub fn classify_role(table: &TableRef) -> TableRole {
    match table.role {
        TableRole::Source | TableRole::Target => return table.role,
        TableRole::Unknown => {}
    }

    let stage_type = table.stage_type.to_uppercase();
    if ["INPUT", "SOURCE", "READ"].iter().any(|k| stage_type.contains(k)) {
        return TableRole::Source;
    }
    if ["OUTPUT", "TARGET", "WRITE"].iter().any(|k| stage_type.contains(k)) {
        return TableRole::Target;
    }

    let stage_name = table.stage_name.to_uppercase();
    if stage_name.starts_with("S_") || stage_name.starts_with("L_") {
        return TableRole::Source;
    }
    if stage_name.starts_with("T_") || stage_name.starts_with("W_") {
        return TableRole::Target;
    }

    TableRole::Source
}

fn top_n(counts: &BTreeMap<&str, usize>) -> Vec<UsageCount> {
    let mut entries: Vec<UsageCount> = counts
        .iter()
        .map(|(name, count)| UsageCount {
            name: name.to_string(),
            count: *count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries.truncate(TOP_N);
    entries
}
