mod logging;
mod output;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use serde::Serialize;

use analysis::{
    analyze_cascading_impact, analyze_column_change, analyze_pk_impact, AnalysisError,
    CascadingRequest, ChangeKind, Config, CoreContext, ErpTierAnalyzer, PkImpactRequest,
};
use graph::DependencyGraph;
use index::JobIndex;
use logging::{init_logging, LogArgs};
use output::{print_report, print_table, Output, OutputType};

/// dsxctl is a CLI for static impact analysis over DataStage DSX exports.
#[derive(Debug, Parser)]
#[clap(name = "dsxctl", version, about)]
struct Dsxctl {
    #[clap(flatten)]
    log_args: LogArgs,

    /// Configuration file; built-in defaults apply when it does not exist.
    #[clap(long, global = true, default_value = "dsxctl.yaml")]
    config: PathBuf,

    /// Override the configured export directory.
    #[clap(long, global = true)]
    export_dir: Option<PathBuf>,

    /// Override the configured cache directory.
    #[clap(long, global = true)]
    cache_dir: Option<PathBuf>,

    #[clap(flatten)]
    output: Output,

    #[clap(subcommand)]
    subcommand: Subcommand,
}

#[derive(Debug, clap::Subcommand)]
#[clap(rename_all = "kebab-case")]
enum Subcommand {
    /// Parse the export directory into the metadata cache
    BuildIndex(BuildIndexArgs),
    /// Jobs transitively affected by a table change
    TableImpact(TableImpactArgs),
    /// Column-change impact with per-job change guides
    ColumnImpact(ColumnImpactArgs),
    /// Primary-key change impact
    PkImpact(PkImpactArgs),
    /// ERP → OD → FT tiered impact for a column
    ErpImpact(ErpImpactArgs),
    /// Prerequisites and dependents of one job
    JobDeps(JobDepsArgs),
    /// Dependency chains starting from a table
    Chain(ChainArgs),
    /// Index and graph statistics
    Stats,
}

#[derive(Debug, clap::Args)]
struct BuildIndexArgs {
    /// Re-parse every file, ignoring cached hashes.
    #[clap(long)]
    force: bool,
}

#[derive(Debug, clap::Args)]
struct TableImpactArgs {
    table: String,
    #[clap(long)]
    schema: Option<String>,
    #[clap(long, default_value_t = 3)]
    max_level: u32,
    #[clap(long, default_value = "modify")]
    change_type: ChangeKind,
}

#[derive(Debug, clap::Args)]
struct ColumnImpactArgs {
    column: String,
    #[clap(long, default_value = "modify")]
    change_type: ChangeKind,
    /// New column name, for renames.
    #[clap(long)]
    new_name: Option<String>,
    /// Also run the multi-level cascade over the affected tables.
    #[clap(long, default_value_t = 2)]
    max_level: u32,
}

#[derive(Debug, clap::Args)]
struct PkImpactArgs {
    table: String,
    #[clap(long, default_value = "dbo")]
    schema: String,
    #[clap(long, value_enum, default_value_t = DbTypeArg::Mssql)]
    db_type: DbTypeArg,
    /// Current PK columns; derived from the schema provider when omitted.
    #[clap(long, value_delimiter = ',')]
    old_pk: Option<Vec<String>>,
    /// Proposed PK columns.
    #[clap(long, value_delimiter = ',')]
    new_pk: Option<Vec<String>>,
    #[clap(long, default_value_t = 3)]
    max_level: u32,
}

#[derive(Debug, clap::ValueEnum, Clone, Copy)]
enum DbTypeArg {
    Vertica,
    Mssql,
    Unknown,
}

impl From<DbTypeArg> for models::DbType {
    fn from(value: DbTypeArg) -> Self {
        match value {
            DbTypeArg::Vertica => models::DbType::Vertica,
            DbTypeArg::Mssql => models::DbType::Mssql,
            DbTypeArg::Unknown => models::DbType::Unknown,
        }
    }
}

#[derive(Debug, clap::Args)]
struct ErpImpactArgs {
    column: String,
    /// CSV of ERP tables, one `table[,column]` per row.
    #[clap(long)]
    erp_list: PathBuf,
}

#[derive(Debug, clap::Args)]
struct JobDepsArgs {
    job: String,
}

#[derive(Debug, clap::Args)]
struct ChainArgs {
    start_table: String,
    #[clap(long)]
    end_table: Option<String>,
    #[clap(long, default_value_t = 10)]
    max_depth: usize,
}

fn main() -> ExitCode {
    let cli = Dsxctl::parse();
    init_logging(&cli.log_args);

    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            tracing::error!(error = ?err, "command failed");
            eprintln!("error: {err:#}");
            exit_code_for(&err)
        }
    }
}

fn run(cli: Dsxctl) -> anyhow::Result<ExitCode> {
    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(export_dir) = &cli.export_dir {
        config.export_directory = export_dir.clone();
    }
    if let Some(cache_dir) = &cli.cache_dir {
        config.cache_directory = cache_dir.clone();
    }
    let ctx = CoreContext::new(config);
    let export_dir = ctx.config.export_directory.clone();
    let mut job_index = JobIndex::open(&ctx.config.cache_directory)?;

    match cli.subcommand {
        Subcommand::BuildIndex(args) => {
            let stats = job_index.build_index(&export_dir, args.force)?;
            print_report(&cli.output, &stats)?;
            if stats.cached_jobs == 0 && stats.errors > 0 {
                return Ok(ExitCode::from(2));
            }
        }
        Subcommand::TableImpact(args) => {
            let dependency_graph = ensure_graph(&mut job_index, &export_dir)?;
            let report = analyze_cascading_impact(
                &ctx,
                &job_index,
                &dependency_graph,
                &CascadingRequest {
                    table_name: Some(args.table),
                    schema: args.schema,
                    change_type: args.change_type,
                    max_level: args.max_level,
                    ..CascadingRequest::default()
                },
                &export_dir,
            )?;
            print_report(&cli.output, &report)?;
        }
        Subcommand::ColumnImpact(args) => {
            let change_report = analyze_column_change(
                &ctx,
                &args.column,
                args.change_type,
                args.new_name.as_deref(),
                &export_dir,
            )?;
            let dependency_graph = ensure_graph(&mut job_index, &export_dir)?;
            let cascade = analyze_cascading_impact(
                &ctx,
                &job_index,
                &dependency_graph,
                &CascadingRequest {
                    column_name: Some(args.column.clone()),
                    change_type: args.change_type,
                    new_name: args.new_name.clone(),
                    max_level: args.max_level,
                    ..CascadingRequest::default()
                },
                &export_dir,
            )?;

            #[derive(Serialize)]
            struct ColumnImpactOutput {
                #[serde(flatten)]
                change: analysis::ColumnChangeReport,
                cascading_impact: std::collections::BTreeMap<String, analysis::LevelImpactReport>,
            }
            print_report(
                &cli.output,
                &ColumnImpactOutput {
                    change: change_report,
                    cascading_impact: cascade.cascading_impact,
                },
            )?;
        }
        Subcommand::PkImpact(args) => {
            let dependency_graph = ensure_graph(&mut job_index, &export_dir)?;
            // Live schema providers are wired by embedding applications; the
            // CLI runs without one and reports partial results.
            let report = analyze_pk_impact(
                None,
                &job_index,
                &dependency_graph,
                &PkImpactRequest {
                    table_name: args.table,
                    schema: args.schema,
                    db_type: args.db_type.into(),
                    old_pk: args.old_pk,
                    new_pk: args.new_pk,
                    max_level: args.max_level,
                },
            )?;
            print_report(&cli.output, &report)?;
        }
        Subcommand::ErpImpact(args) => {
            ensure_index(&mut job_index, &export_dir)?;
            let mut analyzer = ErpTierAnalyzer::new(&ctx);
            analyzer.load_erp_tables(&args.erp_list)?;
            let report = analyzer.analyze_column(&ctx, &job_index, &args.column, &export_dir)?;
            print_report(&cli.output, &report)?;
        }
        Subcommand::JobDeps(args) => {
            let dependency_graph = ensure_graph(&mut job_index, &export_dir)?;
            let report = dependency_graph.job_dependencies(&args.job);
            print_report(&cli.output, &report)?;
        }
        Subcommand::Chain(args) => {
            let dependency_graph = ensure_graph(&mut job_index, &export_dir)?;
            let chains =
                dependency_graph.dependency_chain(&args.start_table, args.end_table.as_deref(), args.max_depth);

            #[derive(Serialize)]
            struct ChainReport {
                start_table: String,
                #[serde(skip_serializing_if = "Option::is_none")]
                end_table: Option<String>,
                max_depth: usize,
                chain_count: usize,
                chains: Vec<Vec<String>>,
            }
            print_report(
                &cli.output,
                &ChainReport {
                    start_table: args.start_table,
                    end_table: args.end_table,
                    max_depth: args.max_depth,
                    chain_count: chains.len(),
                    chains,
                },
            )?;
        }
        Subcommand::Stats => {
            let dependency_graph = ensure_graph(&mut job_index, &export_dir)?;
            let index_stats = job_index.stats();
            let graph_stats = dependency_graph.statistics();

            if cli.output.output == Some(OutputType::Table) {
                print_table(
                    &["table", "jobs"],
                    &["/name", "/count"],
                    graph_stats.most_used_tables.clone(),
                )?;
                print_table(
                    &["job", "tables"],
                    &["/name", "/count"],
                    graph_stats.most_complex_jobs.clone(),
                )?;
                return Ok(ExitCode::SUCCESS);
            }

            #[derive(Serialize)]
            struct StatsReport {
                index: index::IndexStats,
                graph: graph::GraphStatistics,
            }
            print_report(
                &cli.output,
                &StatsReport {
                    index: index_stats,
                    graph: graph_stats,
                },
            )?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Populates the index from the export directory when empty, then builds the
/// dependency graph from it.
fn ensure_graph(job_index: &mut JobIndex, export_dir: &Path) -> anyhow::Result<DependencyGraph> {
    ensure_index(job_index, export_dir)?;
    Ok(DependencyGraph::from_jobs(job_index.all_jobs()))
}

fn ensure_index(job_index: &mut JobIndex, export_dir: &Path) -> anyhow::Result<()> {
    if job_index.is_empty() {
        job_index
            .build_index(export_dir, false)
            .context("building the job index")?;
    }
    Ok(())
}

fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(analysis_err) = err.downcast_ref::<AnalysisError>() {
        return match analysis_err {
            AnalysisError::InputMissing(_)
            | AnalysisError::EmptyErpList(_)
            | AnalysisError::NothingToAnalyze
            | AnalysisError::Config { .. } => ExitCode::from(1),
            _ => ExitCode::from(2),
        };
    }
    if let Some(index_err) = err.downcast_ref::<index::IndexError>() {
        return match index_err {
            index::IndexError::ExportDirMissing(_) => ExitCode::from(1),
            _ => ExitCode::from(2),
        };
    }
    ExitCode::from(2)
}
