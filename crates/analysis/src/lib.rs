mod cascading;
mod column_change;
mod comprehensive;
mod context;
mod erp;
mod pk;
mod search;
mod trace;

use std::path::PathBuf;

pub use cascading::{CascadingReport, CascadingRequest, DirectImpact, LevelImpactReport};
pub use column_change::{analyze_column_change, ChangeKind, ColumnChangeReport, JobChangeGuide};
pub use comprehensive::{
    comprehensive_impact, ComprehensiveOutcome, ComprehensiveReport, ComprehensiveRequest,
};
pub use context::{Config, CoreContext, ErpImpactConfig, ScanLimits};
pub use erp::{ErpImpactReport, ErpTierAnalyzer, TableTier, TierJob};
pub use pk::{
    analyze_pk_impact, FkReference, PkImpactReport, PkImpactRequest, ProviderError, SchemaColumn,
    SchemaProvider,
};
pub use search::{
    find_jobs_using_column_only, find_jobs_using_table, find_tables_using_column, ColumnJobHit,
    RelatedJob, TableColumnHit, TableJobHit,
};
pub use trace::{trace_column_impact, TraceHop, TraceReport};

pub use cascading::analyze_cascading_impact;

#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("input not found: {0}")]
    InputMissing(PathBuf),

    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration {path}: {source}")]
    Config {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("ERP table list {0} has no entries")]
    EmptyErpList(PathBuf),

    #[error("either a table or a column must be given")]
    NothingToAnalyze,

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Index(#[from] index::IndexError),
}
