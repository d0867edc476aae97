//! Configuration snapshot threaded through the analyzers.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::AnalysisError;

/// File-size limits for content scans over very large exports: files above
/// `sample_threshold_bytes` are first probed via a head+tail sample of
/// `sample_window_bytes` each, and skipped entirely above
/// `skip_threshold_bytes` when the sample shows no hit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ScanLimits {
    pub sample_threshold_bytes: u64,
    pub sample_window_bytes: u64,
    pub skip_threshold_bytes: u64,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            sample_threshold_bytes: 100 * 1024 * 1024,
            sample_window_bytes: 10 * 1024 * 1024,
            skip_threshold_bytes: 500 * 1024 * 1024,
        }
    }
}

/// Schema sets and name prefixes that place a table in the OD or FT tier.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ErpImpactConfig {
    pub od_schemas: BTreeSet<String>,
    pub ft_schemas: BTreeSet<String>,
    pub od_prefixes: Vec<String>,
    pub ft_prefixes: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub export_directory: PathBuf,
    pub cache_directory: PathBuf,
    pub scan: ScanLimits,
    pub erp_impact: ErpImpactConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            export_directory: PathBuf::from("./export"),
            cache_directory: PathBuf::from("./cache"),
            scan: ScanLimits::default(),
            erp_impact: ErpImpactConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, AnalysisError> {
        let raw = std::fs::read_to_string(path).map_err(|source| AnalysisError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| AnalysisError::Config {
            path: path.display().to_string(),
            source,
        })
    }

    /// Loads `path` when it exists; a missing file means defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, AnalysisError> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "no config file; using defaults");
            Ok(Self::default())
        }
    }
}

/// Configuration snapshot passed through analyzer entry points; no global
/// state is consulted anywhere below the CLI.
#[derive(Debug, Clone, Default)]
pub struct CoreContext {
    pub config: Config,
}

impl CoreContext {
    pub fn new(config: Config) -> Self {
        Self { config }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_match_documented_thresholds() {
        let limits = ScanLimits::default();
        assert_eq!(limits.sample_threshold_bytes, 104_857_600);
        assert_eq!(limits.sample_window_bytes, 10_485_760);
        assert_eq!(limits.skip_threshold_bytes, 524_288_000);
    }

    #[test]
    fn partial_yaml_fills_in_defaults() {
        let config: Config = serde_yaml::from_str(
            "export_directory: /data/export\nerp_impact:\n  od_schemas: [BIDWODS]\n  ft_prefixes: [FT_]\n",
        )
        .unwrap();
        assert_eq!(config.export_directory, PathBuf::from("/data/export"));
        assert_eq!(config.cache_directory, PathBuf::from("./cache"));
        assert!(config.erp_impact.od_schemas.contains("BIDWODS"));
        assert_eq!(config.erp_impact.ft_prefixes, vec!["FT_".to_string()]);
        assert_eq!(config.scan, ScanLimits::default());
    }

    #[test]
    fn missing_config_file_is_defaults() {
        let config = Config::load_or_default(Path::new("/nope/dsxctl.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }
}
