//! TOML configuration for the pipeline, training and serving.
//!
//! Every section has serde defaults, so an empty file (or no file at all)
//! reproduces the four historical sources and the standard serving setup.

use crate::sources::SourceKind;
use crate::training::TrainingConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Top-level configuration file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub training: TrainingConfig,
    pub serve: ServeConfig,
}

impl AppConfig {
    /// Load from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = toml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Load from `path` when given, otherwise use defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

/// One raw source to reconcile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Label used in logs and reports
    pub name: String,
    /// Adapter that knows this source's layout
    pub kind: SourceKind,
    /// Raw table: delimited text or a spreadsheet workbook
    pub path: PathBuf,
    /// Workbook sheet (defaults to the kind's known sheet, then the first one)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet: Option<String>,
}

impl SourceConfig {
    pub fn new(name: impl Into<String>, kind: SourceKind, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            path: path.into(),
            sheet: None,
        }
    }

    /// Sheet to read when the source is a workbook
    pub fn sheet(&self) -> Option<String> {
        self.sheet
            .clone()
            .or_else(|| self.kind.default_sheet().map(str::to_string))
    }
}

/// Reconciliation pipeline settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Combined canonical dataset CSV
    pub output: PathBuf,
    /// Optional JSON run report
    pub report: Option<PathBuf>,
    /// Sources, in concatenation order
    pub sources: Vec<SourceConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output: PathBuf::from("processed/transplant_data.csv"),
            report: None,
            sources: vec![
                SourceConfig::new("UAE", SourceKind::Uae, "raw_datasets/uae.xlsx"),
                SourceConfig::new("Bone Marrow", SourceKind::BoneMarrow, "raw_datasets/bone_marrow.csv"),
                SourceConfig::new("P5191", SourceKind::P5191, "raw_datasets/p5191.csv"),
                SourceConfig::new("P5303", SourceKind::P5303, "raw_datasets/p5303.csv"),
            ],
        }
    }
}

/// HTTP serving settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub host: String,
    pub port: u16,
    /// Model artifacts directory written by training
    pub artifacts: PathBuf,
}

impl Default for ServeConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8002,
            artifacts: PathBuf::from("models"),
        }
    }
}

impl ServeConfig {
    /// `host:port` listen address
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_cover_all_sources() {
        let config = AppConfig::default();
        let kinds: Vec<SourceKind> = config.pipeline.sources.iter().map(|s| s.kind).collect();
        assert_eq!(kinds, SourceKind::ALL.to_vec());
        assert_eq!(config.serve.address(), "127.0.0.1:8002");
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.pipeline.sources[0].path, PathBuf::from("raw_datasets/uae.xlsx"));
        assert_eq!(config.pipeline.sources[0].sheet().as_deref(), Some("Origional Data"));
        assert_eq!(config.pipeline.sources[1].sheet(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("engraft.toml");
        std::fs::write(
            &path,
            r#"
[pipeline]
output = "out/combined.csv"
report = "out/report.json"

[[pipeline.sources]]
name = "UAE export"
kind = "uae"
path = "data/uae.xlsx"
sheet = "2019 export"

[training]
epochs = 10

[serve]
port = 9000
"#,
        )
        .unwrap();

        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.pipeline.sources.len(), 1);
        assert_eq!(config.pipeline.sources[0].kind, SourceKind::Uae);
        assert_eq!(config.pipeline.sources[0].sheet().as_deref(), Some("2019 export"));
        assert_eq!(config.pipeline.report, Some(PathBuf::from("out/report.json")));
        assert_eq!(config.training.epochs, 10);
        assert_eq!(config.training.batch_size, 64);
        assert_eq!(config.serve.port, 9000);
        assert_eq!(config.serve.host, "127.0.0.1");
    }

    #[test]
    fn test_missing_file_is_an_error() {
        assert!(AppConfig::load("/nonexistent/engraft.toml").is_err());
        assert!(AppConfig::load_or_default(None).is_ok());
    }
}
