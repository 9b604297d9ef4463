//! End-to-end reconciliation run: load and adapt every configured source,
//! combine, validate, persist.

use crate::config::{PipelineConfig, SourceConfig};
use crate::data::combine::combine;
use crate::data::loader::{write_canonical_csv, DataLoader, LoaderConfig};
use crate::data::{ColumnCoverage, CombinedDataset, SourceRows};
use crate::error::{ReconcileError, Result};
use crate::sources::{Adapted, SourceAdapter};
use crate::utils::format_number;
use crate::validate::{validate, Issue};
use anyhow::Context;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

/// What happened to one configured source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Adapted {
        rows: usize,
        coverage: Vec<ColumnCoverage>,
        dropped_columns: Vec<String>,
        unresolved: BTreeMap<String, BTreeMap<String, usize>>,
        issues: Vec<Issue>,
    },
    Skipped {
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceOutcome {
    pub name: String,
    pub path: String,
    #[serde(flatten)]
    pub status: SourceStatus,
}

impl SourceOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self.status, SourceStatus::Skipped { .. })
    }
}

/// Diagnostics of a whole run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Completion time (RFC 3339)
    pub timestamp: String,
    pub sources: Vec<SourceOutcome>,
    pub provenance: Vec<SourceRows>,
    pub combined_rows: usize,
    pub duplicates_removed: usize,
    /// Findings over the combined dataset
    pub issues: Vec<Issue>,
}

impl PipelineReport {
    /// Names of the sources that were skipped
    pub fn skipped(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.is_skipped())
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let path = path.as_ref();
        crate::utils::ensure_parent(path)?;
        let json = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write report {:?}", path))?;
        info!("Report saved to {:?}", path);
        Ok(())
    }

    /// Log a short summary of the run
    pub fn log_summary(&self) {
        for source in &self.sources {
            match &source.status {
                SourceStatus::Adapted {
                    rows,
                    dropped_columns,
                    unresolved,
                    issues,
                    ..
                } => info!(
                    "{}: {} rows, {} dropped columns, {} unresolved fields, {} issues",
                    source.name,
                    rows,
                    dropped_columns.len(),
                    unresolved.len(),
                    issues.len()
                ),
                SourceStatus::Skipped { reason } => warn!("{}: skipped ({})", source.name, reason),
            }
        }
        info!(
            "Combined dataset: {} rows ({} duplicates removed)",
            format_number(self.combined_rows),
            self.duplicates_removed
        );
        for issue in &self.issues {
            warn!("{}", issue);
        }
    }
}

/// Combined dataset plus the report describing how it was built
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub dataset: CombinedDataset,
    pub report: PipelineReport,
}

fn adapt_source(source: &SourceConfig) -> Result<(Adapted, Vec<Issue>)> {
    let loader = DataLoader::with_config(LoaderConfig {
        sheet: source.sheet(),
    });
    let raw = loader
        .load(&source.path)
        .map_err(|e| match e {
            ReconcileError::SourceUnavailable { reason, .. } => {
                ReconcileError::unavailable(&source.name, reason)
            }
            other => other,
        })?;
    let adapter = source.kind.table_adapter().with_name(&source.name);
    let adapted = adapter.adapt(&raw)?;
    let issues = validate(&adapted.table)?;
    Ok((adapted, issues))
}

/// Adapt every source (in parallel), skip the unusable ones, combine and
/// validate. Nothing is written.
pub fn reconcile(sources: &[SourceConfig]) -> Result<PipelineRun> {
    info!("Reconciling {} sources", sources.len());

    let results: Vec<Result<(Adapted, Vec<Issue>)>> = sources.par_iter().map(adapt_source).collect();

    let mut outcomes = Vec::with_capacity(sources.len());
    let mut tables = Vec::new();
    for (source, result) in sources.iter().zip(results) {
        let status = match result {
            Ok((adapted, issues)) => {
                let status = SourceStatus::Adapted {
                    rows: adapted.report.rows,
                    coverage: adapted.table.coverage(),
                    dropped_columns: adapted.report.dropped_columns,
                    unresolved: adapted.report.unresolved,
                    issues,
                };
                tables.push(adapted.table);
                status
            }
            Err(e) if e.is_skippable() => {
                warn!("Skipping source {}: {}", source.name, e);
                SourceStatus::Skipped {
                    reason: e.to_string(),
                }
            }
            Err(e) => return Err(e),
        };
        outcomes.push(SourceOutcome {
            name: source.name.clone(),
            path: source.path.display().to_string(),
            status,
        });
    }

    let dataset = combine(tables)?;
    let issues = validate(dataset.table())?;

    let report = PipelineReport {
        timestamp: chrono::Utc::now().to_rfc3339(),
        sources: outcomes,
        provenance: dataset.provenance().to_vec(),
        combined_rows: dataset.len(),
        duplicates_removed: dataset.duplicates_removed(),
        issues,
    };
    Ok(PipelineRun { dataset, report })
}

/// Reconcile and persist the combined dataset (and the report, if configured)
pub fn run(config: &PipelineConfig) -> anyhow::Result<PipelineRun> {
    let run = reconcile(&config.sources).context("Reconciliation failed")?;
    run.report.log_summary();

    write_canonical_csv(run.dataset.table(), &config.output)
        .with_context(|| format!("Failed to write {:?}", config.output))?;
    if let Some(report) = &config.report {
        run.report.save(report)?;
    }
    Ok(run)
}
