use anyhow::{anyhow, Context, Result};
use burn::prelude::*;
use burn::record::{CompactRecorder, Recorder};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::data::preprocessing::PreprocessingContract;
use crate::model::architecture::{init_model, EngraftmentModel};
use crate::model::ModelConfig;

/// Model weights file inside an artifacts directory
pub const MODEL_FILE: &str = "model.mpk";
/// Model metadata file inside an artifacts directory
pub const METADATA_FILE: &str = "model.json";
/// Preprocessing contract file inside an artifacts directory
pub const CONTRACT_FILE: &str = "preprocessing.json";

/// Model metadata saved next to the weights
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    /// Crate version that produced the artifacts
    pub version: String,
    /// Epochs actually run
    pub epochs_run: usize,
    /// Held-out test metrics
    pub test_metrics: Metrics,
    /// Model configuration
    pub model_config: ModelConfig,
    /// Training configuration
    pub training_config: TrainingConfigMetadata,
    /// Ordered input feature names
    pub feature_names: Vec<String>,
    /// Timestamp (RFC 3339)
    pub timestamp: String,
}

/// Training configuration metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfigMetadata {
    /// Learning rate
    pub learning_rate: f64,
    /// Batch size
    pub batch_size: usize,
    /// Number of epochs
    pub epochs: usize,
    /// Optimizer type
    pub optimizer: String,
    /// Random seed
    pub seed: u64,
    /// Rows used for training (after oversampling)
    pub train_rows: usize,
    /// Rows held out for testing
    pub test_rows: usize,
}

/// Binary classification metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Metrics {
    /// Mean binary cross-entropy
    pub loss: f64,
    /// Accuracy
    pub accuracy: f64,
    /// Precision
    pub precision: f64,
    /// Recall
    pub recall: f64,
    /// F1 score
    pub f1: f64,
    /// Area under the ROC curve
    pub auroc: f64,
}

impl Metrics {
    /// Compute metrics from probabilities and 0/1 labels
    pub fn compute(probabilities: &[f32], labels: &[u8], threshold: f32) -> Self {
        let n = probabilities.len().min(labels.len());
        if n == 0 {
            return Self::default();
        }

        let (mut tp, mut fp, mut tn, mut fn_) = (0usize, 0usize, 0usize, 0usize);
        let mut loss = 0.0f64;
        for (&p, &y) in probabilities.iter().zip(labels) {
            let predicted = p >= threshold;
            match (predicted, y == 1) {
                (true, true) => tp += 1,
                (true, false) => fp += 1,
                (false, false) => tn += 1,
                (false, true) => fn_ += 1,
            }
            let p = (p as f64).clamp(1e-7, 1.0 - 1e-7);
            loss -= if y == 1 { p.ln() } else { (1.0 - p).ln() };
        }

        let ratio = |num: usize, den: usize| if den > 0 { num as f64 / den as f64 } else { 0.0 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };

        Self {
            loss: loss / n as f64,
            accuracy: ratio(tp + tn, n),
            precision,
            recall,
            f1,
            auroc: auroc(probabilities, labels),
        }
    }
}

/// Rank-based AUROC (ties get the average rank); 0.5 when a class is missing
fn auroc(probabilities: &[f32], labels: &[u8]) -> f64 {
    let mut scored: Vec<(f32, u8)> = probabilities.iter().copied().zip(labels.iter().copied()).collect();
    scored.sort_by(|a, b| a.0.total_cmp(&b.0));

    let positives = scored.iter().filter(|(_, y)| *y == 1).count();
    let negatives = scored.len() - positives;
    if positives == 0 || negatives == 0 {
        return 0.5;
    }

    let mut rank_sum = 0.0f64;
    let mut i = 0;
    while i < scored.len() {
        let mut j = i;
        while j + 1 < scored.len() && scored[j + 1].0 == scored[i].0 {
            j += 1;
        }
        let average_rank = (i + j) as f64 / 2.0 + 1.0;
        let tied_positives = scored[i..=j].iter().filter(|(_, y)| *y == 1).count();
        rank_sum += average_rank * tied_positives as f64;
        i = j + 1;
    }

    let positives = positives as f64;
    (rank_sum - positives * (positives + 1.0) / 2.0) / (positives * negatives as f64)
}

/// Everything needed to serve predictions
pub struct LoadedArtifacts<B: Backend> {
    pub model: EngraftmentModel<B>,
    pub metadata: ModelMetadata,
    pub contract: PreprocessingContract,
}

/// Saves and loads the model artifacts directory
pub struct ModelSaver;

impl ModelSaver {
    /// Save weights, metadata and the preprocessing contract into `dir`
    pub fn save<B: Backend, P: AsRef<Path>>(
        dir: P,
        model: &EngraftmentModel<B>,
        metadata: &ModelMetadata,
        contract: &PreprocessingContract,
    ) -> Result<PathBuf> {
        let dir = dir.as_ref();
        crate::utils::ensure_dir(dir)?;

        let model_path = dir.join(MODEL_FILE);
        let record = model.clone().into_record();
        CompactRecorder::new()
            .record(record, model_path.clone())
            .map_err(|e| anyhow!("Failed to save model: {:?}", e))?;

        let metadata_json =
            serde_json::to_string_pretty(metadata).context("Failed to serialize metadata")?;
        fs::write(dir.join(METADATA_FILE), metadata_json)
            .context("Failed to write metadata file")?;

        contract
            .save(dir.join(CONTRACT_FILE))
            .context("Failed to write preprocessing contract")?;

        info!("Saved model artifacts to {:?}", dir);
        Ok(model_path)
    }

    /// Load weights, metadata and the preprocessing contract from `dir`
    pub fn load<B: Backend, P: AsRef<Path>>(dir: P, device: &B::Device) -> Result<LoadedArtifacts<B>> {
        let dir = dir.as_ref();
        info!("Loading model artifacts from {:?}", dir);

        let metadata_json = fs::read_to_string(dir.join(METADATA_FILE))
            .with_context(|| format!("Failed to read {:?}", dir.join(METADATA_FILE)))?;
        let metadata: ModelMetadata =
            serde_json::from_str(&metadata_json).context("Failed to parse metadata")?;

        let contract = PreprocessingContract::load(dir.join(CONTRACT_FILE))
            .context("Failed to load preprocessing contract")?;

        if contract.feature_names() != metadata.feature_names.as_slice() {
            anyhow::bail!("Preprocessing contract does not match the model's feature list");
        }

        let record = CompactRecorder::new()
            .load(dir.join(MODEL_FILE), device)
            .map_err(|e| anyhow!("Failed to load model: {:?}", e))?;
        let model = init_model::<B>(&metadata.model_config, device).load_record(record);

        info!(
            "Loaded model with {} features (trained {} epochs)",
            metadata.feature_names.len(),
            metadata.epochs_run
        );
        Ok(LoadedArtifacts {
            model,
            metadata,
            contract,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_compute() {
        let probs = [0.9, 0.8, 0.3, 0.2];
        let labels = [1, 0, 1, 0];
        let metrics = Metrics::compute(&probs, &labels, 0.5);

        assert_eq!(metrics.accuracy, 0.5);
        assert_eq!(metrics.precision, 0.5);
        assert_eq!(metrics.recall, 0.5);
        assert_eq!(metrics.f1, 0.5);
        assert_eq!(metrics.auroc, 0.75);
    }

    #[test]
    fn test_auroc_edges() {
        assert_eq!(auroc(&[0.1, 0.9], &[0, 1]), 1.0);
        assert_eq!(auroc(&[0.9, 0.1], &[0, 1]), 0.0);
        assert_eq!(auroc(&[0.5, 0.5], &[0, 1]), 0.5);
        assert_eq!(auroc(&[0.2, 0.3], &[1, 1]), 0.5);
    }

    #[test]
    fn test_empty_metrics() {
        assert_eq!(Metrics::compute(&[], &[], 0.5), Metrics::default());
    }
}
