use crate::data::preprocessing::{
    labeled_rows, oversample_minority, stratified_split, FeatureMatrix, PreprocessingContract,
};
use crate::data::CombinedDataset;
use crate::model::architecture::{init_model, EngraftmentModel};
use crate::model::checkpoint::{Metrics, ModelMetadata, ModelSaver, TrainingConfigMetadata};
use crate::training::{TrainingConfig, TrainingResult, TrainingState};
use anyhow::{anyhow, bail, Context, Result};
use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use burn::tensor::{ElementConversion, TensorData};
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info};

/// Trainer for the engraftment classifier
pub struct Trainer<B: AutodiffBackend> {
    /// Training configuration
    config: TrainingConfig,
    /// Device
    device: B::Device,
}

impl<B: AutodiffBackend> Trainer<B> {
    /// Create new trainer
    pub fn new(config: TrainingConfig, device: B::Device) -> Self {
        Self { config, device }
    }

    /// Split, fit the preprocessing contract on the training rows, balance,
    /// train and evaluate on the held-out rows
    pub fn train(&self, dataset: &CombinedDataset) -> Result<TrainingResult<B::InnerBackend>> {
        info!("Starting training with configuration: {:?}", self.config);
        let start_time = Instant::now();

        let labeled = labeled_rows(dataset, &self.config.contract.target);
        let (neg, pos) = labeled.class_counts();
        if neg == 0 || pos == 0 {
            bail!(
                "Training needs both outcome classes, found positive={}, negative={}",
                pos,
                neg
            );
        }

        let mut split = stratified_split(labeled, &self.config.split());
        if split.train.is_empty() || split.test.is_empty() {
            bail!("Not enough labeled rows to hold out a test split");
        }

        let contract =
            PreprocessingContract::fit_records(dataset.columns(), &split.train.records, &self.config.contract)
                .context("Failed to fit preprocessing contract")?;
        info!(
            "Contract for '{}': {} numeric and {} categorical inputs ({} features), {} fields dropped",
            contract.target(),
            contract.numeric_columns().len(),
            contract.categorical_columns().len(),
            contract.n_features(),
            contract.dropped().len()
        );

        if self.config.oversample {
            oversample_minority(&mut split.train, self.config.seed);
        }

        let train_x = contract.apply(&split.train.records);
        let test_x = contract.apply(&split.test.records);
        let model_config = self.config.model_config(contract.n_features());

        let mut model = init_model::<B>(&model_config, &self.device);
        let mut optimizer = AdamConfig::new().init::<B, EngraftmentModel<B>>();
        let mut state = TrainingState::new();
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        let batch_size = self.config.batch_size.max(1);

        let progress = self.progress_bar()?;
        let mut order: Vec<usize> = (0..train_x.n_rows()).collect();

        for epoch in 0..self.config.epochs {
            order.shuffle(&mut rng);
            let mut epoch_loss = 0.0;
            let mut batches = 0usize;

            for chunk in order.chunks(batch_size) {
                let input = self.batch_features(&train_x, chunk);
                let targets = self.batch_targets(&split.train.labels, chunk);

                let loss = model.forward_loss(input, targets);
                epoch_loss += loss.clone().into_scalar().elem::<f64>();
                batches += 1;

                let grads = GradientsParams::from_grads(loss.backward(), &model);
                model = optimizer.step(self.config.learning_rate, model, grads);
                state.global_step += 1;
            }

            let mean_loss = epoch_loss / batches.max(1) as f64;
            state.update_epoch(mean_loss);
            progress.set_message(format!("loss {:.4}", mean_loss));
            progress.inc(1);
            debug!("Epoch {}/{}: loss={:.4}", epoch + 1, self.config.epochs, mean_loss);
        }
        progress.finish_and_clear();

        let model = model.valid();
        let probabilities = predict_matrix(&model, &test_x, &self.device)?;
        let test_metrics = Metrics::compute(&probabilities, &split.test.labels, self.config.threshold);

        let duration = start_time.elapsed().as_secs_f64();
        info!(
            "Training finished in {:.2}s: test accuracy={:.4}, f1={:.4}, auroc={:.4}",
            duration, test_metrics.accuracy, test_metrics.f1, test_metrics.auroc
        );

        Ok(TrainingResult {
            model,
            contract,
            model_config,
            state,
            test_metrics,
            train_rows: split.train.len(),
            test_rows: split.test.len(),
            duration_secs: duration,
        })
    }

    fn progress_bar(&self) -> Result<ProgressBar> {
        if !self.config.show_progress {
            return Ok(ProgressBar::hidden());
        }
        let bar = ProgressBar::new(self.config.epochs as u64);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} epochs {msg}")
                .context("Invalid progress template")?,
        );
        Ok(bar)
    }

    fn batch_features(&self, matrix: &FeatureMatrix, rows: &[usize]) -> Tensor<B, 2> {
        let values: Vec<f32> = rows
            .iter()
            .flat_map(|&i| matrix.rows[i].iter().copied())
            .collect();
        Tensor::from_data(
            TensorData::new(values, [rows.len(), matrix.n_features()]),
            &self.device,
        )
    }

    fn batch_targets(&self, labels: &[u8], rows: &[usize]) -> Tensor<B, 1, Int> {
        let values: Vec<i64> = rows.iter().map(|&i| i64::from(labels[i])).collect();
        Tensor::from_data(TensorData::new(values, [rows.len()]), &self.device)
    }

    /// Metadata describing a finished run
    pub fn metadata(&self, result: &TrainingResult<B::InnerBackend>) -> ModelMetadata {
        ModelMetadata {
            version: crate::VERSION.to_string(),
            epochs_run: result.state.epoch,
            test_metrics: result.test_metrics.clone(),
            model_config: result.model_config.clone(),
            training_config: TrainingConfigMetadata {
                learning_rate: self.config.learning_rate,
                batch_size: self.config.batch_size,
                epochs: self.config.epochs,
                optimizer: "Adam".to_string(),
                seed: self.config.seed,
                train_rows: result.train_rows,
                test_rows: result.test_rows,
            },
            feature_names: result.contract.feature_names().to_vec(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Success probabilities for every row of a feature matrix
pub fn predict_matrix<B: Backend>(
    model: &EngraftmentModel<B>,
    matrix: &FeatureMatrix,
    device: &B::Device,
) -> Result<Vec<f32>> {
    if matrix.n_rows() == 0 {
        return Ok(Vec::new());
    }
    let input = Tensor::<B, 2>::from_data(
        TensorData::new(matrix.to_flat(), [matrix.n_rows(), matrix.n_features()]),
        device,
    );
    model
        .predict_proba(input)
        .into_data()
        .convert::<f32>()
        .to_vec::<f32>()
        .map_err(|e| anyhow!("Failed to read probabilities: {:?}", e))
}

/// Train on a dataset and write the artifacts directory
pub fn train_and_save<B: AutodiffBackend, P: AsRef<Path>>(
    dataset: &CombinedDataset,
    config: TrainingConfig,
    output_dir: P,
    device: B::Device,
) -> Result<(TrainingResult<B::InnerBackend>, PathBuf)> {
    let trainer = Trainer::<B>::new(config, device);
    let result = trainer.train(dataset)?;
    let metadata = trainer.metadata(&result);
    let path = ModelSaver::save(output_dir, &result.model, &metadata, &result.contract)?;
    Ok((result, path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::combine::combine;
    use crate::data::{CanonicalRecord, CanonicalTable, Value};
    use crate::vocabulary::{fields, Vocabulary};
    use burn::backend::{Autodiff, NdArray};
    use tempfile::TempDir;

    type TestBackend = Autodiff<NdArray<f32>>;

    fn create_test_dataset() -> CombinedDataset {
        let mut table = CanonicalTable::new("test", Vocabulary::standard().field_names());
        for i in 0..60 {
            let success = i % 3 != 0;
            let hla = if success { 8 + (i % 3) } else { 4 + (i % 3) };
            let record = CanonicalRecord::new()
                .with(fields::HLA_MATCH_SCORE, Value::Integer(hla))
                .with(fields::PATIENT_AGE, Value::Float((i % 17) as f64))
                .with(
                    fields::DONOR_SEX,
                    Value::Text(if i % 2 == 0 { "M" } else { "F" }.into()),
                )
                .with(fields::ENGRAFTMENT_DAYS, Value::Float(15.0 + i as f64))
                .with(fields::ENGRAFTMENT_SUCCESS, Value::Integer(success as i64));
            table.records.push(record);
        }
        table.records.push(CanonicalRecord::new().with(fields::PATIENT_AGE, Value::Float(3.0)));
        combine(vec![table]).unwrap()
    }

    #[test]
    fn test_trainer_produces_probabilities() {
        let device = Default::default();
        let trainer = Trainer::<TestBackend>::new(TrainingConfig::quick_test(), device);
        let result = trainer.train(&create_test_dataset()).unwrap();

        assert_eq!(result.state.epoch, 5);
        assert_eq!(result.test_rows, 12);
        assert!(!result
            .contract
            .feature_names()
            .contains(&fields::ENGRAFTMENT_DAYS.to_string()));
        assert!((0.0..=1.0).contains(&result.test_metrics.accuracy));
    }

    #[test]
    fn test_single_class_is_rejected() {
        let mut table = CanonicalTable::new("test", Vocabulary::standard().field_names());
        for i in 0..10 {
            table.records.push(
                CanonicalRecord::new()
                    .with(fields::PATIENT_AGE, Value::Float(i as f64))
                    .with(fields::ENGRAFTMENT_SUCCESS, Value::Integer(1)),
            );
        }
        let dataset = combine(vec![table]).unwrap();
        let trainer = Trainer::<TestBackend>::new(TrainingConfig::quick_test(), Default::default());
        assert!(trainer.train(&dataset).is_err());
    }

    #[test]
    fn test_saved_artifacts_reload() {
        let temp_dir = TempDir::new().unwrap();
        let dataset = create_test_dataset();
        let (result, path) = train_and_save::<TestBackend, _>(
            &dataset,
            TrainingConfig::quick_test(),
            temp_dir.path(),
            Default::default(),
        )
        .unwrap();
        assert!(path.exists());

        let device = Default::default();
        let loaded = ModelSaver::load::<NdArray<f32>, _>(temp_dir.path(), &device).unwrap();
        assert_eq!(loaded.contract, result.contract);
        assert_eq!(loaded.metadata.epochs_run, 5);

        let matrix = loaded.contract.apply(dataset.records());
        let probs = predict_matrix(&loaded.model, &matrix, &device).unwrap();
        assert_eq!(probs.len(), dataset.len());
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
