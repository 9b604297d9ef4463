pub mod trainer;

use crate::data::preprocessing::{ContractConfig, PreprocessingContract};
use crate::data::SplitConfig;
use crate::model::architecture::EngraftmentModel;
use crate::model::checkpoint::Metrics;
use crate::model::ModelConfig;
use burn::prelude::*;
use serde::{Deserialize, Serialize};

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of training epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Units in the first hidden layer
    pub hidden_size_1: usize,
    /// Units in the second hidden layer
    pub hidden_size_2: usize,
    /// Dropout rate
    pub dropout: f64,
    /// Fraction of each class held out for testing
    pub test_ratio: f64,
    /// Random seed (split, oversampling, batch order)
    pub seed: u64,
    /// Resample the minority class of the training split
    pub oversample: bool,
    /// Probability threshold for the positive class in metrics
    pub threshold: f32,
    /// Target and leakage exclusions
    pub contract: ContractConfig,
    /// Draw a progress bar while training
    #[serde(skip, default = "default_progress")]
    pub show_progress: bool,
}

fn default_progress() -> bool {
    true
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 64,
            learning_rate: 0.001,
            hidden_size_1: 64,
            hidden_size_2: 32,
            dropout: 0.2,
            test_ratio: 0.2,
            seed: 42,
            oversample: true,
            threshold: 0.5,
            contract: ContractConfig::default(),
            show_progress: true,
        }
    }
}

impl TrainingConfig {
    /// Create configuration for quick testing
    pub fn quick_test() -> Self {
        Self {
            epochs: 5,
            batch_size: 16,
            learning_rate: 0.01,
            hidden_size_1: 16,
            hidden_size_2: 8,
            show_progress: false,
            ..Default::default()
        }
    }

    /// Split settings derived from this configuration
    pub fn split(&self) -> SplitConfig {
        SplitConfig {
            test_ratio: self.test_ratio,
            seed: self.seed,
        }
    }

    /// Model configuration for the given feature count
    pub fn model_config(&self, input_size: usize) -> ModelConfig {
        ModelConfig::new(input_size)
            .with_hidden_size_1(self.hidden_size_1)
            .with_hidden_size_2(self.hidden_size_2)
            .with_dropout(self.dropout)
    }
}

/// Training state
#[derive(Debug, Clone, Default)]
pub struct TrainingState {
    /// Completed epochs
    pub epoch: usize,
    /// Optimizer steps taken
    pub global_step: usize,
    /// Mean training loss per epoch
    pub train_loss_history: Vec<f64>,
}

impl TrainingState {
    /// Create new training state
    pub fn new() -> Self {
        Self::default()
    }

    /// Update after epoch
    pub fn update_epoch(&mut self, train_loss: f64) {
        self.epoch += 1;
        self.train_loss_history.push(train_loss);
    }

    /// Loss of the last completed epoch
    pub fn last_loss(&self) -> Option<f64> {
        self.train_loss_history.last().copied()
    }
}

/// Training result
#[derive(Debug)]
pub struct TrainingResult<B: Backend> {
    /// Trained model, in inference mode
    pub model: EngraftmentModel<B>,
    /// Contract fitted on the training split
    pub contract: PreprocessingContract,
    /// Model configuration used
    pub model_config: ModelConfig,
    /// Final training state
    pub state: TrainingState,
    /// Held-out test metrics
    pub test_metrics: Metrics,
    /// Rows used for training (after oversampling)
    pub train_rows: usize,
    /// Rows held out
    pub test_rows: usize,
    /// Training duration in seconds
    pub duration_secs: f64,
}
