pub mod architecture;
pub mod checkpoint;

use burn::prelude::*;

/// Model configuration
#[derive(Config, Debug)]
pub struct ModelConfig {
    /// Number of input features (set from the fitted preprocessing contract)
    pub input_size: usize,

    /// Number of hidden units in first layer
    #[config(default = "64")]
    pub hidden_size_1: usize,

    /// Number of hidden units in second layer
    #[config(default = "32")]
    pub hidden_size_2: usize,

    /// Dropout rate
    #[config(default = "0.2")]
    pub dropout: f64,
}

impl ModelConfig {
    /// Default engraftment classifier for the given feature count
    pub fn engraftment_default(input_size: usize) -> Self {
        Self::new(input_size)
    }

    /// A smaller model for quick runs and tests
    pub fn small(input_size: usize) -> Self {
        Self::new(input_size)
            .with_hidden_size_1(16)
            .with_hidden_size_2(8)
            .with_dropout(0.1)
    }
}
