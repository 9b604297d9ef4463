use crate::model::ModelConfig;
use burn::nn::loss::BinaryCrossEntropyLossConfig;
use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{relu, sigmoid};

/// Feed-forward binary classifier for engraftment success
#[derive(Module, Debug)]
pub struct EngraftmentModel<B: Backend> {
    /// First fully connected layer
    fc1: Linear<B>,
    /// Second fully connected layer
    fc2: Linear<B>,
    /// Output layer
    output: Linear<B>,
    /// Dropout layer
    dropout: Dropout,
}

impl<B: Backend> EngraftmentModel<B> {
    /// Forward pass, returns logits `[batch, 1]`
    pub fn forward(&self, input: Tensor<B, 2>) -> Tensor<B, 2> {
        let x = self.fc1.forward(input);
        let x = relu(x);
        let x = self.dropout.forward(x);

        let x = self.fc2.forward(x);
        let x = relu(x);
        let x = self.dropout.forward(x);

        self.output.forward(x)
    }

    /// Binary cross-entropy over a batch
    pub fn forward_loss(&self, input: Tensor<B, 2>, targets: Tensor<B, 1, Int>) -> Tensor<B, 1> {
        let logits = self.forward(input).squeeze::<1>(1);

        BinaryCrossEntropyLossConfig::new()
            .with_logits(true)
            .init(&logits.device())
            .forward(logits, targets)
    }

    /// Probability of success per row, `[batch]`
    pub fn predict_proba(&self, input: Tensor<B, 2>) -> Tensor<B, 1> {
        sigmoid(self.forward(input)).squeeze::<1>(1)
    }
}

/// Initialize model from configuration
pub fn init_model<B: Backend>(config: &ModelConfig, device: &B::Device) -> EngraftmentModel<B> {
    let fc1 = LinearConfig::new(config.input_size, config.hidden_size_1)
        .with_bias(true)
        .init(device);

    let fc2 = LinearConfig::new(config.hidden_size_1, config.hidden_size_2)
        .with_bias(true)
        .init(device);

    let output = LinearConfig::new(config.hidden_size_2, 1)
        .with_bias(true)
        .init(device);

    let dropout = DropoutConfig::new(config.dropout).init();

    EngraftmentModel {
        fc1,
        fc2,
        output,
        dropout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_model_forward() {
        let device = <TestBackend as Backend>::Device::default();
        let config = ModelConfig::engraftment_default(12);
        let model = init_model::<TestBackend>(&config, &device);

        let input = Tensor::<TestBackend, 2>::zeros([3, 12], &device);
        let output = model.forward(input);

        assert_eq!(output.dims(), [3, 1]);
    }

    #[test]
    fn test_predict_proba_is_a_probability() {
        let device = <TestBackend as Backend>::Device::default();
        let model = init_model::<TestBackend>(&ModelConfig::small(4), &device);

        let input = Tensor::<TestBackend, 2>::ones([5, 4], &device);
        let probs = model
            .predict_proba(input)
            .into_data()
            .to_vec::<f32>()
            .unwrap();

        assert_eq!(probs.len(), 5);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
    }
}
