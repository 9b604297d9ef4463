//! # engraft: transplant-outcome reconciliation and engraftment prediction
//!
//! engraft maps heterogeneous clinical transplant datasets onto one canonical
//! schema, trains a binary classifier for engraftment success, and serves
//! predictions over HTTP.
//!
//! ## Features
//!
//! - Shared vocabulary registry and total field normalizers
//! - One configuration-driven adapter per data source
//! - Schema validation returning issues as data
//! - Column-aligned, deduplicated combination of sources
//! - Fit-once/apply-many preprocessing contract shared by training and serving
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use engraft::config::PipelineConfig;
//! use engraft::training::{trainer::train_and_save, TrainingConfig};
//! use engraft::TrainingBackend;
//!
//! // Reconcile the configured sources
//! let run = engraft::pipeline::run(&PipelineConfig::default()).unwrap();
//!
//! // Train and write the artifacts directory
//! let (result, _path) = train_and_save::<TrainingBackend, _>(
//!     &run.dataset,
//!     TrainingConfig::default(),
//!     "models",
//!     Default::default(),
//! )
//! .unwrap();
//! println!("test AUROC {:.3}", result.test_metrics.auroc);
//! ```

pub mod cli;
pub mod config;
pub mod data;
pub mod error;
pub mod model;
pub mod normalize;
pub mod pipeline;
pub mod predict;
pub mod serve;
pub mod sources;
pub mod training;
pub mod utils;
pub mod validate;
pub mod vocabulary;

use burn::backend::Autodiff;
use burn_ndarray::NdArray;

/// Default backend type
pub type DefaultBackend = NdArray<f32>;

/// Backend used for training
pub type TrainingBackend = Autodiff<DefaultBackend>;

/// Re-export commonly used types
pub use data::combine::combine;
pub use data::loader::DataLoader;
pub use data::preprocessing::PreprocessingContract;
pub use data::{CanonicalRecord, CanonicalTable, CombinedDataset, RawTable, RawValue, Value};
pub use error::{ReconcileError, Result};
pub use model::{architecture::EngraftmentModel, ModelConfig};
pub use predict::{PredictionRequest, PredictionResponse, RiskTier};
pub use sources::{SourceAdapter, SourceKind};
pub use training::{TrainingConfig, TrainingResult};
pub use validate::{validate, Issue};
pub use vocabulary::Vocabulary;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get library information
pub fn info() -> String {
    format!(
        "{} v{} - transplant dataset reconciliation and engraftment prediction",
        NAME, VERSION
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_info() {
        let info_str = info();
        assert!(info_str.contains("engraft"));
        assert!(info_str.contains(VERSION));
    }
}
