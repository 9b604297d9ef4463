use crate::data::loader::read_canonical_csv;
use crate::data::preprocessing::PreprocessingContract;
use crate::data::{CanonicalRecord, RawValue};
use crate::model::architecture::EngraftmentModel;
use crate::model::checkpoint::{LoadedArtifacts, ModelMetadata, ModelSaver};
use crate::normalize::{normalize_field, render_token};
use crate::predict::{
    clinical_baseline, BatchPrediction, PredictionRequest, PredictionResponse, RowPrediction,
};
use crate::training::trainer::predict_matrix;
use crate::validate::{validate_records, Issue, IssueKind};
use crate::vocabulary::Vocabulary;
use anyhow::Context;
use burn::prelude::*;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Failure of a single prediction
#[derive(Debug, Error)]
pub enum PredictError {
    /// The request itself is malformed; reported to the client
    #[error("{0}")]
    Request(String),
    /// Inference failed on a well-formed request
    #[error("inference failed: {0}")]
    Inference(String),
}

/// Loaded model plus its preprocessing contract.
///
/// The contract is read-only after loading. The burn module is kept behind a
/// mutex so the predictor can be shared across request handlers.
pub struct Predictor<B: Backend> {
    model: Mutex<EngraftmentModel<B>>,
    contract: PreprocessingContract,
    metadata: ModelMetadata,
    device: B::Device,
    threshold: f64,
}

impl<B: Backend> Predictor<B> {
    /// Load the artifacts directory written by training
    pub fn load<P: AsRef<Path>>(dir: P, device: B::Device) -> anyhow::Result<Self> {
        let artifacts = ModelSaver::load::<B, _>(dir.as_ref(), &device)
            .with_context(|| format!("Failed to load model artifacts from {:?}", dir.as_ref()))?;
        Ok(Self::from_artifacts(artifacts, device))
    }

    pub fn from_artifacts(artifacts: LoadedArtifacts<B>, device: B::Device) -> Self {
        Self {
            model: Mutex::new(artifacts.model),
            contract: artifacts.contract,
            metadata: artifacts.metadata,
            device,
            threshold: 0.5,
        }
    }

    /// Set the probability threshold used for binary predictions
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn contract(&self) -> &PreprocessingContract {
        &self.contract
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    /// Canonical record for a request: request values normalized and
    /// validated, remaining fields filled from the clinical baseline.
    /// Invalid categories and type mismatches reject the request; implausible
    /// ranges are logged and scored.
    pub fn request_record(&self, request: &PredictionRequest) -> Result<CanonicalRecord, PredictError> {
        let vocab = Vocabulary::standard();
        let mut record = CanonicalRecord::new();

        for (field, raw) in request.raw_fields() {
            if let RawValue::Number(v) = raw {
                if !v.is_finite() {
                    return Err(PredictError::Request(format!("{} must be a finite number", field)));
                }
            }
            let spec = vocab
                .field(field)
                .ok_or_else(|| PredictError::Inference(format!("unknown field '{}'", field)))?;
            let value = normalize_field(vocab, spec, &raw, None).ok_or_else(|| {
                PredictError::Request(format!(
                    "unrecognized value '{}' for {}",
                    render_token(&raw).unwrap_or_default(),
                    field
                ))
            })?;
            record.set(field, Some(value));
        }

        let columns: Vec<String> = record.iter().map(|(name, _)| name.to_string()).collect();
        let issues = validate_records(&columns, std::slice::from_ref(&record))
            .map_err(|e| PredictError::Inference(e.to_string()))?;
        let (rejected, unusual): (Vec<Issue>, Vec<Issue>) = issues
            .into_iter()
            .partition(|i| matches!(i.kind, IssueKind::InvalidCategory | IssueKind::TypeMismatch));
        if !rejected.is_empty() {
            let message = rejected.iter().map(|i| i.to_string()).collect::<Vec<_>>().join("; ");
            return Err(PredictError::Request(message));
        }
        for issue in &unusual {
            warn!("Scoring request with {}", issue);
        }

        for (field, value) in clinical_baseline() {
            if record.is_absent(field) {
                record.set(field, Some(value));
            }
        }
        Ok(record)
    }

    /// Success probabilities for canonical records
    pub fn predict_records(&self, records: &[CanonicalRecord]) -> Result<Vec<f64>, PredictError> {
        let matrix = self.contract.apply(records);
        let model = self
            .model
            .lock()
            .map_err(|_| PredictError::Inference("model lock poisoned".to_string()))?;
        let probabilities = predict_matrix(&model, &matrix, &self.device)
            .map_err(|e| PredictError::Inference(e.to_string()))?;
        Ok(probabilities.into_iter().map(f64::from).collect())
    }

    /// Answer one prediction request
    pub fn predict_request(&self, request: &PredictionRequest) -> Result<PredictionResponse, PredictError> {
        let record = self.request_record(request)?;
        let probability = self
            .predict_records(std::slice::from_ref(&record))?
            .into_iter()
            .next()
            .ok_or_else(|| PredictError::Inference("model returned no output".to_string()))?;
        debug!("Predicted success probability {:.4}", probability);
        Ok(PredictionResponse::from_probability(probability))
    }

    /// Predict every row of a canonical dataset CSV
    pub fn predict_file<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<BatchPrediction> {
        let dataset = read_canonical_csv(path.as_ref())
            .with_context(|| format!("Failed to read canonical dataset {:?}", path.as_ref()))?;
        info!("Predicting {} rows", dataset.len());

        let probabilities = self.predict_records(dataset.records())?;
        let predictions = probabilities
            .into_iter()
            .zip(dataset.records())
            .enumerate()
            .map(|(row, (probability, record))| {
                RowPrediction::new(row, probability, self.threshold, self.contract.label(record))
            })
            .collect();
        Ok(BatchPrediction::new(predictions))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::data::combine::combine;
    use crate::data::{CanonicalTable, CombinedDataset, Value};
    use crate::training::trainer::train_and_save;
    use crate::training::TrainingConfig;
    use crate::vocabulary::fields;
    use burn::backend::{Autodiff, NdArray};
    use std::path::PathBuf;
    use tempfile::TempDir;

    pub(crate) fn sample_request() -> PredictionRequest {
        PredictionRequest {
            hla_match_score: 10.0,
            donor_age: 35.0,
            patient_age: 12.0,
            donor_sex: "Male".into(),
            patient_sex: "F".into(),
            diagnosis: "AML".into(),
            conditioning_regimen: "myeloablative".into(),
            source_of_cells: "PBSC".into(),
            days_from_diagnosis_to_hct: 180.0,
            cd34_dose: 5.2,
        }
    }

    fn training_dataset() -> CombinedDataset {
        let mut table = CanonicalTable::new("test", Vocabulary::standard().field_names());
        for i in 0..40i64 {
            let success = i % 4 != 0;
            table.records.push(
                CanonicalRecord::new()
                    .with(fields::HLA_MATCH_SCORE, Value::Integer(if success { 10 } else { 5 }))
                    .with(fields::PATIENT_AGE, Value::Float(i as f64))
                    .with(fields::DONOR_AGE, Value::Float(20.0 + (i % 10) as f64))
                    .with(fields::DIAGNOSIS, Value::Text(if i % 2 == 0 { "AML" } else { "ALL" }.into()))
                    .with(
                        fields::GVHD_PROPHYLAXIS,
                        Value::Text(if i % 3 == 0 { "cni_mtx" } else { "post_cy" }.into()),
                    )
                    .with(fields::ENGRAFTMENT_SUCCESS, Value::Integer(i64::from(success))),
            );
        }
        combine(vec![table]).unwrap()
    }

    /// Train a tiny model into a temp dir and return the directory
    pub(crate) fn trained_artifacts() -> (TempDir, PathBuf) {
        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().join("models");
        train_and_save::<Autodiff<NdArray<f32>>, _>(
            &training_dataset(),
            TrainingConfig::quick_test(),
            &dir,
            Default::default(),
        )
        .unwrap();
        (temp_dir, dir)
    }

    #[test]
    fn test_request_record_normalizes_and_fills_baseline() {
        let (_guard, dir) = trained_artifacts();
        let predictor = Predictor::<NdArray<f32>>::load(&dir, Default::default()).unwrap();

        let record = predictor.request_record(&sample_request()).unwrap();
        assert_eq!(record.get(fields::DONOR_SEX), Some(&Value::Text("M".into())));
        assert_eq!(record.get(fields::HLA_MATCH_SCORE), Some(&Value::Integer(10)));
        assert_eq!(record.get(fields::DISEASE_STATUS), Some(&Value::Text("active".into())));
        assert_eq!(record.get(fields::OVERALL_SURVIVAL_1Y), Some(&Value::Integer(1)));
        assert!(record.is_absent(fields::ENGRAFTMENT_SUCCESS));
    }

    #[test]
    fn test_predict_request_returns_response() {
        let (_guard, dir) = trained_artifacts();
        let predictor = Predictor::<NdArray<f32>>::load(&dir, Default::default()).unwrap();

        let response = predictor.predict_request(&sample_request()).unwrap();
        assert!(response.success_probability.ends_with('%'));
        let value: f64 = response.success_probability.trim_end_matches('%').parse().unwrap();
        assert!((0.0..=100.0).contains(&value));
    }

    #[test]
    fn test_malformed_requests_are_client_errors() {
        let (_guard, dir) = trained_artifacts();
        let predictor = Predictor::<NdArray<f32>>::load(&dir, Default::default()).unwrap();

        let mut request = sample_request();
        request.patient_sex = "X".into();
        let err = predictor.predict_request(&request).unwrap_err();
        assert!(matches!(err, PredictError::Request(ref m) if m.contains("patient_sex")));

        let mut request = sample_request();
        request.cd34_dose = f64::NAN;
        assert!(matches!(
            predictor.predict_request(&request),
            Err(PredictError::Request(_))
        ));
    }

    #[test]
    fn test_implausible_ranges_are_still_scored() {
        let (_guard, dir) = trained_artifacts();
        let predictor = Predictor::<NdArray<f32>>::load(&dir, Default::default()).unwrap();

        let mut request = sample_request();
        request.donor_age = 95.0;
        let record = predictor.request_record(&request).unwrap();
        assert_eq!(record.get(fields::DONOR_AGE), Some(&Value::Float(95.0)));
        assert!(predictor.predict_request(&request).is_ok());
    }

    #[test]
    fn test_predict_file() {
        let (guard, dir) = trained_artifacts();
        let predictor = Predictor::<NdArray<f32>>::load(&dir, Default::default()).unwrap();

        let path = guard.path().join("combined.csv");
        crate::data::loader::write_canonical_csv(training_dataset().table(), &path).unwrap();

        let batch = predictor.predict_file(&path).unwrap();
        assert_eq!(batch.predictions.len(), 40);
        assert!(batch.predictions.iter().all(|p| p.observed.is_some()));
        assert!(batch.summary.observed_accuracy.is_some());
    }
}
