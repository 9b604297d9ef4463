pub mod predictor;

use crate::data::{RawValue, Value};
use crate::vocabulary::fields;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Clinical fields supplied with a prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    /// HLA match score (0-10)
    pub hla_match_score: f64,
    /// Donor age in years
    pub donor_age: f64,
    /// Patient age in years
    pub patient_age: f64,
    pub donor_sex: String,
    pub patient_sex: String,
    pub diagnosis: String,
    pub conditioning_regimen: String,
    /// Stem cell source (BM, PBSC, CB)
    pub source_of_cells: String,
    pub days_from_diagnosis_to_hct: f64,
    /// CD34+ cell dose
    pub cd34_dose: f64,
}

impl PredictionRequest {
    /// Request values keyed by canonical field, as raw cells
    pub fn raw_fields(&self) -> Vec<(&'static str, RawValue)> {
        vec![
            (fields::HLA_MATCH_SCORE, RawValue::Number(self.hla_match_score)),
            (fields::DONOR_AGE, RawValue::Number(self.donor_age)),
            (fields::PATIENT_AGE, RawValue::Number(self.patient_age)),
            (fields::DONOR_SEX, self.donor_sex.as_str().into()),
            (fields::PATIENT_SEX, self.patient_sex.as_str().into()),
            (fields::DIAGNOSIS, self.diagnosis.as_str().into()),
            (fields::CONDITIONING_REGIMEN, self.conditioning_regimen.as_str().into()),
            (fields::SOURCE_OF_CELLS, self.source_of_cells.as_str().into()),
            (
                fields::DAYS_FROM_DIAGNOSIS_TO_HCT,
                RawValue::Number(self.days_from_diagnosis_to_hct),
            ),
            (fields::CD34_DOSE, RawValue::Number(self.cd34_dose)),
        ]
    }
}

/// Values assumed for every field a request does not carry.
///
/// `gvhd_prophylaxis = "standard"` is not a registry value; it passes through
/// the contract as an unseen category (all-zero indicators).
pub fn clinical_baseline() -> Vec<(&'static str, Value)> {
    vec![
        (fields::DISEASE_STATUS, Value::Text("active".into())),
        (fields::DONOR_RELATION, Value::Text("sibling".into())),
        (fields::GVHD_PROPHYLAXIS, Value::Text("standard".into())),
        (fields::PATIENT_ETHNICITY, Value::Text("white".into())),
        (fields::ACUTE_GVHD_GRADE, Value::Integer(0)),
        (fields::CHRONIC_GVHD, Value::Integer(0)),
        (fields::OVERALL_SURVIVAL_1Y, Value::Integer(1)),
        (fields::RELAPSE, Value::Integer(0)),
        (fields::TRM, Value::Integer(0)),
    ]
}

/// Risk band derived from the success probability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskTier {
    Low,
    Moderate,
    High,
}

impl RiskTier {
    /// `>= 0.85` low, `>= 0.70` moderate, otherwise high
    pub fn from_probability(probability: f64) -> Self {
        if probability >= 0.85 {
            RiskTier::Low
        } else if probability >= 0.70 {
            RiskTier::Moderate
        } else {
            RiskTier::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskTier::Low => "Low risk",
            RiskTier::Moderate => "Moderate risk",
            RiskTier::High => "High risk",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            RiskTier::Low => {
                "High likelihood of successful transplantation. The procedure can be scheduled."
            }
            RiskTier::Moderate => {
                "Moderate likelihood of success. Additional examination is recommended."
            }
            RiskTier::High => "High risk of graft failure. Searching for an alternative donor is recommended.",
        }
    }
}

impl fmt::Display for RiskTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Distance from the decision boundary, scaled to [0, 1]
pub fn confidence(probability: f64) -> f64 {
    (probability - 0.5).abs() * 2.0
}

/// Response to a single prediction request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    /// Success probability as a percentage, e.g. `"87.12%"`
    pub success_probability: String,
    pub risk_level: String,
    pub recommendation: String,
    /// Confidence as a percentage
    pub confidence: String,
}

impl PredictionResponse {
    pub fn from_probability(probability: f64) -> Self {
        let tier = RiskTier::from_probability(probability);
        Self {
            success_probability: format!("{:.2}%", probability * 100.0),
            risk_level: tier.as_str().to_string(),
            recommendation: tier.recommendation().to_string(),
            confidence: format!("{:.2}%", confidence(probability) * 100.0),
        }
    }
}

/// Prediction for one row of a canonical file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowPrediction {
    /// Zero-based row index in the input
    pub row: usize,
    pub probability: f64,
    /// Binary prediction at the configured threshold
    pub prediction: u8,
    pub risk_level: RiskTier,
    pub confidence: f64,
    /// Recorded outcome, when the input carries one
    pub observed: Option<u8>,
}

impl RowPrediction {
    pub fn new(row: usize, probability: f64, threshold: f64, observed: Option<u8>) -> Self {
        Self {
            row,
            probability,
            prediction: u8::from(probability >= threshold),
            risk_level: RiskTier::from_probability(probability),
            confidence: confidence(probability),
            observed,
        }
    }
}

/// Batch prediction results
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub predictions: Vec<RowPrediction>,
    pub summary: PredictionSummary,
}

impl BatchPrediction {
    pub fn new(predictions: Vec<RowPrediction>) -> Self {
        let summary = PredictionSummary::from_predictions(&predictions);
        Self {
            predictions,
            summary,
        }
    }

    /// Export to CSV format
    pub fn to_csv(&self) -> csv::Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record([
            "row",
            "probability",
            "prediction",
            "risk_level",
            "confidence",
            "observed",
        ])?;
        for pred in &self.predictions {
            writer.write_record([
                pred.row.to_string(),
                format!("{:.6}", pred.probability),
                pred.prediction.to_string(),
                pred.risk_level.as_str().to_string(),
                format!("{:.6}", pred.confidence),
                pred.observed.map(|v| v.to_string()).unwrap_or_default(),
            ])?;
        }
        let bytes = writer
            .into_inner()
            .map_err(|e| csv::Error::from(e.into_error()))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Prediction summary statistics
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PredictionSummary {
    pub total_predictions: usize,
    pub positive_predictions: usize,
    pub positive_rate: f64,
    pub avg_probability: f64,
    pub low_risk: usize,
    pub moderate_risk: usize,
    pub high_risk: usize,
    /// Accuracy against recorded outcomes, when any row has one
    pub observed_accuracy: Option<f64>,
}

impl PredictionSummary {
    pub fn from_predictions(predictions: &[RowPrediction]) -> Self {
        let total = predictions.len();
        if total == 0 {
            return Self::default();
        }

        let positive = predictions.iter().filter(|p| p.prediction == 1).count();
        let tier_count = |tier: RiskTier| predictions.iter().filter(|p| p.risk_level == tier).count();

        let labeled: Vec<&RowPrediction> = predictions.iter().filter(|p| p.observed.is_some()).collect();
        let observed_accuracy = (!labeled.is_empty()).then(|| {
            let correct = labeled
                .iter()
                .filter(|p| p.observed == Some(p.prediction))
                .count();
            correct as f64 / labeled.len() as f64
        });

        Self {
            total_predictions: total,
            positive_predictions: positive,
            positive_rate: positive as f64 / total as f64,
            avg_probability: predictions.iter().map(|p| p.probability).sum::<f64>() / total as f64,
            low_risk: tier_count(RiskTier::Low),
            moderate_risk: tier_count(RiskTier::Moderate),
            high_risk: tier_count(RiskTier::High),
            observed_accuracy,
        }
    }

    /// Print summary to stdout
    pub fn print(&self) {
        println!("\n=== Prediction Summary ===");
        println!("Total predictions: {}", self.total_predictions);
        println!(
            "Predicted engraftment: {} ({:.2}%)",
            self.positive_predictions,
            self.positive_rate * 100.0
        );
        println!("Average probability: {:.4}", self.avg_probability);
        println!(
            "Risk tiers: low={}, moderate={}, high={}",
            self.low_risk, self.moderate_risk, self.high_risk
        );
        if let Some(accuracy) = self.observed_accuracy {
            println!("Accuracy against recorded outcomes: {:.4}", accuracy);
        }
        println!("==========================\n");
    }
}
