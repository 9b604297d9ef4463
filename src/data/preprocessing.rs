use crate::data::{CanonicalRecord, CombinedDataset, Dataset, LabeledSet, SplitConfig};
use crate::error::{ReconcileError, Result};
use crate::vocabulary::{fields, Vocabulary};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::{debug, info, warn};

/// Which fields the contract predicts and which it must never see
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Label field
    pub target: String,
    /// Fields excluded from the features (outcome leakage)
    pub excluded: Vec<String>,
}

impl Default for ContractConfig {
    fn default() -> Self {
        Self {
            target: fields::ENGRAFTMENT_SUCCESS.to_string(),
            excluded: vec![fields::ENGRAFTMENT_DAYS.to_string()],
        }
    }
}

/// Mean imputation and z-score scaling of one numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericEncoding {
    pub field: String,
    /// Fill value for absent cells (observed mean)
    pub fill: f64,
    /// Scaling mean, over the imputed column
    pub mean: f64,
    /// Scaling std (population), 1 when degenerate
    pub std: f64,
}

impl NumericEncoding {
    fn fit(field: &str, observed: &[f64], total: usize) -> Self {
        let mean = observed.iter().sum::<f64>() / observed.len() as f64;
        // Imputed cells sit on the mean and add nothing to the variance
        let variance = observed.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / total as f64;
        let mut std = variance.sqrt();
        if std < 1e-8 {
            std = 1.0;
        }

        Self {
            field: field.to_string(),
            fill: mean,
            mean,
            std,
        }
    }

    fn encode(&self, record: &CanonicalRecord) -> f32 {
        let value = record
            .get(&self.field)
            .and_then(|v| v.as_f64())
            .unwrap_or(self.fill);
        ((value - self.mean) / self.std) as f32
    }
}

/// Mode imputation and drop-first one-hot encoding of one categorical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoricalEncoding {
    pub field: String,
    /// Fill value for absent cells (most frequent category)
    pub fill: String,
    /// Observed categories, sorted; the first is the reference level
    pub categories: Vec<String>,
    /// One-hot output columns, one per non-reference category
    pub columns: Vec<String>,
}

impl CategoricalEncoding {
    fn fit(field: &str, counts: &BTreeMap<String, usize>) -> Self {
        // Ascending key order makes ties resolve to the smallest label
        let mut fill: Option<(&String, usize)> = None;
        for (label, &count) in counts {
            if fill.map_or(true, |(_, best)| count > best) {
                fill = Some((label, count));
            }
        }

        let categories: Vec<String> = counts.keys().cloned().collect();
        let columns = categories
            .iter()
            .skip(1)
            .map(|c| format!("{}_{}", field, c))
            .collect();

        Self {
            field: field.to_string(),
            fill: fill.map(|(label, _)| label.clone()).unwrap_or_default(),
            categories,
            columns,
        }
    }

    fn encode(&self, record: &CanonicalRecord, out: &mut Vec<f32>) {
        let label = record
            .get(&self.field)
            .map(|v| v.category_label())
            .unwrap_or_else(|| self.fill.clone());
        for category in self.categories.iter().skip(1) {
            out.push(if *category == label { 1.0 } else { 0.0 });
        }
    }
}

/// Dense model input produced by [`PreprocessingContract::apply`]
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub feature_names: Vec<String>,
    pub rows: Vec<Vec<f32>>,
}

impl FeatureMatrix {
    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Row-major flattened values
    pub fn to_flat(&self) -> Vec<f32> {
        self.rows.iter().flatten().copied().collect()
    }
}

/// Fit-once, apply-many feature preparation shared by training and serving
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreprocessingContract {
    target: String,
    excluded: Vec<String>,
    numeric: Vec<NumericEncoding>,
    categorical: Vec<CategoricalEncoding>,
    /// Fields left out because no row had a value at fit time
    dropped: Vec<String>,
    feature_names: Vec<String>,
}

impl PreprocessingContract {
    /// Fit on a combined dataset
    pub fn fit(dataset: &CombinedDataset, config: &ContractConfig) -> Result<Self> {
        Self::fit_records(dataset.columns(), dataset.records(), config)
    }

    /// Fit on records carrying the given canonical columns
    pub fn fit_records(
        columns: &[String],
        records: &[CanonicalRecord],
        config: &ContractConfig,
    ) -> Result<Self> {
        if records.is_empty() {
            return Err(ReconcileError::EmptyDataset);
        }
        info!("Fitting preprocessing contract on {} rows", records.len());

        let vocab = Vocabulary::standard();
        let mut numeric = Vec::new();
        let mut categorical = Vec::new();
        let mut dropped = Vec::new();

        for column in columns {
            let spec = vocab
                .field(column)
                .ok_or_else(|| ReconcileError::UnknownField(column.clone()))?;
            if *column == config.target || config.excluded.contains(column) {
                continue;
            }

            if spec.is_categorical() {
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for value in records.iter().filter_map(|r| r.get(column)) {
                    *counts.entry(value.category_label()).or_insert(0) += 1;
                }
                if counts.is_empty() {
                    dropped.push(column.clone());
                    continue;
                }
                categorical.push(CategoricalEncoding::fit(column, &counts));
            } else {
                let observed: Vec<f64> = records
                    .iter()
                    .filter_map(|r| r.get(column).and_then(|v| v.as_f64()))
                    .collect();
                if observed.is_empty() {
                    dropped.push(column.clone());
                    continue;
                }
                numeric.push(NumericEncoding::fit(column, &observed, records.len()));
            }
        }

        if !dropped.is_empty() {
            info!("Dropping fields with no observed values: {:?}", dropped);
        }

        let feature_names: Vec<String> = numeric
            .iter()
            .map(|n| n.field.clone())
            .chain(categorical.iter().flat_map(|c| c.columns.iter().cloned()))
            .collect();

        if feature_names.is_empty() {
            return Err(ReconcileError::schema(
                "preprocessing",
                "no feature has an observed value",
            ));
        }

        debug!(
            "Contract: {} numeric, {} categorical, {} features",
            numeric.len(),
            categorical.len(),
            feature_names.len()
        );

        Ok(Self {
            target: config.target.clone(),
            excluded: config.excluded.clone(),
            numeric,
            categorical,
            dropped,
            feature_names,
        })
    }

    /// Encode records with the fitted fills, categories, scaling and order
    pub fn apply(&self, records: &[CanonicalRecord]) -> FeatureMatrix {
        let rows = records
            .iter()
            .map(|record| {
                let mut row = Vec::with_capacity(self.feature_names.len());
                row.extend(self.numeric.iter().map(|n| n.encode(record)));
                for encoding in &self.categorical {
                    encoding.encode(record, &mut row);
                }
                row
            })
            .collect();

        FeatureMatrix {
            feature_names: self.feature_names.clone(),
            rows,
        }
    }

    /// Binary label of a record, if present and 0/1
    pub fn label(&self, record: &CanonicalRecord) -> Option<u8> {
        match record.get(&self.target).and_then(|v| v.as_f64()) {
            Some(v) if v == 0.0 => Some(0),
            Some(v) if v == 1.0 => Some(1),
            _ => None,
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    /// Ordered model input columns
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    /// Numeric input fields, in feature order
    pub fn numeric_columns(&self) -> Vec<&str> {
        self.numeric.iter().map(|n| n.field.as_str()).collect()
    }

    /// Categorical input fields, in feature order
    pub fn categorical_columns(&self) -> Vec<&str> {
        self.categorical.iter().map(|c| c.field.as_str()).collect()
    }

    pub fn categorical_encodings(&self) -> &[CategoricalEncoding] {
        &self.categorical
    }

    /// Save as JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let writer = BufWriter::new(File::create(path.as_ref())?);
        serde_json::to_writer_pretty(writer, self)?;
        debug!("Saved preprocessing contract to {:?}", path.as_ref());
        Ok(())
    }

    /// Load from JSON
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path.as_ref())?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Rows of a dataset whose target is 0 or 1. Unlabeled rows are skipped and logged.
pub fn labeled_rows(dataset: &CombinedDataset, target: &str) -> LabeledSet {
    let mut set = LabeledSet::default();
    for record in dataset.records() {
        match record.get(target).and_then(|v| v.as_f64()) {
            Some(v) if v == 0.0 || v == 1.0 => set.push(record.clone(), v as u8),
            _ => {}
        }
    }

    let skipped = dataset.len() - set.len();
    if skipped > 0 {
        info!("Excluding {} rows without a '{}' label", skipped, target);
    }
    set
}

/// Split labeled rows per class so both partitions keep the class ratio
pub fn stratified_split(set: LabeledSet, config: &SplitConfig) -> Dataset {
    info!("Splitting dataset with seed {}", config.seed);
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);

    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in set.labels.iter().enumerate() {
        by_class[usize::from(label.min(1))].push(i);
    }

    let mut test_indices = Vec::new();
    for indices in by_class.iter_mut() {
        indices.shuffle(&mut rng);
        let n_test = ((indices.len() as f64) * config.test_ratio).round() as usize;
        let n_test = n_test.min(indices.len().saturating_sub(1));
        test_indices.extend(indices.iter().take(n_test).copied());
    }
    test_indices.sort_unstable();

    let mut dataset = Dataset::default();
    let mut next_test = test_indices.iter().peekable();
    for (i, (record, label)) in set.records.into_iter().zip(set.labels).enumerate() {
        if next_test.peek() == Some(&&i) {
            next_test.next();
            dataset.test.push(record, label);
        } else {
            dataset.train.push(record, label);
        }
    }

    let log_distribution = |name: &str, data: &LabeledSet| {
        let (neg, pos) = data.class_counts();
        info!("{} distribution: positive={}, negative={}", name, pos, neg);
    };
    log_distribution("Train", &dataset.train);
    log_distribution("Test", &dataset.test);

    dataset
}

/// Resample the minority class with replacement until both classes are equal
pub fn oversample_minority(set: &mut LabeledSet, seed: u64) {
    let (neg, pos) = set.class_counts();
    info!("Balancing dataset: positive={}, negative={}", pos, neg);

    if pos == 0 || neg == 0 {
        warn!("Cannot balance dataset: one class is empty");
        return;
    }

    let minority = if pos < neg { 1u8 } else { 0u8 };
    let pool: Vec<usize> = (0..set.len()).filter(|&i| set.labels[i] == minority).collect();
    let missing = pos.max(neg) - pos.min(neg);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    for _ in 0..missing {
        let pick = pool[rng.gen_range(0..pool.len())];
        let record = set.records[pick].clone();
        set.push(record, minority);
    }

    info!("Balanced dataset size: {}", set.len());
}
