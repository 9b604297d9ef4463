pub mod combine;
pub mod loader;
pub mod preprocessing;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A single cell as read from a raw source, before any normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    /// The source file had no value in this cell
    Missing,
    /// Textual cell (delimited text, spreadsheet strings)
    Text(String),
    /// Numeric cell (statistical-software tables)
    Number(f64),
}

impl RawValue {
    /// Build a raw value from a delimited-text field. Empty fields are missing.
    pub fn from_field(field: &str) -> Self {
        if field.is_empty() {
            RawValue::Missing
        } else {
            RawValue::Text(field.to_string())
        }
    }

    /// Check if the cell carries no value at all
    pub fn is_missing(&self) -> bool {
        match self {
            RawValue::Missing => true,
            RawValue::Number(v) => v.is_nan(),
            RawValue::Text(_) => false,
        }
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Number(value)
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Number(value as f64)
    }
}

/// A table in one source's native layout: native headers, native encodings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    /// Column headers as they appear in the source
    pub headers: Vec<String>,
    /// Rows, each expected to be as wide as `headers`
    pub rows: Vec<Vec<RawValue>>,
}

impl RawTable {
    /// Create an empty table with the given headers
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Build a single-row table from `(header, value)` pairs
    pub fn from_pairs<S, V>(pairs: impl IntoIterator<Item = (S, V)>) -> Self
    where
        S: Into<String>,
        V: Into<RawValue>,
    {
        let (headers, row): (Vec<String>, Vec<RawValue>) = pairs
            .into_iter()
            .map(|(h, v)| (h.into(), v.into()))
            .unzip();
        Self {
            headers,
            rows: vec![row],
        }
    }

    /// Append a row
    pub fn push_row(&mut self, row: Vec<RawValue>) {
        self.rows.push(row);
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A normalized value in the canonical schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Boolean flags (0/1) and bounded integers
    Integer(i64),
    /// Bounded measurements
    Float(f64),
    /// Canonical categorical values
    Text(String),
}

impl Value {
    /// Numeric view of the value, parsing text when possible
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Float(v) if v.is_finite() => Some(*v),
            Value::Float(_) => None,
            Value::Text(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        }
    }

    /// Category label used by one-hot encoding
    pub fn category_label(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            other => other.to_string(),
        }
    }

    /// Check if this is a number (integer or float)
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_))
    }

    fn write_key(&self, key: &mut String) {
        match self {
            Value::Integer(v) => {
                key.push('i');
                key.push_str(&v.to_string());
            }
            Value::Float(v) => {
                let v = if *v == 0.0 { 0.0f64 } else { *v };
                key.push('f');
                key.push_str(&v.to_bits().to_string());
            }
            Value::Text(s) => {
                key.push('t');
                key.push_str(&s.len().to_string());
                key.push(':');
                key.push_str(s);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// One row in the canonical schema.
///
/// A field without an entry is absent. Absence is never encoded as `0` or an
/// empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CanonicalRecord {
    values: BTreeMap<String, Value>,
}

impl CanonicalRecord {
    /// Create an empty record (every field absent)
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field; `None` makes it absent
    pub fn set(&mut self, field: &str, value: Option<Value>) {
        match value {
            Some(v) => {
                self.values.insert(field.to_string(), v);
            }
            None => {
                self.values.remove(field);
            }
        }
    }

    /// Builder-style [`CanonicalRecord::set`]
    pub fn with(mut self, field: &str, value: Value) -> Self {
        self.set(field, Some(value));
        self
    }

    /// Get a field value, `None` when absent
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Check if a field is absent
    pub fn is_absent(&self, field: &str) -> bool {
        !self.values.contains_key(field)
    }

    /// Iterate over present fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of present fields
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if every field is absent
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Equality key over the given columns; absent cells compare equal
    pub fn row_key(&self, columns: &[String]) -> String {
        let mut key = String::new();
        for column in columns {
            match self.values.get(column) {
                Some(value) => value.write_key(&mut key),
                None => key.push('-'),
            }
            key.push('\u{1f}');
        }
        key
    }
}

/// A table in the canonical schema, possibly populating only some columns.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalTable {
    /// Label of the source the rows came from
    pub source: String,
    /// Canonical columns this table carries, in registry order
    pub columns: Vec<String>,
    /// Rows
    pub records: Vec<CanonicalRecord>,
}

impl CanonicalTable {
    /// Create an empty table
    pub fn new(source: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            source: source.into(),
            columns,
            records: Vec::new(),
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the table has no rows
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Non-absent count per column, in column order
    pub fn coverage(&self) -> Vec<ColumnCoverage> {
        self.columns
            .iter()
            .map(|column| ColumnCoverage {
                field: column.clone(),
                present: self.records.iter().filter(|r| !r.is_absent(column)).count(),
                total: self.records.len(),
            })
            .collect()
    }
}

/// How many rows populate one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnCoverage {
    /// Canonical field
    pub field: String,
    /// Rows with a value
    pub present: usize,
    /// Total rows
    pub total: usize,
}

impl ColumnCoverage {
    /// Fraction of rows with a value
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.present as f64 / self.total as f64
        }
    }
}

/// Row contribution of one source to a combined dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRows {
    /// Source label
    pub source: String,
    /// Rows contributed before deduplication
    pub rows: usize,
}

/// Column-aligned, deduplicated concatenation of canonical tables.
///
/// Its columns are always the full canonical field set. Any further cleaning
/// produces a new dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct CombinedDataset {
    table: CanonicalTable,
    provenance: Vec<SourceRows>,
    duplicates_removed: usize,
}

impl CombinedDataset {
    pub(crate) fn from_parts(
        table: CanonicalTable,
        provenance: Vec<SourceRows>,
        duplicates_removed: usize,
    ) -> Self {
        Self {
            table,
            provenance,
            duplicates_removed,
        }
    }

    /// Underlying table
    pub fn table(&self) -> &CanonicalTable {
        &self.table
    }

    /// Column names (the full canonical field set)
    pub fn columns(&self) -> &[String] {
        &self.table.columns
    }

    /// Rows
    pub fn records(&self) -> &[CanonicalRecord] {
        &self.table.records
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Check if the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Per-source row counts, in combination order
    pub fn provenance(&self) -> &[SourceRows] {
        &self.provenance
    }

    /// Number of exact duplicates dropped while combining
    pub fn duplicates_removed(&self) -> usize {
        self.duplicates_removed
    }
}

/// Train/test split configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitConfig {
    /// Fraction of each class held out for testing
    pub test_ratio: f64,
    /// Random seed
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_ratio: 0.2,
            seed: 42,
        }
    }
}

/// Records paired with their 0/1 labels
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledSet {
    pub records: Vec<CanonicalRecord>,
    pub labels: Vec<u8>,
}

impl LabeledSet {
    /// Add a labeled record
    pub fn push(&mut self, record: CanonicalRecord, label: u8) {
        self.records.push(record);
        self.labels.push(label);
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// `(negatives, positives)`
    pub fn class_counts(&self) -> (usize, usize) {
        let positives = self.labels.iter().filter(|&&y| y == 1).count();
        (self.labels.len() - positives, positives)
    }
}

/// Train/test partition of labeled rows
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub train: LabeledSet,
    pub test: LabeledSet,
}
