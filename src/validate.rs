//! Data-quality checks over canonical tables.
//!
//! Findings are returned as [`Issue`] values; only a structurally foreign
//! column is an error.

use crate::data::{CanonicalRecord, CanonicalTable, Value};
use crate::error::{ReconcileError, Result};
use crate::vocabulary::{fields, FieldSpec, NumericRange, Vocabulary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Maximum number of distinct offending values kept per issue
pub const SAMPLE_LIMIT: usize = 5;

/// Plausible engraftment window for successful engraftments, in days
pub const ENGRAFTMENT_WINDOW: NumericRange = NumericRange::closed(0.0, 100.0);

/// Category of a data-quality finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    /// Categorical value outside the allowed set
    InvalidCategory,
    /// Number in a categorical field, or text in a numeric one
    TypeMismatch,
    /// Numeric value outside the plausible range
    OutOfRange,
    /// Inconsistency between two fields
    CrossField,
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            IssueKind::InvalidCategory => "invalid category",
            IssueKind::TypeMismatch => "type mismatch",
            IssueKind::OutOfRange => "out of range",
            IssueKind::CrossField => "cross-field",
        };
        f.write_str(label)
    }
}

/// One data-quality finding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    /// Offending field
    pub field: String,
    /// Finding category
    pub kind: IssueKind,
    /// Expected values or range
    pub expected: String,
    /// Sorted sample of distinct offending values
    pub values: Vec<String>,
    /// Number of rows affected
    pub rows: usize,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in '{}': {} row(s) with {:?} (expected {})",
            self.kind, self.field, self.rows, self.values, self.expected
        )
    }
}

#[derive(Default)]
struct Offenders {
    rows: usize,
    values: BTreeSet<String>,
}

impl Offenders {
    fn note(&mut self, value: &Value) {
        self.rows += 1;
        self.values.insert(value.to_string());
    }

    fn into_issue(self, field: &str, kind: IssueKind, expected: String) -> Option<Issue> {
        if self.rows == 0 {
            return None;
        }
        Some(Issue {
            field: field.to_string(),
            kind,
            expected,
            values: self.values.into_iter().take(SAMPLE_LIMIT).collect(),
            rows: self.rows,
        })
    }
}

/// Validate a canonical table. An empty list means the table is clean.
pub fn validate(table: &CanonicalTable) -> Result<Vec<Issue>> {
    validate_records(&table.columns, &table.records)
}

/// Validate records carrying the given columns
pub fn validate_records(columns: &[String], records: &[CanonicalRecord]) -> Result<Vec<Issue>> {
    let vocab = Vocabulary::standard();

    for column in columns {
        if vocab.field(column).is_none() {
            return Err(ReconcileError::UnknownField(column.clone()));
        }
    }
    for record in records {
        if let Some((name, _)) = record.iter().find(|(name, _)| vocab.field(name).is_none()) {
            return Err(ReconcileError::UnknownField(name.to_string()));
        }
    }

    let mut issues = Vec::new();

    for spec in vocab.fields().iter().filter(|s| s.is_categorical()) {
        issues.extend(check_membership(vocab, spec, records));
    }
    for spec in vocab.fields() {
        issues.extend(check_type(spec, records));
    }
    for spec in vocab.fields() {
        issues.extend(check_range(spec, records));
    }
    issues.extend(check_engraftment_window(records));

    Ok(issues)
}

fn check_membership(vocab: &Vocabulary, spec: &FieldSpec, records: &[CanonicalRecord]) -> Option<Issue> {
    let allowed = vocab.canonical_values(spec.name);
    let mut offenders = Offenders::default();
    for value in records.iter().filter_map(|r| r.get(spec.name)) {
        if let Value::Text(text) = value {
            if !allowed.contains(&text.as_str()) {
                offenders.note(value);
            }
        }
    }
    offenders.into_issue(
        spec.name,
        IssueKind::InvalidCategory,
        format!("one of {:?}", allowed),
    )
}

fn check_type(spec: &FieldSpec, records: &[CanonicalRecord]) -> Option<Issue> {
    let mut offenders = Offenders::default();
    for value in records.iter().filter_map(|r| r.get(spec.name)) {
        if value.is_numeric() != spec.semantic.is_numeric() {
            offenders.note(value);
        }
    }
    let expected = if spec.semantic.is_numeric() {
        "a number"
    } else {
        "a category label"
    };
    offenders.into_issue(spec.name, IssueKind::TypeMismatch, expected.to_string())
}

fn check_range(spec: &FieldSpec, records: &[CanonicalRecord]) -> Option<Issue> {
    let range = spec.range?;
    let mut offenders = Offenders::default();
    for value in records.iter().filter_map(|r| r.get(spec.name)) {
        if !value.is_numeric() {
            continue;
        }
        match value.as_f64() {
            Some(v) if range.contains(v) => {}
            _ => offenders.note(value),
        }
    }
    offenders.into_issue(spec.name, IssueKind::OutOfRange, range.to_string())
}

fn check_engraftment_window(records: &[CanonicalRecord]) -> Option<Issue> {
    let mut offenders = Offenders::default();
    for record in records {
        let engrafted = record
            .get(fields::ENGRAFTMENT_SUCCESS)
            .and_then(Value::as_f64)
            .map_or(false, |v| v == 1.0);
        if !engrafted {
            continue;
        }
        if let Some(days) = record.get(fields::ENGRAFTMENT_DAYS) {
            match days.as_f64() {
                Some(v) if ENGRAFTMENT_WINDOW.contains(v) => {}
                _ => offenders.note(days),
            }
        }
    }
    offenders.into_issue(
        fields::ENGRAFTMENT_DAYS,
        IssueKind::CrossField,
        format!("{} when {} = 1", ENGRAFTMENT_WINDOW, fields::ENGRAFTMENT_SUCCESS),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(records: Vec<CanonicalRecord>) -> CanonicalTable {
        let mut table = CanonicalTable::new("test", Vocabulary::standard().field_names());
        table.records = records;
        table
    }

    #[test]
    fn test_clean_table_has_no_issues() {
        let record = CanonicalRecord::new()
            .with(fields::PATIENT_SEX, Value::Text("F".into()))
            .with(fields::HLA_MATCH_SCORE, Value::Integer(8))
            .with(fields::ENGRAFTMENT_SUCCESS, Value::Integer(1))
            .with(fields::ENGRAFTMENT_DAYS, Value::Float(18.0));
        assert!(validate(&table(vec![record, CanonicalRecord::new()])).unwrap().is_empty());
    }

    #[test]
    fn test_invalid_category_is_reported() {
        let records = vec![
            CanonicalRecord::new().with(fields::PATIENT_SEX, Value::Text("X".into())),
            CanonicalRecord::new().with(fields::PATIENT_SEX, Value::Text("X".into())),
            CanonicalRecord::new().with(fields::PATIENT_SEX, Value::Text("M".into())),
        ];
        let issues = validate(&table(records)).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, fields::PATIENT_SEX);
        assert_eq!(issues[0].kind, IssueKind::InvalidCategory);
        assert_eq!(issues[0].rows, 2);
        assert_eq!(issues[0].values, vec!["X".to_string()]);
        assert!(issues[0].to_string().contains("patient_sex"));
    }

    #[test]
    fn test_checks_do_not_short_circuit() {
        let record = CanonicalRecord::new()
            .with(fields::DIAGNOSIS, Value::Text("CML".into()))
            .with(fields::DONOR_SEX, Value::Integer(1))
            .with(fields::DONOR_AGE, Value::Float(72.0))
            .with(fields::CD34_DOSE, Value::Float(0.0))
            .with(fields::ENGRAFTMENT_SUCCESS, Value::Integer(1))
            .with(fields::ENGRAFTMENT_DAYS, Value::Float(140.0));

        let issues = validate(&table(vec![record])).unwrap();
        let kinds: Vec<(&str, IssueKind)> =
            issues.iter().map(|i| (i.field.as_str(), i.kind)).collect();
        assert_eq!(
            kinds,
            vec![
                (fields::DIAGNOSIS, IssueKind::InvalidCategory),
                (fields::DONOR_SEX, IssueKind::TypeMismatch),
                (fields::CD34_DOSE, IssueKind::OutOfRange),
                (fields::DONOR_AGE, IssueKind::OutOfRange),
                (fields::ENGRAFTMENT_DAYS, IssueKind::CrossField),
            ]
        );
    }

    #[test]
    fn test_failed_engraftment_ignores_window() {
        let record = CanonicalRecord::new()
            .with(fields::ENGRAFTMENT_SUCCESS, Value::Integer(0))
            .with(fields::ENGRAFTMENT_DAYS, Value::Float(140.0));
        assert!(validate(&table(vec![record])).unwrap().is_empty());
    }

    #[test]
    fn test_unknown_column_is_structural() {
        let mut t = table(vec![]);
        t.columns.push("karnofsky_score".into());
        assert!(matches!(validate(&t), Err(ReconcileError::UnknownField(f)) if f == "karnofsky_score"));
    }

    #[test]
    fn test_hla_range_applies_to_canonical_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("combined.csv");
        std::fs::write(&path, "hla_match_score,patient_sex\n11,M\n10,F\n").unwrap();

        let dataset = crate::data::loader::read_canonical_csv(&path).unwrap();
        let issues = validate(dataset.table()).unwrap();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].field, fields::HLA_MATCH_SCORE);
        assert_eq!(issues[0].kind, IssueKind::OutOfRange);
        assert_eq!(issues[0].values, vec!["11".to_string()]);
    }

    #[test]
    fn test_sample_is_bounded() {
        let records: Vec<CanonicalRecord> = (0..20)
            .map(|i| CanonicalRecord::new().with(fields::PATIENT_AGE, Value::Float(200.0 + i as f64)))
            .collect();
        let issues = validate(&table(records)).unwrap();
        assert_eq!(issues[0].rows, 20);
        assert_eq!(issues[0].values.len(), SAMPLE_LIMIT);
    }
}
