//! Source adapters: per-study column maps, sentinels and unit scales turning
//! a raw table into a partial canonical table.

mod bone_marrow;
mod p5191;
mod p5303;
mod uae;

use crate::data::{CanonicalRecord, CanonicalTable, RawTable, RawValue, Value};
use crate::error::{ReconcileError, Result};
use crate::normalize::{is_missing_token, normalize_field, render_token};
use crate::vocabulary::{fields, FieldSpec, Vocabulary};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Days per month used when a source records durations in months
pub const DAYS_PER_MONTH: f64 = 30.4375;

/// Maps one raw header onto a canonical field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnRule {
    /// Raw header, matched trimmed and case-insensitively
    pub raw: &'static str,
    /// Canonical field
    pub field: &'static str,
    /// Multiplier applied to numeric values (unit conversion)
    pub scale: Option<f64>,
}

impl ColumnRule {
    pub const fn rename(raw: &'static str, field: &'static str) -> Self {
        Self {
            raw,
            field,
            scale: None,
        }
    }

    pub const fn scaled(raw: &'static str, field: &'static str, scale: f64) -> Self {
        Self {
            raw,
            field,
            scale: Some(scale),
        }
    }

    fn matches(&self, header: &str) -> bool {
        self.raw.trim().eq_ignore_ascii_case(header.trim())
    }
}

/// Source-specific placeholders meaning "no data"
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sentinels {
    /// Text tokens, compared trimmed and case-insensitively
    pub tokens: &'static [&'static str],
    /// Numeric codes, matched in number cells and in text cells that parse
    /// as numbers (`"99.0"`)
    pub numbers: &'static [f64],
}

impl Sentinels {
    /// Check if a raw cell is a sentinel for this source
    pub fn matches(&self, raw: &RawValue) -> bool {
        match raw {
            RawValue::Missing => false,
            RawValue::Number(v) => self.numbers.iter().any(|n| n == v),
            RawValue::Text(s) => {
                let s = s.trim();
                self.tokens.iter().any(|t| t.eq_ignore_ascii_case(s))
                    || s.parse::<f64>().is_ok_and(|v| self.numbers.contains(&v))
            }
        }
    }
}

/// Sentinels shared by every known study
pub const COMMON_SENTINELS: Sentinels = Sentinels {
    tokens: &["Unknown", "99", "99.", "N/A", "NA", "Not Available", "Not Specified"],
    numbers: &[99.0],
};

/// Union of the free-text header aliases seen across spreadsheet and CSV exports
pub const GENERIC_ALIASES: &[ColumnRule] = &[
    ColumnRule::rename("Hemaological Diagnosis", fields::DIAGNOSIS),
    ColumnRule::rename("genotype", fields::DIAGNOSIS),
    ColumnRule::rename("disease", fields::DIAGNOSIS),
    ColumnRule::rename("Diagnosis", fields::DIAGNOSIS),
    ColumnRule::rename("Indication for  BMT", fields::DIAGNOSIS),
    ColumnRule::rename("disgrade", fields::DISEASE_STATUS),
    ColumnRule::rename("Disease Status", fields::DISEASE_STATUS),
    ColumnRule::rename("Status", fields::DISEASE_STATUS),
    ColumnRule::rename("R_Age at BMT", fields::PATIENT_AGE),
    ColumnRule::rename("recipient_age", fields::PATIENT_AGE),
    ColumnRule::rename("age", fields::PATIENT_AGE),
    ColumnRule::rename("R_Age", fields::PATIENT_AGE),
    ColumnRule::rename("R_Sex", fields::PATIENT_SEX),
    ColumnRule::rename("recipient_gender", fields::PATIENT_SEX),
    ColumnRule::rename("sex", fields::PATIENT_SEX),
    ColumnRule::rename("Gender", fields::PATIENT_SEX),
    ColumnRule::rename("Nationality", fields::PATIENT_ETHNICITY),
    ColumnRule::rename("ethgp", fields::PATIENT_ETHNICITY),
    ColumnRule::rename("Ethnicity", fields::PATIENT_ETHNICITY),
    ColumnRule::rename("Race", fields::PATIENT_ETHNICITY),
    ColumnRule::rename("D_relation", fields::DONOR_RELATION),
    ColumnRule::rename("donorgp", fields::DONOR_RELATION),
    ColumnRule::rename("Donor Relation", fields::DONOR_RELATION),
    ColumnRule::rename("Relation", fields::DONOR_RELATION),
    ColumnRule::rename("D_sex", fields::DONOR_SEX),
    ColumnRule::rename("Donor Sex", fields::DONOR_SEX),
    ColumnRule::rename("Donor Gender", fields::DONOR_SEX),
    ColumnRule::rename("D_Age", fields::DONOR_AGE),
    ColumnRule::rename("Donor Age", fields::DONOR_AGE),
    ColumnRule::rename("HLA match", fields::HLA_MATCH_SCORE),
    ColumnRule::rename("HLA_match", fields::HLA_MATCH_SCORE),
    ColumnRule::rename("NEW HLA", fields::HLA_MATCH_SCORE),
    ColumnRule::rename("stem_cell_source", fields::SOURCE_OF_CELLS),
    ColumnRule::rename("graftype", fields::SOURCE_OF_CELLS),
    ColumnRule::rename("Graft Type", fields::SOURCE_OF_CELLS),
    ColumnRule::rename("Source", fields::SOURCE_OF_CELLS),
    ColumnRule::rename("condint", fields::CONDITIONING_REGIMEN),
    ColumnRule::rename("Conditioning", fields::CONDITIONING_REGIMEN),
    ColumnRule::rename("Regimen", fields::CONDITIONING_REGIMEN),
    ColumnRule::rename("GVHD Prophylaxis", fields::GVHD_PROPHYLAXIS),
    ColumnRule::rename("gvhdgp", fields::GVHD_PROPHYLAXIS),
    ColumnRule::rename("Prophylaxis", fields::GVHD_PROPHYLAXIS),
    ColumnRule::rename("CD34_x1e6_per_kg", fields::CD34_DOSE),
    ColumnRule::rename("CD34 Dose", fields::CD34_DOSE),
    ColumnRule::rename("CD34", fields::CD34_DOSE),
    ColumnRule::scaled(
        "Diagnosis to BMT time months",
        fields::DAYS_FROM_DIAGNOSIS_TO_HCT,
        DAYS_PER_MONTH,
    ),
    ColumnRule::rename("indxtx2", fields::DAYS_FROM_DIAGNOSIS_TO_HCT),
    ColumnRule::rename("Time to Transplant", fields::DAYS_FROM_DIAGNOSIS_TO_HCT),
    // Historical UAE export labels engraftment as "GVHD"
    ColumnRule::rename("GVHD", fields::ENGRAFTMENT_SUCCESS),
    ColumnRule::rename("ANC_recovery", fields::ENGRAFTMENT_SUCCESS),
    ColumnRule::rename("anc", fields::ENGRAFTMENT_SUCCESS),
    ColumnRule::rename("Engraftment", fields::ENGRAFTMENT_SUCCESS),
    ColumnRule::rename("time_to_ANC_recovery", fields::ENGRAFTMENT_DAYS),
    ColumnRule::rename("intxanc", fields::ENGRAFTMENT_DAYS),
    ColumnRule::rename("Time to Engraftment", fields::ENGRAFTMENT_DAYS),
    ColumnRule::rename("GVHD severity", fields::ACUTE_GVHD_GRADE),
    ColumnRule::rename("agvhd24", fields::ACUTE_GVHD_GRADE),
    ColumnRule::rename("acute_GvHD_II_III_IV", fields::ACUTE_GVHD_GRADE),
    ColumnRule::rename("Acute GVHD", fields::ACUTE_GVHD_GRADE),
    ColumnRule::rename("extensive_chronic_GvHD", fields::CHRONIC_GVHD),
    ColumnRule::rename("cgvhd", fields::CHRONIC_GVHD),
    ColumnRule::rename("Chronic GVHD", fields::CHRONIC_GVHD),
    ColumnRule::rename("DEAD/Y/N", fields::OVERALL_SURVIVAL_1Y),
    ColumnRule::rename("survival_status", fields::OVERALL_SURVIVAL_1Y),
    ColumnRule::rename("dead", fields::OVERALL_SURVIVAL_1Y),
    ColumnRule::rename("Survival", fields::OVERALL_SURVIVAL_1Y),
    ColumnRule::rename("rel", fields::RELAPSE),
    ColumnRule::rename("Relapse", fields::RELAPSE),
    ColumnRule::rename("Disease Relapse", fields::RELAPSE),
    ColumnRule::rename("trm", fields::TRM),
    ColumnRule::rename("Transplant Related Mortality", fields::TRM),
];

/// Diagnostics produced while adapting one source
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdaptReport {
    /// Source label
    pub source: String,
    /// Rows adapted
    pub rows: usize,
    /// Raw columns with no canonical counterpart
    pub dropped_columns: Vec<String>,
    /// Raw tokens no normalizer could resolve, per canonical field, with counts
    pub unresolved: BTreeMap<String, BTreeMap<String, usize>>,
}

impl AdaptReport {
    fn note_unresolved(&mut self, field: &str, token: String) {
        *self
            .unresolved
            .entry(field.to_string())
            .or_default()
            .entry(token)
            .or_insert(0) += 1;
    }

    /// Total number of unresolved cells
    pub fn unresolved_count(&self) -> usize {
        self.unresolved.values().flat_map(|m| m.values()).sum()
    }
}

/// Output of a source adapter
#[derive(Debug, Clone, PartialEq)]
pub struct Adapted {
    pub table: CanonicalTable,
    pub report: AdaptReport,
}

/// Maps one source's raw table into the canonical schema
pub trait SourceAdapter: Send + Sync {
    /// Source label used in logs and reports
    fn name(&self) -> &str;

    /// Adapt a raw table. Pure: the same input always yields the same output.
    fn adapt(&self, raw: &RawTable) -> Result<Adapted>;
}

/// Adapter driven entirely by static configuration
#[derive(Debug, Clone)]
pub struct TableAdapter {
    name: String,
    scope: &'static str,
    rules: &'static [ColumnRule],
    sentinels: Sentinels,
}

impl TableAdapter {
    /// Create an adapter. `scope` selects source-scoped vocabulary tables.
    pub fn new(
        name: impl Into<String>,
        scope: &'static str,
        rules: &'static [ColumnRule],
        sentinels: Sentinels,
    ) -> Self {
        Self {
            name: name.into(),
            scope,
            rules,
            sentinels,
        }
    }

    /// Rename the source label (the vocabulary scope is unchanged)
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    fn rule_for(&self, header: &str) -> Option<&'static ColumnRule> {
        self.rules.iter().find(|rule| rule.matches(header))
    }
}

struct MappedColumn {
    index: usize,
    spec: &'static FieldSpec,
    scale: Option<f64>,
}

impl SourceAdapter for TableAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn adapt(&self, raw: &RawTable) -> Result<Adapted> {
        let vocab = Vocabulary::standard();
        let mut report = AdaptReport {
            source: self.name.clone(),
            ..Default::default()
        };

        let mut mapped = Vec::new();
        for (index, header) in raw.headers.iter().enumerate() {
            let spec = self
                .rule_for(header)
                .and_then(|rule| vocab.field(rule.field).map(|spec| (spec, rule.scale)));
            match spec {
                Some((spec, scale)) => mapped.push(MappedColumn { index, spec, scale }),
                None => report.dropped_columns.push(header.clone()),
            }
        }

        if mapped.is_empty() {
            return Err(ReconcileError::schema(
                &self.name,
                "no column maps onto the canonical schema",
            ));
        }

        let mut columns: Vec<&'static str> = mapped.iter().map(|c| c.spec.name).collect();
        columns.sort_by_key(|name| vocab.position(name));
        columns.dedup();

        let mut table = CanonicalTable::new(
            self.name.clone(),
            columns.iter().map(|c| c.to_string()).collect(),
        );

        for (row_index, row) in raw.rows.iter().enumerate() {
            if row.len() != raw.headers.len() {
                return Err(ReconcileError::schema(
                    &self.name,
                    format!(
                        "row {} has {} cells, header has {}",
                        row_index + 1,
                        row.len(),
                        raw.headers.len()
                    ),
                ));
            }

            let mut record = CanonicalRecord::new();
            for column in &mapped {
                let cell = &row[column.index];
                if cell.is_missing() || self.sentinels.matches(cell) {
                    continue;
                }

                match normalize_field(vocab, column.spec, cell, Some(self.scope)) {
                    Some(value) => {
                        if record.is_absent(column.spec.name) {
                            record.set(column.spec.name, Some(apply_scale(value, column.scale)));
                        }
                    }
                    None => {
                        if let Some(token) = render_token(cell).filter(|t| !is_missing_token(t)) {
                            report.note_unresolved(column.spec.name, token);
                        }
                    }
                }
            }
            table.records.push(record);
        }

        report.rows = table.len();
        if !report.dropped_columns.is_empty() {
            debug!(
                "{}: dropped {} unmapped columns: {:?}",
                self.name,
                report.dropped_columns.len(),
                report.dropped_columns
            );
        }
        if report.unresolved_count() > 0 {
            warn!(
                "{}: {} cells could not be normalized and were set absent",
                self.name,
                report.unresolved_count()
            );
        }

        Ok(Adapted { table, report })
    }
}

fn apply_scale(value: Value, scale: Option<f64>) -> Value {
    match (value, scale) {
        (Value::Float(v), Some(factor)) => Value::Float(v * factor),
        (Value::Integer(v), Some(factor)) => Value::Float(v as f64 * factor),
        (value, _) => value,
    }
}

/// Known raw data sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// UAE registry workbook
    Uae,
    /// Public bone marrow transplant CSV
    BoneMarrow,
    /// P5191 study (sickle cell), SAS table exported to CSV
    P5191,
    /// P5303 study, SAS table exported to CSV
    P5303,
}

impl SourceKind {
    /// All known kinds
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Uae,
        SourceKind::BoneMarrow,
        SourceKind::P5191,
        SourceKind::P5303,
    ];

    /// Identifier used in configuration and vocabulary scoping
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Uae => "uae",
            SourceKind::BoneMarrow => "bone_marrow",
            SourceKind::P5191 => "p5191",
            SourceKind::P5303 => "p5303",
        }
    }

    /// Workbook sheet holding this source's table, when it ships as a workbook
    pub fn default_sheet(&self) -> Option<&'static str> {
        match self {
            SourceKind::Uae => Some(uae::SHEET),
            _ => None,
        }
    }

    /// Adapter for this kind
    pub fn adapter(&self) -> Box<dyn SourceAdapter> {
        Box::new(self.table_adapter())
    }

    /// Configured table adapter for this kind
    pub fn table_adapter(&self) -> TableAdapter {
        match self {
            SourceKind::Uae => uae::adapter(),
            SourceKind::BoneMarrow => bone_marrow::adapter(),
            SourceKind::P5191 => p5191::adapter(),
            SourceKind::P5303 => p5303::adapter(),
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = ReconcileError;

    fn from_str(s: &str) -> Result<Self> {
        let key = s.trim().to_lowercase().replace([' ', '-'], "_");
        SourceKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == key)
            .ok_or_else(|| ReconcileError::unavailable(s, "unknown source kind"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::loader::DataLoader;
    use tempfile::tempdir;

    fn adapt(kind: SourceKind, raw: &RawTable) -> Adapted {
        kind.adapter().adapt(raw).unwrap()
    }

    #[test]
    fn test_free_text_row() {
        let raw = RawTable::from_pairs([
            ("Age", "34"),
            ("R_Sex", "Male"),
            ("HLA match", "10/10"),
            ("DEAD/Y/N", "no"),
        ]);
        let adapted = adapt(SourceKind::BoneMarrow, &raw);

        let expected = CanonicalRecord::new()
            .with(fields::PATIENT_AGE, Value::Float(34.0))
            .with(fields::PATIENT_SEX, Value::Text("M".into()))
            .with(fields::HLA_MATCH_SCORE, Value::Integer(10))
            .with(fields::OVERALL_SURVIVAL_1Y, Value::Integer(0));
        assert_eq!(adapted.table.records, vec![expected]);
        assert_eq!(
            adapted.table.columns,
            vec![
                fields::HLA_MATCH_SCORE,
                fields::OVERALL_SURVIVAL_1Y,
                fields::PATIENT_AGE,
                fields::PATIENT_SEX
            ]
        );
        assert!(adapted.report.dropped_columns.is_empty());
    }

    #[test]
    fn test_adapting_twice_is_identical() {
        let mut raw = RawTable::new(["Diagnosis", "D_relation", "CD34", "Notes"]);
        raw.push_row(vec!["AML".into(), "BROTHER".into(), "4.2".into(), "x".into()]);
        raw.push_row(vec!["Thalassemia".into(), "99".into(), RawValue::Missing, "y".into()]);

        let adapter = SourceKind::Uae.adapter();
        let first = adapter.adapt(&raw).unwrap();
        let second = adapter.adapt(&raw).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.report.dropped_columns, vec!["Notes".to_string()]);
    }

    #[test]
    fn test_sentinels_become_absent() {
        let mut raw = RawTable::new(["sex", "age", "hla_match"]);
        raw.push_row(vec![RawValue::Number(99.0), RawValue::Number(12.0), RawValue::Number(8.0)]);
        raw.push_row(vec![RawValue::Number(1.0), RawValue::Number(99.0), "Not Specified".into()]);

        let adapted = adapt(SourceKind::P5191, &raw);
        let records = &adapted.table.records;
        assert!(records[0].is_absent(fields::PATIENT_SEX));
        assert_eq!(records[0].get(fields::PATIENT_AGE), Some(&Value::Float(12.0)));
        assert_eq!(records[1].get(fields::PATIENT_SEX), Some(&Value::Text("M".into())));
        assert!(records[1].is_absent(fields::PATIENT_AGE));
        assert!(records[1].is_absent(fields::HLA_MATCH_SCORE));
        assert_eq!(adapted.report.unresolved_count(), 0);
    }

    #[test]
    fn test_sentinels_in_delimited_exports() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("p5191.csv");
        std::fs::write(&path, "sex,age,intxanc\n1,99.0,99.0\n1,99,99\n2, 99.00 ,14\n").unwrap();

        let raw = DataLoader::new().load(&path).unwrap();
        let adapted = adapt(SourceKind::P5191, &raw);
        for record in &adapted.table.records[..2] {
            assert!(record.is_absent(fields::PATIENT_AGE));
            assert!(record.is_absent(fields::ENGRAFTMENT_DAYS));
        }
        let last = &adapted.table.records[2];
        assert!(last.is_absent(fields::PATIENT_AGE));
        assert_eq!(last.get(fields::ENGRAFTMENT_DAYS), Some(&Value::Float(14.0)));

        let path = dir.path().join("uae.csv");
        std::fs::write(&path, "Age,CD34,Time to Engraftment\nnan,4.5,99.0\n12,NaN,21\n").unwrap();
        let raw = DataLoader::new().load(&path).unwrap();
        let adapted = adapt(SourceKind::Uae, &raw);
        let records = &adapted.table.records;
        assert!(records[0].is_absent(fields::PATIENT_AGE));
        assert!(records[0].is_absent(fields::ENGRAFTMENT_DAYS));
        assert_eq!(records[0].get(fields::CD34_DOSE), Some(&Value::Float(4.5)));
        assert_eq!(records[1].get(fields::PATIENT_AGE), Some(&Value::Float(12.0)));
        assert!(records[1].is_absent(fields::CD34_DOSE));
        assert_eq!(adapted.report.unresolved_count(), 0);
    }

    #[test]
    fn test_months_are_scaled_to_days() {
        let raw = RawTable::from_pairs([("Diagnosis to BMT time months", "2")]);
        let adapted = adapt(SourceKind::Uae, &raw);
        assert_eq!(
            adapted.table.records[0].get(fields::DAYS_FROM_DIAGNOSIS_TO_HCT),
            Some(&Value::Float(60.875))
        );
    }

    #[test]
    fn test_source_scoped_diagnosis_codes() {
        let raw = RawTable::from_pairs([("disease", RawValue::Number(10.0))]);
        let p5303 = adapt(SourceKind::P5303, &raw);
        assert_eq!(
            p5303.table.records[0].get(fields::DIAGNOSIS),
            Some(&Value::Text("AML".into()))
        );

        let raw = RawTable::from_pairs([("genotype", RawValue::Number(1.0))]);
        let p5191 = adapt(SourceKind::P5191, &raw);
        assert_eq!(
            p5191.table.records[0].get(fields::DIAGNOSIS),
            Some(&Value::Text("SCD".into()))
        );

        let uae = adapt(SourceKind::Uae, &RawTable::from_pairs([("Diagnosis", "10")]));
        assert!(uae.table.records[0].is_absent(fields::DIAGNOSIS));
        assert_eq!(uae.report.unresolved[fields::DIAGNOSIS]["10"], 1);
    }

    #[test]
    fn test_first_present_column_wins() {
        let mut raw = RawTable::new(["age", "R_Age"]);
        raw.push_row(vec![RawValue::Missing, "7".into()]);
        raw.push_row(vec!["5".into(), "7".into()]);

        let adapted = adapt(SourceKind::BoneMarrow, &raw);
        assert_eq!(adapted.table.records[0].get(fields::PATIENT_AGE), Some(&Value::Float(7.0)));
        assert_eq!(adapted.table.records[1].get(fields::PATIENT_AGE), Some(&Value::Float(5.0)));
        assert_eq!(adapted.table.columns, vec![fields::PATIENT_AGE]);
    }

    #[test]
    fn test_headers_match_trimmed_and_case_insensitive() {
        let raw = RawTable::from_pairs([("GVHD ", "yes"), ("  hla MATCH", "9")]);
        let adapted = adapt(SourceKind::Uae, &raw);
        let record = &adapted.table.records[0];
        assert_eq!(record.get(fields::ENGRAFTMENT_SUCCESS), Some(&Value::Integer(1)));
        assert_eq!(record.get(fields::HLA_MATCH_SCORE), Some(&Value::Integer(9)));
    }

    #[test]
    fn test_structural_problems_are_schema_violations() {
        let unmapped = RawTable::from_pairs([("foo", "1")]);
        let err = SourceKind::Uae.adapter().adapt(&unmapped).unwrap_err();
        assert!(matches!(err, ReconcileError::SchemaViolation { .. }));

        let mut ragged = RawTable::new(["age", "sex"]);
        ragged.push_row(vec!["1".into()]);
        let err = SourceKind::BoneMarrow.adapter().adapt(&ragged).unwrap_err();
        assert!(err.to_string().contains("row 1"));
    }

    #[test]
    fn test_source_kind_parsing() {
        assert_eq!("UAE".parse::<SourceKind>().unwrap(), SourceKind::Uae);
        assert_eq!("Bone Marrow".parse::<SourceKind>().unwrap(), SourceKind::BoneMarrow);
        assert_eq!("bone-marrow".parse::<SourceKind>().unwrap(), SourceKind::BoneMarrow);
        assert!("p9999".parse::<SourceKind>().is_err());
    }
}
