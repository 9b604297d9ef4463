use super::{CanonicalTable, CombinedDataset, SourceRows};
use crate::error::{ReconcileError, Result};
use crate::vocabulary::Vocabulary;
use std::collections::HashSet;
use tracing::{debug, info};

/// Label of a dataset built from several sources
pub const COMBINED_SOURCE: &str = "combined";

/// Reindex partial tables onto the full canonical column set, concatenate
/// them in input order and drop exact duplicate rows (keeping the first).
pub fn combine(tables: Vec<CanonicalTable>) -> Result<CombinedDataset> {
    let columns = Vocabulary::standard().field_names();
    let mut combined = CanonicalTable::new(COMBINED_SOURCE, columns);
    let mut provenance = Vec::new();
    let mut seen = HashSet::new();
    let mut duplicates = 0;

    for table in tables {
        if table.is_empty() {
            debug!("Skipping empty table from {}", table.source);
            continue;
        }

        provenance.push(SourceRows {
            source: table.source.clone(),
            rows: table.len(),
        });

        for record in table.records {
            if seen.insert(record.row_key(&combined.columns)) {
                combined.records.push(record);
            } else {
                duplicates += 1;
            }
        }
    }

    if provenance.is_empty() {
        return Err(ReconcileError::EmptyDataset);
    }

    if duplicates > 0 {
        info!("Removed {} duplicate rows", duplicates);
    }
    info!(
        "Combined {} sources into {} rows",
        provenance.len(),
        combined.len()
    );

    Ok(CombinedDataset::from_parts(combined, provenance, duplicates))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{CanonicalRecord, Value};
    use crate::vocabulary::fields;

    fn partial(source: &str, columns: &[&str], records: Vec<CanonicalRecord>) -> CanonicalTable {
        let mut table = CanonicalTable::new(source, columns.iter().map(|c| c.to_string()).collect());
        table.records = records;
        table
    }

    #[test]
    fn test_columns_are_the_full_schema() {
        let a = partial(
            "A",
            &[fields::PATIENT_AGE],
            vec![CanonicalRecord::new().with(fields::PATIENT_AGE, Value::Float(4.0))],
        );
        let b = partial(
            "B",
            &[fields::DIAGNOSIS],
            vec![CanonicalRecord::new().with(fields::DIAGNOSIS, Value::Text("AML".into()))],
        );

        let combined = combine(vec![a, b]).unwrap();
        assert_eq!(combined.columns(), Vocabulary::standard().field_names().as_slice());
        assert_eq!(combined.len(), 2);
        assert!(combined.records()[0].is_absent(fields::DIAGNOSIS));
        assert_eq!(combined.provenance().len(), 2);
    }

    #[test]
    fn test_one_duplicate_removes_one_row() {
        let row = CanonicalRecord::new()
            .with(fields::PATIENT_SEX, Value::Text("F".into()))
            .with(fields::HLA_MATCH_SCORE, Value::Integer(10));
        let other = CanonicalRecord::new().with(fields::PATIENT_SEX, Value::Text("M".into()));

        let a = partial("A", &[fields::PATIENT_SEX], vec![row.clone(), other]);
        let b = partial("B", &[fields::PATIENT_SEX], vec![row.clone()]);

        let combined = combine(vec![a, b]).unwrap();
        assert_eq!(combined.len(), 2);
        assert_eq!(combined.duplicates_removed(), 1);
        assert_eq!(combined.records()[0], row);
        assert_eq!(combined.provenance()[1].rows, 1);
    }

    #[test]
    fn test_absent_rows_are_kept_distinct_from_zero() {
        let absent = CanonicalRecord::new().with(fields::PATIENT_AGE, Value::Float(3.0));
        let zero = absent.clone().with(fields::TRM, Value::Integer(0));
        let a = partial("A", &[fields::PATIENT_AGE], vec![absent, zero]);
        assert_eq!(combine(vec![a]).unwrap().len(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert!(matches!(combine(vec![]), Err(ReconcileError::EmptyDataset)));

        let empty = partial("A", &[fields::PATIENT_AGE], vec![]);
        assert!(matches!(combine(vec![empty]), Err(ReconcileError::EmptyDataset)));
    }
}
