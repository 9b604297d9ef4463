use super::{ColumnRule, TableAdapter, COMMON_SENTINELS};
use crate::vocabulary::fields;

/// Codebook columns with a canonical counterpart. Everything else in the
/// study table (time-to-event intervals, KPS, CMV status) is dropped.
const COLUMNS: &[ColumnRule] = &[
    ColumnRule::rename("sex", fields::PATIENT_SEX),
    ColumnRule::rename("graftype", fields::SOURCE_OF_CELLS),
    ColumnRule::rename("age", fields::PATIENT_AGE),
    ColumnRule::rename("anc", fields::ENGRAFTMENT_SUCCESS),
    ColumnRule::rename("intxanc", fields::ENGRAFTMENT_DAYS),
    ColumnRule::rename("cgvhd", fields::CHRONIC_GVHD),
    ColumnRule::rename("condreg", fields::CONDITIONING_REGIMEN),
    ColumnRule::rename("agvhd24", fields::ACUTE_GVHD_GRADE),
    ColumnRule::rename("hla_match", fields::HLA_MATCH_SCORE),
    ColumnRule::rename("genotype", fields::DIAGNOSIS),
    ColumnRule::rename("donorgp", fields::DONOR_RELATION),
    ColumnRule::rename("gvhdgp", fields::GVHD_PROPHYLAXIS),
    ColumnRule::rename("dead", fields::OVERALL_SURVIVAL_1Y),
];

/// P5191 study table, sickle cell disease cohort
pub(super) fn adapter() -> TableAdapter {
    TableAdapter::new("P5191", "p5191", COLUMNS, COMMON_SENTINELS)
}
