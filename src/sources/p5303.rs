use super::{ColumnRule, TableAdapter, COMMON_SENTINELS};
use crate::vocabulary::fields;

const COLUMNS: &[ColumnRule] = &[
    ColumnRule::rename("sex", fields::PATIENT_SEX),
    ColumnRule::rename("age", fields::PATIENT_AGE),
    ColumnRule::rename("graftype", fields::SOURCE_OF_CELLS),
    ColumnRule::rename("gvhdgp", fields::GVHD_PROPHYLAXIS),
    ColumnRule::rename("ethgp", fields::PATIENT_ETHNICITY),
    ColumnRule::rename("indxtx2", fields::DAYS_FROM_DIAGNOSIS_TO_HCT),
    ColumnRule::rename("anc", fields::ENGRAFTMENT_SUCCESS),
    ColumnRule::rename("intxanc", fields::ENGRAFTMENT_DAYS),
    ColumnRule::rename("agvhd24", fields::ACUTE_GVHD_GRADE),
    ColumnRule::rename("cgvhd", fields::CHRONIC_GVHD),
    ColumnRule::rename("rel", fields::RELAPSE),
    ColumnRule::rename("condreg", fields::CONDITIONING_REGIMEN),
    ColumnRule::rename("hla_match", fields::HLA_MATCH_SCORE),
    ColumnRule::rename("disease", fields::DIAGNOSIS),
    ColumnRule::rename("disgrade", fields::DISEASE_STATUS),
    ColumnRule::rename("dead", fields::OVERALL_SURVIVAL_1Y),
];

/// P5303 study table
pub(super) fn adapter() -> TableAdapter {
    TableAdapter::new("P5303", "p5303", COLUMNS, COMMON_SENTINELS)
}
