//! Raw token tables, `raw token -> canonical value`.
//!
//! Keys are matched case-insensitively with internal whitespace collapsed, so
//! one entry covers `MALE`, `Male` and `male`. Canonical values are implicit
//! tokens for themselves and are not repeated here.

use super::fields;

pub(super) const SEX_TOKENS: &[(&str, &str)] = &[
    ("MALE", "M"),
    ("1", "M"),
    ("FEMALE", "F"),
    ("2", "F"),
];

pub(super) const DIAGNOSIS_TOKENS: &[(&str, &str)] = &[
    ("Acute myeloid leukemia", "AML"),
    ("B-ALL", "ALL"),
    ("T-ALL", "ALL"),
    ("Acute lymphoblastic leukemia", "ALL"),
    ("Sickle Cell Disease", "SCD"),
    ("Sickle cell anemia", "SCD"),
    ("Beta thalassemia major", "Thalassemia"),
    ("Beta thalassemia intermedia", "Thalassemia"),
];

pub(super) const SOURCE_OF_CELLS_TOKENS: &[(&str, &str)] = &[
    ("peripheral_blood", "PBSC"),
    ("peripheral blood", "PBSC"),
    ("2", "PBSC"),
    ("22", "PBSC"),
    ("bone_marrow", "BM"),
    ("bone marrow", "BM"),
    ("1", "BM"),
    ("cord_blood", "CB"),
    ("cord blood", "CB"),
];

pub(super) const DONOR_RELATION_TOKENS: &[(&str, &str)] = &[
    ("BROTHER", "sibling"),
    ("SISTER", "sibling"),
    ("1", "sibling"),
    ("FATHER", "parent"),
    ("MOTHER", "parent"),
    ("SON", "other related"),
    ("DAUGHTER", "other related"),
    ("UNCLE", "other related"),
    ("SELF", "other related"),
    ("COUSIN", "other related"),
    ("UNRELATED", "matched unrelated"),
    ("3", "matched unrelated"),
];

pub(super) const DISEASE_STATUS_TOKENS: &[(&str, &str)] = &[
    ("1", "remission"),
    ("2", "remission"),
    ("3", "relapse"),
    ("4", "active"),
];

pub(super) const PATIENT_ETHNICITY_TOKENS: &[(&str, &str)] = &[
    ("1", "white"),
    ("EGYPTIAN", "white"),
    ("SYRIAN", "white"),
    ("YEMENI", "white"),
    ("2", "black"),
    ("SUDANESE", "black"),
    ("ETHIOPIAN", "black"),
    ("3", "asian"),
    ("BANGLADESHI", "asian"),
    ("INDIAN", "asian"),
    ("AFGHANISTAN", "asian"),
    ("PAKISTANI", "asian"),
    ("4", "other"),
    ("5", "other"),
    ("EMIRATI", "other"),
    ("6", "hispanic"),
];

pub(super) const CONDITIONING_REGIMEN_TOKENS: &[(&str, &str)] = &[
    ("1", "myeloablative"),
    ("myeloblative", "myeloablative"),
    ("MAC", "myeloablative"),
    ("2", "reduced_intensity"),
    ("reduced intensity", "reduced_intensity"),
    ("RIC", "reduced_intensity"),
    ("3", "other"),
];

pub(super) const GVHD_PROPHYLAXIS_TOKENS: &[(&str, &str)] = &[
    ("1", "ex_vivo_depletion"),
    ("2", "ex_vivo_depletion"),
    ("3", "post_cy"),
    ("4", "post_cy"),
    ("5", "cni_mmf"),
    ("6", "cni_mtx"),
    ("7", "cni_alone"),
    ("8", "siro"),
    ("9", "siro"),
    ("10", "other"),
    ("11", "other"),
    ("20", "other"),
    ("Cyclosporin+MTX", "cni_mtx"),
    ("MMF+Tacrolimus+Ruxolitinib", "cni_mmf"),
    ("Cyclophosphamide+MMF+Tacrolimus", "post_cy"),
    ("Tacrolimus", "cni_alone"),
    ("Cyclosporin", "cni_alone"),
    ("Cyclosporin+MTX+Tacrolimus", "cni_mtx"),
    ("Cyclosporin+MMF", "cni_mmf"),
    ("Tacrolimus+MMF", "cni_mmf"),
    ("Tacrolimus+MTX", "cni_mtx"),
    ("MMF+Tacrolimus+MTX", "cni_mmf"),
    ("Cyclophosphamide+MMF", "post_cy"),
    ("Sirolimus", "siro"),
    ("Cyclophosphamide+MMF+Sirolimus", "post_cy"),
    ("MMF", "other"),
    ("Cyclosporin+Abatacept", "other"),
    ("Cyclophosphamide+MMF+Tacrolimus+Ruxolitinib", "post_cy"),
    ("Cyclosporin+MTX+MMF+Leflunomide+Sirolimus", "siro"),
    ("Cyclophosphamide+MMF+Tacrolimus+Cyclosporin", "post_cy"),
    ("Cyclosporin+MTX+ Abatacept", "cni_mtx"),
];

pub(super) const ACUTE_GVHD_GRADE_TOKENS: &[(&str, &str)] = &[
    ("NONE", "0"),
    ("NO", "0"),
    ("YES", "1"),
    ("MILD", "2"),
    ("MODERATE", "3"),
    ("SEVERE", "4"),
];

/// Tables shared by every source, keyed by canonical field.
pub(super) const SHARED: &[(&str, &[(&str, &str)])] = &[
    (fields::ACUTE_GVHD_GRADE, ACUTE_GVHD_GRADE_TOKENS),
    (fields::CONDITIONING_REGIMEN, CONDITIONING_REGIMEN_TOKENS),
    (fields::DIAGNOSIS, DIAGNOSIS_TOKENS),
    (fields::DISEASE_STATUS, DISEASE_STATUS_TOKENS),
    (fields::DONOR_RELATION, DONOR_RELATION_TOKENS),
    (fields::DONOR_SEX, SEX_TOKENS),
    (fields::GVHD_PROPHYLAXIS, GVHD_PROPHYLAXIS_TOKENS),
    (fields::PATIENT_ETHNICITY, PATIENT_ETHNICITY_TOKENS),
    (fields::PATIENT_SEX, SEX_TOKENS),
    (fields::SOURCE_OF_CELLS, SOURCE_OF_CELLS_TOKENS),
];

/// Study-specific codes that would collide if shared, keyed by `(source, field)`.
pub(super) const SCOPED: &[(&str, &str, &[(&str, &str)])] = &[
    // P5191 genotype codebook (sickle cell cohort)
    ("p5191", fields::DIAGNOSIS, &[("1", "SCD"), ("2", "SCD")]),
    // P5303 disease codebook
    ("p5303", fields::DIAGNOSIS, &[("10", "AML"), ("20", "ALL")]),
];
