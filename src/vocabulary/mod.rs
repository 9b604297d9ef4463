//! Canonical schema and controlled vocabulary.
//!
//! The registry holds the fixed set of canonical fields, the allowed values of
//! every categorical field and the tables mapping raw tokens (numeric codes,
//! abbreviations, free text, per-source synonyms) to canonical values. It is
//! pure data: lookups never fail, unmapped tokens resolve to
//! [`Lookup::Unknown`].

mod tables;

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;

/// Canonical field names.
pub mod fields {
    pub const ACUTE_GVHD_GRADE: &str = "acute_gvhd_grade";
    pub const CD34_DOSE: &str = "cd34_dose";
    pub const CHRONIC_GVHD: &str = "chronic_gvhd";
    pub const CONDITIONING_REGIMEN: &str = "conditioning_regimen";
    pub const DAYS_FROM_DIAGNOSIS_TO_HCT: &str = "days_from_diagnosis_to_hct";
    pub const DIAGNOSIS: &str = "diagnosis";
    pub const DISEASE_STATUS: &str = "disease_status";
    pub const DONOR_AGE: &str = "donor_age";
    pub const DONOR_RELATION: &str = "donor_relation";
    pub const DONOR_SEX: &str = "donor_sex";
    pub const ENGRAFTMENT_DAYS: &str = "engraftment_days";
    pub const ENGRAFTMENT_SUCCESS: &str = "engraftment_success";
    pub const GVHD_PROPHYLAXIS: &str = "gvhd_prophylaxis";
    pub const HLA_MATCH_SCORE: &str = "hla_match_score";
    pub const OVERALL_SURVIVAL_1Y: &str = "overall_survival_1y";
    pub const PATIENT_AGE: &str = "patient_age";
    pub const PATIENT_ETHNICITY: &str = "patient_ethnicity";
    pub const PATIENT_SEX: &str = "patient_sex";
    pub const RELAPSE: &str = "relapse";
    pub const SOURCE_OF_CELLS: &str = "source_of_cells";
    pub const TRM: &str = "trm";
}

/// Semantic type of a canonical field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticType {
    /// Finite set of canonical strings
    Categorical,
    /// 0 or 1
    Boolean,
    /// Integer within a declared range
    BoundedInteger,
    /// Real number within a declared range
    BoundedFloat,
}

impl SemanticType {
    /// Whether values of this type are numbers
    pub fn is_numeric(&self) -> bool {
        !matches!(self, SemanticType::Categorical)
    }
}

/// Which leaf normalizer coerces raw values of a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizerKind {
    Categorical,
    Boolean,
    HlaMatch,
    Grade,
    Numeric,
}

/// Plausible range of a numeric field
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NumericRange {
    pub min: f64,
    pub max: f64,
    /// Whether `min` itself is outside the range
    pub min_exclusive: bool,
}

impl NumericRange {
    /// Closed interval `[min, max]`
    pub const fn closed(min: f64, max: f64) -> Self {
        Self {
            min,
            max,
            min_exclusive: false,
        }
    }

    /// `[0, inf)`
    pub const fn non_negative() -> Self {
        Self::closed(0.0, f64::INFINITY)
    }

    /// `(0, inf)`
    pub const fn positive() -> Self {
        Self {
            min: 0.0,
            max: f64::INFINITY,
            min_exclusive: true,
        }
    }

    /// Check if a value lies in the range
    pub fn contains(&self, value: f64) -> bool {
        let above_min = if self.min_exclusive {
            value > self.min
        } else {
            value >= self.min
        };
        above_min && value <= self.max
    }
}

impl fmt::Display for NumericRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.min_exclusive, self.max.is_finite()) {
            (true, false) => write!(f, "> {}", self.min),
            (false, false) => write!(f, ">= {}", self.min),
            (true, true) => write!(f, "({}, {}]", self.min, self.max),
            (false, true) => write!(f, "[{}, {}]", self.min, self.max),
        }
    }
}

/// One slot of the canonical schema
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldSpec {
    /// Unique field name
    pub name: &'static str,
    /// Semantic type
    pub semantic: SemanticType,
    /// Normalizer applied to raw values of this field
    pub normalizer: NormalizerKind,
    /// Canonical values (categorical fields and token-coded integers)
    pub allowed: &'static [&'static str],
    /// Plausible range (numeric fields)
    pub range: Option<NumericRange>,
}

impl FieldSpec {
    const fn categorical(name: &'static str, allowed: &'static [&'static str]) -> Self {
        Self {
            name,
            semantic: SemanticType::Categorical,
            normalizer: NormalizerKind::Categorical,
            allowed,
            range: None,
        }
    }

    const fn flag(name: &'static str) -> Self {
        Self {
            name,
            semantic: SemanticType::Boolean,
            normalizer: NormalizerKind::Boolean,
            allowed: &[],
            range: Some(NumericRange::closed(0.0, 1.0)),
        }
    }

    const fn measurement(name: &'static str, range: NumericRange) -> Self {
        Self {
            name,
            semantic: SemanticType::BoundedFloat,
            normalizer: NormalizerKind::Numeric,
            allowed: &[],
            range: Some(range),
        }
    }

    /// Check if values of this field are categorical strings
    pub fn is_categorical(&self) -> bool {
        self.semantic == SemanticType::Categorical
    }
}

/// The canonical schema, in persisted column order.
pub const CANONICAL_FIELDS: &[FieldSpec] = &[
    FieldSpec {
        name: fields::ACUTE_GVHD_GRADE,
        semantic: SemanticType::BoundedInteger,
        normalizer: NormalizerKind::Grade,
        allowed: &["0", "1", "2", "3", "4"],
        range: Some(NumericRange::closed(0.0, 4.0)),
    },
    FieldSpec::measurement(fields::CD34_DOSE, NumericRange::positive()),
    FieldSpec::flag(fields::CHRONIC_GVHD),
    FieldSpec::categorical(
        fields::CONDITIONING_REGIMEN,
        &["myeloablative", "reduced_intensity", "other"],
    ),
    FieldSpec::measurement(fields::DAYS_FROM_DIAGNOSIS_TO_HCT, NumericRange::non_negative()),
    FieldSpec::categorical(fields::DIAGNOSIS, &["AML", "ALL", "SCD", "Thalassemia"]),
    FieldSpec::categorical(fields::DISEASE_STATUS, &["remission", "active", "relapse"]),
    FieldSpec::measurement(fields::DONOR_AGE, NumericRange::closed(0.0, 60.0)),
    FieldSpec::categorical(
        fields::DONOR_RELATION,
        &["sibling", "matched unrelated", "parent", "other related"],
    ),
    FieldSpec::categorical(fields::DONOR_SEX, &["M", "F"]),
    FieldSpec::measurement(fields::ENGRAFTMENT_DAYS, NumericRange::non_negative()),
    FieldSpec::flag(fields::ENGRAFTMENT_SUCCESS),
    FieldSpec::categorical(
        fields::GVHD_PROPHYLAXIS,
        &["ex_vivo_depletion", "post_cy", "cni_mmf", "cni_mtx", "cni_alone", "siro", "other"],
    ),
    FieldSpec {
        name: fields::HLA_MATCH_SCORE,
        semantic: SemanticType::BoundedInteger,
        normalizer: NormalizerKind::HlaMatch,
        allowed: &[],
        range: Some(NumericRange::closed(0.0, 10.0)),
    },
    FieldSpec::flag(fields::OVERALL_SURVIVAL_1Y),
    FieldSpec::measurement(fields::PATIENT_AGE, NumericRange::closed(0.0, 100.0)),
    FieldSpec::categorical(
        fields::PATIENT_ETHNICITY,
        &["white", "black", "asian", "hispanic", "other"],
    ),
    FieldSpec::categorical(fields::PATIENT_SEX, &["M", "F"]),
    FieldSpec::flag(fields::RELAPSE),
    FieldSpec::categorical(fields::SOURCE_OF_CELLS, &["BM", "PBSC", "CB"]),
    FieldSpec::flag(fields::TRM),
];

/// Result of a registry lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// The token maps to this canonical value
    Canonical(&'static str),
    /// The token is not in any table for the field
    Unknown,
}

impl Lookup {
    /// Canonical value, if any
    pub fn canonical(self) -> Option<&'static str> {
        match self {
            Lookup::Canonical(v) => Some(v),
            Lookup::Unknown => None,
        }
    }
}

type TokenTable = HashMap<String, &'static str>;

/// Registry of canonical fields and raw token tables
#[derive(Debug)]
pub struct Vocabulary {
    fields: &'static [FieldSpec],
    shared: HashMap<&'static str, TokenTable>,
    scoped: HashMap<(&'static str, &'static str), TokenTable>,
}

impl Vocabulary {
    /// Build the registry from the built-in tables
    pub fn new() -> Self {
        let mut shared: HashMap<&'static str, TokenTable> = HashMap::new();

        // Every canonical value is a token for itself
        for spec in CANONICAL_FIELDS {
            if !spec.allowed.is_empty() {
                let table = shared.entry(spec.name).or_default();
                for value in spec.allowed {
                    table.insert(token_key(value), value);
                }
            }
        }

        for (field, entries) in tables::SHARED {
            let table = shared.entry(field).or_default();
            for (raw, canonical) in entries.iter() {
                table.insert(token_key(raw), canonical);
            }
        }

        let mut scoped: HashMap<(&'static str, &'static str), TokenTable> = HashMap::new();
        for (source, field, entries) in tables::SCOPED {
            let table = scoped.entry((source, field)).or_default();
            for (raw, canonical) in entries.iter() {
                table.insert(token_key(raw), canonical);
            }
        }

        Self {
            fields: CANONICAL_FIELDS,
            shared,
            scoped,
        }
    }

    /// Process-wide registry built on first use
    pub fn standard() -> &'static Vocabulary {
        static REGISTRY: OnceLock<Vocabulary> = OnceLock::new();
        REGISTRY.get_or_init(Vocabulary::new)
    }

    /// All canonical fields, in persisted column order
    pub fn fields(&self) -> &'static [FieldSpec] {
        self.fields
    }

    /// Canonical field names, in persisted column order
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.to_string()).collect()
    }

    /// Field definition by name
    pub fn field(&self, name: &str) -> Option<&'static FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field in the canonical order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Allowed canonical values of a field (empty for plain numeric fields)
    pub fn canonical_values(&self, field: &str) -> &'static [&'static str] {
        self.field(field).map(|f| f.allowed).unwrap_or(&[])
    }

    /// Every known raw token of a field mapped to its canonical value.
    ///
    /// Keys are in lookup form (upper-cased, whitespace collapsed). Entries
    /// scoped to `source` override the shared ones.
    pub fn raw_to_canonical(&self, field: &str, source: Option<&str>) -> BTreeMap<String, &'static str> {
        let mut mapping: BTreeMap<String, &'static str> = self
            .shared
            .get(field)
            .map(|t| t.iter().map(|(k, v)| (k.clone(), *v)).collect())
            .unwrap_or_default();

        if let Some(table) = source.and_then(|s| self.scoped_table(s, field)) {
            for (k, v) in table {
                mapping.insert(k.clone(), v);
            }
        }
        mapping
    }

    /// Resolve one raw token of a field
    pub fn lookup(&self, field: &str, source: Option<&str>, token: &str) -> Lookup {
        let key = token_key(token);
        if key.is_empty() {
            return Lookup::Unknown;
        }

        let scoped = source
            .and_then(|s| self.scoped_table(s, field))
            .and_then(|t| t.get(&key));
        let shared = || self.shared.get(field).and_then(|t| t.get(&key));

        match scoped.or_else(shared) {
            Some(v) => Lookup::Canonical(v),
            None => Lookup::Unknown,
        }
    }

    fn scoped_table(&self, source: &str, field: &str) -> Option<&TokenTable> {
        self.scoped
            .iter()
            .find(|((s, f), _)| s.eq_ignore_ascii_case(source) && *f == field)
            .map(|(_, t)| t)
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new()
    }
}

/// Lookup form of a raw token: trimmed, whitespace collapsed, upper-cased
pub fn token_key(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ").to_uppercase()
}
