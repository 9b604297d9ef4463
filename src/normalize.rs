//! Leaf transforms coercing one raw cell into its canonical representation.
//!
//! Every function here is total: bad input degrades to `None` (absent).

use crate::data::{RawValue, Value};
use crate::vocabulary::{FieldSpec, NormalizerKind, Vocabulary};

/// Tokens meaning "no data" in any source, compared case-insensitively
pub const MISSING_TOKENS: &[&str] = &[
    "Unknown",
    "99",
    "99.",
    "N/A",
    "NA",
    "Not Available",
    "Not Specified",
    "nan",
    "None",
];

const HLA_FULL_MATCH: &[&str] = &["10/10", "10 OF 10", "12 OF 12"];

/// Check if a trimmed text cell is empty or a generic missing token
pub fn is_missing_token(text: &str) -> bool {
    let text = text.trim();
    text.is_empty() || MISSING_TOKENS.iter().any(|t| t.eq_ignore_ascii_case(text))
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

fn numeric_view(raw: &RawValue) -> Option<f64> {
    match raw {
        RawValue::Number(v) if v.is_finite() => Some(*v),
        RawValue::Text(s) => parse_number(s),
        _ => None,
    }
}

/// Render a raw cell as a lookup token; integral numbers lose their fraction
/// (`1.0 -> "1"`)
pub fn render_token(raw: &RawValue) -> Option<String> {
    match raw {
        RawValue::Missing => None,
        RawValue::Number(v) if !v.is_finite() => None,
        RawValue::Number(v) => Some(render_number(*v)),
        RawValue::Text(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return None;
            }
            match parse_number(trimmed) {
                Some(v) if v.fract() == 0.0 && trimmed.contains('.') => Some(render_number(v)),
                _ => Some(trimmed.to_string()),
            }
        }
    }
}

fn render_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        v.to_string()
    }
}

/// Coerce a yes/no or 0/1 cell into `0`/`1`
pub fn normalize_boolean(raw: &RawValue) -> Option<i64> {
    if let Some(v) = numeric_view(raw) {
        return match v.trunc() as i64 {
            flag @ (0 | 1) => Some(flag),
            _ => None,
        };
    }

    match raw {
        RawValue::Text(s) => {
            let s = s.trim();
            if s.eq_ignore_ascii_case("yes") {
                Some(1)
            } else if s.eq_ignore_ascii_case("no") {
                Some(0)
            } else {
                None
            }
        }
        _ => None,
    }
}

/// Coerce an HLA match description into a score in `[0, 10]`.
///
/// Wholly numeric cells are read as the number, so `"11"` is 11 rather than
/// its leading digit, and a score outside `[0, 10]` is absent. The
/// validator's HLA range check applies to canonical files that bypass the
/// adapters.
pub fn normalize_hla_match(raw: &RawValue) -> Option<i64> {
    let score = match raw {
        RawValue::Missing => None,
        RawValue::Number(v) if v.is_finite() => Some(v.trunc() as i64),
        RawValue::Number(_) => None,
        RawValue::Text(s) => {
            let text = s.trim();
            if let Some(v) = parse_number(text) {
                Some(v.trunc() as i64)
            } else {
                let upper = text.to_uppercase();
                if HLA_FULL_MATCH.contains(&upper.as_str()) {
                    Some(10)
                } else {
                    text.chars()
                        .next()
                        .and_then(|c| c.to_digit(10))
                        .map(i64::from)
                }
            }
        }
    };
    score.filter(|s| (0..=10).contains(s))
}

/// Best-effort numeric parse; non-finite values are absent
pub fn normalize_numeric(raw: &RawValue) -> Option<f64> {
    numeric_view(raw)
}

/// Coerce a categorical cell through the vocabulary
pub fn normalize_categorical(
    vocab: &Vocabulary,
    raw: &RawValue,
    field: &str,
    source: Option<&str>,
) -> Option<&'static str> {
    let token = render_token(raw)?;
    if is_missing_token(&token) {
        return None;
    }
    vocab.lookup(field, source, &token).canonical()
}

/// Coerce a GVHD grade (number or severity word) into `0..=4`
pub fn normalize_grade(vocab: &Vocabulary, raw: &RawValue, field: &str) -> Option<i64> {
    if let Some(v) = numeric_view(raw) {
        let grade = v.trunc() as i64;
        return (0..=4).contains(&grade).then_some(grade);
    }

    let token = render_token(raw)?;
    if is_missing_token(&token) {
        return None;
    }
    vocab
        .lookup(field, None, &token)
        .canonical()
        .and_then(|v| v.parse::<i64>().ok())
}

/// Normalize a raw cell according to the field's declared normalizer
pub fn normalize_field(
    vocab: &Vocabulary,
    spec: &FieldSpec,
    raw: &RawValue,
    source: Option<&str>,
) -> Option<Value> {
    match spec.normalizer {
        NormalizerKind::Boolean => normalize_boolean(raw).map(Value::Integer),
        NormalizerKind::HlaMatch => normalize_hla_match(raw).map(Value::Integer),
        NormalizerKind::Grade => normalize_grade(vocab, raw, spec.name).map(Value::Integer),
        NormalizerKind::Numeric => normalize_numeric(raw).map(Value::Float),
        NormalizerKind::Categorical => {
            normalize_categorical(vocab, raw, spec.name, source).map(|v| Value::Text(v.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vocabulary::fields;

    #[test]
    fn test_boolean() {
        let inputs: Vec<RawValue> = vec![
            "yes".into(),
            "Yes".into(),
            "YES".into(),
            "no".into(),
            "1".into(),
            "0".into(),
            1.0.into(),
            0.0.into(),
        ];
        let got: Vec<Option<i64>> = inputs.iter().map(normalize_boolean).collect();
        let want = vec![1, 1, 1, 0, 1, 0, 1, 0];
        assert_eq!(got, want.into_iter().map(Some).collect::<Vec<_>>());

        assert_eq!(normalize_boolean(&"maybe".into()), None);
        assert_eq!(normalize_boolean(&RawValue::from_field("")), None);
        assert_eq!(normalize_boolean(&RawValue::Missing), None);
        assert_eq!(normalize_boolean(&RawValue::Number(f64::NAN)), None);
        assert_eq!(normalize_boolean(&RawValue::Number(2.0)), None);
        assert_eq!(normalize_boolean(&"1.0".into()), Some(1));
    }

    #[test]
    fn test_hla_match() {
        let inputs: Vec<RawValue> = vec![
            "10/10".into(),
            "10 OF 10".into(),
            "12 OF 12".into(),
            "8".into(),
            RawValue::Number(9.0),
            "N/A".into(),
        ];
        let got: Vec<Option<i64>> = inputs.iter().map(normalize_hla_match).collect();
        assert_eq!(got, vec![Some(10), Some(10), Some(10), Some(8), Some(9), None]);

        assert_eq!(normalize_hla_match(&"10 of 10".into()), Some(10));
        assert_eq!(normalize_hla_match(&"7/8".into()), Some(7));
        assert_eq!(normalize_hla_match(&"11".into()), None);
        assert_eq!(normalize_hla_match(&RawValue::Number(-1.0)), None);
    }

    #[test]
    fn test_categorical_sentinels_and_lookup() {
        let vocab = Vocabulary::standard();
        for sentinel in ["Unknown", "99", "99.", "n/a", "NA", "not specified", "nan", "None", "  "] {
            assert_eq!(
                normalize_categorical(vocab, &sentinel.into(), fields::DONOR_RELATION, None),
                None,
                "{} should be absent",
                sentinel
            );
        }
        assert_eq!(
            normalize_categorical(vocab, &" Brother ".into(), fields::DONOR_RELATION, None),
            Some("sibling")
        );
        assert_eq!(
            normalize_categorical(vocab, &RawValue::Number(1.0), fields::DONOR_RELATION, None),
            Some("sibling")
        );
        assert_eq!(
            normalize_categorical(vocab, &"1.0".into(), fields::DONOR_RELATION, None),
            Some("sibling")
        );
        assert_eq!(normalize_categorical(vocab, &"X".into(), fields::PATIENT_SEX, None), None);
    }

    #[test]
    fn test_numeric() {
        assert_eq!(normalize_numeric(&"34".into()), Some(34.0));
        assert_eq!(normalize_numeric(&" 2.5 ".into()), Some(2.5));
        assert_eq!(normalize_numeric(&"abc".into()), None);
        assert_eq!(normalize_numeric(&"inf".into()), None);
        assert_eq!(normalize_numeric(&RawValue::Number(f64::NAN)), None);
    }

    #[test]
    fn test_grade() {
        let vocab = Vocabulary::standard();
        let field = fields::ACUTE_GVHD_GRADE;
        assert_eq!(normalize_grade(vocab, &"2".into(), field), Some(2));
        assert_eq!(normalize_grade(vocab, &RawValue::Number(3.0), field), Some(3));
        assert_eq!(normalize_grade(vocab, &"severe".into(), field), Some(4));
        assert_eq!(normalize_grade(vocab, &"None".into(), field), None);
        assert_eq!(normalize_grade(vocab, &"NO".into(), field), Some(0));
        assert_eq!(normalize_grade(vocab, &"7".into(), field), None);
    }

    #[test]
    fn test_render_token() {
        assert_eq!(render_token(&RawValue::Number(1.0)), Some("1".to_string()));
        assert_eq!(render_token(&RawValue::Number(1.5)), Some("1.5".to_string()));
        assert_eq!(render_token(&"10.0".into()), Some("10".to_string()));
        assert_eq!(render_token(&"99.".into()), Some("99".to_string()));
        assert_eq!(render_token(&RawValue::Missing), None);
    }

    #[test]
    fn test_normalize_field_dispatch() {
        let vocab = Vocabulary::standard();
        let hla = vocab.field(fields::HLA_MATCH_SCORE).unwrap();
        let age = vocab.field(fields::PATIENT_AGE).unwrap();
        let sex = vocab.field(fields::PATIENT_SEX).unwrap();

        assert_eq!(normalize_field(vocab, hla, &"10/10".into(), None), Some(Value::Integer(10)));
        assert_eq!(normalize_field(vocab, age, &"34".into(), None), Some(Value::Float(34.0)));
        assert_eq!(
            normalize_field(vocab, sex, &"Male".into(), None),
            Some(Value::Text("M".into()))
        );
    }
}
