// Lossless coercions applied when a field spec opts in
//
// Only conversions that cannot lose information are attempted: decimal
// string to number and back, RFC 3339 string to timestamp, and the exact
// literals "true"/"false" to boolean.

use chrono::{DateTime, Utc};

use crate::value::FieldValue;

/// Attempt a lossless coercion of `value` to `target_kind` (the validation
/// kind string). Returns `None` when no safe conversion exists.
pub fn coerce(value: &FieldValue, target_kind: &str) -> Option<FieldValue> {
    match (value, target_kind) {
        (FieldValue::String(s), "number") => parse_decimal(s).map(FieldValue::Number),
        (FieldValue::Number(n), "string") => Some(FieldValue::String(format_number(*n))),
        (FieldValue::String(s), "timestamp") => s
            .parse::<DateTime<Utc>>()
            .ok()
            .map(FieldValue::Timestamp),
        (FieldValue::String(s), "boolean") => match s.as_str() {
            "true" => Some(FieldValue::Bool(true)),
            "false" => Some(FieldValue::Bool(false)),
            _ => None,
        },
        _ => None,
    }
}

fn parse_decimal(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    let parsed: f64 = trimmed.parse().ok()?;
    if parsed.is_finite() {
        Some(parsed)
    } else {
        None
    }
}

fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_to_number() {
        assert_eq!(
            coerce(&FieldValue::String("42".into()), "number"),
            Some(FieldValue::Number(42.0))
        );
        assert_eq!(
            coerce(&FieldValue::String("-3.5".into()), "number"),
            Some(FieldValue::Number(-3.5))
        );
        assert_eq!(coerce(&FieldValue::String("nope".into()), "number"), None);
        assert_eq!(coerce(&FieldValue::String("inf".into()), "number"), None);
    }

    #[test]
    fn test_number_to_string() {
        assert_eq!(
            coerce(&FieldValue::Number(7.0), "string"),
            Some(FieldValue::String("7".into()))
        );
        assert_eq!(
            coerce(&FieldValue::Number(2.5), "string"),
            Some(FieldValue::String("2.5".into()))
        );
    }

    #[test]
    fn test_string_to_timestamp() {
        let coerced = coerce(
            &FieldValue::String("2024-05-01T12:00:00Z".into()),
            "timestamp",
        );
        assert!(matches!(coerced, Some(FieldValue::Timestamp(_))));
        assert_eq!(
            coerce(&FieldValue::String("yesterday".into()), "timestamp"),
            None
        );
    }

    #[test]
    fn test_string_to_boolean_exact_only() {
        assert_eq!(
            coerce(&FieldValue::String("true".into()), "boolean"),
            Some(FieldValue::Bool(true))
        );
        assert_eq!(
            coerce(&FieldValue::String("false".into()), "boolean"),
            Some(FieldValue::Bool(false))
        );
        assert_eq!(coerce(&FieldValue::String("True".into()), "boolean"), None);
        assert_eq!(coerce(&FieldValue::String("1".into()), "boolean"), None);
    }

    #[test]
    fn test_no_cross_kind_surprises() {
        assert_eq!(coerce(&FieldValue::Bool(true), "number"), None);
        assert_eq!(coerce(&FieldValue::Null, "string"), None);
    }
}
