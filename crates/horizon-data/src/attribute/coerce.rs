//! Value coercions applied by the primitive attribute kinds.

use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;

use crate::logging::targets;
use crate::value::Value;

/// Characters stripped from numeric input unless configured otherwise.
pub const DEFAULT_STRIP_PATTERN: &str = r"[\$,%]";

pub(crate) static DEFAULT_STRIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(DEFAULT_STRIP_PATTERN).expect("default strip pattern is valid")
});

/// The longest numeric prefix of a string, the way `parseFloat` reads it.
static NUMERIC_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:Infinity|(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?)")
        .expect("numeric prefix pattern is valid")
});

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Undefined | Value::Null => true,
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

/// Coerce to a boolean.
///
/// `true`, `"true"` and anything numerically equal to `1` map to `true`;
/// everything else maps to `false`. With `use_null`, undefined, null and the
/// empty string map to `null`.
pub fn to_boolean(value: &Value, use_null: bool) -> Value {
    if use_null && is_blank(value) {
        return Value::Null;
    }
    let truthy = match value {
        Value::Bool(b) => *b,
        Value::Number(n) => *n == 1.0,
        Value::String(s) => s == "true" || s.trim().parse::<f64>().is_ok_and(|n| n == 1.0),
        _ => false,
    };
    Value::Bool(truthy)
}

/// Parse the leading number of `input`, ignoring leading whitespace.
///
/// Returns `NaN` when no number prefix exists.
pub fn parse_float_prefix(input: &str) -> f64 {
    let trimmed = input.trim_start();
    let Some(found) = NUMERIC_PREFIX.find(trimmed) else {
        return f64::NAN;
    };
    let text = found.as_str();
    match text.trim_start_matches(['+', '-']) {
        "Infinity" if text.starts_with('-') => f64::NEG_INFINITY,
        "Infinity" => f64::INFINITY,
        _ => text.parse().unwrap_or(f64::NAN),
    }
}

/// Coerce to a number.
///
/// `strip` removes presentation characters (currency symbols, thousands
/// separators, percent signs) before parsing. Blank input maps to `0`, or
/// `null` with `use_null`; unparseable input maps to `NaN`. With `integer`,
/// the result is truncated toward zero.
pub fn to_number(value: &Value, strip: &Regex, use_null: bool, integer: bool) -> Value {
    if is_blank(value) {
        return if use_null {
            Value::Null
        } else {
            Value::Number(0.0)
        };
    }

    let parsed = match value {
        Value::Number(n) => *n,
        other => {
            let text = other.to_display_string();
            let cleaned = strip.replace_all(&text, "");
            if cleaned.trim().is_empty() {
                return if use_null {
                    Value::Null
                } else {
                    Value::Number(0.0)
                };
            }
            parse_float_prefix(&cleaned)
        }
    };

    if parsed.is_nan() {
        tracing::trace!(target: targets::ATTRIBUTE, input = ?value, "unparseable numeric input");
    }

    Value::Number(if integer { parsed.trunc() } else { parsed })
}

/// Coerce to a string.
///
/// Undefined and null map to `""`, or `null` with `use_null` (which also
/// maps the empty string to `null`).
pub fn to_string(value: &Value, use_null: bool) -> Value {
    if use_null && is_blank(value) {
        return Value::Null;
    }
    match value {
        Value::Undefined | Value::Null => Value::String(String::new()),
        Value::String(_) => value.clone(),
        other => Value::String(other.to_display_string()),
    }
}

/// Coerce to a date.
///
/// Dates pass through, recognisable date strings are parsed, everything else
/// maps to `null`.
pub fn to_date(value: &Value) -> Value {
    match value {
        Value::Date(_) => value.clone(),
        Value::String(s) => parse_date(s).map_or(Value::Null, Value::Date),
        _ => Value::Null,
    }
}

/// Parse a date string in one of the common interchange formats.
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(input) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(date) = DateTime::parse_from_rfc2822(input) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y/%m/%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(input, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(input, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    fn number(value: impl Into<Value>, use_null: bool, integer: bool) -> Value {
        to_number(&value.into(), &DEFAULT_STRIP, use_null, integer)
    }

    #[test]
    fn test_boolean() {
        assert_eq!(to_boolean(&Value::from(true), false), Value::from(true));
        assert_eq!(to_boolean(&Value::from("true"), false), Value::from(true));
        assert_eq!(to_boolean(&Value::from(1), false), Value::from(true));
        assert_eq!(to_boolean(&Value::from("1"), false), Value::from(true));
        assert_eq!(to_boolean(&Value::from("yes"), false), Value::from(false));
        assert_eq!(to_boolean(&Value::from(2), false), Value::from(false));
        assert_eq!(to_boolean(&Value::Undefined, false), Value::from(false));
        assert_eq!(to_boolean(&Value::Null, false), Value::from(false));
    }

    #[test]
    fn test_boolean_use_null() {
        assert_eq!(to_boolean(&Value::Undefined, true), Value::Null);
        assert_eq!(to_boolean(&Value::Null, true), Value::Null);
        assert_eq!(to_boolean(&Value::from(""), true), Value::Null);
        assert_eq!(to_boolean(&Value::from("true"), true), Value::from(true));
    }

    #[test]
    fn test_float() {
        assert_eq!(number("$1,234.50", false, false), Value::from(1234.5));
        assert_eq!(number("15%", false, false), Value::from(15));
        assert_eq!(number("12abc", false, false), Value::from(12));
        assert!(number("abc", false, false).is_nan());
        assert_eq!(number(Value::Undefined, false, false), Value::from(0));
        assert_eq!(number(Value::Null, false, false), Value::from(0));
        assert_eq!(number("", true, false), Value::Null);
        assert_eq!(number("-Infinity", false, false), Value::from(f64::NEG_INFINITY));
    }

    #[test]
    fn test_integer_truncates_toward_zero() {
        assert_eq!(number(1.9, false, true), Value::from(1));
        assert_eq!(number(-1.9, false, true), Value::from(-1));
        assert_eq!(number("$42.99", false, true), Value::from(42));
        assert!(number("nope", true, true).is_nan());
    }

    #[test]
    fn test_custom_strip_pattern() {
        let strip = Regex::new(r"[€\s]").unwrap();
        assert_eq!(to_number(&Value::from("€ 12"), &strip, false, false), Value::from(12));
    }

    #[test]
    fn test_string() {
        assert_eq!(to_string(&Value::Undefined, false), Value::from(""));
        assert_eq!(to_string(&Value::Null, false), Value::from(""));
        assert_eq!(to_string(&Value::from(1.5), false), Value::from("1.5"));
        assert_eq!(to_string(&Value::from(false), false), Value::from("false"));
        assert_eq!(to_string(&Value::Null, true), Value::Null);
        assert_eq!(to_string(&Value::from(""), true), Value::Null);
    }

    #[test]
    fn test_date() {
        let parsed = to_date(&Value::from("2024-03-05T10:00:00Z"));
        let date = parsed.as_date().expect("parsed date");
        assert_eq!((date.year(), date.month(), date.day()), (2024, 3, 5));

        assert!(to_date(&Value::from("2024-03-05")).as_date().is_some());
        assert!(to_date(&Value::from("03/05/2024")).as_date().is_some());
        assert_eq!(to_date(&Value::from("not a date")), Value::Null);
        assert_eq!(to_date(&Value::from(1_700_000_000)), Value::Null);
        assert_eq!(to_date(&Value::Undefined), Value::Null);
    }
}
