//! Literal and token encoding.
//!
//! This is the single place where a [`Value`] becomes SQL text. Two modes exist:
//!
//! - **literal**: a self-contained SQL literal (`'O''Brien'`, `42`, `(1, 2)`, `NULL`).
//! - **token**: the raw text form, used when the caller composes the literal itself
//!   (LIKE patterns, JSON key names). Only scalars with an unambiguous text form are
//!   accepted.
//!
//! # Example
//! ```ignore
//! use relq::{encode_literal, Value};
//!
//! assert_eq!(encode_literal(&Value::from("O'Brien"))?, "'O''Brien'");
//! # Ok::<(), relq::BuildError>(())
//! ```

use crate::error::{BuildError, BuildResult};
use crate::model::FieldType;
use crate::value::Value;
use std::fmt::Write as _;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Literal,
    Token,
}

/// Encode a value as a SQL literal.
pub fn encode_literal(value: &Value) -> BuildResult<String> {
    let mut out = String::new();
    encode_into(value, Mode::Literal, &mut out)?;
    Ok(out)
}

/// Encode a value as a raw token.
pub fn encode_token(value: &Value) -> BuildResult<String> {
    let mut out = String::new();
    encode_into(value, Mode::Token, &mut out)?;
    Ok(out)
}

/// Encode a value written to a column of `field_type`.
///
/// Lists bound for array columns become `ARRAY[...]` constructors, or `'{}'` when empty.
/// Anything else is a plain literal.
pub fn encode_column(value: &Value, field_type: &FieldType) -> BuildResult<String> {
    match (field_type, value.materialize()) {
        (FieldType::Array(inner), Value::List(items)) => encode_array(&items, inner),
        (_, value) => encode_literal(&value),
    }
}

fn encode_array(items: &[Value], element: &FieldType) -> BuildResult<String> {
    if items.is_empty() {
        return Ok("'{}'".to_string());
    }
    let mut out = String::from("ARRAY[");
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        match (element, item.materialize()) {
            (FieldType::Array(inner), Value::List(nested)) if !nested.is_empty() => {
                out.push_str(&encode_array(&nested, inner)?);
            }
            (_, Value::List(_)) => {
                return Err(BuildError::invalid(format!(
                    "nested list in an array of {}",
                    element.sql_type()
                )));
            }
            (_, item) => encode_into(&item, Mode::Literal, &mut out)?,
        }
    }
    out.push(']');
    Ok(out)
}

/// Single-quote a string, doubling embedded quotes.
pub fn quote_literal(s: &str) -> BuildResult<String> {
    let mut out = String::with_capacity(s.len() + 2);
    push_quoted(s, &mut out)?;
    Ok(out)
}

/// Inverse of [`quote_literal`]; `None` if `s` is not a well-formed quoted literal.
pub fn unquote_literal(s: &str) -> Option<String> {
    let inner = s.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        // A quote inside the literal must be doubled.
        if c == '\'' && chars.next() != Some('\'') {
            return None;
        }
        out.push(c);
    }
    Some(out)
}

fn push_quoted(s: &str, out: &mut String) -> BuildResult<()> {
    if s.contains('\0') {
        return Err(BuildError::invalid("string literal cannot contain NUL"));
    }
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    Ok(())
}

/// Values with no token form (dates, uuids, json, bytes) fail in token mode.
fn quoted_only(text: &str, name: &str, mode: Mode, out: &mut String) -> BuildResult<()> {
    match mode {
        Mode::Literal => push_quoted(text, out),
        Mode::Token => Err(BuildError::Unescapable(name.to_string())),
    }
}

fn encode_into(value: &Value, mode: Mode, out: &mut String) -> BuildResult<()> {
    match value {
        Value::Null => out.push_str("NULL"),
        Value::Bool(true) => out.push_str("TRUE"),
        Value::Bool(false) => out.push_str("FALSE"),
        Value::Int(v) => {
            let _ = write!(out, "{v}");
        }
        Value::BigInt(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Float(v) if v.is_finite() => {
            let _ = write!(out, "{v}");
        }
        Value::Float(v) => {
            let text = if v.is_nan() {
                "NaN"
            } else if v.is_sign_positive() {
                "Infinity"
            } else {
                "-Infinity"
            };
            match mode {
                Mode::Literal => {
                    let _ = write!(out, "'{text}'::float8");
                }
                Mode::Token => return Err(BuildError::Unescapable("non-finite float".into())),
            }
        }
        #[cfg(feature = "rust_decimal")]
        Value::Decimal(v) => {
            let _ = write!(out, "{v}");
        }
        Value::Text(s) => match mode {
            Mode::Literal => push_quoted(s, out)?,
            Mode::Token => {
                if s.contains('\0') {
                    return Err(BuildError::invalid("string token cannot contain NUL"));
                }
                out.push_str(s);
            }
        },
        Value::Bytes(bytes) => {
            if mode == Mode::Token {
                return Err(BuildError::Unescapable("bytes".into()));
            }
            out.push_str("'\\x");
            for b in bytes {
                let _ = write!(out, "{b:02x}");
            }
            out.push_str("'::bytea");
        }
        Value::Date(d) => quoted_only(&d.format("%Y-%m-%d").to_string(), "date", mode, out)?,
        Value::DateTime(dt) => quoted_only(
            &dt.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            "datetime",
            mode,
            out,
        )?,
        Value::DateTimeTz(dt) => quoted_only(&dt.to_rfc3339(), "datetimetz", mode, out)?,
        Value::Time(t) => quoted_only(&t.format("%H:%M:%S%.f").to_string(), "time", mode, out)?,
        Value::Uuid(u) => quoted_only(&u.hyphenated().to_string(), "uuid", mode, out)?,
        Value::Json(j) => quoted_only(&j.to_string(), "json", mode, out)?,
        Value::List(items) => {
            if items.is_empty() {
                return Err(BuildError::EmptyList("cannot encode an empty list".into()));
            }
            if mode == Mode::Literal {
                out.push('(');
            }
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push_str(", ");
                }
                encode_into(item, mode, out)?;
            }
            if mode == Mode::Literal {
                out.push(')');
            }
        }
        Value::Deferred(d) => encode_into(&d.get(), mode, out)?,
        Value::Query(q) => {
            out.push('(');
            out.push_str(&q.statement()?);
            out.push(')');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn quote_round_trip() {
        let quoted = encode_literal(&Value::from("O'Brien")).unwrap();
        assert_eq!(quoted, "'O''Brien'");
        assert_eq!(unquote_literal(&quoted).as_deref(), Some("O'Brien"));
    }

    #[test]
    fn unquote_rejects_lone_quote() {
        assert_eq!(unquote_literal("'a'b'"), None);
        assert_eq!(unquote_literal("abc"), None);
    }

    #[test]
    fn token_mode_passes_strings_through() {
        assert_eq!(encode_token(&Value::from("o'")).unwrap(), "o'");
    }

    #[test]
    fn scalars() {
        assert_eq!(encode_literal(&Value::Null).unwrap(), "NULL");
        assert_eq!(encode_literal(&Value::from(true)).unwrap(), "TRUE");
        assert_eq!(encode_literal(&Value::from(-12)).unwrap(), "-12");
        assert_eq!(encode_literal(&Value::from(1.5)).unwrap(), "1.5");
        assert_eq!(encode_literal(&Value::from(f64::NAN)).unwrap(), "'NaN'::float8");
        assert_eq!(
            encode_literal(&Value::from(f64::NEG_INFINITY)).unwrap(),
            "'-Infinity'::float8"
        );
    }

    #[test]
    fn lists_wrap_only_in_literal_mode() {
        let v = Value::list([1, 2, 3]);
        assert_eq!(encode_literal(&v).unwrap(), "(1, 2, 3)");
        assert_eq!(encode_token(&v).unwrap(), "1, 2, 3");
    }

    #[test]
    fn empty_list_is_an_error() {
        let err = encode_literal(&Value::List(vec![])).unwrap_err();
        assert!(matches!(err, BuildError::EmptyList(_)));
    }

    #[test]
    fn dates_are_literal_only() {
        let d = Value::from(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap());
        assert_eq!(encode_literal(&d).unwrap(), "'2024-02-29'");
        let err = encode_token(&d).unwrap_err();
        assert_eq!(err.to_string(), "don't know how to escape value of type date");
    }

    #[test]
    fn json_and_bytes() {
        let j = Value::from(serde_json::json!({"a": "it's"}));
        assert_eq!(encode_literal(&j).unwrap(), r#"'{"a":"it''s"}'"#);
        let b = Value::from(&[0x0a_u8, 0xff][..]);
        assert_eq!(encode_literal(&b).unwrap(), "'\\x0aff'::bytea");
    }

    #[test]
    fn deferred_is_invoked() {
        let v = Value::deferred(|| Value::from("late"));
        assert_eq!(encode_literal(&v).unwrap(), "'late'");
    }

    #[test]
    fn nul_is_rejected() {
        assert!(encode_literal(&Value::from("a\0b")).is_err());
    }

    #[test]
    fn array_columns_take_constructors() {
        let text_array = FieldType::Array(Box::new(FieldType::Text));
        assert_eq!(
            encode_column(&Value::from(vec!["a", "b"]), &text_array).unwrap(),
            "ARRAY['a', 'b']"
        );
        assert_eq!(
            encode_column(&Value::List(vec![]), &text_array).unwrap(),
            "'{}'"
        );
        assert_eq!(
            encode_column(&Value::Null, &text_array).unwrap(),
            "NULL"
        );
        let grid = FieldType::Array(Box::new(FieldType::Array(Box::new(FieldType::Integer))));
        let rows = Value::List(vec![Value::from(vec![1, 2]), Value::from(vec![3, 4])]);
        assert_eq!(
            encode_column(&rows, &grid).unwrap(),
            "ARRAY[ARRAY[1, 2], ARRAY[3, 4]]"
        );
        assert!(encode_column(&rows, &text_array).is_err());
        assert_eq!(
            encode_column(&Value::from(vec![1, 2]), &FieldType::Integer).unwrap(),
            "(1, 2)"
        );
    }
}
