//! Field accessors used by the normalizer. Each accessor takes the list of
//! accepted spellings for one concept, canonical name first, and returns the
//! first one holding a usable value. Null, empty strings and empty arrays
//! count as absent.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::Value;

fn find_map<'a, T>(
    raw: &'a Value,
    keys: &[&str],
    f: impl FnMut(&'a Value) -> Option<T>,
) -> Option<T> {
    keys.iter().filter_map(|key| raw.get(*key)).find_map(f)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn text(raw: &Value, keys: &[&str]) -> Option<String> {
    find_map(raw, keys, scalar_text)
}

pub fn text_or_empty(raw: &Value, keys: &[&str]) -> String {
    text(raw, keys).unwrap_or_default()
}

/// Parses a finite number from a JSON number or a numeric string. Accepts a
/// decimal comma ("0,35").
pub fn parse_number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.replace(',', ".").parse::<f64>().ok()
            }
        }
        Value::Object(map) => map
            .get("valor")
            .or_else(|| map.get("value"))
            .and_then(parse_number),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn number(raw: &Value, keys: &[&str]) -> Option<f64> {
    find_map(raw, keys, parse_number)
}

/// Finite numeric readings from the first non-empty array among `keys`.
/// Non-finite, blank and non-numeric entries are dropped.
pub fn numbers(raw: &Value, keys: &[&str]) -> Vec<f64> {
    find_map(raw, keys, |value| match value {
        Value::Array(items) if !items.is_empty() => Some(items),
        _ => None,
    })
    .map(|items| items.iter().filter_map(parse_number).collect())
    .unwrap_or_default()
}

pub fn array<'a>(raw: &'a Value, keys: &[&str]) -> &'a [Value] {
    find_map(raw, keys, |value| match value {
        Value::Array(items) if !items.is_empty() => Some(items.as_slice()),
        _ => None,
    })
    .unwrap_or(&[])
}

pub fn boolean(raw: &Value, keys: &[&str]) -> Option<bool> {
    find_map(raw, keys, |value| match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    })
}

/// Structured payloads (diffs, contexts) pass through untouched.
pub fn json(raw: &Value, keys: &[&str]) -> Value {
    find_map(raw, keys, |value| (!value.is_null()).then(|| value.clone())).unwrap_or(Value::Null)
}

/// Accepts RFC 3339, naive "YYYY-MM-DD HH:MM:SS" (read as UTC), plain dates
/// and epoch milliseconds.
pub fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(parsed) = DateTime::parse_from_rfc3339(s) {
                return Some(parsed.with_timezone(&Utc));
            }
            for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"] {
                if let Ok(naive) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(naive.and_utc());
                }
            }
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
        _ => None,
    }
}

pub fn timestamp(raw: &Value, keys: &[&str]) -> Option<DateTime<Utc>> {
    find_map(raw, keys, parse_timestamp)
}

/// Upper-cased enum token with accents folded and separators unified, so
/// "Lab tintas", "lab-tintas" and "LAB_TINTAS" compare equal.
pub fn canonical_token(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut last_was_sep = false;
    for ch in input.trim().chars() {
        let folded = match ch {
            'á' | 'à' | 'â' | 'ã' | 'ä' | 'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' | 'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' | 'Ç' => 'C',
            ' ' | '-' | '.' | '/' | '_' => '_',
            other => other.to_ascii_uppercase(),
        };
        if folded == '_' {
            if !last_was_sep && !out.is_empty() {
                out.push('_');
            }
            last_was_sep = true;
        } else {
            out.push(folded);
            last_was_sep = false;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    out
}

pub fn token(raw: &Value, keys: &[&str]) -> Option<String> {
    text(raw, keys)
        .map(|t| canonical_token(&t))
        .filter(|t| !t.is_empty())
}
