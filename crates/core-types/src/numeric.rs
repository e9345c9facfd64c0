//! Lenient readers for numbers in broker JSON.
//!
//! The feed is not consistent about numeric encoding: the same field can be an
//! integer, a float, a float in scientific notation, or a quoted string.

use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde_json::Value;
use std::str::FromStr;

/// Reads a JSON number or numeric string as a `Decimal`.
pub fn decimal_from_json(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                return Some(Decimal::from(i));
            }
            if let Some(u) = n.as_u64() {
                return Decimal::from_u64(u);
            }
            parse_decimal(&n.to_string()).or_else(|| n.as_f64().and_then(Decimal::from_f64))
        }
        Value::String(s) => parse_decimal(s.trim()),
        _ => None,
    }
}

/// Reads a JSON number or numeric string as an `i64`, truncating fractions.
pub fn i64_from_json(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite()).map(|f| f.trunc() as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(|f| f.trunc() as i64)
            })
        }
        _ => None,
    }
}

/// Looks up the first present key out of `keys` and reads it as a `Decimal`.
pub fn decimal_field(object: &Value, keys: &[&str]) -> Option<Decimal> {
    keys.iter()
        .find_map(|k| object.get(*k))
        .and_then(decimal_from_json)
}

fn parse_decimal(text: &str) -> Option<Decimal> {
    if text.is_empty() {
        return None;
    }
    Decimal::from_str(text)
        .or_else(|_| Decimal::from_scientific(text))
        .ok()
}
