//! Projection of decoded values to the flat storage row.
//!
//! The warehouse stores each parameter as one UTF-8 string column plus one
//! f64 column; exactly one of the two is populated. This module is the pure
//! function from a [`Value`] tree to that pair.

use tracing::warn;

use crate::value::Value;

/// Largest integer exactly representable in an f64.
const F64_EXACT_MAX: u128 = 1 << 53;

/// Longest stored string value; anything beyond is truncated.
const MAX_TEXT_BYTES: usize = 4096;

/// A value projected to its storage form.
///
/// Scalar numbers and booleans land in `number`; everything else lands in
/// `text` with `number == 0.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProjectedValue {
    pub text: String,
    pub number: f64,
}

impl ProjectedValue {
    fn text(s: String) -> Self {
        Self {
            text: truncate_utf8(s, MAX_TEXT_BYTES),
            number: 0.0,
        }
    }

    fn number(n: f64) -> Self {
        Self {
            text: String::new(),
            number: n,
        }
    }
}

/// Project a decoded value for storage.
pub fn project(value: &Value) -> ProjectedValue {
    match value {
        Value::Bool(b) => ProjectedValue::number(if *b { 1.0 } else { 0.0 }),
        Value::Uint(u) => {
            if *u > F64_EXACT_MAX {
                warn!(value = %u, "uint exceeds 2^53, f64 projection loses precision");
            }
            ProjectedValue::number(*u as f64)
        }
        Value::Int(i) => {
            if i.unsigned_abs() > F64_EXACT_MAX {
                warn!(value = %i, "int exceeds 2^53, f64 projection loses precision");
            }
            ProjectedValue::number(*i as f64)
        }
        Value::BigUint(s) | Value::BigInt(s) => {
            // Decimal string of an integer wider than u128; parse lossily.
            match s.parse::<f64>() {
                Ok(f) => {
                    warn!(value = %s, "big integer projected to f64 with precision loss");
                    ProjectedValue::number(f)
                }
                Err(_) => ProjectedValue::text(s.clone()),
            }
        }
        Value::Bytes(b) => ProjectedValue::text(format!("0x{}", hex::encode(b))),
        Value::Str(s) => ProjectedValue::text(s.clone()),
        Value::Address(a) => ProjectedValue::text(a.to_lowercase()),
        Value::Array(_) | Value::Tuple(_) => ProjectedValue::text(value.to_json().to_string()),
        Value::Null => ProjectedValue::default(),
    }
}

/// Truncate to at most `max` bytes on a char boundary.
fn truncate_utf8(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    warn!(len = s.len(), max, "truncating oversized string value");
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bool_projects_to_one_and_zero() {
        assert_eq!(project(&Value::Bool(true)).number, 1.0);
        assert_eq!(project(&Value::Bool(false)).number, 0.0);
        assert!(project(&Value::Bool(true)).text.is_empty());
    }

    #[test]
    fn uint_projects_to_number() {
        let p = project(&Value::Uint(1_000_000));
        assert_eq!(p.number, 1_000_000.0);
        assert!(p.text.is_empty());
    }

    #[test]
    fn big_uint_still_becomes_a_number() {
        // One wei short of 2^256; representable only approximately.
        let p = project(&Value::BigUint(
            "115792089237316195423570985008687907853269984665640564039457584007913129639935"
                .into(),
        ));
        assert!(p.number > 1e77);
        assert!(p.text.is_empty());
    }

    #[test]
    fn bytes_project_to_prefixed_hex() {
        let p = project(&Value::Bytes(vec![0xab, 0xcd]));
        assert_eq!(p.text, "0xabcd");
        assert_eq!(p.number, 0.0);
    }

    #[test]
    fn address_projection_is_idempotent() {
        let addr = "0x6b175474e89094c44da98b954eedeac495271d0f";
        let once = project(&Value::Address(addr.into()));
        let twice = project(&Value::Address(once.text.clone()));
        assert_eq!(once.text, addr);
        assert_eq!(once, twice);
    }

    #[test]
    fn tuple_projects_to_json() {
        let v = Value::Tuple(vec![
            ("to".into(), Value::Address("0xabc".into())),
            ("data".into(), Value::Bytes(vec![1])),
        ]);
        assert_eq!(project(&v).text, r#"{"to":"0xabc","data":"0x01"}"#);
    }

    #[test]
    fn oversized_string_is_truncated() {
        let p = project(&Value::Str("x".repeat(5000)));
        assert_eq!(p.text.len(), 4096);
    }

    #[test]
    fn hex_round_trip_of_byte_params() {
        let original = vec![0u8, 255, 7, 128];
        let p = project(&Value::Bytes(original.clone()));
        let back = hex::decode(p.text.trim_start_matches("0x")).unwrap();
        assert_eq!(back, original);
    }
}
