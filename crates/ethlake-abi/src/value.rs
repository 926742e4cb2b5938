//! Decoded parameter values.
//!
//! A decoded ABI value is a tree: tuples containing arrays containing
//! tuples. [`Value`] is the owned, chain-agnostic form of that tree;
//! [`normalize`] maps alloy's `DynSolValue` into it.

use alloy_core::dyn_abi::DynSolValue;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A decoded, normalized ABI value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Value {
    Uint(u128),
    /// Uints wider than u128 kept as decimal strings.
    BigUint(String),
    Int(i128),
    /// Ints wider than i128 kept as decimal strings.
    BigInt(String),
    Bool(bool),
    Bytes(Vec<u8>),
    Str(String),
    /// 20-byte address as lowercased hex with `0x` prefix.
    Address(String),
    Array(Vec<Value>),
    Tuple(Vec<(String, Value)>),
    Null,
}

impl Value {
    /// Serialize to JSON with every inner byte sequence hex-encoded.
    ///
    /// Addresses are already hex text and are not re-encoded.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Uint(v) => serde_json::json!(v),
            Value::BigUint(s) | Value::BigInt(s) => serde_json::Value::String(s.clone()),
            Value::Int(v) => serde_json::json!(v),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Bytes(b) => serde_json::Value::String(format!("0x{}", hex::encode(b))),
            Value::Str(s) => serde_json::Value::String(s.clone()),
            Value::Address(a) => serde_json::Value::String(a.clone()),
            Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Tuple(fields) => {
                let map: serde_json::Map<String, serde_json::Value> = fields
                    .iter()
                    .map(|(name, v)| (name.clone(), v.to_json()))
                    .collect();
                serde_json::Value::Object(map)
            }
            Value::Null => serde_json::Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Uint(v) => write!(f, "{v}"),
            Value::BigUint(v) | Value::BigInt(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Bytes(b) => write!(f, "0x{}", hex::encode(b)),
            Value::Str(s) => write!(f, "{s}"),
            Value::Address(a) => write!(f, "{a}"),
            Value::Array(_) | Value::Tuple(_) => write!(f, "{}", self.to_json()),
            Value::Null => write!(f, "null"),
        }
    }
}

/// A decoded parameter: declaration name, solidity type tag, value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    /// Solidity type as written in the ABI, e.g. `uint256`, `address[]`.
    pub kind: String,
    pub value: Value,
}

/// Convert a decoded `DynSolValue` into a [`Value`].
pub fn normalize(val: DynSolValue) -> Value {
    match val {
        DynSolValue::Bool(b) => Value::Bool(b),

        DynSolValue::Int(i, bits) => {
            if bits <= 128 {
                match i128::try_from(i) {
                    Ok(v) => Value::Int(v),
                    Err(_) => Value::BigInt(i.to_string()),
                }
            } else {
                Value::BigInt(i.to_string())
            }
        }

        DynSolValue::Uint(u, bits) => {
            if bits <= 128 {
                match u128::try_from(u) {
                    Ok(v) => Value::Uint(v),
                    Err(_) => Value::BigUint(u.to_string()),
                }
            } else {
                Value::BigUint(u.to_string())
            }
        }

        DynSolValue::FixedBytes(bytes, size) => Value::Bytes(bytes[..size].to_vec()),
        DynSolValue::Bytes(b) => Value::Bytes(b),
        DynSolValue::String(s) => Value::Str(s),

        // `{:#x}` renders plain lowercase hex, which is the storage form.
        DynSolValue::Address(a) => Value::Address(format!("{a:#x}")),

        DynSolValue::Array(vals) | DynSolValue::FixedArray(vals) => {
            Value::Array(vals.into_iter().map(normalize).collect())
        }

        DynSolValue::Tuple(fields) => {
            // Unnamed tuple fields get positional names "0", "1", ...
            let named: Vec<(String, Value)> = fields
                .into_iter()
                .enumerate()
                .map(|(i, v)| (i.to_string(), normalize(v)))
                .collect();
            Value::Tuple(named)
        }

        DynSolValue::Function(func) => Value::Bytes(func.as_slice().to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, I256, U256};

    #[test]
    fn normalize_small_uint() {
        let v = normalize(DynSolValue::Uint(U256::from(42u64), 256));
        assert_eq!(v, Value::Uint(42));
    }

    #[test]
    fn normalize_huge_uint_as_string() {
        let u = U256::MAX;
        let v = normalize(DynSolValue::Uint(u, 256));
        assert_eq!(v, Value::BigUint(u.to_string()));
    }

    #[test]
    fn normalize_negative_int() {
        let i = I256::try_from(-7i64).unwrap();
        let v = normalize(DynSolValue::Int(i, 128));
        assert_eq!(v, Value::Int(-7));
    }

    #[test]
    fn normalize_address_is_lowercase_hex() {
        let addr: Address = "0xD8dA6BF26964aF9D7eEd9e03E53415D37aA96045"
            .parse()
            .unwrap();
        let v = normalize(DynSolValue::Address(addr));
        assert_eq!(
            v,
            Value::Address("0xd8da6bf26964af9d7eed9e03e53415d37aa96045".into())
        );
    }

    #[test]
    fn fixed_bytes_keep_declared_width() {
        let mut word = [0u8; 32];
        word[0] = 0xde;
        word[1] = 0xad;
        let v = normalize(DynSolValue::FixedBytes(word.into(), 4));
        assert_eq!(v, Value::Bytes(vec![0xde, 0xad, 0, 0]));
    }

    #[test]
    fn composite_json_hex_encodes_inner_bytes() {
        let v = Value::Array(vec![
            Value::Bytes(vec![1, 2]),
            Value::Tuple(vec![("x".into(), Value::Uint(9))]),
        ]);
        assert_eq!(v.to_json().to_string(), r#"["0x0102",{"x":9}]"#);
    }
}
