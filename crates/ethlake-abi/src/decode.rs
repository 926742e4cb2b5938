//! Transaction-input and event-log decoding.
//!
//! # Layout
//! - Calldata: 4-byte selector, then the ABIv2-encoded input tuple
//!   (head/tail partitioning, 32-byte slots, offset-prefixed dynamic types).
//! - Logs: `topics[0]` is the event selector; indexed parameters occupy
//!   `topics[1..]` (one 32-byte word each), non-indexed parameters are the
//!   ABI-encoded `data` payload.
//!
//! Indexed parameters of reference type (string, bytes, arrays, tuples) are
//! stored on-chain as the keccak-256 of their encoding; the original value
//! is unrecoverable, so they surface as the raw 32-byte digest.

use alloy_core::dyn_abi::{DynSolType, DynSolValue, Specifier};
use alloy_json_abi::{Event, Function};
use alloy_primitives::B256;

use crate::error::AbiError;
use crate::value::{normalize, NamedValue};

/// A decoded method call or event occurrence.
#[derive(Debug, Clone)]
pub struct DecodedData {
    /// Method or event name from the ABI.
    pub name: String,
    pub params: Vec<NamedValue>,
}

/// Decode transaction calldata against a method signature.
///
/// `input` is the full calldata including the selector prefix.
pub fn decode_input(func: &Function, input: &[u8]) -> Result<DecodedData, AbiError> {
    if input.len() < 4 {
        return Err(AbiError::ShortInput { len: input.len() });
    }

    let (names, types) = resolve_params(func.inputs.iter().map(|p| (p.name.as_str(), p)))?;
    let values = decode_param_tuple(&input[4..], &types)?;

    Ok(DecodedData {
        name: func.name.clone(),
        params: zip_named(names, types, values),
    })
}

/// Decode an event log against an event signature.
///
/// `topics` must include topic-0; anonymous logs are rejected before this
/// point.
pub fn decode_log(event: &Event, topics: &[B256], data: &[u8]) -> Result<DecodedData, AbiError> {
    if topics.is_empty() {
        return Err(AbiError::AnonymousLog);
    }

    // Split declaration-ordered inputs into topic-backed and data-backed.
    let indexed: Vec<_> = event.inputs.iter().filter(|p| p.indexed).collect();
    let body: Vec<_> = event.inputs.iter().filter(|p| !p.indexed).collect();

    let mut topic_values = Vec::with_capacity(indexed.len());
    for (i, param) in indexed.iter().enumerate() {
        let topic = topics.get(i + 1).ok_or_else(|| AbiError::DecodeFailed {
            reason: format!(
                "event {} declares {} indexed params but log has {} topics",
                event.name,
                indexed.len(),
                topics.len() - 1
            ),
        })?;
        let ty = param.resolve_dyn()?;
        topic_values.push(decode_topic(topic, &ty)?);
    }

    let (body_names, body_types) =
        resolve_params(body.iter().map(|p| (p.name.as_str(), *p)))?;
    let body_values = decode_param_tuple(data, &body_types)?;
    let mut body_named = zip_named(body_names, body_types, body_values).into_iter();
    let mut topic_named = indexed
        .iter()
        .zip(topic_values)
        .map(|(p, v)| NamedValue {
            name: p.name.clone(),
            kind: p.ty.clone(),
            value: v,
        });

    // Re-interleave into declaration order.
    let params = event
        .inputs
        .iter()
        .map(|p| {
            if p.indexed {
                topic_named.next().expect("indexed param count verified")
            } else {
                body_named.next().expect("body param count verified")
            }
        })
        .collect();

    Ok(DecodedData {
        name: event.name.clone(),
        params,
    })
}

/// Decode one 32-byte indexed topic word.
fn decode_topic(topic: &B256, ty: &DynSolType) -> Result<crate::value::Value, AbiError> {
    // Reference types are hashed in indexed position; keep the digest.
    if matches!(
        ty,
        DynSolType::String
            | DynSolType::Bytes
            | DynSolType::Array(_)
            | DynSolType::FixedArray(..)
            | DynSolType::Tuple(_)
    ) {
        return Ok(crate::value::Value::Bytes(topic.to_vec()));
    }

    // Value types (incl. addresses, right-aligned in the word) ABI-decode
    // from exactly one slot.
    let val = ty
        .abi_decode(topic.as_slice())
        .map_err(|e| AbiError::DecodeFailed {
            reason: format!("topic decode: {e}"),
        })?;
    Ok(normalize(val))
}

/// ABI-decode a parameter sequence and return the values in order.
fn decode_param_tuple(data: &[u8], types: &[DynSolType]) -> Result<Vec<DynSolValue>, AbiError> {
    if types.is_empty() {
        return Ok(vec![]);
    }
    let tuple = DynSolType::Tuple(types.to_vec());
    let decoded = tuple
        .abi_decode_params(data)
        .map_err(|e| AbiError::DecodeFailed {
            reason: e.to_string(),
        })?;
    match decoded {
        DynSolValue::Tuple(vals) => Ok(vals),
        other => Ok(vec![other]),
    }
}

type ResolvedParams = (Vec<String>, Vec<DynSolType>);

/// Resolve (name, solidity-type) pairs; unnamed params become `arg{i}`.
fn resolve_params<'a, T, I>(params: I) -> Result<ResolvedParams, AbiError>
where
    T: TypedParam + 'a,
    I: Iterator<Item = (&'a str, &'a T)>,
{
    let mut names = Vec::new();
    let mut types = Vec::new();
    for (i, (name, param)) in params.enumerate() {
        names.push(if name.is_empty() {
            format!("arg{i}")
        } else {
            name.to_string()
        });
        types.push(param.resolve_dyn()?);
    }
    Ok((names, types))
}

fn zip_named(names: Vec<String>, types: Vec<DynSolType>, values: Vec<DynSolValue>) -> Vec<NamedValue> {
    names
        .into_iter()
        .zip(types)
        .zip(values)
        .map(|((name, ty), val)| NamedValue {
            name,
            kind: ty.sol_type_name().into_owned(),
            value: normalize(val),
        })
        .collect()
}

/// Internal bridge so functions and event params share resolution.
trait TypedParam {
    fn resolve_dyn(&self) -> Result<DynSolType, AbiError>;
}

impl TypedParam for alloy_json_abi::Param {
    fn resolve_dyn(&self) -> Result<DynSolType, AbiError> {
        self.resolve().map_err(|e| AbiError::TypeResolution {
            reason: e.to_string(),
        })
    }
}

impl TypedParam for alloy_json_abi::EventParam {
    fn resolve_dyn(&self) -> Result<DynSolType, AbiError> {
        self.resolve().map_err(|e| AbiError::TypeResolution {
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::AbiTables;
    use crate::value::Value;

    const TRANSFER_ABI: &str = r#"[
        {
            "name": "transfer",
            "type": "function",
            "inputs": [
                {"name": "to", "type": "address"},
                {"name": "amount", "type": "uint256"}
            ],
            "outputs": [{"name": "", "type": "bool"}],
            "stateMutability": "nonpayable"
        },
        {
            "name": "Transfer",
            "type": "event",
            "anonymous": false,
            "inputs": [
                {"name": "from", "type": "address", "indexed": true},
                {"name": "to", "type": "address", "indexed": true},
                {"name": "value", "type": "uint256", "indexed": false}
            ]
        }
    ]"#;

    fn transfer_calldata() -> Vec<u8> {
        let mut calldata = hex::decode("a9059cbb").unwrap();
        calldata.extend(
            hex::decode("000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa96045")
                .unwrap(),
        );
        calldata.extend(
            hex::decode("00000000000000000000000000000000000000000000000000000000000f4240")
                .unwrap(),
        );
        calldata
    }

    #[test]
    fn decode_transfer_input() {
        let tables = AbiTables::parse(TRANSFER_ABI).unwrap();
        let func = tables.method(&[0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        let decoded = decode_input(func, &transfer_calldata()).unwrap();

        assert_eq!(decoded.name, "transfer");
        assert_eq!(decoded.params.len(), 2);
        assert_eq!(decoded.params[0].name, "to");
        assert_eq!(decoded.params[0].kind, "address");
        assert_eq!(
            decoded.params[0].value,
            Value::Address("0xd8da6bf26964af9d7eed9e03e53415d37aa96045".into())
        );
        assert_eq!(decoded.params[1].value, Value::Uint(1_000_000));
    }

    #[test]
    fn truncated_calldata_is_an_error_not_a_panic() {
        let tables = AbiTables::parse(TRANSFER_ABI).unwrap();
        let func = tables.method(&[0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        let calldata = &transfer_calldata()[..20];
        assert!(matches!(
            decode_input(func, calldata),
            Err(AbiError::DecodeFailed { .. })
        ));
    }

    #[test]
    fn decode_transfer_log() {
        let tables = AbiTables::parse(TRANSFER_ABI).unwrap();
        let topic0: B256 =
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
                .parse()
                .unwrap();
        let event = tables.event(&topic0).unwrap();

        let topics = vec![
            topic0,
            "0x000000000000000000000000d8da6bf26964af9d7eed9e03e53415d37aa96045"
                .parse()
                .unwrap(),
            "0x000000000000000000000000ab5801a7d398351b8be11c439e05c5b3259aec9b"
                .parse()
                .unwrap(),
        ];
        let mut data = vec![0u8; 32];
        data[24..].copy_from_slice(&1_000_000_000_000_000_000u64.to_be_bytes());

        let decoded = decode_log(event, &topics, &data).unwrap();
        assert_eq!(decoded.name, "Transfer");
        assert_eq!(decoded.params.len(), 3);
        assert_eq!(decoded.params[0].name, "from");
        assert_eq!(decoded.params[2].name, "value");
        assert_eq!(
            decoded.params[2].value,
            Value::Uint(1_000_000_000_000_000_000)
        );
    }

    #[test]
    fn missing_indexed_topic_is_an_error() {
        let tables = AbiTables::parse(TRANSFER_ABI).unwrap();
        let topic0: B256 =
            "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
                .parse()
                .unwrap();
        let event = tables.event(&topic0).unwrap();
        assert!(decode_log(event, &[topic0], &[]).is_err());
    }

    #[test]
    fn indexed_string_surfaces_as_digest() {
        let abi = r#"[{
            "name": "Named",
            "type": "event",
            "anonymous": false,
            "inputs": [{"name": "label", "type": "string", "indexed": true}]
        }]"#;
        let tables = AbiTables::parse(abi).unwrap();
        let event = tables.events.values().next().unwrap();
        let topic0 = event.selector();
        let digest = B256::repeat_byte(0x42);

        let decoded = decode_log(event, &[topic0, digest], &[]).unwrap();
        assert_eq!(decoded.params[0].value, Value::Bytes(digest.to_vec()));
    }

    #[test]
    fn decoded_input_reencodes_byte_for_byte() {
        // Round-trip law: decode then re-encode must reproduce the calldata.
        let tables = AbiTables::parse(TRANSFER_ABI).unwrap();
        let func = tables.method(&[0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        let calldata = transfer_calldata();

        let types: Vec<DynSolType> = func.inputs.iter().map(|p| p.resolve().unwrap()).collect();
        let tuple = DynSolType::Tuple(types);
        let decoded = tuple.abi_decode_params(&calldata[4..]).unwrap();
        let reencoded = decoded.abi_encode_params();
        assert_eq!(reencoded, calldata[4..]);
    }
}
