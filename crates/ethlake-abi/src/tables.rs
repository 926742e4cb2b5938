//! Parsed ABI lookup tables.
//!
//! An ABI JSON string is turned into two maps: methods keyed by their
//! 4-byte selector (first four bytes of keccak-256 of the canonical
//! signature) and events keyed by topic-0 (the full keccak-256 digest).
//!
//! Parsing is deliberately lenient. Etherscan serves plenty of ABIs with
//! vendor extensions, missing fields, or non-standard `stateMutability`
//! tokens; a bad entry is repaired or skipped with a warning, and only a
//! payload that is not a JSON array at all fails the parse.

use std::collections::HashMap;

use alloy_json_abi::{Event, Function};
use alloy_primitives::B256;
use tracing::warn;

use crate::error::AbiError;

/// Selector/topic indexed method and event tables for one contract.
#[derive(Debug, Clone, Default)]
pub struct AbiTables {
    pub methods: HashMap<[u8; 4], Function>,
    pub events: HashMap<B256, Event>,
}

impl AbiTables {
    /// Parse an ABI JSON string into lookup tables.
    pub fn parse(abi_json: &str) -> Result<Self, AbiError> {
        let items: Vec<serde_json::Value> =
            serde_json::from_str(abi_json).map_err(|e| AbiError::InvalidJson {
                reason: e.to_string(),
            })?;

        let mut tables = Self::default();
        for item in items {
            match item.get("type").and_then(|t| t.as_str()) {
                Some("function") => {
                    if let Some(func) = parse_function(item) {
                        tables.methods.entry(func.selector().0).or_insert(func);
                    }
                }
                Some("event") => match serde_json::from_value::<Event>(item) {
                    Ok(event) if !event.anonymous => {
                        tables.events.entry(event.selector()).or_insert(event);
                    }
                    Ok(_) => {} // anonymous events have no topic-0 to key on
                    Err(e) => warn!(error = %e, "skipping unparseable ABI event entry"),
                },
                // constructor / fallback / receive / error: nothing to index
                _ => {}
            }
        }
        Ok(tables)
    }

    /// Fold another table into this one; existing entries win.
    pub fn merge(&mut self, other: AbiTables) {
        for (sel, func) in other.methods {
            self.methods.entry(sel).or_insert(func);
        }
        for (topic, event) in other.events {
            self.events.entry(topic).or_insert(event);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty() && self.events.is_empty()
    }

    pub fn method(&self, selector: &[u8; 4]) -> Option<&Function> {
        self.methods.get(selector)
    }

    pub fn event(&self, topic: &B256) -> Option<&Event> {
        self.events.get(topic)
    }
}

/// Deserialize one function entry, repairing a non-standard
/// `stateMutability` token on the second attempt.
fn parse_function(mut item: serde_json::Value) -> Option<Function> {
    match serde_json::from_value::<Function>(item.clone()) {
        Ok(func) => Some(func),
        Err(first_err) => {
            if let Some(obj) = item.as_object_mut() {
                obj.insert("stateMutability".into(), "nonpayable".into());
            }
            match serde_json::from_value::<Function>(item) {
                Ok(func) => Some(func),
                Err(_) => {
                    warn!(error = %first_err, "skipping unparseable ABI function entry");
                    None
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ERC20_FRAGMENT: &str = r#"[
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

    #[test]
    fn parse_indexes_by_selector_and_topic() {
        let tables = AbiTables::parse(ERC20_FRAGMENT).unwrap();
        // keccak256("transfer(address,uint256)")[..4]
        let func = tables.method(&[0xa9, 0x05, 0x9c, 0xbb]).unwrap();
        assert_eq!(func.name, "transfer");

        let topic: B256 = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
            .parse()
            .unwrap();
        assert_eq!(tables.event(&topic).unwrap().name, "Transfer");
    }

    #[test]
    fn non_array_json_is_an_error() {
        assert!(matches!(
            AbiTables::parse("{\"not\": \"an abi\"}"),
            Err(AbiError::InvalidJson { .. })
        ));
    }

    #[test]
    fn unknown_state_mutability_is_repaired() {
        let abi = r#"[{
            "name": "mint",
            "type": "function",
            "inputs": [{"name": "n", "type": "uint256"}],
            "outputs": [],
            "stateMutability": "custom-nonstandard-token"
        }]"#;
        let tables = AbiTables::parse(abi).unwrap();
        assert_eq!(tables.methods.len(), 1);
    }

    #[test]
    fn anonymous_events_are_not_indexed() {
        let abi = r#"[{
            "name": "Ping",
            "type": "event",
            "anonymous": true,
            "inputs": []
        }]"#;
        let tables = AbiTables::parse(abi).unwrap();
        assert!(tables.events.is_empty());
    }

    #[test]
    fn merge_keeps_first_inserted() {
        let mut a = AbiTables::parse(ERC20_FRAGMENT).unwrap();
        let methods_before = a.methods.len();
        let b = AbiTables::parse(ERC20_FRAGMENT).unwrap();
        a.merge(b);
        assert_eq!(a.methods.len(), methods_before);
    }

    #[test]
    fn tuple_signature_flattens_components() {
        let abi = r#"[{
            "name": "submit",
            "type": "function",
            "inputs": [{
                "name": "order",
                "type": "tuple",
                "components": [
                    {"name": "maker", "type": "address"},
                    {"name": "amount", "type": "uint256"}
                ]
            }],
            "outputs": [],
            "stateMutability": "nonpayable"
        }]"#;
        let tables = AbiTables::parse(abi).unwrap();
        let func = tables.methods.values().next().unwrap();
        // canonical signature includes the flattened component types
        assert_eq!(func.signature(), "submit((address,uint256))");
    }
}
