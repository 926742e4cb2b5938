//! Standard token ABIs, indexed once at process start.
//!
//! The long tail of mainnet traffic is ERC-token transfers, so the pipeline
//! checks these tables before touching the contract cache. The tables are
//! built from the embedded ERC-777, ERC-721 and ERC-1155 ABIs in that
//! order; on a selector or topic collision the first-inserted entry wins.

use alloy_json_abi::{Event, Function};
use alloy_primitives::B256;

use crate::tables::AbiTables;

const ERC777_ABI: &str = include_str!("../abis/erc777.json");
const ERC721_ABI: &str = include_str!("../abis/erc721.json");
const ERC1155_ABI: &str = include_str!("../abis/erc1155.json");

/// Process-wide standard method/event tables.
///
/// Built once and shared read-only through the services context.
#[derive(Debug, Clone)]
pub struct StandardAbi {
    tables: AbiTables,
}

impl StandardAbi {
    /// Index the embedded standard ABIs.
    ///
    /// The embedded JSON is compiled in; a parse failure here is a build
    /// defect, not a runtime condition.
    pub fn load() -> Self {
        let mut tables = AbiTables::default();
        for abi in [ERC777_ABI, ERC721_ABI, ERC1155_ABI] {
            let parsed = AbiTables::parse(abi).expect("embedded standard ABI must parse");
            tables.merge(parsed);
        }
        Self { tables }
    }

    pub fn method(&self, selector: &[u8; 4]) -> Option<&Function> {
        self.tables.method(selector)
    }

    pub fn event(&self, topic: &B256) -> Option<&Event> {
        self.tables.event(topic)
    }

    pub fn method_count(&self) -> usize {
        self.tables.methods.len()
    }

    pub fn event_count(&self) -> usize {
        self.tables.events.len()
    }
}

impl Default for StandardAbi {
    fn default() -> Self {
        Self::load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tables_are_populated() {
        let std = StandardAbi::load();
        assert!(std.method_count() >= 20);
        assert!(std.event_count() >= 10);
    }

    #[test]
    fn erc721_transfer_topic_is_indexed() {
        let std = StandardAbi::load();
        // keccak256("Transfer(address,address,uint256)"), shared with ERC-20
        let topic: B256 = "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef"
            .parse()
            .unwrap();
        let event = std.event(&topic).unwrap();
        assert_eq!(event.name, "Transfer");
        // the ERC-721 flavor: all three params indexed
        assert!(event.inputs.iter().all(|p| p.indexed));
    }

    #[test]
    fn erc1155_transfer_single_is_indexed() {
        let std = StandardAbi::load();
        let topic: B256 = "0xc3d58168c5ae7397731d063d5bbf3d657854427343f4c083240f7aacaa2d0f62"
            .parse()
            .unwrap();
        assert_eq!(std.event(&topic).unwrap().name, "TransferSingle");
    }

    #[test]
    fn collision_prefers_first_standard() {
        let std = StandardAbi::load();
        // balanceOf(address) appears in both ERC-777 and ERC-721; the
        // ERC-777 entry was inserted first and must win.
        let func = std.method(&[0x70, 0xa0, 0x82, 0x31]).unwrap();
        assert_eq!(func.inputs[0].name, "owner");
    }
}
