//! Error types for ABI parsing and decoding.

use thiserror::Error;

/// Errors from ABI parsing or payload decoding.
///
/// All of these are recoverable from the pipeline's point of view: the
/// affected transaction or log is stored with method/event `"UNKNOWN"` and
/// processing continues.
#[derive(Debug, Error)]
pub enum AbiError {
    /// The ABI string is not a JSON array at all.
    #[error("invalid ABI JSON: {reason}")]
    InvalidJson { reason: String },

    /// Input shorter than the 4-byte selector; nothing to decode.
    #[error("input too short for a method selector: {len} bytes")]
    ShortInput { len: usize },

    /// No method with this selector in the standard or contract tables.
    #[error("unknown method selector 0x{selector}")]
    UnknownMethod { selector: String },

    /// No event with this topic-0 in the standard or contract tables.
    #[error("unknown event topic {topic}")]
    UnknownEvent { topic: String },

    /// Log carries no topics; anonymous events are not decoded.
    #[error("log has no topics")]
    AnonymousLog,

    /// A parameter type in the ABI could not be resolved to a solidity type.
    #[error("unresolvable ABI type: {reason}")]
    TypeResolution { reason: String },

    /// The ABIv2 payload itself is inconsistent (bad offset, short tail, ...).
    #[error("ABI decode failed: {reason}")]
    DecodeFailed { reason: String },
}
