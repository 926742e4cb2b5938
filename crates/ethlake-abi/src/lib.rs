//! ABI-aware decoding for the ethlake pipeline.
//!
//! Converts opaque transaction `input` bytes and event log topics+data into
//! named, typed parameter values, using the contract's ABI JSON. Everything
//! here is fault-tolerant: malformed ABIs and undecodable payloads surface
//! as [`AbiError`] values, never as panics — bad ABIs are common on mainnet.

pub mod decode;
pub mod error;
pub mod project;
pub mod standard;
pub mod tables;
pub mod value;

pub use decode::{decode_input, decode_log, DecodedData};
pub use error::AbiError;
pub use project::{project, ProjectedValue};
pub use standard::StandardAbi;
pub use tables::AbiTables;
pub use value::{normalize, NamedValue, Value};
