//! Storage encoding rules shared by both warehouse dialects.
//!
//! Hex values are stored without the `0x` prefix, lowercased, at a fixed
//! width: 40 characters for addresses, 64 for hashes. Oversized strings
//! truncate, oversized blobs drop to empty — each with a warning.

use alloy_primitives::{Address, B256};
use chrono::{TimeZone, Utc};
use ethlake_abi::{project, NamedValue};
use tracing::warn;

/// Byte blobs above this are stored empty.
pub const MAX_BLOB_BYTES: usize = 16 * 1024;
/// ABI strings above this are stored empty.
pub const MAX_ABI_BYTES: usize = 31 * 1024;
/// Method, event and parameter names cap.
pub const MAX_NAME_CHARS: usize = 256;
/// Projected parameter string values cap.
pub const MAX_VALUE_CHARS: usize = 4096;
/// At most this many parameters are persisted per row.
pub const MAX_PARAMS: usize = 5;

/// Fixed-width lowercase hex without the `0x` prefix.
///
/// Longer input is truncated with a warning; shorter input is kept as-is
/// (the fixed-width column pads it).
pub fn hex_fixed(h: &str, width: usize) -> String {
    let body = h.strip_prefix("0x").unwrap_or(h).to_lowercase();
    if body.len() > width {
        warn!(len = body.len(), width, "hex string exceeds column width");
        return body[..width].to_string();
    }
    body
}

pub fn hash_fixed(hash: &B256) -> String {
    hex_fixed(&format!("{hash:#x}"), 64)
}

pub fn address_fixed(address: &Address) -> String {
    hex_fixed(&format!("{address:#x}"), 40)
}

pub fn opt_address_fixed(address: &Option<Address>) -> String {
    address.as_ref().map(address_fixed).unwrap_or_default()
}

/// Truncate a string to `max` bytes on a char boundary, with a warning.
pub fn truncate_str(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    warn!(len = s.len(), max, "truncating string for storage");
    let mut end = max;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Empty replacement for strings over `max` bytes (ABI columns).
pub fn filter_str(s: &str, max: usize) -> &str {
    if s.len() > max {
        warn!(len = s.len(), max, "dropping oversized string");
        return "";
    }
    s
}

/// Empty replacement for blobs over `max` bytes.
pub fn filter_bytes(b: &[u8], max: usize) -> &[u8] {
    if b.len() > max {
        warn!(len = b.len(), max, "dropping oversized byte blob");
        return &[];
    }
    b
}

/// The raw input column: stored empty when the decode produced a small
/// parameter set (the params columns already carry the information),
/// otherwise capped at [`MAX_BLOB_BYTES`].
pub fn stored_input(input: &[u8], params_len: usize) -> &[u8] {
    if params_len > 0 && params_len <= MAX_PARAMS {
        &[]
    } else {
        filter_bytes(input, MAX_BLOB_BYTES)
    }
}

/// `DateTime` literal body, UTC: `2021-11-24 13:47:16`.
pub fn format_datetime(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "1970-01-01 00:00:00".into())
}

/// `Date` literal body, UTC: `2021-11-24`.
pub fn format_date(secs: i64) -> String {
    Utc.timestamp_opt(secs, 0)
        .single()
        .map(|t| t.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".into())
}

/// One parameter in its storage form.
#[derive(Debug, Clone, Default)]
pub struct StoredParam {
    pub name: String,
    pub text: String,
    pub number: f64,
}

/// Project and cap a parameter list for storage. At most
/// [`MAX_PARAMS`] survive; the projection handles the per-value rules.
pub fn stored_params(params: &[NamedValue]) -> Vec<StoredParam> {
    params
        .iter()
        .take(MAX_PARAMS)
        .map(|p| {
            let projected = project(&p.value);
            StoredParam {
                name: truncate_str(&p.name, MAX_NAME_CHARS).to_string(),
                text: truncate_str(&projected.text, MAX_VALUE_CHARS).to_string(),
                number: projected.number,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethlake_abi::Value;

    #[test]
    fn hex_fixed_strips_prefix_and_lowercases() {
        assert_eq!(
            hex_fixed("0x6B175474E89094C44Da98b954EedeAC495271d0F", 40),
            "6b175474e89094c44da98b954eedeac495271d0f"
        );
    }

    #[test]
    fn hex_fixed_is_idempotent() {
        let once = hex_fixed("0xAbCd", 40);
        assert_eq!(hex_fixed(&once, 40), once);
    }

    #[test]
    fn hex_fixed_truncates_oversize() {
        assert_eq!(hex_fixed("0xaabbcc", 4), "aabb");
    }

    #[test]
    fn address_fixed_width() {
        let addr: Address = "0x6b175474e89094c44da98b954eedeac495271d0f"
            .parse()
            .unwrap();
        let fixed = address_fixed(&addr);
        assert_eq!(fixed.len(), 40);
        assert!(!fixed.starts_with("0x"));
    }

    #[test]
    fn missing_to_address_is_empty() {
        assert_eq!(opt_address_fixed(&None), "");
    }

    #[test]
    fn stored_input_elided_when_params_fit() {
        let input = vec![1u8; 100];
        assert!(stored_input(&input, 3).is_empty());
        assert!(stored_input(&input, 5).is_empty());
        assert_eq!(stored_input(&input, 0), &input[..]);
        assert_eq!(stored_input(&input, 6), &input[..]);
    }

    #[test]
    fn stored_input_drops_oversized_blob() {
        let input = vec![1u8; MAX_BLOB_BYTES + 1];
        assert!(stored_input(&input, 0).is_empty());
    }

    #[test]
    fn datetime_formatting() {
        assert_eq!(format_datetime(1_637_761_636), "2021-11-24 13:47:16");
        assert_eq!(format_date(1_637_761_636), "2021-11-24");
    }

    #[test]
    fn stored_params_caps_at_five() {
        let params: Vec<NamedValue> = (0..7)
            .map(|i| NamedValue {
                name: format!("p{i}"),
                kind: "uint256".into(),
                value: Value::Uint(i),
            })
            .collect();
        let stored = stored_params(&params);
        assert_eq!(stored.len(), 5);
        assert_eq!(stored[0].number, 0.0);
        assert_eq!(stored[4].name, "p4");
    }

    #[test]
    fn stored_params_projects_mixed_kinds() {
        let params = vec![
            NamedValue {
                name: "ok".into(),
                kind: "bool".into(),
                value: Value::Bool(true),
            },
            NamedValue {
                name: "payload".into(),
                kind: "bytes".into(),
                value: Value::Bytes(vec![0xff]),
            },
        ];
        let stored = stored_params(&params);
        assert_eq!(stored[0].number, 1.0);
        assert_eq!(stored[1].text, "0xff");
    }
}
