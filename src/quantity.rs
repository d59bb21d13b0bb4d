//! Resource quantities
//!
//! Converts Kubernetes quantity strings (`1Gi`, `500M`, `1073741824`) into
//! byte counts and back. Only the suffixes used for storage sizes are
//! accepted; fractional and milli quantities are rejected.

use crate::error::{Error, Result};

pub const KIB: u64 = 1 << 10;
pub const MIB: u64 = 1 << 20;
pub const GIB: u64 = 1 << 30;
pub const TIB: u64 = 1 << 40;

const SUFFIXES: &[(&str, u64)] = &[
    ("Ki", KIB),
    ("Mi", MIB),
    ("Gi", GIB),
    ("Ti", TIB),
    ("Pi", 1 << 50),
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
    ("P", 1_000_000_000_000_000),
];

/// Parse a quantity string into bytes
pub fn parse_bytes(quantity: &str) -> Result<u64> {
    let quantity = quantity.trim();
    let (digits, multiplier) = SUFFIXES
        .iter()
        .find_map(|(suffix, mult)| quantity.strip_suffix(suffix).map(|d| (d, *mult)))
        .unwrap_or((quantity, 1));

    let value: u64 = digits
        .parse()
        .map_err(|_| Error::CapacityParse(format!("invalid quantity {:?}", quantity)))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::CapacityParse(format!("quantity {:?} overflows", quantity)))
}

/// Render a byte count as a quantity, using the largest exact binary suffix
pub fn format_bytes(bytes: u64) -> String {
    for (suffix, mult) in [("Ti", TIB), ("Gi", GIB), ("Mi", MIB), ("Ki", KIB)] {
        if bytes >= mult && bytes % mult == 0 {
            return format!("{}{}", bytes / mult, suffix);
        }
    }
    bytes.to_string()
}

/// Bytes in `n` GiB
pub const fn gib(n: u64) -> u64 {
    n * GIB
}
