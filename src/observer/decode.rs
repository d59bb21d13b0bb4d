//! Payload decoding
//!
//! A payload that does not match the expected schema is a protocol
//! mismatch, never convergence lag, so decode failures are always fatal.

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// Any `kind: List` / `kind: XxxList` document
#[derive(Debug, Clone, Deserialize)]
#[serde(bound = "T: DeserializeOwned")]
pub struct ResourceList<T> {
    #[serde(default)]
    pub items: Vec<T>,
}

/// Decode a JSON payload as `T`, reporting `kind` and the payload on failure
pub fn decode<T: DeserializeOwned>(kind: &str, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|source| Error::Decode {
        kind: kind.to_string(),
        payload: payload.to_string(),
        source,
    })
}

/// Decode a list payload into its items
pub fn decode_list<T: DeserializeOwned>(kind: &str, payload: &str) -> Result<Vec<T>> {
    decode::<ResourceList<T>>(&format!("{}List", kind), payload).map(|list| list.items)
}
