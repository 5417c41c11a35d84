//! Content addressing for messages
//!
//! Messages are content-addressed: the hash is a deterministic digest of the
//! canonically encoded message data. The algorithm is selected in one place so
//! every producer and verifier agrees on it.
//!
//! Current algorithm: **BLAKE3**, truncated to 160 bits (20 bytes).

use serde::Serialize;

use crate::errors::{HubError, HubResult};

/// Length in bytes of a message hash
pub const HASH_LENGTH: usize = 20;

/// Hash arbitrary bytes to a truncated BLAKE3 digest
pub fn hash(data: &[u8]) -> [u8; HASH_LENGTH] {
    let digest = blake3::hash(data);
    let mut output = [0u8; HASH_LENGTH];
    output.copy_from_slice(&digest.as_bytes()[..HASH_LENGTH]);
    output
}

/// Serialize to canonical DAG-CBOR bytes
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> HubResult<Vec<u8>> {
    serde_ipld_dagcbor::to_vec(value)
        .map_err(|e| HubError::parse_failure(format!("failed to encode canonical bytes: {e}")))
}

/// Serialize canonically and return the content hash
pub fn hash_canonical<T: Serialize>(value: &T) -> HubResult<[u8; HASH_LENGTH]> {
    let bytes = to_canonical_bytes(value)?;
    Ok(hash(&bytes))
}
