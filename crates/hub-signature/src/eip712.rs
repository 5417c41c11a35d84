//! EIP-712 custody signatures
//!
//! SignerAdd and SignerRemove are signed by the account's Ethereum custody
//! address rather than a delegated Ed25519 key. The custody wallet signs the
//! typed-data struct `MessageData(bytes hash)` under a fixed domain, and the
//! signing address is recovered from the 65-byte `r || s || v` signature.

use hub_core::{HubError, HubResult};
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use tiny_keccak::{Hasher, Keccak};

use crate::validations::{ETH_ADDRESS_LENGTH, ETH_SIGNATURE_LENGTH};

pub const DOMAIN_NAME: &str = "Farcaster Verify Ethereum Address";
pub const DOMAIN_VERSION: &str = "2.0.0";
/// Fixed domain salt
pub const DOMAIN_SALT: [u8; 32] = [
    0xf2, 0xd8, 0x57, 0xf4, 0xa3, 0xed, 0xcb, 0x9b, 0x78, 0xb4, 0xd5, 0x03, 0xbf, 0xe7, 0x33,
    0xdb, 0x1e, 0x3f, 0x6c, 0xdc, 0x2b, 0x79, 0x71, 0xee, 0x73, 0x96, 0x26, 0xc9, 0x7e, 0x86,
    0xa5, 0x58,
];

const DOMAIN_TYPE: &str = "EIP712Domain(string name,string version,bytes32 salt)";
const MESSAGE_DATA_TYPE: &str = "MessageData(bytes hash)";

/// Keccak-256 of the input bytes
pub fn keccak256(data: &[u8]) -> [u8; 32] {
    let mut k = Keccak::v256();
    let mut out = [0u8; 32];
    k.update(data);
    k.finalize(&mut out);
    out
}

fn domain_separator() -> [u8; 32] {
    let mut encoded = Vec::with_capacity(32 * 4);
    encoded.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_NAME.as_bytes()));
    encoded.extend_from_slice(&keccak256(DOMAIN_VERSION.as_bytes()));
    encoded.extend_from_slice(&DOMAIN_SALT);
    keccak256(&encoded)
}

/// Typed-data digest a custody address signs for a message hash
///
/// `keccak256(0x19 0x01 || domain_separator || keccak256(type_hash || keccak256(hash)))`
pub fn message_hash_digest(hash: &[u8]) -> [u8; 32] {
    let mut struct_encoded = [0u8; 64];
    struct_encoded[..32].copy_from_slice(&keccak256(MESSAGE_DATA_TYPE.as_bytes()));
    struct_encoded[32..].copy_from_slice(&keccak256(hash));
    let struct_hash = keccak256(&struct_encoded);

    let mut digest_input = [0u8; 66];
    digest_input[..2].copy_from_slice(&[0x19, 0x01]);
    digest_input[2..34].copy_from_slice(&domain_separator());
    digest_input[34..].copy_from_slice(&struct_hash);
    keccak256(&digest_input)
}

/// Ethereum address of a secp256k1 key: the last 20 bytes of
/// `keccak256(x || y)`
pub fn eth_address(key: &VerifyingKey) -> [u8; ETH_ADDRESS_LENGTH] {
    let point = key.as_affine().to_encoded_point(false);
    let hash = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; ETH_ADDRESS_LENGTH];
    address.copy_from_slice(&hash[32 - ETH_ADDRESS_LENGTH..]);
    address
}

/// Recover the address that signed `hash` as typed data
///
/// `signature` is `r || s || v`; `v` may be 0/1 or 27/28.
pub fn recover_message_hash_signer(
    hash: &[u8],
    signature: &[u8],
) -> HubResult<[u8; ETH_ADDRESS_LENGTH]> {
    if signature.len() != ETH_SIGNATURE_LENGTH {
        return Err(HubError::validation_failure(format!(
            "eip712 signature must be {ETH_SIGNATURE_LENGTH} bytes, got {}",
            signature.len()
        )));
    }
    let (rs, v) = signature.split_at(64);
    let parsed = Signature::from_slice(rs)
        .map_err(|_| HubError::validation_failure("malformed eip712 signature"))?;
    let v = if v[0] >= 27 { v[0] - 27 } else { v[0] };
    let recovery_id = RecoveryId::from_byte(v).ok_or_else(|| {
        HubError::validation_failure(format!("invalid eip712 recovery id {}", signature[64]))
    })?;

    let digest = message_hash_digest(hash);
    let key = VerifyingKey::recover_from_prehash(&digest, &parsed, recovery_id)
        .map_err(|_| HubError::validation_failure("eip712 signer could not be recovered"))?;
    Ok(eth_address(&key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keccak_of_empty_input() {
        assert_eq!(
            hub_core::to_hex(&keccak256(b"")),
            "0xc5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470"
        );
    }

    #[test]
    fn digest_depends_on_the_hash() {
        assert_ne!(message_hash_digest(&[1u8; 20]), message_hash_digest(&[2u8; 20]));
        assert_eq!(message_hash_digest(&[1u8; 20]), message_hash_digest(&[1u8; 20]));
    }

    #[test]
    fn short_or_garbage_signatures_are_validation_failures() {
        let err = recover_message_hash_signer(&[0u8; 20], &[0u8; 64]).unwrap_err();
        assert_eq!(err.code, hub_core::HubErrorCode::ValidationFailure);

        let mut bad_v = [1u8; 65];
        bad_v[64] = 40;
        let err = recover_message_hash_signer(&[0u8; 20], &bad_v).unwrap_err();
        assert!(err.message.contains("recovery id"), "{err}");
    }
}
