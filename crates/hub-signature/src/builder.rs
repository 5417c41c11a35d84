//! Message signing
//!
//! Produces envelopes that pass [`crate::validate_message`]: the hash is the
//! truncated blake3 of the canonical data encoding and the signature covers
//! the hash. Delegated keys sign with Ed25519; custody addresses sign signer
//! messages with EIP-712 typed data.

use ed25519_dalek::{Signer, SigningKey};
use hub_core::{HashScheme, HubError, HubResult, Message, MessageData, SignatureScheme};

use crate::eip712;

/// Ed25519 key that signs message envelopes
#[derive(Clone)]
pub struct MessageSigner {
    key: SigningKey,
}

impl std::fmt::Debug for MessageSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageSigner")
            .field("public_key", &hub_core::to_hex(&self.public_key()))
            .finish()
    }
}

impl MessageSigner {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_bytes(secret: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(secret))
    }

    /// Raw public key bytes, as carried in `Message::signer`
    pub fn public_key(&self) -> Vec<u8> {
        self.key.verifying_key().to_bytes().to_vec()
    }

    pub fn sign(&self, data: MessageData) -> HubResult<Message> {
        let hash = data.compute_hash()?;
        let signature = self.key.sign(&hash);
        Ok(Message {
            data: Some(data),
            hash: hash.to_vec(),
            hash_scheme: HashScheme::Blake3,
            signature: signature.to_bytes().to_vec(),
            signature_scheme: SignatureScheme::Ed25519,
            signer: self.public_key(),
        })
    }
}

/// secp256k1 key behind an Ethereum custody address
#[derive(Clone)]
pub struct CustodySigner {
    key: k256::ecdsa::SigningKey,
}

impl std::fmt::Debug for CustodySigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustodySigner")
            .field("address", &hub_core::to_hex(&self.address()))
            .finish()
    }
}

impl CustodySigner {
    pub fn new(key: k256::ecdsa::SigningKey) -> Self {
        Self { key }
    }

    /// 20-byte address, as carried in `Message::signer` and id registry events
    pub fn address(&self) -> Vec<u8> {
        eip712::eth_address(self.key.verifying_key()).to_vec()
    }

    /// Sign with a recoverable signature over the typed-data digest of the hash
    pub fn sign(&self, data: MessageData) -> HubResult<Message> {
        let hash = data.compute_hash()?;
        let digest = eip712::message_hash_digest(&hash);
        let (signature, recovery_id) = self
            .key
            .sign_prehash_recoverable(&digest)
            .map_err(|e| HubError::internal(format!("eip712 signing failed: {e}")))?;
        let mut signature = signature.to_bytes().to_vec();
        signature.push(27 + recovery_id.to_byte());
        Ok(Message {
            data: Some(data),
            hash: hash.to_vec(),
            hash_scheme: HashScheme::Blake3,
            signature,
            signature_scheme: SignatureScheme::Eip712,
            signer: self.address(),
        })
    }
}
