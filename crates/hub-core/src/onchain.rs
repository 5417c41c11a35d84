//! On-chain event model
//!
//! Id registry events establish the custody address for an account. Signer
//! events track the active key set once the network has migrated to on-chain
//! signers. Storage rent events grant storage units.

use serde::{Deserialize, Serialize};

use crate::identifiers::Fid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IdRegisterEventType {
    Register,
    Transfer,
    ChangeRecovery,
}

/// Id registry event: registration or transfer of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRegisterEvent {
    pub fid: Fid,
    pub event_type: IdRegisterEventType,
    /// Custody address after this event
    pub to: Vec<u8>,
    /// Previous custody address; empty on registration
    pub from: Vec<u8>,
    pub block_timestamp: u64,
}

impl IdRegisterEvent {
    pub fn custody_address(&self) -> &[u8] {
        &self.to
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SignerEventType {
    Add,
    Remove,
    AdminReset,
}

/// Change to an account's on-chain signer key set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerEvent {
    pub fid: Fid,
    pub key: Vec<u8>,
    pub event_type: SignerEventType,
    pub key_type: u32,
    pub block_timestamp: u64,
}

/// Purchase of storage units, valid until `expiry` (unix seconds)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageRentEvent {
    pub fid: Fid,
    pub units: u64,
    pub expiry: u64,
}

/// Events observed on chain and replicated into the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OnChainEvent {
    IdRegister(IdRegisterEvent),
    Signer(SignerEvent),
    /// The network switched to on-chain signer authority
    SignerMigrated { migrated_at: u64 },
    StorageRent(StorageRentEvent),
}
