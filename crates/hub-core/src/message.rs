//! Message model
//!
//! A [`Message`] is an immutable, signed envelope around [`MessageData`]. The
//! data carries the account, the message type, the network it was created for,
//! a timestamp and a body whose shape depends on the type. Two messages with
//! equal `(fid, type, hash)` are the same logical message.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::{HubError, HubResult};
use crate::hash::{self, HASH_LENGTH};
use crate::identifiers::Fid;

/// Network a node (and every message it admits) belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    #[default]
    Devnet,
}

impl std::str::FromStr for Network {
    type Err = HubError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Self::Mainnet),
            "testnet" => Ok(Self::Testnet),
            "devnet" => Ok(Self::Devnet),
            other => Err(HubError::invalid_param(format!("unknown network: {other}"))),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Mainnet => "mainnet",
            Self::Testnet => "testnet",
            Self::Devnet => "devnet",
        })
    }
}

/// Message type carried in [`MessageData`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageType {
    CastAdd,
    CastRemove,
    ReactionAdd,
    ReactionRemove,
    LinkAdd,
    LinkRemove,
    VerificationAddEthAddress,
    VerificationRemove,
    SignerAdd,
    SignerRemove,
    UserDataAdd,
    UsernameProof,
}

impl MessageType {
    /// Store category that owns messages of this type
    pub fn store_kind(&self) -> StoreKind {
        match self {
            Self::CastAdd | Self::CastRemove => StoreKind::Cast,
            Self::ReactionAdd | Self::ReactionRemove => StoreKind::Reaction,
            Self::LinkAdd | Self::LinkRemove => StoreKind::Link,
            Self::VerificationAddEthAddress | Self::VerificationRemove => StoreKind::Verification,
            Self::SignerAdd | Self::SignerRemove => StoreKind::Signer,
            Self::UserDataAdd => StoreKind::UserData,
            Self::UsernameProof => StoreKind::UsernameProof,
        }
    }

    /// Remove messages tombstone the matching add in their store
    pub fn is_remove(&self) -> bool {
        matches!(
            self,
            Self::CastRemove
                | Self::ReactionRemove
                | Self::LinkRemove
                | Self::VerificationRemove
                | Self::SignerRemove
        )
    }

    /// Signer add/remove messages only exist under the legacy authority model
    pub fn is_signer_message(&self) -> bool {
        matches!(self, Self::SignerAdd | Self::SignerRemove)
    }
}

/// Per-account CRDT store categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StoreKind {
    Cast,
    Reaction,
    Link,
    Signer,
    UserData,
    Verification,
    UsernameProof,
}

impl StoreKind {
    pub const ALL: [StoreKind; 7] = [
        StoreKind::Cast,
        StoreKind::Reaction,
        StoreKind::Link,
        StoreKind::Signer,
        StoreKind::UserData,
        StoreKind::Verification,
        StoreKind::UsernameProof,
    ];

    /// Retained messages per account per purchased storage unit
    pub fn default_prune_size_limit(&self) -> u64 {
        match self {
            Self::Cast => 5000,
            Self::Reaction => 2500,
            Self::Link => 2500,
            Self::Signer => 100,
            Self::UserData => 50,
            Self::Verification => 25,
            Self::UsernameProof => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cast => "cast",
            Self::Reaction => "reaction",
            Self::Link => "link",
            Self::Signer => "signer",
            Self::UserData => "user_data",
            Self::Verification => "verification",
            Self::UsernameProof => "username_proof",
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum HashScheme {
    #[default]
    Blake3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SignatureScheme {
    #[default]
    Ed25519,
    /// Typed-data signatures from an Ethereum address
    Eip712,
}

/// Reference to a cast by author and hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CastId {
    pub fid: Fid,
    pub hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CastAddBody {
    pub text: String,
    pub mentions: Vec<Fid>,
    pub parent: Option<CastId>,
    pub embeds: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CastRemoveBody {
    pub target_hash: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReactionType {
    Like,
    Recast,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReactionBody {
    pub reaction_type: ReactionType,
    pub target: CastId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkBody {
    pub link_type: String,
    pub target_fid: Fid,
}

/// Claim that the account controls an Ethereum address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationAddBody {
    pub address: Vec<u8>,
    pub claim_signature: Vec<u8>,
    pub block_hash: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationRemoveBody {
    pub address: Vec<u8>,
}

/// Body of signer add/remove messages (legacy authority model)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignerBody {
    pub signer: Vec<u8>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserDataType {
    Pfp,
    Display,
    Bio,
    Url,
    Username,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataBody {
    pub user_data_type: UserDataType,
    pub value: String,
}

/// Kind of authority that assigned a username
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UserNameType {
    /// Registry-assigned name
    Fname,
    /// ENS name resolved on L1
    EnsL1,
}

/// Binding of a human-readable name to an account and an owning address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserNameProof {
    pub timestamp: u64,
    pub name: String,
    pub owner: Vec<u8>,
    pub signature: Vec<u8>,
    pub fid: Fid,
    pub proof_type: UserNameType,
}

impl UserNameProof {
    pub fn is_ens(&self) -> bool {
        self.proof_type == UserNameType::EnsL1
    }
}

/// Type-specific message body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageBody {
    CastAdd(CastAddBody),
    CastRemove(CastRemoveBody),
    Reaction(ReactionBody),
    Link(LinkBody),
    VerificationAdd(VerificationAddBody),
    VerificationRemove(VerificationRemoveBody),
    Signer(SignerBody),
    UserData(UserDataBody),
    UsernameProof(UserNameProof),
}

/// Signed payload of a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageData {
    pub message_type: MessageType,
    pub fid: Fid,
    /// Seconds since the network epoch
    pub timestamp: u32,
    pub network: Network,
    pub body: MessageBody,
}

impl MessageData {
    /// Canonical encoding the hash is computed over
    pub fn to_canonical_bytes(&self) -> HubResult<Vec<u8>> {
        hash::to_canonical_bytes(self)
    }

    pub fn compute_hash(&self) -> HubResult<[u8; HASH_LENGTH]> {
        hash::hash_canonical(self)
    }
}

/// Immutable signed message envelope
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub data: Option<MessageData>,
    pub hash: Vec<u8>,
    pub hash_scheme: HashScheme,
    pub signature: Vec<u8>,
    pub signature_scheme: SignatureScheme,
    /// Ed25519 public key of the signing key, or the 20-byte custody
    /// address for EIP-712 signed messages
    pub signer: Vec<u8>,
}

impl Message {
    /// Message data, or a validation failure when it is absent
    pub fn data(&self) -> HubResult<&MessageData> {
        self.data
            .as_ref()
            .ok_or_else(|| HubError::validation_failure("message data is missing"))
    }

    pub fn fid(&self) -> Option<Fid> {
        self.data.as_ref().map(|data| data.fid)
    }

    pub fn message_type(&self) -> Option<MessageType> {
        self.data.as_ref().map(|data| data.message_type)
    }

    pub fn user_data_body(&self) -> Option<&UserDataBody> {
        match self.data.as_ref().map(|data| &data.body) {
            Some(MessageBody::UserData(body)) => Some(body),
            _ => None,
        }
    }

    pub fn username_proof_body(&self) -> Option<&UserNameProof> {
        match self.data.as_ref().map(|data| &data.body) {
            Some(MessageBody::UsernameProof(body)) => Some(body),
            _ => None,
        }
    }

    /// Key named by a signer add/remove body
    pub fn signer_body_key(&self) -> Option<&[u8]> {
        match self.data.as_ref().map(|data| &data.body) {
            Some(MessageBody::Signer(body)) => Some(&body.signer),
            _ => None,
        }
    }
}
