//! Per-category CRDT store facade
//!
//! Each store enforces its own conflict rule and capacity. The engine only
//! decides admissibility and calls these operations; it never deletes
//! messages itself.

use async_trait::async_trait;

use crate::errors::HubResult;
use crate::identifiers::{Fid, SeqNo};
use crate::message::{CastId, Message, ReactionType, StoreKind, UserDataType};

/// Typed lookup of the currently-winning add message in a store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum StoreQuery {
    Cast { hash: Vec<u8> },
    Reaction { reaction_type: ReactionType, target: CastId },
    Link { link_type: String, target_fid: Fid },
    Signer { key: Vec<u8> },
    UserData { user_data_type: UserDataType },
    Verification { address: Vec<u8> },
    UsernameProof { name: String },
}

impl StoreQuery {
    /// Store category able to answer this query
    pub fn store_kind(&self) -> StoreKind {
        match self {
            Self::Cast { .. } => StoreKind::Cast,
            Self::Reaction { .. } => StoreKind::Reaction,
            Self::Link { .. } => StoreKind::Link,
            Self::Signer { .. } => StoreKind::Signer,
            Self::UserData { .. } => StoreKind::UserData,
            Self::Verification { .. } => StoreKind::Verification,
            Self::UsernameProof { .. } => StoreKind::UsernameProof,
        }
    }
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Retained messages per account per storage unit
    fn prune_size_limit(&self) -> u64;

    /// Merge under the store's CRDT rule and return the committed sequence number
    async fn merge(&self, message: &Message) -> HubResult<SeqNo>;

    /// Remove a previously merged message; `None` when it was not present
    async fn revoke(&self, message: &Message) -> HubResult<Option<SeqNo>>;

    /// Prune the account down to its capacity, returning pruned sequence numbers
    async fn prune_messages(&self, fid: Fid) -> HubResult<Vec<SeqNo>>;

    /// Current add message matching `query`, `not_found` otherwise
    async fn get_add(&self, fid: Fid, query: &StoreQuery) -> HubResult<Message>;

    /// Every retained message for `fid` signed by `signer`
    async fn get_messages_by_signer(&self, fid: Fid, signer: &[u8]) -> HubResult<Vec<Message>>;
}
