//! Store lifecycle events
//!
//! Stores and the on-chain event store emit these after they commit a change.
//! The engine consumes them to drive revocation cascades, the migration flag
//! and username invalidation.

use serde::{Deserialize, Serialize};

use crate::message::{Message, UserNameProof};
use crate::onchain::{IdRegisterEvent, OnChainEvent};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HubEvent {
    /// A message was merged, possibly displacing earlier ones
    MergeMessage {
        message: Message,
        deleted_messages: Vec<Message>,
    },
    /// A message was removed to keep an account within its storage limit
    PruneMessage { message: Message },
    /// A message was removed because its signer lost authority
    RevokeMessage { message: Message },
    MergeIdRegistryEvent { event: IdRegisterEvent },
    MergeOnChainEvent { event: OnChainEvent },
    /// A username proof was added, replaced or deleted
    MergeUsernameProof {
        username_proof: Option<UserNameProof>,
        deleted_username_proof: Option<UserNameProof>,
    },
}
