//! Hub Core - foundation for the message admission engine
//!
//! Each account's signed state is replicated as a set of immutable messages.
//! This crate holds the types every other hub crate shares and the interfaces
//! through which the engine reaches its collaborators.
//!
//! - [`message`]: message envelope, typed bodies and store categories
//! - [`onchain`]: id registry, signer, migration and storage rent events
//! - [`events`]: store lifecycle events consumed by the engine
//! - [`errors`]: unified error type with dotted error codes
//! - [`config`]: TOML + environment configuration
//! - [`hash`]: canonical encoding and content hashing
//! - [`effects`]: collaborator traits (stores, on-chain events, resolvers, queues)

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod effects;
pub mod errors;
pub mod events;
pub mod hash;
pub mod identifiers;
pub mod message;
pub mod onchain;

pub use config::HubConfig;
pub use errors::{HubError, HubErrorCode, HubResult};
pub use events::HubEvent;
pub use identifiers::{to_hex, Fid, SeqNo};
pub use message::{
    CastAddBody, CastId, CastRemoveBody, HashScheme, LinkBody, Message, MessageBody, MessageData,
    MessageType, Network, ReactionBody, ReactionType, SignatureScheme, SignerBody, StoreKind,
    UserDataBody, UserDataType, UserNameProof, UserNameType, VerificationAddBody,
    VerificationRemoveBody,
};
pub use onchain::{
    IdRegisterEvent, IdRegisterEventType, OnChainEvent, SignerEvent, SignerEventType,
    StorageRentEvent,
};
