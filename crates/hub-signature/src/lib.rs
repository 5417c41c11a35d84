//! Hub Signature - message envelope validation
//!
//! Stateless checks that every message must pass before it reaches a store:
//! body shape per message type, hash integrity and the signature over the
//! hash (Ed25519 for delegated keys, EIP-712 for custody-signed signer
//! messages). These run on the validation worker pool, so nothing here touches
//! stores or the network.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod builder;
pub mod eip712;
pub mod validations;

pub use builder::{CustodySigner, MessageSigner};
pub use validations::{
    required_signature_scheme, validate_cast_id, validate_ed25519_public_key, validate_ens_name,
    validate_eth_address, validate_fid, validate_fname, validate_message, validate_username,
};
