//! Deterministic keys and message builders
//!
//! Keys come from a seeded ChaCha20 RNG so the same seed always yields the
//! same signer. Delegated signers are Ed25519 keys; custody signers are
//! secp256k1 keys whose 20-byte address owns the fid. `*_data` builders return unsigned `MessageData` for tests
//! that need to tweak a field before signing.

#![allow(clippy::expect_used)]

use ed25519_dalek::SigningKey;
use hub_core::{
    CastAddBody, Fid, Message, MessageBody, MessageData, MessageType, Network, SignerBody,
    UserDataBody, UserDataType, UserNameProof, UserNameType, VerificationAddBody,
};
use hub_signature::{CustodySigner, MessageSigner};
use rand_chacha::ChaCha20Rng;
use rand_core::SeedableRng;

/// Timestamp used by every builder unless overridden
pub const TEST_TIMESTAMP: u32 = 100_000;

pub fn signer(seed: u64) -> MessageSigner {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    MessageSigner::new(SigningKey::generate(&mut rng))
}

pub fn custody(seed: u64) -> CustodySigner {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    CustodySigner::new(k256::ecdsa::SigningKey::random(&mut rng))
}

/// Deterministic 20-byte Ethereum-style address
pub fn eth_address(seed: u8) -> Vec<u8> {
    vec![seed; 20]
}

pub fn message_data(fid: u64, message_type: MessageType, body: MessageBody) -> MessageData {
    MessageData {
        message_type,
        fid: Fid(fid),
        timestamp: TEST_TIMESTAMP,
        network: Network::Devnet,
        body,
    }
}

pub fn with_timestamp(mut data: MessageData, timestamp: u32) -> MessageData {
    data.timestamp = timestamp;
    data
}

pub fn with_network(mut data: MessageData, network: Network) -> MessageData {
    data.network = network;
    data
}

pub fn sign(signer: &MessageSigner, data: MessageData) -> Message {
    signer.sign(data).expect("test message data encodes")
}

pub fn cast_add_data(fid: u64, text: &str) -> MessageData {
    message_data(
        fid,
        MessageType::CastAdd,
        MessageBody::CastAdd(CastAddBody {
            text: text.to_string(),
            ..Default::default()
        }),
    )
}

pub fn cast_add(signer: &MessageSigner, fid: u64, text: &str) -> Message {
    sign(signer, cast_add_data(fid, text))
}

pub fn signer_add_data(fid: u64, key: &[u8]) -> MessageData {
    message_data(
        fid,
        MessageType::SignerAdd,
        MessageBody::Signer(SignerBody {
            signer: key.to_vec(),
            name: None,
        }),
    )
}

pub fn sign_custody(custody: &CustodySigner, data: MessageData) -> Message {
    custody.sign(data).expect("test message data encodes")
}

pub fn signer_add(custody: &CustodySigner, fid: u64, key: &[u8]) -> Message {
    sign_custody(custody, signer_add_data(fid, key))
}

pub fn signer_remove_data(fid: u64, key: &[u8]) -> MessageData {
    message_data(
        fid,
        MessageType::SignerRemove,
        MessageBody::Signer(SignerBody {
            signer: key.to_vec(),
            name: None,
        }),
    )
}

pub fn signer_remove(custody: &CustodySigner, fid: u64, key: &[u8]) -> Message {
    sign_custody(custody, signer_remove_data(fid, key))
}

pub fn user_data_data(fid: u64, user_data_type: UserDataType, value: &str) -> MessageData {
    message_data(
        fid,
        MessageType::UserDataAdd,
        MessageBody::UserData(UserDataBody {
            user_data_type,
            value: value.to_string(),
        }),
    )
}

pub fn username(signer: &MessageSigner, fid: u64, name: &str) -> Message {
    sign(signer, user_data_data(fid, UserDataType::Username, name))
}

pub fn verification_add(signer: &MessageSigner, fid: u64, address: &[u8]) -> Message {
    let data = message_data(
        fid,
        MessageType::VerificationAddEthAddress,
        MessageBody::VerificationAdd(VerificationAddBody {
            address: address.to_vec(),
            claim_signature: vec![0u8; 65],
            block_hash: vec![0u8; 32],
        }),
    );
    sign(signer, data)
}

pub fn fname_proof(name: &str, fid: u64, owner: &[u8]) -> UserNameProof {
    UserNameProof {
        timestamp: u64::from(TEST_TIMESTAMP),
        name: name.to_string(),
        owner: owner.to_vec(),
        signature: vec![0u8; 65],
        fid: Fid(fid),
        proof_type: UserNameType::Fname,
    }
}

pub fn ens_proof(name: &str, fid: u64, owner: &[u8]) -> UserNameProof {
    UserNameProof {
        proof_type: UserNameType::EnsL1,
        ..fname_proof(name, fid, owner)
    }
}

pub fn username_proof(signer: &MessageSigner, proof: UserNameProof) -> Message {
    let fid = proof.fid.value();
    sign(
        signer,
        message_data(fid, MessageType::UsernameProof, MessageBody::UsernameProof(proof)),
    )
}
