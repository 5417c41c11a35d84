//! Structural and cryptographic message validation
//!
//! Pure functions: no store, network or clock access. Everything here can run
//! on a validation worker thread. State-dependent checks (authority, username
//! ownership) belong to the engine.

use ed25519_dalek::{Signature, VerifyingKey};
use hub_core::{
    to_hex, CastAddBody, CastId, Fid, HashScheme, HubError, HubResult, LinkBody, Message,
    MessageBody, MessageData, MessageType, ReactionBody, SignatureScheme, SignerBody,
    UserDataBody, UserDataType, UserNameProof, VerificationAddBody,
};
use hub_core::hash::HASH_LENGTH;

use crate::eip712;

pub const MAX_CAST_TEXT_BYTES: usize = 320;
pub const MAX_CAST_MENTIONS: usize = 10;
pub const MAX_CAST_EMBEDS: usize = 2;
pub const MAX_EMBED_BYTES: usize = 256;
pub const MAX_LINK_TYPE_BYTES: usize = 8;
pub const ETH_ADDRESS_LENGTH: usize = 20;
pub const ETH_SIGNATURE_LENGTH: usize = 65;
pub const BLOCK_HASH_LENGTH: usize = 32;
pub const ED25519_PUBLIC_KEY_LENGTH: usize = 32;
pub const ED25519_SIGNATURE_LENGTH: usize = 64;
pub const MAX_FNAME_LENGTH: usize = 16;
pub const MAX_ENS_NAME_LENGTH: usize = 20;
pub const MAX_USERNAME_PROOF_NAME_BYTES: usize = 255;

/// Full structural validation of a message
///
/// Checks body shape against the declared type, hash integrity and the
/// signature over the hash. Returns the message unchanged on success.
pub fn validate_message(message: Message) -> HubResult<Message> {
    let data = message.data()?;

    let result = validate_fid(data.fid)
        .and_then(|_| validate_message_body(data))
        .and_then(|_| validate_hash(&message, data))
        .and_then(|_| validate_signature(&message, data.message_type));

    if let Err(err) = &result {
        tracing::debug!(
            fid = %data.fid,
            message_type = ?data.message_type,
            error = %err,
            "message failed validation"
        );
    }
    result.map(|_| message)
}

fn validate_message_body(data: &MessageData) -> HubResult<()> {
    match (data.message_type, &data.body) {
        (MessageType::CastAdd, MessageBody::CastAdd(body)) => validate_cast_add_body(body),
        (MessageType::CastRemove, MessageBody::CastRemove(body)) => {
            validate_message_hash_bytes(&body.target_hash)
        }
        (MessageType::ReactionAdd | MessageType::ReactionRemove, MessageBody::Reaction(body)) => {
            validate_reaction_body(body)
        }
        (MessageType::LinkAdd | MessageType::LinkRemove, MessageBody::Link(body)) => {
            validate_link_body(body)
        }
        (MessageType::VerificationAddEthAddress, MessageBody::VerificationAdd(body)) => {
            validate_verification_add_body(body)
        }
        (MessageType::VerificationRemove, MessageBody::VerificationRemove(body)) => {
            validate_eth_address(&body.address).map(|_| ())
        }
        (MessageType::SignerAdd | MessageType::SignerRemove, MessageBody::Signer(body)) => {
            validate_signer_body(body)
        }
        (MessageType::UserDataAdd, MessageBody::UserData(body)) => validate_user_data_body(body),
        (MessageType::UsernameProof, MessageBody::UsernameProof(body)) => {
            validate_username_proof_body(body, data.fid)
        }
        (message_type, _) => Err(HubError::validation_failure(format!(
            "body does not match message type {message_type:?}"
        ))),
    }
}

fn validate_cast_add_body(body: &CastAddBody) -> HubResult<()> {
    if body.text.len() > MAX_CAST_TEXT_BYTES {
        return Err(HubError::validation_failure(format!(
            "text > {MAX_CAST_TEXT_BYTES} bytes"
        )));
    }
    if body.mentions.len() > MAX_CAST_MENTIONS {
        return Err(HubError::validation_failure(format!(
            "mentions > {MAX_CAST_MENTIONS}"
        )));
    }
    for mention in &body.mentions {
        validate_fid(*mention)?;
    }
    if body.embeds.len() > MAX_CAST_EMBEDS {
        return Err(HubError::validation_failure(format!(
            "embeds > {MAX_CAST_EMBEDS}"
        )));
    }
    if let Some(embed) = body
        .embeds
        .iter()
        .find(|embed| embed.is_empty() || embed.len() > MAX_EMBED_BYTES)
    {
        return Err(HubError::validation_failure(format!(
            "embed must be 1-{MAX_EMBED_BYTES} bytes, got {}",
            embed.len()
        )));
    }
    if let Some(parent) = &body.parent {
        validate_cast_id(parent)?;
    }
    Ok(())
}

fn validate_reaction_body(body: &ReactionBody) -> HubResult<()> {
    validate_cast_id(&body.target).map(|_| ())
}

fn validate_link_body(body: &LinkBody) -> HubResult<()> {
    if body.link_type.is_empty() || body.link_type.len() > MAX_LINK_TYPE_BYTES {
        return Err(HubError::validation_failure(format!(
            "link type must be 1-{MAX_LINK_TYPE_BYTES} bytes"
        )));
    }
    validate_fid(body.target_fid)?;
    Ok(())
}

fn validate_verification_add_body(body: &VerificationAddBody) -> HubResult<()> {
    validate_eth_address(&body.address)?;
    if body.claim_signature.len() != ETH_SIGNATURE_LENGTH {
        return Err(HubError::validation_failure(format!(
            "claim signature must be {ETH_SIGNATURE_LENGTH} bytes"
        )));
    }
    if body.block_hash.len() != BLOCK_HASH_LENGTH {
        return Err(HubError::validation_failure(format!(
            "block hash must be {BLOCK_HASH_LENGTH} bytes"
        )));
    }
    Ok(())
}

fn validate_signer_body(body: &SignerBody) -> HubResult<()> {
    validate_ed25519_public_key(&body.signer)?;
    if let Some(name) = &body.name {
        if name.len() > 32 {
            return Err(HubError::validation_failure("signer name > 32 bytes"));
        }
    }
    Ok(())
}

fn validate_user_data_body(body: &UserDataBody) -> HubResult<()> {
    let limit = match body.user_data_type {
        UserDataType::Pfp | UserDataType::Bio | UserDataType::Url => 256,
        UserDataType::Display => 32,
        UserDataType::Username => {
            // An empty value unsets the username
            if body.value.is_empty() {
                return Ok(());
            }
            return validate_username(&body.value).map(|_| ());
        }
    };
    if body.value.len() > limit {
        return Err(HubError::validation_failure(format!(
            "{:?} value > {limit} bytes",
            body.user_data_type
        )));
    }
    Ok(())
}

fn validate_username_proof_body(proof: &UserNameProof, message_fid: Fid) -> HubResult<()> {
    if proof.name.is_empty() || proof.name.len() > MAX_USERNAME_PROOF_NAME_BYTES {
        return Err(HubError::validation_failure(format!(
            "username proof name must be 1-{MAX_USERNAME_PROOF_NAME_BYTES} bytes"
        )));
    }
    validate_eth_address(&proof.owner)?;
    validate_fid(proof.fid)?;
    if proof.fid != message_fid {
        return Err(HubError::validation_failure(format!(
            "username proof fid {} does not match message fid {message_fid}",
            proof.fid
        )));
    }
    Ok(())
}

fn validate_hash(message: &Message, data: &MessageData) -> HubResult<()> {
    match message.hash_scheme {
        HashScheme::Blake3 => {
            validate_message_hash_bytes(&message.hash)?;
            let computed = data.compute_hash()?;
            if computed.as_slice() != message.hash.as_slice() {
                return Err(HubError::validation_failure(format!(
                    "invalid hash: expected {}, got {}",
                    to_hex(&computed),
                    to_hex(&message.hash)
                )));
            }
            Ok(())
        }
    }
}

/// Scheme a message type must be signed with
///
/// Signer messages are signed by the custody address over EIP-712 typed data.
/// Everything else is signed by a delegated Ed25519 key.
pub fn required_signature_scheme(message_type: MessageType) -> SignatureScheme {
    match message_type {
        MessageType::SignerAdd | MessageType::SignerRemove => SignatureScheme::Eip712,
        _ => SignatureScheme::Ed25519,
    }
}

fn validate_signature(message: &Message, message_type: MessageType) -> HubResult<()> {
    let required = required_signature_scheme(message_type);
    if message.signature_scheme != required {
        return Err(HubError::validation_failure(format!(
            "invalid signature scheme {:?} for {message_type:?}, expected {required:?}",
            message.signature_scheme
        )));
    }
    match required {
        SignatureScheme::Ed25519 => validate_ed25519_signature(message),
        SignatureScheme::Eip712 => validate_eip712_signature(message),
    }
}

fn validate_ed25519_signature(message: &Message) -> HubResult<()> {
    let key = parse_verifying_key(&message.signer)?;
    let signature_bytes: [u8; ED25519_SIGNATURE_LENGTH] =
        message.signature.as_slice().try_into().map_err(|_| {
            HubError::validation_failure(format!(
                "signature must be {ED25519_SIGNATURE_LENGTH} bytes"
            ))
        })?;
    let signature = Signature::from_bytes(&signature_bytes);
    key.verify_strict(&message.hash, &signature).map_err(|_| {
        HubError::validation_failure(format!(
            "invalid signature from signer {}",
            to_hex(&message.signer)
        ))
    })
}

fn validate_eip712_signature(message: &Message) -> HubResult<()> {
    validate_eth_address(&message.signer)?;
    let recovered = eip712::recover_message_hash_signer(&message.hash, &message.signature)?;
    if recovered.as_slice() != message.signer.as_slice() {
        return Err(HubError::validation_failure(format!(
            "signature does not match signer: recovered {}, expected {}",
            to_hex(&recovered),
            to_hex(&message.signer)
        )));
    }
    Ok(())
}

fn parse_verifying_key(bytes: &[u8]) -> HubResult<VerifyingKey> {
    let key_bytes: [u8; ED25519_PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|_| {
        HubError::validation_failure(format!(
            "signer must be a {ED25519_PUBLIC_KEY_LENGTH}-byte ed25519 public key"
        ))
    })?;
    VerifyingKey::from_bytes(&key_bytes)
        .map_err(|_| HubError::validation_failure("signer is not a valid ed25519 public key"))
}

fn validate_message_hash_bytes(hash: &[u8]) -> HubResult<()> {
    if hash.len() != HASH_LENGTH {
        return Err(HubError::validation_failure(format!(
            "hash must be {HASH_LENGTH} bytes, got {}",
            hash.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Input-shape validators shared with read APIs
// ---------------------------------------------------------------------------

pub fn validate_fid(fid: Fid) -> HubResult<Fid> {
    if !fid.is_valid() {
        return Err(HubError::validation_failure("fid is missing"));
    }
    Ok(fid)
}

pub fn validate_cast_id(cast_id: &CastId) -> HubResult<&CastId> {
    validate_fid(cast_id.fid)?;
    validate_message_hash_bytes(&cast_id.hash)?;
    Ok(cast_id)
}

pub fn validate_eth_address(address: &[u8]) -> HubResult<&[u8]> {
    if address.len() != ETH_ADDRESS_LENGTH {
        return Err(HubError::validation_failure(format!(
            "eth address must be {ETH_ADDRESS_LENGTH} bytes, got {}",
            address.len()
        )));
    }
    Ok(address)
}

pub fn validate_ed25519_public_key(key: &[u8]) -> HubResult<&[u8]> {
    if key.len() != ED25519_PUBLIC_KEY_LENGTH {
        return Err(HubError::validation_failure(format!(
            "ed25519 public key must be {ED25519_PUBLIC_KEY_LENGTH} bytes, got {}",
            key.len()
        )));
    }
    Ok(key)
}

/// Registry-assigned name: `[a-z0-9][a-z0-9-]{0,15}`
pub fn validate_fname(name: &str) -> HubResult<&str> {
    if name.is_empty() || name.len() > MAX_FNAME_LENGTH {
        return Err(HubError::validation_failure(format!(
            "fname must be 1-{MAX_FNAME_LENGTH} characters"
        )));
    }
    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_lowercase() || c.is_ascii_digit());
    let rest_ok = chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-');
    if !first_ok || !rest_ok {
        return Err(HubError::validation_failure(format!(
            "fname \"{name}\" doesn't match [a-z0-9][a-z0-9-]{{0,15}}"
        )));
    }
    Ok(name)
}

/// ENS name: a valid label followed by `.eth`
pub fn validate_ens_name(name: &str) -> HubResult<&str> {
    let Some(label) = name.strip_suffix(".eth") else {
        return Err(HubError::validation_failure(format!(
            "ens name \"{name}\" doesn't end with .eth"
        )));
    };
    if name.len() > MAX_ENS_NAME_LENGTH {
        return Err(HubError::validation_failure(format!(
            "ens name > {MAX_ENS_NAME_LENGTH} characters"
        )));
    }
    if label.is_empty() || label.contains('.') {
        return Err(HubError::validation_failure(format!(
            "ens name \"{name}\" must be a single label"
        )));
    }
    if !label
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(HubError::validation_failure(format!(
            "ens name \"{name}\" contains invalid characters"
        )));
    }
    Ok(name)
}

/// Username value: ENS name when it ends in `.eth`, fname otherwise
pub fn validate_username(name: &str) -> HubResult<&str> {
    if name.ends_with(".eth") {
        validate_ens_name(name)
    } else {
        validate_fname(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fname_charset() {
        assert!(validate_fname("alice").is_ok());
        assert!(validate_fname("a-1").is_ok());
        assert!(validate_fname("-alice").is_err());
        assert!(validate_fname("Alice").is_err());
        assert!(validate_fname("abcdefghijklmnopq").is_err());
        assert!(validate_fname("").is_err());
    }

    #[test]
    fn ens_names_need_suffix_and_single_label() {
        assert!(validate_ens_name("alice.eth").is_ok());
        assert!(validate_ens_name("alice").is_err());
        assert!(validate_ens_name("a.b.eth").is_err());
        assert!(validate_ens_name(".eth").is_err());
        assert!(validate_username("bob.eth").is_ok());
        assert!(validate_username("bob").is_ok());
    }

    #[test]
    fn input_shapes() {
        assert!(validate_fid(Fid(0)).is_err());
        assert!(validate_eth_address(&[1u8; 20]).is_ok());
        assert!(validate_eth_address(&[1u8; 32]).is_err());
        assert!(validate_ed25519_public_key(&[1u8; 31]).is_err());
        let cast_id = CastId {
            fid: Fid(1),
            hash: vec![0u8; 4],
        };
        assert!(validate_cast_id(&cast_id).is_err());
    }

    #[test]
    fn reaction_target_must_be_a_full_cast_id() {
        let mut body = ReactionBody {
            reaction_type: hub_core::ReactionType::Like,
            target: CastId {
                fid: Fid(3),
                hash: vec![7u8; HASH_LENGTH],
            },
        };
        assert!(validate_reaction_body(&body).is_ok());

        body.target.hash.truncate(4);
        assert!(validate_reaction_body(&body).is_err());
        body.target = CastId {
            fid: Fid(0),
            hash: vec![7u8; HASH_LENGTH],
        };
        assert!(validate_reaction_body(&body).is_err());
    }

    #[test]
    fn signer_messages_require_eip712() {
        assert_eq!(
            required_signature_scheme(MessageType::SignerAdd),
            SignatureScheme::Eip712
        );
        assert_eq!(
            required_signature_scheme(MessageType::SignerRemove),
            SignatureScheme::Eip712
        );
        assert_eq!(
            required_signature_scheme(MessageType::CastAdd),
            SignatureScheme::Ed25519
        );
    }
}
