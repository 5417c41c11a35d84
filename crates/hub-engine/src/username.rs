//! Username ownership checks
//!
//! A username set through UserData must be backed by a current proof for the
//! sending account. Registry-assigned proofs name the fid directly. ENS proofs
//! are checked against the resolver: the name must resolve to the proof owner,
//! and that address must be the custody address or a verified address of the
//! account.

use std::sync::Arc;

use hub_core::effects::{MessageStore, NameResolverEffects, StoreQuery, UsernameProofEffects};
use hub_core::{
    to_hex, Fid, HubError, HubEvent, HubResult, Message, MessageBody, StoreKind, UserDataType,
    UserNameType,
};
use hub_guards::Authority;

pub const ENS_SUFFIX: &str = ".eth";

pub struct UsernameChecks {
    proofs: Arc<dyn UsernameProofEffects>,
    resolver: Arc<dyn NameResolverEffects>,
    verifications: Arc<dyn MessageStore>,
    user_data: Arc<dyn MessageStore>,
}

impl UsernameChecks {
    pub fn new(
        proofs: Arc<dyn UsernameProofEffects>,
        resolver: Arc<dyn NameResolverEffects>,
        verifications: Arc<dyn MessageStore>,
        user_data: Arc<dyn MessageStore>,
    ) -> HubResult<Self> {
        if verifications.kind() != StoreKind::Verification || user_data.kind() != StoreKind::UserData
        {
            return Err(HubError::invalid_param(
                "username checks need the verification and user data stores",
            ));
        }
        Ok(Self {
            proofs,
            resolver,
            verifications,
            user_data,
        })
    }

    /// Ownership side-check for username-bearing messages; others pass
    pub async fn check_message(&self, message: &Message, authority: &Authority) -> HubResult<()> {
        let data = message.data()?;
        match &data.body {
            MessageBody::UserData(body)
                if body.user_data_type == UserDataType::Username && !body.value.is_empty() =>
            {
                self.check_username(data.fid, &body.value, authority).await
            }
            MessageBody::UsernameProof(proof) => match proof.proof_type {
                UserNameType::EnsL1 => {
                    self.verify_ens_ownership(&proof.name, &proof.owner, authority)
                        .await
                }
                UserNameType::Fname => Err(HubError::validation_failure(format!(
                    "invalid username type for proof message: {:?}",
                    proof.proof_type
                ))),
            },
            _ => Ok(()),
        }
    }

    async fn check_username(&self, fid: Fid, name: &str, authority: &Authority) -> HubResult<()> {
        let proof = self
            .proofs
            .get_username_proof(name)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    HubError::validation_failure(format!("no username proof found for {name}"))
                } else {
                    err
                }
            })?;

        match proof.proof_type {
            UserNameType::Fname => {
                if proof.fid != fid {
                    return Err(HubError::validation_failure(format!(
                        "username fid mismatch: {name} belongs to fid {}, not fid {fid}",
                        proof.fid
                    )));
                }
                Ok(())
            }
            UserNameType::EnsL1 => {
                self.verify_ens_ownership(&proof.name, &proof.owner, authority)
                    .await
            }
        }
    }

    /// ENS ownership check for a proof `{name, owner}`
    ///
    /// Resolver failures are network failures, never validation failures.
    pub async fn verify_ens_ownership(
        &self,
        name: &str,
        owner: &[u8],
        authority: &Authority,
    ) -> HubResult<()> {
        if !name.ends_with(ENS_SUFFIX) {
            return Err(HubError::validation_failure(format!(
                "{name} is not an ens name"
            )));
        }

        let resolved = self
            .resolver
            .resolve_ens_address(name)
            .await
            .map_err(|err| {
                tracing::warn!(name, error = %err, "ens resolution failed");
                HubError::network_failure(format!("failed to resolve ens name {name}: {err}"))
            })?;
        let Some(resolved) = resolved else {
            return Err(HubError::validation_failure(format!(
                "no address found for ens name {name}"
            )));
        };

        if resolved != owner {
            return Err(HubError::validation_failure(format!(
                "ens name {name} resolves to {}, not to proof owner {}",
                to_hex(&resolved),
                to_hex(owner)
            )));
        }
        if resolved == authority.custody_address {
            return Ok(());
        }

        self.verifications
            .get_add(authority.fid, &StoreQuery::Verification { address: resolved })
            .await
            .map(|_| ())
            .map_err(|err| {
                if err.is_not_found() {
                    HubError::validation_failure(format!(
                        "ens name {name} does not belong to fid {}",
                        authority.fid
                    ))
                } else {
                    err
                }
            })
    }

    /// UserData username message to revoke after a registry name moved away
    ///
    /// Only applies when a registry proof was deleted, the replacement (if
    /// any) is not the same name and fid, and the account's current username
    /// still equals the deleted name.
    pub async fn invalidated_username(&self, event: &HubEvent) -> HubResult<Option<Message>> {
        let HubEvent::MergeUsernameProof {
            username_proof,
            deleted_username_proof: Some(deleted),
        } = event
        else {
            return Ok(None);
        };
        if deleted.proof_type != UserNameType::Fname {
            return Ok(None);
        }
        if let Some(replacement) = username_proof {
            if replacement.name == deleted.name && replacement.fid == deleted.fid {
                return Ok(None);
            }
        }

        let query = StoreQuery::UserData {
            user_data_type: UserDataType::Username,
        };
        let current = match self.user_data.get_add(deleted.fid, &query).await {
            Ok(message) => message,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };

        match current.user_data_body() {
            Some(body) if body.value == deleted.name => Ok(Some(current)),
            _ => Ok(None),
        }
    }
}
