//! Account authority resolution
//!
//! Two authority models exist over the network's lifetime. Before the signer
//! migration an account is controlled by its custody address, which delegates
//! to signer keys through SignerAdd messages. After it, the active signer set
//! is read from on-chain signer events. The model is a process-wide flag that
//! only ever moves from legacy to migrated.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hub_core::effects::{MessageStore, OnChainEventEffects, StoreQuery};
use hub_core::{to_hex, Fid, HubError, HubResult, Message, StoreKind};

/// Process-wide signer migration flag
///
/// Monotonic: once set it stays set. Messages already admitted under the
/// legacy model are not re-checked when it flips.
#[derive(Debug, Default)]
pub struct MigrationState {
    migrated: AtomicBool,
}

impl MigrationState {
    pub fn new(migrated: bool) -> Self {
        Self {
            migrated: AtomicBool::new(migrated),
        }
    }

    pub fn is_migrated(&self) -> bool {
        self.migrated.load(Ordering::Acquire)
    }

    /// Flip to migrated. Returns true if this call changed the flag.
    pub fn mark_migrated(&self) -> bool {
        !self.migrated.swap(true, Ordering::AcqRel)
    }

    pub fn model(&self) -> AuthorityModel {
        if self.is_migrated() {
            AuthorityModel::Migrated
        } else {
            AuthorityModel::Legacy
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthorityModel {
    /// Custody address plus SignerAdd delegations
    Legacy,
    /// On-chain signer events
    Migrated,
}

impl AuthorityModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Legacy => "legacy",
            Self::Migrated => "migrated",
        }
    }
}

/// Resolved authority for one account at admission time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Authority {
    pub fid: Fid,
    pub custody_address: Vec<u8>,
    pub model: AuthorityModel,
}

/// Resolves and checks signer authority under the current model
pub struct AuthorityResolver {
    onchain: Arc<dyn OnChainEventEffects>,
    signer_store: Arc<dyn MessageStore>,
    migration: Arc<MigrationState>,
}

impl AuthorityResolver {
    pub fn new(
        onchain: Arc<dyn OnChainEventEffects>,
        signer_store: Arc<dyn MessageStore>,
        migration: Arc<MigrationState>,
    ) -> HubResult<Self> {
        if signer_store.kind() != StoreKind::Signer {
            return Err(HubError::invalid_param(format!(
                "authority resolver needs the signer store, got {}",
                signer_store.kind()
            )));
        }
        Ok(Self {
            onchain,
            signer_store,
            migration,
        })
    }

    pub fn migration(&self) -> &Arc<MigrationState> {
        &self.migration
    }

    /// Custody address and model for `fid`
    ///
    /// Fails with a validation failure when the account has no id registry
    /// event.
    pub async fn resolve(&self, fid: Fid) -> HubResult<Authority> {
        let event = self
            .onchain
            .get_id_register_event_by_fid(fid)
            .await
            .map_err(|err| {
                if err.is_not_found() {
                    HubError::validation_failure(format!("unknown account: fid {fid}"))
                } else {
                    err
                }
            })?;

        Ok(Authority {
            fid,
            custody_address: event.custody_address().to_vec(),
            model: self.migration.model(),
        })
    }

    /// Gate for SignerAdd/SignerRemove messages
    ///
    /// Rejected outright once migrated; under the legacy model they must be
    /// signed by the custody address itself.
    pub fn check_signer_message(&self, authority: &Authority, message: &Message) -> HubResult<()> {
        match authority.model {
            AuthorityModel::Migrated => Err(HubError::validation_failure(format!(
                "signer messages are not accepted after migration (fid {})",
                authority.fid
            ))),
            AuthorityModel::Legacy => {
                if message.signer != authority.custody_address {
                    return Err(HubError::validation_failure(format!(
                        "signer {} does not match custody address {}",
                        to_hex(&message.signer),
                        to_hex(&authority.custody_address)
                    )));
                }
                Ok(())
            }
        }
    }

    /// The message signer must be an active signer for the account
    pub async fn check_signer(&self, authority: &Authority, signer: &[u8]) -> HubResult<()> {
        let fid = authority.fid;
        let lookup = match authority.model {
            AuthorityModel::Migrated => self
                .onchain
                .get_active_signer(fid, signer)
                .await
                .map(|_| ()),
            AuthorityModel::Legacy => self
                .signer_store
                .get_add(
                    fid,
                    &StoreQuery::Signer {
                        key: signer.to_vec(),
                    },
                )
                .await
                .map(|_| ()),
        };

        lookup.map_err(|err| {
            if err.is_not_found() {
                HubError::validation_failure(format!(
                    "invalid signer: signer {} not found for fid {fid} ({} authority)",
                    to_hex(signer),
                    authority.model.as_str()
                ))
            } else {
                err
            }
        })
    }
}
