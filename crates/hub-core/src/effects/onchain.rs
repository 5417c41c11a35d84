//! On-chain event store interface

use async_trait::async_trait;

use crate::errors::HubResult;
use crate::identifiers::Fid;
use crate::onchain::{IdRegisterEvent, SignerEvent};

#[async_trait]
pub trait OnChainEventEffects: Send + Sync {
    /// Whether the network has observed the signer migration event
    async fn is_signer_migrated(&self) -> HubResult<bool>;

    /// Active on-chain signer event for `(fid, key)`, `not_found` otherwise
    async fn get_active_signer(&self, fid: Fid, key: &[u8]) -> HubResult<SignerEvent>;

    /// Latest id registry event for the account, `not_found` if unregistered
    async fn get_id_register_event_by_fid(&self, fid: Fid) -> HubResult<IdRegisterEvent>;
}
