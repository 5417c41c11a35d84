//! Purchased storage interface

use async_trait::async_trait;

use crate::errors::HubResult;
use crate::identifiers::Fid;

#[async_trait]
pub trait StorageUnitsEffects: Send + Sync {
    /// Storage units currently held by the account
    async fn current_storage_units(&self, fid: Fid) -> HubResult<u64>;
}
