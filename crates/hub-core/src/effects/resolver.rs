//! Name resolution interfaces

use async_trait::async_trait;

use crate::errors::HubResult;
use crate::message::UserNameProof;

/// Failure to reach or query the ENS resolver
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolverError {
    #[error("resolver unreachable: {0}")]
    Unreachable(String),
    #[error("resolver request failed: {0}")]
    RequestFailed(String),
}

#[async_trait]
pub trait NameResolverEffects: Send + Sync {
    /// Resolve an ENS name to an address. `Ok(None)` means the name resolved
    /// to nothing; `Err` means resolution itself could not be performed.
    async fn resolve_ens_address(&self, name: &str) -> Result<Option<Vec<u8>>, ResolverError>;
}

/// Index of current username proofs, registry-assigned and ENS
#[async_trait]
pub trait UsernameProofEffects: Send + Sync {
    async fn get_username_proof(&self, name: &str) -> HubResult<UserNameProof>;
}
