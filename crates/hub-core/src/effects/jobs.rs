//! Revocation job queue interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::HubResult;
use crate::identifiers::Fid;

/// Invalidate everything `signer` produced for `fid`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevocationJob {
    pub fid: Fid,
    pub signer: Vec<u8>,
}

/// When a queued job becomes runnable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobSchedule {
    Now,
    /// Unix time in milliseconds
    At(u64),
}

#[async_trait]
pub trait RevokeJobQueue: Send + Sync {
    /// Fire-and-forget scheduling; delivery semantics belong to the queue
    async fn enqueue_job(&self, job: RevocationJob, schedule: JobSchedule) -> HubResult<()>;
}
