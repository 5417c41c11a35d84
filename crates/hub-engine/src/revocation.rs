//! Revocation cascade coordinator
//!
//! Maps lifecycle events to signer revocation jobs. Each trigger yields at
//! most one `(fid, signer)` job; deduplication is left to the queue and the
//! stores.
//!
//! | event | job | schedule |
//! |-------|-----|----------|
//! | id registry transfer with a previous custody address | `(fid, from)` | after the grace period |
//! | merged SignerRemove | `(fid, removed key)` | now |
//! | pruned or revoked SignerAdd | `(fid, added key)` | now |
//! | on-chain signer removal | `(fid, key)` | now |

use std::sync::Arc;
use std::time::Duration;

use hub_core::effects::{JobSchedule, PhysicalTimeEffects, RevocationJob, RevokeJobQueue};
use hub_core::{
    to_hex, HubEvent, HubResult, IdRegisterEvent, IdRegisterEventType, Message, MessageType,
    OnChainEvent, SignerEventType,
};

/// Revocation job for `event`, if it is one of the cascade triggers
pub fn revocation_for(
    event: &HubEvent,
    now_ms: u64,
    transfer_grace: Duration,
) -> Option<(RevocationJob, JobSchedule)> {
    match event {
        HubEvent::MergeIdRegistryEvent { event }
        | HubEvent::MergeOnChainEvent {
            event: OnChainEvent::IdRegister(event),
        } => transfer_revocation(event, now_ms, transfer_grace),
        HubEvent::MergeMessage { message, .. }
            if message.message_type() == Some(MessageType::SignerRemove) =>
        {
            signer_body_revocation(message)
        }
        HubEvent::PruneMessage { message } | HubEvent::RevokeMessage { message }
            if message.message_type() == Some(MessageType::SignerAdd) =>
        {
            signer_body_revocation(message)
        }
        HubEvent::MergeOnChainEvent {
            event: OnChainEvent::Signer(signer),
        } if signer.event_type == SignerEventType::Remove => Some((
            RevocationJob {
                fid: signer.fid,
                signer: signer.key.clone(),
            },
            JobSchedule::Now,
        )),
        _ => None,
    }
}

fn transfer_revocation(
    event: &IdRegisterEvent,
    now_ms: u64,
    transfer_grace: Duration,
) -> Option<(RevocationJob, JobSchedule)> {
    if event.event_type != IdRegisterEventType::Transfer || event.from.is_empty() {
        return None;
    }
    let run_at = now_ms.saturating_add(transfer_grace.as_millis() as u64);
    Some((
        RevocationJob {
            fid: event.fid,
            signer: event.from.clone(),
        },
        JobSchedule::At(run_at),
    ))
}

fn signer_body_revocation(message: &Message) -> Option<(RevocationJob, JobSchedule)> {
    let fid = message.fid()?;
    let signer = message.signer_body_key()?;
    Some((
        RevocationJob {
            fid,
            signer: signer.to_vec(),
        },
        JobSchedule::Now,
    ))
}

pub struct RevocationCoordinator {
    queue: Arc<dyn RevokeJobQueue>,
    time: Arc<dyn PhysicalTimeEffects>,
    transfer_grace: Duration,
}

impl RevocationCoordinator {
    pub fn new(
        queue: Arc<dyn RevokeJobQueue>,
        time: Arc<dyn PhysicalTimeEffects>,
        transfer_grace: Duration,
    ) -> Self {
        Self {
            queue,
            time,
            transfer_grace,
        }
    }

    pub fn plan(&self, event: &HubEvent) -> Option<(RevocationJob, JobSchedule)> {
        revocation_for(event, self.time.now_ms(), self.transfer_grace)
    }

    /// Enqueue the job for `event`, returning it when one was scheduled
    pub async fn on_event(&self, event: &HubEvent) -> HubResult<Option<RevocationJob>> {
        let Some((job, schedule)) = self.plan(event) else {
            return Ok(None);
        };
        tracing::info!(
            fid = %job.fid,
            signer = %to_hex(&job.signer),
            ?schedule,
            "scheduling signer revocation"
        );
        self.queue.enqueue_job(job.clone(), schedule).await?;
        Ok(Some(job))
    }
}
