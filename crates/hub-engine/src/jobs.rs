//! In-process delayed revocation jobs
//!
//! [`DelayedRevokeJobQueue`] orders jobs by run-at time; jobs scheduled for
//! the same instant keep their enqueue order. [`RevokeSignerJobWorker`] drains
//! due jobs through the engine and sleeps until the next one is due or a new
//! job arrives. When given the admission rate limiter it also sweeps idle
//! per-account counters, at most once per idle poll interval.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hub_core::effects::{JobSchedule, PhysicalTimeEffects, RevocationJob, RevokeJobQueue};
use hub_core::{to_hex, HubResult};
use hub_guards::SlidingWindowRateLimiter;
use parking_lot::Mutex;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;

use crate::engine::Engine;

/// Upper bound on how long an idle worker sleeps between queue checks
const IDLE_POLL: Duration = Duration::from_secs(60);

pub struct DelayedRevokeJobQueue {
    jobs: Mutex<BTreeMap<(u64, u64), RevocationJob>>,
    seq: AtomicU64,
    notify: Notify,
    time: Arc<dyn PhysicalTimeEffects>,
}

impl DelayedRevokeJobQueue {
    pub fn new(time: Arc<dyn PhysicalTimeEffects>) -> Self {
        Self {
            jobs: Mutex::new(BTreeMap::new()),
            seq: AtomicU64::new(0),
            notify: Notify::new(),
            time,
        }
    }

    /// Remove and return every job due at `now_ms`, earliest first
    pub fn pop_due(&self, now_ms: u64) -> Vec<RevocationJob> {
        let mut jobs = self.jobs.lock();
        let later = jobs.split_off(&(now_ms.saturating_add(1), 0));
        let due = std::mem::replace(&mut *jobs, later);
        due.into_values().collect()
    }

    /// Run-at time of the earliest queued job
    pub fn next_due(&self) -> Option<u64> {
        self.jobs.lock().keys().next().map(|(run_at, _)| *run_at)
    }

    pub fn len(&self) -> usize {
        self.jobs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.lock().is_empty()
    }

    async fn notified(&self) {
        self.notify.notified().await;
    }
}

#[async_trait]
impl RevokeJobQueue for DelayedRevokeJobQueue {
    async fn enqueue_job(&self, job: RevocationJob, schedule: JobSchedule) -> HubResult<()> {
        let run_at = match schedule {
            JobSchedule::Now => self.time.now_ms(),
            JobSchedule::At(run_at) => run_at,
        };
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            fid = %job.fid,
            signer = %to_hex(&job.signer),
            run_at,
            "revocation job queued"
        );
        self.jobs.lock().insert((run_at, seq), job);
        self.notify.notify_one();
        Ok(())
    }
}

/// Runs due revocation jobs against the engine
pub struct RevokeSignerJobWorker {
    engine: Arc<Engine>,
    queue: Arc<DelayedRevokeJobQueue>,
    time: Arc<dyn PhysicalTimeEffects>,
    rate_limiter: Option<Arc<SlidingWindowRateLimiter>>,
}

impl RevokeSignerJobWorker {
    pub fn new(
        engine: Arc<Engine>,
        queue: Arc<DelayedRevokeJobQueue>,
        time: Arc<dyn PhysicalTimeEffects>,
    ) -> Self {
        Self {
            engine,
            queue,
            time,
            rate_limiter: None,
        }
    }

    /// Sweep this limiter's idle counters from the worker loop
    pub fn with_rate_limiter(mut self, limiter: Arc<SlidingWindowRateLimiter>) -> Self {
        self.rate_limiter = Some(limiter);
        self
    }

    /// Drop rate-limit counters outside every sliding window
    pub fn evict_idle_counters(&self) -> usize {
        let Some(limiter) = &self.rate_limiter else {
            return 0;
        };
        let evicted = limiter.evict_idle();
        if evicted > 0 {
            tracing::debug!(
                evicted,
                remaining = limiter.tracked_keys(),
                "evicted idle rate limit counters"
            );
        }
        evicted
    }

    /// Run every job due now; returns the number of jobs run
    ///
    /// A failing job is logged and dropped. Stores report their own
    /// per-store failures through the revocation report.
    pub async fn run_due(&self) -> usize {
        let due = self.queue.pop_due(self.time.now_ms());
        let count = due.len();
        for job in due {
            match self
                .engine
                .revoke_messages_by_signer(job.fid, &job.signer)
                .await
            {
                Ok(report) => tracing::info!(
                    fid = %job.fid,
                    signer = %to_hex(&job.signer),
                    revoked = report.total(),
                    failed_stores = report.failures.len(),
                    "revoked messages by signer"
                ),
                Err(err) => tracing::error!(
                    fid = %job.fid,
                    signer = %to_hex(&job.signer),
                    error = %err,
                    "revocation job failed"
                ),
            }
        }
        count
    }

    /// Spawn the worker loop; send `true` on the returned channel to stop it
    pub fn spawn(self) -> (JoinHandle<()>, watch::Sender<bool>) {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(self.run(shutdown_rx));
        (handle, shutdown_tx)
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("revocation worker started");
        let sweep_interval_ms = IDLE_POLL.as_millis() as u64;
        let mut next_sweep = 0u64;
        loop {
            if *shutdown.borrow() {
                break;
            }
            self.run_due().await;

            let now = self.time.now_ms();
            if now >= next_sweep {
                self.evict_idle_counters();
                next_sweep = now.saturating_add(sweep_interval_ms);
            }

            let wait = match self.queue.next_due() {
                Some(run_at) => {
                    Duration::from_millis(run_at.saturating_sub(self.time.now_ms())).min(IDLE_POLL)
                }
                None => IDLE_POLL,
            };
            tokio::select! {
                _ = self.queue.notified() => {}
                _ = tokio::time::sleep(wait) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("revocation worker stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::Fid;
    use hub_testkit::MockTime;

    fn job(fid: u64) -> RevocationJob {
        RevocationJob {
            fid: Fid(fid),
            signer: vec![fid as u8; 32],
        }
    }

    #[tokio::test]
    async fn jobs_come_out_in_run_at_order() {
        let time = Arc::new(MockTime::new(1_000));
        let queue = DelayedRevokeJobQueue::new(time.clone());
        queue.enqueue_job(job(1), JobSchedule::At(5_000)).await.unwrap();
        queue.enqueue_job(job(2), JobSchedule::Now).await.unwrap();
        queue.enqueue_job(job(3), JobSchedule::Now).await.unwrap();

        assert_eq!(queue.next_due(), Some(1_000));
        assert_eq!(queue.pop_due(time.now_ms()), vec![job(2), job(3)]);
        assert!(queue.pop_due(4_999).is_empty());
        assert_eq!(queue.pop_due(5_000), vec![job(1)]);
        assert!(queue.is_empty());
    }
}
