//! Shared engine fixture for integration tests

#![allow(dead_code)]

use std::sync::Arc;

use hub_core::effects::{RateLimiterEffects, RevokeJobQueue, StorageUnitsEffects};
use hub_core::{Fid, HubConfig, HubEvent};
use hub_engine::{Engine, EngineEffects, StoreSet};
use hub_guards::{SlidingWindowRateLimiter, StorageRentLedger};
use hub_signature::{CustodySigner, MessageSigner};
use hub_testkit::{
    factories, MemoryStores, MemoryUsernameProofs, MockNameResolver, MockOnChainEvents,
    MockStorageUnits, MockTime, RecordingJobQueue, RecordingRateLimiter,
};
use tokio::sync::broadcast;

pub const NOW_MS: u64 = 1_000_000;

/// Configuration that validates on the calling task
pub fn inline_config() -> HubConfig {
    let mut config = HubConfig::default();
    config.validation.workers = Some(0);
    config
}

pub struct Harness {
    pub engine: Arc<Engine>,
    pub stores: MemoryStores,
    pub onchain: Arc<MockOnChainEvents>,
    pub proofs: Arc<MemoryUsernameProofs>,
    pub resolver: Arc<MockNameResolver>,
    pub jobs: Arc<RecordingJobQueue>,
    pub limiter: Arc<RecordingRateLimiter>,
    pub storage: Arc<MockStorageUnits>,
    pub time: Arc<MockTime>,
    pub ledger: Arc<StorageRentLedger>,
    /// Set when the quota runs on the real limiter and rent ledger
    pub quota_limiter: Option<Arc<SlidingWindowRateLimiter>>,
    pub events: broadcast::Sender<HubEvent>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_config(inline_config())
    }

    pub fn with_config(config: HubConfig) -> Self {
        let (events, _) = broadcast::channel(256);
        let stores = MemoryStores::with_events(&events);
        Self::build(config, stores, events, None)
    }

    /// Harness whose engine schedules revocations on `queue`
    pub fn with_job_queue(queue: Arc<dyn RevokeJobQueue>, time: Arc<MockTime>) -> Self {
        let (events, _) = broadcast::channel(256);
        let stores = MemoryStores::with_events(&events);
        Self::build_with_time(inline_config(), stores, events, Some(queue), time, false)
    }

    pub fn with_stores(stores: MemoryStores) -> Self {
        let (events, _) = broadcast::channel(256);
        Self::build(inline_config(), stores, events, None)
    }

    /// Quota backed by a sliding-window limiter built from the config and
    /// the storage rent ledger
    pub fn with_local_quota(stores: MemoryStores) -> Self {
        let (events, _) = broadcast::channel(256);
        let time = Arc::new(MockTime::new(NOW_MS));
        Self::build_with_time(inline_config(), stores, events, None, time, true)
    }

    fn build(
        config: HubConfig,
        stores: MemoryStores,
        events: broadcast::Sender<HubEvent>,
        queue: Option<Arc<dyn RevokeJobQueue>>,
    ) -> Self {
        let time = Arc::new(MockTime::new(NOW_MS));
        Self::build_with_time(config, stores, events, queue, time, false)
    }

    fn build_with_time(
        config: HubConfig,
        stores: MemoryStores,
        events: broadcast::Sender<HubEvent>,
        queue: Option<Arc<dyn RevokeJobQueue>>,
        time: Arc<MockTime>,
        local_quota: bool,
    ) -> Self {
        let onchain = Arc::new(MockOnChainEvents::new());
        let proofs = Arc::new(MemoryUsernameProofs::new());
        let resolver = Arc::new(MockNameResolver::new());
        let jobs = Arc::new(RecordingJobQueue::new());
        let limiter = Arc::new(RecordingRateLimiter::new());
        let storage = Arc::new(MockStorageUnits::new());
        let ledger = Arc::new(StorageRentLedger::new(time.clone()));

        let job_queue: Arc<dyn RevokeJobQueue> = match queue {
            Some(queue) => queue,
            None => jobs.clone(),
        };
        let quota_limiter = local_quota.then(|| {
            Arc::new(SlidingWindowRateLimiter::from_config(
                &config.rate_limit,
                time.clone(),
            ))
        });
        let rate_limiter: Arc<dyn RateLimiterEffects> = match &quota_limiter {
            Some(sliding) => sliding.clone(),
            None => limiter.clone(),
        };
        let storage_units: Arc<dyn StorageUnitsEffects> = if local_quota {
            ledger.clone()
        } else {
            storage.clone()
        };
        let effects = EngineEffects {
            stores: StoreSet::new(stores.all()).unwrap(),
            onchain: onchain.clone(),
            username_proofs: proofs.clone(),
            name_resolver: resolver.clone(),
            job_queue,
            rate_limiter,
            storage_units,
            time: time.clone(),
            rent_ledger: Some(ledger.clone()),
        };
        let engine = Arc::new(Engine::new(config, effects).unwrap());

        Self {
            engine,
            stores,
            onchain,
            proofs,
            resolver,
            jobs,
            limiter,
            storage,
            time,
            ledger,
            quota_limiter,
            events,
        }
    }

    /// Legacy account: `custody` owns the fid and has added `signer`
    pub async fn legacy_account(&self, fid: u64, custody: &CustodySigner, signer: &MessageSigner) {
        self.onchain.register(Fid(fid), custody.address());
        let add = factories::signer_add(custody, fid, &signer.public_key());
        self.engine.merge_message(add).await.unwrap();
    }

    /// Migrated account with `signer` registered on chain
    pub async fn migrated_account(&self, fid: u64, signer: &MessageSigner) {
        self.onchain.set_migrated(true);
        self.engine.start().await.unwrap();
        self.onchain.register(Fid(fid), factories::eth_address(fid as u8));
        self.onchain.add_signer(Fid(fid), signer.public_key());
    }
}
