//! Mock collaborators with controllable state and failure injection

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use hub_core::effects::{
    JobSchedule, NameResolverEffects, OnChainEventEffects, PhysicalTimeEffects,
    RateLimiterEffects, ResolverError, RevocationJob, RevokeJobQueue, StorageUnitsEffects,
    UsernameProofEffects,
};
use hub_core::{
    Fid, HubError, HubResult, IdRegisterEvent, IdRegisterEventType, SignerEvent, SignerEventType,
    UserNameProof,
};
use parking_lot::Mutex;

fn injected(failure: &Mutex<Option<HubError>>) -> HubResult<()> {
    match failure.lock().as_ref() {
        Some(err) => Err(err.clone()),
        None => Ok(()),
    }
}

/// On-chain event store backed by maps
#[derive(Default)]
pub struct MockOnChainEvents {
    migrated: AtomicBool,
    id_registers: Mutex<HashMap<Fid, IdRegisterEvent>>,
    signers: Mutex<HashMap<(Fid, Vec<u8>), SignerEvent>>,
    failure: Mutex<Option<HubError>>,
    id_lookups: AtomicUsize,
}

impl MockOnChainEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_migrated(&self, migrated: bool) {
        self.migrated.store(migrated, Ordering::SeqCst);
    }

    /// Register `fid` with `custody` as its custody address
    pub fn register(&self, fid: Fid, custody: Vec<u8>) -> IdRegisterEvent {
        let event = IdRegisterEvent {
            fid,
            event_type: IdRegisterEventType::Register,
            to: custody,
            from: Vec::new(),
            block_timestamp: 0,
        };
        self.insert_id_register(event.clone());
        event
    }

    /// Replace the latest id registry event for the account
    pub fn insert_id_register(&self, event: IdRegisterEvent) {
        self.id_registers.lock().insert(event.fid, event);
    }

    pub fn add_signer(&self, fid: Fid, key: Vec<u8>) -> SignerEvent {
        let event = SignerEvent {
            fid,
            key: key.clone(),
            event_type: SignerEventType::Add,
            key_type: 1,
            block_timestamp: 0,
        };
        self.signers.lock().insert((fid, key), event.clone());
        event
    }

    pub fn remove_signer(&self, fid: Fid, key: &[u8]) {
        self.signers.lock().remove(&(fid, key.to_vec()));
    }

    pub fn fail_with(&self, err: HubError) {
        *self.failure.lock() = Some(err);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    /// Number of id registry lookups served
    pub fn id_lookups(&self) -> usize {
        self.id_lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OnChainEventEffects for MockOnChainEvents {
    async fn is_signer_migrated(&self) -> HubResult<bool> {
        injected(&self.failure)?;
        Ok(self.migrated.load(Ordering::SeqCst))
    }

    async fn get_active_signer(&self, fid: Fid, key: &[u8]) -> HubResult<SignerEvent> {
        injected(&self.failure)?;
        self.signers
            .lock()
            .get(&(fid, key.to_vec()))
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("no active signer for fid {fid}")))
    }

    async fn get_id_register_event_by_fid(&self, fid: Fid) -> HubResult<IdRegisterEvent> {
        self.id_lookups.fetch_add(1, Ordering::SeqCst);
        injected(&self.failure)?;
        self.id_registers
            .lock()
            .get(&fid)
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("no id registry event for fid {fid}")))
    }
}

/// ENS resolver answering from a map
#[derive(Default)]
pub struct MockNameResolver {
    addresses: Mutex<HashMap<String, Vec<u8>>>,
    failure: Mutex<Option<ResolverError>>,
    calls: AtomicUsize,
}

impl MockNameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_address(&self, name: &str, address: Vec<u8>) {
        self.addresses.lock().insert(name.to_string(), address);
    }

    /// Make every resolution fail with `err`
    pub fn set_failure(&self, err: ResolverError) {
        *self.failure.lock() = Some(err);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl NameResolverEffects for MockNameResolver {
    async fn resolve_ens_address(&self, name: &str) -> Result<Option<Vec<u8>>, ResolverError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.failure.lock().as_ref() {
            return Err(err.clone());
        }
        Ok(self.addresses.lock().get(name).cloned())
    }
}

/// Username proof index keyed by name
#[derive(Default)]
pub struct MemoryUsernameProofs {
    proofs: Mutex<HashMap<String, UserNameProof>>,
    failure: Mutex<Option<HubError>>,
}

impl MemoryUsernameProofs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, proof: UserNameProof) {
        self.proofs.lock().insert(proof.name.clone(), proof);
    }

    pub fn remove(&self, name: &str) -> Option<UserNameProof> {
        self.proofs.lock().remove(name)
    }

    pub fn fail_with(&self, err: HubError) {
        *self.failure.lock() = Some(err);
    }
}

#[async_trait]
impl UsernameProofEffects for MemoryUsernameProofs {
    async fn get_username_proof(&self, name: &str) -> HubResult<UserNameProof> {
        injected(&self.failure)?;
        self.proofs
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| HubError::not_found(format!("no username proof for {name}")))
    }
}

/// Job queue that records every enqueue
#[derive(Default)]
pub struct RecordingJobQueue {
    jobs: Mutex<Vec<(RevocationJob, JobSchedule)>>,
    failure: Mutex<Option<HubError>>,
}

impl RecordingJobQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn jobs(&self) -> Vec<(RevocationJob, JobSchedule)> {
        self.jobs.lock().clone()
    }

    pub fn clear(&self) {
        self.jobs.lock().clear();
    }

    pub fn fail_with(&self, err: HubError) {
        *self.failure.lock() = Some(err);
    }
}

#[async_trait]
impl RevokeJobQueue for RecordingJobQueue {
    async fn enqueue_job(&self, job: RevocationJob, schedule: JobSchedule) -> HubResult<()> {
        injected(&self.failure)?;
        self.jobs.lock().push((job, schedule));
        Ok(())
    }
}

/// Storage units per account, one unit unless set
pub struct MockStorageUnits {
    units: Mutex<HashMap<Fid, u64>>,
    default_units: u64,
}

impl MockStorageUnits {
    pub fn new() -> Self {
        Self::with_default(1)
    }

    pub fn with_default(default_units: u64) -> Self {
        Self {
            units: Mutex::new(HashMap::new()),
            default_units,
        }
    }

    pub fn set_units(&self, fid: Fid, units: u64) {
        self.units.lock().insert(fid, units);
    }
}

impl Default for MockStorageUnits {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageUnitsEffects for MockStorageUnits {
    async fn current_storage_units(&self, fid: Fid) -> HubResult<u64> {
        Ok(self
            .units
            .lock()
            .get(&fid)
            .copied()
            .unwrap_or(self.default_units))
    }
}

/// Rate limiter that records `(key, ceiling)` and can be told to deny
#[derive(Default)]
pub struct RecordingRateLimiter {
    calls: Mutex<Vec<(String, u64)>>,
    deny: AtomicBool,
}

impl RecordingRateLimiter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny(&self, deny: bool) {
        self.deny.store(deny, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<(String, u64)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl RateLimiterEffects for RecordingRateLimiter {
    async fn consume(&self, key: &str, ceiling: u64) -> HubResult<()> {
        self.calls.lock().push((key.to_string(), ceiling));
        if self.deny.load(Ordering::SeqCst) {
            return Err(HubError::rate_limited(format!("rate limited: {key}")));
        }
        Ok(())
    }
}

/// Manually advanced clock
#[derive(Debug, Default)]
pub struct MockTime {
    now_ms: AtomicU64,
}

impl MockTime {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, ms: u64) {
        self.now_ms.fetch_add(ms, Ordering::SeqCst);
    }
}

impl PhysicalTimeEffects for MockTime {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}
