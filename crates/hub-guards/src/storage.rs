//! Storage-unit ledger
//!
//! Units are bought through storage rent events and expire. The ledger keeps
//! every rent event per account and sums the ones that have not expired.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hub_core::effects::{PhysicalTimeEffects, StorageUnitsEffects};
use hub_core::{Fid, HubResult, StorageRentEvent};
use parking_lot::RwLock;

pub struct StorageRentLedger {
    time: Arc<dyn PhysicalTimeEffects>,
    rents: RwLock<HashMap<Fid, Vec<StorageRentEvent>>>,
}

impl StorageRentLedger {
    pub fn new(time: Arc<dyn PhysicalTimeEffects>) -> Self {
        Self {
            time,
            rents: RwLock::new(HashMap::new()),
        }
    }

    /// Record a rent event. Replays of the same event are ignored.
    pub fn apply(&self, event: &StorageRentEvent) {
        let mut rents = self.rents.write();
        let entries = rents.entry(event.fid).or_default();
        if entries.contains(event) {
            return;
        }
        tracing::debug!(
            fid = %event.fid,
            units = event.units,
            expiry = event.expiry,
            "storage rent recorded"
        );
        entries.push(event.clone());
    }

    /// Units held by `fid` at `now_secs`
    pub fn units_at(&self, fid: Fid, now_secs: u64) -> u64 {
        self.rents
            .read()
            .get(&fid)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|rent| rent.expiry > now_secs)
                    .map(|rent| rent.units)
                    .fold(0u64, u64::saturating_add)
            })
            .unwrap_or(0)
    }

    /// Drop expired rent events, returning how many were removed
    pub fn prune_expired(&self) -> usize {
        let now_secs = self.time.now_ms() / 1000;
        let mut rents = self.rents.write();
        let mut removed = 0;
        rents.retain(|_, entries| {
            let before = entries.len();
            entries.retain(|rent| rent.expiry > now_secs);
            removed += before - entries.len();
            !entries.is_empty()
        });
        removed
    }
}

#[async_trait]
impl StorageUnitsEffects for StorageRentLedger {
    async fn current_storage_units(&self, fid: Fid) -> HubResult<u64> {
        Ok(self.units_at(fid, self.time.now_ms() / 1000))
    }
}
