//! Store facade registry
//!
//! One facade per store category. The engine routes merges and revocations by
//! `MessageType::store_kind()`.

use std::collections::BTreeMap;
use std::sync::Arc;

use hub_core::effects::MessageStore;
use hub_core::{HubError, HubResult, Message, StoreKind};

#[derive(Clone)]
pub struct StoreSet {
    stores: BTreeMap<StoreKind, Arc<dyn MessageStore>>,
}

impl StoreSet {
    /// Build from one facade per category; every category must be present once
    pub fn new(stores: impl IntoIterator<Item = Arc<dyn MessageStore>>) -> HubResult<Self> {
        let mut by_kind = BTreeMap::new();
        for store in stores {
            let kind = store.kind();
            if by_kind.insert(kind, store).is_some() {
                return Err(HubError::invalid_param(format!(
                    "more than one {kind} store registered"
                )));
            }
        }
        if let Some(missing) = StoreKind::ALL
            .iter()
            .find(|kind| !by_kind.contains_key(*kind))
        {
            return Err(HubError::invalid_param(format!("no {missing} store registered")));
        }
        Ok(Self { stores: by_kind })
    }

    pub fn get(&self, kind: StoreKind) -> HubResult<&Arc<dyn MessageStore>> {
        self.stores.get(&kind).ok_or_else(|| {
            HubError::validation_failure(format!("unsupported message type for {kind} store"))
        })
    }

    /// Facade owning messages of `message`'s type
    pub fn for_message(&self, message: &Message) -> HubResult<&Arc<dyn MessageStore>> {
        self.get(message.data()?.message_type.store_kind())
    }

    /// Summed per-unit prune size limits across every store
    pub fn total_prune_size(&self) -> u64 {
        self.stores
            .values()
            .map(|store| store.prune_size_limit())
            .fold(0u64, u64::saturating_add)
    }

    pub fn iter(&self) -> impl Iterator<Item = (StoreKind, &Arc<dyn MessageStore>)> {
        self.stores.iter().map(|(kind, store)| (*kind, store))
    }
}

/// Per-store outcome of pruning or revoking across every store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreReport {
    /// Messages removed per store
    pub counts: BTreeMap<StoreKind, usize>,
    /// Stores whose operation failed
    pub failures: BTreeMap<StoreKind, HubError>,
}

impl StoreReport {
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn count(&self, kind: StoreKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_testkit::{MemoryMessageStore, MemoryStores};

    #[test]
    fn total_prune_size_sums_every_store() {
        let set = StoreSet::new(MemoryStores::new().all()).unwrap();
        assert_eq!(
            set.total_prune_size(),
            5000 + 2500 + 2500 + 100 + 50 + 25 + 5
        );
    }

    #[test]
    fn missing_or_repeated_categories_are_rejected() {
        let mut stores = MemoryStores::new().all();
        stores.pop();
        assert!(StoreSet::new(stores.clone()).is_err());

        stores.push(Arc::new(MemoryMessageStore::new(StoreKind::Cast)));
        assert!(StoreSet::new(stores).is_err());
    }
}
