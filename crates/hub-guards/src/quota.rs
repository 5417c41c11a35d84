//! Admission quota guard
//!
//! Scales the per-account admission ceiling by purchased storage: an account
//! holding `units` may submit `units * total_prune_size` messages per window,
//! where `total_prune_size` is the summed per-unit capacity of every store.

use std::sync::Arc;

use hub_core::effects::{RateLimiterEffects, StorageUnitsEffects};
use hub_core::{Fid, HubResult};

pub struct QuotaGuard {
    storage: Arc<dyn StorageUnitsEffects>,
    limiter: Arc<dyn RateLimiterEffects>,
    total_prune_size: u64,
    enabled: bool,
}

impl QuotaGuard {
    pub fn new(
        storage: Arc<dyn StorageUnitsEffects>,
        limiter: Arc<dyn RateLimiterEffects>,
        total_prune_size: u64,
    ) -> Self {
        Self {
            storage,
            limiter,
            total_prune_size,
            enabled: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Admission ceiling for an account holding `units`
    pub fn ceiling(&self, units: u64) -> u64 {
        units.saturating_mul(self.total_prune_size)
    }

    /// Consume one admission for `fid`, failing with the limiter's error
    pub async fn check(&self, fid: Fid) -> HubResult<()> {
        if !self.enabled {
            return Ok(());
        }
        let units = self.storage.current_storage_units(fid).await?;
        let ceiling = self.ceiling(units);
        self.limiter
            .consume(&fid.to_string(), ceiling)
            .await
            .map_err(|err| {
                tracing::debug!(%fid, units, ceiling, error = %err, "admission quota exceeded");
                err
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::HubErrorCode;
    use hub_testkit::{MockStorageUnits, RecordingRateLimiter};

    #[tokio::test]
    async fn ceiling_scales_with_units() {
        let units = Arc::new(MockStorageUnits::new());
        units.set_units(Fid(9), 3);
        let limiter = Arc::new(RecordingRateLimiter::new());
        let guard = QuotaGuard::new(units, limiter.clone(), 100);

        guard.check(Fid(9)).await.unwrap();
        assert_eq!(limiter.calls(), vec![("9".to_string(), 300)]);
    }

    #[tokio::test]
    async fn limiter_error_is_returned_unchanged() {
        let limiter = Arc::new(RecordingRateLimiter::new());
        limiter.deny(true);
        let guard = QuotaGuard::new(Arc::new(MockStorageUnits::new()), limiter, 10);
        let err = guard.check(Fid(1)).await.unwrap_err();
        assert_eq!(err.code, HubErrorCode::RateLimited);
    }

    #[tokio::test]
    async fn disabled_guard_skips_the_limiter() {
        let limiter = Arc::new(RecordingRateLimiter::new());
        limiter.deny(true);
        let guard =
            QuotaGuard::new(Arc::new(MockStorageUnits::new()), limiter.clone(), 10).with_enabled(false);
        assert!(guard.check(Fid(1)).await.is_ok());
        assert!(limiter.calls().is_empty());
    }
}
