//! Admission rate limiter interface

use async_trait::async_trait;

use crate::errors::HubResult;

#[async_trait]
pub trait RateLimiterEffects: Send + Sync {
    /// Consume one admission for `key` against `ceiling` admissions per window.
    /// Fails with `bad_request.rate_limited` once the ceiling is reached.
    async fn consume(&self, key: &str, ceiling: u64) -> HubResult<()>;
}
