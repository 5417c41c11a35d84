//! Wall-clock time

use std::time::{SystemTime, UNIX_EPOCH};

pub trait PhysicalTimeEffects: Send + Sync {
    /// Unix time in milliseconds
    fn now_ms(&self) -> u64;
}

/// System clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemTimeHandler;

impl PhysicalTimeEffects for SystemTimeHandler {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}
