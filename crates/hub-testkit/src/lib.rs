//! Hub Testkit - fixtures for engine and guard tests
//!
//! In-memory store facades, mock collaborators with failure injection and
//! deterministic message factories. Test-only; never a runtime dependency.

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod factories;
pub mod mocks;
pub mod stores;

pub use mocks::{
    MemoryUsernameProofs, MockNameResolver, MockOnChainEvents, MockStorageUnits, MockTime,
    RecordingJobQueue, RecordingRateLimiter,
};
pub use stores::{MemoryMessageStore, MemoryStores};

/// Install a fmt subscriber for tests, honouring `RUST_LOG` (default `warn`)
///
/// Safe to call from every test; only the first call installs.
pub fn init_test_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}
