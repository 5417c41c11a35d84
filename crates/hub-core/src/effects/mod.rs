//! Collaborator interfaces (pure signatures, no implementations)
//!
//! The engine consumes every external system through one of these traits:
//! per-category CRDT stores, the on-chain event store, the username proof
//! index, the ENS resolver, the revocation job queue, the rate limiter, the
//! storage-unit source and wall-clock time. Production implementations live
//! with the storage and network layers; in-memory ones live in `hub-testkit`.

pub mod jobs;
pub mod onchain;
pub mod rate_limit;
pub mod resolver;
pub mod storage;
pub mod store;
pub mod time;

pub use jobs::{JobSchedule, RevocationJob, RevokeJobQueue};
pub use onchain::OnChainEventEffects;
pub use rate_limit::RateLimiterEffects;
pub use resolver::{NameResolverEffects, ResolverError, UsernameProofEffects};
pub use storage::StorageUnitsEffects;
pub use store::{MessageStore, StoreQuery};
pub use time::{PhysicalTimeEffects, SystemTimeHandler};
