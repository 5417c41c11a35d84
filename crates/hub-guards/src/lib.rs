//! Hub Guards - admission checks that consult account state
//!
//! - [`authority`]: custody/signer authority under the legacy and migrated models
//! - [`quota`]: storage-scaled admission ceiling
//! - [`rate_limit`]: per-key sliding window limiter
//! - [`storage`]: storage units from rent events

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod authority;
pub mod quota;
pub mod rate_limit;
pub mod storage;

pub use authority::{Authority, AuthorityModel, AuthorityResolver, MigrationState};
pub use quota::QuotaGuard;
pub use rate_limit::{RateLimiterStatistics, SlidingWindowRateLimiter};
pub use storage::StorageRentLedger;
