//! Hub Engine - message admission and store dispatch
//!
//! The engine sits between the network and the CRDT stores. It decides
//! whether a signed message may be merged and, once merged, reacts to the
//! lifecycle events the stores emit.
//!
//! - [`engine`]: the admission pipeline, revocation and prune entry points, reads
//! - [`worker_pool`]: off-thread structural validation with request correlation
//! - [`username`]: fname and ENS ownership checks
//! - [`revocation`]: lifecycle events to signer revocation jobs
//! - [`jobs`]: in-process delayed revocation queue and its worker
//! - [`stores`]: store facade registry

#![allow(missing_docs)]
#![forbid(unsafe_code)]

pub mod engine;
pub mod jobs;
pub mod revocation;
pub mod stores;
pub mod username;
pub mod worker_pool;

pub use engine::{Engine, EngineEffects};
pub use jobs::{DelayedRevokeJobQueue, RevokeSignerJobWorker};
pub use revocation::{revocation_for, RevocationCoordinator};
pub use stores::{StoreReport, StoreSet};
pub use username::UsernameChecks;
pub use worker_pool::{PendingJobs, ValidationResponse, ValidationWorkerPool, Validator};
