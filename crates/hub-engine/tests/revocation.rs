//! Lifecycle events, revocation cascades and pruning through the engine

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{Harness, NOW_MS};
use hub_core::effects::{
    JobSchedule, MessageStore, PhysicalTimeEffects, RevocationJob, RevokeJobQueue,
};
use hub_core::{
    Fid, HubError, HubErrorCode, HubEvent, IdRegisterEvent, IdRegisterEventType, OnChainEvent,
    StorageRentEvent, StoreKind,
};
use hub_engine::{DelayedRevokeJobQueue, RevokeSignerJobWorker};
use hub_guards::SlidingWindowRateLimiter;
use hub_testkit::{factories, MemoryMessageStore, MemoryStores, MockTime};

/// Feed every event the stores have emitted so far through the engine
async fn drain(harness: &Harness, events: &mut tokio::sync::broadcast::Receiver<HubEvent>) {
    while let Ok(event) = events.try_recv() {
        harness.engine.handle_event(&event).await.unwrap();
    }
}

fn transfer(fid: u64, from: Vec<u8>) -> HubEvent {
    HubEvent::MergeIdRegistryEvent {
        event: IdRegisterEvent {
            fid: Fid(fid),
            event_type: IdRegisterEventType::Transfer,
            to: factories::eth_address(2),
            from,
            block_timestamp: 0,
        },
    }
}

#[tokio::test]
async fn merged_signer_remove_schedules_one_immediate_job() {
    let harness = Harness::new();
    let mut events = harness.events.subscribe();
    let custody = factories::custody(1);
    let signer = factories::signer(2);
    harness.legacy_account(1, &custody, &signer).await;

    let remove = factories::signer_remove(&custody, 1, &signer.public_key());
    harness.engine.merge_message(remove).await.unwrap();
    drain(&harness, &mut events).await;

    assert_eq!(
        harness.jobs.jobs(),
        vec![(
            RevocationJob {
                fid: Fid(1),
                signer: signer.public_key(),
            },
            JobSchedule::Now
        )]
    );
}

#[tokio::test]
async fn custody_transfer_is_revoked_after_the_grace_period() {
    let harness = Harness::new();

    harness
        .engine
        .handle_event(&transfer(1, factories::eth_address(1)))
        .await
        .unwrap();
    harness
        .engine
        .handle_event(&transfer(1, Vec::new()))
        .await
        .unwrap();

    let grace_ms = harness.engine.config().revocation.transfer_grace_secs * 1000;
    assert_eq!(
        harness.jobs.jobs(),
        vec![(
            RevocationJob {
                fid: Fid(1),
                signer: factories::eth_address(1),
            },
            JobSchedule::At(NOW_MS + grace_ms)
        )]
    );
}

#[tokio::test]
async fn migration_event_flips_the_authority_model_once() {
    let harness = Harness::new();
    assert!(!harness.engine.is_migrated());

    let event = HubEvent::MergeOnChainEvent {
        event: OnChainEvent::SignerMigrated { migrated_at: 5 },
    };
    harness.engine.handle_event(&event).await.unwrap();
    harness.engine.handle_event(&event).await.unwrap();
    assert!(harness.engine.is_migrated());
}

#[tokio::test]
async fn storage_rent_events_feed_the_ledger() {
    let harness = Harness::new();
    let rent = StorageRentEvent {
        fid: Fid(3),
        units: 2,
        expiry: NOW_MS / 1000 + 60,
    };
    let event = HubEvent::MergeOnChainEvent {
        event: OnChainEvent::StorageRent(rent),
    };
    harness.engine.handle_event(&event).await.unwrap();
    harness.engine.handle_event(&event).await.unwrap();

    assert_eq!(harness.ledger.units_at(Fid(3), NOW_MS / 1000), 2);
}

#[tokio::test]
async fn reassigned_fname_revokes_the_username() {
    let harness = Harness::new();
    let custody = factories::custody(70);
    let signer = factories::signer(71);
    harness.legacy_account(7, &custody, &signer).await;
    let proof = factories::fname_proof("alice", 7, &factories::eth_address(7));
    harness.proofs.insert(proof.clone());
    let username = factories::username(&signer, 7, "alice");
    harness.engine.merge_message(username.clone()).await.unwrap();

    // Same name and fid replacing itself changes nothing
    let renewal = HubEvent::MergeUsernameProof {
        username_proof: Some(proof.clone()),
        deleted_username_proof: Some(proof.clone()),
    };
    harness.engine.handle_event(&renewal).await.unwrap();
    assert!(harness.stores.user_data.contains(&username));

    let reassigned = HubEvent::MergeUsernameProof {
        username_proof: Some(factories::fname_proof("alice", 9, &factories::eth_address(9))),
        deleted_username_proof: Some(proof),
    };
    harness.engine.handle_event(&reassigned).await.unwrap();
    assert!(!harness.stores.user_data.contains(&username));
}

#[tokio::test]
async fn revoke_by_signer_covers_every_store_and_records_failures() {
    let harness = Harness::new();
    let key = factories::signer(40);
    harness.migrated_account(4, &key).await;
    let first = factories::cast_add(&key, 4, "one");
    let second = factories::cast_add(&key, 4, "two");
    harness.engine.merge_message(first.clone()).await.unwrap();
    harness.engine.merge_message(second.clone()).await.unwrap();
    harness
        .stores
        .link
        .fail_with(HubError::storage_failure("link store offline"));

    let report = harness
        .engine
        .revoke_messages_by_signer(Fid(4), &key.public_key())
        .await
        .unwrap();

    assert_eq!(report.count(StoreKind::Cast), 2);
    assert_eq!(report.total(), 2);
    assert!(!report.is_complete());
    assert_eq!(
        report.failures.get(&StoreKind::Link).map(|err| err.code),
        Some(HubErrorCode::StorageFailure)
    );
    assert!(harness.stores.cast.messages(Fid(4)).is_empty());
}

#[tokio::test]
async fn revoke_by_signer_rejects_missing_parameters() {
    let harness = Harness::new();

    let err = harness
        .engine
        .revoke_messages_by_signer(Fid(0), &[1u8; 32])
        .await
        .unwrap_err();
    assert_eq!(err.code, HubErrorCode::InvalidParam);
    let err = harness
        .engine
        .revoke_messages_by_signer(Fid(1), &[])
        .await
        .unwrap_err();
    assert_eq!(err.code, HubErrorCode::InvalidParam);
}

#[tokio::test]
async fn prune_trims_each_store_to_its_limit() {
    let mut stores = MemoryStores::new();
    stores.cast = Arc::new(MemoryMessageStore::new(StoreKind::Cast).with_prune_size_limit(2));
    let harness = Harness::with_stores(stores);
    let signer = factories::signer(5);
    for (i, timestamp) in [100_001u32, 100_002, 100_003].into_iter().enumerate() {
        let data = factories::with_timestamp(
            factories::cast_add_data(5, &format!("cast {i}")),
            timestamp,
        );
        harness
            .stores
            .cast
            .merge(&factories::sign(&signer, data))
            .await
            .unwrap();
    }

    let report = harness.engine.prune_messages(Fid(5)).await.unwrap();
    assert_eq!(report.count(StoreKind::Cast), 1);
    assert_eq!(report.total(), 1);
    assert!(report.is_complete());
    assert_eq!(harness.stores.cast.messages(Fid(5)).len(), 2);
}

#[tokio::test]
async fn signer_removal_cascades_through_the_job_worker() {
    let time = Arc::new(MockTime::new(NOW_MS));
    let queue = Arc::new(DelayedRevokeJobQueue::new(time.clone()));
    let harness = Harness::with_job_queue(queue.clone(), time.clone());
    let event_loop = harness.engine.spawn_event_loop(harness.events.subscribe());

    let custody = factories::custody(1);
    let signer = factories::signer(2);
    harness.legacy_account(1, &custody, &signer).await;
    let casts: Vec<_> = (0..3)
        .map(|i| factories::cast_add(&signer, 1, &format!("cast {i}")))
        .collect();
    for cast in &casts {
        harness.engine.merge_message(cast.clone()).await.unwrap();
    }

    let remove = factories::signer_remove(&custody, 1, &signer.public_key());
    harness.engine.merge_message(remove).await.unwrap();

    for _ in 0..100 {
        if !queue.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(queue.len(), 1);
    assert_eq!(queue.next_due(), Some(time.now_ms()));

    let worker = RevokeSignerJobWorker::new(harness.engine.clone(), queue.clone(), time);
    assert_eq!(worker.run_due().await, 1);
    assert!(harness.stores.cast.messages(Fid(1)).is_empty());
    assert!(queue.is_empty());

    event_loop.abort();
}

#[tokio::test]
async fn spawned_worker_runs_delayed_jobs_once_due() {
    let time = Arc::new(MockTime::new(NOW_MS));
    let queue = Arc::new(DelayedRevokeJobQueue::new(time.clone()));
    let harness = Harness::with_job_queue(queue.clone(), time.clone());
    let key = factories::signer(3);
    harness.migrated_account(3, &key).await;
    let cast = factories::cast_add(&key, 3, "soon gone");
    harness.engine.merge_message(cast.clone()).await.unwrap();

    let (handle, shutdown) =
        RevokeSignerJobWorker::new(harness.engine.clone(), queue.clone(), time.clone()).spawn();
    harness
        .engine
        .handle_event(&transfer(3, key.public_key()))
        .await
        .unwrap();
    assert_eq!(queue.len(), 1);

    // Not yet due: the worker leaves it queued
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(queue.len(), 1);
    assert!(harness.stores.cast.contains(&cast));

    // A later enqueue wakes the worker, which now sees the transfer job as due
    time.advance(harness.engine.config().revocation.transfer_grace_secs * 1000);
    queue
        .enqueue_job(
            RevocationJob {
                fid: Fid(3),
                signer: vec![0u8; 32],
            },
            JobSchedule::Now,
        )
        .await
        .unwrap();

    for _ in 0..100 {
        if queue.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(queue.is_empty());
    assert!(!harness.stores.cast.contains(&cast));

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn worker_sweeps_idle_rate_limit_counters() {
    let time = Arc::new(MockTime::new(NOW_MS));
    let queue = Arc::new(DelayedRevokeJobQueue::new(time.clone()));
    let harness = Harness::with_job_queue(queue.clone(), time.clone());
    let rate_limit = &harness.engine.config().rate_limit;
    let limiter = Arc::new(SlidingWindowRateLimiter::from_config(
        rate_limit,
        time.clone(),
    ));
    limiter.try_consume("8", 10).unwrap();
    assert_eq!(limiter.tracked_keys(), 1);

    let (handle, shutdown) =
        RevokeSignerJobWorker::new(harness.engine.clone(), queue.clone(), time.clone())
            .with_rate_limiter(limiter.clone())
            .spawn();

    // Three windows on, the counter no longer weighs on any window
    time.advance(3 * rate_limit.window_secs * 1000);
    queue
        .enqueue_job(
            RevocationJob {
                fid: Fid(8),
                signer: vec![0u8; 32],
            },
            JobSchedule::Now,
        )
        .await
        .unwrap();

    for _ in 0..100 {
        if limiter.tracked_keys() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(limiter.tracked_keys(), 0);

    shutdown.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn custody_transfer_revokes_signer_messages_from_the_old_address() {
    let time = Arc::new(MockTime::new(NOW_MS));
    let queue = Arc::new(DelayedRevokeJobQueue::new(time.clone()));
    let harness = Harness::with_job_queue(queue.clone(), time.clone());
    let custody = factories::custody(80);
    let signer = factories::signer(81);
    harness.legacy_account(8, &custody, &signer).await;
    assert_eq!(harness.stores.signer.messages(Fid(8)).len(), 1);

    harness
        .engine
        .handle_event(&transfer(8, custody.address()))
        .await
        .unwrap();
    let worker = RevokeSignerJobWorker::new(harness.engine.clone(), queue.clone(), time.clone());
    assert_eq!(worker.run_due().await, 0);

    time.advance(harness.engine.config().revocation.transfer_grace_secs * 1000);
    assert_eq!(worker.run_due().await, 1);
    assert!(harness.stores.signer.messages(Fid(8)).is_empty());
}
