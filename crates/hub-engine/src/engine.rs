//! Admission engine
//!
//! Every inbound message passes through [`Engine::merge_message`] before it
//! can touch a store. The pipeline short-circuits on the first failure:
//!
//! 1. data presence and network match
//! 2. storage-scaled admission quota
//! 3. authority resolution (custody address, legacy or migrated model)
//! 4. signer-message gate, or signer authority for every other type
//! 5. username ownership side-check
//! 6. structural and signature validation (worker pool or inline)
//! 7. dispatch to the owning store, whose merge result is returned unchanged
//!
//! The engine never deletes messages itself. Revocation and pruning are store
//! operations it drives, and lifecycle events from the stores feed back in
//! through [`Engine::handle_event`].

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use hub_core::effects::{
    MessageStore, NameResolverEffects, OnChainEventEffects, PhysicalTimeEffects,
    RateLimiterEffects, RevokeJobQueue, StorageUnitsEffects, StoreQuery, UsernameProofEffects,
};
use hub_core::{
    to_hex, CastId, Fid, HubConfig, HubError, HubErrorCode, HubEvent, HubResult, IdRegisterEvent,
    LinkBody, Message, OnChainEvent, ReactionType, SeqNo, SignerEvent, StoreKind, UserDataType,
    UserNameProof,
};
use hub_guards::{AuthorityResolver, MigrationState, QuotaGuard, StorageRentLedger};
use hub_signature::{
    validate_cast_id, validate_ed25519_public_key, validate_eth_address, validate_fid,
    validate_username,
};
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::revocation::RevocationCoordinator;
use crate::stores::{StoreReport, StoreSet};
use crate::username::UsernameChecks;
use crate::worker_pool::ValidationWorkerPool;

/// Collaborators the engine is built from
pub struct EngineEffects {
    pub stores: StoreSet,
    pub onchain: Arc<dyn OnChainEventEffects>,
    pub username_proofs: Arc<dyn UsernameProofEffects>,
    pub name_resolver: Arc<dyn NameResolverEffects>,
    pub job_queue: Arc<dyn RevokeJobQueue>,
    pub rate_limiter: Arc<dyn RateLimiterEffects>,
    pub storage_units: Arc<dyn StorageUnitsEffects>,
    pub time: Arc<dyn PhysicalTimeEffects>,
    /// Ledger fed from storage rent events, usually also `storage_units`
    pub rent_ledger: Option<Arc<StorageRentLedger>>,
}

pub struct Engine {
    config: HubConfig,
    stores: StoreSet,
    onchain: Arc<dyn OnChainEventEffects>,
    username_proofs: Arc<dyn UsernameProofEffects>,
    authority: AuthorityResolver,
    quota: QuotaGuard,
    usernames: UsernameChecks,
    revocation: RevocationCoordinator,
    rent_ledger: Option<Arc<StorageRentLedger>>,
    pool: RwLock<Option<Arc<ValidationWorkerPool>>>,
}

impl Engine {
    pub fn new(config: HubConfig, effects: EngineEffects) -> HubResult<Self> {
        config.validate()?;
        let EngineEffects {
            stores,
            onchain,
            username_proofs,
            name_resolver,
            job_queue,
            rate_limiter,
            storage_units,
            time,
            rent_ledger,
        } = effects;

        let authority = AuthorityResolver::new(
            onchain.clone(),
            stores.get(StoreKind::Signer)?.clone(),
            Arc::new(MigrationState::default()),
        )?;
        let quota = QuotaGuard::new(storage_units, rate_limiter, stores.total_prune_size())
            .with_enabled(config.rate_limit.enabled);
        let usernames = UsernameChecks::new(
            username_proofs.clone(),
            name_resolver,
            stores.get(StoreKind::Verification)?.clone(),
            stores.get(StoreKind::UserData)?.clone(),
        )?;
        let revocation = RevocationCoordinator::new(
            job_queue,
            time,
            Duration::from_secs(config.revocation.transfer_grace_secs),
        );

        Ok(Self {
            config,
            stores,
            onchain,
            username_proofs,
            authority,
            quota,
            usernames,
            revocation,
            rent_ledger,
            pool: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &HubConfig {
        &self.config
    }

    pub fn stores(&self) -> &StoreSet {
        &self.stores
    }

    pub fn is_migrated(&self) -> bool {
        self.authority.migration().is_migrated()
    }

    /// Whether structural validation runs on the worker pool
    pub fn worker_pool_active(&self) -> bool {
        self.pool.read().is_some()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Load the migration flag and start the validation worker pool
    ///
    /// Must not race with `stop`. Without a pool, validation runs inline
    /// unless `validation.require_worker_pool` is set.
    pub async fn start(&self) -> HubResult<()> {
        let migrated = self.onchain.is_signer_migrated().await?;
        if migrated {
            self.authority.migration().mark_migrated();
        }

        if self.worker_pool_active() {
            tracing::debug!("validation worker pool already running");
        } else {
            self.start_worker_pool()?;
        }

        tracing::info!(
            network = %self.config.network,
            migrated,
            worker_pool = self.worker_pool_active(),
            "engine started"
        );
        Ok(())
    }

    fn start_worker_pool(&self) -> HubResult<()> {
        let workers = self.config.validation.effective_workers();
        if workers == 0 {
            tracing::info!("validation worker pool disabled, validating inline");
            return Ok(());
        }

        match ValidationWorkerPool::spawn(workers, self.config.validation.worker_timeout()) {
            Ok(pool) => {
                tracing::info!(workers, "validation worker pool started");
                *self.pool.write() = Some(Arc::new(pool));
                Ok(())
            }
            Err(err) if self.config.validation.require_worker_pool => {
                tracing::error!(error = %err, "validation worker pool is required but failed to start");
                Err(err)
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    "validation worker pool unavailable, running in degraded inline mode"
                );
                Ok(())
            }
        }
    }

    /// Shut down the worker pool
    ///
    /// Jobs already queued on workers finish before their threads exit.
    /// Later admissions validate inline.
    pub async fn stop(&self) {
        let pool = self.pool.write().take();
        if let Some(pool) = pool {
            if let Err(err) = tokio::task::spawn_blocking(move || pool.shutdown()).await {
                tracing::error!(error = %err, "validation worker pool shutdown failed");
            }
        }
        tracing::info!("engine stopped");
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Admit `message` and merge it into its store
    ///
    /// Returns the store's sequence number unchanged. Panics anywhere in the
    /// pipeline surface as `internal`.
    pub async fn merge_message(&self, message: Message) -> HubResult<SeqNo> {
        match AssertUnwindSafe(self.admit(message)).catch_unwind().await {
            Ok(result) => result,
            Err(_) => {
                tracing::error!("message admission panicked");
                Err(HubError::internal("unexpected failure while merging message"))
            }
        }
    }

    /// Admit a batch concurrently; results are in input order
    pub async fn merge_messages(&self, messages: Vec<Message>) -> Vec<HubResult<SeqNo>> {
        futures::future::join_all(messages.into_iter().map(|message| self.merge_message(message)))
            .await
    }

    /// The quota runs after the envelope check rather than first: a message
    /// without data or for another network has no fid worth charging, and
    /// rejecting it costs no lookup either way.
    async fn admit(&self, message: Message) -> HubResult<SeqNo> {
        let fid = self.check_envelope(&message)?;
        self.quota.check(fid).await?;

        let message = self.check_admissibility(message).await?;
        let store = self.stores.for_message(&message)?;
        let result = store.merge(&message).await;

        match &result {
            Ok(seq) => tracing::debug!(
                %fid,
                message_type = ?message.message_type(),
                hash = %to_hex(&message.hash),
                seq,
                "message merged"
            ),
            Err(err) => tracing::debug!(
                %fid,
                message_type = ?message.message_type(),
                error = %err,
                "store rejected message"
            ),
        }
        result
    }

    /// Data presence and network match
    fn check_envelope(&self, message: &Message) -> HubResult<Fid> {
        let data = message.data()?;
        if data.network != self.config.network {
            return Err(HubError::validation_failure(format!(
                "incorrect network: message is for {}, node is on {}",
                data.network, self.config.network
            )));
        }
        Ok(data.fid)
    }

    /// Authority, username and structural checks, without quota or merge
    async fn check_admissibility(&self, message: Message) -> HubResult<Message> {
        let data = message.data()?;
        let authority = self.authority.resolve(data.fid).await?;

        if data.message_type.is_signer_message() {
            self.authority.check_signer_message(&authority, &message)?;
        } else {
            self.authority
                .check_signer(&authority, &message.signer)
                .await?;
        }

        self.usernames.check_message(&message, &authority).await?;
        self.validate_structure(message).await
    }

    async fn validate_structure(&self, message: Message) -> HubResult<Message> {
        let pool = self.pool.read().clone();
        match pool {
            Some(pool) => pool.validate(message).await,
            None => hub_signature::validate_message(message),
        }
    }

    /// Run every admission check except the quota, without merging
    pub async fn validate_message(&self, message: Message) -> HubResult<Message> {
        self.check_envelope(&message)?;
        self.check_admissibility(message).await
    }

    /// Re-check a stored message and revoke it if it is no longer valid
    ///
    /// Returns `Ok(None)` when the message is still valid and the store's
    /// revoke result when it failed validation. Any other error says nothing
    /// about validity and is returned with the message left in place.
    pub async fn validate_or_revoke_message(&self, message: &Message) -> HubResult<Option<SeqNo>> {
        let err = match self.validate_message(message.clone()).await {
            Ok(_) => return Ok(None),
            Err(err) => err,
        };
        if err.code != HubErrorCode::ValidationFailure {
            tracing::warn!(
                fid = ?message.fid(),
                error = %err,
                "could not re-validate message, keeping it"
            );
            return Err(err);
        }

        let store = self.stores.for_message(message)?;
        let revoked = store.revoke(message).await?;
        tracing::info!(
            fid = ?message.fid(),
            hash = %to_hex(&message.hash),
            reason = %err,
            "revoked invalid message"
        );
        Ok(revoked)
    }

    // ------------------------------------------------------------------
    // Revocation and pruning
    // ------------------------------------------------------------------

    /// Revoke every message `signer` produced for `fid`, in every store
    ///
    /// A failing store is recorded in the report and does not stop the others.
    pub async fn revoke_messages_by_signer(
        &self,
        fid: Fid,
        signer: &[u8],
    ) -> HubResult<StoreReport> {
        if !fid.is_valid() {
            return Err(HubError::invalid_param("fid is missing"));
        }
        if signer.is_empty() {
            return Err(HubError::invalid_param("signer is missing"));
        }

        let mut report = StoreReport::default();
        for (kind, store) in self.stores.iter() {
            match revoke_from_store(store.as_ref(), fid, signer).await {
                Ok(count) => {
                    report.counts.insert(kind, count);
                }
                Err(err) => {
                    tracing::error!(
                        %fid,
                        signer = %to_hex(signer),
                        store = %kind,
                        error = %err,
                        "failed to revoke messages by signer"
                    );
                    report.failures.insert(kind, err);
                }
            }
        }
        Ok(report)
    }

    /// Prune `fid` down to capacity in every store
    pub async fn prune_messages(&self, fid: Fid) -> HubResult<StoreReport> {
        validate_fid(fid)?;
        let mut report = StoreReport::default();
        for (kind, store) in self.stores.iter() {
            match store.prune_messages(fid).await {
                Ok(pruned) => {
                    report.counts.insert(kind, pruned.len());
                }
                Err(err) => {
                    tracing::error!(%fid, store = %kind, error = %err, "failed to prune messages");
                    report.failures.insert(kind, err);
                }
            }
        }
        if report.total() > 0 {
            tracing::debug!(%fid, pruned = report.total(), "pruned messages");
        }
        Ok(report)
    }

    // ------------------------------------------------------------------
    // Lifecycle events
    // ------------------------------------------------------------------

    /// React to a store or on-chain lifecycle event
    ///
    /// Sets the migration flag, feeds the rent ledger, schedules signer
    /// revocations and revokes usernames whose registry name moved away.
    pub async fn handle_event(&self, event: &HubEvent) -> HubResult<()> {
        if let HubEvent::MergeOnChainEvent { event: onchain } = event {
            match onchain {
                OnChainEvent::SignerMigrated { migrated_at } => {
                    if self.authority.migration().mark_migrated() {
                        tracing::info!(migrated_at, "signer migration observed");
                    }
                }
                OnChainEvent::StorageRent(rent) => {
                    if let Some(ledger) = &self.rent_ledger {
                        ledger.apply(rent);
                    }
                }
                _ => {}
            }
        }

        self.revocation.on_event(event).await?;

        if let Some(message) = self.usernames.invalidated_username(event).await? {
            let store = self.stores.get(StoreKind::UserData)?;
            store.revoke(&message).await?;
            tracing::info!(
                fid = ?message.fid(),
                "revoked username after its registry name was reassigned"
            );
        }
        Ok(())
    }

    /// Consume lifecycle events until the channel closes
    pub fn spawn_event_loop(
        self: &Arc<Self>,
        mut events: broadcast::Receiver<HubEvent>,
    ) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Err(err) = engine.handle_event(&event).await {
                            tracing::error!(error = %err, "failed to handle hub event");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "event loop lagged, events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            tracing::debug!("event loop stopped");
        })
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    pub async fn get_cast(&self, fid: Fid, hash: &[u8]) -> HubResult<Message> {
        validate_cast_id(&CastId {
            fid,
            hash: hash.to_vec(),
        })?;
        self.get_add(fid, StoreQuery::Cast {
            hash: hash.to_vec(),
        })
        .await
    }

    pub async fn get_reaction(
        &self,
        fid: Fid,
        reaction_type: ReactionType,
        target: &CastId,
    ) -> HubResult<Message> {
        validate_fid(fid)?;
        validate_cast_id(target)?;
        self.get_add(
            fid,
            StoreQuery::Reaction {
                reaction_type,
                target: target.clone(),
            },
        )
        .await
    }

    pub async fn get_link(&self, fid: Fid, link: &LinkBody) -> HubResult<Message> {
        validate_fid(fid)?;
        validate_fid(link.target_fid)?;
        self.get_add(
            fid,
            StoreQuery::Link {
                link_type: link.link_type.clone(),
                target_fid: link.target_fid,
            },
        )
        .await
    }

    pub async fn get_signer(&self, fid: Fid, key: &[u8]) -> HubResult<Message> {
        validate_fid(fid)?;
        validate_ed25519_public_key(key)?;
        self.get_add(fid, StoreQuery::Signer { key: key.to_vec() })
            .await
    }

    pub async fn get_user_data(&self, fid: Fid, user_data_type: UserDataType) -> HubResult<Message> {
        validate_fid(fid)?;
        self.get_add(fid, StoreQuery::UserData { user_data_type })
            .await
    }

    pub async fn get_verification(&self, fid: Fid, address: &[u8]) -> HubResult<Message> {
        validate_fid(fid)?;
        validate_eth_address(address)?;
        self.get_add(
            fid,
            StoreQuery::Verification {
                address: address.to_vec(),
            },
        )
        .await
    }

    pub async fn get_username_proof(&self, name: &str) -> HubResult<UserNameProof> {
        validate_username(name)?;
        self.username_proofs.get_username_proof(name).await
    }

    pub async fn get_id_registry_event(&self, fid: Fid) -> HubResult<IdRegisterEvent> {
        validate_fid(fid)?;
        self.onchain.get_id_register_event_by_fid(fid).await
    }

    pub async fn get_active_signer(&self, fid: Fid, key: &[u8]) -> HubResult<SignerEvent> {
        validate_fid(fid)?;
        validate_ed25519_public_key(key)?;
        self.onchain.get_active_signer(fid, key).await
    }

    async fn get_add(&self, fid: Fid, query: StoreQuery) -> HubResult<Message> {
        self.stores
            .get(query.store_kind())?
            .get_add(fid, &query)
            .await
    }
}

async fn revoke_from_store(store: &dyn MessageStore, fid: Fid, signer: &[u8]) -> HubResult<usize> {
    let messages = store.get_messages_by_signer(fid, signer).await?;
    let mut revoked = 0;
    for message in &messages {
        if store.revoke(message).await?.is_some() {
            revoked += 1;
        }
    }
    Ok(revoked)
}
