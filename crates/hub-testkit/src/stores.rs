//! In-memory store facades
//!
//! Each store keeps one winning message per `(fid, conflict key)`. A newer
//! message replaces the current winner; ties on timestamp go to removes, then
//! to the larger hash. Committed changes are announced on an optional
//! broadcast channel the same way the on-disk stores announce them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use hub_core::effects::{MessageStore, StoreQuery};
use hub_core::{
    to_hex, CastId, Fid, HubError, HubEvent, HubResult, Message, MessageBody, ReactionType,
    SeqNo, StoreKind, UserDataType,
};
use parking_lot::Mutex;
use tokio::sync::broadcast;

#[derive(Debug, Clone)]
struct Entry {
    seq: SeqNo,
    message: Message,
}

#[derive(Debug, Default)]
struct StoreState {
    next_seq: SeqNo,
    entries: HashMap<(Fid, String), Entry>,
    units: HashMap<Fid, u64>,
    merge_calls: usize,
    revoke_calls: usize,
}

impl StoreState {
    fn next_seq(&mut self) -> SeqNo {
        self.next_seq += 1;
        self.next_seq
    }
}

pub struct MemoryMessageStore {
    kind: StoreKind,
    prune_size_limit: u64,
    state: Mutex<StoreState>,
    events: Option<broadcast::Sender<HubEvent>>,
    failure: Mutex<Option<HubError>>,
}

impl MemoryMessageStore {
    pub fn new(kind: StoreKind) -> Self {
        Self {
            kind,
            prune_size_limit: kind.default_prune_size_limit(),
            state: Mutex::new(StoreState::default()),
            events: None,
            failure: Mutex::new(None),
        }
    }

    pub fn with_events(mut self, events: broadcast::Sender<HubEvent>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn with_prune_size_limit(mut self, limit: u64) -> Self {
        self.prune_size_limit = limit;
        self
    }

    /// Storage units used when pruning `fid` (default 1)
    pub fn set_units(&self, fid: Fid, units: u64) {
        self.state.lock().units.insert(fid, units);
    }

    /// Make every subsequent operation fail with `err`
    pub fn fail_with(&self, err: HubError) {
        *self.failure.lock() = Some(err);
    }

    pub fn clear_failure(&self) {
        *self.failure.lock() = None;
    }

    pub fn merge_calls(&self) -> usize {
        self.state.lock().merge_calls
    }

    pub fn revoke_calls(&self) -> usize {
        self.state.lock().revoke_calls
    }

    /// Retained messages for `fid`, in commit order
    pub fn messages(&self, fid: Fid) -> Vec<Message> {
        let state = self.state.lock();
        let mut entries: Vec<&Entry> = state
            .entries
            .iter()
            .filter(|((entry_fid, _), _)| *entry_fid == fid)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.message.clone()).collect()
    }

    pub fn contains(&self, message: &Message) -> bool {
        self.state
            .lock()
            .entries
            .values()
            .any(|entry| entry.message.hash == message.hash)
    }

    fn check_failure(&self) -> HubResult<()> {
        match self.failure.lock().as_ref() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn emit(&self, event: HubEvent) {
        if let Some(events) = &self.events {
            // No receivers is fine
            let _ = events.send(event);
        }
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    fn prune_size_limit(&self) -> u64 {
        self.prune_size_limit
    }

    async fn merge(&self, message: &Message) -> HubResult<SeqNo> {
        self.check_failure()?;
        let data = message.data()?;
        if data.message_type.store_kind() != self.kind {
            return Err(HubError::invalid_param(format!(
                "{:?} does not belong in the {} store",
                data.message_type, self.kind
            )));
        }

        let key = (data.fid, conflict_key(message)?);
        let mut state = self.state.lock();
        state.merge_calls += 1;

        let mut deleted_messages = Vec::new();
        if let Some(existing) = state.entries.get(&key) {
            if existing.message.hash == message.hash {
                return Err(HubError::duplicate("message has already been merged"));
            }
            if merge_order(&existing.message) > merge_order(message) {
                return Err(HubError::conflict("message conflicts with a more recent message"));
            }
            deleted_messages.push(existing.message.clone());
        }

        let seq = state.next_seq();
        state.entries.insert(
            key,
            Entry {
                seq,
                message: message.clone(),
            },
        );
        drop(state);

        self.emit(HubEvent::MergeMessage {
            message: message.clone(),
            deleted_messages,
        });
        Ok(seq)
    }

    async fn revoke(&self, message: &Message) -> HubResult<Option<SeqNo>> {
        self.check_failure()?;
        let data = message.data()?;
        let key = (data.fid, conflict_key(message)?);

        let mut state = self.state.lock();
        state.revoke_calls += 1;
        let present = state
            .entries
            .get(&key)
            .is_some_and(|entry| entry.message.hash == message.hash);
        if !present {
            return Ok(None);
        }
        state.entries.remove(&key);
        let seq = state.next_seq();
        drop(state);

        self.emit(HubEvent::RevokeMessage {
            message: message.clone(),
        });
        Ok(Some(seq))
    }

    async fn prune_messages(&self, fid: Fid) -> HubResult<Vec<SeqNo>> {
        self.check_failure()?;
        let mut state = self.state.lock();
        let units = state.units.get(&fid).copied().unwrap_or(1);
        let limit = self.prune_size_limit.saturating_mul(units) as usize;

        let mut owned: Vec<((Fid, String), u32, Vec<u8>)> = state
            .entries
            .iter()
            .filter(|((entry_fid, _), _)| *entry_fid == fid)
            .map(|(key, entry)| {
                let timestamp = entry
                    .message
                    .data
                    .as_ref()
                    .map(|data| data.timestamp)
                    .unwrap_or(0);
                (key.clone(), timestamp, entry.message.hash.clone())
            })
            .collect();
        if owned.len() <= limit {
            return Ok(Vec::new());
        }

        owned.sort_by(|a, b| (a.1, &a.2).cmp(&(b.1, &b.2)));
        let excess = owned.len() - limit;
        let mut pruned = Vec::with_capacity(excess);
        let mut events = Vec::with_capacity(excess);
        for (key, _, _) in owned.into_iter().take(excess) {
            if let Some(entry) = state.entries.remove(&key) {
                pruned.push(state.next_seq());
                events.push(HubEvent::PruneMessage {
                    message: entry.message,
                });
            }
        }
        drop(state);

        for event in events {
            self.emit(event);
        }
        Ok(pruned)
    }

    async fn get_add(&self, fid: Fid, query: &StoreQuery) -> HubResult<Message> {
        self.check_failure()?;
        if query.store_kind() != self.kind {
            return Err(HubError::invalid_param(format!(
                "query for the {} store sent to the {} store",
                query.store_kind(),
                self.kind
            )));
        }
        let state = self.state.lock();
        state
            .entries
            .get(&(fid, query_key(query)))
            .filter(|entry| {
                entry
                    .message
                    .message_type()
                    .is_some_and(|message_type| !message_type.is_remove())
            })
            .map(|entry| entry.message.clone())
            .ok_or_else(|| HubError::not_found(format!("{} add not found for fid {fid}", self.kind)))
    }

    async fn get_messages_by_signer(&self, fid: Fid, signer: &[u8]) -> HubResult<Vec<Message>> {
        self.check_failure()?;
        Ok(self
            .messages(fid)
            .into_iter()
            .filter(|message| message.signer == signer)
            .collect())
    }
}

/// `(timestamp, is_remove, hash)`: the larger tuple wins
fn merge_order(message: &Message) -> (u32, bool, Vec<u8>) {
    let (timestamp, is_remove) = message
        .data
        .as_ref()
        .map(|data| (data.timestamp, data.message_type.is_remove()))
        .unwrap_or((0, false));
    (timestamp, is_remove, message.hash.clone())
}

fn conflict_key(message: &Message) -> HubResult<String> {
    let data = message.data()?;
    Ok(match &data.body {
        MessageBody::CastAdd(_) => cast_key(&message.hash),
        MessageBody::CastRemove(body) => cast_key(&body.target_hash),
        MessageBody::Reaction(body) => reaction_key(body.reaction_type, &body.target),
        MessageBody::Link(body) => link_key(&body.link_type, body.target_fid),
        MessageBody::VerificationAdd(body) => verification_key(&body.address),
        MessageBody::VerificationRemove(body) => verification_key(&body.address),
        MessageBody::Signer(body) => signer_key(&body.signer),
        MessageBody::UserData(body) => user_data_key(body.user_data_type),
        MessageBody::UsernameProof(body) => username_key(&body.name),
    })
}

fn query_key(query: &StoreQuery) -> String {
    match query {
        StoreQuery::Cast { hash } => cast_key(hash),
        StoreQuery::Reaction {
            reaction_type,
            target,
        } => reaction_key(*reaction_type, target),
        StoreQuery::Link {
            link_type,
            target_fid,
        } => link_key(link_type, *target_fid),
        StoreQuery::Signer { key } => signer_key(key),
        StoreQuery::UserData { user_data_type } => user_data_key(*user_data_type),
        StoreQuery::Verification { address } => verification_key(address),
        StoreQuery::UsernameProof { name } => username_key(name),
    }
}

fn cast_key(hash: &[u8]) -> String {
    format!("cast:{}", to_hex(hash))
}

fn reaction_key(reaction_type: ReactionType, target: &CastId) -> String {
    format!("reaction:{reaction_type:?}:{}:{}", target.fid, to_hex(&target.hash))
}

fn link_key(link_type: &str, target_fid: Fid) -> String {
    format!("link:{link_type}:{target_fid}")
}

fn verification_key(address: &[u8]) -> String {
    format!("verification:{}", to_hex(address))
}

fn signer_key(key: &[u8]) -> String {
    format!("signer:{}", to_hex(key))
}

fn user_data_key(user_data_type: UserDataType) -> String {
    format!("user_data:{user_data_type:?}")
}

fn username_key(name: &str) -> String {
    format!("username:{name}")
}

/// One in-memory store per category
pub struct MemoryStores {
    pub cast: Arc<MemoryMessageStore>,
    pub reaction: Arc<MemoryMessageStore>,
    pub link: Arc<MemoryMessageStore>,
    pub signer: Arc<MemoryMessageStore>,
    pub user_data: Arc<MemoryMessageStore>,
    pub verification: Arc<MemoryMessageStore>,
    pub username_proof: Arc<MemoryMessageStore>,
}

impl MemoryStores {
    pub fn new() -> Self {
        Self::build(MemoryMessageStore::new)
    }

    /// Stores that announce committed changes on `events`
    pub fn with_events(events: &broadcast::Sender<HubEvent>) -> Self {
        Self::build(|kind| MemoryMessageStore::new(kind).with_events(events.clone()))
    }

    /// Stores that each retain `limit` messages per storage unit
    pub fn with_prune_size_limits(limit: u64) -> Self {
        Self::build(|kind| MemoryMessageStore::new(kind).with_prune_size_limit(limit))
    }

    fn build(make: impl Fn(StoreKind) -> MemoryMessageStore) -> Self {
        Self {
            cast: Arc::new(make(StoreKind::Cast)),
            reaction: Arc::new(make(StoreKind::Reaction)),
            link: Arc::new(make(StoreKind::Link)),
            signer: Arc::new(make(StoreKind::Signer)),
            user_data: Arc::new(make(StoreKind::UserData)),
            verification: Arc::new(make(StoreKind::Verification)),
            username_proof: Arc::new(make(StoreKind::UsernameProof)),
        }
    }

    pub fn get(&self, kind: StoreKind) -> &Arc<MemoryMessageStore> {
        match kind {
            StoreKind::Cast => &self.cast,
            StoreKind::Reaction => &self.reaction,
            StoreKind::Link => &self.link,
            StoreKind::Signer => &self.signer,
            StoreKind::UserData => &self.user_data,
            StoreKind::Verification => &self.verification,
            StoreKind::UsernameProof => &self.username_proof,
        }
    }

    /// Every store behind the facade trait
    pub fn all(&self) -> Vec<Arc<dyn MessageStore>> {
        StoreKind::ALL
            .iter()
            .map(|kind| self.get(*kind).clone() as Arc<dyn MessageStore>)
            .collect()
    }

    /// Total merge calls across every store
    pub fn total_merge_calls(&self) -> usize {
        StoreKind::ALL
            .iter()
            .map(|kind| self.get(*kind).merge_calls())
            .sum()
    }
}

impl Default for MemoryStores {
    fn default() -> Self {
        Self::new()
    }
}
