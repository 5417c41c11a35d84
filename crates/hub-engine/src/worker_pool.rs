//! Validation worker pool
//!
//! Structural and signature validation is CPU bound, so it runs on a fixed set
//! of OS threads. Jobs are dispatched round robin and tagged with a strictly
//! increasing correlation id. A router thread reads tagged responses and
//! completes the matching pending handle, so callers never depend on
//! completion order.
//!
//! Every round trip is bounded by a timeout. On expiry the pending handle is
//! removed and a late response for that id is logged and dropped. On shutdown
//! workers drain the jobs already queued to them before exiting.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use hub_core::{HubError, HubResult, Message};
use parking_lot::{Mutex, RwLock};
use tokio::sync::{mpsc, oneshot};

/// Validation routine run on worker threads
pub type Validator = Arc<dyn Fn(Message) -> HubResult<Message> + Send + Sync>;

struct ValidationJob {
    id: u64,
    message: Message,
}

/// Tagged worker response
///
/// Errors keep their original code and text.
#[derive(Debug)]
pub struct ValidationResponse {
    pub id: u64,
    pub result: HubResult<Message>,
}

/// Correlation map from job id to a single-use completion handle
#[derive(Default)]
pub struct PendingJobs {
    next_id: AtomicU64,
    pending: Mutex<HashMap<u64, oneshot::Sender<HubResult<Message>>>>,
}

impl PendingJobs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate the next id and its completion handle
    pub fn register(&self) -> (u64, oneshot::Receiver<HubResult<Message>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.pending.lock().insert(id, tx);
        (id, rx)
    }

    /// Complete the handle for `response.id`
    ///
    /// Unknown ids are logged and dropped. Returns whether a handle matched.
    pub fn complete(&self, response: ValidationResponse) -> bool {
        let handle = self.pending.lock().remove(&response.id);
        match handle {
            Some(handle) => {
                // The caller may have stopped waiting
                let _ = handle.send(response.result);
                true
            }
            None => {
                tracing::warn!(id = response.id, "dropping validation response for unknown job");
                false
            }
        }
    }

    /// Forget a handle without completing it
    pub fn abandon(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }
}

pub struct ValidationWorkerPool {
    senders: RwLock<Vec<mpsc::UnboundedSender<ValidationJob>>>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    next_worker: AtomicUsize,
    pending: Arc<PendingJobs>,
    timeout: Duration,
}

impl ValidationWorkerPool {
    /// Start `workers` threads running full message validation
    pub fn spawn(workers: usize, timeout: Duration) -> HubResult<Self> {
        Self::spawn_with(workers, timeout, Arc::new(hub_signature::validate_message))
    }

    pub fn spawn_with(workers: usize, timeout: Duration, validator: Validator) -> HubResult<Self> {
        if workers == 0 {
            return Err(HubError::invalid_param(
                "validation worker pool needs at least one worker",
            ));
        }

        let pending = Arc::new(PendingJobs::new());
        let (response_tx, response_rx) = mpsc::unbounded_channel::<ValidationResponse>();
        let mut senders = Vec::with_capacity(workers);
        let mut threads = Vec::with_capacity(workers + 1);

        for index in 0..workers {
            let (job_tx, job_rx) = mpsc::unbounded_channel::<ValidationJob>();
            let responses = response_tx.clone();
            let validator = validator.clone();
            let spawned = thread::Builder::new()
                .name(format!("hub-validation-{index}"))
                .spawn(move || run_worker(index, job_rx, responses, validator));
            match spawned {
                Ok(handle) => {
                    senders.push(job_tx);
                    threads.push(handle);
                }
                Err(err) => {
                    drop(senders);
                    join_all(threads);
                    return Err(HubError::internal(format!(
                        "failed to spawn validation worker {index}: {err}"
                    )));
                }
            }
        }
        // Workers hold the only response senders, so the router stops once
        // every worker has exited
        drop(response_tx);

        let router_pending = pending.clone();
        let router = thread::Builder::new()
            .name("hub-validation-router".to_string())
            .spawn(move || route_responses(response_rx, router_pending));
        match router {
            Ok(handle) => threads.push(handle),
            Err(err) => {
                drop(senders);
                join_all(threads);
                return Err(HubError::internal(format!(
                    "failed to spawn validation router: {err}"
                )));
            }
        }

        Ok(Self {
            senders: RwLock::new(senders),
            threads: Mutex::new(threads),
            next_worker: AtomicUsize::new(0),
            pending,
            timeout,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.senders.read().len()
    }

    pub fn is_running(&self) -> bool {
        !self.senders.read().is_empty()
    }

    /// Jobs dispatched and not yet completed or timed out
    pub fn pending_jobs(&self) -> usize {
        self.pending.len()
    }

    /// Validate `message` on a worker and wait for its tagged response
    pub async fn validate(&self, message: Message) -> HubResult<Message> {
        let (id, response) = self.pending.register();
        if let Err(err) = self.dispatch(ValidationJob { id, message }) {
            self.pending.abandon(id);
            return Err(err);
        }

        match tokio::time::timeout(self.timeout, response).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(HubError::internal(format!(
                "validation job {id} was dropped without a response"
            ))),
            Err(_) => {
                self.pending.abandon(id);
                tracing::warn!(
                    id,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "validation job timed out"
                );
                Err(HubError::internal(format!(
                    "validation job {id} timed out after {}ms",
                    self.timeout.as_millis()
                )))
            }
        }
    }

    fn dispatch(&self, job: ValidationJob) -> HubResult<()> {
        let senders = self.senders.read();
        if senders.is_empty() {
            return Err(HubError::internal("validation worker pool is shut down"));
        }
        let index = self.next_worker.fetch_add(1, Ordering::Relaxed) % senders.len();
        senders[index]
            .send(job)
            .map_err(|_| HubError::internal(format!("validation worker {index} has exited")))
    }

    /// Stop accepting jobs, let workers drain their queues and join them
    ///
    /// Blocks until every thread has exited.
    pub fn shutdown(&self) {
        let senders = std::mem::take(&mut *self.senders.write());
        let workers = senders.len();
        drop(senders);

        let threads = std::mem::take(&mut *self.threads.lock());
        join_all(threads);
        tracing::info!(workers, "validation worker pool stopped");
    }
}

// Worker and router threads sit outside any runtime, so they block on their
// channels directly
fn run_worker(
    index: usize,
    mut jobs: mpsc::UnboundedReceiver<ValidationJob>,
    responses: mpsc::UnboundedSender<ValidationResponse>,
    validator: Validator,
) {
    tracing::debug!(worker = index, "validation worker started");
    while let Some(ValidationJob { id, message }) = jobs.blocking_recv() {
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| validator(message)))
            .unwrap_or_else(|_| Err(HubError::internal("validation worker panicked")));
        if responses.send(ValidationResponse { id, result }).is_err() {
            break;
        }
    }
    tracing::debug!(worker = index, "validation worker stopped");
}

fn route_responses(
    mut responses: mpsc::UnboundedReceiver<ValidationResponse>,
    pending: Arc<PendingJobs>,
) {
    while let Some(response) = responses.blocking_recv() {
        pending.complete(response);
    }
}

fn join_all(threads: Vec<JoinHandle<()>>) {
    for handle in threads {
        if handle.join().is_err() {
            tracing::error!("validation thread panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::HubErrorCode;
    use hub_testkit::factories;

    fn messages(count: usize) -> Vec<Message> {
        let signer = factories::signer(1);
        (0..count)
            .map(|i| factories::cast_add(&signer, 42, &format!("cast {i}")))
            .collect()
    }

    #[tokio::test]
    async fn reverse_order_responses_reach_their_own_callers() {
        let pending = PendingJobs::new();
        let messages = messages(8);
        let handles: Vec<_> = messages.iter().map(|_| pending.register()).collect();
        let ids: Vec<u64> = handles.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, (0..8).collect::<Vec<u64>>());

        for (id, message) in ids.iter().zip(messages.iter()).rev() {
            assert!(pending.complete(ValidationResponse {
                id: *id,
                result: Ok(message.clone()),
            }));
        }

        for ((_, rx), expected) in handles.into_iter().zip(messages.iter()) {
            assert_eq!(&rx.await.unwrap().unwrap(), expected);
        }
        assert!(pending.is_empty());
    }

    #[test]
    fn unknown_ids_are_dropped() {
        let pending = PendingJobs::new();
        let (id, _rx) = pending.register();
        assert!(!pending.complete(ValidationResponse {
            id: id + 100,
            result: Err(HubError::internal("stray")),
        }));
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn pool_preserves_error_kind_and_text() {
        let pool = ValidationWorkerPool::spawn(2, Duration::from_secs(5)).unwrap();
        let valid = messages(1).remove(0);
        assert_eq!(pool.validate(valid.clone()).await.unwrap(), valid);

        let mut invalid = valid.clone();
        invalid.signature = vec![0u8; 64];
        let inline = hub_signature::validate_message(invalid.clone()).unwrap_err();
        let pooled = pool.validate(invalid).await.unwrap_err();
        assert_eq!(pooled, inline);
        assert_eq!(pooled.code, HubErrorCode::ValidationFailure);
        pool.shutdown();
    }

    #[tokio::test]
    async fn concurrent_jobs_resolve_to_their_own_messages() {
        let pool = ValidationWorkerPool::spawn(3, Duration::from_secs(5)).unwrap();
        let messages = messages(16);
        let results =
            futures::future::join_all(messages.iter().cloned().map(|m| pool.validate(m))).await;
        for (result, expected) in results.into_iter().zip(messages.iter()) {
            assert_eq!(&result.unwrap(), expected);
        }
        assert_eq!(pool.pending_jobs(), 0);
        pool.shutdown();
    }

    #[tokio::test]
    async fn timed_out_jobs_release_their_handles() {
        let slow: Validator = Arc::new(|message: Message| -> HubResult<Message> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(message)
        });
        let pool = ValidationWorkerPool::spawn_with(1, Duration::from_millis(20), slow).unwrap();
        let err = pool.validate(messages(1).remove(0)).await.unwrap_err();
        assert_eq!(err.code, HubErrorCode::Internal);
        assert!(err.message.contains("timed out"));
        assert_eq!(pool.pending_jobs(), 0);
        // Late response is dropped by the router
        pool.shutdown();
        assert_eq!(pool.pending_jobs(), 0);
    }

    #[tokio::test]
    async fn panicking_validator_becomes_internal() {
        let broken: Validator = Arc::new(|_: Message| -> HubResult<Message> { panic!("boom") });
        let pool = ValidationWorkerPool::spawn_with(1, Duration::from_secs(5), broken).unwrap();
        let err = pool.validate(messages(1).remove(0)).await.unwrap_err();
        assert_eq!(err.code, HubErrorCode::Internal);
        pool.shutdown();
    }

    #[tokio::test]
    async fn shutdown_drains_jobs_already_queued() {
        let slow: Validator = Arc::new(|message: Message| -> HubResult<Message> {
            std::thread::sleep(Duration::from_millis(10));
            Ok(message)
        });
        let pool = ValidationWorkerPool::spawn_with(1, Duration::from_secs(5), slow).unwrap();
        let messages = messages(3);
        let receivers: Vec<_> = messages
            .iter()
            .cloned()
            .map(|message| {
                let (id, rx) = pool.pending.register();
                pool.dispatch(ValidationJob { id, message }).unwrap();
                rx
            })
            .collect();

        pool.shutdown();
        for (rx, expected) in receivers.into_iter().zip(messages.iter()) {
            assert_eq!(&rx.await.unwrap().unwrap(), expected);
        }
        assert!(pool.pending.is_empty());
    }

    #[tokio::test]
    async fn shut_down_pool_rejects_jobs() {
        let pool = ValidationWorkerPool::spawn(2, Duration::from_secs(5)).unwrap();
        assert_eq!(pool.worker_count(), 2);
        pool.shutdown();
        assert!(!pool.is_running());
        let err = pool.validate(messages(1).remove(0)).await.unwrap_err();
        assert_eq!(err.code, HubErrorCode::Internal);
        assert_eq!(pool.pending_jobs(), 0);
    }

    #[test]
    fn zero_workers_is_rejected() {
        assert!(ValidationWorkerPool::spawn(0, Duration::from_secs(1)).is_err());
    }
}
