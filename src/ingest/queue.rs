//! Bounded ingest queue between source read loops and rule dispatch.
//!
//! Capacity is a shared pool of semaphore permits. A permit is taken when a
//! payload is offered and released when its dispatch finishes, so the queue
//! length counts both waiting and in-flight payloads.
//!
//! Every running input or device gets its own lane, drained by a dedicated
//! consumer task: a producer's payloads are dispatched in offer order, and a
//! slow dispatch for one producer never delays another.
//!
//! When the pool is exhausted:
//! - `block`: the producer waits for a permit or for its cancellation
//! - `reject`: the offer fails with `QueueFull` at once

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use crate::core::EngineError;

/// Behaviour of `offer` when the queue is full
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueMode {
    /// Suspend the producer until space frees up
    #[default]
    Block,

    /// Fail immediately with `QueueFull`
    Reject,
}

/// One queued payload
#[derive(Debug)]
pub struct Envelope {
    /// Id of the input endpoint or device that produced the payload
    pub source_id: String,

    pub payload: String,

    pub enqueued_at: Instant,

    // Returned to the pool when the envelope is dropped
    _permit: OwnedSemaphorePermit,
}

/// Bounded multi-producer queue with one ordered lane per producer
#[derive(Debug)]
pub struct IngestQueue {
    permits: Arc<Semaphore>,
    capacity: usize,
    mode: QueueMode,
    lanes: RwLock<HashMap<String, mpsc::UnboundedSender<Envelope>>>,
    running: watch::Sender<bool>,
}

impl IngestQueue {
    /// Create a queue holding at most `capacity` payloads
    pub fn new(capacity: usize, mode: QueueMode) -> Self {
        let capacity = capacity.max(1);
        let (running, _) = watch::channel(false);

        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            capacity,
            mode,
            lanes: RwLock::new(HashMap::new()),
            running,
        }
    }

    /// Open the lane of `source_id`, replacing any previous one.
    ///
    /// The receiver must be drained by exactly one consumer.
    pub fn open_lane(&self, source_id: &str) -> mpsc::UnboundedReceiver<Envelope> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.lanes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(source_id.to_string(), tx);
        rx
    }

    /// Close the lane of `source_id`; later offers for it fail
    pub fn close_lane(&self, source_id: &str) {
        self.lanes
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(source_id);
    }

    /// Offer a payload on behalf of `source_id`.
    ///
    /// `cancel` is the producer's token: a producer blocked on a full queue
    /// returns `Cancelled` as soon as it is stopped.
    pub async fn offer(
        &self,
        source_id: &str,
        payload: String,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let permit = match self.mode {
            QueueMode::Reject => match self.permits.clone().try_acquire_owned() {
                Ok(permit) => permit,
                Err(TryAcquireError::NoPermits) => {
                    return Err(EngineError::QueueFull {
                        capacity: self.capacity,
                    })
                }
                Err(TryAcquireError::Closed) => return Err(EngineError::Cancelled),
            },
            QueueMode::Block => {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    permit = self.permits.clone().acquire_owned() => {
                        permit.map_err(|_| EngineError::Cancelled)?
                    }
                }
            }
        };

        let lane = self
            .lanes
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(source_id)
            .cloned();
        let Some(lane) = lane else {
            return Err(EngineError::ResourceUnavailable {
                id: source_id.to_string(),
                state: None,
            });
        };

        let envelope = Envelope {
            source_id: source_id.to_string(),
            payload,
            enqueued_at: Instant::now(),
            _permit: permit,
        };

        trace!(source = %source_id, "Payload queued");
        lane.send(envelope).map_err(|_| EngineError::Cancelled)
    }

    /// Let consumers start dispatching
    pub fn start_consumers(&self) {
        self.running.send_replace(true);
    }

    /// Whether consumers are dispatching
    pub fn is_running(&self) -> bool {
        *self.running.borrow()
    }

    /// Signal consumers wait on before their first dispatch
    pub fn running_signal(&self) -> watch::Receiver<bool> {
        self.running.subscribe()
    }

    /// Payloads currently queued or being dispatched
    pub fn len(&self) -> usize {
        self.capacity - self.permits.available_permits()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn mode(&self) -> QueueMode {
        self.mode
    }

    /// Number of open producer lanes
    pub fn lanes(&self) -> usize {
        self.lanes.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Refuse further offers; blocked producers return `Cancelled`
    pub fn close(&self) {
        self.permits.close();
        self.lanes.write().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_reject_when_full() {
        let queue = IngestQueue::new(2, QueueMode::Reject);
        let _rx = queue.open_lane("in-1");
        let cancel = CancellationToken::new();

        queue.offer("in-1", "a".into(), &cancel).await.unwrap();
        queue.offer("in-1", "b".into(), &cancel).await.unwrap();
        let err = queue.offer("in-1", "c".into(), &cancel).await.unwrap_err();

        assert!(matches!(err, EngineError::QueueFull { capacity: 2 }));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_permit_released_after_envelope_dropped() {
        let queue = IngestQueue::new(1, QueueMode::Reject);
        let mut rx = queue.open_lane("in-1");
        let cancel = CancellationToken::new();

        queue.offer("in-1", "a".into(), &cancel).await.unwrap();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(queue.len(), 1);

        drop(envelope);
        assert!(queue.is_empty());
        queue.offer("in-1", "b".into(), &cancel).await.unwrap();
    }

    #[tokio::test]
    async fn test_blocked_offer_returns_on_cancel() {
        let queue = IngestQueue::new(1, QueueMode::Block);
        let _rx = queue.open_lane("in-1");
        let cancel = CancellationToken::new();
        queue.offer("in-1", "a".into(), &cancel).await.unwrap();

        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            stopper.cancel();
        });

        let err = queue.offer("in-1", "b".into(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn test_each_source_has_its_own_lane() {
        let queue = IngestQueue::new(16, QueueMode::Reject);
        let mut first = queue.open_lane("dev-7");
        let mut second = queue.open_lane("in-2");
        let cancel = CancellationToken::new();

        for i in 0..3 {
            queue.offer("dev-7", i.to_string(), &cancel).await.unwrap();
            queue.offer("in-2", format!("x{}", i), &cancel).await.unwrap();
        }

        let mut seen = Vec::new();
        while let Ok(envelope) = first.try_recv() {
            seen.push(envelope.payload);
        }
        assert_eq!(seen, vec!["0", "1", "2"]);
        assert_eq!(second.try_recv().unwrap().payload, "x0");
        assert_eq!(queue.lanes(), 2);
    }

    #[tokio::test]
    async fn test_offer_without_lane_is_unavailable() {
        let queue = IngestQueue::new(4, QueueMode::Reject);
        let _rx = queue.open_lane("in-1");
        queue.close_lane("in-1");

        let err = queue
            .offer("in-1", "a".into(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::ResourceUnavailable { .. }));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_closed_queue_cancels() {
        let queue = IngestQueue::new(4, QueueMode::Block);
        queue.close();

        let err = queue
            .offer("in-1", "a".into(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }
}
