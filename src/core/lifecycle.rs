//! Resource run states and per-resource task ownership.
//!
//! ```text
//! Unloaded → Starting → Up ⇄ (Pausing → Paused) → Stopping → Unloaded
//! ```
//!
//! Every running input/device owns a child cancellation token of the
//! engine root and the join handles of its read loop and dispatch lane.
//! Stopping a resource cancels the token and joins the tasks with a
//! bounded wait.

use std::fmt;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::error::EngineError;

/// Run state of a live resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Unloaded,
    Starting,
    Up,
    Pausing,
    Paused,
    Stopping,
}

impl ResourceState {
    /// Whether moving from `self` to `next` is a legal transition
    pub fn can_transition_to(&self, next: ResourceState) -> bool {
        use ResourceState::*;
        matches!(
            (self, next),
            (Unloaded, Starting)
                | (Starting, Up)
                | (Starting, Stopping)
                | (Up, Pausing)
                | (Pausing, Paused)
                | (Pausing, Up)
                | (Paused, Up)
                | (Up, Stopping)
                | (Paused, Stopping)
                | (Pausing, Stopping)
                | (Stopping, Unloaded)
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unloaded => "unloaded",
            Self::Starting => "starting",
            Self::Up => "up",
            Self::Pausing => "pausing",
            Self::Paused => "paused",
            Self::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Observable state of one resource
#[derive(Debug)]
pub struct StateCell {
    id: String,
    tx: watch::Sender<ResourceState>,
}

impl StateCell {
    pub fn new(id: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(ResourceState::Unloaded);
        Self { id: id.into(), tx }
    }

    pub fn get(&self) -> ResourceState {
        *self.tx.borrow()
    }

    pub fn is_up(&self) -> bool {
        self.get() == ResourceState::Up
    }

    /// Move to `next`, failing with `InvalidTransition` when illegal
    pub fn transition(&self, next: ResourceState) -> Result<ResourceState, EngineError> {
        let mut result = Ok(ResourceState::Unloaded);
        self.tx.send_if_modified(|current| {
            if current.can_transition_to(next) {
                result = Ok(*current);
                *current = next;
                true
            } else {
                result = Err(EngineError::InvalidTransition {
                    id: self.id.clone(),
                    from: *current,
                    to: next,
                });
                false
            }
        });
        result
    }

    /// Set unconditionally (rollback and teardown paths)
    pub fn force(&self, state: ResourceState) {
        self.tx.send_replace(state);
    }

    pub fn subscribe(&self) -> watch::Receiver<ResourceState> {
        self.tx.subscribe()
    }
}

/// Cancellation token plus the join handles of a resource's background tasks
#[derive(Debug)]
pub struct ResourceTask {
    cancel: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl ResourceTask {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn attach(&self, handle: JoinHandle<()>) {
        self.handles
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(handle);
    }

    /// Cancel and wait up to `timeout` for every task to exit; tasks that
    /// do not exit in time are aborted
    pub async fn stop(&self, id: &str, timeout: Duration) {
        self.cancel.cancel();

        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(|e| e.into_inner()));
        let deadline = tokio::time::Instant::now() + timeout;

        for handle in handles {
            let abort = handle.abort_handle();
            if tokio::time::timeout_at(deadline, handle).await.is_err() {
                warn!(resource = %id, ?timeout, "Task did not stop in time, aborting");
                abort.abort();
            }
        }
    }
}
