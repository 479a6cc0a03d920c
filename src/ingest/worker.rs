//! Per-producer dispatch consumers draining the ingest lanes.

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::queue::Envelope;
use crate::core::Dispatcher;

/// Spawn the consumer of one producer lane.
///
/// The consumer holds off until `running` turns true, then dispatches
/// payloads in lane order until `cancel` fires or the lane closes.
pub fn spawn_consumer(
    dispatcher: Arc<Dispatcher>,
    source_id: &str,
    rx: UnboundedReceiver<Envelope>,
    running: watch::Receiver<bool>,
    cancel: CancellationToken,
    tracker: &TaskTracker,
) -> JoinHandle<()> {
    tracker.spawn(run_consumer(
        source_id.to_string(),
        dispatcher,
        rx,
        running,
        cancel,
    ))
}

async fn run_consumer(
    source_id: String,
    dispatcher: Arc<Dispatcher>,
    mut rx: UnboundedReceiver<Envelope>,
    mut running: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    debug!(source = %source_id, "Dispatch consumer started");

    if wait_running(&mut running, &cancel).await {
        loop {
            let envelope = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                envelope = rx.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            match dispatcher.work(&envelope.source_id, &envelope.payload).await {
                Ok(report) => debug!(
                    source = %source_id,
                    rules = report.outcomes.len(),
                    waited_ms = envelope.enqueued_at.elapsed().as_millis() as u64,
                    "Payload dispatched"
                ),
                Err(e) if e.is_unavailable() => {
                    debug!(source = %source_id, error = %e, "Payload dropped")
                }
                Err(e) => warn!(source = %source_id, error = %e, "Dispatch failed"),
            }

            // Permit returns to the queue here
            drop(envelope);
        }
    }

    rx.close();
    let mut dropped = 0usize;
    while rx.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        warn!(source = %source_id, dropped, "Consumer stopped with payloads still queued");
    }
    debug!(source = %source_id, "Dispatch consumer stopped");
}

/// Wait for the running signal; false when cancelled first
async fn wait_running(running: &mut watch::Receiver<bool>, cancel: &CancellationToken) -> bool {
    loop {
        let ready = *running.borrow_and_update();
        if ready {
            return true;
        }

        tokio::select! {
            biased;
            _ = cancel.cancelled() => return false,
            changed = running.changed() => {
                if changed.is_err() {
                    return false;
                }
            }
        }
    }
}
