//! Ingest path between source drivers and the dispatch pipeline.
//!
//! ```text
//! Source read loop ─push─▶ IngestQueue ─lane─▶ consumer ─▶ Dispatcher::work
//!                    (bounded, block | reject)   (one per input/device)
//! ```

pub mod queue;
pub mod worker;

pub use queue::{Envelope, IngestQueue, QueueMode};
pub use worker::spawn_consumer;
