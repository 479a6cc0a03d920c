//! Periodic heartbeat source.
//!
//! Emits `{"tick": n, "label": ..., "ts": ...}` every `interval_ms`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::{Driver, DriverContext, DriverState, Source, StatusFlag};
use crate::config::binder::{bind, ConfigSchema, FieldType};
use crate::core::EngineError;

#[derive(Debug, Clone, Deserialize)]
struct TickerConfig {
    interval_ms: u64,

    #[serde(default)]
    label: String,
}

#[derive(Debug, Default)]
pub struct TickerSource {
    status: StatusFlag,
    config: Mutex<Option<TickerConfig>>,
    ticks: AtomicU64,
}

impl TickerSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ticks emitted since creation
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Driver for TickerSource {
    fn kind(&self) -> &str {
        "ticker"
    }

    fn configs(&self) -> ConfigSchema {
        ConfigSchema::new("ticker", "Ticker")
            .required("interval_ms", FieldType::Integer, "Tick interval (ms)")
            .optional("label", FieldType::String, "Payload label")
    }

    async fn start(&self, ctx: &DriverContext) -> Result<()> {
        let config: TickerConfig = bind(&self.configs(), &ctx.config)?;
        if config.interval_ms == 0 {
            bail!("interval_ms must be greater than zero");
        }

        *self.config.lock().unwrap_or_else(|e| e.into_inner()) = Some(config);
        self.status.set(DriverState::Up);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.status.set(DriverState::Down);
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        self.status.set(DriverState::Paused);
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.status.set(DriverState::Up);
        Ok(())
    }

    fn status(&self) -> DriverState {
        self.status.get()
    }
}

#[async_trait]
impl Source for TickerSource {
    async fn run(&self, ctx: DriverContext) -> Result<()> {
        let Some(config) = self.config.lock().unwrap_or_else(|e| e.into_inner()).clone() else {
            bail!("ticker {} was not started", ctx.id);
        };

        let mut interval = tokio::time::interval(Duration::from_millis(config.interval_ms));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = interval.tick() => {}
            }

            // Paused tickers keep time but emit nothing
            if self.status() != DriverState::Up {
                continue;
            }

            let tick = self.ticks.fetch_add(1, Ordering::Relaxed) + 1;
            let payload = json!({
                "tick": tick,
                "label": config.label,
                "ts": Utc::now().to_rfc3339(),
            });

            match ctx.push(payload.to_string()).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => break,
                Err(e) => warn!(input = %ctx.id, tick, error = %e, "Dropping tick"),
            }
        }

        debug!(input = %ctx.id, ticks = self.ticks(), "Ticker stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use tokio_util::sync::CancellationToken;

    use crate::ingest::{IngestQueue, QueueMode};

    #[tokio::test]
    async fn test_ticker_emits_json() {
        let queue = IngestQueue::new(4, QueueMode::Block);
        let mut rx = queue.open_lane("tick-1");
        let ctx = DriverContext::new(
            "tick-1",
            json!({ "interval_ms": 5, "label": "hb" }),
            CancellationToken::new(),
            Arc::new(queue),
        );

        let ticker = Arc::new(TickerSource::new());
        ticker.start(&ctx).await.unwrap();

        let runner = ticker.clone();
        let run_ctx = ctx.clone();
        let handle = tokio::spawn(async move { runner.run(run_ctx).await });

        let envelope = rx.recv().await.unwrap();
        let payload: serde_json::Value = serde_json::from_str(&envelope.payload).unwrap();
        assert_eq!(payload["tick"], json!(1));
        assert_eq!(payload["label"], json!("hb"));

        ctx.cancel.cancel();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ticker_requires_interval() {
        let queue = IngestQueue::new(4, QueueMode::Block);
        let ctx = DriverContext::new(
            "tick-1",
            json!({}),
            CancellationToken::new(),
            Arc::new(queue),
        );
        let err = TickerSource::new().start(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("interval_ms"));
    }
}
