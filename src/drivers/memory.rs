//! In-memory drivers.
//!
//! Used for wiring inputs that are fed programmatically
//! (`RuleEngine::inject`), for capturing outputs, and as fixtures in tests.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{DeviceDriver, Driver, DriverContext, DriverState, Sink, Source, StatusFlag};
use crate::config::binder::{bind, ConfigSchema, FieldType};
use crate::core::EngineError;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Source whose payloads come from a channel.
///
/// The read loop forwards everything sent through [`MemorySource::sender`]
/// to the ingest queue. A payload rejected by a full queue is dropped.
#[derive(Debug)]
pub struct MemorySource {
    status: StatusFlag,
    tx: mpsc::UnboundedSender<String>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<String>>,
}

impl MemorySource {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            status: StatusFlag::new(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
        }
    }

    pub fn sender(&self) -> mpsc::UnboundedSender<String> {
        self.tx.clone()
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for MemorySource {
    fn kind(&self) -> &str {
        "memory"
    }

    fn configs(&self) -> ConfigSchema {
        ConfigSchema::new("memory", "In-memory input")
    }

    async fn start(&self, _ctx: &DriverContext) -> Result<()> {
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
impl Source for MemorySource {
    async fn run(&self, ctx: DriverContext) -> Result<()> {
        let mut rx = self.rx.lock().await;

        loop {
            let payload = tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                payload = rx.recv() => match payload {
                    Some(payload) => payload,
                    None => break,
                },
            };

            match ctx.push(payload).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => break,
                Err(e) => warn!(input = %ctx.id, error = %e, "Dropping payload"),
            }
        }

        debug!(input = %ctx.id, "Memory source stopped");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct MemorySinkConfig {
    #[serde(default)]
    fail_writes: bool,
}

/// Sink that records every write
#[derive(Debug, Default)]
pub struct MemorySink {
    status: StatusFlag,
    fail_writes: Mutex<bool>,
    records: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything written so far, in write order
    pub fn records(&self) -> Vec<String> {
        lock(&self.records).clone()
    }
}

#[async_trait]
impl Driver for MemorySink {
    fn kind(&self) -> &str {
        "memory"
    }

    fn configs(&self) -> ConfigSchema {
        ConfigSchema::new("memory", "In-memory output").optional(
            "fail_writes",
            FieldType::Boolean,
            "Reject every write",
        )
    }

    async fn start(&self, ctx: &DriverContext) -> Result<()> {
        let config: MemorySinkConfig = bind(&self.configs(), &ctx.config)?;
        *lock(&self.fail_writes) = config.fail_writes;
        self.status.set(DriverState::Up);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.status.set(DriverState::Down);
        Ok(())
    }

    fn status(&self) -> DriverState {
        self.status.get()
    }
}

#[async_trait]
impl Sink for MemorySink {
    async fn write(&self, data: &str) -> Result<()> {
        if *lock(&self.fail_writes) {
            bail!("write rejected");
        }
        lock(&self.records).push(data.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct MemoryDeviceConfig {
    poll_interval_ms: Option<u64>,
    poll_cmd: Option<String>,
}

/// Device backed by a register map.
///
/// `write(cmd, data)` stores `data` under register `cmd`, `read(cmd)`
/// returns it. Controls: `clear` empties the map, `keys` lists registers.
/// With `poll_interval_ms` set, the run loop pushes `read(poll_cmd)` to
/// the engine on every tick.
#[derive(Debug, Default)]
pub struct MemoryDevice {
    status: StatusFlag,
    config: Mutex<MemoryDeviceConfig>,
    registers: Mutex<BTreeMap<String, String>>,
    writes: Mutex<Vec<(String, String)>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(cmd, data)` written so far
    pub fn writes(&self) -> Vec<(String, String)> {
        lock(&self.writes).clone()
    }

    pub fn register(&self, name: &str) -> Option<String> {
        lock(&self.registers).get(name).cloned()
    }
}

#[async_trait]
impl Driver for MemoryDevice {
    fn kind(&self) -> &str {
        "memory"
    }

    fn configs(&self) -> ConfigSchema {
        ConfigSchema::new("memory", "In-memory device")
            .optional("poll_interval_ms", FieldType::Integer, "Polling interval (ms)")
            .optional("poll_cmd", FieldType::String, "Register read on each poll")
    }

    async fn start(&self, ctx: &DriverContext) -> Result<()> {
        let config: MemoryDeviceConfig = bind(&self.configs(), &ctx.config)?;
        if config.poll_interval_ms == Some(0) {
            bail!("poll_interval_ms must be greater than zero");
        }
        *lock(&self.config) = config;
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
impl DeviceDriver for MemoryDevice {
    async fn read(&self, cmd: &str) -> Result<String> {
        Ok(self.register(cmd).unwrap_or_default())
    }

    async fn write(&self, cmd: &str, data: &str) -> Result<usize> {
        lock(&self.registers).insert(cmd.to_string(), data.to_string());
        lock(&self.writes).push((cmd.to_string(), data.to_string()));
        Ok(data.len())
    }

    async fn ctrl(&self, cmd: &str, _args: &str) -> Result<String> {
        match cmd {
            "clear" => {
                lock(&self.registers).clear();
                Ok(String::new())
            }
            "keys" => {
                let keys: Vec<String> = lock(&self.registers).keys().cloned().collect();
                Ok(serde_json::to_string(&keys)?)
            }
            other => bail!("unsupported control: {}", other),
        }
    }

    async fn run(&self, ctx: DriverContext) -> Result<()> {
        let (interval_ms, poll_cmd) = {
            let config = lock(&self.config);
            (config.poll_interval_ms, config.poll_cmd.clone().unwrap_or_default())
        };

        let Some(interval_ms) = interval_ms else {
            ctx.cancel.cancelled().await;
            return Ok(());
        };

        let mut ticker = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = ctx.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if self.status() != DriverState::Up {
                continue;
            }

            let value = self.read(&poll_cmd).await?;
            match ctx.push(value).await {
                Ok(()) => {}
                Err(EngineError::Cancelled) => break,
                Err(e) => warn!(device = %ctx.id, error = %e, "Dropping poll result"),
            }
        }

        Ok(())
    }
}
