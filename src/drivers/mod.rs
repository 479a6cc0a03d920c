//! Driver contracts and the catalog of driver kinds.
//!
//! Drivers are the protocol-specific halves of endpoints and devices. The
//! engine only talks to them through these capability traits:
//! - [`Source`]: input endpoints, owns a read loop that pushes payloads
//! - [`Sink`]: output endpoints, accepts writes
//! - [`DeviceDriver`]: devices, readable/writable/controllable and
//!   optionally polled
//!
//! Every driver kind self-describes its configuration through
//! [`Driver::configs`], which the engine validates before `start`.

pub mod log;
pub mod memory;
pub mod ticker;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::config::binder::{ConfigSchema, ValidationError};
use crate::core::EngineError;
use crate::ingest::IngestQueue;

pub use self::log::LogSink;
pub use memory::{MemoryDevice, MemorySink, MemorySource};
pub use ticker::TickerSource;

/// Driver-reported status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Up,
    Down,
    Paused,
}

/// Shared status holder for driver implementations
#[derive(Debug)]
pub struct StatusFlag(std::sync::Mutex<DriverState>);

impl StatusFlag {
    pub fn new() -> Self {
        Self(std::sync::Mutex::new(DriverState::Down))
    }

    pub fn get(&self) -> DriverState {
        *self.0.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, state: DriverState) {
        *self.0.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }
}

impl Default for StatusFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a driver gets from the engine when it starts
#[derive(Debug, Clone)]
pub struct DriverContext {
    /// Id of the resource this driver backs
    pub id: String,

    /// Raw configuration (already validated against `configs()`)
    pub config: Value,

    /// Cancelled when the resource is stopped or the engine shuts down
    pub cancel: CancellationToken,

    ingest: Arc<IngestQueue>,
}

impl DriverContext {
    pub fn new(
        id: impl Into<String>,
        config: Value,
        cancel: CancellationToken,
        ingest: Arc<IngestQueue>,
    ) -> Self {
        Self {
            id: id.into(),
            config,
            cancel,
            ingest,
        }
    }

    /// Hand a received payload to the engine.
    ///
    /// Fails with `QueueFull` (reject mode) or `Cancelled` (resource
    /// stopped while waiting for space); the driver decides whether to
    /// drop the payload and carry on.
    pub async fn push(&self, payload: impl Into<String>) -> Result<(), EngineError> {
        self.ingest.offer(&self.id, payload.into(), &self.cancel).await
    }
}

/// Lifecycle shared by every driver
#[async_trait]
pub trait Driver: Send + Sync {
    /// Type tag of the driver family
    fn kind(&self) -> &str;

    /// Configuration schema for this kind
    fn configs(&self) -> ConfigSchema;

    /// Acquire resources; the driver is not visible to dispatch until this
    /// returns `Ok`
    async fn start(&self, ctx: &DriverContext) -> Result<()>;

    /// Release resources; must be safe to call after a failed `start`
    async fn stop(&self) -> Result<()>;

    /// Refresh driver-internal state (reconnect, re-read a file) without a
    /// new definition. Definition changes go through a stop and a fresh
    /// load instead.
    async fn reload(&self, _config: &Value) -> Result<()> {
        Ok(())
    }

    async fn pause(&self) -> Result<()> {
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        Ok(())
    }

    fn status(&self) -> DriverState;

    /// Connectivity self-test
    async fn test(&self, _id: &str) -> bool {
        self.status() == DriverState::Up
    }
}

/// Input endpoint driver
#[async_trait]
pub trait Source: Driver {
    /// Read loop; runs on its own task until `ctx.cancel` fires
    async fn run(&self, ctx: DriverContext) -> Result<()> {
        ctx.cancel.cancelled().await;
        Ok(())
    }
}

/// Output endpoint driver
#[async_trait]
pub trait Sink: Driver {
    async fn write(&self, data: &str) -> Result<()>;
}

/// Device driver
#[async_trait]
pub trait DeviceDriver: Driver {
    async fn read(&self, cmd: &str) -> Result<String>;

    /// Returns the number of bytes accepted
    async fn write(&self, cmd: &str, data: &str) -> Result<usize>;

    async fn ctrl(&self, cmd: &str, args: &str) -> Result<String>;

    /// Polling loop; devices that only react to writes keep the default
    async fn run(&self, ctx: DriverContext) -> Result<()> {
        ctx.cancel.cancelled().await;
        Ok(())
    }
}

type SourceFactory = Arc<dyn Fn() -> Arc<dyn Source> + Send + Sync>;
type SinkFactory = Arc<dyn Fn() -> Arc<dyn Sink> + Send + Sync>;
type DeviceFactory = Arc<dyn Fn() -> Arc<dyn DeviceDriver> + Send + Sync>;

/// Type tag → driver factory, per capability
#[derive(Clone, Default)]
pub struct DriverCatalog {
    sources: BTreeMap<String, SourceFactory>,
    sinks: BTreeMap<String, SinkFactory>,
    devices: BTreeMap<String, DeviceFactory>,
}

impl std::fmt::Debug for DriverCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverCatalog")
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .field("sinks", &self.sinks.keys().collect::<Vec<_>>())
            .field("devices", &self.devices.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl DriverCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog with the built-in drivers registered
    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register_source("memory", || Arc::new(MemorySource::new()) as Arc<dyn Source>);
        catalog.register_source("ticker", || Arc::new(TickerSource::new()) as Arc<dyn Source>);
        catalog.register_sink("memory", || Arc::new(MemorySink::new()) as Arc<dyn Sink>);
        catalog.register_sink("log", || Arc::new(LogSink::new()) as Arc<dyn Sink>);
        catalog.register_device("memory", || {
            Arc::new(MemoryDevice::new()) as Arc<dyn DeviceDriver>
        });
        catalog
    }

    pub fn register_source<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Source> + Send + Sync + 'static,
    {
        self.sources.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn register_sink<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Sink> + Send + Sync + 'static,
    {
        self.sinks.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn register_device<F>(&mut self, kind: &str, factory: F)
    where
        F: Fn() -> Arc<dyn DeviceDriver> + Send + Sync + 'static,
    {
        self.devices.insert(kind.to_string(), Arc::new(factory));
    }

    pub fn make_source(&self, kind: &str) -> Result<Arc<dyn Source>, ValidationError> {
        self.sources
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| unknown("input", kind))
    }

    pub fn make_sink(&self, kind: &str) -> Result<Arc<dyn Sink>, ValidationError> {
        self.sinks
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| unknown("output", kind))
    }

    pub fn make_device(&self, kind: &str) -> Result<Arc<dyn DeviceDriver>, ValidationError> {
        self.devices
            .get(kind)
            .map(|factory| factory())
            .ok_or_else(|| unknown("device", kind))
    }

    /// Configuration schemas of every registered kind, grouped by capability
    pub fn schemas(&self) -> BTreeMap<&'static str, Vec<ConfigSchema>> {
        let mut schemas = BTreeMap::new();
        schemas.insert(
            "inputs",
            self.sources.values().map(|f| f().configs()).collect(),
        );
        schemas.insert("outputs", self.sinks.values().map(|f| f().configs()).collect());
        schemas.insert(
            "devices",
            self.devices.values().map(|f| f().configs()).collect(),
        );
        schemas
    }
}

fn unknown(kind: &str, type_tag: &str) -> ValidationError {
    ValidationError::UnknownType {
        kind: kind.to_string(),
        type_tag: type_tag.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_kinds() {
        let catalog = DriverCatalog::with_builtins();

        assert_eq!(catalog.make_source("ticker").unwrap().kind(), "ticker");
        assert_eq!(catalog.make_sink("log").unwrap().kind(), "log");
        assert_eq!(catalog.make_device("memory").unwrap().kind(), "memory");
    }

    #[test]
    fn test_unknown_kind() {
        let catalog = DriverCatalog::with_builtins();
        let err = catalog.make_sink("mqtt").err().unwrap();
        assert_eq!(err.to_string(), "Unknown output type: mqtt");
    }

    #[test]
    fn test_schemas_grouped() {
        let schemas = DriverCatalog::with_builtins().schemas();
        let inputs: Vec<&str> = schemas["inputs"].iter().map(|s| s.kind.as_str()).collect();
        assert_eq!(inputs, vec!["memory", "ticker"]);
        assert_eq!(schemas["outputs"].len(), 2);
    }
}
