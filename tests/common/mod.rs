//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use rulegate::drivers::{DeviceDriver, Sink};
use rulegate::plugins::PluginCatalog;
use rulegate::{
    DriverCatalog, EngineSettings, InEndDefinition, MemoryDevice, MemorySink, OutEndDefinition,
    QueueMode, RuleDefinition, RuleEngine,
};

/// Engine plus handles on the drivers registered as `capture` (sink) and
/// `bench` (device)
pub struct Harness {
    pub engine: Arc<RuleEngine>,
    pub sink: Arc<MemorySink>,
    pub device: Arc<MemoryDevice>,
}

pub fn settings(capacity: usize, mode: QueueMode) -> EngineSettings {
    EngineSettings {
        max_queue_size: capacity,
        queue_mode: mode,
        effect_timeout_ms: 1000,
        shutdown_timeout_secs: 5,
        stop_timeout_ms: 500,
        ..Default::default()
    }
}

pub fn harness_with(settings: EngineSettings) -> Harness {
    harness_with_drivers(settings, |_| {})
}

/// Harness whose catalog also carries the drivers `extra` registers
pub fn harness_with_drivers(
    settings: EngineSettings,
    extra: impl FnOnce(&mut DriverCatalog),
) -> Harness {
    let sink = Arc::new(MemorySink::new());
    let device = Arc::new(MemoryDevice::new());

    let mut catalog = DriverCatalog::with_builtins();
    let shared = sink.clone();
    catalog.register_sink("capture", move || shared.clone() as Arc<dyn Sink>);
    let shared = device.clone();
    catalog.register_device("bench", move || shared.clone() as Arc<dyn DeviceDriver>);
    extra(&mut catalog);

    let engine = RuleEngine::with_catalogs(settings, catalog, PluginCatalog::with_builtins());

    Harness {
        engine: Arc::new(engine),
        sink,
        device,
    }
}

pub fn harness() -> Harness {
    harness_with(settings(64, QueueMode::Block))
}

pub fn memory_input(id: &str) -> InEndDefinition {
    InEndDefinition::new(id, "memory", format!("{} input", id))
}

pub fn capture_output(id: &str) -> OutEndDefinition {
    OutEndDefinition::new(id, "capture", format!("{} output", id))
}

pub fn rule(id: &str, from: &[&str]) -> RuleDefinition {
    RuleDefinition {
        from_source: from.iter().map(|s| s.to_string()).collect(),
        ..RuleDefinition::new(id, id)
    }
}

/// Poll `condition` until it holds or `timeout` passes
pub async fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
