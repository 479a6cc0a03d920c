//! Process-level extensions.
//!
//! Plugins are discovered from `plugins.<name>` configuration sections at
//! startup, initialised with their section, then started with a
//! [`PluginContext`]. Once bootstrap finishes the engine seals plugin
//! registration; plugins are stopped only at shutdown.

pub mod heartbeat;

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::binder::ValidationError;
use crate::core::Registry;

pub use heartbeat::HeartbeatPlugin;

/// Handles a plugin gets when it starts
#[derive(Clone)]
pub struct PluginContext {
    pub name: String,

    /// Cancelled when the plugin is stopped or the engine shuts down
    pub cancel: CancellationToken,

    /// Read access to every live resource
    pub registry: Arc<Registry>,

    tracker: TaskTracker,
}

impl PluginContext {
    pub(crate) fn new(
        name: impl Into<String>,
        cancel: CancellationToken,
        registry: Arc<Registry>,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            name: name.into(),
            cancel,
            registry,
            tracker,
        }
    }

    /// Spawn a background task the engine waits for on shutdown
    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: std::future::Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.tracker.spawn(future)
    }
}

/// Name-identified extension with Init/Start/Stop
#[async_trait]
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// Receive the plugin's configuration section
    async fn init(&self, settings: &Value) -> Result<()>;

    /// Begin work; long-running loops go through [`PluginContext::spawn`]
    async fn start(&self, ctx: PluginContext) -> Result<()>;

    async fn stop(&self) -> Result<()>;
}

/// A started plugin held by the registry
pub struct PluginEntry {
    pub plugin: Arc<dyn Plugin>,
    pub settings: Value,
    pub(crate) cancel: CancellationToken,
}

impl PluginEntry {
    pub fn name(&self) -> &str {
        self.plugin.name()
    }
}

type PluginFactory = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// Plugin name → factory
#[derive(Clone, Default)]
pub struct PluginCatalog {
    factories: BTreeMap<String, PluginFactory>,
}

impl std::fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut catalog = Self::new();
        catalog.register("heartbeat", || Arc::new(HeartbeatPlugin::new()) as Arc<dyn Plugin>);
        catalog
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.factories.insert(name.to_string(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn make(&self, name: &str) -> Result<Arc<dyn Plugin>, ValidationError> {
        self.factories
            .get(name)
            .map(|factory| factory())
            .ok_or_else(|| ValidationError::UnknownType {
                kind: "plugin".to_string(),
                type_tag: name.to_string(),
            })
    }

    pub fn names(&self) -> Vec<&str> {
        self.factories.keys().map(String::as_str).collect()
    }
}
