//! Heartbeat plugin: logs a registry summary on a fixed interval.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use super::{Plugin, PluginContext};
use crate::config::binder::{bind, ConfigSchema, FieldType};

#[derive(Debug, Clone, Deserialize)]
struct HeartbeatSettings {
    #[serde(default = "default_interval_secs")]
    interval_secs: u64,
}

fn default_interval_secs() -> u64 {
    30
}

#[derive(Debug, Default)]
pub struct HeartbeatPlugin {
    interval: Mutex<Option<Duration>>,
}

impl HeartbeatPlugin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schema() -> ConfigSchema {
        ConfigSchema::new("heartbeat", "Heartbeat").optional(
            "interval_secs",
            FieldType::Integer,
            "Seconds between summaries",
        )
    }
}

#[async_trait]
impl Plugin for HeartbeatPlugin {
    fn name(&self) -> &str {
        "heartbeat"
    }

    async fn init(&self, settings: &Value) -> Result<()> {
        let settings: HeartbeatSettings = bind(&Self::schema(), settings)?;
        if settings.interval_secs == 0 {
            bail!("interval_secs must be greater than zero");
        }
        *self.interval.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Duration::from_secs(settings.interval_secs));
        Ok(())
    }

    async fn start(&self, ctx: PluginContext) -> Result<()> {
        let period = self
            .interval
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .unwrap_or(Duration::from_secs(default_interval_secs()));

        let task_ctx = ctx.clone();
        ctx.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_ctx.cancel.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let summary = task_ctx.registry.summary();
                info!(
                    inputs = summary.inputs,
                    outputs = summary.outputs,
                    devices = summary.devices,
                    rules = summary.rules,
                    apps = summary.apps,
                    goods = summary.goods,
                    "Heartbeat"
                );
            }

            debug!(plugin = %task_ctx.name, "Heartbeat stopped");
        });

        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_init_defaults() {
        let plugin = HeartbeatPlugin::new();
        plugin.init(&json!({ "enable": true })).await.unwrap();
        assert_eq!(
            *plugin.interval.lock().unwrap(),
            Some(Duration::from_secs(30))
        );
    }

    #[tokio::test]
    async fn test_init_rejects_bad_interval() {
        let plugin = HeartbeatPlugin::new();
        assert!(plugin.init(&json!({ "interval_secs": "soon" })).await.is_err());
        assert!(plugin.init(&json!({ "interval_secs": 0 })).await.is_err());
    }
}
