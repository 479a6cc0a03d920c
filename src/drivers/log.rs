//! Sink that writes every payload to the tracing log.

use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::info;

use super::{Driver, DriverContext, DriverState, Sink, StatusFlag};
use crate::config::binder::{bind, ConfigSchema, FieldType};

#[derive(Debug, Default, Deserialize)]
struct LogSinkConfig {
    #[serde(default)]
    prefix: String,
}

#[derive(Debug, Default)]
pub struct LogSink {
    status: StatusFlag,
    // (output id, prefix)
    target: Mutex<(String, String)>,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Driver for LogSink {
    fn kind(&self) -> &str {
        "log"
    }

    fn configs(&self) -> ConfigSchema {
        ConfigSchema::new("log", "Log output").optional(
            "prefix",
            FieldType::String,
            "Text prepended to every line",
        )
    }

    async fn start(&self, ctx: &DriverContext) -> Result<()> {
        let config: LogSinkConfig = bind(&self.configs(), &ctx.config)?;
        *self.target.lock().unwrap_or_else(|e| e.into_inner()) = (ctx.id.clone(), config.prefix);
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
impl Sink for LogSink {
    async fn write(&self, data: &str) -> Result<()> {
        let (id, prefix) = self.target.lock().unwrap_or_else(|e| e.into_inner()).clone();
        info!(output = %id, "{}{}", prefix, data);
        Ok(())
    }
}
