//! Loading a configuration file into a running engine.
//!
//! Plugins come first (a failing mandatory plugin aborts startup), then
//! outputs, devices and inputs, then rules so that every binding resolves,
//! then goods and applications. Other per-resource failures are logged and
//! counted; they never stop the remaining resources from loading.

use anyhow::{bail, Result};
use serde::Serialize;
use tracing::{error, info, warn};

use super::engine::RuleEngine;
use crate::config::ConfigFile;
use crate::drivers::DriverCatalog;
use crate::plugins::PluginCatalog;
use crate::script::{CompiledRule, ScriptLimits};

/// What bootstrap managed to load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BootReport {
    pub loaded: usize,
    pub failed: usize,
    pub skipped_plugins: Vec<String>,
}

impl BootReport {
    fn record<T, E: std::fmt::Display>(&mut self, what: &str, name: &str, result: Result<T, E>) {
        match result {
            Ok(_) => self.loaded += 1,
            Err(e) => {
                error!(resource = what, name = %name, error = %e, "Failed to load");
                self.failed += 1;
            }
        }
    }
}

/// Load every enabled plugin and declared resource of `config` into `engine`
pub async fn bootstrap(engine: &RuleEngine, config: &ConfigFile) -> Result<BootReport> {
    let mut report = BootReport::default();

    for (name, section) in &config.plugins {
        if !section.enable {
            continue;
        }

        if !engine.plugin_catalog().contains(name) {
            if section.mandatory {
                bail!("Mandatory plugin '{}' is not available", name);
            }
            warn!(plugin = %name, "Unknown plugin, skipping");
            report.skipped_plugins.push(name.clone());
            continue;
        }

        match engine.load_plugin(name, section.settings_value()).await {
            Ok(()) => report.loaded += 1,
            Err(e) if section.mandatory => {
                bail!("Mandatory plugin '{}' failed to start: {}", name, e);
            }
            Err(e) => {
                error!(plugin = %name, error = %e, "Plugin failed to start");
                report.failed += 1;
            }
        }
    }
    engine.seal_plugins();

    let resources = &config.resources;

    for output in &resources.outputs {
        let result = engine.load_out_end(output.clone()).await;
        report.record("output", &output.name, result);
    }
    for device in &resources.devices {
        let result = engine.load_device(device.clone()).await;
        report.record("device", &device.name, result);
    }
    for input in &resources.inputs {
        let result = engine.load_in_end(input.clone()).await;
        report.record("input", &input.name, result);
    }
    for rule in &resources.rules {
        let result = engine.load_rule(rule.clone()).await;
        report.record("rule", &rule.name, result);
    }
    for goods in &resources.goods {
        let result = engine.load_goods(goods.clone()).await;
        report.record("goods", &goods.addr, result);
    }
    for app in &resources.apps {
        let result = engine.load_app(app.clone()).await;
        report.record("app", &app.name, result);
    }

    info!(
        loaded = report.loaded,
        failed = report.failed,
        "Bootstrap complete"
    );
    Ok(report)
}

/// A problem found by [`check`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckIssue {
    pub resource: String,
    pub name: String,
    pub message: String,
}

/// Validate every declared resource without starting anything: driver
/// types and configurations, plugin names, and rule scripts.
pub fn check(
    config: &ConfigFile,
    drivers: &DriverCatalog,
    plugins: &PluginCatalog,
    limits: &ScriptLimits,
) -> Vec<CheckIssue> {
    let mut issues = Vec::new();
    let mut push = |resource: &str, name: &str, message: String| {
        issues.push(CheckIssue {
            resource: resource.to_string(),
            name: name.to_string(),
            message,
        })
    };

    for (name, section) in &config.plugins {
        if section.enable && !plugins.contains(name) {
            push("plugin", name, "unknown plugin".to_string());
        }
    }

    let resources = &config.resources;

    for input in &resources.inputs {
        let result = drivers
            .make_source(&input.kind)
            .and_then(|driver| driver.configs().validate(&input.config));
        if let Err(e) = result {
            push("input", &input.name, e.to_string());
        }
    }
    for output in &resources.outputs {
        let result = drivers
            .make_sink(&output.kind)
            .and_then(|driver| driver.configs().validate(&output.config));
        if let Err(e) = result {
            push("output", &output.name, e.to_string());
        }
    }
    for device in &resources.devices {
        let result = drivers
            .make_device(&device.kind)
            .and_then(|driver| driver.configs().validate(&device.config));
        if let Err(e) = result {
            push("device", &device.name, e.to_string());
        }
    }
    for rule in &resources.rules {
        if let Err(e) = CompiledRule::compile(rule.clone(), limits) {
            push("rule", &rule.name, e.to_string());
        }
    }

    issues
}
