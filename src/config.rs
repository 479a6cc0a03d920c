//! Configuration for the rulegate process.
//!
//! Configuration sources (highest priority first):
//! 1. Explicit path (`--config` or the `RULEGATE_CONFIG` environment variable)
//! 2. Config file (.rulegate/config.yaml), searched upward from the current directory
//! 3. User config (~/.rulegate/config.yaml)
//! 4. Built-in defaults
//!
//! Relative application paths in a config file are resolved against the
//! project root (the parent of `.rulegate/`) or, for an explicit file, the
//! file's own directory.

pub mod binder;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    AppDefinition, DeviceDefinition, GoodsDefinition, InEndDefinition, OutEndDefinition,
    RuleDefinition,
};
use crate::ingest::QueueMode;
use crate::script::ScriptLimits;

/// Directory name searched for configuration
pub const CONFIG_DIR: &str = ".rulegate";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub log: LogSection,

    /// Plugin sections keyed by plugin name
    #[serde(default)]
    pub plugins: BTreeMap<String, PluginSection>,

    #[serde(default)]
    pub resources: ResourcesSection,
}

fn default_version() -> String {
    "1".to_string()
}

/// Engine tuning; passed by reference to the engine, never global
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Ingest queue capacity (default: 1024)
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Behaviour when the ingest queue is full (default: block)
    #[serde(default)]
    pub queue_mode: QueueMode,

    /// Bound on delivering one effect to an output or device (default: 5000ms)
    #[serde(default = "default_effect_timeout_ms")]
    pub effect_timeout_ms: u64,

    /// Bound on graceful shutdown (default: 10s)
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,

    /// Bound on joining one resource's read loop (default: 2000ms)
    #[serde(default = "default_stop_timeout_ms")]
    pub stop_timeout_ms: u64,

    #[serde(default)]
    pub script: ScriptLimits,
}

fn default_max_queue_size() -> usize {
    1024
}
fn default_effect_timeout_ms() -> u64 {
    5000
}
fn default_shutdown_timeout_secs() -> u64 {
    10
}
fn default_stop_timeout_ms() -> u64 {
    2000
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_queue_size: default_max_queue_size(),
            queue_mode: QueueMode::default(),
            effect_timeout_ms: default_effect_timeout_ms(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
            stop_timeout_ms: default_stop_timeout_ms(),
            script: ScriptLimits::default(),
        }
    }
}

impl EngineSettings {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    pub fn effect_timeout(&self) -> Duration {
        Duration::from_millis(self.effect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSection {
    /// Default filter directive when RUST_LOG/RULEGATE_LOG are unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One `plugins.<name>` section
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PluginSection {
    #[serde(default)]
    pub enable: bool,

    /// Startup aborts if this plugin fails to init or start
    #[serde(default)]
    pub mandatory: bool,

    /// Plugin-specific keys, handed to `Plugin::init`
    #[serde(flatten)]
    pub settings: serde_json::Map<String, Value>,
}

impl PluginSection {
    pub fn settings_value(&self) -> Value {
        Value::Object(self.settings.clone())
    }
}

/// Statically declared resources
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourcesSection {
    #[serde(default)]
    pub inputs: Vec<InEndDefinition>,

    #[serde(default)]
    pub outputs: Vec<OutEndDefinition>,

    #[serde(default)]
    pub devices: Vec<DeviceDefinition>,

    #[serde(default)]
    pub rules: Vec<RuleDefinition>,

    #[serde(default)]
    pub apps: Vec<AppDefinition>,

    #[serde(default)]
    pub goods: Vec<GoodsDefinition>,
}

/// Configuration together with where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub file: ConfigFile,

    /// Path to config file (if found)
    pub path: Option<PathBuf>,
}

/// Find config file by searching `start` and its parents
pub fn find_config_file(start: &Path) -> Option<PathBuf> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_DIR).join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
pub fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Resolve a path that may be relative to the config file's location
fn resolve_path(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Directory relative paths in `config_path` are resolved against
fn base_dir(config_path: &Path) -> &Path {
    let parent = config_path.parent().unwrap_or(Path::new("."));
    if parent.file_name().is_some_and(|name| name == CONFIG_DIR) {
        parent.parent().unwrap_or(Path::new("."))
    } else {
        parent
    }
}

/// Load configuration from all sources.
///
/// An explicit path must exist; discovered files are optional.
pub fn load(explicit: Option<&Path>) -> Result<LoadedConfig> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => std::env::current_dir()
            .ok()
            .and_then(|dir| find_config_file(&dir))
            .or_else(|| {
                dirs::home_dir()
                    .map(|home| home.join(CONFIG_DIR).join("config.yaml"))
                    .filter(|path| path.exists())
            }),
    };

    let Some(path) = path else {
        return Ok(LoadedConfig {
            file: ConfigFile::default(),
            path: None,
        });
    };

    let mut file = load_config_file(&path)?;

    let base = base_dir(&path).to_path_buf();
    for app in &mut file.resources.apps {
        app.path = resolve_path(&base, &app.path);
    }

    Ok(LoadedConfig {
        file,
        path: Some(path),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE: &str = r#"
version: "1"
engine:
  max_queue_size: 8
  queue_mode: reject
  effect_timeout_ms: 250
  script:
    max_operations: 5000
log:
  level: debug
plugins:
  heartbeat:
    enable: true
    interval_secs: 5
resources:
  inputs:
    - id: in-1
      type: memory
      name: sensors
  outputs:
    - id: out-1
      type: log
      name: console
      config:
        prefix: "alert: "
  rules:
    - id: r-1
      name: overheat
      from_source: [in-1]
      expression: "temperature > 30"
      actions: 'output("out-1", data)'
  apps:
    - name: tool
      path: bin/tool.sh
"#;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR);
        std::fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join("config.yaml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "{}", content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config: ConfigFile = serde_yaml::from_str("version: \"1\"").unwrap();

        assert_eq!(config.engine, EngineSettings::default());
        assert_eq!(config.engine.queue_mode, QueueMode::Block);
        assert_eq!(config.engine.stop_timeout(), Duration::from_millis(2000));
        assert_eq!(config.log.level, "info");
        assert!(config.resources.rules.is_empty());
    }

    #[test]
    fn test_config_file_parsing() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), SAMPLE);

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.engine.max_queue_size, 8);
        assert_eq!(config.engine.queue_mode, QueueMode::Reject);
        assert_eq!(config.engine.effect_timeout(), Duration::from_millis(250));
        assert_eq!(config.engine.script.max_operations, 5000);
        assert_eq!(config.log.level, "debug");

        let heartbeat = &config.plugins["heartbeat"];
        assert!(heartbeat.enable);
        assert!(!heartbeat.mandatory);
        assert_eq!(heartbeat.settings_value()["interval_secs"], serde_json::json!(5));

        assert_eq!(config.resources.inputs[0].kind, "memory");
        assert_eq!(config.resources.outputs[0].config["prefix"], "alert: ");
        assert_eq!(config.resources.rules[0].from_source, vec!["in-1"]);
    }

    #[test]
    fn test_find_config_upward() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), SAMPLE);
        let nested = temp.path().join("a").join("b");
        std::fs::create_dir_all(&nested).unwrap();

        assert_eq!(find_config_file(&nested), Some(path));
    }

    #[test]
    fn test_app_paths_relative_to_project_root() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), SAMPLE);

        let loaded = load(Some(path.as_path())).unwrap();
        assert_eq!(
            loaded.file.resources.apps[0].path,
            temp.path().join("bin/tool.sh")
        );
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let err = load(Some(Path::new("/nonexistent/rulegate.yaml"))).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_parse_error_names_file() {
        let temp = TempDir::new().unwrap();
        let path = write_config(temp.path(), "engine: [not, a, map]");

        let err = load_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config file"));
    }
}
