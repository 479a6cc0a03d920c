//! Bootstrap Integration Tests
//!
//! Tests for loading a configuration file into a running engine.

use std::io::Write;

use rulegate::config::{self, ConfigFile};
use rulegate::core::bootstrap;
use rulegate::RuleEngine;
use tempfile::TempDir;

const GATEWAY: &str = r#"
version: "1"
engine:
  max_queue_size: 32
  effect_timeout_ms: 1000
  shutdown_timeout_secs: 2
plugins:
  heartbeat:
    enable: true
    interval_secs: 60
  telemetry:
    enable: true
  disabled_thing:
    enable: false
resources:
  outputs:
    - { id: out-log, type: log, name: console, config: { prefix: "[gw] " } }
  inputs:
    - { id: in-1, type: memory, name: sensors }
    - { id: in-bad, type: ticker, name: broken ticker }
  devices:
    - { id: dev-1, type: memory, name: board }
  rules:
    - id: r-1
      name: overheat
      from_source: [in-1]
      from_device: [dev-1]
      expression: "temperature > 30"
      success: 'output("out-log", "hot")'
"#;

fn write_config(content: &str) -> (TempDir, std::path::PathBuf) {
    let temp = TempDir::new().unwrap();
    let dir = temp.path().join(".rulegate");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.yaml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "{}", content).unwrap();
    (temp, path)
}

#[tokio::test]
async fn test_bootstrap_loads_declared_resources() {
    let (_temp, path) = write_config(GATEWAY);
    let loaded = config::load(Some(path.as_path())).unwrap();

    let engine = RuleEngine::new(loaded.file.engine.clone());
    let report = bootstrap(&engine, &loaded.file).await.unwrap();

    // heartbeat, out-log, in-1, dev-1, r-1
    assert_eq!(report.loaded, 5);
    // in-bad has no interval_ms
    assert_eq!(report.failed, 1);
    assert_eq!(report.skipped_plugins, vec!["telemetry"]);

    let summary = engine.registry().summary();
    assert_eq!(summary.plugins, 1);
    assert_eq!(summary.inputs, 1);
    assert_eq!(summary.devices, 1);
    assert_eq!(engine.registry().bound_rules("dev-1"), vec!["r-1"]);

    // Registration window closed
    assert!(engine
        .load_plugin("heartbeat", serde_json::json!({}))
        .await
        .is_err());

    let report = engine.work("in-1", r#"{"temperature": 35}"#).await.unwrap();
    assert!(report.outcome("r-1").unwrap().is_clean_success());

    engine.shutdown().await;
}

#[tokio::test]
async fn test_mandatory_plugin_failure_aborts() {
    let config: ConfigFile = serde_yaml::from_str(
        r#"
plugins:
  heartbeat:
    enable: true
    mandatory: true
    interval_secs: 0
resources:
  inputs:
    - { id: in-1, type: memory, name: sensors }
"#,
    )
    .unwrap();

    let engine = RuleEngine::new(config.engine.clone());
    let err = bootstrap(&engine, &config).await.unwrap_err();

    assert!(err.to_string().contains("Mandatory plugin 'heartbeat'"));
    assert!(engine.registry().inputs.is_empty());
}

#[tokio::test]
async fn test_mandatory_unknown_plugin_aborts() {
    let config: ConfigFile = serde_yaml::from_str(
        r#"
plugins:
  telemetry:
    enable: true
    mandatory: true
"#,
    )
    .unwrap();

    let engine = RuleEngine::new(config.engine.clone());
    assert!(bootstrap(&engine, &config).await.is_err());
}
