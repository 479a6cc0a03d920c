//! Dispatch Pipeline Integration Tests
//!
//! Tests for rule ordering, callback selection, fault isolation and
//! effect delivery through `work`.

mod common;

use common::{capture_output, harness, memory_input, rule};
use rulegate::domain::{Branch, PredicateResult};
use rulegate::{DeviceDefinition, Effect, EngineError, ResourceState};

#[tokio::test]
async fn test_temperature_scenario() {
    let h = harness();
    h.engine.load_out_end(capture_output("out-1")).await.unwrap();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();
    h.engine
        .load_rule(rulegate::RuleDefinition {
            expression: "temperature > 30".to_string(),
            actions: r#"output("out-1", data)"#.to_string(),
            success: r#"log("alert: " + temperature)"#.to_string(),
            failed: r#"log("normal")"#.to_string(),
            ..rule("r-1", &["in-1"])
        })
        .await
        .unwrap();

    let hot = h.engine.work("in-1", r#"{"temperature":40}"#).await.unwrap();
    let outcome = hot.outcome("r-1").unwrap();
    assert_eq!(outcome.predicate, PredicateResult::Passed);
    assert_eq!(outcome.branch, Branch::Success);
    assert!(outcome.is_clean_success());
    assert_eq!(
        outcome.applied,
        vec![
            Effect::Output {
                target: "out-1".to_string(),
                data: r#"{"temperature":40}"#.to_string()
            },
            Effect::Log {
                message: "alert: 40".to_string()
            },
        ]
    );

    let cold = h.engine.work("in-1", r#"{"temperature":10}"#).await.unwrap();
    let outcome = cold.outcome("r-1").unwrap();
    assert_eq!(outcome.predicate, PredicateResult::Rejected);
    assert_eq!(outcome.branch, Branch::Failed);
    assert_eq!(
        outcome.applied.last(),
        Some(&Effect::Log {
            message: "normal".to_string()
        })
    );

    // Actions ran for both payloads
    assert_eq!(
        h.sink.records(),
        vec![r#"{"temperature":40}"#, r#"{"temperature":10}"#]
    );
}

#[tokio::test]
async fn test_every_rule_runs_in_binding_order_despite_failures() {
    let h = harness();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();
    h.engine.load_out_end(capture_output("out-1")).await.unwrap();

    h.engine
        .load_rule(rulegate::RuleDefinition {
            expression: r#"throw "sensor offline""#.to_string(),
            ..rule("r-c", &["in-1"])
        })
        .await
        .unwrap();
    h.engine
        .load_rule(rulegate::RuleDefinition {
            actions: r#"output("out-missing", data)"#.to_string(),
            ..rule("r-a", &["in-1"])
        })
        .await
        .unwrap();
    h.engine
        .load_rule(rulegate::RuleDefinition {
            actions: r#"output("out-1", "ok")"#.to_string(),
            ..rule("r-b", &["in-1"])
        })
        .await
        .unwrap();

    let report = h.engine.work("in-1", "{}").await.unwrap();

    // Load order, not id order
    assert_eq!(report.evaluated_rules(), vec!["r-c", "r-a", "r-b"]);

    let faulted = report.outcome("r-c").unwrap();
    assert!(matches!(faulted.predicate, PredicateResult::Errored { .. }));
    assert_eq!(faulted.branch, Branch::Failed);

    let undelivered = report.outcome("r-a").unwrap();
    assert_eq!(undelivered.branch, Branch::Success);
    assert!(undelivered.applied.is_empty());
    assert!(undelivered.errors[0].contains("out-missing"));

    assert!(report.outcome("r-b").unwrap().is_clean_success());
    assert_eq!(h.sink.records(), vec!["ok"]);
}

#[tokio::test]
async fn test_removed_rule_is_not_evaluated() {
    let h = harness();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();
    h.engine.load_rule(rule("r-1", &["in-1"])).await.unwrap();
    h.engine.load_rule(rule("r-2", &["in-1"])).await.unwrap();

    h.engine.remove_rule("r-1").await.unwrap();

    let report = h.engine.work("in-1", "x").await.unwrap();
    assert_eq!(report.evaluated_rules(), vec!["r-2"]);
}

#[tokio::test]
async fn test_zero_rules_is_accepted() {
    let h = harness();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();

    let report = h.engine.work("in-1", "ignored").await.unwrap();
    assert!(report.outcomes.is_empty());
    assert_eq!(report.target, "in-1");
}

#[tokio::test]
async fn test_unknown_target_is_unavailable() {
    let h = harness();
    let err = h.engine.work("in-404", "x").await.unwrap_err();

    assert!(matches!(
        err,
        EngineError::ResourceUnavailable { ref id, state: None } if id == "in-404"
    ));
}

#[tokio::test]
async fn test_rule_loaded_before_its_input() {
    let h = harness();
    h.engine.load_rule(rule("r-1", &["in-late"])).await.unwrap();
    h.engine.load_in_end(memory_input("in-late")).await.unwrap();

    let report = h.engine.work("in-late", "x").await.unwrap();
    assert_eq!(report.evaluated_rules(), vec!["r-1"]);
}

#[tokio::test]
async fn test_device_source_and_device_effects() {
    let h = harness();
    h.engine
        .load_device(DeviceDefinition::new("dev-in", "memory", "thermometer"))
        .await
        .unwrap();
    h.engine
        .load_device(DeviceDefinition::new("relay", "bench", "relay board"))
        .await
        .unwrap();

    h.engine
        .load_rule(rulegate::RuleDefinition {
            from_device: vec!["dev-in".to_string()],
            expression: "payload.level > 3".to_string(),
            success: r#"device_write("relay", "ch1", "on"); device_ctrl("relay", "keys", "")"#
                .to_string(),
            failed: r#"device_write("relay", "ch1", "off")"#.to_string(),
            ..rulegate::RuleDefinition::new("r-dev", "relay control")
        })
        .await
        .unwrap();

    let report = h.engine.work("dev-in", r#"{"level": 5}"#).await.unwrap();
    assert_eq!(report.outcome("r-dev").unwrap().applied.len(), 2);

    h.engine.work("dev-in", r#"{"level": 1}"#).await.unwrap();

    assert_eq!(
        h.device.writes(),
        vec![
            ("ch1".to_string(), "on".to_string()),
            ("ch1".to_string(), "off".to_string())
        ]
    );
    assert_eq!(h.device.register("ch1").as_deref(), Some("off"));
}

#[tokio::test]
async fn test_paused_output_is_a_rule_error_not_a_work_error() {
    let h = harness();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();
    h.engine.load_out_end(capture_output("out-1")).await.unwrap();
    h.engine
        .load_rule(rulegate::RuleDefinition {
            actions: r#"output("out-1", data)"#.to_string(),
            ..rule("r-1", &["in-1"])
        })
        .await
        .unwrap();

    h.engine.pause_out_end("out-1").await.unwrap();

    let report = h.engine.work("in-1", "x").await.unwrap();
    let outcome = report.outcome("r-1").unwrap();
    assert!(outcome.errors[0].contains(&ResourceState::Paused.to_string()));
    assert!(h.sink.records().is_empty());
}

#[tokio::test]
async fn test_failing_sink_write_is_recorded() {
    let h = harness();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();
    h.engine
        .load_out_end(
            rulegate::OutEndDefinition::new("out-bad", "memory", "broken")
                .with_config(serde_json::json!({ "fail_writes": true })),
        )
        .await
        .unwrap();
    h.engine
        .load_rule(rulegate::RuleDefinition {
            actions: r#"output("out-bad", data); log("after")"#.to_string(),
            ..rule("r-1", &["in-1"])
        })
        .await
        .unwrap();

    let report = h.engine.work("in-1", "x").await.unwrap();
    let outcome = report.outcome("r-1").unwrap();

    assert_eq!(outcome.errors.len(), 1);
    assert!(outcome.errors[0].contains("write rejected"));
    // Later effects of the same rule are still delivered
    assert_eq!(
        outcome.applied,
        vec![Effect::Log {
            message: "after".to_string()
        }]
    );
}

#[tokio::test]
async fn test_expr_rule_dispatch() {
    let h = harness();
    h.engine.load_in_end(memory_input("in-1")).await.unwrap();
    h.engine.load_out_end(capture_output("out-1")).await.unwrap();
    h.engine
        .load_rule(rulegate::RuleDefinition {
            evaluator: rulegate::domain::EvaluatorKind::Expr,
            expression: r#"humidity >= 80 && room == "lab""#.to_string(),
            success: r#"output("out-1", room)"#.to_string(),
            ..rule("r-1", &["in-1"])
        })
        .await
        .unwrap();

    h.engine
        .work("in-1", r#"{"humidity": 85, "room": "lab"}"#)
        .await
        .unwrap();
    h.engine
        .work("in-1", r#"{"humidity": 50, "room": "lab"}"#)
        .await
        .unwrap();

    assert_eq!(h.sink.records(), vec!["lab"]);
}
