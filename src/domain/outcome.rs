//! Results of dispatching a payload through bound rules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Side effect requested by a rule script through an engine function.
///
/// Scripts never touch drivers directly; they record effects which the
/// dispatch pipeline applies, in order, after the script returns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "effect")]
pub enum Effect {
    /// `output(id, data)`
    Output { target: String, data: String },

    /// `device_write(id, cmd, data)`
    DeviceWrite {
        target: String,
        cmd: String,
        data: String,
    },

    /// `device_ctrl(id, cmd, args)`
    DeviceCtrl {
        target: String,
        cmd: String,
        args: String,
    },

    /// `log(msg)`
    Log { message: String },
}

impl Effect {
    /// Target resource id, if the effect addresses one
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::Output { target, .. }
            | Self::DeviceWrite { target, .. }
            | Self::DeviceCtrl { target, .. } => Some(target),
            Self::Log { .. } => None,
        }
    }
}

/// How the predicate of a rule resolved
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum PredicateResult {
    /// Truthy result
    Passed,

    /// Falsy result
    Rejected,

    /// Syntax or runtime fault
    Errored { error: String },
}

/// Which exclusive callback ran after Actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Branch {
    Success,
    Failed,
}

/// Outcome of evaluating one rule against one payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleOutcome {
    pub rule_id: String,

    pub predicate: PredicateResult,

    pub branch: Branch,

    /// Effects that were delivered, in script order
    pub applied: Vec<Effect>,

    /// Callback faults and delivery failures (never fatal)
    pub errors: Vec<String>,

    pub duration_ms: u64,
}

impl RuleOutcome {
    /// Whether the rule ran its Success branch with no faults at all
    pub fn is_clean_success(&self) -> bool {
        self.branch == Branch::Success && self.errors.is_empty()
    }
}

/// Result of one `work` call: delivery happened, plus per-rule outcomes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchReport {
    pub target: String,

    pub received_at: DateTime<Utc>,

    /// One entry per bound rule, in binding order
    pub outcomes: Vec<RuleOutcome>,
}

impl DispatchReport {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            received_at: Utc::now(),
            outcomes: Vec::new(),
        }
    }

    /// Rule ids in the order they were evaluated
    pub fn evaluated_rules(&self) -> Vec<&str> {
        self.outcomes.iter().map(|o| o.rule_id.as_str()).collect()
    }

    /// Outcome for a specific rule
    pub fn outcome(&self, rule_id: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.rule_id == rule_id)
    }
}
