//! A rule compiled for execution.
//!
//! Execution order for one payload:
//! 1. predicate (may reject, fail, or transform the payload)
//! 2. Actions, always
//! 3. exactly one of Success (predicate passed) or Failed (rejected/errored)
//!
//! Faults in any stage are contained here and reported alongside the
//! effects recorded before the fault.

use tracing::warn;

use super::{
    compile_predicate, Bindings, RhaiScript, ScriptError, ScriptEvaluator, ScriptLimits,
    ScriptPhase,
};
use crate::domain::{Branch, Effect, PredicateResult, RuleDefinition};

/// Everything one rule produced for one payload, before delivery
#[derive(Debug, Clone)]
pub struct RuleExecution {
    pub predicate: PredicateResult,
    pub branch: Branch,

    /// Effects in the order scripts requested them
    pub effects: Vec<Effect>,

    pub errors: Vec<ScriptError>,
}

/// Rule definition with its scripts parsed
#[derive(Debug)]
pub struct CompiledRule {
    definition: RuleDefinition,
    predicate: Box<dyn ScriptEvaluator>,
    actions: RhaiScript,
    success: RhaiScript,
    failed: RhaiScript,
}

impl CompiledRule {
    /// Parse every script of `definition`; any syntax error rejects the rule
    pub fn compile(definition: RuleDefinition, limits: &ScriptLimits) -> Result<Self, ScriptError> {
        let id = definition.id.clone();
        let fail = |part: &str, message: String| {
            ScriptError::new(&id, ScriptPhase::Compile, format!("{}: {}", part, message))
        };

        let predicate = compile_predicate(definition.evaluator, &definition.expression, limits)
            .map_err(|e| fail("expression", e))?;
        let actions =
            RhaiScript::compile(&definition.actions, limits).map_err(|e| fail("actions", e))?;
        let success =
            RhaiScript::compile(&definition.success, limits).map_err(|e| fail("success", e))?;
        let failed =
            RhaiScript::compile(&definition.failed, limits).map_err(|e| fail("failed", e))?;

        Ok(Self {
            definition,
            predicate,
            actions,
            success,
            failed,
        })
    }

    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn definition(&self) -> &RuleDefinition {
        &self.definition
    }

    /// Run the full rule against one payload
    pub fn execute(&self, bindings: &Bindings) -> RuleExecution {
        let mut effects = Vec::new();
        let mut errors = Vec::new();

        let (predicate, bindings) = match self.predicate.evaluate(bindings) {
            Ok(evaluation) => {
                effects.extend(evaluation.effects);
                let bindings = match evaluation.transformed {
                    Some(payload) => bindings.with_payload(payload),
                    None => bindings.clone(),
                };
                let result = if evaluation.truthy {
                    PredicateResult::Passed
                } else {
                    PredicateResult::Rejected
                };
                (result, bindings)
            }
            Err(message) => {
                warn!(rule = %self.id(), error = %message, "Predicate failed");
                errors.push(ScriptError::new(self.id(), ScriptPhase::Predicate, message.clone()));
                (PredicateResult::Errored { error: message }, bindings.clone())
            }
        };

        self.run_callback(&self.actions, ScriptPhase::Actions, &bindings, &mut effects, &mut errors);

        let branch = match &predicate {
            PredicateResult::Passed => {
                self.run_callback(
                    &self.success,
                    ScriptPhase::Success,
                    &bindings,
                    &mut effects,
                    &mut errors,
                );
                Branch::Success
            }
            PredicateResult::Rejected => {
                let bindings = bindings.with_error("");
                self.run_callback(&self.failed, ScriptPhase::Failed, &bindings, &mut effects, &mut errors);
                Branch::Failed
            }
            PredicateResult::Errored { error } => {
                let bindings = bindings.with_error(error.clone());
                self.run_callback(&self.failed, ScriptPhase::Failed, &bindings, &mut effects, &mut errors);
                Branch::Failed
            }
        };

        RuleExecution {
            predicate,
            branch,
            effects,
            errors,
        }
    }

    fn run_callback(
        &self,
        script: &RhaiScript,
        phase: ScriptPhase,
        bindings: &Bindings,
        effects: &mut Vec<Effect>,
        errors: &mut Vec<ScriptError>,
    ) {
        if script.is_empty() {
            return;
        }

        let run = script.execute(bindings);
        effects.extend(run.effects);

        if let Err(message) = run.result {
            warn!(rule = %self.id(), phase = %phase, error = %message, "Callback failed");
            errors.push(ScriptError::new(self.id(), phase, message));
        }
    }
}
