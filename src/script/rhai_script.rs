//! General scripting evaluator backed by Rhai.
//!
//! Truthiness follows the scripting convention the gateway's rules were
//! written against: only `()` and `false` are falsy. Any other predicate
//! result passes, and a non-boolean result becomes the payload seen by the
//! callbacks (a transform).
//!
//! Every compiled script keeps the engine it was compiled with. Engine
//! functions (`output`, `device_write`, `device_ctrl`, `log`) record into
//! the effect list of the run active on the calling thread; a run is
//! synchronous, so the list never leaks across evaluations.

use std::cell::RefCell;
use std::sync::Arc;

use rhai::{Dynamic, Engine, ImmutableString, Scope, AST};
use serde_json::Value;
use tracing::debug;

use super::{Bindings, Evaluation, ScriptEvaluator, ScriptLimits};
use crate::domain::{Effect, EvaluatorKind};

thread_local! {
    static RECORDING: RefCell<Option<Vec<Effect>>> = const { RefCell::new(None) };
}

/// A compiled general script (empty source compiles to a no-op)
#[derive(Debug, Clone)]
pub struct RhaiScript {
    program: Option<Arc<Program>>,
}

#[derive(Debug)]
struct Program {
    engine: Engine,
    ast: AST,
}

/// Result of running a script: the value (or fault) plus every effect
/// recorded before it returned
#[derive(Debug)]
pub struct ScriptRun {
    pub result: Result<Dynamic, String>,
    pub effects: Vec<Effect>,
}

impl RhaiScript {
    /// Parse `source`; syntax errors are reported here, at rule load
    pub fn compile(source: &str, limits: &ScriptLimits) -> Result<Self, String> {
        if source.trim().is_empty() {
            return Ok(Self { program: None });
        }

        let engine = script_engine(limits);
        let ast = engine.compile(source).map_err(|e| e.to_string())?;

        Ok(Self {
            program: Some(Arc::new(Program { engine, ast })),
        })
    }

    pub fn is_empty(&self) -> bool {
        self.program.is_none()
    }

    /// Run the script with `bindings` in scope
    pub fn execute(&self, bindings: &Bindings) -> ScriptRun {
        let Some(program) = &self.program else {
            return ScriptRun {
                result: Ok(Dynamic::UNIT),
                effects: Vec::new(),
            };
        };

        let (result, effects) = recording(|| {
            let mut scope = build_scope(bindings)?;
            program
                .engine
                .eval_ast_with_scope::<Dynamic>(&mut scope, &program.ast)
                .map_err(|e| e.to_string())
        });

        ScriptRun { result, effects }
    }
}

/// Run `f` with a fresh effect list installed on this thread
fn recording<T>(f: impl FnOnce() -> T) -> (T, Vec<Effect>) {
    let previous = RECORDING.with(|slot| slot.replace(Some(Vec::new())));
    let result = f();
    let effects = RECORDING.with(|slot| slot.replace(previous));
    (result, effects.unwrap_or_default())
}

fn record(effect: Effect) {
    RECORDING.with(|slot| {
        if let Some(effects) = slot.borrow_mut().as_mut() {
            effects.push(effect);
        }
    });
}

impl ScriptEvaluator for RhaiScript {
    fn kind(&self) -> EvaluatorKind {
        EvaluatorKind::Script
    }

    fn evaluate(&self, bindings: &Bindings) -> Result<Evaluation, String> {
        if self.is_empty() {
            return Ok(Evaluation::pass());
        }

        let run = self.execute(bindings);
        let value = run.result?;

        let transformed = if value.is_unit() || value.is::<bool>() {
            None
        } else {
            rhai::serde::from_dynamic::<Value>(&value).ok()
        };

        Ok(Evaluation {
            truthy: is_truthy(&value),
            transformed,
            effects: run.effects,
        })
    }
}

/// Only `()` and `false` are falsy
pub fn is_truthy(value: &Dynamic) -> bool {
    if value.is_unit() {
        return false;
    }
    value.as_bool().unwrap_or(true)
}

/// Build an engine whose host functions record into the active run
fn script_engine(limits: &ScriptLimits) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(limits.max_operations);
    engine.set_max_call_levels(limits.max_call_levels);
    engine.on_print(|text| debug!(script_print = %text));

    engine.register_fn("output", |target: &str, data: Dynamic| {
        record(Effect::Output {
            target: target.to_string(),
            data: dynamic_to_text(data),
        })
    });

    engine.register_fn("device_write", |target: &str, cmd: &str, data: Dynamic| {
        record(Effect::DeviceWrite {
            target: target.to_string(),
            cmd: cmd.to_string(),
            data: dynamic_to_text(data),
        })
    });

    engine.register_fn("device_ctrl", |target: &str, cmd: &str, args: Dynamic| {
        record(Effect::DeviceCtrl {
            target: target.to_string(),
            cmd: cmd.to_string(),
            args: dynamic_to_text(args),
        })
    });

    engine.register_fn("log", |message: &str| {
        record(Effect::Log {
            message: message.to_string(),
        })
    });

    engine
}

fn build_scope(bindings: &Bindings) -> Result<Scope<'static>, String> {
    let mut scope = Scope::new();
    scope.push_constant("data", bindings.data.clone());
    scope.push_constant("source", bindings.source.clone());
    scope.push_constant("error", bindings.error.clone().unwrap_or_default());
    scope.push_dynamic("payload", to_dynamic(&bindings.payload)?);

    for (name, value) in bindings.fields() {
        scope.push_dynamic(name.clone(), to_dynamic(value)?);
    }

    Ok(scope)
}

fn to_dynamic(value: &Value) -> Result<Dynamic, String> {
    rhai::serde::to_dynamic(value).map_err(|e| e.to_string())
}

/// Strings pass through; everything else is rendered as JSON
fn dynamic_to_text(value: Dynamic) -> String {
    if value.is_unit() {
        return String::new();
    }
    if value.is::<ImmutableString>() {
        return value.into_string().unwrap_or_default();
    }
    match rhai::serde::from_dynamic::<Value>(&value) {
        Ok(json) => json.to_string(),
        Err(_) => value.to_string(),
    }
}
