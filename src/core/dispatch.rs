//! Dispatch pipeline: route one payload through every rule bound to its
//! source, then deliver the effects the rules requested.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::error::EngineError;
use super::lifecycle::ResourceState;
use super::registry::Registry;
use crate::domain::{DispatchReport, Effect, RuleOutcome};
use crate::script::Bindings;

/// Executes `work` against the live registry
pub struct Dispatcher {
    registry: Arc<Registry>,
    effect_timeout: Duration,
}

impl Dispatcher {
    /// `effect_timeout` bounds the delivery of each single effect
    pub fn new(registry: Arc<Registry>, effect_timeout: Duration) -> Self {
        Self {
            registry,
            effect_timeout,
        }
    }

    /// Deliver `payload` from `target` (input endpoint or device id).
    ///
    /// Fails only when the target is absent or not `Up`. Rule faults and
    /// delivery failures are recorded per rule in the report; every bound
    /// rule runs exactly once, in binding order.
    #[instrument(skip(self, target, payload), fields(source = %target, bytes = payload.len()))]
    pub async fn work(&self, target: &str, payload: &str) -> Result<DispatchReport, EngineError> {
        match self.registry.target_state(target) {
            Some(ResourceState::Up) => {}
            state => {
                return Err(EngineError::ResourceUnavailable {
                    id: target.to_string(),
                    state,
                })
            }
        }

        let mut report = DispatchReport::new(target);

        let rule_ids = self.registry.bound_rules(target);
        if rule_ids.is_empty() {
            debug!("No rules bound, payload dropped");
            return Ok(report);
        }

        let bindings = Bindings::new(target, payload);

        for rule_id in rule_ids {
            // Removed between the index snapshot and now
            let Some(rule) = self.registry.rules.get(&rule_id) else {
                continue;
            };

            let started = Instant::now();
            let execution = rule.execute(&bindings);

            let mut outcome = RuleOutcome {
                rule_id: rule_id.clone(),
                predicate: execution.predicate,
                branch: execution.branch,
                applied: Vec::new(),
                errors: execution.errors.iter().map(|e| e.to_string()).collect(),
                duration_ms: 0,
            };

            for effect in execution.effects {
                match self.apply(&rule_id, &effect).await {
                    Ok(()) => outcome.applied.push(effect),
                    Err(e) => {
                        warn!(rule = %rule_id, error = %e, "Effect not delivered");
                        outcome.errors.push(e.to_string());
                    }
                }
            }

            outcome.duration_ms = started.elapsed().as_millis() as u64;
            debug!(
                rule = %rule_id,
                branch = ?outcome.branch,
                effects = outcome.applied.len(),
                errors = outcome.errors.len(),
                "Rule evaluated"
            );
            report.outcomes.push(outcome);
        }

        Ok(report)
    }

    async fn apply(&self, rule_id: &str, effect: &Effect) -> Result<(), EngineError> {
        match effect {
            Effect::Output { target, data } => {
                let output = self.registry.outputs.get(target).filter(|o| o.state.is_up());
                let Some(output) = output else {
                    return Err(self.unavailable(target, |r| {
                        r.outputs.get(target).map(|o| o.state())
                    }));
                };
                self.deliver(target, output.driver.write(data)).await
            }
            Effect::DeviceWrite { target, cmd, data } => {
                let device = self.registry.devices.get(target).filter(|d| d.state.is_up());
                let Some(device) = device else {
                    return Err(self.unavailable(target, |r| {
                        r.devices.get(target).map(|d| d.state())
                    }));
                };
                self.deliver(target, device.driver.write(cmd, data)).await
            }
            Effect::DeviceCtrl { target, cmd, args } => {
                let device = self.registry.devices.get(target).filter(|d| d.state.is_up());
                let Some(device) = device else {
                    return Err(self.unavailable(target, |r| {
                        r.devices.get(target).map(|d| d.state())
                    }));
                };
                self.deliver(target, device.driver.ctrl(cmd, args)).await
            }
            Effect::Log { message } => {
                info!(rule = %rule_id, "{}", message);
                Ok(())
            }
        }
    }

    /// Await one driver call, failing it once the effect timeout elapses
    async fn deliver<T>(
        &self,
        target: &str,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> Result<(), EngineError> {
        match tokio::time::timeout(self.effect_timeout, call).await {
            Ok(Ok(_)) => Ok(()),
            Ok(Err(e)) => Err(EngineError::driver(target, &e)),
            Err(_) => Err(EngineError::EffectTimeout {
                id: target.to_string(),
                timeout_ms: self.effect_timeout.as_millis() as u64,
            }),
        }
    }

    fn unavailable(
        &self,
        id: &str,
        state: impl FnOnce(&Registry) -> Option<ResourceState>,
    ) -> EngineError {
        EngineError::ResourceUnavailable {
            id: id.to_string(),
            state: state(&self.registry),
        }
    }
}
