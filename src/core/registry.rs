//! Concurrency-safe id → instance store.
//!
//! Reads (dispatch, status queries) take a short `RwLock` read and clone an
//! `Arc`, so a dispatch keeps a consistent snapshot of the rule it is running
//! even if the rule is removed halfway. Admin writes are serialised per kind
//! by an async admin lock held across driver start/stop; reads never wait
//! on it.
//!
//! The registry also owns the binding index: target id → rule ids in load
//! order. The index is never cached outside the registry.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::Serialize;
use tokio::sync::{Mutex, MutexGuard};

use super::error::{EngineError, ResourceKind};
use super::lifecycle::ResourceState;
use super::resource::{Device, InEnd, OutEnd};
use crate::apps::{App, Goods};
use crate::plugins::PluginEntry;
use crate::script::CompiledRule;

/// Id-keyed table for one resource kind
pub struct Table<T> {
    kind: ResourceKind,
    entries: RwLock<BTreeMap<String, Arc<T>>>,
    admin: Mutex<()>,
}

impl<T> Table<T> {
    fn new(kind: ResourceKind) -> Self {
        Self {
            kind,
            entries: RwLock::new(BTreeMap::new()),
            admin: Mutex::new(()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Arc<T>>> {
        self.entries.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Arc<T>>> {
        self.entries.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.read().get(id).cloned()
    }

    /// Snapshot of every entry, ordered by id
    pub fn all(&self) -> Vec<Arc<T>> {
        self.read().values().cloned().collect()
    }

    pub fn ids(&self) -> Vec<String> {
        self.read().keys().cloned().collect()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialise admin operations on this kind
    pub(crate) async fn lock_admin(&self) -> MutexGuard<'_, ()> {
        self.admin.lock().await
    }

    pub(crate) fn ensure_absent(&self, id: &str) -> Result<(), EngineError> {
        if self.contains(id) {
            return Err(EngineError::AlreadyExists {
                kind: self.kind,
                id: id.to_string(),
            });
        }
        Ok(())
    }

    pub(crate) fn insert(&self, id: &str, entry: Arc<T>) -> Result<(), EngineError> {
        let mut entries = self.write();
        if entries.contains_key(id) {
            return Err(EngineError::AlreadyExists {
                kind: self.kind,
                id: id.to_string(),
            });
        }
        entries.insert(id.to_string(), entry);
        Ok(())
    }

    /// Swap the entry of `id`, returning the previous one
    pub(crate) fn replace(&self, id: &str, entry: Arc<T>) -> Option<Arc<T>> {
        self.write().insert(id.to_string(), entry)
    }

    pub(crate) fn evict(&self, id: &str) -> Option<Arc<T>> {
        self.write().remove(id)
    }

    pub(crate) fn require(&self, id: &str) -> Result<Arc<T>, EngineError> {
        self.get(id).ok_or_else(|| EngineError::NotFound {
            kind: self.kind,
            id: id.to_string(),
        })
    }
}

/// Resource counts per kind
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RegistrySummary {
    pub inputs: usize,
    pub outputs: usize,
    pub devices: usize,
    pub rules: usize,
    pub plugins: usize,
    pub apps: usize,
    pub goods: usize,
}

/// Every live resource of the engine
pub struct Registry {
    pub inputs: Table<InEnd>,
    pub outputs: Table<OutEnd>,
    pub devices: Table<Device>,
    pub rules: Table<CompiledRule>,
    pub plugins: Table<PluginEntry>,
    pub apps: Table<App>,
    pub goods: Table<Goods>,
    bindings: RwLock<HashMap<String, Vec<String>>>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self {
            inputs: Table::new(ResourceKind::InEnd),
            outputs: Table::new(ResourceKind::OutEnd),
            devices: Table::new(ResourceKind::Device),
            rules: Table::new(ResourceKind::Rule),
            plugins: Table::new(ResourceKind::Plugin),
            apps: Table::new(ResourceKind::App),
            goods: Table::new(ResourceKind::Goods),
            bindings: RwLock::new(HashMap::new()),
        }
    }

    /// Rule ids bound to `target`, in binding order
    pub fn bound_rules(&self, target: &str) -> Vec<String> {
        self.bindings
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(target)
            .cloned()
            .unwrap_or_default()
    }

    /// Append `rule` to the binding list of every target it names
    pub(crate) fn bind_rule(&self, rule: &CompiledRule) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        for target in rule.definition().targets() {
            let bound = bindings.entry(target.clone()).or_default();
            if !bound.iter().any(|id| id == rule.id()) {
                bound.push(rule.id().to_string());
            }
        }
    }

    pub(crate) fn unbind_rule(&self, rule: &CompiledRule) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        for target in rule.definition().targets() {
            if let Some(bound) = bindings.get_mut(target) {
                bound.retain(|id| id != rule.id());
                if bound.is_empty() {
                    bindings.remove(target);
                }
            }
        }
    }

    /// Move a reloaded rule's bindings from `previous` to `next`.
    ///
    /// Targets named by both keep the rule at its current position; dropped
    /// targets lose it and new targets get it appended.
    pub(crate) fn rebind_rule(&self, previous: &CompiledRule, next: &CompiledRule) {
        let mut bindings = self.bindings.write().unwrap_or_else(|e| e.into_inner());
        let kept: Vec<&String> = next.definition().targets().collect();

        for target in previous.definition().targets() {
            if kept.contains(&target) {
                continue;
            }
            if let Some(bound) = bindings.get_mut(target) {
                bound.retain(|id| id != previous.id());
                if bound.is_empty() {
                    bindings.remove(target);
                }
            }
        }

        for target in next.definition().targets() {
            let bound = bindings.entry(target.clone()).or_default();
            if !bound.iter().any(|id| id == next.id()) {
                bound.push(next.id().to_string());
            }
        }
    }

    /// Whether `id` names a loaded input or device
    pub fn is_target(&self, id: &str) -> bool {
        self.inputs.contains(id) || self.devices.contains(id)
    }

    /// Run state of a dispatch target (input first, then device)
    pub fn target_state(&self, id: &str) -> Option<ResourceState> {
        self.inputs
            .get(id)
            .map(|input| input.state())
            .or_else(|| self.devices.get(id).map(|device| device.state()))
    }

    pub fn summary(&self) -> RegistrySummary {
        RegistrySummary {
            inputs: self.inputs.len(),
            outputs: self.outputs.len(),
            devices: self.devices.len(),
            rules: self.rules.len(),
            plugins: self.plugins.len(),
            apps: self.apps.len(),
            goods: self.goods.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RuleDefinition;
    use crate::script::ScriptLimits;

    fn rule(id: &str, targets: &[&str]) -> CompiledRule {
        let definition = RuleDefinition {
            from_source: targets.iter().map(|t| t.to_string()).collect(),
            ..RuleDefinition::new(id, id)
        };
        CompiledRule::compile(definition, &ScriptLimits::default()).unwrap()
    }

    #[test]
    fn test_table_insert_duplicate() {
        let table: Table<u32> = Table::new(ResourceKind::App);
        table.insert("a", Arc::new(1)).unwrap();

        let err = table.insert("a", Arc::new(2)).unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists { kind: ResourceKind::App, .. }));
        assert_eq!(*table.get("a").unwrap(), 1);
    }

    #[test]
    fn test_table_evict_missing() {
        let table: Table<u32> = Table::new(ResourceKind::App);
        assert!(table.evict("missing").is_none());
        assert!(matches!(
            table.require("missing"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[test]
    fn test_binding_order_follows_load_order() {
        let registry = Registry::new();
        let first = rule("r-1", &["in-1"]);
        let second = rule("r-2", &["in-1", "in-2"]);

        registry.bind_rule(&first);
        registry.bind_rule(&second);

        assert_eq!(registry.bound_rules("in-1"), vec!["r-1", "r-2"]);
        assert_eq!(registry.bound_rules("in-2"), vec!["r-2"]);

        registry.unbind_rule(&first);
        assert_eq!(registry.bound_rules("in-1"), vec!["r-2"]);

        registry.unbind_rule(&second);
        assert!(registry.bound_rules("in-2").is_empty());
    }

    #[test]
    fn test_rebind_keeps_position_on_shared_targets() {
        let registry = Registry::new();
        for id in ["r-1", "r-2", "r-3"] {
            registry.bind_rule(&rule(id, &["in-1"]));
        }

        registry.rebind_rule(&rule("r-2", &["in-1"]), &rule("r-2", &["in-1", "in-2"]));
        assert_eq!(registry.bound_rules("in-1"), vec!["r-1", "r-2", "r-3"]);
        assert_eq!(registry.bound_rules("in-2"), vec!["r-2"]);

        registry.rebind_rule(&rule("r-2", &["in-1", "in-2"]), &rule("r-2", &["in-2"]));
        assert_eq!(registry.bound_rules("in-1"), vec!["r-1", "r-3"]);
        assert_eq!(registry.bound_rules("in-2"), vec!["r-2"]);
    }

    #[test]
    fn test_snapshot_survives_eviction() {
        let registry = Registry::new();
        registry.rules.insert("r-1", Arc::new(rule("r-1", &[]))).unwrap();

        let snapshot = registry.rules.get("r-1").unwrap();
        registry.rules.evict("r-1");

        assert_eq!(snapshot.id(), "r-1");
        assert!(registry.rules.get("r-1").is_none());
    }
}
