//! Live resources held by the registry.

use std::sync::Arc;

use super::lifecycle::{ResourceState, ResourceTask, StateCell};
use crate::domain::{DeviceDefinition, InEndDefinition, OutEndDefinition};
use crate::drivers::{DeviceDriver, Sink, Source};

/// A loaded input endpoint
pub struct InEnd {
    pub definition: InEndDefinition,
    pub driver: Arc<dyn Source>,
    pub state: StateCell,
    pub(crate) task: ResourceTask,
}

impl InEnd {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn state(&self) -> ResourceState {
        self.state.get()
    }
}

/// A loaded output endpoint
pub struct OutEnd {
    pub definition: OutEndDefinition,
    pub driver: Arc<dyn Sink>,
    pub state: StateCell,
}

impl OutEnd {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn state(&self) -> ResourceState {
        self.state.get()
    }
}

/// A loaded device
pub struct Device {
    pub definition: DeviceDefinition,
    pub driver: Arc<dyn DeviceDriver>,
    pub state: StateCell,
    pub(crate) task: ResourceTask,
}

impl Device {
    pub fn id(&self) -> &str {
        &self.definition.id
    }

    pub fn state(&self) -> ResourceState {
        self.state.get()
    }
}
