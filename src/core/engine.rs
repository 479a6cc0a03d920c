//! The rule engine: lifecycle controller and admin surface.
//!
//! Load order for endpoints and devices:
//! 1. validate the definition and the driver configuration
//! 2. take the per-kind admin lock and check the id is free
//! 3. start the driver (stopped again and rolled back on failure)
//! 4. mark `Up` and publish in the registry
//! 5. open the resource's ingest lane and spawn its consumer and read loop
//!    under a child cancellation token
//!
//! Removal runs the same steps backwards; a resource is fully stopped
//! before it disappears from the registry. Reload is remove + load under one
//! admin lock, so no dispatch to the id succeeds in between.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};

use super::dispatch::Dispatcher;
use super::error::{EngineError, ResourceKind};
use super::lifecycle::{ResourceState, ResourceTask, StateCell};
use super::registry::Registry;
use super::resource::{Device, InEnd, OutEnd};
use crate::apps::{App, Goods};
use crate::config::EngineSettings;
use crate::domain::definition::{normalize_id, require_field};
use crate::domain::{
    AppDefinition, DeviceDefinition, DispatchReport, GoodsDefinition, InEndDefinition,
    OutEndDefinition, RuleDefinition,
};
use crate::drivers::{Driver, DriverCatalog, DriverContext};
use crate::ingest::{spawn_consumer, IngestQueue};
use crate::plugins::{PluginCatalog, PluginContext, PluginEntry};
use crate::script::CompiledRule;

/// The rule engine core
pub struct RuleEngine {
    settings: EngineSettings,
    drivers: DriverCatalog,
    plugin_catalog: PluginCatalog,
    registry: Arc<Registry>,
    dispatcher: Arc<Dispatcher>,
    ingest: Arc<IngestQueue>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    plugins_sealed: AtomicBool,
}

impl RuleEngine {
    /// Engine with the built-in drivers and plugins
    pub fn new(settings: EngineSettings) -> Self {
        Self::with_catalogs(
            settings,
            DriverCatalog::with_builtins(),
            PluginCatalog::with_builtins(),
        )
    }

    pub fn with_catalogs(
        settings: EngineSettings,
        drivers: DriverCatalog,
        plugin_catalog: PluginCatalog,
    ) -> Self {
        let ingest = IngestQueue::new(settings.max_queue_size, settings.queue_mode);
        let registry = Arc::new(Registry::new());

        Self {
            dispatcher: Arc::new(Dispatcher::new(registry.clone(), settings.effect_timeout())),
            registry,
            ingest: Arc::new(ingest),
            settings,
            drivers,
            plugin_catalog,
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            plugins_sealed: AtomicBool::new(false),
        }
    }

    /// Let the per-resource consumers dispatch; payloads queue up until
    /// this is called
    pub fn start(&self) {
        if self.ingest.is_running() {
            debug!("Dispatch already started");
            return;
        }

        info!(
            lanes = self.ingest.lanes(),
            capacity = self.ingest.capacity(),
            mode = ?self.ingest.mode(),
            "Starting dispatch"
        );
        self.ingest.start_consumers();
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn drivers(&self) -> &DriverCatalog {
        &self.drivers
    }

    pub fn ingest(&self) -> &IngestQueue {
        &self.ingest
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Dispatch a payload synchronously, bypassing the ingest queue
    pub async fn work(&self, target: &str, payload: &str) -> Result<DispatchReport, EngineError> {
        self.dispatcher.work(target, payload).await
    }

    /// Queue a payload on behalf of an input or device.
    ///
    /// This is the push path for drivers fed from outside the process
    /// (e.g. `memory` inputs).
    pub async fn inject(&self, id: &str, payload: impl Into<String>) -> Result<(), EngineError> {
        let token = if let Some(input) = self.registry.inputs.get(id) {
            ensure_up(id, &input.state)?;
            input.task.token().clone()
        } else if let Some(device) = self.registry.devices.get(id) {
            ensure_up(id, &device.state)?;
            device.task.token().clone()
        } else {
            return Err(EngineError::ResourceUnavailable {
                id: id.to_string(),
                state: None,
            });
        };

        self.ingest.offer(id, payload.into(), &token).await
    }

    // ========================================================================
    // Input endpoints
    // ========================================================================

    #[instrument(skip(self, definition), fields(kind = %definition.kind))]
    pub async fn load_in_end(&self, mut definition: InEndDefinition) -> Result<String, EngineError> {
        normalize_id(&mut definition.id, ResourceKind::InEnd.id_prefix());
        let _admin = self.registry.inputs.lock_admin().await;
        self.start_in_end(definition).await
    }

    pub async fn remove_in_end(&self, id: &str) -> Result<(), EngineError> {
        let _admin = self.registry.inputs.lock_admin().await;
        self.stop_in_end(id).await;
        Ok(())
    }

    /// Stop the running input and load `definition` in its place
    pub async fn reload_in_end(&self, definition: InEndDefinition) -> Result<String, EngineError> {
        require_field(&definition.id, "input id")?;
        let _admin = self.registry.inputs.lock_admin().await;
        self.stop_in_end(&definition.id).await;
        self.start_in_end(definition).await
    }

    pub async fn pause_in_end(&self, id: &str) -> Result<(), EngineError> {
        let input = self.registry.inputs.require(id)?;
        pause(id, &input.state, input.driver.as_ref()).await
    }

    pub async fn resume_in_end(&self, id: &str) -> Result<(), EngineError> {
        let input = self.registry.inputs.require(id)?;
        resume(id, &input.state, input.driver.as_ref()).await
    }

    async fn start_in_end(&self, definition: InEndDefinition) -> Result<String, EngineError> {
        require_field(&definition.name, "input name")?;
        let driver = self.drivers.make_source(&definition.kind)?;
        driver.configs().validate(&definition.config)?;

        let id = definition.id.clone();
        self.registry.inputs.ensure_absent(&id)?;
        // Dispatch targets share one id space (bindings and ingest lanes)
        self.registry.devices.ensure_absent(&id)?;

        let state = StateCell::new(&id);
        state.transition(ResourceState::Starting)?;

        let token = self.cancel.child_token();
        let ctx = self.driver_context(&id, &definition.config, &token);
        start_driver(&id, driver.as_ref(), &ctx).await?;

        state.transition(ResourceState::Up)?;
        let input = Arc::new(InEnd {
            definition,
            driver: driver.clone(),
            state,
            task: ResourceTask::new(token),
        });
        if let Err(e) = self.registry.inputs.insert(&id, input.clone()) {
            stop_driver(&id, driver.as_ref()).await;
            return Err(e);
        }

        self.spawn_lane(&id, &input.task);
        let loop_id = id.clone();
        input.task.attach(self.tracker.spawn(async move {
            if let Err(e) = driver.run(ctx).await {
                error!(input = %loop_id, error = %format!("{:#}", e), "Read loop failed");
            }
        }));

        info!(input = %id, "Input loaded");
        Ok(id)
    }

    async fn stop_in_end(&self, id: &str) {
        let Some(input) = self.registry.inputs.get(id) else {
            debug!(input = %id, "Remove of unknown input ignored");
            return;
        };

        input.state.force(ResourceState::Stopping);
        self.ingest.close_lane(id);
        input.task.stop(id, self.settings.stop_timeout()).await;
        stop_driver(id, input.driver.as_ref()).await;
        input.state.force(ResourceState::Unloaded);
        self.registry.inputs.evict(id);

        info!(input = %id, "Input removed");
    }

    // ========================================================================
    // Output endpoints
    // ========================================================================

    #[instrument(skip(self, definition), fields(kind = %definition.kind))]
    pub async fn load_out_end(&self, mut definition: OutEndDefinition) -> Result<String, EngineError> {
        normalize_id(&mut definition.id, ResourceKind::OutEnd.id_prefix());
        let _admin = self.registry.outputs.lock_admin().await;
        self.start_out_end(definition).await
    }

    pub async fn remove_out_end(&self, id: &str) -> Result<(), EngineError> {
        let _admin = self.registry.outputs.lock_admin().await;
        self.stop_out_end(id).await;
        Ok(())
    }

    pub async fn reload_out_end(&self, definition: OutEndDefinition) -> Result<String, EngineError> {
        require_field(&definition.id, "output id")?;
        let _admin = self.registry.outputs.lock_admin().await;
        self.stop_out_end(&definition.id).await;
        self.start_out_end(definition).await
    }

    pub async fn pause_out_end(&self, id: &str) -> Result<(), EngineError> {
        let output = self.registry.outputs.require(id)?;
        pause(id, &output.state, output.driver.as_ref()).await
    }

    pub async fn resume_out_end(&self, id: &str) -> Result<(), EngineError> {
        let output = self.registry.outputs.require(id)?;
        resume(id, &output.state, output.driver.as_ref()).await
    }

    async fn start_out_end(&self, definition: OutEndDefinition) -> Result<String, EngineError> {
        require_field(&definition.name, "output name")?;
        let driver = self.drivers.make_sink(&definition.kind)?;
        driver.configs().validate(&definition.config)?;

        let id = definition.id.clone();
        self.registry.outputs.ensure_absent(&id)?;

        let state = StateCell::new(&id);
        state.transition(ResourceState::Starting)?;

        let token = self.cancel.child_token();
        let ctx = self.driver_context(&id, &definition.config, &token);
        start_driver(&id, driver.as_ref(), &ctx).await?;

        state.transition(ResourceState::Up)?;
        self.registry.outputs.insert(
            &id,
            Arc::new(OutEnd {
                definition,
                driver,
                state,
            }),
        )?;

        info!(output = %id, "Output loaded");
        Ok(id)
    }

    async fn stop_out_end(&self, id: &str) {
        let Some(output) = self.registry.outputs.get(id) else {
            debug!(output = %id, "Remove of unknown output ignored");
            return;
        };

        output.state.force(ResourceState::Stopping);
        stop_driver(id, output.driver.as_ref()).await;
        output.state.force(ResourceState::Unloaded);
        self.registry.outputs.evict(id);

        info!(output = %id, "Output removed");
    }

    // ========================================================================
    // Devices
    // ========================================================================

    #[instrument(skip(self, definition), fields(kind = %definition.kind))]
    pub async fn load_device(&self, mut definition: DeviceDefinition) -> Result<String, EngineError> {
        normalize_id(&mut definition.id, ResourceKind::Device.id_prefix());
        let _admin = self.registry.devices.lock_admin().await;
        self.start_device(definition).await
    }

    /// Removing an unknown device succeeds
    pub async fn remove_device(&self, id: &str) -> Result<(), EngineError> {
        let _admin = self.registry.devices.lock_admin().await;
        self.stop_device(id).await;
        Ok(())
    }

    pub async fn reload_device(&self, definition: DeviceDefinition) -> Result<String, EngineError> {
        require_field(&definition.id, "device id")?;
        let _admin = self.registry.devices.lock_admin().await;
        self.stop_device(&definition.id).await;
        self.start_device(definition).await
    }

    pub async fn pause_device(&self, id: &str) -> Result<(), EngineError> {
        let device = self.registry.devices.require(id)?;
        pause(id, &device.state, device.driver.as_ref()).await
    }

    pub async fn resume_device(&self, id: &str) -> Result<(), EngineError> {
        let device = self.registry.devices.require(id)?;
        resume(id, &device.state, device.driver.as_ref()).await
    }

    async fn start_device(&self, definition: DeviceDefinition) -> Result<String, EngineError> {
        require_field(&definition.name, "device name")?;
        let driver = self.drivers.make_device(&definition.kind)?;
        driver.configs().validate(&definition.config)?;

        let id = definition.id.clone();
        self.registry.devices.ensure_absent(&id)?;
        self.registry.inputs.ensure_absent(&id)?;

        let state = StateCell::new(&id);
        state.transition(ResourceState::Starting)?;

        let token = self.cancel.child_token();
        let ctx = self.driver_context(&id, &definition.config, &token);
        start_driver(&id, driver.as_ref(), &ctx).await?;

        state.transition(ResourceState::Up)?;
        let device = Arc::new(Device {
            definition,
            driver: driver.clone(),
            state,
            task: ResourceTask::new(token),
        });
        if let Err(e) = self.registry.devices.insert(&id, device.clone()) {
            stop_driver(&id, driver.as_ref()).await;
            return Err(e);
        }

        self.spawn_lane(&id, &device.task);
        let loop_id = id.clone();
        device.task.attach(self.tracker.spawn(async move {
            if let Err(e) = driver.run(ctx).await {
                error!(device = %loop_id, error = %format!("{:#}", e), "Device loop failed");
            }
        }));

        info!(device = %id, "Device loaded");
        Ok(id)
    }

    async fn stop_device(&self, id: &str) {
        let Some(device) = self.registry.devices.get(id) else {
            debug!(device = %id, "Remove of unknown device ignored");
            return;
        };

        device.state.force(ResourceState::Stopping);
        self.ingest.close_lane(id);
        device.task.stop(id, self.settings.stop_timeout()).await;
        stop_driver(id, device.driver.as_ref()).await;
        device.state.force(ResourceState::Unloaded);
        self.registry.devices.evict(id);

        info!(device = %id, "Device removed");
    }

    // ========================================================================
    // Rules
    // ========================================================================

    /// Compile and bind a rule; its From ids need not resolve yet
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    pub async fn load_rule(&self, mut definition: RuleDefinition) -> Result<String, EngineError> {
        normalize_id(&mut definition.id, ResourceKind::Rule.id_prefix());
        let _admin = self.registry.rules.lock_admin().await;
        self.insert_rule(definition)
    }

    pub async fn remove_rule(&self, id: &str) -> Result<(), EngineError> {
        let _admin = self.registry.rules.lock_admin().await;
        self.evict_rule(id);
        Ok(())
    }

    pub async fn reload_rule(&self, definition: RuleDefinition) -> Result<String, EngineError> {
        require_field(&definition.id, "rule id")?;
        let _admin = self.registry.rules.lock_admin().await;

        // Compile first so a broken replacement keeps the old rule running
        let rule = Arc::new(CompiledRule::compile(definition, &self.settings.script)?);
        let id = rule.id().to_string();

        let Some(previous) = self.registry.rules.get(&id) else {
            return self.publish_rule(rule);
        };

        self.warn_unresolved(&rule);
        self.registry.rules.replace(&id, rule.clone());
        self.registry.rebind_rule(&previous, &rule);

        info!(rule = %id, "Rule reloaded");
        Ok(id)
    }

    fn insert_rule(&self, definition: RuleDefinition) -> Result<String, EngineError> {
        require_field(&definition.name, "rule name")?;
        self.registry.rules.ensure_absent(&definition.id)?;

        let rule = CompiledRule::compile(definition, &self.settings.script)?;
        self.publish_rule(Arc::new(rule))
    }

    fn publish_rule(&self, rule: Arc<CompiledRule>) -> Result<String, EngineError> {
        let id = rule.id().to_string();

        self.warn_unresolved(&rule);
        self.registry.rules.insert(&id, rule.clone())?;
        self.registry.bind_rule(&rule);

        info!(rule = %id, "Rule loaded");
        Ok(id)
    }

    fn warn_unresolved(&self, rule: &CompiledRule) {
        for target in rule.definition().targets() {
            if !self.registry.is_target(target) {
                warn!(rule = %rule.id(), target = %target, "Rule bound to unknown input or device");
            }
        }
    }

    fn evict_rule(&self, id: &str) {
        match self.registry.rules.evict(id) {
            Some(rule) => {
                self.registry.unbind_rule(&rule);
                info!(rule = %id, "Rule removed");
            }
            None => debug!(rule = %id, "Remove of unknown rule ignored"),
        }
    }

    // ========================================================================
    // Plugins
    // ========================================================================

    /// Init and start a plugin; only allowed before [`RuleEngine::seal_plugins`]
    pub async fn load_plugin(&self, name: &str, settings: serde_json::Value) -> Result<(), EngineError> {
        if self.plugins_sealed.load(Ordering::SeqCst) {
            return Err(EngineError::PluginsSealed);
        }

        let _admin = self.registry.plugins.lock_admin().await;
        self.registry.plugins.ensure_absent(name)?;

        let plugin = self.plugin_catalog.make(name)?;
        plugin
            .init(&settings)
            .await
            .map_err(|e| EngineError::driver(name, &e))?;

        let cancel = self.cancel.child_token();
        let ctx = PluginContext::new(
            name,
            cancel.clone(),
            self.registry.clone(),
            self.tracker.clone(),
        );
        if let Err(e) = plugin.start(ctx).await {
            cancel.cancel();
            return Err(EngineError::driver(name, &e));
        }

        self.registry.plugins.insert(
            name,
            Arc::new(PluginEntry {
                plugin,
                settings,
                cancel,
            }),
        )?;

        info!(plugin = %name, "Plugin started");
        Ok(())
    }

    pub async fn remove_plugin(&self, name: &str) -> Result<(), EngineError> {
        let _admin = self.registry.plugins.lock_admin().await;
        let Some(entry) = self.registry.plugins.evict(name) else {
            return Ok(());
        };

        entry.cancel.cancel();
        if let Err(e) = entry.plugin.stop().await {
            warn!(plugin = %name, error = %format!("{:#}", e), "Plugin stop failed");
        }

        info!(plugin = %name, "Plugin stopped");
        Ok(())
    }

    /// Refuse further plugin registration
    pub fn seal_plugins(&self) {
        self.plugins_sealed.store(true, Ordering::SeqCst);
    }

    pub fn plugin_catalog(&self) -> &PluginCatalog {
        &self.plugin_catalog
    }

    // ========================================================================
    // Applications and goods
    // ========================================================================

    /// Register an application, starting it when `auto_start` is set
    #[instrument(skip(self, definition), fields(name = %definition.name))]
    pub async fn load_app(&self, mut definition: AppDefinition) -> Result<String, EngineError> {
        normalize_id(&mut definition.id, ResourceKind::App.id_prefix());
        require_field(&definition.name, "app name")?;
        require_field(&definition.path.to_string_lossy(), "app path")?;

        let id = definition.id.clone();
        let auto_start = definition.auto_start;

        {
            let _admin = self.registry.apps.lock_admin().await;
            self.registry.apps.ensure_absent(&id)?;

            let app = App::new(definition).await;
            debug!(app = %id, digest = ?app.digest, "App registered");
            self.registry.apps.insert(&id, Arc::new(app))?;
        }

        info!(app = %id, "App loaded");

        if auto_start {
            self.start_app(&id).await?;
        }
        Ok(id)
    }

    pub async fn start_app(&self, id: &str) -> Result<(), EngineError> {
        let app = self.registry.apps.require(id)?;
        app.process
            .start()
            .await
            .map_err(|e| EngineError::driver(id, &e))?;
        Ok(())
    }

    pub async fn stop_app(&self, id: &str) -> Result<(), EngineError> {
        let app = self.registry.apps.require(id)?;
        app.process
            .stop(self.settings.stop_timeout())
            .await
            .map_err(|e| EngineError::driver(id, &e))
    }

    pub async fn remove_app(&self, id: &str) -> Result<(), EngineError> {
        let _admin = self.registry.apps.lock_admin().await;
        let Some(app) = self.registry.apps.get(id) else {
            return Ok(());
        };

        if let Err(e) = app.process.stop(self.settings.stop_timeout()).await {
            warn!(app = %id, error = %format!("{:#}", e), "App stop failed");
        }
        self.registry.apps.evict(id);

        info!(app = %id, "App removed");
        Ok(())
    }

    /// Start a goods process; a process that fails to spawn is not registered
    #[instrument(skip(self, definition), fields(addr = %definition.addr))]
    pub async fn load_goods(&self, mut definition: GoodsDefinition) -> Result<String, EngineError> {
        normalize_id(&mut definition.id, ResourceKind::Goods.id_prefix());
        require_field(&definition.addr, "goods addr")?;

        let id = definition.id.clone();
        let _admin = self.registry.goods.lock_admin().await;
        self.registry.goods.ensure_absent(&id)?;

        let goods = Goods::new(definition);
        goods
            .process
            .start()
            .await
            .map_err(|e| EngineError::driver(&id, &e))?;
        self.registry.goods.insert(&id, Arc::new(goods))?;

        info!(goods = %id, "Goods loaded");
        Ok(id)
    }

    pub async fn remove_goods(&self, id: &str) -> Result<(), EngineError> {
        let _admin = self.registry.goods.lock_admin().await;
        let Some(goods) = self.registry.goods.get(id) else {
            return Ok(());
        };

        if let Err(e) = goods.process.stop(self.settings.stop_timeout()).await {
            warn!(goods = %id, error = %format!("{:#}", e), "Goods stop failed");
        }
        self.registry.goods.evict(id);

        info!(goods = %id, "Goods removed");
        Ok(())
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stop every resource, then wait for all tasks up to the shutdown
    /// timeout. A timeout is logged, never fatal.
    pub async fn shutdown(&self) {
        info!("Shutting down rule engine");
        self.seal_plugins();

        for id in self.registry.inputs.ids() {
            let _ = self.remove_in_end(&id).await;
        }
        for id in self.registry.devices.ids() {
            let _ = self.remove_device(&id).await;
        }
        for id in self.registry.outputs.ids() {
            let _ = self.remove_out_end(&id).await;
        }
        for name in self.registry.plugins.ids() {
            let _ = self.remove_plugin(&name).await;
        }
        for id in self.registry.apps.ids() {
            let _ = self.remove_app(&id).await;
        }
        for id in self.registry.goods.ids() {
            let _ = self.remove_goods(&id).await;
        }

        self.ingest.close();
        self.cancel.cancel();
        self.tracker.close();

        let timeout = self.settings.shutdown_timeout();
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_err() {
            warn!(?timeout, tasks = self.tracker.len(), "Shutdown timed out");
        } else {
            info!("Rule engine stopped");
        }
    }

    /// Whether shutdown has been requested
    pub fn is_shutting_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Open the ingest lane of `id` and attach its consumer to `task`
    fn spawn_lane(&self, id: &str, task: &ResourceTask) {
        let rx = self.ingest.open_lane(id);
        task.attach(spawn_consumer(
            self.dispatcher.clone(),
            id,
            rx,
            self.ingest.running_signal(),
            task.token().clone(),
            &self.tracker,
        ));
    }

    fn driver_context(
        &self,
        id: &str,
        config: &serde_json::Value,
        token: &CancellationToken,
    ) -> DriverContext {
        DriverContext::new(id, config.clone(), token.clone(), self.ingest.clone())
    }
}

fn ensure_up(id: &str, state: &StateCell) -> Result<(), EngineError> {
    match state.get() {
        ResourceState::Up => Ok(()),
        other => Err(EngineError::ResourceUnavailable {
            id: id.to_string(),
            state: Some(other),
        }),
    }
}

/// Start a driver; on failure it is stopped again so nothing leaks
async fn start_driver<D: Driver + ?Sized>(
    id: &str,
    driver: &D,
    ctx: &DriverContext,
) -> Result<(), EngineError> {
    if let Err(e) = driver.start(ctx).await {
        error!(resource = %id, error = %format!("{:#}", e), "Driver failed to start");
        ctx.cancel.cancel();
        stop_driver(id, driver).await;
        return Err(EngineError::driver(id, &e));
    }
    Ok(())
}

async fn stop_driver<D: Driver + ?Sized>(id: &str, driver: &D) {
    if let Err(e) = driver.stop().await {
        warn!(resource = %id, error = %format!("{:#}", e), "Driver stop failed");
    }
}

async fn pause<D: Driver + ?Sized>(id: &str, state: &StateCell, driver: &D) -> Result<(), EngineError> {
    state.transition(ResourceState::Pausing)?;

    if let Err(e) = driver.pause().await {
        // Only undo our own Pausing; a concurrent stop keeps its state
        let _ = state.transition(ResourceState::Up);
        return Err(EngineError::driver(id, &e));
    }

    state.transition(ResourceState::Paused)?;
    info!(resource = %id, "Paused");
    Ok(())
}

async fn resume<D: Driver + ?Sized>(id: &str, state: &StateCell, driver: &D) -> Result<(), EngineError> {
    let current = state.get();
    if current != ResourceState::Paused {
        return Err(EngineError::InvalidTransition {
            id: id.to_string(),
            from: current,
            to: ResourceState::Up,
        });
    }

    driver.resume().await.map_err(|e| EngineError::driver(id, &e))?;
    state.transition(ResourceState::Up)?;
    info!(resource = %id, "Resumed");
    Ok(())
}
