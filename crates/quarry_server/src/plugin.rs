//! Compiled-in plugin surface.
//!
//! Plugins are registered on the server builder and loaded before the tick
//! loop starts. Each gets a fresh [`PluginId`]; everything it registers
//! (listeners and scheduled tasks) is keyed by that identity, and unloading
//! evicts all of it deterministically from both the bus and the scheduler.

use std::collections::HashMap;
use std::sync::Arc;

use quarry_events::{EventBus, PluginId};
use quarry_tasks::TaskScheduler;
use tracing::{error, info};

use crate::error::ServerError;
use crate::tick::GameState;

/// Capabilities handed to a plugin at load time. The bus and scheduler
/// handles are cheap clones; plugins may keep them.
pub struct PluginContext {
    pub owner: PluginId,
    pub bus: Arc<EventBus>,
    pub scheduler: TaskScheduler<GameState>,
}

/// A compiled-in plugin.
pub trait Plugin: Send {
    fn name(&self) -> &str;

    /// Register listeners and tasks. An error aborts the load and nothing
    /// the plugin registered is kept.
    fn on_load(&mut self, ctx: &PluginContext) -> Result<(), ServerError>;

    /// Called before the plugin's registrations are evicted.
    fn on_unload(&mut self) {}
}

/// Owner-keyed registry of loaded plugins.
pub struct PluginRegistry {
    bus: Arc<EventBus>,
    scheduler: TaskScheduler<GameState>,
    plugins: HashMap<PluginId, Box<dyn Plugin>>,
    /// Load order, for reverse-order unload at shutdown.
    order: Vec<PluginId>,
}

impl PluginRegistry {
    pub fn new(bus: Arc<EventBus>, scheduler: TaskScheduler<GameState>) -> Self {
        Self {
            bus,
            scheduler,
            plugins: HashMap::new(),
            order: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    /// Loads one plugin, giving it a fresh owner identity.
    pub fn load(&mut self, mut plugin: Box<dyn Plugin>) -> Result<PluginId, ServerError> {
        let owner = PluginId::new();
        let ctx = PluginContext {
            owner,
            bus: Arc::clone(&self.bus),
            scheduler: self.scheduler.clone(),
        };
        if let Err(e) = plugin.on_load(&ctx) {
            error!("Plugin {:?} failed to load: {e}", plugin.name());
            // Roll back anything it managed to register before failing.
            self.bus.unregister_all(owner);
            self.scheduler.cancel_all(owner);
            return Err(e);
        }
        info!("Loaded plugin {:?} as {owner}", plugin.name());
        self.plugins.insert(owner, plugin);
        self.order.push(owner);
        Ok(owner)
    }

    /// Unloads one plugin, evicting its listeners and tasks.
    pub fn unload(&mut self, owner: PluginId) -> bool {
        let Some(mut plugin) = self.plugins.remove(&owner) else {
            return false;
        };
        self.order.retain(|id| *id != owner);
        plugin.on_unload();
        let listeners = self.bus.unregister_all(owner);
        let tasks = self.scheduler.cancel_all(owner);
        info!(
            "Unloaded plugin {:?} ({owner}): {listeners} listeners, {tasks} tasks evicted",
            plugin.name()
        );
        true
    }

    /// Unloads everything, newest first.
    pub fn unload_all(&mut self) {
        for owner in self.order.clone().into_iter().rev() {
            self.unload(owner);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::TickStartEvent;
    use quarry_events::EventPriority;
    use quarry_tasks::TaskControl;

    struct CountingPlugin;

    impl Plugin for CountingPlugin {
        fn name(&self) -> &str {
            "counting"
        }

        fn on_load(&mut self, ctx: &PluginContext) -> Result<(), ServerError> {
            ctx.bus.register::<TickStartEvent, _>(
                ctx.owner,
                "count-ticks",
                EventPriority::Monitor,
                false,
                |_| Ok(()),
            )?;
            ctx.scheduler
                .schedule_repeating(ctx.owner, "heartbeat", 0, 20, |_state: &mut GameState| {
                    TaskControl::Continue
                })
                .map_err(ServerError::from)?;
            Ok(())
        }
    }

    struct FailingPlugin;

    impl Plugin for FailingPlugin {
        fn name(&self) -> &str {
            "failing"
        }

        fn on_load(&mut self, ctx: &PluginContext) -> Result<(), ServerError> {
            // Registers something, then fails; the load must roll it back.
            ctx.scheduler
                .schedule_once(ctx.owner, "orphan", 1, |_: &mut GameState| TaskControl::Continue);
            Err(ServerError::Config("deliberate".to_string()))
        }
    }

    fn registry() -> PluginRegistry {
        let bus = Arc::new(EventBus::new());
        let scheduler = TaskScheduler::new();
        PluginRegistry::new(bus, scheduler)
    }

    #[test]
    fn unload_evicts_listeners_and_tasks() {
        let mut registry = registry();
        let owner = registry.load(Box::new(CountingPlugin)).unwrap();
        assert_eq!(registry.bus.stats().total_listeners, 1);
        assert_eq!(registry.scheduler.stats().pending_tasks, 1);

        assert!(registry.unload(owner));
        assert_eq!(registry.bus.stats().total_listeners, 0);
        assert_eq!(registry.scheduler.stats().pending_tasks, 0);
        assert!(!registry.unload(owner));
    }

    #[test]
    fn failed_load_keeps_nothing() {
        let mut registry = registry();
        assert!(registry.load(Box::new(FailingPlugin)).is_err());
        assert!(registry.is_empty());
        assert_eq!(registry.scheduler.stats().pending_tasks, 0);
    }

    #[test]
    fn unload_all_clears_the_registry() {
        let mut registry = registry();
        registry.load(Box::new(CountingPlugin)).unwrap();
        registry.load(Box::new(CountingPlugin)).unwrap();
        registry.unload_all();
        assert!(registry.is_empty());
        assert_eq!(registry.bus.stats().total_listeners, 0);
    }
}
