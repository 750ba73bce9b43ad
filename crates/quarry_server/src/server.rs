//! Server assembly and lifecycle.
//!
//! `GameServer` wires the pieces together: it binds the listener, loads
//! plugins, spawns the acceptor on the ambient tokio runtime, and starts
//! the tick loop on its own OS thread. The returned [`ServerHandle`] is the
//! only way to stop a running server.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use quarry_events::EventBus;
use quarry_tasks::TaskScheduler;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::network::{self, inbound_channel};
use crate::plugin::{Plugin, PluginRegistry};
use crate::tick::{GameState, TickLoop};
use crate::watchdog::{spawn_watchdog, Heartbeat};

/// Builder for a Quarry server.
pub struct GameServer {
    config: ServerConfig,
    plugins: Vec<Box<dyn Plugin>>,
}

impl GameServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
        }
    }

    /// Adds a plugin to load before the tick loop starts.
    pub fn with_plugin(mut self, plugin: Box<dyn Plugin>) -> Self {
        self.plugins.push(plugin);
        self
    }

    /// Binds, loads plugins, and starts the tick loop.
    ///
    /// Must be called from within a tokio runtime; the acceptor and all
    /// connection I/O tasks are spawned on it. The tick loop runs on a
    /// dedicated OS thread.
    pub async fn start(self) -> Result<ServerHandle, ServerError> {
        self.config.validate()?;
        let cipher_key = self.config.cipher_key()?;

        let bus = Arc::new(EventBus::new());
        let scheduler: TaskScheduler<GameState> = TaskScheduler::new();
        let mut registry = PluginRegistry::new(Arc::clone(&bus), scheduler.clone());
        for plugin in self.plugins {
            registry.load(plugin)?;
        }

        let listener = TcpListener::bind(&self.config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        info!(
            "Listening on {local_addr} (compression threshold {}, encryption {})",
            self.config.compression_threshold,
            if cipher_key.is_some() { "on" } else { "off" },
        );

        let (inbound_tx, inbound_rx) = inbound_channel();
        let acceptor = tokio::spawn(network::run_acceptor(listener, inbound_tx, cipher_key));

        let heartbeat = Heartbeat::new();
        let _watchdog = spawn_watchdog(
            heartbeat.clone(),
            Duration::from_secs(self.config.watchdog_timeout_secs),
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let tick_thread = {
            let state = GameState::new(self.config, Arc::clone(&bus), scheduler.clone());
            let tick_loop = TickLoop::new(state, inbound_rx, Arc::clone(&shutdown), heartbeat);
            std::thread::Builder::new()
                .name("quarry-tick".to_string())
                .spawn(move || {
                    tick_loop.run();
                    registry.unload_all();
                })
                .map_err(ServerError::Io)?
        };

        Ok(ServerHandle {
            local_addr,
            shutdown,
            tick_thread: Some(tick_thread),
            acceptor,
            bus,
            scheduler,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    local_addr: std::net::SocketAddr,
    shutdown: Arc<AtomicBool>,
    tick_thread: Option<std::thread::JoinHandle<()>>,
    acceptor: tokio::task::JoinHandle<()>,
    bus: Arc<EventBus>,
    scheduler: TaskScheduler<GameState>,
}

impl ServerHandle {
    /// The address the listener actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::net::SocketAddr {
        self.local_addr
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn scheduler(&self) -> &TaskScheduler<GameState> {
        &self.scheduler
    }

    /// Requests shutdown and waits for the tick loop to drain: the current
    /// tick finishes, every connection is disconnected with a shutdown
    /// reason, and all scheduled tasks are cancelled.
    pub async fn stop(mut self) -> Result<(), ServerError> {
        info!("Shutdown requested");
        self.acceptor.abort();
        self.shutdown.store(true, Ordering::Relaxed);
        let Some(tick_thread) = self.tick_thread.take() else {
            return Err(ServerError::NotRunning);
        };
        tokio::task::spawn_blocking(move || tick_thread.join())
            .await
            .ok();
        info!("Server stopped");
        Ok(())
    }
}
