//! # Quarry Server Runtime
//!
//! The runtime core of the Quarry sandbox game server: a single-threaded
//! tick loop owning all world state, an event bus every player-driven
//! mutation flows through, a tick-anchored task scheduler, and an async
//! transport edge feeding it all through queues.
//!
//! Start one with [`GameServer`]:
//!
//! ```no_run
//! use quarry_server::{GameServer, ServerConfig};
//!
//! # async fn run() -> Result<(), quarry_server::ServerError> {
//! let handle = GameServer::new(ServerConfig::default()).start().await?;
//! // ...
//! handle.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod events;
pub mod network;
pub mod plugin;
pub mod server;
pub mod tick;
pub mod types;
pub mod watchdog;
pub mod world;

pub use config::ServerConfig;
pub use connection::{Connection, ConnectionId, ConnectionManager, DisconnectReason};
pub use error::ServerError;
pub use plugin::{Plugin, PluginContext, PluginRegistry};
pub use server::{GameServer, ServerHandle};
pub use tick::{GameState, TickLoop};
pub use types::{BlockPos, EntityId, PlayerId, Position};
pub use world::World;
