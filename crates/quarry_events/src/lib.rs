//! # Quarry Event Bus
//!
//! The extensibility seam of the Quarry server: plugins register listeners
//! against event types with a priority tier, and every state transition the
//! server proposes flows through [`EventBus::dispatch`] before it is applied.
//!
//! ## Dispatch semantics
//!
//! - Listeners run in ascending tier order (`Lowest` → `Monitor`); within a
//!   tier, registration order is preserved.
//! - Each event type's invocation plan is compiled when the listener set
//!   changes, not on the hot dispatch path, and no lock is held while
//!   listener code runs.
//! - A listener that errors or panics is isolated: the failure is logged and
//!   dispatch continues with the next listener.
//! - Cancellable events carry a tri-state flag; listeners registered with
//!   `ignore_cancelled` are skipped once the event is cancelled, everyone
//!   else still observes it. `Monitor`-tier listeners may observe but never
//!   alter the outcome.
//!
//! The bus is an owned instance passed to collaborators explicitly; there
//! is no global. Tests construct as many isolated buses as they like.

pub mod bus;
pub mod event;
pub mod priority;

pub use bus::{DispatchOutcome, EventBus, EventBusStats, ListenerId};
pub use event::{CancelState, Cancellation, Event};
pub use priority::EventPriority;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Identity of a plugin owning listeners and scheduled tasks.
///
/// Used by [`EventBus::unregister_all`] and the task scheduler's
/// `cancel_all` to evict everything an owner registered when it unloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PluginId(pub Uuid);

impl PluginId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for PluginId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for PluginId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors surfaced by the event system.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("listener {name:?} is already registered for {type_name} by {owner}")]
    InvalidRegistration {
        owner: PluginId,
        type_name: &'static str,
        name: String,
    },

    #[error("event {0} is not cancellable")]
    NotCancellable(&'static str),

    #[error("event {0} does not permit clearing a prior cancellation")]
    UncancelNotPermitted(&'static str),

    #[error("handler execution failed: {0}")]
    HandlerExecution(String),
}
