//! Event trait and cancellation model.
//!
//! Events are typed records describing something that happened or is about
//! to happen. They live exactly as long as the dispatch call that created
//! them and are immutable apart from their cancellation flag.
//!
//! Cancellation is an explicit tri-state rather than a boolean so that a
//! listener can distinguish "cannot be vetoed" from "can be vetoed and has
//! not been": see [`CancelState`]. Whether a later listener may *clear* a
//! prior listener's cancellation is a per-event-type policy, never an
//! implicit default.

use std::any::Any;

use crate::EventError;

/// Tri-state cancellation flag of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelState {
    /// This event type cannot be vetoed.
    NotCancellable,
    /// Vetoable, and no listener has vetoed it.
    Cancellable,
    /// Vetoable and currently vetoed.
    Cancelled,
}

/// A dispatchable event.
///
/// Implementations embed a [`Cancellation`] when they are vetoable and
/// delegate the cancellation methods to it; non-cancellable events keep the
/// defaults. The `as_any` pair powers the typed dispatch tables; listeners
/// are registered against the concrete type and downcast exactly once per
/// invocation.
pub trait Event: Any + Send {
    /// Stable, human-readable tag for logs and error messages.
    fn type_name(&self) -> &'static str;

    fn cancel_state(&self) -> CancelState {
        CancelState::NotCancellable
    }

    /// Sets or clears the cancelled flag, honoring the type's policy.
    fn try_set_cancelled(&mut self, _cancelled: bool) -> Result<(), EventError> {
        Err(EventError::NotCancellable(self.type_name()))
    }

    /// Unconditionally restores the cancelled flag, bypassing policy.
    ///
    /// Only the dispatcher calls this, to undo mutations made by
    /// monitor-tier listeners. Cancellable events must implement it.
    fn restore_cancelled(&mut self, _cancelled: bool) {}

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl dyn Event {
    /// Whether the event is currently vetoed.
    pub fn is_cancelled(&self) -> bool {
        self.cancel_state() == CancelState::Cancelled
    }
}

/// Embeddable cancellation flag with a per-type un-cancel policy.
#[derive(Debug, Clone)]
pub struct Cancellation {
    cancelled: bool,
    allow_uncancel: bool,
}

impl Cancellation {
    /// Cancellable; once cancelled, the flag cannot be cleared.
    pub fn new() -> Self {
        Self {
            cancelled: false,
            allow_uncancel: false,
        }
    }

    /// Cancellable; later listeners may clear a prior cancellation.
    pub fn allowing_uncancel() -> Self {
        Self {
            cancelled: false,
            allow_uncancel: true,
        }
    }

    pub fn state(&self) -> CancelState {
        if self.cancelled {
            CancelState::Cancelled
        } else {
            CancelState::Cancellable
        }
    }

    /// Applies a listener's cancellation request under the type policy.
    pub fn set(&mut self, cancelled: bool, type_name: &'static str) -> Result<(), EventError> {
        if !cancelled && self.cancelled && !self.allow_uncancel {
            return Err(EventError::UncancelNotPermitted(type_name));
        }
        self.cancelled = cancelled;
        Ok(())
    }

    /// Restores the flag unconditionally (dispatcher use only).
    pub fn restore(&mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl Default for Cancellation {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_is_one_way_unless_type_permits() {
        let mut strict = Cancellation::new();
        strict.set(true, "strict").unwrap();
        assert_eq!(strict.state(), CancelState::Cancelled);
        assert!(matches!(
            strict.set(false, "strict"),
            Err(EventError::UncancelNotPermitted("strict"))
        ));

        let mut lenient = Cancellation::allowing_uncancel();
        lenient.set(true, "lenient").unwrap();
        lenient.set(false, "lenient").unwrap();
        assert_eq!(lenient.state(), CancelState::Cancellable);
    }

    #[test]
    fn re_cancel_is_always_allowed() {
        let mut c = Cancellation::new();
        c.set(true, "ev").unwrap();
        c.set(true, "ev").unwrap();
        assert_eq!(c.state(), CancelState::Cancelled);
    }
}
