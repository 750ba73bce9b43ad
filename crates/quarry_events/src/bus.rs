//! Event bus core: registration, dispatch tables, and ordered dispatch.

use std::any::TypeId;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::{debug, error, warn};

use crate::event::{CancelState, Event};
use crate::priority::EventPriority;
use crate::{EventError, PluginId};

type ListenerFn = Box<dyn Fn(&mut dyn Event) -> Result<(), EventError> + Send + Sync>;

/// Handle returned by [`EventBus::register`]; usable for targeted removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// One listener registration.
struct Listener {
    id: ListenerId,
    owner: PluginId,
    name: String,
    type_name: &'static str,
    priority: EventPriority,
    ignore_cancelled: bool,
    /// Registration sequence; ties within a priority tier preserve it.
    seq: u64,
    callback: ListenerFn,
}

/// Per-event-type registration set plus its compiled invocation plan.
///
/// The plan is the priority-then-registration ordering resolved once per
/// change to the listener set, so dispatch never sorts or locks around
/// listener code.
#[derive(Default)]
struct DispatchTable {
    listeners: Vec<Arc<Listener>>,
    plan: Arc<[Arc<Listener>]>,
}

impl DispatchTable {
    fn rebuild(&mut self) {
        let mut plan = self.listeners.clone();
        plan.sort_by_key(|l| (l.priority, l.seq));
        self.plan = plan.into();
    }
}

/// Result summary of one dispatch.
#[derive(Debug, Default, Clone, Copy)]
pub struct DispatchOutcome {
    /// Whether the event ended the dispatch cancelled.
    pub cancelled: bool,
    /// Listeners actually invoked (skipped ones excluded).
    pub invoked: usize,
    /// Listeners that errored or panicked.
    pub failures: usize,
}

/// Counters for monitoring the bus.
#[derive(Debug, Default, Clone, Copy)]
pub struct EventBusStats {
    pub total_listeners: usize,
    pub events_dispatched: u64,
    pub listener_failures: u64,
}

/// The event bus. See the crate docs for dispatch semantics.
pub struct EventBus {
    tables: RwLock<HashMap<TypeId, DispatchTable>>,
    next_seq: AtomicU64,
    events_dispatched: AtomicU64,
    listener_failures: AtomicU64,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
            next_seq: AtomicU64::new(0),
            events_dispatched: AtomicU64::new(0),
            listener_failures: AtomicU64::new(0),
        }
    }

    /// Registers `handler` for events of type `E`.
    ///
    /// `name` identifies the registration within its owner; registering the
    /// same (owner, type, name) twice is [`EventError::InvalidRegistration`].
    /// Within a priority tier, listeners run in registration order.
    pub fn register<E, F>(
        &self,
        owner: PluginId,
        name: &str,
        priority: EventPriority,
        ignore_cancelled: bool,
        handler: F,
    ) -> Result<ListenerId, EventError>
    where
        E: Event,
        F: Fn(&mut E) -> Result<(), EventError> + Send + Sync + 'static,
    {
        let type_name = std::any::type_name::<E>();
        let callback: ListenerFn = Box::new(move |event: &mut dyn Event| {
            match event.as_any_mut().downcast_mut::<E>() {
                Some(event) => handler(event),
                None => Err(EventError::HandlerExecution(format!(
                    "dispatch table delivered a mismatched event to a {type_name} listener"
                ))),
            }
        });

        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let table = tables.entry(TypeId::of::<E>()).or_default();
        if table
            .listeners
            .iter()
            .any(|l| l.owner == owner && l.name == name)
        {
            return Err(EventError::InvalidRegistration {
                owner,
                type_name,
                name: name.to_string(),
            });
        }

        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let id = ListenerId(seq);
        table.listeners.push(Arc::new(Listener {
            id,
            owner,
            name: name.to_string(),
            type_name,
            priority,
            ignore_cancelled,
            seq,
            callback,
        }));
        table.rebuild();

        debug!(
            "Registered {priority} listener {name:?} for {type_name} (owner {owner})"
        );
        Ok(id)
    }

    /// Removes a single registration. Returns whether it existed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for table in tables.values_mut() {
            let before = table.listeners.len();
            table.listeners.retain(|l| l.id != id);
            if table.listeners.len() != before {
                table.rebuild();
                return true;
            }
        }
        false
    }

    /// Evicts every listener belonging to `owner`; used on plugin unload.
    ///
    /// Safe to call while a dispatch for another owner is in flight: the
    /// in-flight dispatch keeps running against the plan it snapshotted,
    /// and every later dispatch sees the shrunken table.
    pub fn unregister_all(&self, owner: PluginId) -> usize {
        let mut tables = self
            .tables
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let mut removed = 0;
        for table in tables.values_mut() {
            let before = table.listeners.len();
            table.listeners.retain(|l| l.owner != owner);
            let delta = before - table.listeners.len();
            if delta > 0 {
                table.rebuild();
                removed += delta;
            }
        }
        if removed > 0 {
            debug!("Evicted {removed} listeners owned by {owner}");
        }
        removed
    }

    /// Dispatches `event` to every listener registered for its type.
    ///
    /// Runs tiers `Lowest` through `Monitor`; skips `ignore_cancelled`
    /// listeners once the event is cancelled; isolates listener errors and
    /// panics; and discards any cancellation change a monitor-tier listener
    /// attempts.
    pub fn dispatch<E: Event>(&self, event: &mut E) -> DispatchOutcome {
        let plan = {
            let tables = self
                .tables
                .read()
                .unwrap_or_else(PoisonError::into_inner);
            tables.get(&TypeId::of::<E>()).map(|t| Arc::clone(&t.plan))
        };
        self.events_dispatched.fetch_add(1, Ordering::Relaxed);

        let mut outcome = DispatchOutcome::default();
        let Some(plan) = plan else {
            outcome.cancelled = (event as &mut dyn Event).is_cancelled();
            return outcome;
        };

        let mut monitor_snapshot: Option<CancelState> = None;
        for listener in plan.iter() {
            let ev: &mut dyn Event = event;
            if listener.priority == EventPriority::Monitor && monitor_snapshot.is_none() {
                monitor_snapshot = Some(ev.cancel_state());
            }
            if listener.ignore_cancelled && ev.is_cancelled() {
                continue;
            }

            outcome.invoked += 1;
            let result = catch_unwind(AssertUnwindSafe(|| (listener.callback)(ev)));
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    outcome.failures += 1;
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Listener {:?} (owner {}) failed during {}: {e}",
                        listener.name, listener.owner, listener.type_name
                    );
                }
                Err(_) => {
                    outcome.failures += 1;
                    self.listener_failures.fetch_add(1, Ordering::Relaxed);
                    error!(
                        "Listener {:?} (owner {}) panicked during {}; continuing dispatch",
                        listener.name, listener.owner, listener.type_name
                    );
                }
            }

            // Monitor listeners observe the final state; they never decide it.
            if listener.priority == EventPriority::Monitor {
                let snapshot = monitor_snapshot.unwrap_or(CancelState::NotCancellable);
                let ev: &mut dyn Event = event;
                if ev.cancel_state() != snapshot {
                    warn!(
                        "Monitor listener {:?} (owner {}) mutated cancellation of {}; reverting",
                        listener.name, listener.owner, listener.type_name
                    );
                    ev.restore_cancelled(snapshot == CancelState::Cancelled);
                }
            }
        }

        outcome.cancelled = (event as &mut dyn Event).is_cancelled();
        outcome
    }

    /// Snapshot of the bus counters.
    pub fn stats(&self) -> EventBusStats {
        let tables = self
            .tables
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        EventBusStats {
            total_listeners: tables.values().map(|t| t.listeners.len()).sum(),
            events_dispatched: self.events_dispatched.load(Ordering::Relaxed),
            listener_failures: self.listener_failures.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Cancellation;
    use std::any::Any;
    use std::sync::Mutex;

    #[derive(Debug)]
    struct PingEvent {
        value: u32,
    }

    impl Event for PingEvent {
        fn type_name(&self) -> &'static str {
            "ping"
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[derive(Debug)]
    struct VetoableEvent {
        cancel: Cancellation,
    }

    impl VetoableEvent {
        fn new() -> Self {
            Self {
                cancel: Cancellation::new(),
            }
        }
        fn lenient() -> Self {
            Self {
                cancel: Cancellation::allowing_uncancel(),
            }
        }
    }

    impl Event for VetoableEvent {
        fn type_name(&self) -> &'static str {
            "vetoable"
        }
        fn cancel_state(&self) -> CancelState {
            self.cancel.state()
        }
        fn try_set_cancelled(&mut self, cancelled: bool) -> Result<(), EventError> {
            self.cancel.set(cancelled, "vetoable")
        }
        fn restore_cancelled(&mut self, cancelled: bool) {
            self.cancel.restore(cancelled)
        }
        fn as_any(&self) -> &dyn Any {
            self
        }
        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn order_recorder(
        bus: &EventBus,
        owner: PluginId,
        name: &str,
        priority: EventPriority,
        log: Arc<Mutex<Vec<String>>>,
    ) {
        let tag = name.to_string();
        bus.register::<PingEvent, _>(owner, name, priority, false, move |_| {
            log.lock().unwrap().push(tag.clone());
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn priority_tiers_execute_low_to_high() {
        let bus = EventBus::new();
        let owner = PluginId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        // Registered deliberately out of tier order.
        order_recorder(&bus, owner, "high", EventPriority::High, log.clone());
        order_recorder(&bus, owner, "monitor", EventPriority::Monitor, log.clone());
        order_recorder(&bus, owner, "lowest", EventPriority::Lowest, log.clone());
        order_recorder(&bus, owner, "normal-a", EventPriority::Normal, log.clone());
        order_recorder(&bus, owner, "normal-b", EventPriority::Normal, log.clone());
        order_recorder(&bus, owner, "low", EventPriority::Low, log.clone());

        let outcome = bus.dispatch(&mut PingEvent { value: 1 });
        assert_eq!(outcome.invoked, 6);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["lowest", "low", "normal-a", "normal-b", "high", "monitor"]
        );
    }

    #[test]
    fn failing_listener_does_not_stop_dispatch() {
        let bus = EventBus::new();
        let owner = PluginId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        order_recorder(&bus, owner, "first", EventPriority::Lowest, log.clone());
        bus.register::<PingEvent, _>(owner, "broken", EventPriority::Low, false, |_| {
            Err(EventError::HandlerExecution("deliberate".to_string()))
        })
        .unwrap();
        bus.register::<PingEvent, _>(owner, "panics", EventPriority::Normal, false, |_| {
            panic!("deliberate panic")
        })
        .unwrap();
        order_recorder(&bus, owner, "last", EventPriority::Highest, log.clone());

        let outcome = bus.dispatch(&mut PingEvent { value: 1 });
        assert_eq!(outcome.failures, 2);
        assert_eq!(*log.lock().unwrap(), vec!["first", "last"]);
        assert_eq!(bus.stats().listener_failures, 2);
    }

    #[test]
    fn ignore_cancelled_listeners_are_skipped_after_veto() {
        let bus = EventBus::new();
        let owner = PluginId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        bus.register::<VetoableEvent, _>(owner, "veto", EventPriority::Low, false, |ev| {
            ev.try_set_cancelled(true)
        })
        .unwrap();
        {
            let log = log.clone();
            bus.register::<VetoableEvent, _>(owner, "skipped", EventPriority::Normal, true, move |_| {
                log.lock().unwrap().push("skipped".to_string());
                Ok(())
            })
            .unwrap();
        }
        {
            let log = log.clone();
            bus.register::<VetoableEvent, _>(owner, "still-runs", EventPriority::High, false, move |_| {
                log.lock().unwrap().push("still-runs".to_string());
                Ok(())
            })
            .unwrap();
        }

        let mut event = VetoableEvent::new();
        let outcome = bus.dispatch(&mut event);
        assert!(outcome.cancelled);
        assert_eq!(*log.lock().unwrap(), vec!["still-runs"]);
    }

    #[test]
    fn monitor_tier_cannot_alter_the_outcome() {
        let bus = EventBus::new();
        let owner = PluginId::new();

        bus.register::<VetoableEvent, _>(owner, "rogue-monitor", EventPriority::Monitor, false, |ev| {
            ev.try_set_cancelled(true)
        })
        .unwrap();

        let mut event = VetoableEvent::new();
        let outcome = bus.dispatch(&mut event);
        assert!(!outcome.cancelled, "monitor cancellation must be reverted");
    }

    #[test]
    fn uncancel_honors_type_policy() {
        let bus = EventBus::new();
        let owner = PluginId::new();

        bus.register::<VetoableEvent, _>(owner, "cancel", EventPriority::Low, false, |ev| {
            ev.try_set_cancelled(true)
        })
        .unwrap();
        bus.register::<VetoableEvent, _>(owner, "uncancel", EventPriority::High, false, |ev| {
            ev.try_set_cancelled(false)
        })
        .unwrap();

        // Strict type: the un-cancel attempt is an error, the veto stands.
        let mut strict = VetoableEvent::new();
        let outcome = bus.dispatch(&mut strict);
        assert!(outcome.cancelled);
        assert_eq!(outcome.failures, 1);

        // Lenient type: the High listener gets the last word.
        let mut lenient = VetoableEvent::lenient();
        let outcome = bus.dispatch(&mut lenient);
        assert!(!outcome.cancelled);
        assert_eq!(outcome.failures, 0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let bus = EventBus::new();
        let owner = PluginId::new();
        bus.register::<PingEvent, _>(owner, "dup", EventPriority::Normal, false, |_| Ok(()))
            .unwrap();
        let err =
            bus.register::<PingEvent, _>(owner, "dup", EventPriority::High, false, |_| Ok(()));
        assert!(matches!(err, Err(EventError::InvalidRegistration { .. })));

        // A different owner may reuse the name.
        bus.register::<PingEvent, _>(PluginId::new(), "dup", EventPriority::Normal, false, |_| {
            Ok(())
        })
        .unwrap();
    }

    #[test]
    fn unregister_all_evicts_one_owner_only() {
        let bus = EventBus::new();
        let evicted = PluginId::new();
        let survivor = PluginId::new();
        let log = Arc::new(Mutex::new(Vec::new()));

        order_recorder(&bus, evicted, "gone-a", EventPriority::Low, log.clone());
        order_recorder(&bus, evicted, "gone-b", EventPriority::High, log.clone());
        order_recorder(&bus, survivor, "stays", EventPriority::Normal, log.clone());

        assert_eq!(bus.unregister_all(evicted), 2);
        bus.dispatch(&mut PingEvent { value: 1 });
        assert_eq!(*log.lock().unwrap(), vec!["stays"]);
        assert_eq!(bus.stats().total_listeners, 1);
    }

    #[test]
    fn dispatch_with_no_listeners_is_a_no_op() {
        let bus = EventBus::new();
        let outcome = bus.dispatch(&mut PingEvent { value: 9 });
        assert_eq!(outcome.invoked, 0);
        assert!(!outcome.cancelled);
    }

    #[test]
    fn listener_sees_typed_event_payload() {
        let bus = EventBus::new();
        let seen = Arc::new(Mutex::new(0u32));
        {
            let seen = seen.clone();
            bus.register::<PingEvent, _>(
                PluginId::new(),
                "reader",
                EventPriority::Normal,
                false,
                move |ev| {
                    *seen.lock().unwrap() = ev.value;
                    Ok(())
                },
            )
            .unwrap();
        }
        bus.dispatch(&mut PingEvent { value: 77 });
        assert_eq!(*seen.lock().unwrap(), 77);
    }
}
