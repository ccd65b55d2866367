//! Event Bus: typed pub/sub for lifecycle notifications (turn status, stream deltas, tool
//! dispatch, compaction), emitted synchronously in registration order.
//!
//! Generalizes the teacher SDK's `hooks::Hooks` container — which holds exactly three fixed
//! handler slots (`pre_tool_use`, `post_tool_use`, `user_prompt_submit`) with first-non-None-wins
//! semantics — into an open map of event kind to an ordered list of listeners, all of which run
//! on every emission (observational, not decision-making: nothing here can block or veto a
//! turn). A listener that errors is logged and skipped; one bad listener can't take down the
//! loop for the rest.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

/// The event kinds this core emits. New kinds are added here as the Agent Loop grows lifecycle
/// notifications; each variant carries its own payload type via [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Status,
    ReasoningDelta,
    TextDelta,
    ToolCallCreated,
    ToolCallCompleted,
    Compaction,
    Aborted,
}

/// Payload carried by an emitted event. One variant per [`EventKind`]; `listener`s match on
/// this rather than receiving kind and payload separately.
#[derive(Debug, Clone)]
pub enum Event {
    Status { session_id: String, status: String },
    ReasoningDelta { session_id: String, delta: String },
    TextDelta { session_id: String, delta: String },
    ToolCallCreated { session_id: String, call_id: String, name: String },
    ToolCallCompleted { session_id: String, call_id: String, success: bool },
    Compaction { session_id: String, compaction_count: u32 },
    Aborted { session_id: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Status { .. } => EventKind::Status,
            Event::ReasoningDelta { .. } => EventKind::ReasoningDelta,
            Event::TextDelta { .. } => EventKind::TextDelta,
            Event::ToolCallCreated { .. } => EventKind::ToolCallCreated,
            Event::ToolCallCompleted { .. } => EventKind::ToolCallCompleted,
            Event::Compaction { .. } => EventKind::Compaction,
            Event::Aborted { .. } => EventKind::Aborted,
        }
    }
}

type Listener = Arc<dyn Fn(&Event) + Send + Sync>;

/// A handle returned from [`EventBus::on`], identifying one registration so it can be removed
/// individually. Closures have no stable identity in Rust, so the bus assigns one at
/// registration time rather than keying on the function value itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Registration {
    id: ListenerId,
    listener: Listener,
}

/// Synchronous, registration-ordered event dispatcher.
pub struct EventBus {
    listeners: Mutex<HashMap<EventKind, Vec<Registration>>>,
    next_id: Mutex<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(HashMap::new()),
            next_id: Mutex::new(0),
        }
    }

    /// Register `listener` for `kind`. Returns an id usable with [`EventBus::remove`].
    pub fn on(&self, kind: EventKind, listener: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
        let id = {
            let mut next = self.next_id.lock().unwrap();
            let id = ListenerId(*next);
            *next += 1;
            id
        };
        self.listeners
            .lock()
            .unwrap()
            .entry(kind)
            .or_default()
            .push(Registration { id, listener: Arc::new(listener) });
        id
    }

    /// Remove one listener by the id returned from [`EventBus::on`].
    pub fn remove(&self, id: ListenerId) {
        let mut listeners = self.listeners.lock().unwrap();
        for regs in listeners.values_mut() {
            regs.retain(|r| r.id != id);
        }
    }

    /// Remove every listener for `kind`, or every listener entirely if `kind` is `None`.
    pub fn remove_all_listeners(&self, kind: Option<EventKind>) {
        let mut listeners = self.listeners.lock().unwrap();
        match kind {
            Some(k) => {
                listeners.remove(&k);
            }
            None => listeners.clear(),
        }
    }

    /// Emit `event` synchronously to every listener registered for its kind, in registration
    /// order. A listener that panics is caught and logged; it does not stop later listeners or
    /// propagate to the caller.
    pub fn emit(&self, event: Event) {
        let kind = event.kind();
        let snapshot: Vec<Listener> = {
            let listeners = self.listeners.lock().unwrap();
            listeners
                .get(&kind)
                .map(|regs| regs.iter().map(|r| r.listener.clone()).collect())
                .unwrap_or_default()
        };
        for listener in snapshot {
            let event_ref = &event;
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                listener(event_ref);
            }));
            if result.is_err() {
                log::error!("event bus listener panicked handling {kind:?}");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock().unwrap();
        f.debug_struct("EventBus")
            .field("kinds_registered", &listeners.len())
            .finish()
    }
}
