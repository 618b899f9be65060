use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use serde::Serialize;

/// Diagnostic notification.
///
/// Structured text only: these exist for manual debugging and never drive
/// behaviour.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    /// Monotonic per-bus sequence number, starting at 0.
    pub seq: u64,
    pub kind: &'static str,
    pub message: String,
}

pub type Listener = Rc<dyn Fn(&Event)>;

const DEFAULT_CAPACITY: usize = 256;

struct BusState {
    next_seq: u64,
    capacity: usize,
    events: VecDeque<Event>,
    listeners: Vec<Listener>,
}

/// Bounded event log with optional listeners.
///
/// Cloning yields another handle to the same bus. Emitting never fails;
/// listeners run after the event is recorded, with no borrow held, so they may
/// emit in turn.
#[derive(Clone)]
pub struct EventBus {
    state: Rc<RefCell<BusState>>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventBus")
            .field("events", &state.events.len())
            .field("listeners", &state.listeners.len())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps at most `capacity` events; older ones are dropped first.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            state: Rc::new(RefCell::new(BusState {
                next_seq: 0,
                capacity: capacity.max(1),
                events: VecDeque::new(),
                listeners: Vec::new(),
            })),
        }
    }

    pub fn listen(&self, listener: impl Fn(&Event) + 'static) {
        self.state.borrow_mut().listeners.push(Rc::new(listener));
    }

    pub fn emit(&self, kind: &'static str, message: impl Into<String>) -> u64 {
        let (event, listeners) = {
            let mut state = self.state.borrow_mut();
            let event = Event {
                seq: state.next_seq,
                kind,
                message: message.into(),
            };
            state.next_seq += 1;
            if state.events.len() == state.capacity {
                state.events.pop_front();
            }
            state.events.push_back(event.clone());
            (event, state.listeners.clone())
        };
        for listener in listeners {
            listener(&event);
        }
        event.seq
    }

    pub fn events(&self) -> Vec<Event> {
        self.state.borrow().events.iter().cloned().collect()
    }

    pub fn events_of(&self, kind: &str) -> Vec<Event> {
        self.state
            .borrow()
            .events
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn last(&self) -> Option<Event> {
        self.state.borrow().events.back().cloned()
    }

    pub fn drain(&self) -> Vec<Event> {
        self.state.borrow_mut().events.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;
    use pretty_assertions::assert_eq;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn records_events_in_sequence() {
        let bus = EventBus::new();
        assert_eq!(bus.emit("renderer.active", "canvas"), 0);
        assert_eq!(bus.emit("renderer.active", "webgl"), 1);
        let msgs: Vec<_> = bus.events().into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, vec!["canvas", "webgl"]);
    }

    #[test]
    fn drain_clears_events_but_keeps_numbering() {
        let bus = EventBus::new();
        bus.emit("k", "m");
        assert_eq!(bus.drain().len(), 1);
        assert!(bus.events().is_empty());
        assert_eq!(bus.emit("k", "n"), 1);
    }

    #[test]
    fn capacity_drops_oldest() {
        let bus = EventBus::with_capacity(2);
        bus.emit("k", "a");
        bus.emit("k", "b");
        bus.emit("k", "c");
        let msgs: Vec<_> = bus.events().into_iter().map(|e| e.message).collect();
        assert_eq!(msgs, vec!["b", "c"]);
    }

    #[test]
    fn listeners_see_events_and_may_emit() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let echo = bus.clone();
        bus.listen(move |e| {
            sink.borrow_mut().push(e.kind);
            if e.kind == "ping" {
                echo.emit("pong", "");
            }
        });
        bus.emit("ping", "");
        assert_eq!(*seen.borrow(), vec!["ping", "pong"]);
        assert_eq!(bus.events_of("pong").len(), 1);
        assert_eq!(bus.last().map(|e| e.kind), Some("pong"));
    }
}
