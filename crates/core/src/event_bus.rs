//! Path-prefix event dispatch.
//!
//! Every tree mutation is announced to registered listeners whose path is
//! in a prefix relation with the mutation's path (see
//! [`crate::path::may_impact`]) and whose registered [`EventFilter`]
//! matches the event's [`EventKind`] — a listener on `users.1` hears about
//! a write to `users.1.name`, and a listener on `users.1.name` hears about
//! a write that replaces the whole `users.1` document, but a listener
//! filtered to `EventKind::Remove` does not hear a `Set`. Listeners run
//! synchronously, in registration order. A listener that itself performs a
//! mutation does not see that mutation's event interleaved into the
//! dispatch it is currently part of — it is queued and delivered once the
//! current dispatch finishes, so handlers never observe partial delivery
//! of the event that triggered them.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::error;

use crate::path::{may_impact, PathBuf};
use crate::value::Value;

/// The kind of mutation an [`Event`] reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Set,
    Del,
    Increment,
    Insert,
    Remove,
    Move,
    Create,
    Delete,
    Load,
    Unload,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EventKind::Set => "set",
            EventKind::Del => "del",
            EventKind::Increment => "increment",
            EventKind::Insert => "insert",
            EventKind::Remove => "remove",
            EventKind::Move => "move",
            EventKind::Create => "create",
            EventKind::Delete => "delete",
            EventKind::Load => "load",
            EventKind::Unload => "unload",
        };
        write!(f, "{s}")
    }
}

/// What a listener wants to hear about: one specific [`EventKind`], or
/// `All` of them (`spec.md` §6's `change|insert|remove|move|load|unload|
/// all`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
    Kind(EventKind),
    All,
}

impl EventFilter {
    fn matches(&self, kind: EventKind) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::Kind(k) => *k == kind,
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        EventFilter::Kind(kind)
    }
}

/// A single mutation notification.
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    pub path: PathBuf,
    pub value: Option<Value>,
    pub previous: Option<Value>,
    /// Carries the emitting handle's `pass` flag (`spec.md` §4.4 step 6,
    /// §6) so a listener can recognize and skip an echo of its own write
    /// without needing to compare values.
    pub passed: bool,
    /// True if the emitting handle carried the `silent` flag. A `silent`
    /// event still reaches [`EventBus::emit`], but [`EventBus::dispatch_now`]
    /// only invokes listeners whose own `event_context` matches
    /// [`Event::event_context`] (`spec.md` §4.5).
    pub silent: bool,
    /// The emitting handle's `eventContext` tag, if any (`spec.md` §3,
    /// §4.3, §4.5).
    pub event_context: Option<String>,
    /// True if this event was raised as a side effect of applying a change
    /// that originated elsewhere (a remote op, a load completing) rather
    /// than a local mutation on this process.
    pub remote: bool,
}

/// Reports a listener callback that returned an error, so the bus's error
/// sink can decide what to do (log it, count it, panic in tests).
#[derive(Debug, Clone)]
pub struct ListenerError {
    pub listener_id: u64,
    pub kind: EventKind,
    pub path: PathBuf,
    pub message: String,
}

impl fmt::Display for ListenerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "listener {} failed on {} event at '{}': {}",
            self.listener_id, self.kind, self.path, self.message
        )
    }
}

type Callback = Arc<dyn Fn(&Event) -> Result<(), String> + Send + Sync>;
type ErrorSink = Box<dyn Fn(&ListenerError) + Send + Sync>;

fn context_matches(listener: &Option<String>, emitter: &Option<String>) -> bool {
    matches!((listener, emitter), (Some(a), Some(b)) if a == b)
}

struct Listener {
    id: u64,
    path: PathBuf,
    filter: EventFilter,
    event_context: Option<String>,
    callback: Callback,
}

struct State {
    listeners: Vec<Listener>,
    next_id: u64,
    emitting: bool,
    pending: VecDeque<Event>,
}

/// The registration-ordered, path-prefix listener index shared by a
/// [`crate::model::Model`].
pub struct EventBus {
    state: Mutex<State>,
    error_sink: Mutex<ErrorSink>,
}

/// A registration handle returned by [`EventBus::listen`]; pass it to
/// [`EventBus::unlisten`] to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                listeners: Vec::new(),
                next_id: 0,
                emitting: false,
                pending: VecDeque::new(),
            }),
            error_sink: Mutex::new(Box::new(|err: &ListenerError| error!("{err}"))),
        }
    }

    /// Replaces the sink invoked when a listener callback returns an
    /// error. Defaults to logging via `tracing::error!`.
    pub fn set_error_sink(&self, sink: impl Fn(&ListenerError) + Send + Sync + 'static) {
        *self.error_sink.lock().unwrap() = Box::new(sink);
    }

    /// Registers a listener at `path` for events matching `filter`. It
    /// runs whenever an emitted event's path is in a prefix relation with
    /// `path` and its kind matches `filter`.
    pub fn listen(
        &self,
        path: PathBuf,
        filter: impl Into<EventFilter>,
        callback: impl Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    ) -> ListenerId {
        self.listen_in_context(path, filter, None, callback)
    }

    /// Like [`EventBus::listen`], but also tags the listener with an
    /// `eventContext`. A `silent` event from an emitter whose own
    /// `eventContext` matches this one still reaches the listener
    /// (`spec.md` §4.5); every other listener skips it.
    pub fn listen_in_context(
        &self,
        path: PathBuf,
        filter: impl Into<EventFilter>,
        event_context: Option<String>,
        callback: impl Fn(&Event) -> Result<(), String> + Send + Sync + 'static,
    ) -> ListenerId {
        let mut state = self.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        state.listeners.push(Listener {
            id,
            path,
            filter: filter.into(),
            event_context,
            callback: Arc::new(callback),
        });
        ListenerId(id)
    }

    /// Removes a previously registered listener. No-op if already removed.
    pub fn unlisten(&self, id: ListenerId) {
        let mut state = self.state.lock().unwrap();
        state.listeners.retain(|l| l.id != id.0);
    }

    pub fn listener_count(&self) -> usize {
        self.state.lock().unwrap().listeners.len()
    }

    /// Emits `event` to every matching listener, in registration order.
    ///
    /// If called re-entrantly from within a listener callback, the event
    /// is queued and dispatched after the current top-level emission
    /// finishes, preserving the invariant that a dispatch in progress runs
    /// to completion against a fixed listener snapshot before any
    /// listener-triggered event is delivered.
    pub fn emit(&self, event: Event) {
        {
            let mut state = self.state.lock().unwrap();
            if state.emitting {
                state.pending.push_back(event);
                return;
            }
            state.emitting = true;
        }

        let mut current = event;
        loop {
            self.dispatch_now(&current);
            let mut state = self.state.lock().unwrap();
            match state.pending.pop_front() {
                Some(next) => {
                    drop(state);
                    current = next;
                }
                None => {
                    state.emitting = false;
                    break;
                }
            }
        }
    }

    fn dispatch_now(&self, event: &Event) {
        let matching: Vec<Listener> = {
            let state = self.state.lock().unwrap();
            state
                .listeners
                .iter()
                .filter(|l| may_impact(&l.path, &event.path))
                .filter(|l| l.filter.matches(event.kind))
                .filter(|l| !event.silent || context_matches(&l.event_context, &event.event_context))
                .map(|l| Listener {
                    id: l.id,
                    path: l.path.clone(),
                    filter: l.filter,
                    event_context: l.event_context.clone(),
                    callback: l.callback.clone(),
                })
                .collect()
        };
        for listener in matching {
            if let Err(message) = (listener.callback)(event) {
                let err = ListenerError {
                    listener_id: listener.id,
                    kind: event.kind,
                    path: event.path.clone(),
                    message,
                };
                (self.error_sink.lock().unwrap())(&err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn set_event(path: PathBuf) -> Event {
        Event { kind: EventKind::Set, path, value: None, previous: None, passed: false, silent: false, event_context: None, remote: false }
    }

    #[test]
    fn dispatches_to_prefix_matching_listeners_in_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        let o1 = order.clone();
        bus.listen(path!("users", "1"), EventFilter::All, move |_| {
            o1.lock().unwrap().push("parent");
            Ok(())
        });
        let o2 = order.clone();
        bus.listen(path!("users", "1", "name"), EventFilter::All, move |_| {
            o2.lock().unwrap().push("child");
            Ok(())
        });
        let o3 = order.clone();
        bus.listen(path!("users", "2"), EventFilter::All, move |_| {
            o3.lock().unwrap().push("unrelated");
            Ok(())
        });

        bus.emit(Event {
            value: Some(Value::from("ada")),
            ..set_event(path!("users", "1", "name"))
        });

        assert_eq!(*order.lock().unwrap(), vec!["parent", "child"]);
    }

    #[test]
    fn kind_filter_only_hears_its_own_kind() {
        let bus = EventBus::new();
        let sets = Arc::new(AtomicUsize::new(0));
        let removes = Arc::new(AtomicUsize::new(0));

        let sets2 = sets.clone();
        bus.listen(path!("a"), EventKind::Set, move |_| {
            sets2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let removes2 = removes.clone();
        bus.listen(path!("a"), EventKind::Remove, move |_| {
            removes2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(set_event(path!("a")));
        assert_eq!(sets.load(Ordering::SeqCst), 1);
        assert_eq!(removes.load(Ordering::SeqCst), 0);

        bus.emit(Event { kind: EventKind::Remove, ..set_event(path!("a")) });
        assert_eq!(sets.load(Ordering::SeqCst), 1);
        assert_eq!(removes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn silent_event_only_reaches_a_matching_event_context() {
        let bus = EventBus::new();
        let default_listener = Arc::new(AtomicUsize::new(0));
        let scoped_listener = Arc::new(AtomicUsize::new(0));

        let default2 = default_listener.clone();
        bus.listen(path!("a"), EventFilter::All, move |_| {
            default2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let scoped2 = scoped_listener.clone();
        bus.listen_in_context(path!("a"), EventFilter::All, Some("editor-1".to_string()), move |_| {
            scoped2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });

        bus.emit(Event { silent: true, event_context: Some("editor-1".to_string()), ..set_event(path!("a")) });

        assert_eq!(default_listener.load(Ordering::SeqCst), 0, "non-matching listener must not hear a silent event");
        assert_eq!(scoped_listener.load(Ordering::SeqCst), 1, "matching eventContext must still hear it");
    }

    #[test]
    fn reentrant_emit_is_queued_not_interleaved() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let bus2 = bus.clone();
        let seen2 = seen.clone();
        bus.listen(path!("a"), EventFilter::All, move |event| {
            seen2.lock().unwrap().push(format!("outer:{}", event.path));
            if event.path == path!("a") {
                bus2.emit(set_event(path!("a", "nested")));
                seen2.lock().unwrap().push("outer-after-emit".to_string());
            }
            Ok(())
        });

        bus.emit(set_event(path!("a")));

        let log = seen.lock().unwrap();
        assert_eq!(
            *log,
            vec!["outer:a".to_string(), "outer-after-emit".to_string(), "outer:a.nested".to_string()]
        );
    }

    #[test]
    fn listener_errors_reach_the_configured_sink() {
        let bus = EventBus::new();
        let errors = Arc::new(AtomicUsize::new(0));
        let errors2 = errors.clone();
        bus.set_error_sink(move |_| {
            errors2.fetch_add(1, Ordering::SeqCst);
        });
        bus.listen(path!("a"), EventFilter::All, |_| Err("boom".to_string()));
        bus.emit(set_event(path!("a")));
        assert_eq!(errors.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn unlisten_stops_future_dispatch() {
        let bus = EventBus::new();
        let count = Arc::new(AtomicUsize::new(0));
        let count2 = count.clone();
        let id = bus.listen(path!("a"), EventFilter::All, move |_| {
            count2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        bus.unlisten(id);
        bus.emit(set_event(path!("a")));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
