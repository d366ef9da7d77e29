// Copyright 2025 jonefeewang@gmail.com
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::EventValue;

/// Shared callback handle. Two handles are the same listener when they point at the
/// same allocation, so keep a clone around to remove it later.
pub type Listener = Arc<dyn Fn(&[EventValue]) + Send + Sync>;

/// Wraps a closure into a [`Listener`].
pub fn listener<F>(f: F) -> Listener
where
    F: Fn(&[EventValue]) + Send + Sync + 'static,
{
    Arc::new(f)
}

fn same_listener(a: &Listener, b: &Listener) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}

struct Registration {
    listener: Listener,
    once: bool,
    fired: AtomicBool,
}

/// Ordered listener registry keyed by event name.
///
/// Listeners run in registration order. `emit` works on a snapshot taken before the
/// first call, so listeners may freely register, remove or emit while being invoked.
#[derive(Default)]
pub struct EventEmitter {
    listeners: Mutex<HashMap<String, Vec<Arc<Registration>>>>,
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.lock();
        let counts: HashMap<&str, usize> = listeners
            .iter()
            .map(|(event, regs)| (event.as_str(), regs.len()))
            .collect();
        f.debug_struct("EventEmitter")
            .field("listeners", &counts)
            .finish()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        EventEmitter::default()
    }

    pub fn on(&self, event: &str, listener: Listener) {
        self.register(event, listener, false);
    }

    /// Registers a listener that is removed right before its first invocation.
    pub fn once(&self, event: &str, listener: Listener) {
        self.register(event, listener, true);
    }

    fn register(&self, event: &str, listener: Listener, once: bool) {
        let registration = Arc::new(Registration {
            listener,
            once,
            fired: AtomicBool::new(false),
        });
        self.listeners
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(registration);
    }

    /// Calls every listener of `event` with `args`. Returns whether any existed.
    pub fn emit(&self, event: &str, args: &[EventValue]) -> bool {
        let snapshot: Vec<Arc<Registration>> = {
            let listeners = self.listeners.lock();
            match listeners.get(event) {
                Some(regs) if !regs.is_empty() => regs.clone(),
                _ => return false,
            }
        };
        trace!("emit {} to {} listener(s)", event, snapshot.len());

        for registration in snapshot {
            if registration.once {
                if registration.fired.swap(true, Ordering::AcqRel) {
                    continue;
                }
                self.remove_registration(event, &registration);
            }
            (registration.listener)(args);
        }
        true
    }

    fn remove_registration(&self, event: &str, registration: &Arc<Registration>) {
        let mut listeners = self.listeners.lock();
        if let Some(regs) = listeners.get_mut(event) {
            regs.retain(|r| !Arc::ptr_eq(r, registration));
            if regs.is_empty() {
                listeners.remove(event);
            }
        }
    }

    /// Removes the most recently added registration of `listener`, `once` ones included.
    pub fn remove_listener(&self, event: &str, listener: &Listener) -> bool {
        let mut listeners = self.listeners.lock();
        let Some(regs) = listeners.get_mut(event) else {
            return false;
        };
        let Some(index) = regs
            .iter()
            .rposition(|r| same_listener(&r.listener, listener))
        else {
            return false;
        };
        regs.remove(index);
        if regs.is_empty() {
            listeners.remove(event);
        }
        true
    }

    /// Clears one event, or every event when `event` is `None`.
    pub fn remove_all_listeners(&self, event: Option<&str>) {
        let mut listeners = self.listeners.lock();
        match event {
            Some(event) => {
                listeners.remove(event);
            }
            None => listeners.clear(),
        }
    }

    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.lock().get(event).map_or(0, Vec::len)
    }
}

/// Listener API shared by every emulated object.
pub trait EventTarget {
    fn emitter(&self) -> &EventEmitter;

    fn on(&self, event: &str, listener: Listener) -> &Self {
        self.emitter().on(event, listener);
        self
    }

    fn once(&self, event: &str, listener: Listener) -> &Self {
        self.emitter().once(event, listener);
        self
    }

    fn emit(&self, event: &str, args: &[EventValue]) -> bool {
        self.emitter().emit(event, args)
    }

    fn remove_listener(&self, event: &str, listener: &Listener) -> &Self {
        self.emitter().remove_listener(event, listener);
        self
    }

    fn remove_all_listeners(&self, event: Option<&str>) -> &Self {
        self.emitter().remove_all_listeners(event);
        self
    }

    fn add_event_listener(&self, event: &str, listener: Listener) -> &Self {
        self.on(event, listener)
    }

    fn remove_event_listener(&self, event: &str, listener: &Listener) -> &Self {
        self.remove_listener(event, listener)
    }

    fn listener_count(&self, event: &str) -> usize {
        self.emitter().listener_count(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::ByteBuffer;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> Listener) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();
        let make = move |name: &'static str| {
            let calls = calls_clone.clone();
            listener(move |_| calls.lock().push(name.to_string()))
        };
        (calls, make)
    }

    #[test]
    fn test_emit_in_registration_order() {
        let emitter = EventEmitter::new();
        let (calls, make) = recorder();
        emitter.on("data", make("a"));
        emitter.on("data", make("b"));
        emitter.on("data", make("c"));

        assert!(emitter.emit("data", &[]));
        assert_eq!(*calls.lock(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_emit_without_listeners() {
        let emitter = EventEmitter::new();
        assert!(!emitter.emit("data", &[]));
    }

    #[test]
    fn test_args_are_passed() {
        let emitter = EventEmitter::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        emitter.on(
            "data",
            listener(move |args| seen_clone.lock().extend(args.iter().cloned())),
        );
        emitter.emit("data", &[EventValue::Chunk(ByteBuffer::from("x")), EventValue::Code(7)]);
        assert_eq!(
            *seen.lock(),
            vec![EventValue::Chunk(ByteBuffer::from("x")), EventValue::Code(7)]
        );
    }

    #[test]
    fn test_once_fires_once() {
        let emitter = EventEmitter::new();
        let (calls, make) = recorder();
        emitter.once("end", make("once"));
        emitter.on("end", make("on"));

        emitter.emit("end", &[]);
        emitter.emit("end", &[]);
        assert_eq!(*calls.lock(), vec!["once", "on", "on"]);
        assert_eq!(emitter.listener_count("end"), 1);
    }

    #[test]
    fn test_remove_listener_by_identity() {
        let emitter = EventEmitter::new();
        let (calls, make) = recorder();
        let a = make("a");
        emitter.on("data", a.clone());
        emitter.on("data", make("b"));

        assert!(emitter.remove_listener("data", &a));
        assert!(!emitter.remove_listener("data", &a));
        emitter.emit("data", &[]);
        assert_eq!(*calls.lock(), vec!["b"]);
    }

    #[test]
    fn test_remove_listener_removes_one_instance() {
        let emitter = EventEmitter::new();
        let (calls, make) = recorder();
        let a = make("a");
        emitter.on("data", a.clone());
        emitter.on("data", a.clone());

        emitter.remove_listener("data", &a);
        emitter.emit("data", &[]);
        assert_eq!(*calls.lock(), vec!["a"]);
    }

    #[test]
    fn test_remove_pending_once() {
        let emitter = EventEmitter::new();
        let (calls, make) = recorder();
        let a = make("a");
        emitter.once("end", a.clone());
        emitter.remove_listener("end", &a);
        assert!(!emitter.emit("end", &[]));
        assert!(calls.lock().is_empty());
    }

    #[test]
    fn test_removal_during_emit_keeps_current_pass() {
        let emitter = Arc::new(EventEmitter::new());
        let (calls, make) = recorder();
        let b = make("b");

        let emitter_clone = emitter.clone();
        let b_clone = b.clone();
        let calls_clone = calls.clone();
        emitter.on(
            "data",
            listener(move |_| {
                calls_clone.lock().push("a".to_string());
                emitter_clone.remove_listener("data", &b_clone);
            }),
        );
        emitter.on("data", b);
        emitter.on("data", make("c"));

        emitter.emit("data", &[]);
        assert_eq!(*calls.lock(), vec!["a", "b", "c"]);

        calls.lock().clear();
        emitter.emit("data", &[]);
        assert_eq!(*calls.lock(), vec!["a", "c"]);
    }

    #[test]
    fn test_reentrant_emit() {
        let emitter = Arc::new(EventEmitter::new());
        let (calls, make) = recorder();
        let emitter_clone = emitter.clone();
        emitter.on("outer", listener(move |_| {
            emitter_clone.emit("inner", &[]);
        }));
        emitter.on("inner", make("inner"));

        emitter.emit("outer", &[]);
        assert_eq!(*calls.lock(), vec!["inner"]);
    }

    #[test]
    fn test_remove_all_listeners() {
        let emitter = EventEmitter::new();
        let (_calls, make) = recorder();
        emitter.on("a", make("a"));
        emitter.on("b", make("b"));

        emitter.remove_all_listeners(Some("a"));
        assert_eq!(emitter.listener_count("a"), 0);
        assert_eq!(emitter.listener_count("b"), 1);

        emitter.remove_all_listeners(None);
        assert_eq!(emitter.listener_count("b"), 0);
    }
}
