//! Event registry
//!
//! The listener plumbing shared by the stream and socket emulators: a registry from
//! event name to an ordered list of callbacks, the [`EventTarget`] trait that exposes
//! it on every emulated object, and the argument type passed to listeners.
//!
//! Only the names below are ever emitted by this crate.

pub use emitter::{listener, EventEmitter, EventTarget, Listener};
pub use value::{EventValue, MessageEvent};
pub use value::{CLOSE, DATA, DRAIN, END, ERROR, MESSAGE, OPEN, PING, RESUME};

mod emitter;
mod value;
