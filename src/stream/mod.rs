//! Duplex stream emulator
//!
//! [`EmulatedStream`] presents the event-emitter style stream surface (`on`, `once`,
//! `emit`, `pause`, `resume`, `pipe`, `write`, `end`) without any buffering: a write
//! turns into a synchronous `data` event. `pipe` forwards `data` into the destination's
//! `write`, `end` into its `end`, and the destination's `drain` back into `resume`.
//!
//! [`pipeline`] and [`finished`] complete on the shared event loop, never synchronously.

pub use duplex::{Duplex, EmulatedStream, WriteCallback};
pub use helpers::{finished, pipeline};

mod duplex;
mod helpers;
