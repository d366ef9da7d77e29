//! Event loop
//!
//! All deferred behaviour of the emulators (open, message, ping, drain and helper
//! completions) goes through one [`EventLoop`]. Its driver task owns a timer queue fed
//! over a channel, so handles can schedule and cancel from any thread without locks.
//!
//! Recurring timers are owned by a [`TimerGuard`]; dropping the guard cancels the timer,
//! which ties a timer's lifetime to the object that started it.

pub use event_loop::{EventLoop, LoopHandle, TimerGuard, TimerId};

mod event_loop;
