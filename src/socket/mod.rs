//! Socket emulator
//!
//! [`EmulatedSocket`] mimics a browser-style socket entirely through the event loop:
//! `open` after a short delay, `ping` on a long interval, a fixed acknowledgement for
//! every `send`, and a normal-closure `close`. Nothing can fail because nothing is
//! transmitted.

pub use web_socket::{
    EmulatedSocket, ReadyState, WebSocketLike, ACK_PAYLOAD, NORMAL_CLOSURE, NORMAL_CLOSURE_REASON,
};

mod web_socket;
