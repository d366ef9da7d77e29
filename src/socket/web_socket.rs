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

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::ByteBuffer;
use crate::event::{
    EventEmitter, EventTarget, EventValue, MessageEvent, CLOSE, MESSAGE, OPEN, PING,
};
use crate::runtime::{LoopHandle, TimerGuard};
use crate::service::SocketConfig;

/// Payload of every acknowledgement `message` event.
pub const ACK_PAYLOAD: &str = r#"{"type":"response","success":true}"#;
/// Close code reported by `close`.
pub const NORMAL_CLOSURE: u16 = 1000;
pub const NORMAL_CLOSURE_REASON: &str = "Connection closed normally";

/// Connection lifecycle position, numbered like the browser socket constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl ReadyState {
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    fn from_u8(value: u8) -> ReadyState {
        match value {
            0 => ReadyState::Connecting,
            1 => ReadyState::Open,
            2 => ReadyState::Closing,
            _ => ReadyState::Closed,
        }
    }
}

/// The socket surface consumers program against.
pub trait WebSocketLike: EventTarget {
    fn url(&self) -> &str;

    fn protocols(&self) -> &[String];

    fn ready_state(&self) -> ReadyState;

    fn send(&self, data: impl Into<ByteBuffer>);

    fn close(&self);
}

struct SocketInner {
    url: String,
    protocols: Vec<String>,
    ready_state: AtomicU8,
    emitter: EventEmitter,
    ping: Mutex<Option<TimerGuard>>,
    config: SocketConfig,
    handle: LoopHandle,
}

impl SocketInner {
    fn set_ready_state(&self, state: ReadyState) {
        self.ready_state.store(state.as_u8(), Ordering::Release);
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready_state.load(Ordering::Acquire))
    }
}

/// A socket that never touches the network.
///
/// It reports `OPEN` right after construction, emits `open` after a short delay, `ping`
/// on a fixed interval and answers every `send` with the same acknowledgement. Clones
/// share the same socket; deferred events only keep a weak reference to it.
#[derive(Clone)]
pub struct EmulatedSocket {
    inner: Arc<SocketInner>,
}

impl fmt::Debug for EmulatedSocket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedSocket")
            .field("url", &self.inner.url)
            .field("protocols", &self.inner.protocols)
            .field("ready_state", &self.inner.ready_state())
            .field("emitter", &self.inner.emitter)
            .finish()
    }
}

impl EmulatedSocket {
    pub const CONNECTING: u8 = ReadyState::Connecting as u8;
    pub const OPEN: u8 = ReadyState::Open as u8;
    pub const CLOSING: u8 = ReadyState::Closing as u8;
    pub const CLOSED: u8 = ReadyState::Closed as u8;

    pub fn connect(handle: &LoopHandle, url: impl Into<String>, protocols: Vec<String>) -> Self {
        EmulatedSocket::connect_with_config(handle, url, protocols, SocketConfig::default())
    }

    pub fn connect_with_config(
        handle: &LoopHandle,
        url: impl Into<String>,
        protocols: Vec<String>,
        config: SocketConfig,
    ) -> Self {
        let initial = if config.strict_ready_state {
            ReadyState::Connecting
        } else {
            ReadyState::Open
        };
        let inner = Arc::new(SocketInner {
            url: url.into(),
            protocols,
            ready_state: AtomicU8::new(initial.as_u8()),
            emitter: EventEmitter::new(),
            ping: Mutex::new(None),
            config,
            handle: handle.clone(),
        });
        debug!("emulated socket to {} created", inner.url);

        let weak = Arc::downgrade(&inner);
        handle.schedule(inner.config.open_delay(), move || {
            if let Some(inner) = weak.upgrade() {
                if inner.ready_state() == ReadyState::Connecting {
                    inner.set_ready_state(ReadyState::Open);
                }
                debug!("emulated socket to {} open", inner.url);
                inner.emitter.emit(OPEN, &[]);
            }
        });

        let weak: Weak<SocketInner> = Arc::downgrade(&inner);
        let ping = handle.schedule_repeating(inner.config.ping_interval(), move || {
            if let Some(inner) = weak.upgrade() {
                trace!("ping {}", inner.url);
                inner.emitter.emit(PING, &[]);
            }
        });
        *inner.ping.lock() = Some(ping);

        EmulatedSocket { inner }
    }

    pub fn config(&self) -> &SocketConfig {
        &self.inner.config
    }

    pub fn ready_state_code(&self) -> u8 {
        self.inner.ready_state().as_u8()
    }
}

impl EventTarget for EmulatedSocket {
    fn emitter(&self) -> &EventEmitter {
        &self.inner.emitter
    }
}

impl WebSocketLike for EmulatedSocket {
    fn url(&self) -> &str {
        &self.inner.url
    }

    fn protocols(&self) -> &[String] {
        &self.inner.protocols
    }

    fn ready_state(&self) -> ReadyState {
        self.inner.ready_state()
    }

    /// Nothing is transmitted; the payload is only measured for the log.
    fn send(&self, data: impl Into<ByteBuffer>) {
        let data = data.into();
        trace!("send {} byte(s) to {}", data.len(), self.inner.url);
        let weak = Arc::downgrade(&self.inner);
        self.inner
            .handle
            .schedule(self.inner.config.message_delay(), move || {
                if let Some(inner) = weak.upgrade() {
                    let message = MessageEvent {
                        data: ACK_PAYLOAD.to_string(),
                    };
                    inner.emitter.emit(MESSAGE, &[EventValue::Message(message)]);
                }
            });
    }

    /// Stops the ping timer on the first call; every call reports one `close`.
    fn close(&self) {
        let ping = self.inner.ping.lock().take();
        if let Some(ping) = ping {
            ping.cancel();
        }
        self.inner.set_ready_state(ReadyState::Closed);
        debug!("emulated socket to {} closed", self.inner.url);
        self.inner.emitter.emit(
            CLOSE,
            &[
                EventValue::Code(NORMAL_CLOSURE),
                EventValue::Text(NORMAL_CLOSURE_REASON.to_string()),
            ],
        );
    }
}
