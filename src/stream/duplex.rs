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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::{ByteBuffer, Encoding};
use crate::event::{listener, EventEmitter, EventTarget, EventValue, DATA, DRAIN, END, RESUME};
use crate::runtime::LoopHandle;
use crate::service::StreamConfig;

/// Completion callback of a write or end.
pub type WriteCallback = Box<dyn FnOnce() + Send>;

/// The duplex stream surface consumers program against.
pub trait Duplex: EventTarget + Clone + Send + Sync + 'static {
    fn pause(&self) -> &Self;

    fn resume(&self) -> &Self;

    fn is_paused(&self) -> bool;

    /// Returns the "keep writing" signal.
    fn write(&self, chunk: impl Into<ByteBuffer>) -> bool {
        self.write_with(chunk.into(), None, None)
    }

    fn write_with(
        &self,
        chunk: ByteBuffer,
        encoding: Option<Encoding>,
        callback: Option<WriteCallback>,
    ) -> bool;

    fn end(&self) -> &Self {
        self.end_with(None, None, None)
    }

    fn end_with(
        &self,
        chunk: Option<ByteBuffer>,
        encoding: Option<Encoding>,
        callback: Option<WriteCallback>,
    ) -> &Self;

    fn is_ended(&self) -> bool;

    /// Forwards this stream's output into `destination` and returns it for chaining.
    fn pipe<D: Duplex>(&self, destination: D) -> D;
}

struct StreamInner {
    emitter: EventEmitter,
    paused: AtomicBool,
    ended: AtomicBool,
    drain_pending: AtomicBool,
    readable: AtomicBool,
    writable: AtomicBool,
    last_chunk: Mutex<ByteBuffer>,
    config: StreamConfig,
    handle: LoopHandle,
}

impl StreamInner {
    fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.emitter.emit(RESUME, &[]);
    }
}

/// Non-owning reference to an [`EmulatedStream`].
#[derive(Clone)]
pub(crate) struct WeakStream(Weak<StreamInner>);

impl WeakStream {
    pub(crate) fn upgrade(&self) -> Option<EmulatedStream> {
        self.0.upgrade().map(|inner| EmulatedStream { inner })
    }
}

/// In-process duplex stream.
///
/// Writes are delivered synchronously as `data` events. Only the most recent chunk is
/// held, see [`EmulatedStream::data`]. Clones share the same stream.
#[derive(Clone)]
pub struct EmulatedStream {
    inner: Arc<StreamInner>,
}

impl fmt::Debug for EmulatedStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmulatedStream")
            .field("paused", &self.is_paused())
            .field("ended", &self.is_ended())
            .field("config", &self.inner.config)
            .field("emitter", &self.inner.emitter)
            .finish()
    }
}

impl EmulatedStream {
    pub fn new(handle: &LoopHandle) -> Self {
        EmulatedStream::with_config(handle, StreamConfig::default())
    }

    pub fn with_config(handle: &LoopHandle, config: StreamConfig) -> Self {
        EmulatedStream {
            inner: Arc::new(StreamInner {
                emitter: EventEmitter::new(),
                paused: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                drain_pending: AtomicBool::new(false),
                readable: AtomicBool::new(true),
                writable: AtomicBool::new(true),
                last_chunk: Mutex::new(ByteBuffer::default()),
                config,
                handle: handle.clone(),
            }),
        }
    }

    pub fn is_readable(&self) -> bool {
        self.inner.readable.load(Ordering::Acquire)
    }

    pub fn is_writable(&self) -> bool {
        self.inner.writable.load(Ordering::Acquire)
    }

    /// The last chunk written, empty before the first write.
    pub fn data(&self) -> ByteBuffer {
        self.inner.last_chunk.lock().clone()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.inner.config
    }

    pub(crate) fn loop_handle(&self) -> &LoopHandle {
        &self.inner.handle
    }

    fn downgrade(&self) -> Weak<StreamInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn weak(&self) -> WeakStream {
        WeakStream(self.downgrade())
    }

    /// At most one `drain` is pending at a time.
    fn schedule_drain(&self) {
        if self.inner.drain_pending.swap(true, Ordering::AcqRel) {
            return;
        }
        let weak = self.downgrade();
        self.inner.handle.defer(move || {
            if let Some(inner) = weak.upgrade() {
                inner.drain_pending.store(false, Ordering::Release);
                inner.emitter.emit(DRAIN, &[]);
            }
        });
    }
}

impl EventTarget for EmulatedStream {
    fn emitter(&self) -> &EventEmitter {
        &self.inner.emitter
    }
}

impl Duplex for EmulatedStream {
    fn pause(&self) -> &Self {
        self.inner.paused.store(true, Ordering::Release);
        self
    }

    fn resume(&self) -> &Self {
        self.inner.resume();
        self
    }

    fn is_paused(&self) -> bool {
        self.inner.paused.load(Ordering::Acquire)
    }

    fn write_with(
        &self,
        chunk: ByteBuffer,
        _encoding: Option<Encoding>,
        callback: Option<WriteCallback>,
    ) -> bool {
        if self.is_ended() {
            debug!("write of {} byte(s) after end", chunk.len());
        }
        let config = &self.inner.config;
        let keep_writing = !(config.simulate_backpressure && chunk.len() >= config.high_water_mark);

        *self.inner.last_chunk.lock() = chunk.clone();
        self.inner.emitter.emit(DATA, &[EventValue::Chunk(chunk)]);
        if let Some(callback) = callback {
            callback();
        }
        if !keep_writing {
            trace!("high water mark reached, drain requested");
            self.schedule_drain();
        }
        keep_writing
    }

    fn end_with(
        &self,
        chunk: Option<ByteBuffer>,
        encoding: Option<Encoding>,
        callback: Option<WriteCallback>,
    ) -> &Self {
        if let Some(chunk) = chunk {
            self.write_with(chunk, encoding, None);
        }
        self.inner.ended.store(true, Ordering::Release);
        self.inner.emitter.emit(END, &[]);
        if let Some(callback) = callback {
            callback();
        }
        self
    }

    fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::Acquire)
    }

    fn pipe<D: Duplex>(&self, destination: D) -> D {
        let source = self.downgrade();
        let dest = destination.clone();
        self.inner.emitter.on(
            DATA,
            listener(move |args| {
                let Some(chunk) = args.first().and_then(EventValue::as_chunk) else {
                    return;
                };
                if !dest.write(chunk.clone()) {
                    if let Some(inner) = source.upgrade() {
                        inner.paused.store(true, Ordering::Release);
                    }
                }
            }),
        );

        let dest = destination.clone();
        self.inner.emitter.on(
            END,
            listener(move |_| {
                dest.end();
            }),
        );

        let source = self.downgrade();
        destination.on(
            DRAIN,
            listener(move |_| {
                if let Some(inner) = source.upgrade() {
                    inner.resume();
                }
            }),
        );
        trace!("pipe established");
        destination
    }
}
