pub mod buffer;
pub mod event;
pub mod runtime;
pub mod service;
pub mod socket;
pub mod stream;

pub use buffer::{BufferInput, ByteBuffer, Encoding, Fill};
pub use event::{listener, EventEmitter, EventTarget, EventValue, Listener, MessageEvent};
pub use runtime::{EventLoop, LoopHandle, TimerGuard, TimerId};
pub use service::{
    level_from_verbosity, setup_local_tracing, AppError, AppResult, EmulatorConfig, Shutdown,
    SocketConfig, StreamConfig,
};
pub use socket::{EmulatedSocket, ReadyState, WebSocketLike};
pub use stream::{finished, pipeline, Duplex, EmulatedStream};
