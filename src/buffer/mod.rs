//! Byte buffer adapter
//!
//! A single construction and conversion API over raw bytes, text and sizes, shaped
//! after the buffer type that stream and socket consumers expect. Text is always
//! UTF-8; an encoding label may be passed everywhere but is never acted upon.
//!
//! The free functions mirror the associated constructors so callers can write
//! `buffer::from("abc", None)` the same way they would with the real module.

pub use byte_buffer::{BufferInput, ByteBuffer, Encoding, Fill};

mod byte_buffer;

/// Same as [`ByteBuffer::from_input`].
pub fn from(input: impl Into<BufferInput>, encoding: Option<Encoding>) -> ByteBuffer {
    ByteBuffer::from_input(input, encoding)
}

/// Same as [`ByteBuffer::alloc`].
pub fn alloc(size: usize, fill: impl Into<Fill>) -> ByteBuffer {
    ByteBuffer::alloc(size, fill)
}

/// Same as [`ByteBuffer::concat`].
pub fn concat(buffers: &[ByteBuffer]) -> ByteBuffer {
    ByteBuffer::concat(buffers)
}
