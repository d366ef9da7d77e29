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
use std::str::FromStr;

use bytes::{Bytes, BytesMut};
use serde_json::Value;
use tracing::trace;

use crate::{AppError, AppResult};

/// Text encodings accepted by the buffer API.
///
/// The label is only recorded: text is always encoded and decoded as UTF-8.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Encoding {
    #[default]
    Utf8,
    Ascii,
    Latin1,
    Hex,
    Base64,
    Utf16Le,
}

impl FromStr for Encoding {
    type Err = AppError;

    fn from_str(label: &str) -> Result<Self, Self::Err> {
        match label.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(Encoding::Utf8),
            "ascii" => Ok(Encoding::Ascii),
            "latin1" | "binary" => Ok(Encoding::Latin1),
            "hex" => Ok(Encoding::Hex),
            "base64" => Ok(Encoding::Base64),
            "ucs2" | "ucs-2" | "utf16le" | "utf-16le" => Ok(Encoding::Utf16Le),
            other => Err(AppError::InvalidValue(format!("unknown encoding: {}", other))),
        }
    }
}

/// Everything a buffer can be built from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BufferInput {
    /// zero-filled buffer of this many bytes
    Size(usize),
    /// UTF-8 encoded text
    Text(String),
    /// shared as-is, never copied
    Bytes(Bytes),
    #[default]
    Empty,
}

impl From<usize> for BufferInput {
    fn from(size: usize) -> Self {
        BufferInput::Size(size)
    }
}

impl From<&str> for BufferInput {
    fn from(text: &str) -> Self {
        BufferInput::Text(text.to_string())
    }
}

impl From<String> for BufferInput {
    fn from(text: String) -> Self {
        BufferInput::Text(text)
    }
}

impl From<Bytes> for BufferInput {
    fn from(bytes: Bytes) -> Self {
        BufferInput::Bytes(bytes)
    }
}

impl From<Vec<u8>> for BufferInput {
    fn from(bytes: Vec<u8>) -> Self {
        BufferInput::Bytes(Bytes::from(bytes))
    }
}

/// Pattern used by [`ByteBuffer::alloc`] to fill a fresh buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fill {
    Byte(u8),
    Text(String),
}

impl Default for Fill {
    fn default() -> Self {
        Fill::Byte(0)
    }
}

impl From<u8> for Fill {
    fn from(byte: u8) -> Self {
        Fill::Byte(byte)
    }
}

impl From<&str> for Fill {
    fn from(text: &str) -> Self {
        Fill::Text(text.to_string())
    }
}

/// An immutable byte sequence with buffer-style construction and conversion.
///
/// Cloning is cheap: the backing [`Bytes`] is reference counted, so a buffer built
/// from existing bytes shares them instead of copying.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteBuffer {
    bytes: Bytes,
}

impl ByteBuffer {
    pub fn new() -> Self {
        ByteBuffer::default()
    }

    /// A zero-filled buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        ByteBuffer {
            bytes: BytesMut::zeroed(len).freeze(),
        }
    }

    /// Builds a buffer from any supported input. The encoding is accepted for call
    /// compatibility only, text is always UTF-8.
    pub fn from_input(input: impl Into<BufferInput>, encoding: Option<Encoding>) -> Self {
        if let Some(encoding) = encoding.filter(|e| *e != Encoding::Utf8) {
            trace!("encoding {:?} requested, encoding as utf-8", encoding);
        }
        match input.into() {
            BufferInput::Size(len) => ByteBuffer::with_len(len),
            BufferInput::Text(text) => ByteBuffer {
                bytes: Bytes::from(text),
            },
            BufferInput::Bytes(bytes) => ByteBuffer { bytes },
            BufferInput::Empty => ByteBuffer::default(),
        }
    }

    /// Builds a buffer from a dynamically typed value.
    ///
    /// A number is a size, a string is text, an array of byte values is raw bytes and
    /// `null` is empty. Anything else is rejected rather than silently emptied.
    pub fn try_from_json(value: &Value) -> AppResult<Self> {
        match value {
            Value::Null => Ok(ByteBuffer::default()),
            Value::Number(n) => n
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .map(ByteBuffer::with_len)
                .ok_or_else(|| {
                    AppError::UnsupportedInput(format!("size must be a non-negative integer: {}", n))
                }),
            Value::String(text) => Ok(ByteBuffer::from(text.as_str())),
            Value::Array(items) => {
                let mut bytes = BytesMut::with_capacity(items.len());
                for item in items {
                    let byte = item
                        .as_u64()
                        .and_then(|b| u8::try_from(b).ok())
                        .ok_or_else(|| {
                            AppError::UnsupportedInput(format!("not a byte value: {}", item))
                        })?;
                    bytes.extend_from_slice(&[byte]);
                }
                Ok(ByteBuffer {
                    bytes: bytes.freeze(),
                })
            }
            other => Err(AppError::UnsupportedInput(format!(
                "cannot build a buffer from {}",
                other
            ))),
        }
    }

    /// `size` bytes, with a non-zero fill pattern repeated across the whole buffer.
    pub fn alloc(size: usize, fill: impl Into<Fill>) -> Self {
        let mut buf = BytesMut::zeroed(size);
        let fill = fill.into();
        let pattern: &[u8] = match &fill {
            Fill::Byte(0) => &[],
            Fill::Byte(byte) => std::slice::from_ref(byte),
            Fill::Text(text) => text.as_bytes(),
        };
        if !pattern.is_empty() {
            for (dst, src) in buf.iter_mut().zip(pattern.iter().cycle()) {
                *dst = *src;
            }
        }
        ByteBuffer { bytes: buf.freeze() }
    }

    /// Joins the buffers in order into a new one.
    pub fn concat(buffers: &[ByteBuffer]) -> Self {
        let total = buffers.iter().map(ByteBuffer::len).sum();
        let mut buf = BytesMut::with_capacity(total);
        for buffer in buffers {
            buf.extend_from_slice(&buffer.bytes);
        }
        ByteBuffer { bytes: buf.freeze() }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }

    /// Decodes the content as UTF-8 whatever encoding is asked for; invalid sequences
    /// become U+FFFD.
    pub fn to_string_with(&self, encoding: Option<Encoding>) -> String {
        if let Some(encoding) = encoding.filter(|e| *e != Encoding::Utf8) {
            trace!("encoding {:?} requested, decoding as utf-8", encoding);
        }
        String::from_utf8_lossy(&self.bytes).into_owned()
    }
}

impl fmt::Display for ByteBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.bytes))
    }
}

impl AsRef<[u8]> for ByteBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.bytes
    }
}

impl From<&str> for ByteBuffer {
    fn from(text: &str) -> Self {
        ByteBuffer::from_input(text, None)
    }
}

impl From<String> for ByteBuffer {
    fn from(text: String) -> Self {
        ByteBuffer::from_input(text, None)
    }
}

impl From<Bytes> for ByteBuffer {
    fn from(bytes: Bytes) -> Self {
        ByteBuffer { bytes }
    }
}

impl From<Vec<u8>> for ByteBuffer {
    fn from(bytes: Vec<u8>) -> Self {
        ByteBuffer {
            bytes: Bytes::from(bytes),
        }
    }
}

impl From<&[u8]> for ByteBuffer {
    fn from(bytes: &[u8]) -> Self {
        ByteBuffer {
            bytes: Bytes::copy_from_slice(bytes),
        }
    }
}

impl From<ByteBuffer> for Bytes {
    fn from(buffer: ByteBuffer) -> Self {
        buffer.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(0)]
    #[case(1)]
    #[case(7)]
    #[case(4096)]
    fn test_alloc_is_zeroed(#[case] size: usize) {
        let buf = ByteBuffer::alloc(size, 0u8);
        assert_eq!(buf.len(), size);
        assert!(buf.as_bytes().iter().all(|b| *b == 0));
    }

    #[test]
    fn test_alloc_with_byte_fill() {
        let buf = ByteBuffer::alloc(4, 0xabu8);
        assert_eq!(buf.as_bytes(), &[0xab; 4]);
    }

    #[test]
    fn test_alloc_with_text_fill_repeats() {
        let buf = ByteBuffer::alloc(5, "ab");
        assert_eq!(buf.to_string(), "ababa");

        // empty pattern leaves zeros instead of looping forever
        let buf = ByteBuffer::alloc(3, "");
        assert_eq!(buf.as_bytes(), &[0, 0, 0]);
    }

    #[rstest]
    #[case("hello")]
    #[case("héllo")]
    #[case("")]
    #[case("日本語 ✓")]
    fn test_text_round_trip(#[case] text: &str) {
        assert_eq!(ByteBuffer::from(text).to_string(), text);
    }

    #[test]
    fn test_multibyte_length_counts_bytes() {
        assert_eq!(ByteBuffer::from("héllo").len(), 6);
    }

    #[test]
    fn test_concat() {
        let joined = ByteBuffer::concat(&[ByteBuffer::from("ab"), ByteBuffer::from("cd")]);
        assert_eq!(joined.to_string(), "abcd");
        assert_eq!(joined.len(), 4);
        assert_eq!(ByteBuffer::concat(&[]).len(), 0);
    }

    #[test]
    fn test_existing_bytes_are_shared() {
        let bytes = Bytes::from_static(b"shared");
        let buf = ByteBuffer::from_input(bytes.clone(), None);
        assert_eq!(buf.as_bytes().as_ptr(), bytes.as_ptr());
    }

    #[test]
    fn test_from_input_variants() {
        assert_eq!(ByteBuffer::from_input(3usize, None).as_bytes(), &[0, 0, 0]);
        assert!(ByteBuffer::from_input(BufferInput::Empty, None).is_empty());
        assert_eq!(
            ByteBuffer::from_input(vec![1u8, 2], Some(Encoding::Hex)).as_bytes(),
            &[1, 2]
        );
    }

    #[test]
    fn test_requested_encoding_is_ignored() {
        let buf = ByteBuffer::from_input("abc", Some(Encoding::Base64));
        assert_eq!(buf.as_bytes(), b"abc");
        assert_eq!(buf.to_string_with(Some(Encoding::Hex)), "abc");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let buf = ByteBuffer::from(vec![0x66, 0xff, 0x6f]);
        assert_eq!(buf.to_string(), "f\u{fffd}o");
    }

    #[rstest]
    #[case("utf8", Encoding::Utf8)]
    #[case("UTF-8", Encoding::Utf8)]
    #[case("binary", Encoding::Latin1)]
    #[case("ucs2", Encoding::Utf16Le)]
    #[case("base64", Encoding::Base64)]
    fn test_encoding_labels(#[case] label: &str, #[case] expected: Encoding) {
        assert_eq!(label.parse::<Encoding>().unwrap(), expected);
    }

    #[test]
    fn test_unknown_encoding_label() {
        assert!(matches!(
            "ebcdic".parse::<Encoding>(),
            Err(AppError::InvalidValue(_))
        ));
    }

    #[test]
    fn test_try_from_json() -> AppResult<()> {
        assert_eq!(ByteBuffer::try_from_json(&json!(2))?.as_bytes(), &[0, 0]);
        assert_eq!(ByteBuffer::try_from_json(&json!("hi"))?.to_string(), "hi");
        assert_eq!(
            ByteBuffer::try_from_json(&json!([104, 105]))?.to_string(),
            "hi"
        );
        assert!(ByteBuffer::try_from_json(&json!(null))?.is_empty());
        Ok(())
    }

    #[rstest]
    #[case(json!(-1))]
    #[case(json!(1.5))]
    #[case(json!([256]))]
    #[case(json!(["a"]))]
    #[case(json!({"size": 1}))]
    #[case(json!(true))]
    fn test_try_from_json_rejects(#[case] value: Value) {
        assert!(matches!(
            ByteBuffer::try_from_json(&value),
            Err(AppError::UnsupportedInput(_))
        ));
    }
}
