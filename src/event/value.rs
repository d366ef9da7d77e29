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

use serde::{Deserialize, Serialize};

use crate::buffer::ByteBuffer;

pub const OPEN: &str = "open";
pub const MESSAGE: &str = "message";
pub const CLOSE: &str = "close";
pub const PING: &str = "ping";
pub const DATA: &str = "data";
pub const END: &str = "end";
pub const DRAIN: &str = "drain";
pub const RESUME: &str = "resume";
pub const ERROR: &str = "error";

/// Payload delivered with a socket `message` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub data: String,
}

/// One argument passed to a listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventValue {
    Chunk(ByteBuffer),
    Message(MessageEvent),
    Code(u16),
    Text(String),
    Error(String),
}

impl EventValue {
    pub fn as_chunk(&self) -> Option<&ByteBuffer> {
        match self {
            EventValue::Chunk(chunk) => Some(chunk),
            _ => None,
        }
    }

    pub fn as_message(&self) -> Option<&MessageEvent> {
        match self {
            EventValue::Message(message) => Some(message),
            _ => None,
        }
    }

    pub fn as_code(&self) -> Option<u16> {
        match self {
            EventValue::Code(code) => Some(*code),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            EventValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&str> {
        match self {
            EventValue::Error(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ByteBuffer> for EventValue {
    fn from(chunk: ByteBuffer) -> Self {
        EventValue::Chunk(chunk)
    }
}

impl From<MessageEvent> for EventValue {
    fn from(message: MessageEvent) -> Self {
        EventValue::Message(message)
    }
}
