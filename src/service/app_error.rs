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

pub type AppResult<T> = Result<T, AppError>;

/// Errors surfaced by configuration, parsing and argument validation.
///
/// The emulators themselves never fail; every runtime condition they model is
/// reported through emitted events instead.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// general errors
    #[error("illegal state: {0}")]
    IllegalState(String),

    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("unsupported buffer input: {0}")]
    UnsupportedInput(String),

    /// relayed from an `error` event on a stream
    #[error("stream failed: {0}")]
    StreamFailed(String),

    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("config file error: {0}")]
    ConfigFileError(#[from] config::ConfigError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
