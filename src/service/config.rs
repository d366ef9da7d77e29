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

extern crate config as _;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{AppError, AppResult};

/// Environment variables with this prefix override file values,
/// e.g. `NETSHIM__SOCKET__PING_INTERVAL_MS=5000`.
pub const ENV_PREFIX: &str = "NETSHIM";

/// Timing and behaviour of the socket emulator.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SocketConfig {
    /// Delay between construction and the `open` event.
    pub open_delay_ms: u64,
    /// Delay between `send` and the acknowledgement `message` event.
    pub message_delay_ms: u64,
    /// Period of the recurring `ping` event.
    pub ping_interval_ms: u64,
    /// Start in `CONNECTING` and switch to `OPEN` when `open` fires.
    /// Off by default: sockets report `OPEN` right after construction.
    pub strict_ready_state: bool,
}

impl Default for SocketConfig {
    fn default() -> Self {
        SocketConfig {
            open_delay_ms: 100,
            message_delay_ms: 100,
            ping_interval_ms: 30_000,
            strict_ready_state: false,
        }
    }
}

impl SocketConfig {
    pub fn open_delay(&self) -> Duration {
        Duration::from_millis(self.open_delay_ms)
    }

    pub fn message_delay(&self) -> Duration {
        Duration::from_millis(self.message_delay_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Chunk size at which a write reports "stop writing" when backpressure is simulated.
    pub high_water_mark: usize,
    /// Opt-in: large writes return `false` and are followed by a `drain` event.
    pub simulate_backpressure: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        StreamConfig {
            high_water_mark: 16 * 1024,
            simulate_backpressure: false,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct EmulatorConfig {
    pub socket: SocketConfig,
    pub stream: StreamConfig,
}

impl EmulatorConfig {
    pub fn set_up_config<P: AsRef<Path>>(path: P) -> AppResult<EmulatorConfig> {
        let path_str = path
            .as_ref()
            .to_str()
            .ok_or(AppError::InvalidValue(format!(
                "config file path: {}",
                path.as_ref().to_string_lossy()
            )))?;
        let config = config::Config::builder()
            .add_source(config::File::with_name(path_str))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let emulator_config: EmulatorConfig = config.try_deserialize()?;
        emulator_config.validate()?;
        Ok(emulator_config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.socket.ping_interval_ms == 0 {
            return Err(AppError::InvalidValue(
                "socket.ping_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.stream.high_water_mark == 0 {
            return Err(AppError::InvalidValue(
                "stream.high_water_mark must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
