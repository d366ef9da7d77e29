pub use app_error::{AppError, AppResult};
pub use self::config::{EmulatorConfig, SocketConfig, StreamConfig, ENV_PREFIX};
pub use shutdown::Shutdown;
pub use tracing_config::{level_from_verbosity, setup_local_tracing};

mod app_error;
mod config;
mod shutdown;
mod tracing_config;
