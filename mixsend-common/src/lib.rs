pub mod address;
pub mod config;
pub mod error;
pub mod logging;

pub use tracing;

pub use self::{
    address::{Address, HIDDEN_SERVICE_SUFFIX, is_hidden_service},
    config::Config,
    error::{ConfigError, MalformedAddress},
};

/// Broadcast to background tasks when the process is stopping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
}
