//! The mixsend process: configuration discovery and the pool controller.

pub mod config_file;
pub mod controller;

pub use controller::{Mixsend, SHUTDOWN_BROADCAST, shutdown_on_signal};
