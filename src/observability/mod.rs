//! Logging setup for the update agent

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
