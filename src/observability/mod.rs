// Logging configuration
pub mod config;

// Structured logging
pub mod logging;

// Metrics recording through the `metrics` facade
pub mod metrics;

pub use config::{LogConfig, LogFormat, LogOutput};
pub use logging::init_logging;
