//! Logging bootstrap built on `tracing-subscriber`

mod setup;

pub use setup::{init_logging, parse_log_level, LoggingConfig};
