//! Common infrastructure for the sipstate workspace
//!
//! Nothing in here knows about SIP. The crate holds the pieces every engine
//! deployment needs before the first transaction exists:
//!
//! - [`logging`]: installs the `tracing` subscriber used by every crate
//! - [`config`]: loads serde-deserializable configuration from TOML
//! - [`errors`]: the error type returned by both

pub mod config;
pub mod errors;
pub mod logging;

pub use errors::{InfraError, InfraResult};
pub use logging::{init_logging, LoggingConfig};
