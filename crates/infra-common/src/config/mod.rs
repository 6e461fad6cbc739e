//! TOML configuration loading
//!
//! Engine crates define their own `serde` configuration structs with defaults;
//! this module only turns text or a file into one of them.
//!
//! ```rust
//! use serde::Deserialize;
//! use sipstate_infra_common::config::load_toml_str;
//!
//! #[derive(Deserialize)]
//! struct Limits { fifo_capacity: usize }
//!
//! let limits: Limits = load_toml_str("fifo_capacity = 16").unwrap();
//! assert_eq!(limits.fifo_capacity, 16);
//! ```

use std::path::Path;

use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{InfraError, InfraResult};

/// Deserialize a configuration value from TOML text
pub fn load_toml_str<T: DeserializeOwned>(text: &str) -> InfraResult<T> {
    Ok(toml::from_str(text)?)
}

/// Read and deserialize a TOML configuration file
pub fn load_toml_file<T: DeserializeOwned>(path: impl AsRef<Path>) -> InfraResult<T> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| InfraError::ConfigRead {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(path = %path.display(), bytes = text.len(), "Loaded configuration file");
    load_toml_str(&text)
}
