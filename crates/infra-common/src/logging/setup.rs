use std::str::FromStr;

use serde::Deserialize;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

use crate::errors::{InfraError, InfraResult};

/// Configuration for the logging system
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default level when `RUST_LOG` is not set ("trace" .. "error")
    pub level: String,
    /// Emit one JSON object per event instead of human readable lines
    pub json: bool,
    /// Include source file and line number
    pub file_info: bool,
    /// Log span open/close events
    pub log_spans: bool,
    /// Extra `target=level` directives, e.g. `sipstate_dialog_core::transaction=trace`
    pub directives: Vec<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: "info".to_string(),
            json: false,
            file_info: false,
            log_spans: false,
            directives: Vec::new(),
        }
    }
}

impl LoggingConfig {
    /// Create a configuration with the given default level
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level: level.to_string().to_lowercase(),
            ..Default::default()
        }
    }

    /// Enable JSON formatting
    pub fn with_json(mut self) -> Self {
        self.json = true;
        self
    }

    /// Enable file and line information in logs
    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Add a per-target filter directive
    pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
        self.directives.push(directive.into());
        self
    }

    fn build_filter(&self) -> InfraResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        let level = parse_log_level(&self.level)?;
        let mut filter = EnvFilter::new(level.to_string().to_lowercase());
        for directive in &self.directives {
            let parsed = directive
                .parse()
                .map_err(|e| InfraError::config_value("logging.directives", format!("{directive}: {e}")))?;
            filter = filter.add_directive(parsed);
        }
        Ok(filter)
    }
}

/// Install the global `tracing` subscriber described by `config`.
///
/// A subscriber that is already installed (common in test binaries) is left in
/// place and reported as success.
pub fn init_logging(config: &LoggingConfig) -> InfraResult<()> {
    let filter = config.build_filter()?;

    let span_events = if config.log_spans {
        FmtSpan::NEW | FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(span_events)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    if installed.is_err() {
        tracing::debug!("Global tracing subscriber already installed, keeping it");
    }
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> InfraResult<Level> {
    Level::from_str(level.trim())
        .map_err(|_| InfraError::config_value("logging.level", format!("unknown level '{level}'")))
}
