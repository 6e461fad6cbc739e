//! Engine configuration
//!
//! [`EngineConfig`] is a plain serde struct. Every field has a default, so a
//! TOML file only needs the values it changes:
//!
//! ```toml
//! fifo_capacity = 256
//! bind_address = "0.0.0.0:5060"
//!
//! [timers]
//! t1_ms = 250
//!
//! [logging]
//! level = "debug"
//! ```
//!
//! Loading goes through [`sipstate_infra_common::config`] and is followed by
//! [`EngineConfig::validate`].
//!
//! ```rust
//! use std::time::Duration;
//! use sipstate_dialog_core::config::EngineConfig;
//!
//! let config = EngineConfig::from_toml_str("[timers]\nt1_ms = 250").unwrap();
//! assert_eq!(config.timer_settings().t1, Duration::from_millis(250));
//! assert_eq!(config.fifo_capacity, 1000);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use sipstate_infra_common::config::{load_toml_file, load_toml_str};
use sipstate_infra_common::{InfraError, LoggingConfig};

use crate::errors::DialogResult;
use crate::message::DEFAULT_SIP_PORT;
use crate::transaction::TimerSettings;

/// RFC 3261 base timers in milliseconds
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimerConfig {
    pub t1_ms: u64,
    pub t2_ms: u64,
    pub t4_ms: u64,
}

impl Default for TimerConfig {
    fn default() -> Self {
        TimerConfig {
            t1_ms: 500,
            t2_ms: 4000,
            t4_ms: 5000,
        }
    }
}

/// 200 OK retransmission for dialogs we answered
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DialogTimerConfig {
    /// Delay before the first retransmission
    pub ok_initial_ms: u64,
    /// Give up waiting for the ACK after this long; 64*T1 when unset
    pub ok_window_ms: Option<u64>,
}

impl Default for DialogTimerConfig {
    fn default() -> Self {
        DialogTimerConfig {
            ok_initial_ms: 1000,
            ok_window_ms: None,
        }
    }
}

/// Configuration of one [`Engine`](crate::manager::Engine)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub timers: TimerConfig,
    /// Bound of the event fifo
    pub fifo_capacity: usize,
    /// How often the runner evaluates timers when no event arrives
    pub timer_tick_ms: u64,
    /// Port used when a URI or Via carries none
    pub default_port: u16,
    /// Local address of the default UDP transport
    pub bind_address: String,
    pub dialog: DialogTimerConfig,
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            timers: TimerConfig::default(),
            fifo_capacity: 1000,
            timer_tick_ms: 50,
            default_port: DEFAULT_SIP_PORT,
            bind_address: "0.0.0.0:0".to_string(),
            dialog: DialogTimerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(text: &str) -> DialogResult<Self> {
        let config: EngineConfig = load_toml_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> DialogResult<Self> {
        let config: EngineConfig = load_toml_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the engine cannot run with
    pub fn validate(&self) -> DialogResult<()> {
        let invalid = |field: &str, message: &str| -> DialogResult<()> {
            Err(InfraError::config_value(field, message).into())
        };

        if self.timers.t1_ms == 0 {
            return invalid("timers.t1_ms", "must be positive");
        }
        if self.timers.t2_ms < self.timers.t1_ms {
            return invalid("timers.t2_ms", "must not be below t1_ms");
        }
        if self.timers.t4_ms == 0 {
            return invalid("timers.t4_ms", "must be positive");
        }
        if self.fifo_capacity == 0 {
            return invalid("fifo_capacity", "must be positive");
        }
        if self.timer_tick_ms == 0 {
            return invalid("timer_tick_ms", "must be positive");
        }
        if self.default_port == 0 {
            return invalid("default_port", "must be positive");
        }
        if self.dialog.ok_initial_ms == 0 {
            return invalid("dialog.ok_initial_ms", "must be positive");
        }
        if self.bind_address.trim().is_empty() {
            return invalid("bind_address", "must not be empty");
        }
        Ok(())
    }

    pub fn with_timer_settings(mut self, settings: TimerSettings) -> Self {
        self.timers = TimerConfig {
            t1_ms: settings.t1.as_millis() as u64,
            t2_ms: settings.t2.as_millis() as u64,
            t4_ms: settings.t4.as_millis() as u64,
        };
        self
    }

    pub fn with_fifo_capacity(mut self, capacity: usize) -> Self {
        self.fifo_capacity = capacity;
        self
    }

    pub fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer_tick_ms = tick.as_millis() as u64;
        self
    }

    pub fn with_default_port(mut self, port: u16) -> Self {
        self.default_port = port;
        self
    }

    pub fn with_bind_address(mut self, address: impl Into<String>) -> Self {
        self.bind_address = address.into();
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            t1: Duration::from_millis(self.timers.t1_ms),
            t2: Duration::from_millis(self.timers.t2_ms),
            t4: Duration::from_millis(self.timers.t4_ms),
        }
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_ms)
    }

    /// First 200 OK retransmission delay
    pub fn ok_initial(&self) -> Duration {
        Duration::from_millis(self.dialog.ok_initial_ms)
    }

    /// How long a dialog waits for the ACK of its 200 OK
    pub fn ok_window(&self) -> Duration {
        match self.dialog.ok_window_ms {
            Some(ms) => Duration::from_millis(ms),
            None => self.timer_settings().transaction_timeout(),
        }
    }
}
