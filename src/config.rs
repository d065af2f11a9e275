//! Protocol timing and sizing configuration.
//!
//! [`ProtocolConfig`] holds the per-connection knobs: reply timeout, pacing
//! between outbound chunks, heartbeat interval, multi-part timeout and the
//! default frame capacity. Values can be set programmatically or loaded from
//! TOML, where durations are given in milliseconds:
//!
//! ```toml
//! response_timeout_ms = 1000
//! pacing_delay_ms = 300
//! alive_interval_ms = 5000
//! multipart_timeout_ms = 1000
//! default_capacity = 1024
//! ```

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::negotiation::{MAX_CAPACITY, MIN_CAPACITY};

/// Default time to wait for a reply.
pub const DEFAULT_RESPONSE_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default pause between consecutive chunks of one outbound message.
pub const DEFAULT_PACING_DELAY: Duration = Duration::from_millis(300);
/// Default idle time before a heartbeat probe is sent.
pub const DEFAULT_ALIVE_INTERVAL: Duration = Duration::from_millis(5000);
/// Default deadline extension granted by each multi-part fragment.
pub const DEFAULT_MULTIPART_TIMEOUT: Duration = Duration::from_millis(1000);
/// Default frame capacity in bytes.
pub const DEFAULT_CAPACITY: usize = 1024;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML document could not be parsed.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A value is outside its permitted range.
    #[error("invalid {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// Why the value was rejected.
        reason: String,
    },
}

/// Per-connection protocol settings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Time to wait for a reply when a send does not specify one.
    #[serde(rename = "response_timeout_ms", with = "millis")]
    pub response_timeout: Duration,
    /// Pause between consecutive chunks of one outbound message.
    #[serde(rename = "pacing_delay_ms", with = "millis")]
    pub pacing_delay: Duration,
    /// Idle time before a heartbeat probe is sent.
    #[serde(rename = "alive_interval_ms", with = "millis")]
    pub alive_interval: Duration,
    /// Deadline extension granted by each multi-part fragment.
    #[serde(rename = "multipart_timeout_ms", with = "millis")]
    pub multipart_timeout: Duration,
    /// Frame capacity used until negotiation raises it.
    pub default_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            response_timeout: DEFAULT_RESPONSE_TIMEOUT,
            pacing_delay: DEFAULT_PACING_DELAY,
            alive_interval: DEFAULT_ALIVE_INTERVAL,
            multipart_timeout: DEFAULT_MULTIPART_TIMEOUT,
            default_capacity: DEFAULT_CAPACITY,
        }
    }
}

impl ProtocolConfig {
    /// Parse and validate a TOML document. Missing keys take defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the document is malformed or a value is out
    /// of range.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(MIN_CAPACITY..=MAX_CAPACITY).contains(&self.default_capacity) {
            return Err(ConfigError::Invalid {
                field: "default_capacity",
                reason: format!("must be within {MIN_CAPACITY}..={MAX_CAPACITY}"),
            });
        }
        for (field, value) in [
            ("response_timeout_ms", self.response_timeout),
            ("alive_interval_ms", self.alive_interval),
            ("multipart_timeout_ms", self.multipart_timeout),
        ] {
            if value.is_zero() {
                return Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn with_response_timeout(mut self, timeout: Duration) -> Self {
        self.response_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_pacing_delay(mut self, delay: Duration) -> Self {
        self.pacing_delay = delay;
        self
    }

    #[must_use]
    pub fn with_alive_interval(mut self, interval: Duration) -> Self {
        self.alive_interval = interval;
        self
    }

    #[must_use]
    pub fn with_multipart_timeout(mut self, timeout: Duration) -> Self {
        self.multipart_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_default_capacity(mut self, capacity: usize) -> Self {
        self.default_capacity = capacity;
        self
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
