//! # Configuration
//!
//! Loaded once at startup from TOML:
//!
//! ```toml
//! [dispatch]
//! delivery = "deferred"
//! queue_capacity = 4096
//! max_dispatch_depth = 16
//! frame_budget_us = 16666
//!
//! [kinds]
//! collision = 4
//! ```
//!
//! `[kinds]` maps `Payload::NAME` to a kind id and feeds
//! [`ConfiguredKinds`](crate::registry::ConfiguredKinds).

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};

/// When published events reach subscribers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMode {
    /// Handlers run inside `publish`.
    #[default]
    Immediate,
    /// Events are queued and handlers run inside `drain`.
    Deferred,
}

/// Event bus settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DispatchConfig {
    /// Delivery mode.
    pub delivery: DeliveryMode,
    /// Maximum events waiting for a drain (deferred mode).
    pub queue_capacity: usize,
    /// Maximum nesting of publish-from-handler (immediate mode).
    pub max_dispatch_depth: u32,
    /// Frame time above which the tick loop logs a warning, in microseconds.
    pub frame_budget_us: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            delivery: DeliveryMode::Immediate,
            queue_capacity: 2048,
            max_dispatch_depth: 16,
            frame_budget_us: 16_666, // 60 FPS
        }
    }
}

impl DispatchConfig {
    /// Deferred delivery with default limits.
    #[must_use]
    pub fn deferred() -> Self {
        Self {
            delivery: DeliveryMode::Deferred,
            ..Self::default()
        }
    }

    /// Sets the queue capacity.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Checks limits are usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a zero capacity or depth.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_capacity must be greater than zero".into(),
            ));
        }
        if self.max_dispatch_depth == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.max_dispatch_depth must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Payload name to kind id table.
pub type KindTable = BTreeMap<String, u16>;

/// Top-level configuration file.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RippleConfig {
    /// Event bus settings.
    pub dispatch: DispatchConfig,
    /// Kind ids assigned by name.
    pub kinds: KindTable,
}

impl RippleConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown keys and
    /// [`ConfigError::Invalid`] for out-of-range values or two payload names
    /// sharing one id.
    pub fn from_toml_str(source: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise as
    /// [`from_toml_str`](Self::from_toml_str).
    pub fn from_toml_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&source)
    }

    /// Checks every section.
    ///
    /// # Errors
    ///
    /// See [`from_toml_str`](Self::from_toml_str).
    pub fn validate(&self) -> ConfigResult<()> {
        self.dispatch.validate()?;

        let mut seen: HashMap<u16, &str> = HashMap::with_capacity(self.kinds.len());
        for (name, &id) in &self.kinds {
            if let Some(previous) = seen.insert(id, name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "kinds.{previous} and kinds.{name} both claim id {id}"
                )));
            }
        }
        Ok(())
    }
}
