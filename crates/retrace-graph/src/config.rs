//! Configuration
//!
//! [`GraphConfig`] tunes one provenance graph, [`ManagerConfig`] tunes a
//! graph manager. Both deserialize from TOML; missing keys take defaults.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration of one provenance graph
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Buffer size of the event channel
    pub event_capacity: usize,
    /// Maximum number of cached executors
    pub executor_cache_capacity: u64,
    /// Evict cached executors after this many seconds
    pub executor_cache_ttl_secs: Option<u64>,
    /// User recorded on actions whose metadata names none
    pub default_user: String,
}

impl GraphConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With event channel capacity
    #[inline]
    #[must_use]
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// With executor cache capacity
    #[inline]
    #[must_use]
    pub fn with_executor_cache_capacity(mut self, capacity: u64) -> Self {
        self.executor_cache_capacity = capacity;
        self
    }

    /// With executor cache time-to-live
    #[inline]
    #[must_use]
    pub fn with_executor_cache_ttl(mut self, ttl: Duration) -> Self {
        self.executor_cache_ttl_secs = Some(ttl.as_secs());
        self
    }

    /// With default user
    #[inline]
    #[must_use]
    pub fn with_default_user(mut self, user: impl Into<String>) -> Self {
        self.default_user = user.into();
        self
    }

    /// Executor cache time-to-live
    #[inline]
    #[must_use]
    pub fn executor_cache_ttl(&self) -> Option<Duration> {
        self.executor_cache_ttl_secs.map(Duration::from_secs)
    }

    /// Parse from TOML
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML for this structure
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            event_capacity: 256,
            executor_cache_capacity: 1024,
            executor_cache_ttl_secs: None,
            default_user: String::from("anonymous"),
        }
    }
}

/// Configuration of a graph manager
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Application the managed graphs belong to; listing filters by it
    pub application: String,
    /// Prefix of generated graph ids
    pub prefix: String,
    /// Permissions of new graphs
    pub default_permissions: u32,
    /// Creator recorded on new graphs
    pub creator: String,
}

impl ManagerConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With application name
    #[inline]
    #[must_use]
    pub fn with_application(mut self, application: impl Into<String>) -> Self {
        self.application = application.into();
        self
    }

    /// With id prefix
    #[inline]
    #[must_use]
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// With creator
    #[inline]
    #[must_use]
    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    /// Parse from TOML
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML for this structure
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            application: String::from("retrace"),
            prefix: String::from("retrace"),
            default_permissions: 0x1C0,
            creator: String::from("anonymous"),
        }
    }
}

/// Both configurations, as read from one file with `[graph]` and
/// `[manager]` tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetraceConfig {
    /// Graph settings
    pub graph: GraphConfig,
    /// Manager settings
    pub manager: ManagerConfig,
}

impl RetraceConfig {
    /// Parse from TOML
    ///
    /// # Errors
    /// Returns error if the text is not valid TOML for this structure
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(s)?)
    }
}
