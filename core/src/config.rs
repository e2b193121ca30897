//! Table configuration.
//!
//! A table is configured either programmatically through [`TableConfig::new`]
//! and the `with_*` methods, or from a string-keyed property map (the format
//! Kafka clients use) through [`TableConfig::from_properties`].
//!
//! # Recognised properties
//!
//! | Key | Type | Default | Effect |
//! |---|---|---|---|
//! | `topic` | string | required | topic to subscribe to |
//! | `highwater.timeout` | float seconds | 30 | max wait for catch-up |
//! | `compacted.cache` | bool | true | maintain the compacted cache while catching up |
//! | `poll.timeout` | float seconds | 1 | bound on each poll, and on `stop()` latency |
//!
//! Every other key (`bootstrap.servers`, `group.id`, ...) is kept in
//! [`TableConfig::client_properties`] and handed to the collaborator consumer.

use crate::error::ConfigError;
use std::collections::BTreeMap;
use std::time::Duration;

/// Property key for the topic name.
pub const TOPIC: &str = "topic";
/// Property key for the highwater timeout, in seconds.
pub const HIGHWATER_TIMEOUT: &str = "highwater.timeout";
/// Property key toggling the compacted cache.
pub const COMPACTED_CACHE: &str = "compacted.cache";
/// Property key for the poll timeout, in seconds.
pub const POLL_TIMEOUT: &str = "poll.timeout";

/// Default maximum wait for the highwater.
pub const DEFAULT_HIGHWATER_TIMEOUT: Duration = Duration::from_secs(30);
/// Default bound on a single poll.
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration of an event-sourced table.
///
/// # Example
///
/// ```
/// use eventsource_core::config::TableConfig;
/// use std::time::Duration;
///
/// let config = TableConfig::new("alarm-instances")
///     .with_highwater_timeout(Duration::from_secs(5))
///     .with_compacted_cache(false)
///     .with_client_property("bootstrap.servers", "localhost:9092");
///
/// assert!(config.validate().is_ok());
/// assert_eq!(config.client_properties["bootstrap.servers"], "localhost:9092");
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableConfig {
    /// Topic to subscribe to
    pub topic: String,
    /// Maximum wait for every assigned partition to reach its highwater
    pub highwater_timeout: Duration,
    /// Whether to maintain the compacted cache during catch-up
    pub compacted_cache: bool,
    /// Bound on a single poll; also the worst-case latency of `stop()`
    pub poll_timeout: Duration,
    /// Properties passed through to the collaborator consumer
    pub client_properties: BTreeMap<String, String>,
}

impl TableConfig {
    /// Create a configuration for `topic` with default options.
    #[must_use]
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            highwater_timeout: DEFAULT_HIGHWATER_TIMEOUT,
            compacted_cache: true,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            client_properties: BTreeMap::new(),
        }
    }

    /// Set the highwater timeout.
    #[must_use]
    pub const fn with_highwater_timeout(mut self, timeout: Duration) -> Self {
        self.highwater_timeout = timeout;
        self
    }

    /// Enable or disable the compacted cache.
    #[must_use]
    pub const fn with_compacted_cache(mut self, enabled: bool) -> Self {
        self.compacted_cache = enabled;
        self
    }

    /// Set the poll timeout.
    #[must_use]
    pub const fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout = timeout;
        self
    }

    /// Add a property for the collaborator consumer.
    #[must_use]
    pub fn with_client_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.client_properties.insert(key.into(), value.into());
        self
    }

    /// Build a configuration from a string-keyed property map.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingTopic`] if `topic` is absent, or
    /// [`ConfigError::InvalidValue`] if a recognised option cannot be parsed.
    ///
    /// # Example
    ///
    /// ```
    /// use eventsource_core::config::TableConfig;
    /// use std::time::Duration;
    ///
    /// let config = TableConfig::from_properties([
    ///     ("topic", "alarm-classes"),
    ///     ("highwater.timeout", "2.5"),
    ///     ("group.id", "console"),
    /// ])?;
    ///
    /// assert_eq!(config.highwater_timeout, Duration::from_millis(2500));
    /// assert!(config.compacted_cache);
    /// assert_eq!(config.client_properties["group.id"], "console");
    /// # Ok::<(), eventsource_core::ConfigError>(())
    /// ```
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut topic = None;
        let mut config = Self::new(String::new());

        for (key, value) in properties {
            let key = key.into();
            let value = value.into();
            match key.as_str() {
                TOPIC => topic = Some(value),
                HIGHWATER_TIMEOUT => config.highwater_timeout = parse_seconds(&key, &value)?,
                POLL_TIMEOUT => config.poll_timeout = parse_seconds(&key, &value)?,
                COMPACTED_CACHE => config.compacted_cache = parse_bool(&key, &value)?,
                _ => {
                    config.client_properties.insert(key, value);
                }
            }
        }

        config.topic = topic.ok_or(ConfigError::MissingTopic)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the configuration for values the table cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingTopic`] for an empty topic, or
    /// [`ConfigError::InvalidValue`] for a zero timeout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::MissingTopic);
        }
        if self.highwater_timeout.is_zero() {
            return Err(invalid(HIGHWATER_TIMEOUT, "0", "must be positive"));
        }
        if self.poll_timeout.is_zero() {
            return Err(invalid(POLL_TIMEOUT, "0", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration, ConfigError> {
    let seconds: f64 = value
        .trim()
        .parse()
        .map_err(|e| invalid(key, value, &format!("expected seconds: {e}")))?;
    if seconds <= 0.0 {
        return Err(invalid(key, value, "must be positive"));
    }
    Duration::try_from_secs_f64(seconds).map_err(|e| invalid(key, value, &e.to_string()))
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(key, value, "expected a boolean")),
    }
}
