//! Configuration types for the cube bridge

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default advertisement scan window
pub const DEFAULT_SCAN_WINDOW: Duration = Duration::from_secs(3);

/// Default capacity of the command and device event channels
pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Default welcome string sent to a newly connected peer
pub const DEFAULT_WELCOME: &str = "cubelink";

/// Bridge configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// How long one advertisement scan suspends its caller
    #[serde(with = "humantime_serde", default = "default_scan_window")]
    pub scan_window: Duration,

    /// Capacity of the command and device event channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,

    /// Welcome string sent to every newly connected peer
    #[serde(default = "default_welcome")]
    pub welcome: String,
}

fn default_scan_window() -> Duration {
    DEFAULT_SCAN_WINDOW
}

fn default_channel_capacity() -> usize {
    DEFAULT_CHANNEL_CAPACITY
}

fn default_welcome() -> String {
    DEFAULT_WELCOME.to_string()
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            scan_window: DEFAULT_SCAN_WINDOW,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            welcome: DEFAULT_WELCOME.to_string(),
        }
    }
}

/// Builder for [`BridgeConfig`]
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    config: BridgeConfig,
}

impl BridgeConfigBuilder {
    /// Create a builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the scan window
    pub fn scan_window(mut self, window: Duration) -> Self {
        self.config.scan_window = window;
        self
    }

    /// Set the channel capacity
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity.max(1);
        self
    }

    /// Set the welcome string
    pub fn welcome(mut self, welcome: impl Into<String>) -> Self {
        self.config.welcome = welcome.into();
        self
    }

    /// Build the configuration
    pub fn build(self) -> BridgeConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.scan_window, Duration::from_secs(3));
        assert_eq!(config.channel_capacity, DEFAULT_CHANNEL_CAPACITY);
        assert_eq!(config.welcome, DEFAULT_WELCOME);
    }

    #[test]
    fn test_config_builder() {
        let config = BridgeConfigBuilder::new()
            .scan_window(Duration::from_secs(10))
            .channel_capacity(0)
            .welcome("hello")
            .build();

        assert_eq!(config.scan_window, Duration::from_secs(10));
        // capacity is clamped to a workable minimum
        assert_eq!(config.channel_capacity, 1);
        assert_eq!(config.welcome, "hello");
    }

    #[test]
    fn test_scan_window_serde_round_trip() {
        let json = r#"{"scan_window": "3s", "welcome": "hi"}"#;
        let config: BridgeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.scan_window, Duration::from_secs(3));
        assert_eq!(config.welcome, "hi");

        let text = serde_json::to_string(&config).unwrap();
        assert!(text.contains("\"3s\""));
    }
}
