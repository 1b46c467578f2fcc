//! Client configuration.
//!
//! Protocol constants live in [`crate::ble::uuids`]; the values here are the
//! knobs a caller may reasonably want to change.

use std::time::Duration;

use crate::ble::uuids::HDROP_DEVICE_NAME;

/// Default time to scan for the device before giving up.
pub const DEFAULT_SCAN_TIMEOUT: Duration = Duration::from_secs(30);

/// Default capacity of the decoded reading broadcast channel.
pub const DEFAULT_READING_CAPACITY: usize = 64;

/// Default capacity of the raw notification broadcast channel.
pub const DEFAULT_NOTIFICATION_CAPACITY: usize = 256;

/// Settings for discovering and talking to an HDROP sensor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Advertised local name to connect to.
    pub device_name: String,
    /// How long `find_device` scans before returning `DeviceNotFound`.
    pub scan_timeout: Duration,
    /// Buffer size for decoded reading subscribers.
    pub reading_capacity: usize,
    /// Buffer size for raw characteristic notifications.
    pub notification_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device_name: HDROP_DEVICE_NAME.to_string(),
            scan_timeout: DEFAULT_SCAN_TIMEOUT,
            reading_capacity: DEFAULT_READING_CAPACITY,
            notification_capacity: DEFAULT_NOTIFICATION_CAPACITY,
        }
    }
}

impl ClientConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Match a different advertised name.
    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    /// Change the scan timeout.
    pub fn with_scan_timeout(mut self, timeout: Duration) -> Self {
        self.scan_timeout = timeout;
        self
    }

    /// Change the reading channel capacity (minimum 1).
    pub fn with_reading_capacity(mut self, capacity: usize) -> Self {
        self.reading_capacity = capacity.max(1);
        self
    }

    /// Change the notification channel capacity (minimum 1).
    pub fn with_notification_capacity(mut self, capacity: usize) -> Self {
        self.notification_capacity = capacity.max(1);
        self
    }

    /// Whether an advertised local name is the configured target.
    ///
    /// The match is exact and case-sensitive.
    pub fn matches_name(&self, name: &str) -> bool {
        name == self.device_name
    }
}
