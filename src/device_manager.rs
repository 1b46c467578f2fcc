//! Device manager for discovering the HDROP sensor.
//!
//! Owns the BLE scanner and hands out a [`HydrationDevice`] once a
//! peripheral advertising the configured name has been seen. Only one
//! device is managed at a time.

use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ble::scanner::{BleScanner, DeviceDiscoveryEvent};
use crate::config::ClientConfig;
use crate::device::HydrationDevice;
use crate::error::{Error, Result};

/// Central manager for finding and holding the sensor.
pub struct DeviceManager {
    /// BLE scanner.
    scanner: BleScanner,
    /// Client settings.
    config: ClientConfig,
    /// The device found by the last successful search.
    device: RwLock<Option<Arc<HydrationDevice>>>,
}

impl DeviceManager {
    /// Create a new DeviceManager with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        Self::with_config(ClientConfig::default()).await
    }

    /// Create a new DeviceManager with custom settings.
    pub async fn with_config(config: ClientConfig) -> Result<Self> {
        let scanner = BleScanner::new(config.clone()).await?;

        Ok(Self {
            scanner,
            config,
            device: RwLock::new(None),
        })
    }

    /// The active settings.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Scan until the configured device is found or the scan timeout passes.
    ///
    /// Scanning is stopped before returning in either case.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DeviceNotFound`] on timeout, or a Bluetooth error if
    /// the scan could not be started.
    pub async fn find_device(&self) -> Result<Arc<HydrationDevice>> {
        info!("Start scanning");

        let mut rx = self.scanner.subscribe();
        self.scanner.start_scanning().await?;

        let found = tokio::time::timeout(self.config.scan_timeout, Self::next_match(&mut rx)).await;

        if let Err(e) = self.scanner.stop_scanning().await {
            warn!("Failed to stop scanning: {}", e);
        }

        let event = match found {
            Ok(Some(event)) => event,
            Ok(None) | Err(_) => {
                return Err(Error::DeviceNotFound {
                    name: self.config.device_name.clone(),
                });
            }
        };

        info!("Found {}", event.local_name);

        let device = Arc::new(HydrationDevice::new(
            event.identifier,
            event.local_name,
            event.rssi,
            event.peripheral,
            self.scanner.adapter().clone(),
            self.config.clone(),
        ));

        *self.device.write() = Some(device.clone());

        Ok(device)
    }

    /// Find the device and connect to it.
    pub async fn connect(&self) -> Result<Arc<HydrationDevice>> {
        let device = self.find_device().await?;
        device.connect().await?;
        Ok(device)
    }

    async fn next_match(
        rx: &mut broadcast::Receiver<DeviceDiscoveryEvent>,
    ) -> Option<DeviceDiscoveryEvent> {
        loop {
            match rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Discovery receiver lagged by {}", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// The device found by the last search, if any.
    pub fn device(&self) -> Option<Arc<HydrationDevice>> {
        self.device.read().clone()
    }

    /// Check if scanning is active.
    pub fn is_scanning(&self) -> bool {
        self.scanner.is_scanning()
    }

    /// Stop scanning and disconnect the device.
    pub async fn shutdown(&self) -> Result<()> {
        info!("Shutting down device manager");

        if let Err(e) = self.scanner.stop_scanning().await {
            warn!("Failed to stop scanning: {}", e);
        }

        let device = self.device.write().take();
        if let Some(device) = device {
            if let Err(e) = device.disconnect().await {
                warn!("Error disconnecting {}: {}", device.identifier(), e);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_match_returns_none_when_closed() {
        let (tx, mut rx) = broadcast::channel::<DeviceDiscoveryEvent>(1);
        drop(tx);
        let found = tokio_test::block_on(DeviceManager::next_match(&mut rx));
        assert!(found.is_none());
    }
}
