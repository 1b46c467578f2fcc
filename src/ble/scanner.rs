//! BLE scanning functionality.
//!
//! Provides the scanner for discovering HDROP sensors by advertised name.

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral, PeripheralId};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, error, info, trace};

use crate::config::ClientConfig;
use crate::error::{Error, Result};

/// Event emitted when a device with the target name is discovered or updated.
#[derive(Debug, Clone)]
pub struct DeviceDiscoveryEvent {
    /// The BLE peripheral identifier.
    pub identifier: String,
    /// The peripheral handle.
    pub peripheral: Peripheral,
    /// Advertised local name.
    pub local_name: String,
    /// Signal strength in dBm.
    pub rssi: Option<i16>,
}

/// BLE scanner for discovering HDROP sensors.
pub struct BleScanner {
    /// The BLE adapter to use for scanning.
    adapter: Adapter,
    /// Settings holding the advertised name to match.
    config: Arc<ClientConfig>,
    /// Whether scanning is currently active.
    is_scanning: Arc<RwLock<bool>>,
    /// Matching peripherals seen so far.
    discovered: Arc<RwLock<HashMap<String, DeviceDiscoveryEvent>>>,
    /// Channel for discovery events.
    event_tx: broadcast::Sender<DeviceDiscoveryEvent>,
    /// Handle to the scanning task.
    scan_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl BleScanner {
    /// Create a new BLE scanner on the first available adapter.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new(config: ClientConfig) -> Result<Self> {
        let manager = Manager::new()
            .await
            .map_err(|_e| Error::BluetoothUnavailable)?;

        let adapters = manager.adapters().await.map_err(Error::Bluetooth)?;

        let adapter = adapters
            .into_iter()
            .next()
            .ok_or(Error::BluetoothUnavailable)?;

        info!(
            "Using Bluetooth adapter: {:?}",
            adapter.adapter_info().await.ok()
        );

        Ok(Self::with_adapter(adapter, config))
    }

    /// Create a new BLE scanner with a specific adapter.
    pub fn with_adapter(adapter: Adapter, config: ClientConfig) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            adapter,
            config: Arc::new(config),
            is_scanning: Arc::new(RwLock::new(false)),
            discovered: Arc::new(RwLock::new(HashMap::new())),
            event_tx,
            scan_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Start scanning.
    ///
    /// No service filter is applied: the sensor only advertises its name.
    ///
    /// # Errors
    ///
    /// Returns an error if scanning cannot be started.
    pub async fn start_scanning(&self) -> Result<()> {
        if *self.is_scanning.read() {
            debug!("Already scanning, ignoring start request");
            return Ok(());
        }

        info!("Starting BLE scan for {}", self.config.device_name);

        // Subscribe before starting the scan so no early event is missed
        let mut events = self.adapter.events().await.map_err(Error::Bluetooth)?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_scanning.write() = true;

        let adapter = self.adapter.clone();
        let config = self.config.clone();
        let is_scanning = self.is_scanning.clone();
        let discovered = self.discovered.clone();
        let event_tx = self.event_tx.clone();

        let handle = tokio::spawn(async move {
            while *is_scanning.read() {
                tokio::select! {
                    event = events.next() => {
                        let Some(event) = event else {
                            error!("Adapter event stream ended");
                            break;
                        };
                        Self::handle_event(
                            event,
                            &adapter,
                            &config,
                            &discovered,
                            &event_tx,
                        ).await;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {
                        if !*is_scanning.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Scan event loop ended");
        });

        *self.scan_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop scanning.
    pub async fn stop_scanning(&self) -> Result<()> {
        if !*self.is_scanning.read() {
            debug!("Not scanning, ignoring stop request");
            return Ok(());
        }

        info!("Stopping BLE scan");

        *self.is_scanning.write() = false;

        self.adapter.stop_scan().await.map_err(Error::Bluetooth)?;

        let handle = self.scan_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }

        Ok(())
    }

    /// Check if currently scanning.
    pub fn is_scanning(&self) -> bool {
        *self.is_scanning.read()
    }

    /// The advertised name this scanner is looking for.
    pub fn target_name(&self) -> &str {
        &self.config.device_name
    }

    /// Get all matching devices seen so far.
    pub fn discovered_devices(&self) -> HashMap<String, DeviceDiscoveryEvent> {
        self.discovered.read().clone()
    }

    /// Subscribe to discovery events.
    pub fn subscribe(&self) -> broadcast::Receiver<DeviceDiscoveryEvent> {
        self.event_tx.subscribe()
    }

    /// Get the underlying adapter.
    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Handle a BLE central event.
    async fn handle_event(
        event: CentralEvent,
        adapter: &Adapter,
        config: &ClientConfig,
        discovered: &Arc<RwLock<HashMap<String, DeviceDiscoveryEvent>>>,
        event_tx: &broadcast::Sender<DeviceDiscoveryEvent>,
    ) {
        match event {
            CentralEvent::DeviceDiscovered(id) => {
                trace!("Device discovered: {:?}", id);
                Self::process_peripheral(adapter, id, config, discovered, event_tx).await;
            }
            CentralEvent::DeviceUpdated(id) => {
                trace!("Device updated: {:?}", id);
                Self::process_peripheral(adapter, id, config, discovered, event_tx).await;
            }
            CentralEvent::DeviceConnected(id) => {
                debug!("Device connected: {:?}", id);
            }
            CentralEvent::DeviceDisconnected(id) => {
                debug!("Device disconnected: {:?}", id);
            }
            _ => {}
        }
    }

    /// Process a discovered peripheral.
    async fn process_peripheral(
        adapter: &Adapter,
        id: PeripheralId,
        config: &ClientConfig,
        discovered: &Arc<RwLock<HashMap<String, DeviceDiscoveryEvent>>>,
        event_tx: &broadcast::Sender<DeviceDiscoveryEvent>,
    ) {
        let peripheral = match adapter.peripheral(&id).await {
            Ok(p) => p,
            Err(e) => {
                trace!("Failed to get peripheral: {}", e);
                return;
            }
        };

        let properties = match peripheral.properties().await {
            Ok(Some(p)) => p,
            _ => return,
        };

        let Some(local_name) = properties.local_name else {
            return;
        };

        debug!("Found device: {}", local_name);

        if !config.matches_name(&local_name) {
            return;
        }

        let identifier = id.to_string();
        let event = DeviceDiscoveryEvent {
            identifier: identifier.clone(),
            peripheral,
            local_name,
            rssi: properties.rssi,
        };

        let is_new = discovered
            .write()
            .insert(identifier.clone(), event.clone())
            .is_none();
        if is_new {
            info!("Found {} ({})", config.device_name, identifier);
        }

        let _ = event_tx.send(event);
    }
}

impl Drop for BleScanner {
    fn drop(&mut self) {
        *self.is_scanning.write() = false;
    }
}
