//! BLE connection management.
//!
//! Tracks the connection state of the sensor. A connection is attempted
//! once; after a drop the state returns to `Disconnected` and it is up to the
//! caller to scan again.

use btleplug::api::{Central, CentralEvent, Peripheral as _};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::error::{Error, Result};

/// Connection state for the sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Not connected.
    #[default]
    Disconnected,
    /// Currently attempting to connect.
    Connecting,
    /// Connected.
    Connected,
    /// Currently disconnecting.
    Disconnecting,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if in a transitional state.
    pub fn is_transitioning(&self) -> bool {
        matches!(self, Self::Connecting | Self::Disconnecting)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Disconnecting => write!(f, "Disconnecting"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Shared state cell that publishes a [`ConnectionEvent`] on every change.
#[derive(Clone)]
struct StateCell {
    identifier: String,
    state: Arc<RwLock<ConnectionState>>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl StateCell {
    fn new(identifier: String) -> Self {
        let (event_tx, _) = broadcast::channel(16);
        Self {
            identifier,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
        }
    }

    fn get(&self) -> ConnectionState {
        *self.state.read()
    }

    fn set(&self, new_state: ConnectionState) {
        let old_state = std::mem::replace(&mut *self.state.write(), new_state);

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                identifier: self.identifier.clone(),
                state: new_state,
            });
        }
    }

    fn mark_lost(&self) {
        if self.get() != ConnectionState::Disconnected {
            warn!("Device disconnected");
        }
        self.set(ConnectionState::Disconnected);
    }
}

/// Manages the connection to the sensor.
pub struct ConnectionManager {
    /// The peripheral to manage.
    peripheral: Peripheral,
    /// Current connection state.
    state: StateCell,
    /// Handle to the disconnect watcher task.
    watch_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Create a new connection manager for a peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        let identifier = peripheral.id().to_string();

        Self {
            peripheral,
            state: StateCell::new(identifier),
            watch_handle: RwLock::new(None),
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.state.event_tx.subscribe()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Connect and discover services.
    ///
    /// A single attempt is made.
    pub async fn connect(&self) -> Result<()> {
        let current_state = self.state.get();

        if current_state.is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        if current_state.is_transitioning() {
            return Err(Error::ConnectionFailed {
                reason: "Connection already in progress".to_string(),
            });
        }

        self.state.set(ConnectionState::Connecting);

        if !self.peripheral.is_connected().await.unwrap_or(false) {
            if let Err(e) = self.peripheral.connect().await {
                warn!("Connection attempt failed: {}", e);
                self.state.set(ConnectionState::Disconnected);
                return Err(Error::ConnectionFailed {
                    reason: e.to_string(),
                });
            }
        } else {
            info!("Peripheral already connected at BLE level");
        }

        info!("Connected to device");

        if let Err(e) = self.peripheral.discover_services().await {
            error!("Failed to discover services: {}", e);
            let _ = self.peripheral.disconnect().await;
            self.state.set(ConnectionState::Disconnected);
            return Err(Error::Bluetooth(e));
        }

        self.state.set(ConnectionState::Connected);
        Ok(())
    }

    /// Disconnect from the device.
    pub async fn disconnect(&self) -> Result<()> {
        let current_state = self.state.get();

        if matches!(
            current_state,
            ConnectionState::Disconnected | ConnectionState::Disconnecting
        ) {
            return Ok(());
        }

        self.state.set(ConnectionState::Disconnecting);

        let result = self.peripheral.disconnect().await;
        self.state.set(ConnectionState::Disconnected);

        match result {
            Ok(_) => {
                info!("Disconnected from device");
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                Err(Error::Bluetooth(e))
            }
        }
    }

    /// Watch the adapter for this peripheral dropping its connection.
    pub async fn watch_disconnects(&self, adapter: &Adapter) -> Result<()> {
        let mut events = adapter.events().await.map_err(Error::Bluetooth)?;
        let id = self.peripheral.id();
        let state = self.state.clone();

        let handle = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(disconnected) = event {
                    if disconnected == id {
                        state.mark_lost();
                    }
                }
            }
            debug!("Disconnect watcher stopped");
        });

        if let Some(old) = self.watch_handle.write().replace(handle) {
            old.abort();
        }

        Ok(())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(handle) = self.watch_handle.write().take() {
            handle.abort();
        }
    }
}
