//! GATT characteristic handling.
//!
//! Provides functionality for writing to and subscribing to
//! BLE characteristics on the sensor.

use btleplug::api::{Characteristic, Peripheral as _, WriteType};
use btleplug::platform::Peripheral;
use bytes::Bytes;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, trace};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Notification event from a characteristic.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// UUID of the characteristic that sent the notification.
    pub characteristic_uuid: Uuid,
    /// The notification data.
    pub data: Bytes,
}

/// Handler for GATT characteristics on a peripheral.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// Cached characteristics by UUID.
    characteristics: Arc<RwLock<HashMap<Uuid, Characteristic>>>,
    /// UUIDs of discovered services.
    services: Arc<RwLock<HashSet<Uuid>>>,
    /// Channel for notification events.
    notification_tx: broadcast::Sender<NotificationEvent>,
    /// Whether we're currently listening for notifications.
    is_listening: Arc<RwLock<bool>>,
    /// Handle to the notification listener task.
    listener_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    ///
    /// Services must be discovered before using this handler.
    pub fn new(peripheral: Peripheral, capacity: usize) -> Self {
        let (notification_tx, _) = broadcast::channel(capacity.max(1));

        Self {
            peripheral,
            characteristics: Arc::new(RwLock::new(HashMap::new())),
            services: Arc::new(RwLock::new(HashSet::new())),
            notification_tx,
            is_listening: Arc::new(RwLock::new(false)),
            listener_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Discover and cache all characteristics.
    pub fn discover_characteristics(&self) {
        let mut chars = self.characteristics.write();
        let mut services = self.services.write();
        chars.clear();
        services.clear();

        for service in self.peripheral.services() {
            services.insert(service.uuid);
            for characteristic in service.characteristics {
                debug!(
                    "Found characteristic: {} in service {}",
                    characteristic.uuid, service.uuid
                );
                chars.insert(characteristic.uuid, characteristic);
            }
        }

        debug!(
            "Discovered {} characteristics in {} services",
            chars.len(),
            services.len()
        );
    }

    /// Check if a service was discovered.
    pub fn has_service(&self, uuid: &Uuid) -> bool {
        self.services.read().contains(uuid)
    }

    /// Check if a characteristic exists.
    pub fn has_characteristic(&self, uuid: &Uuid) -> bool {
        self.characteristics.read().contains_key(uuid)
    }

    /// Get a characteristic by UUID.
    pub fn get_characteristic(&self, uuid: &Uuid) -> Result<Characteristic> {
        self.characteristics
            .read()
            .get(uuid)
            .cloned()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: uuid.to_string(),
            })
    }

    /// Write to a characteristic.
    pub async fn write(&self, uuid: &Uuid, data: &[u8], with_response: bool) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        let write_type = if with_response {
            WriteType::WithResponse
        } else {
            WriteType::WithoutResponse
        };

        self.peripheral
            .write(&characteristic, data, write_type)
            .await
            .map_err(Error::Bluetooth)?;

        trace!("Wrote {} bytes to characteristic {}", data.len(), uuid);

        Ok(())
    }

    /// Subscribe to notifications from a characteristic.
    pub async fn subscribe(&self, uuid: &Uuid) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        debug!(
            "Subscribing to {}, properties: {:?}",
            uuid, characteristic.properties
        );

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Subscribed to notifications from {}", uuid);

        Ok(())
    }

    /// Unsubscribe from notifications from a characteristic.
    pub async fn unsubscribe(&self, uuid: &Uuid) -> Result<()> {
        let characteristic = self.get_characteristic(uuid)?;

        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from notifications from {}", uuid);

        Ok(())
    }

    /// Start listening for notifications.
    ///
    /// Notifications are sent through the channel returned by
    /// [`subscribe_notifications`](Self::subscribe_notifications).
    pub async fn start_notifications(&self) -> Result<()> {
        if *self.is_listening.read() {
            return Ok(());
        }

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(Error::Bluetooth)?;

        *self.is_listening.write() = true;

        let is_listening = self.is_listening.clone();
        let notification_tx = self.notification_tx.clone();

        let handle = tokio::spawn(async move {
            debug!("Notification listener started");

            while *is_listening.read() {
                tokio::select! {
                    notification = notifications.next() => {
                        let Some(notification) = notification else {
                            error!("Notification stream ended");
                            break;
                        };

                        trace!(
                            "Notification from {}: {:02X?}",
                            notification.uuid,
                            notification.value
                        );

                        let _ = notification_tx.send(NotificationEvent {
                            characteristic_uuid: notification.uuid,
                            data: Bytes::from(notification.value),
                        });
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                        if !*is_listening.read() {
                            break;
                        }
                    }
                }
            }

            *is_listening.write() = false;
            debug!("Notification listener stopped");
        });

        *self.listener_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop listening for notifications.
    pub async fn stop_notifications(&self) {
        *self.is_listening.write() = false;

        let handle = self.listener_handle.write().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Get a receiver for notification events.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationEvent> {
        self.notification_tx.subscribe()
    }
}

impl Drop for CharacteristicHandler {
    fn drop(&mut self) {
        *self.is_listening.write() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::uuids::HYDRATION_DATA_UUID;

    #[test]
    fn test_notification_event_clone() {
        let event = NotificationEvent {
            characteristic_uuid: HYDRATION_DATA_UUID,
            data: Bytes::from_static(&[0x34, 0x12]),
        };
        let cloned = event.clone();
        assert_eq!(event.characteristic_uuid, cloned.characteristic_uuid);
        assert_eq!(event.data, cloned.data);
    }
}
