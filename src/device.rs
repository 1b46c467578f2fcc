//! HDROP sensor device.
//!
//! Represents one connected HDROP-580: powers its sensors on, subscribes to
//! the hydration and temperature characteristics and turns each notification
//! into a [`Reading`].

use btleplug::platform::{Adapter, Peripheral};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, trace, warn};

use crate::ble::characteristics::{CharacteristicHandler, NotificationEvent};
use crate::ble::connection::{ConnectionEvent, ConnectionManager, ConnectionState};
use crate::ble::uuids::*;
use crate::config::ClientConfig;
use crate::data::{Channel, Reading};
use crate::error::{Error, Result};
use crate::protocol::sfloat;

/// Callback handle for unregistering callbacks.
pub struct CallbackHandle {
    id: u64,
    unregister_fn: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl CallbackHandle {
    /// Create a new callback handle.
    pub(crate) fn new(id: u64, unregister_fn: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            id,
            unregister_fn: Some(Box::new(unregister_fn)),
        }
    }

    /// Unregister this callback.
    pub fn unregister(mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }

    /// Get the callback ID.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for CallbackHandle {
    fn drop(&mut self) {
        if let Some(f) = self.unregister_fn.take() {
            f();
        }
    }
}

/// Turn a raw notification into a reading.
///
/// Returns `Ok(None)` for characteristics that carry no sensor data.
///
/// # Errors
///
/// Returns [`Error::InvalidPayload`] if the payload is shorter than two bytes.
pub fn decode_notification(
    event: &NotificationEvent,
    timestamp: DateTime<Local>,
) -> Result<Option<Reading>> {
    let Some(channel) = Channel::from_characteristic(&event.characteristic_uuid) else {
        return Ok(None);
    };

    let raw = sfloat::decode(&event.data)?;
    Ok(Some(Reading::new(timestamp, channel, raw)))
}

/// Mutable state shared with the decode task.
#[derive(Default)]
struct DeviceState {
    /// Most recent reading per channel.
    latest: HashMap<Channel, Reading>,
    /// Whether the sensors were last switched on.
    sensors_enabled: bool,
    /// Notifications discarded because they could not be decoded.
    discarded: u64,
}

/// Decode notifications until the notification channel closes.
///
/// Valid readings update `latest` and are broadcast on `reading_tx`. Short
/// payloads are counted in `discarded`; other characteristics are skipped.
async fn run_decoder(
    mut rx: broadcast::Receiver<NotificationEvent>,
    state: Arc<RwLock<DeviceState>>,
    reading_tx: broadcast::Sender<Reading>,
) {
    debug!("Decode task started");
    loop {
        let event = match rx.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Decoder lagged, {} notifications dropped", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        match decode_notification(&event, Local::now()) {
            Ok(Some(reading)) => {
                trace!("{}", reading);
                state.write().latest.insert(reading.channel, reading.clone());
                let _ = reading_tx.send(reading);
            }
            Ok(None) => {
                trace!("Ignoring notification from {}", event.characteristic_uuid);
            }
            Err(e) => {
                state.write().discarded += 1;
                warn!(
                    "Discarding notification from {}: {}",
                    event.characteristic_uuid, e
                );
            }
        }
    }
    debug!("Decode task stopped");
}

/// A single HDROP hydration sensor.
pub struct HydrationDevice {
    /// BLE identifier.
    identifier: String,
    /// Advertised local name.
    local_name: String,
    /// Signal strength at discovery.
    rssi: Option<i16>,
    /// Adapter the device was found on.
    adapter: Adapter,
    /// Client settings.
    config: ClientConfig,
    /// Internal state.
    state: Arc<RwLock<DeviceState>>,
    /// Connection manager.
    connection: Arc<ConnectionManager>,
    /// Characteristic handler, present while connected.
    characteristics: RwLock<Option<Arc<CharacteristicHandler>>>,
    /// Decoded reading channel.
    reading_tx: broadcast::Sender<Reading>,
    /// Decode task handle.
    decode_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
    /// Callback ID counter.
    callback_counter: AtomicU64,
}

impl HydrationDevice {
    /// Create a device handle for a discovered peripheral.
    pub(crate) fn new(
        identifier: String,
        local_name: String,
        rssi: Option<i16>,
        peripheral: Peripheral,
        adapter: Adapter,
        config: ClientConfig,
    ) -> Self {
        let (reading_tx, _) = broadcast::channel(config.reading_capacity.max(1));

        Self {
            identifier,
            local_name,
            rssi,
            adapter,
            config,
            state: Arc::new(RwLock::new(DeviceState::default())),
            connection: Arc::new(ConnectionManager::new(peripheral)),
            characteristics: RwLock::new(None),
            reading_tx,
            decode_handle: RwLock::new(None),
            callback_counter: AtomicU64::new(0),
        }
    }

    // === Identification ===

    /// Get the BLE identifier.
    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    /// Get the advertised local name.
    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Get the signal strength seen at discovery.
    pub fn rssi(&self) -> Option<i16> {
        self.rssi
    }

    // === Connection ===

    /// Get the current connection state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// Subscribe to connection state changes.
    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connection.subscribe()
    }

    /// Connect, switch the sensors on and start receiving readings.
    ///
    /// # Errors
    ///
    /// Fails if the connection cannot be made, if the device does not expose
    /// the HDROP service, or if the sensor write or a subscription fails. The
    /// connection is dropped again on any failure after connecting.
    pub async fn connect(&self) -> Result<()> {
        info!("Connecting to {} ({})", self.local_name, self.identifier);

        self.connection.connect().await?;

        if let Err(e) = self.connection.watch_disconnects(&self.adapter).await {
            warn!("Cannot watch for disconnects: {}", e);
        }

        let handler = Arc::new(CharacteristicHandler::new(
            self.connection.peripheral().clone(),
            self.config.notification_capacity,
        ));

        if let Err(e) = self.start_sensors(&handler).await {
            self.stop_decoding();
            handler.stop_notifications().await;
            let _ = self.connection.disconnect().await;
            return Err(e);
        }

        *self.characteristics.write() = Some(handler);

        info!("{} streaming readings", self.local_name);

        Ok(())
    }

    async fn start_sensors(&self, handler: &CharacteristicHandler) -> Result<()> {
        handler.discover_characteristics();

        if !handler.has_service(&HDROP_SERVICE_UUID) {
            return Err(Error::ServiceNotFound {
                uuid: HDROP_SERVICE_UUID.to_string(),
            });
        }

        // Decode task must be listening before the first notification arrives
        self.start_decoding(handler);

        handler.write(&SENSOR_CONFIG_UUID, &SENSORS_ON, true).await?;
        self.state.write().sensors_enabled = true;
        info!("Sensors are ON");

        for channel in Channel::ALL {
            handler.subscribe(&channel.characteristic_uuid()).await?;
        }

        handler.start_notifications().await
    }

    /// Spawn the task that decodes notifications into readings.
    fn start_decoding(&self, handler: &CharacteristicHandler) {
        let handle = tokio::spawn(run_decoder(
            handler.subscribe_notifications(),
            self.state.clone(),
            self.reading_tx.clone(),
        ));

        if let Some(old) = self.decode_handle.write().replace(handle) {
            old.abort();
        }
    }

    fn stop_decoding(&self) {
        if let Some(handle) = self.decode_handle.write().take() {
            handle.abort();
        }
    }

    /// Switch the sensor subsystem on or off.
    pub async fn set_sensors_enabled(&self, enabled: bool) -> Result<()> {
        let handler = self.handler()?;

        let value = if enabled { &SENSORS_ON } else { &SENSORS_OFF };
        handler.write(&SENSOR_CONFIG_UUID, value, true).await?;

        self.state.write().sensors_enabled = enabled;
        info!("Sensors are {}", if enabled { "ON" } else { "OFF" });

        Ok(())
    }

    /// Whether the sensors were last switched on.
    pub fn sensors_enabled(&self) -> bool {
        self.state.read().sensors_enabled
    }

    /// Disconnect from the device.
    ///
    /// Sensors are switched off first if the link is still up.
    pub async fn disconnect(&self) -> Result<()> {
        info!("Disconnecting from {}", self.local_name);

        let handler = self.characteristics.write().take();
        if let Some(handler) = handler {
            if self.connection.is_connected() {
                for channel in Channel::ALL {
                    if let Err(e) = handler.unsubscribe(&channel.characteristic_uuid()).await {
                        debug!("Unsubscribe from {} failed: {}", channel, e);
                    }
                }
                if let Err(e) = handler.write(&SENSOR_CONFIG_UUID, &SENSORS_OFF, true).await {
                    debug!("Failed to switch sensors off: {}", e);
                }
            }
            handler.stop_notifications().await;
        }

        self.stop_decoding();
        self.state.write().sensors_enabled = false;

        self.connection.disconnect().await
    }

    fn handler(&self) -> Result<Arc<CharacteristicHandler>> {
        if !self.connection.is_connected() {
            return Err(Error::NotConnected);
        }
        self.characteristics
            .read()
            .clone()
            .ok_or(Error::NotConnected)
    }

    // === Readings ===

    /// Get the latest reading received on a channel.
    pub fn latest_reading(&self, channel: Channel) -> Option<Reading> {
        self.state.read().latest.get(&channel).cloned()
    }

    /// Number of notifications discarded as undecodable.
    pub fn discarded_notifications(&self) -> u64 {
        self.state.read().discarded
    }

    /// Subscribe to decoded readings.
    pub fn subscribe_readings(&self) -> broadcast::Receiver<Reading> {
        self.reading_tx.subscribe()
    }

    /// Register a callback for decoded readings.
    pub fn on_reading<F>(&self, callback: F) -> CallbackHandle
    where
        F: Fn(&Reading) + Send + Sync + 'static,
    {
        let callback_id = self.callback_counter.fetch_add(1, Ordering::SeqCst);
        let mut rx = self.reading_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(reading) => callback(&reading),
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        CallbackHandle::new(callback_id, move || {
            handle.abort();
        })
    }
}

impl Drop for HydrationDevice {
    fn drop(&mut self) {
        self.stop_decoding();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::AtomicBool;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2019, 4, 15, 10, 30, 5).unwrap()
    }

    fn event(uuid: uuid::Uuid, data: &'static [u8]) -> NotificationEvent {
        NotificationEvent {
            characteristic_uuid: uuid,
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn test_decode_hydration_notification() {
        let reading = decode_notification(&event(HYDRATION_DATA_UUID, &[0x34, 0x12]), at())
            .unwrap()
            .unwrap();

        assert_eq!(reading, Reading::new(at(), Channel::Hydration, 1128.0));
        assert_eq!(reading.value, 1128.0);
    }

    #[test]
    fn test_decode_temperature_notification_is_scaled() {
        // 1023 = 0x03FF, exponent 0
        let reading = decode_notification(&event(TEMPERATURE_DATA_UUID, &[0xFF, 0x03]), at())
            .unwrap()
            .unwrap();

        assert_eq!(reading.channel, Channel::Temperature);
        assert_eq!(reading.raw, 1023.0);
        assert!((reading.value - 3.6).abs() < 1e-12);
    }

    #[test]
    fn test_decode_unknown_characteristic() {
        let result = decode_notification(&event(SENSOR_CONFIG_UUID, &[0x01]), at()).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_decode_short_notification() {
        let result = decode_notification(&event(HYDRATION_DATA_UUID, &[0x01]), at());
        assert!(matches!(result, Err(Error::InvalidPayload { len: 1 })));
    }

    #[tokio::test]
    async fn test_decoder_updates_state_and_broadcasts() {
        let (notify_tx, notify_rx) = broadcast::channel(8);
        let (reading_tx, mut reading_rx) = broadcast::channel(8);
        let state = Arc::new(RwLock::new(DeviceState::default()));

        notify_tx.send(event(HYDRATION_DATA_UUID, &[0x34, 0x12])).unwrap();
        notify_tx.send(event(TEMPERATURE_DATA_UUID, &[0x01])).unwrap();
        notify_tx.send(event(SENSOR_CONFIG_UUID, &[0x01])).unwrap();
        drop(notify_tx);

        run_decoder(notify_rx, state.clone(), reading_tx).await;

        {
            let state = state.read();
            assert_eq!(state.latest.len(), 1);
            let hydration = &state.latest[&Channel::Hydration];
            assert_eq!(hydration.value, 1128.0);
            assert!(!state.latest.contains_key(&Channel::Temperature));
            assert_eq!(state.discarded, 1);
        }

        let reading = reading_rx.try_recv().unwrap();
        assert_eq!(reading.channel, Channel::Hydration);
        assert_eq!(reading.value, 1128.0);
        assert!(reading_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_decoder_keeps_latest_per_channel() {
        let (notify_tx, notify_rx) = broadcast::channel(8);
        let (reading_tx, mut reading_rx) = broadcast::channel(8);
        let state = Arc::new(RwLock::new(DeviceState::default()));

        notify_tx.send(event(HYDRATION_DATA_UUID, &[0x01, 0x00])).unwrap();
        notify_tx.send(event(TEMPERATURE_DATA_UUID, &[0xFF, 0x03])).unwrap();
        notify_tx.send(event(HYDRATION_DATA_UUID, &[0x34, 0x12])).unwrap();
        drop(notify_tx);

        run_decoder(notify_rx, state.clone(), reading_tx).await;

        let state = state.read();
        assert_eq!(state.latest[&Channel::Hydration].value, 1128.0);
        assert!((state.latest[&Channel::Temperature].value - 3.6).abs() < 1e-12);
        assert_eq!(state.discarded, 0);

        let channels: Vec<Channel> = std::iter::from_fn(|| reading_rx.try_recv().ok())
            .map(|r| r.channel)
            .collect();
        assert_eq!(
            channels,
            vec![Channel::Hydration, Channel::Temperature, Channel::Hydration]
        );
    }

    #[test]
    fn test_callback_handle_unregisters_once() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        let handle = CallbackHandle::new(7, move || flag.store(true, Ordering::SeqCst));

        assert_eq!(handle.id(), 7);
        handle.unregister();
        assert!(called.load(Ordering::SeqCst));
    }

    #[test]
    fn test_callback_handle_drop_unregisters() {
        let called = Arc::new(AtomicBool::new(false));
        let flag = called.clone();
        drop(CallbackHandle::new(0, move || flag.store(true, Ordering::SeqCst)));
        assert!(called.load(Ordering::SeqCst));
    }
}
