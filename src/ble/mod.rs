//! BLE communication module.
//!
//! This module provides low-level Bluetooth Low Energy functionality
//! for discovering and communicating with HDROP sensors.

pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod uuids;

pub use characteristics::{CharacteristicHandler, NotificationEvent};
pub use connection::{ConnectionEvent, ConnectionManager, ConnectionState};
pub use scanner::{BleScanner, DeviceDiscoveryEvent};
pub use uuids::*;
