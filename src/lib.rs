// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # hdrop-ble
//!
//! A Rust client for the HDROP-580 hydration sensor, a Dialog DA14580 based
//! peripheral that streams hydration and temperature readings over
//! Bluetooth Low Energy.
//!
//! ## Features
//!
//! - **Discovery**: Find the sensor by its advertised name
//! - **Sensor control**: Switch the sensor subsystem on and off
//! - **Live readings**: Decoded hydration and temperature notifications
//! - **Payload decoding**: The 12-bit mantissa / 4-bit exponent short float
//!   carried by every notification, usable without any Bluetooth hardware
//! - **Text log**: Timestamped log that can be appended to a file
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use hdrop_ble::{DeviceManager, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let manager = DeviceManager::new().await?;
//!     let device = manager.connect().await?;
//!
//!     let mut readings = device.subscribe_readings();
//!     while let Ok(reading) = readings.recv().await {
//!         println!("{}", reading);
//!     }
//!
//!     manager.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Decoding without a device
//!
//! ```
//! use hdrop_ble::{decode, Channel};
//!
//! let raw = decode(&[0x34, 0x12]).unwrap();
//! assert_eq!(raw, 1128.0);
//!
//! let volts = Channel::Temperature.scale(1023.0);
//! assert!((volts - 3.6).abs() < 1e-12);
//! ```
//!
//! ## Platform Notes
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### macOS
//! Requires Bluetooth permission for the terminal or bundled app.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

pub mod ble;
pub mod config;
pub mod data;
pub mod device;
pub mod device_manager;
pub mod error;
pub mod protocol;
pub mod sink;

// Re-exports for convenience
pub use config::ClientConfig;
pub use device::{decode_notification, CallbackHandle, HydrationDevice};
pub use device_manager::DeviceManager;
pub use error::{Error, Result};
pub use protocol::{decode, decode_value, RawPayload, SFloat};
pub use sink::{drain_readings, forward_readings, ChannelSink, LogSink, ReadingSink};

pub use ble::connection::ConnectionState;
pub use data::{adc_counts_to_volts, Channel, Reading, ReadingLog};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _ = std::any::TypeId::of::<DeviceManager>();
        let _ = std::any::TypeId::of::<HydrationDevice>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<Reading>();
        let _ = std::any::TypeId::of::<ReadingLog>();
        let _ = std::any::TypeId::of::<SFloat>();
    }

    #[test]
    fn test_decode_and_scale() {
        let raw = decode(&[0xFF, 0x03]).unwrap();
        assert!((adc_counts_to_volts(raw) - 3.6).abs() < 1e-12);
    }
}
