//! Error types for the hdrop-ble crate.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Error, Debug)]
pub enum Error {
    /// Bluetooth-related error from the underlying BLE library.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Bluetooth is not available or is disabled on this system.
    #[error("Bluetooth not available or disabled")]
    BluetoothUnavailable,

    /// No device with the expected name was found before the scan timed out.
    #[error("Device not found: {name}")]
    DeviceNotFound {
        /// The advertised local name that was searched for.
        name: String,
    },

    /// Operation requires a connection but the device is not connected.
    #[error("Device not connected")]
    NotConnected,

    /// Failed to establish a connection to the device.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// Description of why the connection failed.
        reason: String,
    },

    /// A notification payload was too short to hold a 16-bit sensor value.
    #[error("Invalid payload: expected at least 2 bytes, got {len}")]
    InvalidPayload {
        /// Number of bytes actually received.
        len: usize,
    },

    /// Characteristic not found on the device.
    #[error("Characteristic not found: {uuid}")]
    CharacteristicNotFound {
        /// The UUID of the characteristic that was not found.
        uuid: String,
    },

    /// Service not found on the device.
    #[error("Service not found: {uuid}")]
    ServiceNotFound {
        /// The UUID of the service that was not found.
        uuid: String,
    },

    /// Writing the reading log to disk failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The receiving side of a reading sink has gone away.
    #[error("Reading sink closed")]
    SinkClosed,
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_payload_message() {
        let err = Error::InvalidPayload { len: 1 };
        assert_eq!(
            err.to_string(),
            "Invalid payload: expected at least 2 bytes, got 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
