//! BLE Service and Characteristic UUIDs.
//!
//! Contains all UUID constants used for HDROP sensor communication.

use uuid::Uuid;

/// Advertised local name of the HDROP sensor.
pub const HDROP_DEVICE_NAME: &str = "HDROP-580";

// HDROP Service (custom, DA14580 firmware)
/// HDROP hydration service UUID.
pub const HDROP_SERVICE_UUID: Uuid = Uuid::from_u128(0xedfec62e_9910_0bac_5241_d8bda6932a2f);
/// Sensor configuration characteristic UUID (Write).
pub const SENSOR_CONFIG_UUID: Uuid = Uuid::from_u128(0x2d86686a_53dc_25b3_0c4a_f0e10c8dee20);
/// Hydration data characteristic UUID (Notify).
pub const HYDRATION_DATA_UUID: Uuid = Uuid::from_u128(0x15005991_b131_3396_014c_664c9867b917);
/// Temperature data characteristic UUID (Notify).
pub const TEMPERATURE_DATA_UUID: Uuid = Uuid::from_u128(0x6eb675ab_8bd1_1b9a_7444_621e52ec6823);

/// Value written to the sensor configuration characteristic to power sensors on.
pub const SENSORS_ON: [u8; 1] = [0x01];
/// Value written to the sensor configuration characteristic to power sensors off.
pub const SENSORS_OFF: [u8; 1] = [0x00];
