//! Decoded sensor readings.
//!
//! Both sensor channels share the same payload decoder. What differs is the
//! scaling applied afterwards: hydration readings are used as decoded, while
//! temperature readings are ADC counts converted to volts.

use chrono::{DateTime, Local};
use uuid::Uuid;

use crate::ble::uuids::{HYDRATION_DATA_UUID, TEMPERATURE_DATA_UUID};

/// Full-scale voltage of the temperature ADC.
pub const TEMPERATURE_FULL_SCALE_VOLTS: f64 = 3.6;

/// Largest count reported by the 10-bit temperature ADC.
pub const TEMPERATURE_ADC_MAX_COUNT: f64 = 1023.0;

/// Volts per ADC count on the temperature channel.
pub const VOLTS_PER_ADC_COUNT: f64 = TEMPERATURE_FULL_SCALE_VOLTS / TEMPERATURE_ADC_MAX_COUNT;

/// Convert a temperature-channel ADC count to volts.
///
/// # Example
///
/// ```
/// use hdrop_ble::data::adc_counts_to_volts;
///
/// assert!((adc_counts_to_volts(1023.0) - 3.6).abs() < 1e-12);
/// ```
#[inline]
pub fn adc_counts_to_volts(counts: f64) -> f64 {
    counts * VOLTS_PER_ADC_COUNT
}

/// Sensor channel a notification arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Channel {
    /// Conductivity-based hydration sensor.
    Hydration,
    /// Temperature sensor, reported in volts.
    Temperature,
}

impl Channel {
    /// All channels, in subscription order.
    pub const ALL: [Channel; 2] = [Channel::Hydration, Channel::Temperature];

    /// Map a characteristic UUID to its channel.
    pub fn from_characteristic(uuid: &Uuid) -> Option<Self> {
        if *uuid == HYDRATION_DATA_UUID {
            Some(Self::Hydration)
        } else if *uuid == TEMPERATURE_DATA_UUID {
            Some(Self::Temperature)
        } else {
            None
        }
    }

    /// The characteristic this channel is notified on.
    pub fn characteristic_uuid(&self) -> Uuid {
        match self {
            Self::Hydration => HYDRATION_DATA_UUID,
            Self::Temperature => TEMPERATURE_DATA_UUID,
        }
    }

    /// Apply the channel's post-decode scaling.
    pub fn scale(&self, raw: f64) -> f64 {
        match self {
            Self::Hydration => raw,
            Self::Temperature => adc_counts_to_volts(raw),
        }
    }

    /// Unit of the scaled value, if any.
    pub fn unit(&self) -> Option<&'static str> {
        match self {
            Self::Hydration => None,
            Self::Temperature => Some("V"),
        }
    }
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hydration => write!(f, "Hydration"),
            Self::Temperature => write!(f, "Temperature"),
        }
    }
}

/// A timestamped, channel-tagged reading.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Time the notification was received.
    pub timestamp: DateTime<Local>,
    /// Channel the reading belongs to.
    pub channel: Channel,
    /// Decoder output before channel scaling.
    pub raw: f64,
    /// Channel-scaled value.
    pub value: f64,
}

impl Reading {
    /// Build a reading from a decoded magnitude, applying channel scaling.
    pub fn new(timestamp: DateTime<Local>, channel: Channel, raw: f64) -> Self {
        Self {
            timestamp,
            channel,
            raw,
            value: channel.scale(raw),
        }
    }

    /// Build a reading stamped with the current local time.
    pub fn now(channel: Channel, raw: f64) -> Self {
        Self::new(Local::now(), channel, raw)
    }
}

impl std::fmt::Display for Reading {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.channel,
            self.value
        )?;
        if let Some(unit) = self.channel.unit() {
            write!(f, " {}", unit)?;
        }
        Ok(())
    }
}
