//! Data structures for sensor readings.
//!
//! This module contains the channel-tagged reading type, the per-channel
//! scaling rules, and the plain-text reading log.

pub mod log;
pub mod reading;

pub use log::ReadingLog;
pub use reading::{adc_counts_to_volts, Channel, Reading, VOLTS_PER_ADC_COUNT};
