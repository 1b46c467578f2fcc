//! Sensor payload decoding.
//!
//! Every HDROP notification carries a single little-endian 16-bit value laid
//! out as a short float:
//!
//! ```text
//!  15      12 11                         0
//! +----------+----------------------------+
//! | exponent |          mantissa          |
//! +----------+----------------------------+
//! ```
//!
//! The reading is `mantissa * 2^exponent`. Unlike the IEEE-11073 SFLOAT used
//! by standard health profiles, the exponent nibble is unsigned (0-15) and the
//! base is 2, not 10. Exponent nibbles of 8 and above decode as large
//! positive powers, not negative ones.

use bytes::Bytes;

use crate::error::{Error, Result};

/// Mask selecting the 12-bit mantissa.
pub const MANTISSA_MASK: u16 = 0x0FFF;

/// Shift bringing the 4-bit exponent down to bit 0.
pub const EXPONENT_SHIFT: u32 = 12;

/// A raw notification payload as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPayload(Bytes);

impl RawPayload {
    /// Wrap a notification buffer.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self(data.into())
    }

    /// The underlying bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Number of bytes in the payload.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload carries no bytes at all.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Decode the payload into a reading magnitude.
    pub fn decode(&self) -> Result<f64> {
        decode(&self.0)
    }
}

impl From<Vec<u8>> for RawPayload {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&'static [u8]> for RawPayload {
    fn from(data: &'static [u8]) -> Self {
        Self::new(Bytes::from_static(data))
    }
}

/// A 16-bit short float with a 12-bit mantissa and an unsigned 4-bit
/// base-2 exponent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SFloat(pub u16);

impl SFloat {
    /// Parse from the first two bytes of a little-endian buffer.
    ///
    /// Trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidPayload`] if fewer than two bytes are given.
    pub fn parse(data: &[u8]) -> Result<Self> {
        match data {
            [lo, hi, ..] => Ok(Self(u16::from_le_bytes([*lo, *hi]))),
            _ => Err(Error::InvalidPayload { len: data.len() }),
        }
    }

    /// The 12-bit mantissa (0-4095).
    pub fn mantissa(&self) -> u16 {
        self.0 & MANTISSA_MASK
    }

    /// The 4-bit exponent (0-15).
    pub fn exponent(&self) -> u8 {
        (self.0 >> EXPONENT_SHIFT) as u8
    }

    /// The raw 16-bit value.
    pub fn raw_value(&self) -> u16 {
        self.0
    }

    /// Reconstruct the magnitude as `mantissa * 2^exponent`.
    ///
    /// # Example
    ///
    /// ```
    /// use hdrop_ble::protocol::SFloat;
    ///
    /// let value = SFloat(0x1234);
    /// assert_eq!(value.mantissa(), 564);
    /// assert_eq!(value.exponent(), 1);
    /// assert_eq!(value.to_f64(), 1128.0);
    /// ```
    pub fn to_f64(&self) -> f64 {
        let magnitude = 2f64.powi(i32::from(self.exponent()));
        f64::from(self.mantissa()) * magnitude
    }
}

impl From<u16> for SFloat {
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl From<SFloat> for f64 {
    fn from(value: SFloat) -> Self {
        value.to_f64()
    }
}

/// Decode an already assembled 16-bit value.
#[inline]
pub fn decode_value(value: u16) -> f64 {
    SFloat(value).to_f64()
}

/// Decode a notification payload into a reading magnitude.
///
/// Only the first two bytes are read, low byte first.
///
/// # Errors
///
/// Returns [`Error::InvalidPayload`] if `data` holds fewer than two bytes.
///
/// # Example
///
/// ```
/// use hdrop_ble::decode;
///
/// assert_eq!(decode(&[0x34, 0x12]).unwrap(), 1128.0);
/// assert!(decode(&[0x34]).is_err());
/// ```
pub fn decode(data: &[u8]) -> Result<f64> {
    SFloat::parse(data).map(|value| value.to_f64())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_decode_known_value() {
        assert_eq!(decode(&[0x34, 0x12]).unwrap(), 1128.0);
    }

    #[test]
    fn test_decode_is_little_endian() {
        assert_eq!(decode(&[0x01, 0x00]).unwrap(), 1.0);
        // 0x0100: mantissa 256, exponent 0
        assert_eq!(decode(&[0x00, 0x01]).unwrap(), 256.0);
    }

    #[test]
    fn test_decode_zero() {
        assert_eq!(decode(&[0x00, 0x00]).unwrap(), 0.0);
    }

    #[test]
    fn test_decode_max_exponent() {
        assert_eq!(decode(&[0xFF, 0xF0]).unwrap(), 8_355_840.0);
    }

    #[test]
    fn test_decode_largest_value() {
        assert_eq!(decode(&[0xFF, 0xFF]).unwrap(), 4095.0 * 32768.0);
    }

    #[test]
    fn test_exponent_is_unsigned() {
        // 0x8001 would be 1 * 2^-8 with a signed nibble.
        assert_eq!(decode(&[0x01, 0x80]).unwrap(), 256.0);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode(&[0x34, 0x12, 0xFF, 0xEE]).unwrap(), 1128.0);
    }

    #[test]
    fn test_decode_short_payload() {
        assert!(matches!(
            decode(&[0x34]),
            Err(Error::InvalidPayload { len: 1 })
        ));
        assert!(matches!(decode(&[]), Err(Error::InvalidPayload { len: 0 })));
    }

    #[test]
    fn test_sfloat_fields() {
        let value = SFloat(0xF0FF);
        assert_eq!(value.mantissa(), 255);
        assert_eq!(value.exponent(), 15);
        assert_eq!(value.raw_value(), 0xF0FF);
    }

    #[test]
    fn test_raw_payload_decode() {
        let payload = RawPayload::from(vec![0x34, 0x12]);
        assert_eq!(payload.len(), 2);
        assert_eq!(payload.decode().unwrap(), 1128.0);

        let empty = RawPayload::new(Bytes::new());
        assert!(empty.is_empty());
        assert!(empty.decode().is_err());
    }

    #[test]
    fn test_decode_every_value() {
        for v in 0..=u16::MAX {
            let expected = f64::from(v & 0x0FFF) * 2f64.powi(i32::from(v >> 12));
            assert_eq!(decode(&v.to_le_bytes()).unwrap(), expected, "value {:#06x}", v);
            assert_eq!(decode_value(v), expected);
        }
    }

    proptest! {
        #[test]
        fn prop_decode_matches_formula(v in any::<u16>()) {
            let expected = f64::from(v & 0x0FFF) * 2f64.powi(i32::from(v >> 12));
            prop_assert_eq!(decode(&v.to_le_bytes()).unwrap(), expected);
        }

        #[test]
        fn prop_decode_is_deterministic(data in proptest::collection::vec(any::<u8>(), 2..16)) {
            let first = decode(&data).unwrap();
            let second = decode(&data).unwrap();
            prop_assert_eq!(first.to_bits(), second.to_bits());
        }

        #[test]
        fn prop_short_payload_rejected(data in proptest::collection::vec(any::<u8>(), 0..2)) {
            prop_assert!(decode(&data).is_err());
        }
    }
}
