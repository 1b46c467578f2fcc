//! Decoder behaviour through the public API.

use hdrop_ble::{decode, decode_value, Channel, Error, RawPayload, SFloat};
use proptest::prelude::*;

#[test]
fn documented_vectors() {
    let cases: [([u8; 2], f64); 4] = [
        ([0x01, 0x00], 1.0),
        ([0x34, 0x12], 1128.0),
        ([0x00, 0x00], 0.0),
        ([0xFF, 0xF0], 8_355_840.0),
    ];

    for (bytes, expected) in cases {
        assert_eq!(decode(&bytes).unwrap(), expected, "bytes {:02X?}", bytes);
    }
}

#[test]
fn byte_order_matters() {
    assert_ne!(decode(&[0x34, 0x12]).unwrap(), decode(&[0x12, 0x34]).unwrap());
}

#[test]
fn short_buffers_are_rejected() {
    assert!(matches!(decode(&[]), Err(Error::InvalidPayload { len: 0 })));
    assert!(matches!(
        RawPayload::from(vec![0xAA]).decode(),
        Err(Error::InvalidPayload { len: 1 })
    ));
}

#[test]
fn temperature_full_scale_is_3v6() {
    let raw = decode(&1023u16.to_le_bytes()).unwrap();
    assert!((Channel::Temperature.scale(raw) - 3.6).abs() < 1e-12);
}

proptest! {
    #[test]
    fn slice_and_value_decoding_agree(v in any::<u16>(), tail in proptest::collection::vec(any::<u8>(), 0..4)) {
        let mut bytes = v.to_le_bytes().to_vec();
        bytes.extend(tail);
        prop_assert_eq!(decode(&bytes).unwrap(), decode_value(v));
    }

    #[test]
    fn result_is_mantissa_times_power_of_two(v in any::<u16>()) {
        let value = SFloat::from(v);
        let decoded = value.to_f64();
        prop_assert!(value.exponent() <= 15);
        prop_assert!(value.mantissa() <= 0x0FFF);
        prop_assert_eq!(decoded / 2f64.powi(i32::from(value.exponent())), f64::from(value.mantissa()));
    }
}
