//! Protocol module for decoding sensor notifications.
//!
//! The HDROP service has no framing or message layer: each notification is
//! one 16-bit short float, handled by [`sfloat`].

pub mod sfloat;

pub use sfloat::{decode, decode_value, RawPayload, SFloat};
