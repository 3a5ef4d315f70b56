//! Binary encoding/decoding of self-describing value streams.
//!
//! A stream starts with the magic byte `0x80` and is a sequence of messages.
//! Type definition messages (negative id) precede the first value that needs
//! them; value messages (positive id) carry one value of the identified type.

pub mod decoder;
pub mod encoder;
pub mod primitives;
pub mod wire;

pub use decoder::{decode, decode_value, DecodeOptions, Decoder};
pub use encoder::{encode, encode_value, EncodeOptions, Encoder};
pub use primitives::{zigzag_decode, zigzag_encode, Reader, Source, StreamReader, Writer};
pub use wire::{WireField, WireType};
