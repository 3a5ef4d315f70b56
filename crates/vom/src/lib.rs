//! VOM: a self-describing binary value codec.
//!
//! Every value travels with its type. The first time a stream carries a
//! value of some type, the encoder sends the type's definition; later
//! values of that type refer to it by a small per-stream id. A decoder can
//! therefore read a stream with no prior agreement on types, and convert
//! what it reads into any compatible target type.
//!
//! # Quick Start
//!
//! ```rust
//! use std::collections::BTreeMap;
//! use vom::{vdl_struct, Decoder, Encoder};
//!
//! #[derive(Debug, PartialEq)]
//! struct Reading {
//!     sensor: String,
//!     samples: Vec<i32>,
//! }
//!
//! vdl_struct!(Reading = "demo.Reading" {
//!     sensor: String as "Sensor",
//!     samples: Vec<i32> as "Samples",
//! });
//!
//! let mut enc = Encoder::new(Vec::new());
//! enc.encode(&Reading { sensor: "t1".into(), samples: vec![3, -4] }).unwrap();
//! enc.encode(&BTreeMap::from([("a".to_string(), 1i64)])).unwrap();
//! let bytes = enc.into_inner();
//!
//! let mut dec = Decoder::new(bytes.as_slice());
//! let reading: Reading = dec.decode().unwrap();
//! assert_eq!(reading.samples, vec![3, -4]);
//!
//! // Values convert into any compatible type, as long as nothing is lost.
//! let map: BTreeMap<String, f64> = dec.decode().unwrap();
//! assert_eq!(map["a"], 1.0);
//! ```
//!
//! # Modules
//!
//! - [`model`]: Kinds, interned types, the type builder and dynamic values
//! - [`registry`]: Mapping Rust types to wire types (`Vdl`)
//! - [`codec`]: Stream encoder and decoder
//! - [`convert`]: Type compatibility and lossless value conversion
//! - [`bridge`]: Host types with dedicated wire types (times, errors)
//! - [`error`]: Error types
//! - [`limits`]: Wire constants and decoding limits
//!
//! # Security
//!
//! The decoder is designed to safely handle untrusted input:
//! - Lengths, counts and nesting depth are bounded by [`DecodeOptions`]
//! - Varints are limited to eight payload bytes and checked against the
//!   target width
//! - Type definitions are validated like locally built types, and their
//!   nesting is bounded before any of them is built
//! - Zero values filled in for omitted struct fields share a per-message
//!   budget

pub mod bridge;
pub mod codec;
pub mod convert;
pub mod error;
pub mod limits;
pub mod model;
pub mod registry;

pub use bridge::{Native, RemoteError, RetryCode};
pub use codec::{decode, decode_value, encode, encode_value};
pub use codec::{DecodeOptions, Decoder, EncodeOptions, Encoder};
pub use convert::{compatible, convert};
pub use error::{ConversionError, DecodeError, EncodeError, ErrorCode, TypeError};
pub use model::{Any, Kind, Type, TypeBuilder, Value};
pub use registry::{type_of, Vdl};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
