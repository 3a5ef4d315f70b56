//! Wire constants and decoder safety limits.
//!
//! The limits bound allocations when decoding untrusted input. Each can be
//! tightened or relaxed per decoder through
//! [`DecodeOptions`](crate::codec::DecodeOptions).

/// First byte of every stream.
pub const MAGIC: u8 = 0x80;

/// First type id assigned to non-bootstrap types.
pub const FIRST_USER_ID: u64 = 65;

/// Maximum byte length of a single length-prefixed message.
pub const MAX_MESSAGE_LEN: usize = 64 * 1024 * 1024;

/// Maximum number of elements in a list, set or map.
pub const MAX_COLLECTION_LEN: usize = 16 * 1024 * 1024;

/// Maximum byte length of a string or byte list.
pub const MAX_STRING_LEN: usize = 16 * 1024 * 1024;

/// Maximum nesting depth of decoded values.
pub const MAX_DEPTH: usize = 256;

/// Maximum number of type definitions accepted in one stream.
pub const MAX_TYPE_DEFINITIONS: usize = 64 * 1024;

/// Maximum byte length of the canonical string of one type.
pub const MAX_TYPE_STRING_LEN: usize = 1024 * 1024;

/// Largest number of bytes following a varint control byte.
pub const MAX_VARINT_BYTES: usize = 8;
