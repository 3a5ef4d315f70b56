//! Error types for encoding, decoding, conversion and type construction.

use thiserror::Error;

use crate::model::Kind;

/// Error taxonomy shared by every error surface of the crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed bytes: bad magic, invalid varint, out-of-range index, truncation.
    CorruptStream,
    /// The wire type cannot be coerced into the requested target.
    Conversion,
    /// A type description is inconsistent or cannot be mapped to a kind.
    TypeConstruction,
    /// An encoder or decoder path met a kind it does not implement.
    UnsupportedKind,
}

impl ErrorCode {
    /// Returns the short tag used in error messages (e.g., "corrupt").
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorCode::CorruptStream => "corrupt",
            ErrorCode::Conversion => "conversion",
            ErrorCode::TypeConstruction => "type",
            ErrorCode::UnsupportedKind => "unsupported",
        }
    }
}

/// Error raised while building or validating a type graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    #[error("[type] pending type {index} has no kind (missing assign_base?)")]
    KindUnset { index: usize },

    #[error("[type] {kind} type {name:?} is missing its {part}")]
    MissingPayload {
        kind: Kind,
        name: String,
        part: &'static str,
    },

    #[error("[type] {kind} type {name:?} must not carry a {part}")]
    UnexpectedPayload {
        kind: Kind,
        name: String,
        part: &'static str,
    },

    #[error("[type] {kind} type {name:?} has no {part}")]
    Empty {
        kind: Kind,
        name: String,
        part: &'static str,
    },

    #[error("[type] {kind} type {name:?} has duplicate {part} {entry:?}")]
    Duplicate {
        kind: Kind,
        name: String,
        part: &'static str,
        entry: String,
    },

    #[error("[type] {kind} type {name:?} has an empty {part} name")]
    EmptyName {
        kind: Kind,
        name: String,
        part: &'static str,
    },

    #[error("[type] named type {name:?} has a cyclic base assignment")]
    BaseCycle { name: String },

    #[error("[type] cycle through unnamed type {unique:?}")]
    UnnamedCycle { unique: String },

    #[error("[type] type {name:?} has infinite size")]
    InfiniteSize { name: String },

    #[error("[type] pending handle {index} does not belong to this builder")]
    ForeignHandle { index: usize },

    #[error("[type] {kind} cannot be used as a {role}")]
    InvalidComponent { kind: Kind, role: &'static str },

    #[error("[type] canonical string of {name:?} exceeds {max} bytes")]
    TooLarge { name: String, max: usize },

    #[error("[type] native type {native} could not be described: {reason}")]
    Native {
        native: &'static str,
        reason: String,
    },
}

impl TypeError {
    /// Returns the taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::TypeConstruction
    }
}

/// Error raised when a value of one type cannot be represented in another.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConversionError {
    #[error("[conversion] type {actual} is not compatible with {target}")]
    Incompatible { actual: String, target: String },

    #[error("[conversion] {value} overflows {target}")]
    Overflow { value: String, target: Kind },

    #[error("[conversion] negative value {value} cannot become {target}")]
    SignLoss { value: String, target: Kind },

    #[error("[conversion] fractional value {value} cannot become {target}")]
    Fractional { value: String, target: Kind },

    #[error("[conversion] {value} loses precision as {target}")]
    PrecisionLoss { value: String, target: Kind },

    #[error("[conversion] complex value {value} has a non-zero imaginary part for {target}")]
    ImaginaryPart { value: String, target: Kind },

    #[error("[conversion] label {label:?} is not in enum {target}")]
    UnknownLabel { label: String, target: String },

    #[error("[conversion] field {field:?} is not in {target}")]
    UnknownField { field: String, target: String },

    #[error("[conversion] bytes are not valid UTF-8")]
    InvalidUtf8,

    #[error("[conversion] length {actual} does not match array length {expected}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("[conversion] nil value cannot become non-nullable {target}")]
    Nil { target: String },

    #[error("[conversion] expected a {expected} value, found {found}")]
    Shape { expected: Kind, found: &'static str },

    #[error("[conversion] native type {native}: {reason}")]
    Native {
        native: &'static str,
        reason: String,
    },
}

impl ConversionError {
    /// Returns the taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        ErrorCode::Conversion
    }
}

/// Error during binary decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    // === Corrupt stream ===
    #[error("[corrupt] invalid magic byte: expected 0x80, found {found:#04x}")]
    InvalidMagic { found: u8 },

    #[error("[corrupt] unexpected end of input while reading {context}")]
    UnexpectedEof { context: &'static str },

    #[error("[corrupt] invalid varint control byte {byte:#04x} in {context}")]
    InvalidControlByte { byte: u8, context: &'static str },

    #[error("[corrupt] {context} value {value} does not fit in {bits} bits")]
    VarintOverflow {
        context: &'static str,
        value: u64,
        bits: u32,
    },

    #[error("[corrupt] {context} value {value} is not representable as float32")]
    InexactFloat { context: &'static str, value: f64 },

    #[error("[corrupt] invalid bool byte {value} (expected 0 or 1)")]
    InvalidBool { value: u64 },

    #[error("[corrupt] invalid UTF-8 in {field}")]
    InvalidUtf8 { field: &'static str },

    #[error("[corrupt] {what} index {index} out of range (size: {size})")]
    IndexOutOfRange {
        what: &'static str,
        index: u64,
        size: usize,
    },

    #[error("[corrupt] struct field {index} appears twice")]
    DuplicateField { index: usize },

    #[error("[corrupt] type id 0 is reserved")]
    ZeroTypeId,

    #[error("[corrupt] type id {id} is not defined")]
    UnknownTypeId { id: u64 },

    #[error("[corrupt] type id {id} is defined twice")]
    DuplicateTypeId { id: u64 },

    #[error("[corrupt] type definition {id} is malformed: {reason}")]
    MalformedTypeDefinition { id: u64, reason: String },

    #[error("[corrupt] message declared {declared} bytes but used {used}")]
    MessageLengthMismatch { declared: usize, used: usize },

    #[error("[corrupt] {field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: u64,
        max: usize,
    },

    #[error("[corrupt] nesting depth exceeds maximum {max}")]
    DepthExceeded { max: usize },

    #[error("[corrupt] read failed: {0}")]
    Io(String),

    // === Other surfaces ===
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("[unsupported] decoding {kind} is not supported")]
    UnsupportedKind { kind: Kind },
}

impl DecodeError {
    /// Returns the taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            DecodeError::Conversion(_) => ErrorCode::Conversion,
            DecodeError::Type(_) => ErrorCode::TypeConstruction,
            DecodeError::UnsupportedKind { .. } => ErrorCode::UnsupportedKind,
            _ => ErrorCode::CorruptStream,
        }
    }
}

/// Error during binary encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    #[error("value does not match type {ty}: expected {expected}, found {found}")]
    ValueMismatch {
        ty: String,
        expected: Kind,
        found: &'static str,
    },

    #[error("{what} index {index} out of range for type {ty} (size: {size})")]
    IndexOutOfRange {
        what: &'static str,
        index: usize,
        size: usize,
        ty: String,
    },

    #[error("array type {ty} expects {expected} elements, found {actual}")]
    ArrayLength {
        ty: String,
        expected: usize,
        actual: usize,
    },

    #[error("struct type {ty} has {expected} fields, value has {actual}")]
    FieldCount {
        ty: String,
        expected: usize,
        actual: usize,
    },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("write failed: {0}")]
    Io(String),

    #[error(transparent)]
    Type(#[from] TypeError),

    #[error("[unsupported] encoding {kind} is not supported")]
    UnsupportedKind { kind: Kind },
}

impl EncodeError {
    /// Returns the taxonomy code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            EncodeError::Type(_) => ErrorCode::TypeConstruction,
            EncodeError::UnsupportedKind { .. } => ErrorCode::UnsupportedKind,
            // The sink is left in an unknown state, same as a torn stream.
            EncodeError::Io(_) => ErrorCode::CorruptStream,
            _ => ErrorCode::Conversion,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_error_codes() {
        assert_eq!(
            DecodeError::InvalidMagic { found: 0x81 }.code(),
            ErrorCode::CorruptStream
        );
        let conv: DecodeError = ConversionError::InvalidUtf8.into();
        assert_eq!(conv.code(), ErrorCode::Conversion);
        let ty: DecodeError = TypeError::BaseCycle { name: "A".into() }.into();
        assert_eq!(ty.code(), ErrorCode::TypeConstruction);
        assert_eq!(
            DecodeError::UnsupportedKind { kind: Kind::Any }.code(),
            ErrorCode::UnsupportedKind
        );
    }

    #[test]
    fn test_messages_carry_tag() {
        let err = DecodeError::InvalidMagic { found: 0x81 };
        assert!(err.to_string().starts_with("[corrupt]"));
        assert!(err.to_string().contains("0x81"));
        let err = ConversionError::Overflow {
            value: "65536".into(),
            target: Kind::Uint16,
        };
        assert_eq!(err.to_string(), "[conversion] 65536 overflows uint16");
    }
}
