//! The value-kind taxonomy.

use std::fmt;

/// The tag distinguishing a type's shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Kind {
    // Special
    Any,
    Optional,
    // Scalars
    Bool,
    Byte,
    Uint16,
    Uint32,
    Uint64,
    Int16,
    Int32,
    Int64,
    Float32,
    Float64,
    Complex64,
    Complex128,
    String,
    Enum,
    TypeObject,
    // Composites
    Array,
    List,
    Set,
    Map,
    Struct,
    Union,
}

impl Kind {
    /// All kinds, in declaration order.
    pub const ALL: [Kind; 23] = [
        Kind::Any,
        Kind::Optional,
        Kind::Bool,
        Kind::Byte,
        Kind::Uint16,
        Kind::Uint32,
        Kind::Uint64,
        Kind::Int16,
        Kind::Int32,
        Kind::Int64,
        Kind::Float32,
        Kind::Float64,
        Kind::Complex64,
        Kind::Complex128,
        Kind::String,
        Kind::Enum,
        Kind::TypeObject,
        Kind::Array,
        Kind::List,
        Kind::Set,
        Kind::Map,
        Kind::Struct,
        Kind::Union,
    ];

    /// Returns the lowercase name used in type strings.
    pub fn as_str(self) -> &'static str {
        match self {
            Kind::Any => "any",
            Kind::Optional => "optional",
            Kind::Bool => "bool",
            Kind::Byte => "byte",
            Kind::Uint16 => "uint16",
            Kind::Uint32 => "uint32",
            Kind::Uint64 => "uint64",
            Kind::Int16 => "int16",
            Kind::Int32 => "int32",
            Kind::Int64 => "int64",
            Kind::Float32 => "float32",
            Kind::Float64 => "float64",
            Kind::Complex64 => "complex64",
            Kind::Complex128 => "complex128",
            Kind::String => "string",
            Kind::Enum => "enum",
            Kind::TypeObject => "typeobject",
            Kind::Array => "array",
            Kind::List => "list",
            Kind::Set => "set",
            Kind::Map => "map",
            Kind::Struct => "struct",
            Kind::Union => "union",
        }
    }

    /// Returns true for kinds that need no payload (elem, key, fields, ...).
    pub const fn is_scalar(self) -> bool {
        matches!(
            self,
            Kind::Any
                | Kind::Bool
                | Kind::Byte
                | Kind::Uint16
                | Kind::Uint32
                | Kind::Uint64
                | Kind::Int16
                | Kind::Int32
                | Kind::Int64
                | Kind::Float32
                | Kind::Float64
                | Kind::Complex64
                | Kind::Complex128
                | Kind::String
                | Kind::TypeObject
        )
    }

    /// Returns true for byte, unsigned, signed, float and complex kinds.
    pub const fn is_number(self) -> bool {
        matches!(
            self,
            Kind::Byte
                | Kind::Uint16
                | Kind::Uint32
                | Kind::Uint64
                | Kind::Int16
                | Kind::Int32
                | Kind::Int64
                | Kind::Float32
                | Kind::Float64
                | Kind::Complex64
                | Kind::Complex128
        )
    }

    /// Returns true if the kind carries an element type.
    pub const fn has_elem(self) -> bool {
        matches!(self, Kind::Array | Kind::List | Kind::Map | Kind::Optional)
    }

    /// Returns true if the kind carries a key type.
    pub const fn has_key(self) -> bool {
        matches!(self, Kind::Set | Kind::Map)
    }

    /// Returns true if the kind carries named fields.
    pub const fn has_fields(self) -> bool {
        matches!(self, Kind::Struct | Kind::Union)
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_classes_are_disjoint() {
        for kind in Kind::ALL {
            let classes = [
                kind.is_scalar(),
                kind == Kind::Enum,
                kind.has_elem() || kind.has_key(),
                kind.has_fields(),
            ];
            assert_eq!(
                classes.iter().filter(|c| **c).count(),
                1,
                "kind {kind} belongs to exactly one payload class"
            );
        }
    }

    #[test]
    fn test_numbers_are_scalars() {
        for kind in Kind::ALL.into_iter().filter(|k| k.is_number()) {
            assert!(kind.is_scalar());
        }
    }
}
