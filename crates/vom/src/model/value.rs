//! Dynamic values.
//!
//! A [`Value`] carries no type of its own: it is always interpreted against a
//! [`Type`] whose kind it mirrors. The only exception is [`Any`], which pairs
//! its content with the dynamic type.

use crate::model::{Kind, Type};

/// Single-precision complex number.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex64 {
    pub re: f32,
    pub im: f32,
}

/// Double-precision complex number.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Complex128 {
    pub re: f64,
    pub im: f64,
}

/// Content of a non-nil [`Any`].
#[derive(Debug, Clone, PartialEq)]
pub struct AnyValue {
    /// Dynamic type of `value`.
    pub ty: Type,
    pub value: Value,
}

/// Dynamically typed envelope; `Any(None)` is nil.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Any(pub Option<Box<AnyValue>>);

impl Any {
    /// The nil any.
    pub fn nil() -> Self {
        Any(None)
    }

    pub fn new(ty: Type, value: Value) -> Self {
        Any(Some(Box::new(AnyValue { ty, value })))
    }

    pub fn is_nil(&self) -> bool {
        self.0.is_none()
    }

    /// Dynamic type, `None` when nil.
    pub fn ty(&self) -> Option<Type> {
        self.0.as_ref().map(|a| a.ty)
    }

    pub fn value(&self) -> Option<&Value> {
        self.0.as_ref().map(|a| &a.value)
    }
}

/// A value of some [`Type`].
///
/// Byte lists and byte arrays are usually held as [`Value::Bytes`], which the
/// decoder always produces; the encoder also accepts a `List`/`Array` of
/// [`Value::Byte`] for them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Byte(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    Complex64(Complex64),
    Complex128(Complex128),
    String(String),
    /// Contents of `[]byte` or `[N]byte`.
    Bytes(Vec<u8>),
    /// Enum label index.
    Enum(usize),
    TypeObject(Type),
    Array(Vec<Value>),
    List(Vec<Value>),
    Set(Vec<Value>),
    Map(Vec<(Value, Value)>),
    /// Field values in declared order.
    Struct(Vec<Value>),
    /// Active field index and its value.
    Union(usize, Box<Value>),
    Optional(Option<Box<Value>>),
    Any(Any),
}

impl Value {
    /// Returns the zero value of `ty`.
    ///
    /// Recursion terminates because types of infinite size are rejected at
    /// build time: every cycle passes through a list, set, map or optional,
    /// whose zero values are empty.
    pub fn zero(ty: Type) -> Value {
        match ty.kind() {
            Kind::Any => Value::Any(Any::nil()),
            Kind::Optional => Value::Optional(None),
            Kind::Bool => Value::Bool(false),
            Kind::Byte => Value::Byte(0),
            Kind::Uint16 => Value::Uint16(0),
            Kind::Uint32 => Value::Uint32(0),
            Kind::Uint64 => Value::Uint64(0),
            Kind::Int16 => Value::Int16(0),
            Kind::Int32 => Value::Int32(0),
            Kind::Int64 => Value::Int64(0),
            Kind::Float32 => Value::Float32(0.0),
            Kind::Float64 => Value::Float64(0.0),
            Kind::Complex64 => Value::Complex64(Complex64::default()),
            Kind::Complex128 => Value::Complex128(Complex128::default()),
            Kind::String => Value::String(String::new()),
            Kind::Enum => Value::Enum(0),
            Kind::TypeObject => Value::TypeObject(Type::any()),
            Kind::Array if ty.is_bytes() => Value::Bytes(vec![0; ty.array_len()]),
            Kind::Array => {
                let elem = ty.elem().map_or(Value::Any(Any::nil()), Value::zero);
                Value::Array(vec![elem; ty.array_len()])
            }
            Kind::List if ty.is_bytes() => Value::Bytes(Vec::new()),
            Kind::List => Value::List(Vec::new()),
            Kind::Set => Value::Set(Vec::new()),
            Kind::Map => Value::Map(Vec::new()),
            Kind::Struct => Value::Struct(ty.fields().iter().map(|f| Value::zero(f.ty)).collect()),
            Kind::Union => {
                let first = ty.field(0).map_or(Value::Any(Any::nil()), |f| Value::zero(f.ty));
                Value::Union(0, Box::new(first))
            }
        }
    }

    /// Returns true if `self` is the zero value of `ty`.
    ///
    /// Struct fields holding their zero value are omitted on the wire.
    pub fn is_zero(&self, ty: Type) -> bool {
        match self {
            Value::Bool(v) => !*v,
            Value::Byte(v) => *v == 0,
            Value::Uint16(v) => *v == 0,
            Value::Uint32(v) => *v == 0,
            Value::Uint64(v) => *v == 0,
            Value::Int16(v) => *v == 0,
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            // -0.0 is kept so that it survives a round trip
            Value::Float32(v) => v.to_bits() == 0,
            Value::Float64(v) => v.to_bits() == 0,
            Value::Complex64(c) => c.re.to_bits() == 0 && c.im.to_bits() == 0,
            Value::Complex128(c) => c.re.to_bits() == 0 && c.im.to_bits() == 0,
            Value::String(s) => s.is_empty(),
            Value::Bytes(b) => match ty.kind() {
                Kind::Array => b.iter().all(|x| *x == 0),
                _ => b.is_empty(),
            },
            Value::Enum(i) => *i == 0,
            Value::TypeObject(t) => *t == Type::any(),
            Value::Array(items) => {
                let elem = ty.elem();
                items
                    .iter()
                    .all(|v| elem.is_some_and(|e| v.is_zero(e)))
            }
            Value::List(items) | Value::Set(items) => items.is_empty(),
            Value::Map(pairs) => pairs.is_empty(),
            Value::Struct(fields) => fields
                .iter()
                .zip(ty.fields())
                .all(|(v, f)| v.is_zero(f.ty)),
            Value::Union(index, inner) => {
                *index == 0 && ty.field(0).is_some_and(|f| inner.is_zero(f.ty))
            }
            Value::Optional(v) => v.is_none(),
            Value::Any(a) => a.is_nil(),
        }
    }

    /// Short description of the variant, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Byte(_) => "byte",
            Value::Uint16(_) => "uint16",
            Value::Uint32(_) => "uint32",
            Value::Uint64(_) => "uint64",
            Value::Int16(_) => "int16",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Complex64(_) => "complex64",
            Value::Complex128(_) => "complex128",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Enum(_) => "enum",
            Value::TypeObject(_) => "typeobject",
            Value::Array(_) => "array",
            Value::List(_) => "list",
            Value::Set(_) => "set",
            Value::Map(_) => "map",
            Value::Struct(_) => "struct",
            Value::Union(..) => "union",
            Value::Optional(_) => "optional",
            Value::Any(_) => "any",
        }
    }

    /// Wraps `value` of type `ty` in a non-nil any.
    pub fn any(ty: Type, value: Value) -> Value {
        Value::Any(Any::new(ty, value))
    }

    /// A present optional.
    pub fn some(value: Value) -> Value {
        Value::Optional(Some(Box::new(value)))
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Any> for Value {
    fn from(v: Any) -> Self {
        Value::Any(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::builder::{array_of, list_of, optional_of, struct_of, union_of};

    #[test]
    fn test_scalar_zero() {
        for kind in Kind::ALL {
            if let Some(ty) = Type::primitive(kind) {
                let zero = Value::zero(ty);
                assert!(zero.is_zero(ty), "zero of {kind} reports non-zero");
            }
        }
        assert!(!Value::Bool(true).is_zero(Type::bool()));
        assert!(!Value::Float64(-0.0).is_zero(Type::float64()));
    }

    #[test]
    fn test_byte_collection_zero() {
        let list = list_of(Type::byte()).unwrap();
        assert_eq!(Value::zero(list), Value::Bytes(vec![]));
        assert!(!Value::Bytes(vec![0]).is_zero(list));

        let arr = array_of(Type::byte(), 3).unwrap();
        assert_eq!(Value::zero(arr), Value::Bytes(vec![0, 0, 0]));
        assert!(Value::Bytes(vec![0, 0, 0]).is_zero(arr));
        assert!(!Value::Bytes(vec![0, 1, 0]).is_zero(arr));
    }

    #[test]
    fn test_composite_zero() {
        let point = struct_of("test.ZeroPoint", &[("X", Type::int32()), ("Y", Type::string())]).unwrap();
        let zero = Value::zero(point);
        assert_eq!(
            zero,
            Value::Struct(vec![Value::Int32(0), Value::String(String::new())])
        );
        assert!(zero.is_zero(point));
        assert!(!Value::Struct(vec![Value::Int32(1), Value::String(String::new())]).is_zero(point));

        let either = union_of("test.ZeroEither", &[("A", Type::bool()), ("B", Type::int64())]).unwrap();
        assert_eq!(Value::zero(either), Value::Union(0, Box::new(Value::Bool(false))));
        assert!(!Value::Union(1, Box::new(Value::Int64(0))).is_zero(either));

        let opt = optional_of(point).unwrap();
        assert_eq!(Value::zero(opt), Value::Optional(None));
        assert!(!Value::some(zero).is_zero(opt));
    }

    #[test]
    fn test_any_helpers() {
        let v = Value::any(Type::string(), "x".into());
        match &v {
            Value::Any(a) => {
                assert_eq!(a.ty(), Some(Type::string()));
                assert_eq!(a.value(), Some(&Value::String("x".into())));
            }
            other => panic!("expected any, got {other:?}"),
        }
        assert!(!v.is_zero(Type::any()));
        assert!(Value::Any(Any::nil()).is_zero(Type::any()));
    }
}
