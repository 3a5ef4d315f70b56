//! Type compatibility and value conversion.
//!
//! [`compatible`] is a static check on two types: it answers whether some
//! value of `actual` could become a value of `target`. [`convert`] then does
//! the per-value work and rejects anything lossy: integer overflow, sign
//! loss, fractional truncation, float rounding and dropped imaginary parts.

use std::fmt;

use rustc_hash::FxHashSet;

use crate::error::ConversionError;
use crate::model::{Complex128, Complex64, Kind, Type, Value};

// =============================================================================
// COMPATIBILITY
// =============================================================================

/// Returns true if values of `actual` may convert into `target`.
///
/// Recursive types are handled coinductively: a pair already under
/// examination higher up the stack is assumed compatible.
pub fn compatible(actual: Type, target: Type) -> bool {
    Compat::default().check(actual, target)
}

#[derive(Default)]
struct Compat {
    visiting: FxHashSet<(Type, Type)>,
}

impl Compat {
    fn check(&mut self, a: Type, t: Type) -> bool {
        if a == t || !self.visiting.insert((a, t)) {
            return true;
        }
        let (ak, tk) = (a.kind(), t.kind());
        if ak == Kind::Any || tk == Kind::Any {
            return true;
        }
        if tk == Kind::Optional {
            let inner = if ak == Kind::Optional { a.elem() } else { Some(a) };
            return self.check_opt(inner, t.elem());
        }
        if ak == Kind::Optional {
            return self.check_opt(a.elem(), Some(t));
        }
        if ak.is_number() && tk.is_number() {
            return true;
        }
        if is_text(a) && is_text(t) {
            return true;
        }
        match (ak, tk) {
            (Kind::Bool, Kind::Bool) | (Kind::TypeObject, Kind::TypeObject) => true,
            (Kind::Array | Kind::List, Kind::Array | Kind::List) => self.check_opt(a.elem(), t.elem()),
            (Kind::Set, Kind::Set) => self.check_opt(a.key(), t.key()),
            (Kind::Set, Kind::Map) => is_bool(t.elem()) && self.check_opt(a.key(), t.key()),
            (Kind::Map, Kind::Set) => is_bool(a.elem()) && self.check_opt(a.key(), t.key()),
            (Kind::Map, Kind::Map) => {
                self.check_opt(a.key(), t.key()) && self.check_opt(a.elem(), t.elem())
            }
            (Kind::Struct, Kind::Struct) | (Kind::Union, Kind::Union) => self.check_fields(a, t),
            (Kind::Struct, Kind::Map) => {
                t.key().is_some_and(is_text)
                    && a.fields().iter().all(|f| self.check_opt(Some(f.ty), t.elem()))
            }
            (Kind::Map, Kind::Struct) => {
                a.key().is_some_and(is_text)
                    && t.fields().iter().all(|f| self.check_opt(a.elem(), Some(f.ty)))
            }
            _ => false,
        }
    }

    fn check_opt(&mut self, a: Option<Type>, t: Option<Type>) -> bool {
        match (a, t) {
            (Some(a), Some(t)) => self.check(a, t),
            _ => false,
        }
    }

    /// Same-named fields must be compatible, and at least one name must be
    /// shared unless either side has no fields at all.
    fn check_fields(&mut self, a: Type, t: Type) -> bool {
        let mut shared = false;
        for field in a.fields() {
            if let Some(index) = t.field_index(&field.name) {
                shared = true;
                if !self.check(field.ty, t.fields()[index].ty) {
                    return false;
                }
            }
        }
        shared || a.fields().is_empty() || t.fields().is_empty()
    }
}

/// String, enum and byte collections interconvert.
fn is_text(ty: Type) -> bool {
    matches!(ty.kind(), Kind::String | Kind::Enum) || ty.is_bytes()
}

fn is_bool(ty: Option<Type>) -> bool {
    ty.is_some_and(|t| t.kind() == Kind::Bool)
}

// =============================================================================
// CONVERSION
// =============================================================================

/// Converts `value`, a value of type `actual`, into a value of type `target`.
pub fn convert(value: Value, actual: Type, target: Type) -> Result<Value, ConversionError> {
    if actual == target {
        return Ok(value);
    }
    let incompatible = || ConversionError::Incompatible {
        actual: actual.to_string(),
        target: target.to_string(),
    };

    match target.kind() {
        Kind::Any => {
            return Ok(match value {
                Value::Any(any) => Value::Any(any),
                other => Value::any(actual, other),
            });
        }
        Kind::Optional => {
            let elem = target.elem().ok_or_else(incompatible)?;
            return match (actual.kind(), value) {
                (Kind::Optional, Value::Optional(None)) => Ok(Value::Optional(None)),
                (Kind::Optional, Value::Optional(Some(inner))) => {
                    let from = actual.elem().ok_or_else(incompatible)?;
                    Ok(Value::some(convert(*inner, from, elem)?))
                }
                (Kind::Any, Value::Any(any)) => match any.0 {
                    None => Ok(Value::Optional(None)),
                    Some(inner) => convert(inner.value, inner.ty, target),
                },
                (_, value) => Ok(Value::some(convert(value, actual, elem)?)),
            };
        }
        _ => {}
    }

    match (actual.kind(), value) {
        (Kind::Any, Value::Any(any)) => {
            let inner = any.0.ok_or_else(|| ConversionError::Nil {
                target: target.to_string(),
            })?;
            if !compatible(inner.ty, target) {
                return Err(ConversionError::Incompatible {
                    actual: inner.ty.to_string(),
                    target: target.to_string(),
                });
            }
            return convert(inner.value, inner.ty, target);
        }
        (Kind::Optional, Value::Optional(inner)) => {
            let inner = inner.ok_or_else(|| ConversionError::Nil {
                target: target.to_string(),
            })?;
            let from = actual.elem().ok_or_else(incompatible)?;
            return convert(*inner, from, target);
        }
        (_, value) => convert_concrete(value, actual, target),
    }
}

fn convert_concrete(value: Value, actual: Type, target: Type) -> Result<Value, ConversionError> {
    let incompatible = || ConversionError::Incompatible {
        actual: actual.to_string(),
        target: target.to_string(),
    };
    let tk = target.kind();

    if tk.is_number() {
        return Number::from_value(&value)
            .ok_or_else(incompatible)?
            .into_value(tk);
    }
    if is_text(target) && is_text(actual) {
        return convert_text(value, actual, target);
    }

    match (tk, value) {
        (Kind::Bool, v @ Value::Bool(_)) => Ok(v),
        (Kind::TypeObject, v @ Value::TypeObject(_)) => Ok(v),
        (Kind::Array | Kind::List, value) => {
            let from = actual.elem().ok_or_else(incompatible)?;
            let to = target.elem().ok_or_else(incompatible)?;
            let items = list_items(value).ok_or_else(incompatible)?;
            if tk == Kind::Array && items.len() != target.array_len() {
                return Err(ConversionError::LengthMismatch {
                    expected: target.array_len(),
                    actual: items.len(),
                });
            }
            let items = items
                .into_iter()
                .map(|v| convert(v, from, to))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(match tk {
                Kind::Array => Value::Array(items),
                _ => Value::List(items),
            })
        }
        (Kind::Set, Value::Set(items)) => {
            let (from, to) = (actual.key().ok_or_else(incompatible)?, target.key().ok_or_else(incompatible)?);
            let items = items
                .into_iter()
                .map(|v| convert(v, from, to))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Set(items))
        }
        (Kind::Set, Value::Map(pairs)) => {
            let (from, to) = (actual.key().ok_or_else(incompatible)?, target.key().ok_or_else(incompatible)?);
            let mut items = Vec::new();
            for (k, v) in pairs {
                if v == Value::Bool(true) {
                    items.push(convert(k, from, to)?);
                }
            }
            Ok(Value::Set(items))
        }
        (Kind::Map, Value::Map(pairs)) => {
            let (from_key, to_key) = (actual.key().ok_or_else(incompatible)?, target.key().ok_or_else(incompatible)?);
            let (from_elem, to_elem) = (actual.elem().ok_or_else(incompatible)?, target.elem().ok_or_else(incompatible)?);
            let pairs = pairs
                .into_iter()
                .map(|(k, v)| Ok((convert(k, from_key, to_key)?, convert(v, from_elem, to_elem)?)))
                .collect::<Result<Vec<_>, ConversionError>>()?;
            Ok(Value::Map(pairs))
        }
        (Kind::Map, Value::Set(items)) => {
            let (from, to) = (actual.key().ok_or_else(incompatible)?, target.key().ok_or_else(incompatible)?);
            let to_elem = target.elem().ok_or_else(incompatible)?;
            let pairs = items
                .into_iter()
                .map(|k| Ok((convert(k, from, to)?, convert(Value::Bool(true), Type::bool(), to_elem)?)))
                .collect::<Result<Vec<_>, ConversionError>>()?;
            Ok(Value::Map(pairs))
        }
        (Kind::Map, Value::Struct(values)) => {
            let to_key = target.key().ok_or_else(incompatible)?;
            let to_elem = target.elem().ok_or_else(incompatible)?;
            let pairs = actual
                .fields()
                .iter()
                .zip(values)
                .map(|(field, v)| {
                    Ok((
                        convert(Value::String(field.name.clone()), Type::string(), to_key)?,
                        convert(v, field.ty, to_elem)?,
                    ))
                })
                .collect::<Result<Vec<_>, ConversionError>>()?;
            Ok(Value::Map(pairs))
        }
        (Kind::Struct, Value::Struct(values)) => {
            let mut out = zero_fields(target);
            for (field, v) in actual.fields().iter().zip(values) {
                if let Some(index) = target.field_index(&field.name) {
                    out[index] = convert(v, field.ty, target.fields()[index].ty)?;
                }
            }
            Ok(Value::Struct(out))
        }
        (Kind::Struct, Value::Map(pairs)) => {
            let from_key = actual.key().ok_or_else(incompatible)?;
            let from_elem = actual.elem().ok_or_else(incompatible)?;
            let mut out = zero_fields(target);
            for (k, v) in pairs {
                let Value::String(name) = convert(k, from_key, Type::string())? else {
                    return Err(incompatible());
                };
                if let Some(index) = target.field_index(&name) {
                    out[index] = convert(v, from_elem, target.fields()[index].ty)?;
                }
            }
            Ok(Value::Struct(out))
        }
        (Kind::Union, Value::Union(index, inner)) => {
            let field = actual.field(index).ok_or_else(incompatible)?;
            let to = target
                .field_index(&field.name)
                .ok_or_else(|| ConversionError::UnknownField {
                    field: field.name.clone(),
                    target: target.to_string(),
                })?;
            let converted = convert(*inner, field.ty, target.fields()[to].ty)?;
            Ok(Value::Union(to, Box::new(converted)))
        }
        (expected, other) => {
            if compatible(actual, target) {
                Err(ConversionError::Shape {
                    expected,
                    found: other.kind_name(),
                })
            } else {
                Err(incompatible())
            }
        }
    }
}

fn zero_fields(ty: Type) -> Vec<Value> {
    ty.fields().iter().map(|f| Value::zero(f.ty)).collect()
}

/// Elements of a list or array value, expanding byte contents.
fn list_items(value: Value) -> Option<Vec<Value>> {
    match value {
        Value::Array(items) | Value::List(items) => Some(items),
        Value::Bytes(bytes) => Some(bytes.into_iter().map(Value::Byte).collect()),
        _ => None,
    }
}

/// String, enum label and byte collection interconversion.
fn convert_text(value: Value, actual: Type, target: Type) -> Result<Value, ConversionError> {
    let bytes: Vec<u8> = match value {
        Value::String(s) => s.into_bytes(),
        Value::Enum(index) => actual
            .labels()
            .get(index)
            .ok_or_else(|| ConversionError::Shape {
                expected: Kind::Enum,
                found: "out-of-range label",
            })?
            .clone()
            .into_bytes(),
        Value::Bytes(b) => b,
        other => {
            let items = list_items(other).ok_or(ConversionError::Shape {
                expected: target.kind(),
                found: "non-text value",
            })?;
            items
                .into_iter()
                .map(|v| match v {
                    Value::Byte(b) => Ok(b),
                    other => Err(ConversionError::Shape {
                        expected: Kind::Byte,
                        found: other.kind_name(),
                    }),
                })
                .collect::<Result<_, _>>()?
        }
    };
    match target.kind() {
        Kind::String => String::from_utf8(bytes)
            .map(Value::String)
            .map_err(|_| ConversionError::InvalidUtf8),
        Kind::Enum => {
            let label = String::from_utf8(bytes).map_err(|_| ConversionError::InvalidUtf8)?;
            target
                .label_index(&label)
                .map(Value::Enum)
                .ok_or_else(|| ConversionError::UnknownLabel {
                    label,
                    target: target.to_string(),
                })
        }
        Kind::Array if bytes.len() != target.array_len() => Err(ConversionError::LengthMismatch {
            expected: target.array_len(),
            actual: bytes.len(),
        }),
        _ => Ok(Value::Bytes(bytes)),
    }
}

// =============================================================================
// NUMBERS
// =============================================================================

const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;
const TWO_POW_64: f64 = 18_446_744_073_709_551_616.0;

/// A numeric value lifted out of its concrete width.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Number {
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    Complex(f64, f64),
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Unsigned(v) => write!(f, "{v}"),
            Number::Signed(v) => write!(f, "{v}"),
            Number::Float(v) => write!(f, "{v}"),
            Number::Complex(re, im) => write!(f, "({re}{im:+}i)"),
        }
    }
}

impl Number {
    fn from_value(value: &Value) -> Option<Number> {
        Some(match *value {
            Value::Byte(v) => Number::Unsigned(v as u64),
            Value::Uint16(v) => Number::Unsigned(v as u64),
            Value::Uint32(v) => Number::Unsigned(v as u64),
            Value::Uint64(v) => Number::Unsigned(v),
            Value::Int16(v) => Number::Signed(v as i64),
            Value::Int32(v) => Number::Signed(v as i64),
            Value::Int64(v) => Number::Signed(v),
            Value::Float32(v) => Number::Float(v as f64),
            Value::Float64(v) => Number::Float(v),
            Value::Complex64(c) => Number::Complex(c.re as f64, c.im as f64),
            Value::Complex128(c) => Number::Complex(c.re, c.im),
            _ => return None,
        })
    }

    fn into_value(self, target: Kind) -> Result<Value, ConversionError> {
        let value = match target {
            Kind::Byte => Value::Byte(self.to_unsigned(target, u8::MAX as u64)? as u8),
            Kind::Uint16 => Value::Uint16(self.to_unsigned(target, u16::MAX as u64)? as u16),
            Kind::Uint32 => Value::Uint32(self.to_unsigned(target, u32::MAX as u64)? as u32),
            Kind::Uint64 => Value::Uint64(self.to_unsigned(target, u64::MAX)?),
            Kind::Int16 => Value::Int16(self.to_signed(target, i16::MIN as i64, i16::MAX as i64)? as i16),
            Kind::Int32 => Value::Int32(self.to_signed(target, i32::MIN as i64, i32::MAX as i64)? as i32),
            Kind::Int64 => Value::Int64(self.to_signed(target, i64::MIN, i64::MAX)?),
            Kind::Float32 => Value::Float32(to_f32(self.to_f64(target)?, self, target)?),
            Kind::Float64 => Value::Float64(self.to_f64(target)?),
            Kind::Complex64 => {
                let (re, im) = self.parts(target)?;
                Value::Complex64(Complex64 {
                    re: to_f32(re, self, target)?,
                    im: to_f32(im, self, target)?,
                })
            }
            Kind::Complex128 => {
                let (re, im) = self.parts(target)?;
                Value::Complex128(Complex128 { re, im })
            }
            _ => {
                return Err(ConversionError::Shape {
                    expected: target,
                    found: "number",
                });
            }
        };
        Ok(value)
    }

    fn overflow(self, target: Kind) -> ConversionError {
        ConversionError::Overflow {
            value: self.to_string(),
            target,
        }
    }

    /// Drops a zero imaginary part; complex numbers with a non-zero one stay complex.
    fn real(self, target: Kind) -> Result<Number, ConversionError> {
        match self {
            Number::Complex(re, im) if im == 0.0 => Ok(Number::Float(re)),
            Number::Complex(..) => Err(ConversionError::ImaginaryPart {
                value: self.to_string(),
                target,
            }),
            other => Ok(other),
        }
    }

    /// Integer value of a float, rejecting fractions and out-of-range magnitudes.
    fn integral(self, target: Kind) -> Result<Number, ConversionError> {
        match self.real(target)? {
            Number::Float(f) => {
                if !f.is_finite() {
                    return Err(self.overflow(target));
                }
                if f.fract() != 0.0 {
                    return Err(ConversionError::Fractional {
                        value: self.to_string(),
                        target,
                    });
                }
                if f < 0.0 {
                    if f < -TWO_POW_63 {
                        return Err(self.overflow(target));
                    }
                    Ok(Number::Signed(f as i64))
                } else {
                    if f >= TWO_POW_64 {
                        return Err(self.overflow(target));
                    }
                    Ok(Number::Unsigned(f as u64))
                }
            }
            other => Ok(other),
        }
    }

    fn to_unsigned(self, target: Kind, max: u64) -> Result<u64, ConversionError> {
        match self.integral(target)? {
            Number::Unsigned(v) if v <= max => Ok(v),
            Number::Signed(v) if v < 0 => Err(ConversionError::SignLoss {
                value: self.to_string(),
                target,
            }),
            Number::Signed(v) if v as u64 <= max => Ok(v as u64),
            _ => Err(self.overflow(target)),
        }
    }

    fn to_signed(self, target: Kind, min: i64, max: i64) -> Result<i64, ConversionError> {
        match self.integral(target)? {
            Number::Unsigned(v) if v <= max as u64 => Ok(v as i64),
            Number::Signed(v) if (min..=max).contains(&v) => Ok(v),
            _ => Err(self.overflow(target)),
        }
    }

    fn to_f64(self, target: Kind) -> Result<f64, ConversionError> {
        let loss = || ConversionError::PrecisionLoss {
            value: self.to_string(),
            target,
        };
        match self.real(target)? {
            Number::Unsigned(v) => {
                let f = v as f64;
                if f < TWO_POW_64 && f as u64 == v { Ok(f) } else { Err(loss()) }
            }
            Number::Signed(v) => {
                let f = v as f64;
                if (-TWO_POW_63..TWO_POW_63).contains(&f) && f as i64 == v {
                    Ok(f)
                } else {
                    Err(loss())
                }
            }
            Number::Float(f) => Ok(f),
            Number::Complex(..) => Err(loss()),
        }
    }

    /// Real and imaginary parts for a complex target.
    fn parts(self, target: Kind) -> Result<(f64, f64), ConversionError> {
        match self {
            Number::Complex(re, im) => Ok((re, im)),
            other => Ok((other.to_f64(target)?, 0.0)),
        }
    }
}

/// Narrows to f32, rejecting finite values that would round or overflow.
fn to_f32(f: f64, original: Number, target: Kind) -> Result<f32, ConversionError> {
    if f.is_nan() {
        return Ok(f32::NAN);
    }
    let narrowed = f as f32;
    if narrowed as f64 == f {
        return Ok(narrowed);
    }
    if f.is_finite() && narrowed.is_infinite() {
        return Err(original.overflow(target));
    }
    Err(ConversionError::PrecisionLoss {
        value: original.to_string(),
        target,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        array_of, enum_of, list_of, map_of, named, optional_of, set_of, struct_of, union_of, Any,
        Kind, PendingType, TypeBuilder,
    };
    use proptest::prelude::*;

    fn conv(value: Value, from: Type, to: Type) -> Result<Value, ConversionError> {
        convert(value, from, to)
    }

    #[test]
    fn test_uint64_max_into_uint16_overflows() {
        let err = conv(Value::Uint64(u64::MAX), Type::uint64(), Type::uint16()).unwrap_err();
        assert_eq!(
            err,
            ConversionError::Overflow {
                value: "18446744073709551615".into(),
                target: Kind::Uint16
            }
        );
        assert_eq!(
            conv(Value::Uint64(65535), Type::uint64(), Type::uint16()),
            Ok(Value::Uint16(65535))
        );
    }

    #[test]
    fn test_sign_loss_and_fraction() {
        assert!(matches!(
            conv(Value::Int32(-1), Type::int32(), Type::uint32()),
            Err(ConversionError::SignLoss { .. })
        ));
        assert!(matches!(
            conv(Value::Float64(1.5), Type::float64(), Type::int64()),
            Err(ConversionError::Fractional { .. })
        ));
        assert_eq!(
            conv(Value::Float64(-3.0), Type::float64(), Type::int16()),
            Ok(Value::Int16(-3))
        );
        assert!(matches!(
            conv(Value::Float64(f64::INFINITY), Type::float64(), Type::int64()),
            Err(ConversionError::Overflow { .. })
        ));
    }

    #[test]
    fn test_float_precision() {
        assert!(matches!(
            conv(Value::Uint64(u64::MAX), Type::uint64(), Type::float64()),
            Err(ConversionError::PrecisionLoss { .. })
        ));
        assert_eq!(
            conv(Value::Uint64(1 << 53), Type::uint64(), Type::float64()),
            Ok(Value::Float64(9007199254740992.0))
        );
        assert!(matches!(
            conv(Value::Uint64((1 << 53) + 1), Type::uint64(), Type::float64()),
            Err(ConversionError::PrecisionLoss { .. })
        ));
        assert!(matches!(
            conv(Value::Float64(0.1), Type::float64(), Type::float32()),
            Err(ConversionError::PrecisionLoss { .. })
        ));
        assert_eq!(
            conv(Value::Float64(0.5), Type::float64(), Type::float32()),
            Ok(Value::Float32(0.5))
        );
        assert!(matches!(
            conv(Value::Float64(1e300), Type::float64(), Type::float32()),
            Err(ConversionError::Overflow { .. })
        ));
        assert!(matches!(
            conv(Value::Int64(i64::MAX), Type::int64(), Type::float64()),
            Err(ConversionError::PrecisionLoss { .. })
        ));
    }

    #[test]
    fn test_complex_rules() {
        let c = |re, im| Value::Complex128(Complex128 { re, im });
        assert_eq!(conv(c(4.0, 0.0), Type::complex128(), Type::uint16()), Ok(Value::Uint16(4)));
        assert!(matches!(
            conv(c(4.0, 1.0), Type::complex128(), Type::float64()),
            Err(ConversionError::ImaginaryPart { .. })
        ));
        assert_eq!(
            conv(Value::Int16(-2), Type::int16(), Type::complex64()),
            Ok(Value::Complex64(Complex64 { re: -2.0, im: 0.0 }))
        );
    }

    #[test]
    fn test_text_interconversion() {
        let color = enum_of("test.ConvColor", &["Red", "Green"]).unwrap();
        let bytes = list_of(Type::byte()).unwrap();
        assert_eq!(conv("Green".into(), Type::string(), color), Ok(Value::Enum(1)));
        assert!(matches!(
            conv("Blue".into(), Type::string(), color),
            Err(ConversionError::UnknownLabel { .. })
        ));
        assert_eq!(conv(Value::Enum(0), color, Type::string()), Ok("Red".into()));
        assert_eq!(conv(Value::Bytes(b"Red".to_vec()), bytes, color), Ok(Value::Enum(0)));
        assert_eq!(conv("hi".into(), Type::string(), bytes), Ok(Value::Bytes(b"hi".to_vec())));
        assert_eq!(
            conv(Value::Bytes(vec![0xff]), bytes, Type::string()),
            Err(ConversionError::InvalidUtf8)
        );
        let four = array_of(Type::byte(), 4).unwrap();
        assert!(matches!(
            conv("abc".into(), Type::string(), four),
            Err(ConversionError::LengthMismatch { expected: 4, actual: 3 })
        ));
        assert_eq!(conv("abcd".into(), Type::string(), four), Ok(Value::Bytes(b"abcd".to_vec())));
    }

    #[test]
    fn test_list_and_array() {
        let from = list_of(Type::int64()).unwrap();
        let to = array_of(Type::uint16(), 2).unwrap();
        let value = Value::List(vec![Value::Int64(1), Value::Int64(2)]);
        assert_eq!(
            conv(value, from, to),
            Ok(Value::Array(vec![Value::Uint16(1), Value::Uint16(2)]))
        );
        assert!(matches!(
            conv(Value::List(vec![Value::Int64(1)]), from, to),
            Err(ConversionError::LengthMismatch { .. })
        ));
        let bytes = list_of(Type::byte()).unwrap();
        assert_eq!(
            conv(Value::Bytes(vec![7]), bytes, from),
            Ok(Value::List(vec![Value::Int64(7)]))
        );
    }

    #[test]
    fn test_set_map_bool() {
        let set = set_of(Type::string()).unwrap();
        let map = map_of(Type::string(), Type::bool()).unwrap();
        assert!(compatible(set, map));
        assert!(compatible(map, set));
        let pairs = Value::Map(vec![("a".into(), Value::Bool(true)), ("b".into(), Value::Bool(false))]);
        assert_eq!(conv(pairs, map, set), Ok(Value::Set(vec!["a".into()])));
        assert_eq!(
            conv(Value::Set(vec!["x".into()]), set, map),
            Ok(Value::Map(vec![("x".into(), Value::Bool(true))]))
        );
        let not_bool = map_of(Type::string(), Type::int32()).unwrap();
        assert!(!compatible(set, not_bool));
    }

    #[test]
    fn test_struct_by_name() {
        let from = struct_of("test.ConvA", &[("X", Type::int32()), ("Extra", Type::string())]).unwrap();
        let to = struct_of("test.ConvB", &[("Y", Type::bool()), ("X", Type::int64())]).unwrap();
        assert!(compatible(from, to));
        let value = Value::Struct(vec![Value::Int32(5), "dropped".into()]);
        assert_eq!(
            conv(value, from, to),
            Ok(Value::Struct(vec![Value::Bool(false), Value::Int64(5)]))
        );

        let disjoint = struct_of("test.ConvC", &[("Z", Type::int32())]).unwrap();
        assert!(!compatible(from, disjoint));
        let clash = struct_of("test.ConvD", &[("X", Type::string())]).unwrap();
        assert!(!compatible(from, clash));
    }

    #[test]
    fn test_struct_and_string_map() {
        let point = struct_of("test.ConvPoint", &[("X", Type::int32()), ("Y", Type::int32())]).unwrap();
        let map = map_of(Type::string(), Type::int64()).unwrap();
        let value = Value::Struct(vec![Value::Int32(1), Value::Int32(2)]);
        let as_map = conv(value.clone(), point, map).unwrap();
        assert_eq!(
            as_map,
            Value::Map(vec![("X".into(), Value::Int64(1)), ("Y".into(), Value::Int64(2))])
        );
        assert_eq!(conv(as_map, map, point), Ok(value));
    }

    #[test]
    fn test_union_by_name() {
        let from = union_of("test.ConvU1", &[("A", Type::bool()), ("B", Type::int32())]).unwrap();
        let to = union_of("test.ConvU2", &[("B", Type::int64()), ("C", Type::string())]).unwrap();
        assert_eq!(
            conv(Value::Union(1, Box::new(Value::Int32(3))), from, to),
            Ok(Value::Union(0, Box::new(Value::Int64(3))))
        );
        assert!(matches!(
            conv(Value::Union(0, Box::new(Value::Bool(true))), from, to),
            Err(ConversionError::UnknownField { .. })
        ));
    }

    #[test]
    fn test_any_and_optional() {
        let wrapped = conv(Value::Int32(4), Type::int32(), Type::any()).unwrap();
        assert_eq!(wrapped, Value::any(Type::int32(), Value::Int32(4)));
        assert_eq!(conv(wrapped, Type::any(), Type::uint16()), Ok(Value::Uint16(4)));
        assert!(matches!(
            conv(Value::Any(Any::nil()), Type::any(), Type::int32()),
            Err(ConversionError::Nil { .. })
        ));
        assert!(matches!(
            conv(Value::any(Type::string(), "x".into()), Type::any(), Type::int32()),
            Err(ConversionError::Incompatible { .. })
        ));

        let point = struct_of("test.ConvOptPoint", &[("X", Type::int32())]).unwrap();
        let opt = optional_of(point).unwrap();
        let v = Value::Struct(vec![Value::Int32(1)]);
        assert_eq!(conv(v.clone(), point, opt), Ok(Value::some(v.clone())));
        assert_eq!(conv(Value::some(v.clone()), opt, point), Ok(v));
        assert_eq!(conv(Value::Any(Any::nil()), Type::any(), opt), Ok(Value::Optional(None)));
        assert!(matches!(
            conv(Value::Optional(None), opt, point),
            Err(ConversionError::Nil { .. })
        ));
    }

    #[test]
    fn test_named_and_unnamed_are_compatible() {
        let my_int = named("test.ConvInt", Type::int32()).unwrap();
        assert!(compatible(my_int, Type::int64()));
        assert_eq!(conv(Value::Int32(9), my_int, Type::int64()), Ok(Value::Int64(9)));
        assert!(!compatible(Type::bool(), Type::string()));
        assert!(!compatible(Type::bool(), Type::int32()));
    }

    #[test]
    fn test_recursive_compatibility_terminates() {
        let build = |name: &str, elem_kind: Kind| -> Type {
            let mut b = TypeBuilder::new();
            let node: PendingType = b.new_pending(Kind::Struct);
            let list = b.new_pending(Kind::List);
            b.set_name(node, name);
            b.add_field(node, "Value", Type::primitive(elem_kind).unwrap());
            b.add_field(node, "Kids", list);
            b.set_elem(list, node);
            let built = b.build().unwrap();
            built[node]
        };
        let a = build("test.ConvTreeA", Kind::Int32);
        let b = build("test.ConvTreeB", Kind::Int64);
        let c = build("test.ConvTreeC", Kind::String);
        assert!(compatible(a, b));
        assert!(!compatible(a, c));
    }

    proptest! {
        #[test]
        fn prop_u64_into_u16_exact(v in any::<u64>()) {
            let result = conv(Value::Uint64(v), Type::uint64(), Type::uint16());
            if v <= u16::MAX as u64 {
                prop_assert_eq!(result, Ok(Value::Uint16(v as u16)));
            } else {
                let is_overflow = matches!(result, Err(ConversionError::Overflow { .. }));
                prop_assert!(is_overflow);
            }
        }

        #[test]
        fn prop_i64_into_i32_exact(v in any::<i64>()) {
            let result = conv(Value::Int64(v), Type::int64(), Type::int32());
            match i32::try_from(v) {
                Ok(narrow) => prop_assert_eq!(result, Ok(Value::Int32(narrow))),
                Err(_) => prop_assert!(result.is_err()),
            }
        }

        #[test]
        fn prop_u64_to_f64_never_rounds(v in any::<u64>()) {
            if let Ok(Value::Float64(f)) = conv(Value::Uint64(v), Type::uint64(), Type::float64()) {
                prop_assert_eq!(f as u64, v);
                prop_assert!(f < TWO_POW_64);
            }
        }

        #[test]
        fn prop_i32_survives_f64_round_trip(v in any::<i32>()) {
            let f = conv(Value::Int32(v), Type::int32(), Type::float64()).unwrap();
            prop_assert_eq!(conv(f, Type::float64(), Type::int32()), Ok(Value::Int32(v)));
        }

        #[test]
        fn prop_f64_to_integer_requires_integral(f in any::<f64>()) {
            let result = conv(Value::Float64(f), Type::float64(), Type::int64());
            if let Ok(Value::Int64(i)) = result {
                prop_assert_eq!(i as f64, f);
            }
        }
    }
}
