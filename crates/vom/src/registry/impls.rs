//! `Vdl` for primitives and standard collections.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::hash::{BuildHasher, Hash};

use super::{shape, Describer, Vdl};
use crate::error::{ConversionError, TypeError};
use crate::model::{Any, Complex128, Complex64, Kind, Type, TypeRef, Value};

macro_rules! primitive_vdl {
    ($($rust:ty => $ctor:ident, $variant:ident, $kind:ident;)*) => {
        $(
            impl Vdl for $rust {
                fn describe(_: &mut Describer) -> Result<TypeRef, TypeError> {
                    Ok(Type::$ctor().into())
                }

                fn to_value(&self) -> Value {
                    Value::$variant(self.clone())
                }

                fn from_value(value: Value) -> Result<Self, ConversionError> {
                    match value {
                        Value::$variant(v) => Ok(v),
                        other => Err(shape(Kind::$kind, &other)),
                    }
                }
            }
        )*
    };
}

primitive_vdl! {
    bool => bool, Bool, Bool;
    u16 => uint16, Uint16, Uint16;
    u32 => uint32, Uint32, Uint32;
    u64 => uint64, Uint64, Uint64;
    i16 => int16, Int16, Int16;
    i32 => int32, Int32, Int32;
    i64 => int64, Int64, Int64;
    f32 => float32, Float32, Float32;
    f64 => float64, Float64, Float64;
    Complex64 => complex64, Complex64, Complex64;
    Complex128 => complex128, Complex128, Complex128;
    String => string, String, String;
    Type => type_object, TypeObject, TypeObject;
}

impl Vdl for u8 {
    fn describe(_: &mut Describer) -> Result<TypeRef, TypeError> {
        Ok(Type::byte().into())
    }

    fn to_value(&self) -> Value {
        Value::Byte(*self)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Byte(v) => Ok(v),
            other => Err(shape(Kind::Byte, &other)),
        }
    }

    fn seq_to_value(items: &[Self], _array: bool) -> Value {
        Value::Bytes(items.to_vec())
    }

    fn seq_from_value(value: Value) -> Result<Vec<Self>, ConversionError> {
        match value {
            Value::Bytes(bytes) => Ok(bytes),
            Value::List(items) | Value::Array(items) => {
                items.into_iter().map(Self::from_value).collect()
            }
            other => Err(shape(Kind::List, &other)),
        }
    }
}

impl Vdl for Any {
    fn describe(_: &mut Describer) -> Result<TypeRef, TypeError> {
        Ok(Type::any().into())
    }

    fn to_value(&self) -> Value {
        Value::Any(self.clone())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Any(any) => Ok(any),
            other => Err(shape(Kind::Any, &other)),
        }
    }
}

impl<T: Vdl> Vdl for Vec<T> {
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        let p = d.begin::<Self>(Kind::List, "");
        let elem = d.resolve::<T>()?;
        d.builder().set_elem(p, elem);
        Ok(p.into())
    }

    fn to_value(&self) -> Value {
        T::seq_to_value(self, false)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        T::seq_from_value(value)
    }
}

impl<T: Vdl, const N: usize> Vdl for [T; N] {
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        let p = d.begin::<Self>(Kind::Array, "");
        let elem = d.resolve::<T>()?;
        d.builder().set_elem(p, elem);
        d.builder().set_len(p, N);
        Ok(p.into())
    }

    fn to_value(&self) -> Value {
        T::seq_to_value(self, true)
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        let items = T::seq_from_value(value)?;
        let actual = items.len();
        items
            .try_into()
            .map_err(|_| ConversionError::LengthMismatch {
                expected: N,
                actual,
            })
    }
}

impl<T: Vdl> Vdl for Option<T> {
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        let p = d.begin::<Self>(Kind::Optional, "");
        let elem = d.resolve::<T>()?;
        d.builder().set_elem(p, elem);
        Ok(p.into())
    }

    fn to_value(&self) -> Value {
        Value::Optional(self.as_ref().map(|v| Box::new(v.to_value())))
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        match value {
            Value::Optional(inner) => inner.map(|v| T::from_value(*v)).transpose(),
            other => Err(shape(Kind::Optional, &other)),
        }
    }
}

impl<T: Vdl> Vdl for Box<T> {
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        d.resolve::<T>()
    }

    fn to_value(&self) -> Value {
        (**self).to_value()
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        T::from_value(value).map(Box::new)
    }
}

fn set_items(value: Value) -> Result<Vec<Value>, ConversionError> {
    match value {
        Value::Set(items) => Ok(items),
        other => Err(shape(Kind::Set, &other)),
    }
}

fn map_pairs(value: Value) -> Result<Vec<(Value, Value)>, ConversionError> {
    match value {
        Value::Map(pairs) => Ok(pairs),
        other => Err(shape(Kind::Map, &other)),
    }
}

fn describe_set<S: Vdl, K: Vdl>(d: &mut Describer) -> Result<TypeRef, TypeError> {
    let p = d.begin::<S>(Kind::Set, "");
    let key = d.resolve::<K>()?;
    d.builder().set_key(p, key);
    Ok(p.into())
}

fn describe_map<M: Vdl, K: Vdl, V: Vdl>(d: &mut Describer) -> Result<TypeRef, TypeError> {
    let p = d.begin::<M>(Kind::Map, "");
    let key = d.resolve::<K>()?;
    let elem = d.resolve::<V>()?;
    d.builder().set_key(p, key);
    d.builder().set_elem(p, elem);
    Ok(p.into())
}

impl<K: Vdl + Ord> Vdl for BTreeSet<K> {
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        describe_set::<Self, K>(d)
    }

    fn to_value(&self) -> Value {
        Value::Set(self.iter().map(Vdl::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        set_items(value)?.into_iter().map(K::from_value).collect()
    }
}

impl<K, S> Vdl for HashSet<K, S>
where
    K: Vdl + Eq + Hash,
    S: BuildHasher + Default + Send + 'static,
{
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        describe_set::<Self, K>(d)
    }

    fn to_value(&self) -> Value {
        Value::Set(self.iter().map(Vdl::to_value).collect())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        set_items(value)?.into_iter().map(K::from_value).collect()
    }
}

impl<K: Vdl + Ord, V: Vdl> Vdl for BTreeMap<K, V> {
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        describe_map::<Self, K, V>(d)
    }

    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.to_value(), v.to_value())).collect())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        map_pairs(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

impl<K, V, S> Vdl for HashMap<K, V, S>
where
    K: Vdl + Eq + Hash,
    V: Vdl,
    S: BuildHasher + Default + Send + 'static,
{
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError> {
        describe_map::<Self, K, V>(d)
    }

    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.to_value(), v.to_value())).collect())
    }

    fn from_value(value: Value) -> Result<Self, ConversionError> {
        map_pairs(value)?
            .into_iter()
            .map(|(k, v)| Ok((K::from_value(k)?, V::from_value(v)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::type_of;
    use super::*;
    use rustc_hash::FxHashMap;

    #[test]
    fn test_bytes_use_compact_value() {
        assert_eq!(vec![1u8, 2].to_value(), Value::Bytes(vec![1, 2]));
        assert_eq!([7u8; 3].to_value(), Value::Bytes(vec![7, 7, 7]));
        assert_eq!(Vec::<u8>::from_value(Value::Bytes(vec![5])), Ok(vec![5]));
        assert_eq!(
            Vec::<u8>::from_value(Value::List(vec![Value::Byte(5)])),
            Ok(vec![5])
        );
    }

    #[test]
    fn test_array_length_checked() {
        assert_eq!(<[u8; 2]>::from_value(Value::Bytes(vec![1, 2])), Ok([1, 2]));
        assert_eq!(
            <[u8; 2]>::from_value(Value::Bytes(vec![1])),
            Err(ConversionError::LengthMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert_eq!(
            <[i16; 2]>::from_value(Value::Array(vec![Value::Int16(1), Value::Int16(-1)])),
            Ok([1, -1])
        );
    }

    #[test]
    fn test_option_and_box() {
        let ty = type_of::<Option<Box<i32>>>();
        assert_eq!(ty.unwrap().unique(), "?int32");
        assert_eq!(Some(3i32).to_value(), Value::some(Value::Int32(3)));
        assert_eq!(Option::<i32>::from_value(Value::Optional(None)), Ok(None));
    }

    #[test]
    fn test_hash_collections_share_types() {
        let fx = type_of::<FxHashMap<String, i64>>().unwrap();
        let std = type_of::<HashMap<String, i64>>().unwrap();
        let btree = type_of::<BTreeMap<String, i64>>().unwrap();
        assert_eq!(fx, std);
        assert_eq!(std, btree);
        assert_eq!(
            type_of::<HashSet<u16>>().unwrap(),
            type_of::<BTreeSet<u16>>().unwrap()
        );
    }

    #[test]
    fn test_map_from_value() {
        let value = Value::Map(vec![("a".into(), Value::Int64(1))]);
        let map = BTreeMap::<String, i64>::from_value(value).unwrap();
        assert_eq!(map.get("a"), Some(&1));
        assert!(BTreeMap::<String, i64>::from_value(Value::Set(vec![])).is_err());
    }
}
