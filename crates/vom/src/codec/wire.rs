//! Wire vocabulary: the bootstrap type table and in-band type descriptions.
//!
//! Bootstrap types have fixed ids shared by every encoder and decoder and
//! are never defined on the wire. Every other type is sent once per stream
//! as a [`WireType`], itself encoded as an ordinary value of the bootstrap
//! `wireType` union.

use lazy_static::lazy_static;
use rustc_hash::FxHashMap;

use crate::error::TypeError;
use crate::model::{Kind, PendingType, Type, TypeBuilder, TypeRef, Value};

pub const ID_ANY: u64 = 1;
pub const ID_TYPE_OBJECT: u64 = 2;
pub const ID_BOOL: u64 = 3;
pub const ID_STRING: u64 = 4;
pub const ID_BYTE: u64 = 5;
pub const ID_UINT16: u64 = 6;
pub const ID_UINT32: u64 = 7;
pub const ID_UINT64: u64 = 8;
pub const ID_INT16: u64 = 9;
pub const ID_INT32: u64 = 10;
pub const ID_INT64: u64 = 11;
pub const ID_FLOAT32: u64 = 12;
pub const ID_FLOAT64: u64 = 13;
pub const ID_COMPLEX64: u64 = 14;
pub const ID_COMPLEX128: u64 = 15;
pub const ID_WIRE_NAMED: u64 = 16;
pub const ID_WIRE_ENUM: u64 = 17;
pub const ID_WIRE_ARRAY: u64 = 18;
pub const ID_WIRE_LIST: u64 = 19;
pub const ID_WIRE_SET: u64 = 20;
pub const ID_WIRE_MAP: u64 = 21;
pub const ID_WIRE_STRUCT: u64 = 22;
pub const ID_WIRE_FIELD: u64 = 23;
pub const ID_WIRE_FIELD_LIST: u64 = 24;
pub const ID_WIRE_UNION: u64 = 25;
pub const ID_BYTE_LIST: u64 = 26;
pub const ID_STRING_LIST: u64 = 27;
pub const ID_WIRE_OPTIONAL: u64 = 28;

/// One field of a struct or union description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireField {
    pub name: String,
    pub ty: u64,
}

/// In-band description of a non-bootstrap type, referring to other types by id.
///
/// Variant order is the field order of the `wireType` union.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WireType {
    Named { name: String, base: u64 },
    Enum { name: String, labels: Vec<String> },
    Array { name: String, elem: u64, len: u64 },
    List { name: String, elem: u64 },
    Set { name: String, key: u64 },
    Map { name: String, key: u64, elem: u64 },
    Struct { name: String, fields: Vec<WireField> },
    Union { name: String, fields: Vec<WireField> },
    Optional { name: String, elem: u64 },
}

impl WireType {
    /// Name carried by the description, empty for unnamed types.
    pub fn name(&self) -> &str {
        match self {
            WireType::Named { name, .. }
            | WireType::Enum { name, .. }
            | WireType::Array { name, .. }
            | WireType::List { name, .. }
            | WireType::Set { name, .. }
            | WireType::Map { name, .. }
            | WireType::Struct { name, .. }
            | WireType::Union { name, .. }
            | WireType::Optional { name, .. } => name,
        }
    }

    /// Ids of every type this description refers to, in wire order.
    pub fn refs(&self) -> Vec<u64> {
        match self {
            WireType::Named { base, .. } => vec![*base],
            WireType::Enum { .. } => Vec::new(),
            WireType::Array { elem, .. }
            | WireType::List { elem, .. }
            | WireType::Optional { elem, .. } => vec![*elem],
            WireType::Set { key, .. } => vec![*key],
            WireType::Map { key, elem, .. } => vec![*key, *elem],
            WireType::Struct { fields, .. } | WireType::Union { fields, .. } => {
                fields.iter().map(|f| f.ty).collect()
            }
        }
    }

    fn index(&self) -> usize {
        match self {
            WireType::Named { .. } => 0,
            WireType::Enum { .. } => 1,
            WireType::Array { .. } => 2,
            WireType::List { .. } => 3,
            WireType::Set { .. } => 4,
            WireType::Map { .. } => 5,
            WireType::Struct { .. } => 6,
            WireType::Union { .. } => 7,
            WireType::Optional { .. } => 8,
        }
    }

    /// Converts the description to a value of the `wireType` union.
    pub fn to_value(&self) -> Value {
        let name = Value::String(self.name().to_string());
        let id = Value::Uint64;
        let body = match self {
            WireType::Named { base, .. } => vec![name, id(*base)],
            WireType::Enum { labels, .. } => vec![
                name,
                Value::List(labels.iter().cloned().map(Value::String).collect()),
            ],
            WireType::Array { elem, len, .. } => vec![name, id(*elem), id(*len)],
            WireType::List { elem, .. } | WireType::Optional { elem, .. } => vec![name, id(*elem)],
            WireType::Set { key, .. } => vec![name, id(*key)],
            WireType::Map { key, elem, .. } => vec![name, id(*key), id(*elem)],
            WireType::Struct { fields, .. } | WireType::Union { fields, .. } => vec![
                name,
                Value::List(
                    fields
                        .iter()
                        .map(|f| Value::Struct(vec![Value::String(f.name.clone()), id(f.ty)]))
                        .collect(),
                ),
            ],
        };
        Value::Union(self.index(), Box::new(Value::Struct(body)))
    }

    /// Parses a decoded `wireType` union value.
    pub fn from_value(value: Value) -> Result<WireType, String> {
        let found = value.kind_name();
        let Value::Union(index, body) = value else {
            return Err(format!("expected wireType union, found {found}"));
        };
        let Value::Struct(fields) = *body else {
            return Err("wireType variant is not a struct".to_string());
        };
        let mut fields = fields.into_iter();
        let name = match fields.next() {
            Some(Value::String(s)) => s,
            _ => return Err("missing type name".to_string()),
        };
        let wire = match index {
            0 => WireType::Named {
                name,
                base: take_id(&mut fields, "base")?,
            },
            2 => WireType::Array {
                name,
                elem: take_id(&mut fields, "elem")?,
                len: take_id(&mut fields, "len")?,
            },
            3 => WireType::List {
                name,
                elem: take_id(&mut fields, "elem")?,
            },
            4 => WireType::Set {
                name,
                key: take_id(&mut fields, "key")?,
            },
            5 => WireType::Map {
                name,
                key: take_id(&mut fields, "key")?,
                elem: take_id(&mut fields, "elem")?,
            },
            8 => WireType::Optional {
                name,
                elem: take_id(&mut fields, "elem")?,
            },
            1 => match fields.next() {
                Some(Value::List(labels)) => WireType::Enum {
                    name,
                    labels: labels
                        .into_iter()
                        .map(|l| match l {
                            Value::String(s) => Ok(s),
                            other => Err(format!("enum label is {}", other.kind_name())),
                        })
                        .collect::<Result<_, _>>()?,
                },
                _ => return Err("missing enum labels".to_string()),
            },
            6 | 7 => {
                let list = match fields.next() {
                    Some(Value::List(list)) => list,
                    _ => return Err("missing field list".to_string()),
                };
                let fields = list
                    .into_iter()
                    .map(|f| match f {
                        Value::Struct(parts) => match parts.as_slice() {
                            [Value::String(name), Value::Uint64(ty)] => Ok(WireField {
                                name: name.clone(),
                                ty: *ty,
                            }),
                            _ => Err("malformed wireField".to_string()),
                        },
                        other => Err(format!("wireField is {}", other.kind_name())),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                if index == 6 {
                    WireType::Struct { name, fields }
                } else {
                    WireType::Union { name, fields }
                }
            }
            other => return Err(format!("unknown wireType variant {other}")),
        };
        Ok(wire)
    }
}

fn take_id(fields: &mut impl Iterator<Item = Value>, what: &str) -> Result<u64, String> {
    match fields.next() {
        Some(Value::Uint64(id)) => Ok(id),
        _ => Err(format!("missing {what} id")),
    }
}

// =============================================================================
// BOOTSTRAP TABLE
// =============================================================================

struct Bootstrap {
    by_id: FxHashMap<u64, Type>,
    by_type: FxHashMap<Type, u64>,
    wire_type: Type,
}

lazy_static! {
    static ref BOOTSTRAP: Bootstrap = build_bootstrap().expect("bootstrap types are well formed");
}

fn build_bootstrap() -> Result<Bootstrap, TypeError> {
    let mut b = TypeBuilder::new();
    let string_list = b.new_pending(Kind::List);
    b.set_elem(string_list, Type::string());
    let byte_list = b.new_pending(Kind::List);
    b.set_elem(byte_list, Type::byte());

    let string: TypeRef = Type::string().into();
    let id: TypeRef = Type::uint64().into();

    let field = wire_struct(&mut b, "wireField", &[("Name", string), ("Type", id)]);
    let field_list = b.new_pending(Kind::List);
    b.set_elem(field_list, field);

    let named = wire_struct(&mut b, "wireNamed", &[("Name", string), ("Base", id)]);
    let enum_ = wire_struct(&mut b, "wireEnum", &[("Name", string), ("Labels", string_list.into())]);
    let array = wire_struct(&mut b, "wireArray", &[("Name", string), ("Elem", id), ("Len", id)]);
    let list = wire_struct(&mut b, "wireList", &[("Name", string), ("Elem", id)]);
    let set = wire_struct(&mut b, "wireSet", &[("Name", string), ("Key", id)]);
    let map = wire_struct(&mut b, "wireMap", &[("Name", string), ("Key", id), ("Elem", id)]);
    let struct_ = wire_struct(&mut b, "wireStruct", &[("Name", string), ("Fields", field_list.into())]);
    let union = wire_struct(&mut b, "wireUnion", &[("Name", string), ("Fields", field_list.into())]);
    let optional = wire_struct(&mut b, "wireOptional", &[("Name", string), ("Elem", id)]);

    let wire_type = b.new_pending(Kind::Union);
    b.set_name(wire_type, "vom.wireType");
    for (variant, p) in [
        ("NamedT", named),
        ("EnumT", enum_),
        ("ArrayT", array),
        ("ListT", list),
        ("SetT", set),
        ("MapT", map),
        ("StructT", struct_),
        ("UnionT", union),
        ("OptionalT", optional),
    ] {
        b.add_field(wire_type, variant, p);
    }

    let built = b.build()?;
    let entries = [
        (ID_ANY, Type::any()),
        (ID_TYPE_OBJECT, Type::type_object()),
        (ID_BOOL, Type::bool()),
        (ID_STRING, Type::string()),
        (ID_BYTE, Type::byte()),
        (ID_UINT16, Type::uint16()),
        (ID_UINT32, Type::uint32()),
        (ID_UINT64, Type::uint64()),
        (ID_INT16, Type::int16()),
        (ID_INT32, Type::int32()),
        (ID_INT64, Type::int64()),
        (ID_FLOAT32, Type::float32()),
        (ID_FLOAT64, Type::float64()),
        (ID_COMPLEX64, Type::complex64()),
        (ID_COMPLEX128, Type::complex128()),
        (ID_WIRE_NAMED, built[named]),
        (ID_WIRE_ENUM, built[enum_]),
        (ID_WIRE_ARRAY, built[array]),
        (ID_WIRE_LIST, built[list]),
        (ID_WIRE_SET, built[set]),
        (ID_WIRE_MAP, built[map]),
        (ID_WIRE_STRUCT, built[struct_]),
        (ID_WIRE_FIELD, built[field]),
        (ID_WIRE_FIELD_LIST, built[field_list]),
        (ID_WIRE_UNION, built[union]),
        (ID_BYTE_LIST, built[byte_list]),
        (ID_STRING_LIST, built[string_list]),
        (ID_WIRE_OPTIONAL, built[optional]),
    ];
    Ok(Bootstrap {
        by_id: entries.iter().copied().collect(),
        by_type: entries.iter().map(|(id, ty)| (*ty, *id)).collect(),
        wire_type: built[wire_type],
    })
}

fn wire_struct(b: &mut TypeBuilder, name: &str, fields: &[(&str, TypeRef)]) -> PendingType {
    let p = b.new_pending(Kind::Struct);
    b.set_name(p, format!("vom.{name}"));
    for (field, ty) in fields {
        b.add_field(p, *field, *ty);
    }
    p
}

/// Returns the bootstrap type with the given id.
pub fn bootstrap_type(id: u64) -> Option<Type> {
    BOOTSTRAP.by_id.get(&id).copied()
}

/// Returns the bootstrap id of `ty`, if it has one.
pub fn bootstrap_id(ty: Type) -> Option<u64> {
    BOOTSTRAP.by_type.get(&ty).copied()
}

/// Returns true if value messages of `ty` carry a byte-length prefix.
///
/// Scalars, strings, enums, type objects and byte collections are
/// self-delimiting and go without one.
pub fn has_length_prefix(ty: Type) -> bool {
    match ty.kind() {
        Kind::Complex64
        | Kind::Complex128
        | Kind::Set
        | Kind::Map
        | Kind::Struct
        | Kind::Union
        | Kind::Optional
        | Kind::Any => true,
        Kind::Array | Kind::List => !ty.is_bytes(),
        _ => false,
    }
}

/// The `wireType` union that type definition messages carry.
pub fn wire_type() -> Type {
    BOOTSTRAP.wire_type
}
