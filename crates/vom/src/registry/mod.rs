//! Mapping between Rust types and wire types.
//!
//! A Rust type takes part in encoding by implementing [`Vdl`]: it describes
//! its wire type once and converts itself to and from the dynamic [`Value`]
//! representation. Descriptions are cached process-wide by `TypeId`, so
//! [`type_of`] only walks a type's description the first time it is asked.
//!
//! Structs, enums and unions are normally described with the
//! [`vdl_struct!`](crate::vdl_struct), [`vdl_enum!`](crate::vdl_enum) and
//! [`vdl_union!`](crate::vdl_union) macros:
//!
//! ```rust
//! use vom::vdl_struct;
//!
//! #[derive(Debug, PartialEq)]
//! struct Point {
//!     x: i32,
//!     y: i32,
//! }
//!
//! vdl_struct!(Point = "geo.Point" { x: i32 as "X", y: i32 as "Y" });
//!
//! let bytes = vom::encode(&Point { x: 1, y: -2 }).unwrap();
//! let back: Point = vom::decode(&bytes).unwrap();
//! assert_eq!(back, Point { x: 1, y: -2 });
//! ```

mod impls;
mod macros;

use std::any::{Any, TypeId};

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::bridge::Native;
use crate::error::{ConversionError, TypeError};
use crate::model::{Kind, PendingType, Type, TypeBuilder, TypeRef, Value};

/// A Rust type with a wire representation.
pub trait Vdl: Sized + Send + 'static {
    /// Describes this type's wire type, resolving component types through `d`.
    fn describe(d: &mut Describer) -> Result<TypeRef, TypeError>;

    /// Converts to the dynamic value of this type's wire type.
    fn to_value(&self) -> Value;

    /// Rebuilds from a dynamic value of this type's wire type.
    fn from_value(value: Value) -> Result<Self, ConversionError>;

    /// Value of a list or array holding `items`.
    ///
    /// Byte sequences override this to produce [`Value::Bytes`].
    fn seq_to_value(items: &[Self], array: bool) -> Value {
        let items = items.iter().map(Vdl::to_value).collect();
        if array { Value::Array(items) } else { Value::List(items) }
    }

    /// Elements of a list or array value.
    fn seq_from_value(value: Value) -> Result<Vec<Self>, ConversionError> {
        match value {
            Value::List(items) | Value::Array(items) => {
                items.into_iter().map(Self::from_value).collect()
            }
            other => Err(shape(Kind::List, &other)),
        }
    }
}

/// Rebuilds a boxed host value from a value of a registered named type.
pub type Rebuild = fn(Value) -> Result<Box<dyn Any + Send>, ConversionError>;

/// Reverse-map entry for one named wire type.
#[derive(Clone, Copy)]
struct NamedEntry {
    rust_name: &'static str,
    ty: Type,
    rebuild: Rebuild,
}

#[derive(Default)]
struct Registry {
    by_native: FxHashMap<TypeId, Type>,
    by_name: FxHashMap<&'static str, NamedEntry>,
}

lazy_static! {
    static ref REGISTRY: Mutex<Registry> = Mutex::new(Registry::default());
}

fn cached(id: TypeId) -> Option<Type> {
    REGISTRY.lock().by_native.get(&id).copied()
}

fn rebuild<T: Vdl>(value: Value) -> Result<Box<dyn Any + Send>, ConversionError> {
    T::from_value(value).map(|v| Box::new(v) as Box<dyn Any + Send>)
}

struct Described {
    id: TypeId,
    rust_name: &'static str,
    ty: TypeRef,
    rebuild: Rebuild,
}

/// Collects the pending types for one derivation batch.
///
/// Passed to [`Vdl::describe`]; component types are resolved through
/// [`Describer::resolve`], which returns placeholders for types already
/// being described so recursive types terminate.
pub struct Describer {
    builder: TypeBuilder,
    in_progress: FxHashMap<TypeId, TypeRef>,
    described: Vec<Described>,
    natives: FxHashSet<TypeId>,
}

impl Describer {
    fn new() -> Self {
        Self {
            builder: TypeBuilder::new(),
            in_progress: FxHashMap::default(),
            described: Vec::new(),
            natives: FxHashSet::default(),
        }
    }

    /// Resolves the wire type of `T`, describing it if needed.
    pub fn resolve<T: Vdl>(&mut self) -> Result<TypeRef, TypeError> {
        let id = TypeId::of::<T>();
        if let Some(ty) = cached(id) {
            return Ok(ty.into());
        }
        if let Some(r) = self.in_progress.get(&id) {
            return Ok(*r);
        }
        let r = T::describe(self)?;
        self.in_progress.insert(id, r);
        self.described.push(Described {
            id,
            rust_name: std::any::type_name::<T>(),
            ty: r,
            rebuild: rebuild::<T>,
        });
        Ok(r)
    }

    /// Creates the placeholder for `T` and registers it before any
    /// component is resolved. An empty `name` leaves the type unnamed.
    pub fn begin<T: Vdl>(&mut self, kind: Kind, name: &str) -> PendingType {
        let p = self.builder.new_pending(kind);
        if !name.is_empty() {
            self.builder.set_name(p, name);
        }
        self.in_progress.insert(TypeId::of::<T>(), p.into());
        p
    }

    /// Describes the native `N` as its wire type and marks it as the
    /// preferred host representation of that type.
    pub fn native<N: Native + Vdl>(&mut self) -> Result<TypeRef, TypeError> {
        let r = self.resolve::<N::Wire>()?;
        self.natives.insert(TypeId::of::<N>());
        Ok(r)
    }

    /// The builder holding this batch's pending types.
    pub fn builder(&mut self) -> &mut TypeBuilder {
        &mut self.builder
    }
}

/// Returns the wire type of `T`, deriving and caching it on first use.
pub fn type_of<T: Vdl>() -> Result<Type, TypeError> {
    if let Some(ty) = cached(TypeId::of::<T>()) {
        return Ok(ty);
    }

    let mut d = Describer::new();
    let root = d.resolve::<T>()?;
    let Describer {
        builder,
        described,
        natives,
        ..
    } = d;
    let built = builder.build()?;
    let finalize = |r: TypeRef| match r {
        TypeRef::Built(ty) => ty,
        TypeRef::Pending(p) => built[p],
    };

    let mut registry = REGISTRY.lock();
    for entry in &described {
        let ty = finalize(entry.ty);
        registry.by_native.entry(entry.id).or_insert(ty);
        if !ty.is_named() {
            continue;
        }
        let named = NamedEntry {
            rust_name: entry.rust_name,
            ty,
            rebuild: entry.rebuild,
        };
        if natives.contains(&entry.id) {
            registry.by_name.insert(ty.name(), named);
        } else {
            registry.by_name.entry(ty.name()).or_insert(named);
        }
    }
    log::debug!(
        "derived {} as {} ({} native types described)",
        std::any::type_name::<T>(),
        finalize(root),
        described.len()
    );
    // A concurrent derivation may have won; the interned type is the same.
    Ok(registry
        .by_native
        .get(&TypeId::of::<T>())
        .copied()
        .unwrap_or_else(|| finalize(root)))
}

/// Rebuilds the registered host value for a value of the named type `ty`.
///
/// Returns `Ok(None)` when no Rust type has been registered under the
/// type's name, or the registered type differs structurally.
pub fn native_from_value(
    ty: Type,
    value: Value,
) -> Result<Option<Box<dyn Any + Send>>, ConversionError> {
    let entry = match REGISTRY.lock().by_name.get(ty.name()) {
        Some(entry) if entry.ty == ty => *entry,
        _ => return Ok(None),
    };
    (entry.rebuild)(value).map(Some)
}

/// Looks up the Rust type registered for a wire type name.
pub fn lookup_name(name: &str) -> Option<(&'static str, Type)> {
    REGISTRY
        .lock()
        .by_name
        .get(name)
        .map(|entry| (entry.rust_name, entry.ty))
}

// =============================================================================
// HELPERS FOR DESCRIBING MACROS
// =============================================================================

pub(crate) fn shape(expected: Kind, found: &Value) -> ConversionError {
    ConversionError::Shape {
        expected,
        found: found.kind_name(),
    }
}

/// Field values of a struct value, in declared order.
pub fn struct_fields(value: Value) -> Result<std::vec::IntoIter<Value>, ConversionError> {
    match value {
        Value::Struct(fields) => Ok(fields.into_iter()),
        other => Err(shape(Kind::Struct, &other)),
    }
}

/// Converts the next field value of a struct.
pub fn next_field<T: Vdl>(
    fields: &mut std::vec::IntoIter<Value>,
    name: &'static str,
    target: &'static str,
) -> Result<T, ConversionError> {
    let value = fields.next().ok_or_else(|| ConversionError::UnknownField {
        field: name.to_string(),
        target: target.to_string(),
    })?;
    T::from_value(value)
}

/// Label of an enum value.
pub fn enum_label(
    value: Value,
    labels: &[&'static str],
    target: &'static str,
) -> Result<&'static str, ConversionError> {
    match value {
        Value::Enum(index) => {
            labels
                .get(index)
                .copied()
                .ok_or_else(|| ConversionError::UnknownLabel {
                    label: format!("#{index}"),
                    target: target.to_string(),
                })
        }
        other => Err(shape(Kind::Enum, &other)),
    }
}

/// Active field name and value of a union value.
pub fn union_parts(
    value: Value,
    fields: &[&'static str],
    target: &'static str,
) -> Result<(&'static str, Value), ConversionError> {
    match value {
        Value::Union(index, inner) => fields
            .get(index)
            .map(|name| (*name, *inner))
            .ok_or_else(|| ConversionError::UnknownField {
                field: format!("#{index}"),
                target: target.to_string(),
            }),
        other => Err(shape(Kind::Union, &other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Field;
    use std::collections::BTreeMap;

    #[derive(Debug, Clone, PartialEq)]
    struct Point {
        x: i32,
        y: i32,
    }

    crate::vdl_struct!(Point = "test.RegPoint" { x: i32 as "X", y: i32 as "Y" });

    #[derive(Debug, Clone, PartialEq)]
    struct Tree {
        label: String,
        kids: Vec<Tree>,
    }

    crate::vdl_struct!(Tree = "test.RegTree" { label: String as "Label", kids: Vec<Tree> as "Kids" });

    #[derive(Debug, Clone, Copy, PartialEq)]
    enum Shade {
        Light,
        Dark,
    }

    crate::vdl_enum!(Shade = "test.RegShade" { Light, Dark });

    #[derive(Debug, Clone, PartialEq)]
    enum Token {
        Word(String),
        Count(u32),
    }

    crate::vdl_union!(Token = "test.RegToken" { Word(String), Count(u32) });

    #[derive(Debug, Clone, PartialEq)]
    struct Chain {
        weight: u16,
        rest: Vec<Chain>,
    }

    crate::vdl_struct!(Chain = "test.RegChain" { weight: u16 as "Weight", rest: Vec<Chain> as "Rest" });

    fn build_chain_by_hand() -> Type {
        let mut b = crate::model::TypeBuilder::new();
        let chain = b.new_pending(Kind::Struct);
        b.set_name(chain, "test.RegChain");
        let rest = b.new_pending(Kind::List);
        b.set_elem(rest, chain);
        b.add_field(chain, "Weight", Type::uint16());
        b.add_field(chain, "Rest", rest);
        b.build().unwrap()[chain]
    }

    #[test]
    fn test_primitive_types() {
        assert_eq!(type_of::<bool>().unwrap(), Type::bool());
        assert_eq!(type_of::<u8>().unwrap(), Type::byte());
        assert_eq!(type_of::<i64>().unwrap(), Type::int64());
        assert_eq!(type_of::<String>().unwrap(), Type::string());
        assert_eq!(type_of::<crate::model::Any>().unwrap(), Type::any());
    }

    #[test]
    fn test_composites_are_interned() {
        let list = type_of::<Vec<i32>>().unwrap();
        assert_eq!(list.unique(), "[]int32");
        assert_eq!(list, crate::model::list_of(Type::int32()).unwrap());
        assert_eq!(type_of::<[u8; 4]>().unwrap().unique(), "[4]byte");
        assert_eq!(
            type_of::<BTreeMap<String, Vec<u8>>>().unwrap().unique(),
            "map[string][]byte"
        );
    }

    #[test]
    fn test_struct_description() {
        let ty = type_of::<Point>().unwrap();
        assert_eq!(ty.kind(), Kind::Struct);
        assert_eq!(ty.name(), "test.RegPoint");
        assert_eq!(
            ty.fields(),
            &[
                Field {
                    name: "X".into(),
                    ty: Type::int32()
                },
                Field {
                    name: "Y".into(),
                    ty: Type::int32()
                },
            ]
        );
        let value = Point { x: 3, y: 4 }.to_value();
        assert_eq!(value, Value::Struct(vec![Value::Int32(3), Value::Int32(4)]));
        assert_eq!(Point::from_value(value), Ok(Point { x: 3, y: 4 }));
    }

    #[test]
    fn test_recursive_struct() {
        let ty = type_of::<Tree>().unwrap();
        let kids = ty.fields()[1].ty;
        assert_eq!(kids.elem(), Some(ty));
        assert_eq!(type_of::<Vec<Tree>>().unwrap(), kids);
    }

    #[test]
    fn test_enum_and_union() {
        let shade = type_of::<Shade>().unwrap();
        assert_eq!(shade.labels(), &["Light".to_string(), "Dark".to_string()]);
        assert_eq!(Shade::Dark.to_value(), Value::Enum(1));
        assert_eq!(Shade::from_value(Value::Enum(0)), Ok(Shade::Light));
        assert!(Shade::from_value(Value::Enum(7)).is_err());

        let token = type_of::<Token>().unwrap();
        assert_eq!(token.fields()[1].name, "Count");
        let value = Token::Count(9).to_value();
        assert_eq!(value, Value::Union(1, Box::new(Value::Uint32(9))));
        assert_eq!(Token::from_value(value), Ok(Token::Count(9)));
    }

    #[test]
    fn test_variant_indices_follow_declaration() {
        use crate::bridge::RetryCode;

        assert_eq!(Shade::Light.to_value(), Value::Enum(0));
        assert_eq!(
            Token::Word("w".into()).to_value(),
            Value::Union(0, Box::new(Value::String("w".into())))
        );
        let labels = type_of::<RetryCode>().unwrap().labels();
        for code in [
            RetryCode::NoRetry,
            RetryCode::RetryConnection,
            RetryCode::RetryRefetch,
            RetryCode::RetryBackoff,
        ] {
            let Value::Enum(index) = code.to_value() else {
                panic!("{code:?} is not an enum value");
            };
            assert_eq!(labels[index], format!("{code:?}"));
        }
    }

    #[test]
    fn test_concurrent_derivation_converges() {
        let threads = 8;
        let barrier = std::sync::Barrier::new(threads);
        let handles: Vec<Type> = std::thread::scope(|s| {
            let workers: Vec<_> = (0..threads)
                .map(|i| {
                    let barrier = &barrier;
                    s.spawn(move || {
                        barrier.wait();
                        if i % 2 == 0 {
                            type_of::<Chain>().unwrap()
                        } else {
                            build_chain_by_hand()
                        }
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });
        assert_eq!(handles.len(), threads);
        assert!(handles.iter().all(|ty| *ty == handles[0]));
        assert_eq!(handles[0], type_of::<Chain>().unwrap());
        assert_eq!(lookup_name("test.RegChain").map(|(_, ty)| ty), Some(handles[0]));
    }

    #[test]
    fn test_named_reverse_lookup() {
        let ty = type_of::<Point>().unwrap();
        let (rust_name, found) = lookup_name("test.RegPoint").unwrap();
        assert!(rust_name.ends_with("Point"));
        assert_eq!(found, ty);

        let value = Value::Struct(vec![Value::Int32(1), Value::Int32(2)]);
        let boxed = native_from_value(ty, value).unwrap().unwrap();
        assert_eq!(boxed.downcast_ref::<Point>(), Some(&Point { x: 1, y: 2 }));
        assert!(native_from_value(Type::int32(), Value::Int32(1)).unwrap().is_none());
    }

    #[test]
    fn test_shape_mismatch() {
        assert_eq!(
            bool::from_value(Value::Int32(1)),
            Err(ConversionError::Shape {
                expected: Kind::Bool,
                found: "int32"
            })
        );
        assert!(matches!(
            Point::from_value(Value::Struct(vec![Value::Int32(1)])),
            Err(ConversionError::UnknownField { .. })
        ));
    }
}
