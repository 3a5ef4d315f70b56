//! Interned, immutable type graph nodes.
//!
//! Every [`Type`] lives in a process-wide table keyed by its unique string.
//! Nodes are allocated once and never freed, so a `Type` is a `Copy` handle
//! and two handles are equal exactly when they name the same type. Cyclic
//! graphs (e.g. `Tree []Tree`) are wired up by [`TypeBuilder::build`], which
//! allocates all nodes of a batch before filling in their payloads.
//!
//! [`TypeBuilder::build`]: crate::model::builder::TypeBuilder::build

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;

use lazy_static::lazy_static;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::model::builder::TypeBuilder;
use crate::model::Kind;

/// A named, typed field of a struct or union.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Field {
    /// Field name, unique within its type.
    pub name: String,
    /// Field type.
    pub ty: Type,
}

/// Kind-dependent part of a type node, set once when its batch is frozen.
#[derive(Debug, Default)]
pub(crate) struct Payload {
    pub elem: Option<Type>,
    pub key: Option<Type>,
    pub len: usize,
    pub fields: Vec<Field>,
    pub labels: Vec<String>,
}

pub(crate) struct TypeNode {
    kind: Kind,
    name: String,
    unique: String,
    payload: OnceLock<Payload>,
}

/// Handle to an interned type.
#[derive(Clone, Copy)]
pub struct Type(&'static TypeNode);

impl Type {
    /// Returns the kind of this type (the base kind for named types).
    #[inline]
    pub fn kind(self) -> Kind {
        self.0.kind
    }

    /// Returns the type name, empty for unnamed types.
    #[inline]
    pub fn name(self) -> &'static str {
        &self.0.name
    }

    /// Returns true if the type has a name.
    pub fn is_named(self) -> bool {
        !self.0.name.is_empty()
    }

    /// Returns the canonical string identifying this type structurally.
    pub fn unique(self) -> &'static str {
        &self.0.unique
    }

    fn payload(self) -> Option<&'static Payload> {
        self.0.payload.get()
    }

    /// Element type of arrays, lists, maps and optionals.
    pub fn elem(self) -> Option<Type> {
        self.payload().and_then(|p| p.elem)
    }

    /// Key type of sets and maps.
    pub fn key(self) -> Option<Type> {
        self.payload().and_then(|p| p.key)
    }

    /// Fixed length of an array type, 0 for every other kind.
    pub fn array_len(self) -> usize {
        self.payload().map_or(0, |p| p.len)
    }

    /// Fields of a struct or union, in declared order.
    pub fn fields(self) -> &'static [Field] {
        self.payload().map_or(&[], |p| p.fields.as_slice())
    }

    /// Returns the field at `index`.
    pub fn field(self, index: usize) -> Option<&'static Field> {
        self.fields().get(index)
    }

    /// Returns the index of the field called `name`.
    pub fn field_index(self, name: &str) -> Option<usize> {
        self.fields().iter().position(|f| f.name == name)
    }

    /// Labels of an enum, in declared order.
    pub fn labels(self) -> &'static [String] {
        self.payload().map_or(&[], |p| p.labels.as_slice())
    }

    /// Returns the index of `label` within an enum.
    pub fn label_index(self, label: &str) -> Option<usize> {
        self.labels().iter().position(|l| l == label)
    }

    /// Returns true for lists and arrays of bytes.
    pub fn is_bytes(self) -> bool {
        matches!(self.kind(), Kind::List | Kind::Array)
            && self.elem().is_some_and(|e| e.kind() == Kind::Byte)
    }

    /// Returns true if values of this type may be nil (any, optional).
    pub fn can_be_nil(self) -> bool {
        matches!(self.kind(), Kind::Any | Kind::Optional)
    }

    /// Returns the unnamed scalar type of the given kind.
    ///
    /// Returns `None` for kinds that need a payload (enum and composites).
    pub fn primitive(kind: Kind) -> Option<Type> {
        PRIMITIVES.get(&kind).copied()
    }

    pub fn any() -> Type {
        PRIMITIVES[&Kind::Any]
    }
    pub fn bool() -> Type {
        PRIMITIVES[&Kind::Bool]
    }
    pub fn byte() -> Type {
        PRIMITIVES[&Kind::Byte]
    }
    pub fn uint16() -> Type {
        PRIMITIVES[&Kind::Uint16]
    }
    pub fn uint32() -> Type {
        PRIMITIVES[&Kind::Uint32]
    }
    pub fn uint64() -> Type {
        PRIMITIVES[&Kind::Uint64]
    }
    pub fn int16() -> Type {
        PRIMITIVES[&Kind::Int16]
    }
    pub fn int32() -> Type {
        PRIMITIVES[&Kind::Int32]
    }
    pub fn int64() -> Type {
        PRIMITIVES[&Kind::Int64]
    }
    pub fn float32() -> Type {
        PRIMITIVES[&Kind::Float32]
    }
    pub fn float64() -> Type {
        PRIMITIVES[&Kind::Float64]
    }
    pub fn complex64() -> Type {
        PRIMITIVES[&Kind::Complex64]
    }
    pub fn complex128() -> Type {
        PRIMITIVES[&Kind::Complex128]
    }
    pub fn string() -> Type {
        PRIMITIVES[&Kind::String]
    }
    pub fn type_object() -> Type {
        PRIMITIVES[&Kind::TypeObject]
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for Type {}

impl Hash for Type {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_named() {
            f.write_str(self.name())
        } else {
            f.write_str(self.unique())
        }
    }
}

impl fmt::Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Type({})", self.unique())
    }
}

// =============================================================================
// PROCESS-WIDE TABLE
// =============================================================================

/// Interning table shared by every builder in the process.
///
/// Growth is monotonic: nodes are leaked on allocation and live until exit.
#[derive(Default)]
pub(crate) struct TypeTable {
    by_unique: FxHashMap<&'static str, Type>,
}

impl TypeTable {
    pub(crate) fn lookup(&self, unique: &str) -> Option<Type> {
        self.by_unique.get(unique).copied()
    }

    /// Allocates a node whose payload is filled in later by [`Type::freeze`].
    pub(crate) fn allocate(&mut self, kind: Kind, name: String, unique: String) -> Type {
        let node: &'static TypeNode = Box::leak(Box::new(TypeNode {
            kind,
            name,
            unique,
            payload: OnceLock::new(),
        }));
        Type(node)
    }

    pub(crate) fn publish(&mut self, ty: Type) {
        self.by_unique.insert(ty.unique(), ty);
    }

    pub(crate) fn len(&self) -> usize {
        self.by_unique.len()
    }
}

impl Type {
    /// Sets the payload of a freshly allocated node. Later calls are ignored.
    pub(crate) fn freeze(self, payload: Payload) {
        let _ = self.0.payload.set(payload);
    }
}

lazy_static! {
    pub(crate) static ref TABLE: Mutex<TypeTable> = Mutex::new(TypeTable::default());

    static ref PRIMITIVES: FxHashMap<Kind, Type> = {
        let mut builder = TypeBuilder::new();
        let scalars: Vec<_> = Kind::ALL
            .into_iter()
            .filter(|k| k.is_scalar())
            .map(|k| (k, builder.new_pending(k)))
            .collect();
        let built = builder
            .build()
            .expect("scalar types always satisfy builder validation");
        scalars.into_iter().map(|(k, p)| (k, built[p])).collect()
    };
}

/// Number of distinct types interned so far in this process.
pub fn interned_count() -> usize {
    TABLE.lock().len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitives_are_interned() {
        assert_eq!(Type::bool(), Type::bool());
        assert_ne!(Type::bool(), Type::byte());
        assert_eq!(Type::primitive(Kind::Int32), Some(Type::int32()));
        assert_eq!(Type::primitive(Kind::List), None);
    }

    #[test]
    fn test_primitive_strings() {
        assert_eq!(Type::float64().unique(), "float64");
        assert_eq!(Type::type_object().to_string(), "typeobject");
        assert_eq!(Type::any().kind(), Kind::Any);
        assert!(!Type::string().is_named());
        assert!(Type::any().can_be_nil());
    }

    #[test]
    fn test_scalar_payload_is_empty() {
        let t = Type::uint64();
        assert!(t.elem().is_none());
        assert!(t.key().is_none());
        assert!(t.fields().is_empty());
        assert!(t.labels().is_empty());
        assert_eq!(t.array_len(), 0);
    }
}
