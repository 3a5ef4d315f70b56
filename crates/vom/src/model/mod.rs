//! Type model: kinds, interned types, the pending-type builder and values.
//!
//! - [`Kind`]: the shape tag of a type
//! - [`Type`]: an interned, immutable type handle
//! - [`TypeBuilder`]: two-phase construction of (cyclic) type graphs
//! - [`Value`]: a dynamic value interpreted against a `Type`

pub mod builder;
pub mod kind;
pub mod types;
pub mod value;

pub use builder::{
    array_of, enum_of, list_of, map_of, named, optional_of, set_of, struct_of, union_of,
    BuiltTypes, PendingType, TypeBuilder, TypeRef,
};
pub use kind::Kind;
pub use types::{interned_count, Field, Type};
pub use value::{Any, AnyValue, Complex128, Complex64, Value};
