//! Two-phase construction of (possibly cyclic) type graphs.
//!
//! A [`TypeBuilder`] is an arena of pending nodes. Pending nodes are created
//! first, then wired together by handle, and finally [`TypeBuilder::build`]
//! validates and interns the whole batch at once:
//!
//! ```rust
//! use vom::model::{Kind, TypeBuilder};
//!
//! // type Tree []Tree
//! let mut builder = TypeBuilder::new();
//! let tree = builder.new_pending(Kind::List);
//! builder.set_name(tree, "Tree");
//! builder.set_elem(tree, tree);
//! let built = builder.build().unwrap();
//!
//! let ty = built[tree];
//! assert_eq!(ty.elem(), Some(ty));
//! assert_eq!(ty.unique(), "Tree []Tree");
//! ```

use std::ops::Index;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::TypeError;
use crate::limits::MAX_TYPE_STRING_LEN;
use crate::model::types::{Field, Payload, TABLE};
use crate::model::{Kind, Type};

static NEXT_BUILDER_ID: AtomicU64 = AtomicU64::new(1);

/// Handle to a not-yet-finalized type inside one [`TypeBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PendingType {
    builder: u64,
    index: usize,
}

impl PendingType {
    /// Position of this pending type within its batch.
    pub fn index(self) -> usize {
        self.index
    }
}

/// Reference to a component type: already built, or pending in the same batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Built(Type),
    Pending(PendingType),
}

impl From<Type> for TypeRef {
    fn from(ty: Type) -> Self {
        TypeRef::Built(ty)
    }
}

impl From<PendingType> for TypeRef {
    fn from(p: PendingType) -> Self {
        TypeRef::Pending(p)
    }
}

#[derive(Debug, Default)]
struct PendingNode {
    kind: Option<Kind>,
    name: String,
    base: Option<TypeRef>,
    elem: Option<TypeRef>,
    key: Option<TypeRef>,
    len: Option<usize>,
    fields: Vec<(String, TypeRef)>,
    labels: Vec<String>,
}

/// Structural view over either a built type or a pending node.
struct Shape<'a> {
    kind: Kind,
    name: &'a str,
    elem: Option<TypeRef>,
    key: Option<TypeRef>,
    len: usize,
    fields: Vec<(&'a str, TypeRef)>,
    labels: &'a [String],
}

/// Arena of pending types finalized together by [`TypeBuilder::build`].
#[derive(Debug)]
pub struct TypeBuilder {
    id: u64,
    nodes: Vec<PendingNode>,
    errors: Vec<TypeError>,
}

impl Default for TypeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self {
            id: NEXT_BUILDER_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Number of pending types created so far.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if no pending types have been created.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Creates a pending type of the given kind.
    pub fn new_pending(&mut self, kind: Kind) -> PendingType {
        self.push(PendingNode {
            kind: Some(kind),
            ..PendingNode::default()
        })
    }

    /// Creates a pending named type whose kind comes from [`assign_base`](Self::assign_base).
    pub fn new_named(&mut self, name: impl Into<String>) -> PendingType {
        self.push(PendingNode {
            name: name.into(),
            ..PendingNode::default()
        })
    }

    fn push(&mut self, node: PendingNode) -> PendingType {
        let index = self.nodes.len();
        self.nodes.push(node);
        PendingType {
            builder: self.id,
            index,
        }
    }

    fn node_mut(&mut self, p: PendingType) -> Option<&mut PendingNode> {
        if p.builder != self.id || p.index >= self.nodes.len() {
            self.errors.push(TypeError::ForeignHandle { index: p.index });
            return None;
        }
        self.nodes.get_mut(p.index)
    }

    pub fn set_name(&mut self, p: PendingType, name: impl Into<String>) {
        if let Some(node) = self.node_mut(p) {
            node.name = name.into();
        }
    }

    pub fn set_elem(&mut self, p: PendingType, elem: impl Into<TypeRef>) {
        let elem = elem.into();
        if let Some(node) = self.node_mut(p) {
            node.elem = Some(elem);
        }
    }

    pub fn set_key(&mut self, p: PendingType, key: impl Into<TypeRef>) {
        let key = key.into();
        if let Some(node) = self.node_mut(p) {
            node.key = Some(key);
        }
    }

    pub fn set_len(&mut self, p: PendingType, len: usize) {
        if let Some(node) = self.node_mut(p) {
            node.len = Some(len);
        }
    }

    pub fn add_field(&mut self, p: PendingType, name: impl Into<String>, ty: impl Into<TypeRef>) {
        let field = (name.into(), ty.into());
        if let Some(node) = self.node_mut(p) {
            node.fields.push(field);
        }
    }

    pub fn add_label(&mut self, p: PendingType, label: impl Into<String>) {
        let label = label.into();
        if let Some(node) = self.node_mut(p) {
            node.labels.push(label);
        }
    }

    /// Makes `p` a named copy of `base`: kind and payload come from the base,
    /// the name stays `p`'s own.
    pub fn assign_base(&mut self, p: PendingType, base: impl Into<TypeRef>) {
        let base = base.into();
        if let Some(node) = self.node_mut(p) {
            node.base = Some(base);
        }
    }

    /// Validates and interns every pending type of this builder.
    pub fn build(mut self) -> Result<BuiltTypes, TypeError> {
        if !self.errors.is_empty() {
            return Err(self.errors.swap_remove(0));
        }
        self.check_handles()?;
        self.resolve_bases()?;
        for index in 0..self.nodes.len() {
            self.validate(index)?;
        }
        self.check_finite()?;

        let mut uniques = Vec::with_capacity(self.nodes.len());
        for index in 0..self.nodes.len() {
            let root = TypeRef::Pending(PendingType {
                builder: self.id,
                index,
            });
            let mut out = String::new();
            self.write_unique(root, &mut out, &mut FxHashSet::default(), &mut Vec::new())?;
            uniques.push(out);
        }

        let mut table = TABLE.lock();
        let mut resolved = Vec::with_capacity(self.nodes.len());
        let mut fresh = Vec::new();
        let mut local: FxHashMap<&str, Type> = FxHashMap::default();
        for (index, unique) in uniques.iter().enumerate() {
            if let Some(ty) = table.lookup(unique).or_else(|| local.get(unique.as_str()).copied()) {
                resolved.push(ty);
                continue;
            }
            let node = &self.nodes[index];
            let kind = node.kind.ok_or(TypeError::KindUnset { index })?;
            let ty = table.allocate(kind, node.name.clone(), unique.clone());
            local.insert(unique.as_str(), ty);
            fresh.push((index, ty));
            resolved.push(ty);
        }

        let lookup = |r: TypeRef| match r {
            TypeRef::Built(ty) => ty,
            TypeRef::Pending(p) => resolved[p.index],
        };
        for &(index, ty) in &fresh {
            let node = &self.nodes[index];
            ty.freeze(Payload {
                elem: node.elem.map(lookup),
                key: node.key.map(lookup),
                len: node.len.unwrap_or(0),
                fields: node
                    .fields
                    .iter()
                    .map(|(name, r)| Field {
                        name: name.clone(),
                        ty: lookup(*r),
                    })
                    .collect(),
                labels: node.labels.clone(),
            });
        }
        for &(_, ty) in &fresh {
            table.publish(ty);
        }
        drop(table);

        log::debug!(
            "built type batch of {} ({} newly interned)",
            resolved.len(),
            fresh.len()
        );
        Ok(BuiltTypes {
            builder: self.id,
            types: resolved,
        })
    }

    fn check_handles(&self) -> Result<(), TypeError> {
        let check = |r: &TypeRef| match r {
            TypeRef::Pending(p) if p.builder != self.id || p.index >= self.nodes.len() => {
                Err(TypeError::ForeignHandle { index: p.index })
            }
            _ => Ok(()),
        };
        for node in &self.nodes {
            for r in [&node.base, &node.elem, &node.key].into_iter().flatten() {
                check(r)?;
            }
            for (_, r) in &node.fields {
                check(r)?;
            }
        }
        Ok(())
    }

    /// Copies kind and payload from each named type's base.
    fn resolve_bases(&mut self) -> Result<(), TypeError> {
        let mut state = vec![0u8; self.nodes.len()];
        for index in 0..self.nodes.len() {
            self.resolve_base(index, &mut state)?;
        }
        Ok(())
    }

    fn resolve_base(&mut self, index: usize, state: &mut [u8]) -> Result<(), TypeError> {
        const VISITING: u8 = 1;
        const DONE: u8 = 2;
        match state[index] {
            DONE => return Ok(()),
            VISITING => {
                return Err(TypeError::BaseCycle {
                    name: self.nodes[index].name.clone(),
                });
            }
            _ => {}
        }
        state[index] = VISITING;
        if let Some(base) = self.nodes[index].base {
            let copy = match base {
                TypeRef::Pending(p) => {
                    self.resolve_base(p.index, state)?;
                    let src = &self.nodes[p.index];
                    PendingNode {
                        kind: src.kind,
                        elem: src.elem,
                        key: src.key,
                        len: src.len,
                        fields: src.fields.clone(),
                        labels: src.labels.clone(),
                        ..PendingNode::default()
                    }
                }
                TypeRef::Built(ty) => PendingNode {
                    kind: Some(ty.kind()),
                    elem: ty.elem().map(TypeRef::Built),
                    key: ty.key().map(TypeRef::Built),
                    len: (ty.kind() == Kind::Array).then(|| ty.array_len()),
                    fields: ty
                        .fields()
                        .iter()
                        .map(|f| (f.name.clone(), TypeRef::Built(f.ty)))
                        .collect(),
                    labels: ty.labels().to_vec(),
                    ..PendingNode::default()
                },
            };
            let node = &mut self.nodes[index];
            node.kind = copy.kind;
            node.elem = copy.elem;
            node.key = copy.key;
            node.len = copy.len;
            node.fields = copy.fields;
            node.labels = copy.labels;
        }
        state[index] = DONE;
        Ok(())
    }

    fn kind_of(&self, r: TypeRef) -> Option<Kind> {
        match r {
            TypeRef::Built(ty) => Some(ty.kind()),
            TypeRef::Pending(p) => self.nodes[p.index].kind,
        }
    }

    fn validate(&self, index: usize) -> Result<(), TypeError> {
        let node = &self.nodes[index];
        let kind = node.kind.ok_or(TypeError::KindUnset { index })?;
        let name = || node.name.clone();
        let missing = |part| TypeError::MissingPayload {
            kind,
            name: name(),
            part,
        };
        let unexpected = |part| TypeError::UnexpectedPayload {
            kind,
            name: name(),
            part,
        };

        let wants_elem = kind.has_elem();
        let wants_key = kind.has_key();
        match (wants_elem, node.elem.is_some()) {
            (true, false) => return Err(missing("elem")),
            (false, true) => return Err(unexpected("elem")),
            _ => {}
        }
        match (wants_key, node.key.is_some()) {
            (true, false) => return Err(missing("key")),
            (false, true) => return Err(unexpected("key")),
            _ => {}
        }
        match (kind == Kind::Array, node.len.is_some()) {
            (true, false) => return Err(missing("length")),
            (false, true) => return Err(unexpected("length")),
            _ => {}
        }
        if !kind.has_fields() && !node.fields.is_empty() {
            return Err(unexpected("fields"));
        }
        if kind != Kind::Enum && !node.labels.is_empty() {
            return Err(unexpected("labels"));
        }

        match kind {
            Kind::Enum => check_names(kind, &node.name, "label", node.labels.iter())?,
            Kind::Struct | Kind::Union => {
                if kind == Kind::Union && node.fields.is_empty() {
                    return Err(TypeError::Empty {
                        kind,
                        name: name(),
                        part: "fields",
                    });
                }
                check_names(kind, &node.name, "field", node.fields.iter().map(|(n, _)| n))?;
            }
            Kind::Optional => {
                let elem_kind = node.elem.and_then(|e| self.kind_of(e));
                if let Some(k @ (Kind::Optional | Kind::Any)) = elem_kind {
                    return Err(TypeError::InvalidComponent {
                        kind: k,
                        role: "optional element",
                    });
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Rejects pending cycles that never pass through a list, set, map or optional.
    fn check_finite(&self) -> Result<(), TypeError> {
        let mut state = vec![0u8; self.nodes.len()];
        for index in 0..self.nodes.len() {
            self.visit_inline(index, &mut state)?;
        }
        Ok(())
    }

    fn visit_inline(&self, index: usize, state: &mut [u8]) -> Result<(), TypeError> {
        match state[index] {
            2 => return Ok(()),
            1 => {
                return Err(TypeError::InfiniteSize {
                    name: self.nodes[index].name.clone(),
                });
            }
            _ => {}
        }
        state[index] = 1;
        let node = &self.nodes[index];
        let inline: Vec<TypeRef> = match node.kind {
            Some(Kind::Struct) | Some(Kind::Union) => node.fields.iter().map(|(_, r)| *r).collect(),
            Some(Kind::Array) => node.elem.into_iter().collect(),
            _ => Vec::new(),
        };
        for r in inline {
            if let TypeRef::Pending(p) = r {
                self.visit_inline(p.index, state)?;
            }
        }
        state[index] = 2;
        Ok(())
    }

    fn shape(&self, r: TypeRef) -> Shape<'_> {
        match r {
            TypeRef::Built(ty) => Shape {
                kind: ty.kind(),
                name: ty.name(),
                elem: ty.elem().map(TypeRef::Built),
                key: ty.key().map(TypeRef::Built),
                len: ty.array_len(),
                fields: ty
                    .fields()
                    .iter()
                    .map(|f| (f.name.as_str(), TypeRef::Built(f.ty)))
                    .collect(),
                labels: ty.labels(),
            },
            TypeRef::Pending(p) => {
                let node = &self.nodes[p.index];
                Shape {
                    // validate() has rejected kindless nodes by now
                    kind: node.kind.unwrap_or(Kind::Any),
                    name: &node.name,
                    elem: node.elem,
                    key: node.key,
                    len: node.len.unwrap_or(0),
                    fields: node.fields.iter().map(|(n, r)| (n.as_str(), *r)).collect(),
                    labels: &node.labels,
                }
            }
        }
    }

    /// Writes the canonical string of `r`. Named types print their structure
    /// once per string and just their name afterwards.
    fn write_unique(
        &self,
        r: TypeRef,
        out: &mut String,
        seen: &mut FxHashSet<TypeRef>,
        stack: &mut Vec<TypeRef>,
    ) -> Result<(), TypeError> {
        let shape = self.shape(r);
        if out.len() > MAX_TYPE_STRING_LEN {
            return Err(TypeError::TooLarge {
                name: shape.name.to_string(),
                max: MAX_TYPE_STRING_LEN,
            });
        }
        if !shape.name.is_empty() {
            out.push_str(shape.name);
            if !seen.insert(r) {
                return Ok(());
            }
            out.push(' ');
        } else if stack.contains(&r) {
            return Err(TypeError::UnnamedCycle {
                unique: out.clone(),
            });
        }
        stack.push(r);
        match shape.kind {
            Kind::Enum => {
                out.push_str("enum{");
                out.push_str(&shape.labels.join(";"));
                out.push('}');
            }
            Kind::Array => {
                out.push_str(&format!("[{}]", shape.len));
                self.write_component(shape.elem, out, seen, stack)?;
            }
            Kind::List => {
                out.push_str("[]");
                self.write_component(shape.elem, out, seen, stack)?;
            }
            Kind::Set => {
                out.push_str("set[");
                self.write_component(shape.key, out, seen, stack)?;
                out.push(']');
            }
            Kind::Map => {
                out.push_str("map[");
                self.write_component(shape.key, out, seen, stack)?;
                out.push(']');
                self.write_component(shape.elem, out, seen, stack)?;
            }
            Kind::Optional => {
                out.push('?');
                self.write_component(shape.elem, out, seen, stack)?;
            }
            Kind::Struct | Kind::Union => {
                out.push_str(shape.kind.as_str());
                out.push('{');
                for (i, (name, field)) in shape.fields.iter().enumerate() {
                    if i > 0 {
                        out.push(';');
                    }
                    out.push_str(name);
                    out.push(' ');
                    self.write_unique(*field, out, seen, stack)?;
                }
                out.push('}');
            }
            scalar => out.push_str(scalar.as_str()),
        }
        stack.pop();
        Ok(())
    }

    fn write_component(
        &self,
        r: Option<TypeRef>,
        out: &mut String,
        seen: &mut FxHashSet<TypeRef>,
        stack: &mut Vec<TypeRef>,
    ) -> Result<(), TypeError> {
        match r {
            Some(r) => self.write_unique(r, out, seen, stack),
            None => Ok(()),
        }
    }
}

fn check_names<'a>(
    kind: Kind,
    type_name: &str,
    part: &'static str,
    names: impl Iterator<Item = &'a String>,
) -> Result<(), TypeError> {
    let mut seen = FxHashSet::default();
    let mut count = 0;
    for name in names {
        count += 1;
        if name.is_empty() {
            return Err(TypeError::EmptyName {
                kind,
                name: type_name.to_string(),
                part,
            });
        }
        if !seen.insert(name.as_str()) {
            return Err(TypeError::Duplicate {
                kind,
                name: type_name.to_string(),
                part,
                entry: name.clone(),
            });
        }
    }
    if count == 0 && kind == Kind::Enum {
        return Err(TypeError::Empty {
            kind,
            name: type_name.to_string(),
            part: "labels",
        });
    }
    Ok(())
}

/// Result of [`TypeBuilder::build`]: the finalized type of every pending handle.
#[derive(Debug, Clone)]
pub struct BuiltTypes {
    builder: u64,
    types: Vec<Type>,
}

impl BuiltTypes {
    /// Returns the finalized type for `p`, or `None` if it came from another builder.
    pub fn get(&self, p: PendingType) -> Option<Type> {
        if p.builder != self.builder {
            return None;
        }
        self.types.get(p.index).copied()
    }

    /// Finalized types, in pending creation order.
    pub fn types(&self) -> &[Type] {
        &self.types
    }
}

impl Index<PendingType> for BuiltTypes {
    type Output = Type;

    fn index(&self, p: PendingType) -> &Type {
        assert_eq!(p.builder, self.builder, "pending type from another builder");
        &self.types[p.index]
    }
}

// =============================================================================
// CONVENIENCE CONSTRUCTORS
// =============================================================================

fn build_one(f: impl FnOnce(&mut TypeBuilder) -> PendingType) -> Result<Type, TypeError> {
    let mut builder = TypeBuilder::new();
    let p = f(&mut builder);
    let built = builder.build()?;
    Ok(built[p])
}

/// `[]elem`
pub fn list_of(elem: Type) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::List);
        b.set_elem(p, elem);
        p
    })
}

/// `[len]elem`
pub fn array_of(elem: Type, len: usize) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Array);
        b.set_elem(p, elem);
        b.set_len(p, len);
        p
    })
}

/// `set[key]`
pub fn set_of(key: Type) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Set);
        b.set_key(p, key);
        p
    })
}

/// `map[key]elem`
pub fn map_of(key: Type, elem: Type) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Map);
        b.set_key(p, key);
        b.set_elem(p, elem);
        p
    })
}

/// `?elem`
pub fn optional_of(elem: Type) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Optional);
        b.set_elem(p, elem);
        p
    })
}

/// A named copy of `base`.
pub fn named(name: &str, base: Type) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_named(name);
        b.assign_base(p, base);
        p
    })
}

/// An enum with the given labels.
pub fn enum_of(name: &str, labels: &[&str]) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Enum);
        b.set_name(p, name);
        for label in labels {
            b.add_label(p, *label);
        }
        p
    })
}

/// A struct with the given fields.
pub fn struct_of(name: &str, fields: &[(&str, Type)]) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Struct);
        b.set_name(p, name);
        for (field, ty) in fields {
            b.add_field(p, *field, *ty);
        }
        p
    })
}

/// A union with the given fields.
pub fn union_of(name: &str, fields: &[(&str, Type)]) -> Result<Type, TypeError> {
    build_one(|b| {
        let p = b.new_pending(Kind::Union);
        b.set_name(p, name);
        for (field, ty) in fields {
            b.add_field(p, *field, *ty);
        }
        p
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_interned_once() {
        let a = list_of(Type::string()).unwrap();
        let b = list_of(Type::string()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.unique(), "[]string");
        assert_eq!(a.elem(), Some(Type::string()));
    }

    #[test]
    fn test_self_referential_list() {
        let mut b = TypeBuilder::new();
        let tree = b.new_pending(Kind::List);
        b.set_name(tree, "test.Tree");
        b.set_elem(tree, tree);
        let built = b.build().unwrap();
        let ty = built[tree];
        assert_eq!(ty.kind(), Kind::List);
        assert_eq!(ty.elem(), Some(ty));
        assert_eq!(ty.unique(), "test.Tree []test.Tree");
    }

    #[test]
    fn test_mutually_recursive_struct_and_list() {
        // type Node struct { Name string; Children NodeList }
        // type NodeList []Node
        let mut b = TypeBuilder::new();
        let node = b.new_pending(Kind::Struct);
        let list = b.new_pending(Kind::List);
        b.set_name(node, "test.Node");
        b.set_name(list, "test.NodeList");
        b.add_field(node, "Name", Type::string());
        b.add_field(node, "Children", list);
        b.set_elem(list, node);
        let built = b.build().unwrap();

        let node_ty = built[node];
        let list_ty = built[list];
        assert_eq!(node_ty.field(1).unwrap().ty, list_ty);
        assert_eq!(list_ty.elem(), Some(node_ty));
        assert_eq!(
            node_ty.unique(),
            "test.Node struct{Name string;Children test.NodeList []test.Node}"
        );
    }

    #[test]
    fn test_rebuild_yields_same_type() {
        let make = || {
            let mut b = TypeBuilder::new();
            let p = b.new_pending(Kind::List);
            b.set_name(p, "test.Again");
            b.set_elem(p, p);
            let built = b.build().unwrap();
            built[p]
        };
        assert_eq!(make(), make());
    }

    #[test]
    fn test_named_assign_base() {
        let point = struct_of("test.Point", &[("X", Type::int32()), ("Y", Type::int32())]).unwrap();
        let alias = named("test.Alias", point).unwrap();
        assert_eq!(alias.kind(), Kind::Struct);
        assert_eq!(alias.name(), "test.Alias");
        assert_eq!(alias.fields().len(), 2);
        assert_ne!(alias, point);

        let my_bool = named("test.MyBool", Type::bool()).unwrap();
        assert_eq!(my_bool.kind(), Kind::Bool);
        assert_eq!(my_bool.unique(), "test.MyBool bool");
    }

    #[test]
    fn test_pending_base_chain() {
        let mut b = TypeBuilder::new();
        let a = b.new_named("test.ChainA");
        let c = b.new_pending(Kind::List);
        b.set_elem(c, Type::int64());
        b.assign_base(a, c);
        let built = b.build().unwrap();
        assert_eq!(built[a].kind(), Kind::List);
        assert_eq!(built[a].elem(), Some(Type::int64()));
    }

    #[test]
    fn test_base_cycle_rejected() {
        let mut b = TypeBuilder::new();
        let x = b.new_named("test.X");
        let y = b.new_named("test.Y");
        b.assign_base(x, y);
        b.assign_base(y, x);
        assert!(matches!(b.build(), Err(TypeError::BaseCycle { .. })));
    }

    #[test]
    fn test_unnamed_cycle_rejected() {
        let mut b = TypeBuilder::new();
        let p = b.new_pending(Kind::List);
        b.set_elem(p, p);
        assert!(matches!(b.build(), Err(TypeError::UnnamedCycle { .. })));
    }

    #[test]
    fn test_infinite_struct_rejected() {
        let mut b = TypeBuilder::new();
        let p = b.new_pending(Kind::Struct);
        b.set_name(p, "test.Forever");
        b.add_field(p, "Again", p);
        assert!(matches!(b.build(), Err(TypeError::InfiniteSize { .. })));
    }

    #[test]
    fn test_shared_unnamed_structs_capped() {
        // Each level holds the previous one twice, doubling the string.
        let mut b = TypeBuilder::new();
        let mut prev = TypeRef::Built(Type::int32());
        for _ in 0..32 {
            let p = b.new_pending(Kind::Struct);
            b.add_field(p, "A", prev);
            b.add_field(p, "B", prev);
            prev = p.into();
        }
        assert!(matches!(b.build(), Err(TypeError::TooLarge { .. })));
    }

    #[test]
    fn test_payload_validation() {
        let mut b = TypeBuilder::new();
        b.new_pending(Kind::List);
        assert!(matches!(
            b.build(),
            Err(TypeError::MissingPayload { part: "elem", .. })
        ));

        let mut b = TypeBuilder::new();
        let p = b.new_pending(Kind::Bool);
        b.set_len(p, 3);
        assert!(matches!(
            b.build(),
            Err(TypeError::UnexpectedPayload { part: "length", .. })
        ));

        assert!(matches!(
            enum_of("test.Empty", &[]),
            Err(TypeError::Empty { .. })
        ));
        assert!(matches!(
            enum_of("test.Dup", &["A", "A"]),
            Err(TypeError::Duplicate { .. })
        ));
        assert!(matches!(
            struct_of("test.DupField", &[("X", Type::bool()), ("X", Type::bool())]),
            Err(TypeError::Duplicate { .. })
        ));
        assert!(matches!(
            union_of("test.NoFields", &[]),
            Err(TypeError::Empty { .. })
        ));
        assert!(matches!(
            optional_of(Type::any()),
            Err(TypeError::InvalidComponent { .. })
        ));
    }

    #[test]
    fn test_named_kind_unset() {
        let mut b = TypeBuilder::new();
        b.new_named("test.NoBase");
        assert!(matches!(b.build(), Err(TypeError::KindUnset { index: 0 })));
    }

    #[test]
    fn test_foreign_handle() {
        let mut other = TypeBuilder::new();
        let foreign = other.new_pending(Kind::Bool);

        let mut b = TypeBuilder::new();
        let p = b.new_pending(Kind::List);
        b.set_elem(p, foreign);
        assert!(matches!(b.build(), Err(TypeError::ForeignHandle { .. })));

        let mut b = TypeBuilder::new();
        b.set_name(foreign, "test.Nope");
        assert!(matches!(b.build(), Err(TypeError::ForeignHandle { .. })));
    }

    #[test]
    fn test_composite_strings() {
        let m = map_of(Type::string(), Type::int64()).unwrap();
        assert_eq!(m.unique(), "map[string]int64");
        let s = set_of(Type::uint16()).unwrap();
        assert_eq!(s.unique(), "set[uint16]");
        let a = array_of(Type::byte(), 4).unwrap();
        assert_eq!(a.unique(), "[4]byte");
        assert!(a.is_bytes());
        let e = enum_of("test.Color", &["Red", "Green"]).unwrap();
        assert_eq!(e.unique(), "test.Color enum{Red;Green}");
        let u = union_of("test.Either", &[("A", Type::bool()), ("B", Type::string())]).unwrap();
        assert_eq!(u.unique(), "test.Either union{A bool;B string}");
        let o = optional_of(u).unwrap();
        assert_eq!(o.unique(), "?test.Either union{A bool;B string}");
    }
}
