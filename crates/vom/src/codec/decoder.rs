//! Stream decoder.
//!
//! The decoder keeps two per-stream tables: types already resolved to
//! interned [`Type`]s, and raw [`WireType`] definitions that no value has
//! needed yet. A definition is only turned into a `Type` when a value
//! message (or an `any`/typeobject inside one) first refers to it; at that
//! point every raw definition it reaches is built in one batch, so cyclic
//! definitions resolve like any other.

use std::io::{BufReader, Read};

use rustc_hash::FxHashMap;

use crate::codec::primitives::{Reader, Source, StreamReader};
use crate::codec::wire::{self, WireType};
use crate::convert::{compatible, convert};
use crate::error::{ConversionError, DecodeError};
use crate::limits::{
    FIRST_USER_ID, MAGIC, MAX_COLLECTION_LEN, MAX_DEPTH, MAX_MESSAGE_LEN, MAX_STRING_LEN,
    MAX_TYPE_DEFINITIONS,
};
use crate::model::{Any, Complex128, Complex64, Kind, PendingType, Type, TypeBuilder, TypeRef, Value};
use crate::registry::{type_of, Vdl};

/// Limits applied while decoding one stream.
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Largest accepted byte length of a length-prefixed message.
    pub max_message_len: usize,
    /// Largest accepted element count of a list, set or map, and the number
    /// of zero values one message may fill in for omitted struct fields.
    pub max_collection_len: usize,
    /// Largest accepted byte length of a string or byte list.
    pub max_string_len: usize,
    /// Deepest accepted nesting of values and of received type definitions.
    pub max_depth: usize,
    /// Most type definitions accepted in one stream.
    pub max_type_definitions: usize,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_message_len: MAX_MESSAGE_LEN,
            max_collection_len: MAX_COLLECTION_LEN,
            max_string_len: MAX_STRING_LEN,
            max_depth: MAX_DEPTH,
            max_type_definitions: MAX_TYPE_DEFINITIONS,
        }
    }
}

impl DecodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_message_len(mut self, max: usize) -> Self {
        self.max_message_len = max;
        self
    }

    pub fn with_max_collection_len(mut self, max: usize) -> Self {
        self.max_collection_len = max;
        self
    }

    pub fn with_max_string_len(mut self, max: usize) -> Self {
        self.max_string_len = max;
        self
    }

    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    pub fn with_max_type_definitions(mut self, max: usize) -> Self {
        self.max_type_definitions = max;
        self
    }
}

/// Reads values from a byte stream.
pub struct Decoder<R: Read> {
    input: StreamReader<BufReader<R>>,
    seen_magic: bool,
    state: StreamTypes,
}

/// Type tables of one stream.
struct StreamTypes {
    options: DecodeOptions,
    resolved: FxHashMap<u64, Type>,
    raw: FxHashMap<u64, WireType>,
    definitions: usize,
    /// Nesting bound of each resolved id.
    depths: FxHashMap<u64, usize>,
    zero_costs: FxHashMap<Type, u64>,
    /// Values the current message may still materialize for omitted fields.
    zero_budget: u64,
}

impl<R: Read> Decoder<R> {
    /// Creates a decoder reading from `source`.
    pub fn new(source: R) -> Self {
        Self::with_options(source, DecodeOptions::default())
    }

    pub fn with_options(source: R, options: DecodeOptions) -> Self {
        Self {
            input: StreamReader::new(BufReader::new(source)),
            seen_magic: false,
            state: StreamTypes {
                options,
                resolved: FxHashMap::default(),
                raw: FxHashMap::default(),
                definitions: 0,
                depths: FxHashMap::default(),
                zero_costs: FxHashMap::default(),
                zero_budget: options.max_collection_len as u64,
            },
        }
    }

    /// Returns true once the stream is exhausted.
    pub fn is_at_end(&mut self) -> Result<bool, DecodeError> {
        self.input.at_end()
    }

    /// Consumes the decoder, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.input.into_inner().into_inner()
    }

    /// Decodes the next value into a native type.
    pub fn decode<T: Vdl>(&mut self) -> Result<T, DecodeError> {
        let target = type_of::<T>()?;
        let value = self.decode_value(target)?;
        Ok(T::from_value(value)?)
    }

    /// Decodes the next value as an `any`, keeping its wire type.
    pub fn decode_any(&mut self) -> Result<Any, DecodeError> {
        match self.decode_value(Type::any())? {
            Value::Any(any) => Ok(any),
            other => Err(ConversionError::Shape {
                expected: Kind::Any,
                found: other.kind_name(),
            }
            .into()),
        }
    }

    /// Decodes the next value and converts it into `target`.
    pub fn decode_value(&mut self, target: Type) -> Result<Value, DecodeError> {
        let (actual, value) = self.next_value()?;
        if !compatible(actual, target) {
            return Err(ConversionError::Incompatible {
                actual: actual.to_string(),
                target: target.to_string(),
            }
            .into());
        }
        Ok(convert(value, actual, target)?)
    }

    /// Reads definitions up to the next value message and returns it raw.
    fn next_value(&mut self) -> Result<(Type, Value), DecodeError> {
        if !self.seen_magic {
            let found = self.input.read_byte("magic")?;
            if found != MAGIC {
                return Err(DecodeError::InvalidMagic { found });
            }
            self.seen_magic = true;
        }
        loop {
            let id = self.input.read_int("message id")?;
            if id < 0 {
                self.read_definition(id.unsigned_abs())?;
                continue;
            }
            if id == 0 {
                return Err(DecodeError::ZeroTypeId);
            }
            let actual = self.state.resolve(id as u64)?;
            let value = if wire::has_length_prefix(actual) {
                let bytes = self.read_message_bytes()?;
                self.state.read_message(&bytes, actual)?
            } else {
                self.state.read_body(&mut self.input, actual, 0)?
            };
            log::trace!("decoded value message of type {} (id {})", actual, id);
            return Ok((actual, value));
        }
    }

    fn read_message_bytes(&mut self) -> Result<Vec<u8>, DecodeError> {
        let len = self
            .input
            .read_len(self.state.options.max_message_len, "message length")?;
        self.input.read_vec(len, "message body")
    }

    fn read_definition(&mut self, id: u64) -> Result<(), DecodeError> {
        let bytes = self.read_message_bytes()?;
        let state = &mut self.state;
        if id < FIRST_USER_ID {
            return Err(DecodeError::MalformedTypeDefinition {
                id,
                reason: "id is reserved for bootstrap types".to_string(),
            });
        }
        if state.raw.contains_key(&id) || state.resolved.contains_key(&id) {
            return Err(DecodeError::DuplicateTypeId { id });
        }
        state.definitions += 1;
        if state.definitions > state.options.max_type_definitions {
            return Err(DecodeError::LengthExceedsLimit {
                field: "type definitions",
                len: state.definitions as u64,
                max: state.options.max_type_definitions,
            });
        }
        let value = state.read_message(&bytes, wire::wire_type())?;
        let def = WireType::from_value(value)
            .map_err(|reason| DecodeError::MalformedTypeDefinition { id, reason })?;
        log::trace!("read definition of type id {}: {:?}", id, def);
        state.raw.insert(id, def);
        Ok(())
    }
}

impl StreamTypes {
    /// Decodes a complete length-delimited message body.
    fn read_message(&mut self, bytes: &[u8], ty: Type) -> Result<Value, DecodeError> {
        let mut reader = Reader::new(bytes);
        self.zero_budget = self.options.max_collection_len as u64;
        let value = self.read_body(&mut reader, ty, 0)?;
        if !reader.is_empty() {
            return Err(DecodeError::MessageLengthMismatch {
                declared: bytes.len(),
                used: reader.position(),
            });
        }
        Ok(value)
    }

    /// Resolves a wire id to a type, building pending raw definitions if needed.
    fn resolve(&mut self, id: u64) -> Result<Type, DecodeError> {
        if id == 0 {
            return Err(DecodeError::ZeroTypeId);
        }
        if let Some(ty) = wire::bootstrap_type(id) {
            return Ok(ty);
        }
        if let Some(ty) = self.resolved.get(&id) {
            return Ok(*ty);
        }
        if !self.raw.contains_key(&id) {
            return Err(DecodeError::UnknownTypeId { id });
        }

        // Phase one: a pending node for every raw definition reachable from `id`.
        let mut builder = TypeBuilder::new();
        let mut pending: FxHashMap<u64, PendingType> = FxHashMap::default();
        let mut order = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if pending.contains_key(&next)
                || wire::bootstrap_type(next).is_some()
                || self.resolved.contains_key(&next)
            {
                continue;
            }
            let def = self.raw.get(&next).ok_or(DecodeError::UnknownTypeId { id: next })?;
            let p = match def {
                WireType::Named { name, .. } => {
                    if name.is_empty() {
                        return Err(DecodeError::MalformedTypeDefinition {
                            id: next,
                            reason: "named type without a name".to_string(),
                        });
                    }
                    builder.new_named(name.clone())
                }
                WireType::Enum { .. } => builder.new_pending(Kind::Enum),
                WireType::Array { .. } => builder.new_pending(Kind::Array),
                WireType::List { .. } => builder.new_pending(Kind::List),
                WireType::Set { .. } => builder.new_pending(Kind::Set),
                WireType::Map { .. } => builder.new_pending(Kind::Map),
                WireType::Struct { .. } => builder.new_pending(Kind::Struct),
                WireType::Union { .. } => builder.new_pending(Kind::Union),
                WireType::Optional { .. } => builder.new_pending(Kind::Optional),
            };
            pending.insert(next, p);
            order.push(next);
            stack.extend(def.refs());
        }

        // Reject batches nested deeper than `max_depth` before any walk over them.
        let position: FxHashMap<u64, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
        let mut edges = Vec::with_capacity(order.len());
        let mut outside = Vec::with_capacity(order.len());
        for wire_id in &order {
            let mut local = Vec::new();
            let mut deepest = 0;
            for r in self.raw[wire_id].refs() {
                match position.get(&r) {
                    Some(&i) => local.push(i),
                    None => deepest = deepest.max(self.depths.get(&r).copied().unwrap_or(1)),
                }
            }
            edges.push(local);
            outside.push(deepest);
        }
        let depths = nesting_bounds(&edges, &outside);
        if depths.iter().any(|d| *d > self.options.max_depth) {
            return Err(DecodeError::DepthExceeded {
                max: self.options.max_depth,
            });
        }

        // Phase two: fill in payloads, now that every reference has a handle.
        for wire_id in &order {
            let p = pending[wire_id];
            let def = &self.raw[wire_id];
            let to_ref = |r: u64| -> Result<TypeRef, DecodeError> {
                if let Some(ty) = wire::bootstrap_type(r).or_else(|| self.resolved.get(&r).copied()) {
                    return Ok(TypeRef::Built(ty));
                }
                pending
                    .get(&r)
                    .map(|p| TypeRef::Pending(*p))
                    .ok_or(DecodeError::UnknownTypeId { id: r })
            };
            match def {
                WireType::Named { base, .. } => builder.assign_base(p, to_ref(*base)?),
                WireType::Enum { name, labels } => {
                    builder.set_name(p, name.clone());
                    for label in labels {
                        builder.add_label(p, label.clone());
                    }
                }
                WireType::Array { name, elem, len } => {
                    if *len > self.options.max_collection_len as u64 {
                        return Err(DecodeError::LengthExceedsLimit {
                            field: "array length",
                            len: *len,
                            max: self.options.max_collection_len,
                        });
                    }
                    builder.set_name(p, name.clone());
                    builder.set_elem(p, to_ref(*elem)?);
                    builder.set_len(p, *len as usize);
                }
                WireType::List { name, elem } | WireType::Optional { name, elem } => {
                    builder.set_name(p, name.clone());
                    builder.set_elem(p, to_ref(*elem)?);
                }
                WireType::Set { name, key } => {
                    builder.set_name(p, name.clone());
                    builder.set_key(p, to_ref(*key)?);
                }
                WireType::Map { name, key, elem } => {
                    builder.set_name(p, name.clone());
                    builder.set_key(p, to_ref(*key)?);
                    builder.set_elem(p, to_ref(*elem)?);
                }
                WireType::Struct { name, fields } | WireType::Union { name, fields } => {
                    builder.set_name(p, name.clone());
                    for field in fields {
                        builder.add_field(p, field.name.clone(), to_ref(field.ty)?);
                    }
                }
            }
        }

        let built = builder.build()?;
        for (wire_id, depth) in order.into_iter().zip(depths) {
            let ty = built[pending[&wire_id]];
            self.raw.remove(&wire_id);
            self.resolved.insert(wire_id, ty);
            self.depths.insert(wire_id, depth);
        }
        log::debug!("resolved stream type id {} to {}", id, self.resolved[&id]);
        Ok(self.resolved[&id])
    }

    /// Decodes one value body of type `ty`.
    fn read_body<S: Source>(&mut self, src: &mut S, ty: Type, depth: usize) -> Result<Value, DecodeError> {
        if depth > self.options.max_depth {
            return Err(DecodeError::DepthExceeded {
                max: self.options.max_depth,
            });
        }
        let value = match ty.kind() {
            Kind::Bool => Value::Bool(src.read_bool("bool")?),
            Kind::Byte => Value::Byte(narrow_uint(src.read_uint("byte")?, "byte", 8)? as u8),
            Kind::Uint16 => Value::Uint16(narrow_uint(src.read_uint("uint16")?, "uint16", 16)? as u16),
            Kind::Uint32 => Value::Uint32(narrow_uint(src.read_uint("uint32")?, "uint32", 32)? as u32),
            Kind::Uint64 => Value::Uint64(src.read_uint("uint64")?),
            Kind::Int16 => Value::Int16(narrow_int(src.read_int("int16")?, "int16", 16)? as i16),
            Kind::Int32 => Value::Int32(narrow_int(src.read_int("int32")?, "int32", 32)? as i32),
            Kind::Int64 => Value::Int64(src.read_int("int64")?),
            Kind::Float32 => Value::Float32(narrow_float(src.read_float("float32")?, "float32")?),
            Kind::Float64 => Value::Float64(src.read_float("float64")?),
            Kind::Complex64 => Value::Complex64(Complex64 {
                re: narrow_float(src.read_float("complex64")?, "complex64")?,
                im: narrow_float(src.read_float("complex64")?, "complex64")?,
            }),
            Kind::Complex128 => Value::Complex128(Complex128 {
                re: src.read_float("complex128")?,
                im: src.read_float("complex128")?,
            }),
            Kind::String => Value::String(src.read_string(self.options.max_string_len, "string")?),
            Kind::Enum => {
                let index = src.read_uint("enum label")?;
                Value::Enum(check_index("enum label", index, ty.labels().len())?)
            }
            Kind::TypeObject => {
                let id = src.read_uint("typeobject")?;
                Value::TypeObject(self.resolve(id)?)
            }
            Kind::Array if ty.is_bytes() => Value::Bytes(src.read_vec(ty.array_len(), "byte array")?),
            Kind::List if ty.is_bytes() => {
                Value::Bytes(src.read_bytes_prefixed(self.options.max_string_len, "byte list")?)
            }
            Kind::Array => {
                let elem = component(ty, ty.elem())?;
                let mut items = Vec::with_capacity(ty.array_len().min(1024));
                for _ in 0..ty.array_len() {
                    items.push(self.read_body(src, elem, depth + 1)?);
                }
                Value::Array(items)
            }
            Kind::List => {
                let elem = component(ty, ty.elem())?;
                Value::List(self.read_items(src, elem, "list length", depth)?)
            }
            Kind::Set => {
                let key = component(ty, ty.key())?;
                Value::Set(self.read_items(src, key, "set length", depth)?)
            }
            Kind::Map => {
                let key = component(ty, ty.key())?;
                let elem = component(ty, ty.elem())?;
                let n = src.read_len(self.options.max_collection_len, "map length")?;
                let mut pairs = Vec::with_capacity(n.min(1024));
                for _ in 0..n {
                    let k = self.read_body(src, key, depth + 1)?;
                    let v = self.read_body(src, elem, depth + 1)?;
                    pairs.push((k, v));
                }
                Value::Map(pairs)
            }
            Kind::Struct => {
                let fields = ty.fields();
                let mut values: Vec<Option<Value>> = vec![None; fields.len()];
                loop {
                    let tag = src.read_uint("struct field")?;
                    if tag == 0 {
                        break;
                    }
                    let index = check_index("struct field", tag - 1, fields.len())?;
                    if values[index].is_some() {
                        return Err(DecodeError::DuplicateField { index });
                    }
                    values[index] = Some(self.read_body(src, fields[index].ty, depth + 1)?);
                }
                let mut filled = Vec::with_capacity(fields.len());
                for (v, f) in values.into_iter().zip(fields) {
                    filled.push(match v {
                        Some(v) => v,
                        None => self.zero_fill(f.ty)?,
                    });
                }
                Value::Struct(filled)
            }
            Kind::Union => {
                let fields = ty.fields();
                let tag = src.read_uint("union field")?;
                if tag == 0 {
                    return Err(DecodeError::IndexOutOfRange {
                        what: "union field",
                        index: 0,
                        size: fields.len(),
                    });
                }
                let index = check_index("union field", tag - 1, fields.len())?;
                let inner = self.read_body(src, fields[index].ty, depth + 1)?;
                Value::Union(index, Box::new(inner))
            }
            Kind::Optional => match src.read_uint("optional flag")? {
                0 => Value::Optional(None),
                1 => {
                    let elem = component(ty, ty.elem())?;
                    Value::some(self.read_body(src, elem, depth + 1)?)
                }
                other => {
                    return Err(DecodeError::IndexOutOfRange {
                        what: "optional flag",
                        index: other,
                        size: 2,
                    });
                }
            },
            Kind::Any => match src.read_uint("any type id")? {
                0 => Value::Any(Any::nil()),
                id => {
                    let dynamic = self.resolve(id)?;
                    let inner = self.read_body(src, dynamic, depth + 1)?;
                    Value::any(dynamic, inner)
                }
            },
        };
        Ok(value)
    }

    fn read_items<S: Source>(
        &mut self,
        src: &mut S,
        elem: Type,
        field: &'static str,
        depth: usize,
    ) -> Result<Vec<Value>, DecodeError> {
        let n = src.read_len(self.options.max_collection_len, field)?;
        let mut items = Vec::with_capacity(n.min(1024));
        for _ in 0..n {
            items.push(self.read_body(src, elem, depth + 1)?);
        }
        Ok(items)
    }

    /// Zero value of an omitted struct field, charged against the message budget.
    fn zero_fill(&mut self, ty: Type) -> Result<Value, DecodeError> {
        let cost = self.zero_cost(ty);
        if cost > self.zero_budget {
            return Err(DecodeError::LengthExceedsLimit {
                field: "zero-filled values",
                len: cost,
                max: self.options.max_collection_len,
            });
        }
        self.zero_budget -= cost;
        Ok(Value::zero(ty))
    }

    /// Number of values in the zero value of `ty`, counting each byte of a byte array.
    fn zero_cost(&mut self, ty: Type) -> u64 {
        if let Some(cost) = self.zero_costs.get(&ty) {
            return *cost;
        }
        let cost = match ty.kind() {
            Kind::Array if ty.is_bytes() => (ty.array_len() as u64).saturating_add(1),
            Kind::Array => {
                let elem = ty.elem().map_or(1, |e| self.zero_cost(e));
                (ty.array_len() as u64).saturating_mul(elem).saturating_add(1)
            }
            Kind::Struct => ty
                .fields()
                .iter()
                .fold(1u64, |n, f| n.saturating_add(self.zero_cost(f.ty))),
            Kind::Union => ty.field(0).map_or(1, |f| self.zero_cost(f.ty).saturating_add(1)),
            _ => 1,
        };
        self.zero_costs.insert(ty, cost);
        cost
    }
}

/// Upper bound on the nesting below each node of a definition graph.
///
/// `edges[i]` lists the batch nodes that node `i` refers to and `outside[i]`
/// the deepest bound among its already resolved components. All nodes of a
/// strongly connected component may lie on one path, so a component weighs
/// as many levels as it has members. Components come out of Tarjan's walk in
/// reverse topological order, so each is sized after everything it reaches.
fn nesting_bounds(edges: &[Vec<usize>], outside: &[usize]) -> Vec<usize> {
    const UNSET: usize = usize::MAX;
    let n = edges.len();
    let mut index = vec![UNSET; n];
    let mut low = vec![0; n];
    let mut on_stack = vec![false; n];
    let mut component = vec![UNSET; n];
    let mut stack = Vec::new();
    let mut bounds: Vec<usize> = Vec::new();
    let mut next = 0;

    for root in 0..n {
        if index[root] != UNSET {
            continue;
        }
        let mut work = vec![(root, 0usize)];
        while let Some(&(v, pos)) = work.last() {
            if index[v] == UNSET {
                index[v] = next;
                low[v] = next;
                next += 1;
                stack.push(v);
                on_stack[v] = true;
            }
            if let Some(&w) = edges[v].get(pos) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                if index[w] == UNSET {
                    work.push((w, 0));
                } else if on_stack[w] {
                    low[v] = low[v].min(index[w]);
                }
                continue;
            }
            work.pop();
            if let Some(&(parent, _)) = work.last() {
                low[parent] = low[parent].min(low[v]);
            }
            if low[v] != index[v] {
                continue;
            }
            let c = bounds.len();
            let mut members = Vec::new();
            while let Some(m) = stack.pop() {
                on_stack[m] = false;
                component[m] = c;
                members.push(m);
                if m == v {
                    break;
                }
            }
            let mut below = 0;
            for &m in &members {
                below = below.max(outside[m]);
                for &w in &edges[m] {
                    if component[w] != c {
                        below = below.max(bounds[component[w]]);
                    }
                }
            }
            bounds.push(members.len().saturating_add(below));
        }
    }
    component.iter().map(|&c| bounds[c]).collect()
}

fn component(ty: Type, part: Option<Type>) -> Result<Type, DecodeError> {
    part.ok_or(DecodeError::UnsupportedKind { kind: ty.kind() })
}

fn check_index(what: &'static str, index: u64, size: usize) -> Result<usize, DecodeError> {
    if index >= size as u64 {
        return Err(DecodeError::IndexOutOfRange { what, index, size });
    }
    Ok(index as usize)
}

fn narrow_uint(value: u64, context: &'static str, bits: u32) -> Result<u64, DecodeError> {
    if bits < 64 && value >> bits != 0 {
        return Err(DecodeError::VarintOverflow {
            context,
            value,
            bits,
        });
    }
    Ok(value)
}

fn narrow_float(value: f64, context: &'static str) -> Result<f32, DecodeError> {
    let narrow = value as f32;
    if f64::from(narrow) != value && !value.is_nan() {
        return Err(DecodeError::InexactFloat { context, value });
    }
    Ok(narrow)
}

fn narrow_int(value: i64, context: &'static str, bits: u32) -> Result<i64, DecodeError> {
    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    if value < min || value > max {
        return Err(DecodeError::VarintOverflow {
            context,
            value: value as u64,
            bits,
        });
    }
    Ok(value)
}

// =============================================================================
// CONVENIENCE
// =============================================================================

/// Decodes a single native value from a complete stream.
pub fn decode<T: Vdl>(bytes: &[u8]) -> Result<T, DecodeError> {
    Decoder::new(bytes).decode()
}

/// Decodes a single value of type `target` from a complete stream.
pub fn decode_value(bytes: &[u8], target: Type) -> Result<Value, DecodeError> {
    Decoder::new(bytes).decode_value(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::encoder::encode_value;
    use crate::codec::primitives::Writer;
    use crate::codec::wire::{ID_BOOL, ID_BYTE, ID_FLOAT32};
    use crate::model::{list_of, named, struct_of};

    /// Appends a type definition message with the given `wireType` body.
    fn define(w: &mut Writer, id: u64, body: Writer) {
        w.write_int(-(id as i64));
        w.write_uint(body.len() as u64);
        w.write_bytes(body.as_bytes());
    }

    fn list_def(name: &str, elem: u64) -> Writer {
        let mut body = Writer::new();
        body.write_uint(4);
        if !name.is_empty() {
            body.write_uint(1);
            body.write_string(name);
        }
        body.write_uint(2);
        body.write_uint(elem);
        body.write_uint(0);
        body
    }

    fn array_def(elem: u64, len: u64) -> Writer {
        let mut body = Writer::new();
        body.write_uint(3);
        body.write_uint(2);
        body.write_uint(elem);
        body.write_uint(3);
        body.write_uint(len);
        body.write_uint(0);
        body
    }

    fn struct_def(fields: &[(&str, u64)]) -> Writer {
        let mut body = Writer::new();
        body.write_uint(7);
        body.write_uint(2);
        body.write_uint(fields.len() as u64);
        for (name, ty) in fields {
            body.write_uint(1);
            body.write_string(name);
            body.write_uint(2);
            body.write_uint(*ty);
            body.write_uint(0);
        }
        body.write_uint(0);
        body
    }

    /// A value message of a length-prefixed type.
    fn value_message(w: &mut Writer, id: u64, body: &[u8]) {
        w.write_int(id as i64);
        w.write_uint(body.len() as u64);
        w.write_bytes(body);
    }

    fn unhex(s: &str) -> Vec<u8> {
        (0..s.len())
            .step_by(2)
            .map(|i| u8::from_str_radix(&s[i..i + 2], 16).unwrap())
            .collect()
    }

    #[test]
    fn test_known_vector_three_values() {
        let bytes = unhex("80060108036162633403646566");
        let mut dec = Decoder::new(&bytes[..]);
        assert_eq!(dec.decode_value(Type::bool()).unwrap(), Value::Bool(true));
        assert_eq!(dec.decode_value(Type::string()).unwrap(), Value::String("abc".into()));
        assert_eq!(
            dec.decode_value(list_of(Type::byte()).unwrap()).unwrap(),
            Value::Bytes(b"def".to_vec())
        );
        assert!(dec.is_at_end().unwrap());
    }

    #[test]
    fn test_named_definition_resolved() {
        let bytes = unhex("80ff810c0101064d79426f6f6c020300ff8201");
        let mut dec = Decoder::new(&bytes[..]);
        let any = dec.decode_any().unwrap();
        let ty = any.ty().unwrap();
        assert_eq!(ty.name(), "MyBool");
        assert_eq!(ty.kind(), Kind::Bool);
        assert_eq!(any.value(), Some(&Value::Bool(true)));
    }

    #[test]
    fn test_invalid_magic() {
        let err = decode_value(&[0x81, 0x06, 0x01], Type::bool()).unwrap_err();
        assert_eq!(err, DecodeError::InvalidMagic { found: 0x81 });
    }

    #[test]
    fn test_unknown_type_id() {
        let err = decode_value(&[0x80, 0xff, 0x82, 0x01], Type::bool()).unwrap_err();
        assert_eq!(err, DecodeError::UnknownTypeId { id: 65 });
    }

    #[test]
    fn test_truncated_stream() {
        let err = decode_value(&[0x80, 0x08, 0x03, 0x61], Type::string()).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEof { .. }));
    }

    #[test]
    fn test_message_length_mismatch() {
        // map[string]int64 value declaring 5 body bytes but using 4
        let bytes = unhex("80ff8106060204030b00ff82050101610200");
        let err = Decoder::new(&bytes[..]).decode_any().unwrap_err();
        assert!(matches!(err, DecodeError::MessageLengthMismatch { declared: 5, used: 4 }));
    }

    #[test]
    fn test_struct_field_out_of_range() {
        let point = struct_of("test.DecPoint", &[("X", Type::int32())]).unwrap();
        let mut bytes = encode_value(point, &Value::Struct(vec![Value::Int32(1)])).unwrap();
        // value message tail: id, len 3, field tag 1, value, 0 -> bump the tag to 5
        let n = bytes.len();
        bytes[n - 3] = 0x05;
        let err = decode_value(&bytes, point).unwrap_err();
        assert!(matches!(
            err,
            DecodeError::IndexOutOfRange {
                what: "struct field",
                index: 4,
                size: 1
            }
        ));
    }

    #[test]
    fn test_duplicate_struct_field() {
        let point = struct_of("test.DupPoint", &[("X", Type::int32())]).unwrap();
        let mut bytes = encode_value(point, &Value::Struct(vec![Value::Int32(1)])).unwrap();
        let n = bytes.len();
        // rewrite the body as: 01 02 01 02 00, length 5
        bytes.truncate(n - 4);
        bytes.extend_from_slice(&[0x05, 0x01, 0x02, 0x01, 0x02, 0x00]);
        let err = decode_value(&bytes, point).unwrap_err();
        assert_eq!(err, DecodeError::DuplicateField { index: 0 });
    }

    #[test]
    fn test_wire_overflow_is_corrupt() {
        // uint16 message whose varint needs 17 bits
        let err = decode_value(&[0x80, 0x0c, 0xfd, 0x01, 0x00, 0x00], Type::uint16()).unwrap_err();
        assert!(matches!(err, DecodeError::VarintOverflow { bits: 16, .. }));
    }

    #[test]
    fn test_incompatible_target() {
        let err = decode_value(&[0x80, 0x06, 0x01], Type::string()).unwrap_err();
        assert!(matches!(err, DecodeError::Conversion(ConversionError::Incompatible { .. })));
    }

    #[test]
    fn test_duplicate_definition() {
        let def = "ff810c0101064d79426f6f6c020300";
        let bytes = unhex(&format!("80{def}{def}ff8201"));
        let err = Decoder::new(&bytes[..]).decode_any().unwrap_err();
        assert_eq!(err, DecodeError::DuplicateTypeId { id: 65 });
    }

    #[test]
    fn test_reserved_definition_id() {
        // definition tagged -3 (bool) is rejected
        let bytes = unhex("80050c0101064d79426f6f6c020300");
        let err = Decoder::new(&bytes[..]).decode_any().unwrap_err();
        assert!(matches!(err, DecodeError::MalformedTypeDefinition { id: 3, .. }));
    }

    #[test]
    fn test_depth_limit() {
        let nested = named("test.DepthAny", Type::any()).unwrap();
        let mut value = Value::Any(Any::nil());
        for _ in 0..8 {
            value = Value::any(Type::any(), value);
        }
        let bytes = encode_value(nested, &value).unwrap();
        let options = DecodeOptions::new().with_max_depth(4);
        let err = Decoder::with_options(&bytes[..], options).decode_any().unwrap_err();
        assert_eq!(err, DecodeError::DepthExceeded { max: 4 });
    }

    #[test]
    fn test_struct_fields_out_of_order() {
        let point = struct_of("test.OrderPoint", &[("X", Type::int32()), ("Y", Type::int32())]).unwrap();
        let mut bytes = encode_value(point, &Value::Struct(vec![Value::Int32(1), Value::Int32(2)])).unwrap();
        let n = bytes.len();
        assert_eq!(bytes[n - 5..], [0x01, 0x02, 0x02, 0x04, 0x00]);
        bytes[n - 5..].copy_from_slice(&[0x02, 0x04, 0x01, 0x02, 0x00]);
        assert_eq!(
            decode_value(&bytes, point).unwrap(),
            Value::Struct(vec![Value::Int32(1), Value::Int32(2)])
        );
    }

    #[test]
    fn test_deep_definition_chain_rejected() {
        // []([]([](...bool))), one definition per level
        let levels = 20_000u64;
        let mut w = Writer::new();
        w.write_byte(MAGIC);
        for i in 0..levels {
            let id = FIRST_USER_ID + i;
            let elem = if i + 1 == levels { ID_BOOL } else { id + 1 };
            define(&mut w, id, list_def("", elem));
        }
        value_message(&mut w, FIRST_USER_ID, &[0x00]);
        let bytes = w.into_bytes();
        let err = Decoder::new(&bytes[..]).decode_any().unwrap_err();
        assert_eq!(err, DecodeError::DepthExceeded { max: MAX_DEPTH });
    }

    #[test]
    fn test_large_definition_cycle_rejected() {
        // R0 -> R1 -> ... -> R999 -> R0, all named lists
        let size = 1_000u64;
        let mut w = Writer::new();
        w.write_byte(MAGIC);
        for i in 0..size {
            let elem = FIRST_USER_ID + (i + 1) % size;
            define(&mut w, FIRST_USER_ID + i, list_def(&format!("test.Ring{i}"), elem));
        }
        value_message(&mut w, FIRST_USER_ID, &[0x00]);
        let bytes = w.into_bytes();
        let err = Decoder::new(&bytes[..]).decode_any().unwrap_err();
        assert_eq!(err, DecodeError::DepthExceeded { max: MAX_DEPTH });
    }

    #[test]
    fn test_small_definition_cycle_accepted() {
        let mut w = Writer::new();
        w.write_byte(MAGIC);
        define(&mut w, 65, list_def("test.Ping", 66));
        define(&mut w, 66, list_def("test.Pong", 65));
        value_message(&mut w, 65, &[0x01, 0x00]);
        let bytes = w.into_bytes();
        let any = Decoder::new(&bytes[..]).decode_any().unwrap();
        let ty = any.ty().unwrap();
        assert_eq!(ty.name(), "test.Ping");
        assert_eq!(ty.elem().and_then(|e| e.elem()), Some(ty));
        assert_eq!(any.value(), Some(&Value::List(vec![Value::List(vec![])])));
    }

    #[test]
    fn test_nesting_bounds() {
        // 0 <-> 1 form one component above the leaf 2
        let bounds = nesting_bounds(&[vec![1], vec![0, 2], vec![]], &[0, 0, 1]);
        assert_eq!(bounds, vec![4, 4, 2]);
        let bounds = nesting_bounds(&[vec![1], vec![2], vec![]], &[1, 1, 1]);
        assert_eq!(bounds, vec![4, 3, 2]);
    }

    #[test]
    fn test_zero_fill_budget() {
        // struct{F [4096][4096]byte} with F omitted
        let mut w = Writer::new();
        w.write_byte(MAGIC);
        define(&mut w, 65, array_def(ID_BYTE, 4096));
        define(&mut w, 66, array_def(65, 4096));
        define(&mut w, 67, struct_def(&[("F", 66)]));
        value_message(&mut w, 67, &[0x00]);
        let bytes = w.into_bytes();
        let options = DecodeOptions::new().with_max_collection_len(4096);
        let err = Decoder::with_options(&bytes[..], options).decode_any().unwrap_err();
        assert!(matches!(
            err,
            DecodeError::LengthExceedsLimit {
                field: "zero-filled values",
                max: 4096,
                ..
            }
        ));

        // a single [4096]byte fits the default budget
        let mut w = Writer::new();
        w.write_byte(MAGIC);
        define(&mut w, 65, array_def(ID_BYTE, 4096));
        define(&mut w, 66, struct_def(&[("F", 65)]));
        value_message(&mut w, 66, &[0x00]);
        let bytes = w.into_bytes();
        let any = Decoder::new(&bytes[..]).decode_any().unwrap();
        assert_eq!(any.value(), Some(&Value::Struct(vec![Value::Bytes(vec![0; 4096])])));
    }

    #[test]
    fn test_inexact_float32_is_corrupt() {
        let message = |f: f64| {
            let mut w = Writer::new();
            w.write_byte(MAGIC);
            w.write_int(ID_FLOAT32 as i64);
            w.write_float(f);
            w.into_bytes()
        };
        assert_eq!(decode_value(&message(0.5), Type::float32()), Ok(Value::Float32(0.5)));
        assert_eq!(
            decode_value(&message(0.1), Type::float32()),
            Err(DecodeError::InexactFloat {
                context: "float32",
                value: 0.1
            })
        );
        assert!(matches!(
            decode_value(&message(1e300), Type::float64()),
            Err(DecodeError::InexactFloat { .. })
        ));
    }

    #[test]
    fn test_collection_limit() {
        let ty = list_of(Type::int64()).unwrap();
        let value = Value::List(vec![Value::Int64(1); 10]);
        let bytes = encode_value(ty, &value).unwrap();
        let options = DecodeOptions::new().with_max_collection_len(4);
        let err = Decoder::with_options(&bytes[..], options).decode_value(ty).unwrap_err();
        assert!(matches!(err, DecodeError::LengthExceedsLimit { len: 10, max: 4, .. }));
    }
}
