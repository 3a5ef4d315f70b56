//! Stream encoder.
//!
//! Each call to [`Encoder::encode_value`] writes one value message, preceded
//! (the first time only) by the magic byte and by definitions of every type
//! the stream has not seen yet:
//!
//! ```text
//! stream     := 0x80 message*
//! message    := typedef* value
//! typedef    := int(-id) uint(len) wireType
//! value      := int(id) [uint(len)] body
//! ```

use std::io::Write;

use rustc_hash::FxHashMap;

use crate::codec::primitives::Writer;
use crate::codec::wire::{self, WireField, WireType};
use crate::error::EncodeError;
use crate::limits::{FIRST_USER_ID, MAGIC, MAX_MESSAGE_LEN};
use crate::model::{Kind, Type, Value};
use crate::registry::{type_of, Vdl};

/// Options for encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncodeOptions {
    /// Enable canonical encoding mode.
    ///
    /// When enabled, set elements and map entries are written in ascending
    /// order of their encoded bytes, so equal values always produce equal
    /// streams regardless of the order they were collected in.
    pub canonical: bool,
}

impl EncodeOptions {
    /// Creates default (non-canonical) encoding options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates canonical encoding options.
    pub fn canonical() -> Self {
        Self { canonical: true }
    }
}

/// Per-message scratch state: pending type definitions and the ids they took.
#[derive(Default)]
struct Message {
    defs: Writer,
    assigned: Vec<Type>,
}

/// Writes values and their type definitions to a byte sink.
#[derive(Debug)]
pub struct Encoder<W: Write> {
    sink: W,
    options: EncodeOptions,
    sent_magic: bool,
    ids: FxHashMap<Type, u64>,
    next_id: u64,
}

impl<W: Write> Encoder<W> {
    /// Creates an encoder writing to `sink`.
    pub fn new(sink: W) -> Self {
        Self::with_options(sink, EncodeOptions::default())
    }

    pub fn with_options(sink: W, options: EncodeOptions) -> Self {
        Self {
            sink,
            options,
            sent_magic: false,
            ids: FxHashMap::default(),
            next_id: FIRST_USER_ID,
        }
    }

    /// Returns a reference to the underlying sink.
    pub fn get_ref(&self) -> &W {
        &self.sink
    }

    /// Consumes the encoder, returning the underlying sink.
    pub fn into_inner(self) -> W {
        self.sink
    }

    /// Encodes a native value, deriving its type through the registry.
    pub fn encode<T: Vdl>(&mut self, value: &T) -> Result<(), EncodeError> {
        let ty = type_of::<T>()?;
        self.encode_value(ty, &value.to_value())
    }

    /// Encodes `value` as a value of type `ty`.
    ///
    /// Nothing reaches the sink unless the whole message encodes. Ids assigned
    /// for a message that fails are released again.
    pub fn encode_value(&mut self, ty: Type, value: &Value) -> Result<(), EncodeError> {
        let mut msg = Message::default();
        let result = self.write_message(ty, value, &mut msg);
        match result {
            Ok(bytes) => {
                self.sink
                    .write_all(&bytes)
                    .map_err(|e| EncodeError::Io(e.to_string()))?;
                self.sent_magic = true;
                Ok(())
            }
            Err(err) => {
                for ty in &msg.assigned {
                    self.ids.remove(ty);
                }
                self.next_id -= msg.assigned.len() as u64;
                Err(err)
            }
        }
    }

    fn write_message(&mut self, ty: Type, value: &Value, msg: &mut Message) -> Result<Vec<u8>, EncodeError> {
        let id = self.type_id(ty, msg)?;
        let mut body = Writer::new();
        self.write_body(&mut body, ty, value, msg)?;
        if body.len() > MAX_MESSAGE_LEN {
            return Err(EncodeError::LengthExceedsLimit {
                field: "message",
                len: body.len(),
                max: MAX_MESSAGE_LEN,
            });
        }

        let mut out = Writer::new();
        if !self.sent_magic {
            out.write_byte(MAGIC);
        }
        out.write_bytes(msg.defs.as_bytes());
        out.write_int(id as i64);
        if wire::has_length_prefix(ty) {
            out.write_uint(body.len() as u64);
        }
        out.write_bytes(body.as_bytes());
        log::trace!(
            "encoded value message: type {} (id {}), {} body bytes, {} new types",
            ty,
            id,
            body.len(),
            msg.assigned.len()
        );
        Ok(out.into_bytes())
    }

    /// Returns the wire id of `ty`, defining it (and its components) first if needed.
    fn type_id(&mut self, ty: Type, msg: &mut Message) -> Result<u64, EncodeError> {
        if let Some(id) = wire::bootstrap_id(ty) {
            return Ok(id);
        }
        if let Some(&id) = self.ids.get(&ty) {
            return Ok(id);
        }
        let id = self.next_id;
        self.next_id += 1;
        self.ids.insert(ty, id);
        msg.assigned.push(ty);

        let def = self.describe(ty, msg)?;
        let mut body = Writer::new();
        self.write_body(&mut body, wire::wire_type(), &def.to_value(), msg)?;
        msg.defs.write_int(-(id as i64));
        msg.defs.write_uint(body.len() as u64);
        msg.defs.write_bytes(body.as_bytes());
        log::trace!("defined type {} as id {}", ty, id);
        Ok(id)
    }

    /// Builds the wire description of a non-bootstrap type.
    fn describe(&mut self, ty: Type, msg: &mut Message) -> Result<WireType, EncodeError> {
        let name = ty.name().to_string();
        let mut id_of = |this: &mut Self, t: Option<Type>| match t {
            Some(t) => this.type_id(t, msg),
            None => Err(EncodeError::UnsupportedKind { kind: ty.kind() }),
        };
        let def = match ty.kind() {
            Kind::Enum => WireType::Enum {
                name,
                labels: ty.labels().to_vec(),
            },
            Kind::Array => WireType::Array {
                name,
                elem: id_of(self, ty.elem())?,
                len: ty.array_len() as u64,
            },
            Kind::List => WireType::List {
                name,
                elem: id_of(self, ty.elem())?,
            },
            Kind::Set => WireType::Set {
                name,
                key: id_of(self, ty.key())?,
            },
            Kind::Map => WireType::Map {
                name,
                key: id_of(self, ty.key())?,
                elem: id_of(self, ty.elem())?,
            },
            Kind::Optional => WireType::Optional {
                name,
                elem: id_of(self, ty.elem())?,
            },
            Kind::Struct | Kind::Union => {
                let mut fields = Vec::with_capacity(ty.fields().len());
                for field in ty.fields() {
                    fields.push(WireField {
                        name: field.name.clone(),
                        ty: id_of(self, Some(field.ty))?,
                    });
                }
                if ty.kind() == Kind::Struct {
                    WireType::Struct { name, fields }
                } else {
                    WireType::Union { name, fields }
                }
            }
            // Named scalars refer to their unnamed bootstrap base.
            kind => {
                let base = Type::primitive(kind)
                    .and_then(wire::bootstrap_id)
                    .ok_or(EncodeError::UnsupportedKind { kind })?;
                WireType::Named { name, base }
            }
        };
        Ok(def)
    }

    fn mismatch(ty: Type, value: &Value) -> EncodeError {
        EncodeError::ValueMismatch {
            ty: ty.to_string(),
            expected: ty.kind(),
            found: value.kind_name(),
        }
    }

    fn write_body(&mut self, w: &mut Writer, ty: Type, value: &Value, msg: &mut Message) -> Result<(), EncodeError> {
        match (ty.kind(), value) {
            (Kind::Bool, Value::Bool(v)) => w.write_bool(*v),
            (Kind::Byte, Value::Byte(v)) => w.write_uint(*v as u64),
            (Kind::Uint16, Value::Uint16(v)) => w.write_uint(*v as u64),
            (Kind::Uint32, Value::Uint32(v)) => w.write_uint(*v as u64),
            (Kind::Uint64, Value::Uint64(v)) => w.write_uint(*v),
            (Kind::Int16, Value::Int16(v)) => w.write_int(*v as i64),
            (Kind::Int32, Value::Int32(v)) => w.write_int(*v as i64),
            (Kind::Int64, Value::Int64(v)) => w.write_int(*v),
            (Kind::Float32, Value::Float32(v)) => w.write_float(*v as f64),
            (Kind::Float64, Value::Float64(v)) => w.write_float(*v),
            (Kind::Complex64, Value::Complex64(c)) => {
                w.write_float(c.re as f64);
                w.write_float(c.im as f64);
            }
            (Kind::Complex128, Value::Complex128(c)) => {
                w.write_float(c.re);
                w.write_float(c.im);
            }
            (Kind::String, Value::String(s)) => w.write_string(s),
            (Kind::Enum, Value::Enum(index)) => {
                check_index("enum label", *index, ty.labels().len(), ty)?;
                w.write_uint(*index as u64);
            }
            (Kind::TypeObject, Value::TypeObject(t)) => {
                let id = self.type_id(*t, msg)?;
                w.write_uint(id);
            }
            (Kind::Array | Kind::List, _) if ty.is_bytes() => {
                let bytes = byte_contents(value).ok_or_else(|| Self::mismatch(ty, value))?;
                if ty.kind() == Kind::Array {
                    check_array_len(ty, bytes.len())?;
                    w.write_bytes(&bytes);
                } else {
                    w.write_bytes_prefixed(&bytes);
                }
            }
            (Kind::Array, Value::Array(items)) => {
                check_array_len(ty, items.len())?;
                let elem = component(ty, ty.elem())?;
                for item in items {
                    self.write_body(w, elem, item, msg)?;
                }
            }
            (Kind::List, Value::List(items)) => {
                let elem = component(ty, ty.elem())?;
                w.write_uint(items.len() as u64);
                for item in items {
                    self.write_body(w, elem, item, msg)?;
                }
            }
            (Kind::Set, Value::Set(items)) => {
                let key = component(ty, ty.key())?;
                w.write_uint(items.len() as u64);
                if self.options.canonical {
                    let mut encoded = Vec::with_capacity(items.len());
                    for item in items {
                        let mut sub = Writer::new();
                        self.write_body(&mut sub, key, item, msg)?;
                        encoded.push(sub.into_bytes());
                    }
                    encoded.sort();
                    for bytes in encoded {
                        w.write_bytes(&bytes);
                    }
                } else {
                    for item in items {
                        self.write_body(w, key, item, msg)?;
                    }
                }
            }
            (Kind::Map, Value::Map(pairs)) => {
                let key = component(ty, ty.key())?;
                let elem = component(ty, ty.elem())?;
                w.write_uint(pairs.len() as u64);
                if self.options.canonical {
                    let mut encoded = Vec::with_capacity(pairs.len());
                    for (k, v) in pairs {
                        let mut sub_key = Writer::new();
                        self.write_body(&mut sub_key, key, k, msg)?;
                        let mut sub_value = Writer::new();
                        self.write_body(&mut sub_value, elem, v, msg)?;
                        encoded.push((sub_key.into_bytes(), sub_value.into_bytes()));
                    }
                    encoded.sort();
                    for (k, v) in encoded {
                        w.write_bytes(&k);
                        w.write_bytes(&v);
                    }
                } else {
                    for (k, v) in pairs {
                        self.write_body(w, key, k, msg)?;
                        self.write_body(w, elem, v, msg)?;
                    }
                }
            }
            (Kind::Struct, Value::Struct(values)) => {
                let fields = ty.fields();
                if values.len() != fields.len() {
                    return Err(EncodeError::FieldCount {
                        ty: ty.to_string(),
                        expected: fields.len(),
                        actual: values.len(),
                    });
                }
                for (index, (field, v)) in fields.iter().zip(values).enumerate() {
                    if v.is_zero(field.ty) {
                        continue;
                    }
                    w.write_uint(index as u64 + 1);
                    self.write_body(w, field.ty, v, msg)?;
                }
                w.write_uint(0);
            }
            (Kind::Union, Value::Union(index, v)) => {
                check_index("union field", *index, ty.fields().len(), ty)?;
                let field = &ty.fields()[*index];
                w.write_uint(*index as u64 + 1);
                self.write_body(w, field.ty, v, msg)?;
            }
            (Kind::Optional, Value::Optional(inner)) => match inner {
                None => w.write_uint(0),
                Some(v) => {
                    w.write_uint(1);
                    self.write_body(w, component(ty, ty.elem())?, v, msg)?;
                }
            },
            (Kind::Any, Value::Any(any)) => match &any.0 {
                None => w.write_uint(0),
                Some(inner) => {
                    let id = self.type_id(inner.ty, msg)?;
                    w.write_uint(id);
                    self.write_body(w, inner.ty, &inner.value, msg)?;
                }
            },
            _ => return Err(Self::mismatch(ty, value)),
        }
        Ok(())
    }
}

fn component(ty: Type, part: Option<Type>) -> Result<Type, EncodeError> {
    part.ok_or(EncodeError::UnsupportedKind { kind: ty.kind() })
}

fn check_index(what: &'static str, index: usize, size: usize, ty: Type) -> Result<(), EncodeError> {
    if index >= size {
        return Err(EncodeError::IndexOutOfRange {
            what,
            index,
            size,
            ty: ty.to_string(),
        });
    }
    Ok(())
}

fn check_array_len(ty: Type, actual: usize) -> Result<(), EncodeError> {
    if actual != ty.array_len() {
        return Err(EncodeError::ArrayLength {
            ty: ty.to_string(),
            expected: ty.array_len(),
            actual,
        });
    }
    Ok(())
}

/// Contents of a byte collection held either as `Bytes` or as a list of `Byte`.
fn byte_contents(value: &Value) -> Option<Vec<u8>> {
    match value {
        Value::Bytes(b) => Some(b.clone()),
        Value::List(items) | Value::Array(items) => items
            .iter()
            .map(|v| match v {
                Value::Byte(b) => Some(*b),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

// =============================================================================
// CONVENIENCE
// =============================================================================

/// Encodes a single native value into a fresh stream.
pub fn encode<T: Vdl>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new(Vec::new());
    encoder.encode(value)?;
    Ok(encoder.into_inner())
}

/// Encodes a single dynamic value into a fresh stream.
pub fn encode_value(ty: Type, value: &Value) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = Encoder::new(Vec::new());
    encoder.encode_value(ty, value)?;
    Ok(encoder.into_inner())
}
