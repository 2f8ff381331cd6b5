use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};

use crate::keyed::Key;
use crate::mutable::Slot;
use crate::schema::{
    ArrayDef, EnumDef, Primitive, RecordDef, SchemaRegistry, StructDef, TypeDef,
};
use crate::timestamp::Timestamp;

/// A frozen value: deeply immutable, cheap to clone (`Arc`-shared storage),
/// safe to share across threads. Structural equality throughout, with
/// `NaN == NaN` and `0.0 == -0.0` so wire round-trips stay equal.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Int32(i32),
    Int64(i64),
    Uint64(u64),
    Float32(f32),
    Float64(f64),
    Timestamp(Timestamp),
    String(Arc<str>),
    Bytes(Arc<[u8]>),
    Array(ArrayValue),
    Struct(StructValue),
    Enum(EnumValue),
}

impl Value {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Integer view; covers both `int32` and `int64` storage.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int32(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    /// Float view; covers both `float32` and `float64` storage.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float32(v) => Some(f64::from(*v)),
            Value::Float64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<Timestamp> {
        match self {
            Value::Timestamp(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            Value::Array(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&StructValue> {
        match self {
            Value::Struct(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_enum(&self) -> Option<&EnumValue> {
        match self {
            Value::Enum(v) => Some(v),
            _ => None,
        }
    }

    /// Array literal: freezes every item. The resulting value is untyped
    /// until adopted into a field, which re-checks items and attaches the
    /// key metadata the field's type declares.
    pub fn array(items: Vec<Slot>) -> Value {
        let items: Vec<Value> = items.iter().map(Slot::to_frozen_value).collect();
        Value::Array(ArrayValue::from_parts(items, None))
    }

    /// True if this value equals its type's zero value.
    pub fn is_default(&self) -> bool {
        match self {
            Value::Bool(v) => !v,
            Value::Int32(v) => *v == 0,
            Value::Int64(v) => *v == 0,
            Value::Uint64(v) => *v == 0,
            Value::Float32(v) => *v == 0.0,
            Value::Float64(v) => *v == 0.0,
            Value::Timestamp(v) => v.unix_millis() == 0,
            Value::String(v) => v.is_empty(),
            Value::Bytes(v) => v.is_empty(),
            Value::Array(v) => v.is_empty(),
            Value::Struct(v) => v.fields.iter().all(Value::is_default),
            Value::Enum(v) => v.variant.is_none(),
        }
    }

    pub(crate) fn kind_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int32(_) => "int32",
            Value::Int64(_) => "int64",
            Value::Uint64(_) => "uint64",
            Value::Float32(_) => "float32",
            Value::Float64(_) => "float64",
            Value::Timestamp(_) => "timestamp",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Array(_) => "array",
            Value::Struct(_) => "struct",
            Value::Enum(_) => "enum",
        }
    }
}

fn f32_eq(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn f64_eq(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int32(a), Value::Int32(b)) => a == b,
            (Value::Int64(a), Value::Int64(b)) => a == b,
            (Value::Uint64(a), Value::Uint64(b)) => a == b,
            (Value::Float32(a), Value::Float32(b)) => f32_eq(*a, *b),
            (Value::Float64(a), Value::Float64(b)) => f64_eq(*a, *b),
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Bytes(a), Value::Bytes(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => a == b,
            (Value::Struct(a), Value::Struct(b)) => a == b,
            (Value::Enum(a), Value::Enum(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Value {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Value {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Value {
        Value::Int64(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Value {
        Value::Uint64(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Value {
        Value::Float32(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Value {
        Value::Float64(v)
    }
}

impl From<Timestamp> for Value {
    fn from(v: Timestamp) -> Value {
        Value::Timestamp(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Value {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Value {
        Value::String(Arc::from(v.as_str()))
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Value {
        Value::Bytes(Arc::from(v.as_slice()))
    }
}

impl From<StructValue> for Value {
    fn from(v: StructValue) -> Value {
        Value::Struct(v)
    }
}

impl From<ArrayValue> for Value {
    fn from(v: ArrayValue) -> Value {
        Value::Array(v)
    }
}

impl From<EnumValue> for Value {
    fn from(v: EnumValue) -> Value {
        Value::Enum(v)
    }
}

/// Frozen struct instance. Storage is one slot per schema field, parallel to
/// the definition's field order; partial construction fills the rest from
/// the type's cached DEFAULT.
#[derive(Debug, Clone)]
pub struct StructValue {
    def: Arc<StructDef>,
    pub(crate) fields: Arc<[Value]>,
}

impl StructValue {
    pub(crate) fn from_parts(def: Arc<StructDef>, fields: Vec<Value>) -> StructValue {
        StructValue {
            def,
            fields: fields.into(),
        }
    }

    /// The DEFAULT instance: every field at its zero value. Computed once
    /// per definition and shared thereafter, so default checks are cheap.
    pub fn default_of(registry: &SchemaRegistry, def: &Arc<StructDef>) -> Result<StructValue> {
        if let Some(v) = def.default_cell.get() {
            return Ok(v.clone());
        }
        let mut fields = Vec::with_capacity(def.fields.len());
        for f in &def.fields {
            let v = default_for_type(registry, &f.ty)
                .with_context(|| format!("default for {:?}.{}", def.id, f.name))?;
            fields.push(v);
        }
        let built = StructValue::from_parts(def.clone(), fields);
        Ok(def.default_cell.get_or_init(|| built).clone())
    }

    /// Partial construction: the named fields are assigned, the rest
    /// default. Sequence inputs are frozen on the way in (copy-in, never
    /// aliasing a caller's mutable buffer).
    pub fn partial(
        registry: &SchemaRegistry,
        def: &Arc<StructDef>,
        fields: Vec<(&str, Slot)>,
    ) -> Result<StructValue> {
        let mut values = StructValue::default_of(registry, def)?.fields.to_vec();
        for (name, slot) in fields {
            let idx = def
                .field_index(name)
                .with_context(|| format!("struct {:?} has no field {name:?}", def.id))?;
            let adopted = adopt(registry, &def.fields[idx].ty, slot.to_frozen_value())
                .with_context(|| format!("field {:?}.{}", def.id, name))?;
            values[idx] = adopted;
        }
        Ok(StructValue::from_parts(def.clone(), values))
    }

    /// `to_mutable` + assignments + `to_frozen`, as one operation.
    pub fn replace(
        &self,
        registry: &SchemaRegistry,
        fields: Vec<(&str, Slot)>,
    ) -> Result<StructValue> {
        let mut values = self.fields.to_vec();
        for (name, slot) in fields {
            let idx = self
                .def
                .field_index(name)
                .with_context(|| format!("struct {:?} has no field {name:?}", self.def.id))?;
            let adopted = adopt(registry, &self.def.fields[idx].ty, slot.to_frozen_value())
                .with_context(|| format!("field {:?}.{}", self.def.id, name))?;
            values[idx] = adopted;
        }
        Ok(StructValue::from_parts(self.def.clone(), values))
    }

    pub fn def(&self) -> &Arc<StructDef> {
        &self.def
    }

    pub fn get(&self, name: &str) -> Result<&Value> {
        let idx = self
            .def
            .field_index(name)
            .with_context(|| format!("struct {:?} has no field {name:?}", self.def.id))?;
        Ok(&self.fields[idx])
    }

    pub fn get_by_number(&self, number: u32) -> Result<&Value> {
        let idx = self
            .def
            .field_index_by_number(number)
            .with_context(|| format!("struct {:?} has no field number {number}", self.def.id))?;
        Ok(&self.fields[idx])
    }

    pub fn fields(&self) -> &[Value] {
        &self.fields
    }
}

impl PartialEq for StructValue {
    fn eq(&self, other: &StructValue) -> bool {
        self.def.id == other.def.id && self.fields == other.fields
    }
}

/// Frozen ordered sequence. When the element type declares a key field, a
/// key-to-position index is built lazily on first lookup and shared by all
/// clones of the same backing storage.
#[derive(Debug, Clone)]
pub struct ArrayValue {
    pub(crate) repr: Arc<ArrayRepr>,
}

#[derive(Debug)]
pub(crate) struct ArrayRepr {
    pub(crate) items: Box<[Value]>,
    pub(crate) keyed: Option<KeyedMeta>,
    pub(crate) index: OnceLock<HashMap<Key, usize>>,
}

#[derive(Debug, Clone)]
pub(crate) struct KeyedMeta {
    pub(crate) field_index: usize,
    pub(crate) item_def: Arc<StructDef>,
}

impl KeyedMeta {
    pub(crate) fn resolve(registry: &SchemaRegistry, def: &ArrayDef) -> Result<Option<KeyedMeta>> {
        let Some(key_name) = &def.key_field else {
            return Ok(None);
        };
        let TypeDef::Record(item_id) = &*def.item else {
            anyhow::bail!("keyed array item must be a struct");
        };
        let item_def = registry.struct_def(item_id)?;
        let field_index = item_def
            .field_index(key_name)
            .with_context(|| format!("key field {key_name:?} not found on {item_id:?}"))?;
        Ok(Some(KeyedMeta {
            field_index,
            item_def: item_def.clone(),
        }))
    }
}

impl ArrayValue {
    pub(crate) fn from_parts(items: Vec<Value>, keyed: Option<KeyedMeta>) -> ArrayValue {
        ArrayValue {
            repr: Arc::new(ArrayRepr {
                items: items.into_boxed_slice(),
                keyed,
                index: OnceLock::new(),
            }),
        }
    }

    pub fn items(&self) -> &[Value] {
        &self.repr.items
    }

    pub fn len(&self) -> usize {
        self.repr.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repr.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.repr.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.repr.items.iter()
    }
}

impl PartialEq for ArrayValue {
    fn eq(&self, other: &ArrayValue) -> bool {
        self.repr.items == other.repr.items
    }
}

/// View of an enum value for exhaustive matching.
#[derive(Debug, PartialEq)]
pub enum EnumCase<'a> {
    Unknown,
    Constant(&'a str),
    Data(&'a str, &'a Value),
}

/// Frozen enum instance: a declared variant, or the implicit UNKNOWN.
/// Unrecognized wire variants decode to UNKNOWN, so `variant` is `None` both
/// for the default value and for forward-compatibility fallbacks.
#[derive(Debug, Clone)]
pub struct EnumValue {
    def: Arc<EnumDef>,
    pub(crate) variant: Option<usize>,
    payload: Option<Arc<Value>>,
}

impl EnumValue {
    pub fn unknown(def: &Arc<EnumDef>) -> EnumValue {
        EnumValue {
            def: def.clone(),
            variant: None,
            payload: None,
        }
    }

    /// A constant variant by name.
    pub fn constant(def: &Arc<EnumDef>, name: &str) -> Result<EnumValue> {
        let idx = def
            .variant_index(name)
            .with_context(|| format!("enum {:?} has no variant {name:?}", def.id))?;
        if def.variants[idx].payload.is_some() {
            anyhow::bail!(
                "enum {:?} variant {name:?} carries a payload, use wrap()",
                def.id
            );
        }
        Ok(EnumValue {
            def: def.clone(),
            variant: Some(idx),
            payload: None,
        })
    }

    /// A data variant from a ready payload value.
    pub fn wrap(
        registry: &SchemaRegistry,
        def: &Arc<EnumDef>,
        name: &str,
        payload: Slot,
    ) -> Result<EnumValue> {
        let idx = def
            .variant_index(name)
            .with_context(|| format!("enum {:?} has no variant {name:?}", def.id))?;
        let Some(payload_ty) = &def.variants[idx].payload else {
            anyhow::bail!(
                "enum {:?} variant {name:?} is a constant, use constant()",
                def.id
            );
        };
        let adopted = adopt(registry, payload_ty, payload.to_frozen_value())
            .with_context(|| format!("payload of {:?}.{}", def.id, name))?;
        Ok(EnumValue {
            def: def.clone(),
            variant: Some(idx),
            payload: Some(Arc::new(adopted)),
        })
    }

    /// A data variant whose struct payload is built from field pairs.
    pub fn create(
        registry: &SchemaRegistry,
        def: &Arc<EnumDef>,
        name: &str,
        fields: Vec<(&str, Slot)>,
    ) -> Result<EnumValue> {
        let idx = def
            .variant_index(name)
            .with_context(|| format!("enum {:?} has no variant {name:?}", def.id))?;
        let Some(TypeDef::Record(payload_id)) = &def.variants[idx].payload else {
            anyhow::bail!(
                "enum {:?} variant {name:?} does not carry a struct payload",
                def.id
            );
        };
        let payload_def = registry.struct_def(payload_id)?;
        let payload = StructValue::partial(registry, payload_def, fields)?;
        EnumValue::wrap(registry, def, name, Slot::Frozen(Value::Struct(payload)))
    }

    /// The declared variant name, or `"?"` for UNKNOWN.
    pub fn kind(&self) -> &str {
        match self.variant {
            Some(idx) => &self.def.variants[idx].name,
            None => "?",
        }
    }

    /// Wire number; 0 for UNKNOWN.
    pub fn number(&self) -> u32 {
        match self.variant {
            Some(idx) => self.def.variants[idx].number,
            None => 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.variant.is_none()
    }

    pub fn payload(&self) -> Option<&Value> {
        self.payload.as_deref()
    }

    pub fn case(&self) -> EnumCase<'_> {
        match (self.variant, &self.payload) {
            (None, _) => EnumCase::Unknown,
            (Some(idx), None) => EnumCase::Constant(&self.def.variants[idx].name),
            (Some(idx), Some(payload)) => EnumCase::Data(&self.def.variants[idx].name, payload),
        }
    }

    pub fn def(&self) -> &Arc<EnumDef> {
        &self.def
    }
}

impl PartialEq for EnumValue {
    fn eq(&self, other: &EnumValue) -> bool {
        self.def.id == other.def.id
            && self.number() == other.number()
            && self.payload == other.payload
    }
}

/// The zero value for a type: `false`, `0`, the epoch, `""`, empty bytes,
/// the empty sequence, UNKNOWN, or the struct DEFAULT.
pub(crate) fn default_for_type(registry: &SchemaRegistry, ty: &TypeDef) -> Result<Value> {
    match ty {
        TypeDef::Primitive(p) => Ok(match p {
            Primitive::Bool => Value::Bool(false),
            Primitive::Int32 => Value::Int32(0),
            Primitive::Int64 => Value::Int64(0),
            Primitive::Uint64 => Value::Uint64(0),
            Primitive::Float32 => Value::Float32(0.0),
            Primitive::Float64 => Value::Float64(0.0),
            Primitive::Timestamp => Value::Timestamp(Timestamp::EPOCH),
            Primitive::String => Value::String(Arc::from("")),
            Primitive::Bytes => Value::Bytes(Arc::from(&[][..])),
        }),
        TypeDef::Array(ad) => {
            let keyed = KeyedMeta::resolve(registry, ad)?;
            Ok(Value::Array(ArrayValue::from_parts(Vec::new(), keyed)))
        }
        TypeDef::Record(id) => match registry.record(id)? {
            RecordDef::Struct(def) => Ok(Value::Struct(StructValue::default_of(registry, def)?)),
            RecordDef::Enum(def) => Ok(Value::Enum(EnumValue::unknown(def))),
        },
    }
}

/// Checks a frozen value against a field type, applying the widening rules
/// (`int32 → int64`, `float32 → float64`, integers into float fields) and
/// retyping array storage. Anything else of the wrong shape is an error.
pub(crate) fn adopt(registry: &SchemaRegistry, ty: &TypeDef, value: Value) -> Result<Value> {
    match ty {
        TypeDef::Primitive(p) => adopt_primitive(*p, value),
        TypeDef::Array(ad) => {
            let Value::Array(av) = value else {
                anyhow::bail!("expected array, got {}", value.kind_name());
            };
            let keyed = KeyedMeta::resolve(registry, ad)?;
            let mut items = Vec::with_capacity(av.len());
            for item in av.iter() {
                items.push(adopt(registry, &ad.item, item.clone())?);
            }
            Ok(Value::Array(ArrayValue::from_parts(items, keyed)))
        }
        TypeDef::Record(id) => match (registry.record(id)?, value) {
            (RecordDef::Struct(def), Value::Struct(sv)) if sv.def().id == def.id => {
                Ok(Value::Struct(sv))
            }
            (RecordDef::Enum(def), Value::Enum(ev)) if ev.def().id == def.id => {
                Ok(Value::Enum(ev))
            }
            (_, other) => anyhow::bail!(
                "value of kind {} does not match record type {id:?}",
                other.kind_name()
            ),
        },
    }
}

fn adopt_primitive(p: Primitive, value: Value) -> Result<Value> {
    let ok = match (p, &value) {
        (Primitive::Bool, Value::Bool(_)) => true,
        (Primitive::Int32, Value::Int32(_)) => true,
        (Primitive::Int64, Value::Int64(_)) => true,
        (Primitive::Int64, Value::Int32(v)) => return Ok(Value::Int64(i64::from(*v))),
        (Primitive::Uint64, Value::Uint64(_)) => true,
        (Primitive::Float32, Value::Float32(_)) => true,
        (Primitive::Float32, Value::Int32(v)) => return Ok(Value::Float32(*v as f32)),
        (Primitive::Float32, Value::Int64(v)) => return Ok(Value::Float32(*v as f32)),
        (Primitive::Float64, Value::Float64(_)) => true,
        (Primitive::Float64, Value::Float32(v)) => return Ok(Value::Float64(f64::from(*v))),
        (Primitive::Float64, Value::Int32(v)) => return Ok(Value::Float64(f64::from(*v))),
        (Primitive::Float64, Value::Int64(v)) => return Ok(Value::Float64(*v as f64)),
        (Primitive::Timestamp, Value::Timestamp(_)) => true,
        (Primitive::String, Value::String(_)) => true,
        (Primitive::Bytes, Value::Bytes(_)) => true,
        _ => false,
    };
    if !ok {
        anyhow::bail!(
            "expected {}, got {}",
            p.as_str(),
            value.kind_name()
        );
    }
    Ok(value)
}

impl SchemaRegistry {
    /// Partial construction of a frozen struct by record id.
    pub fn new_struct(&self, id: &str, fields: Vec<(&str, Slot)>) -> Result<StructValue> {
        let def = self.struct_def(id)?.clone();
        StructValue::partial(self, &def, fields)
    }

    pub fn default_struct(&self, id: &str) -> Result<StructValue> {
        let def = self.struct_def(id)?.clone();
        StructValue::default_of(self, &def)
    }

    pub fn default_value(&self, ty: &TypeDef) -> Result<Value> {
        default_for_type(self, ty)
    }

    /// Typed array construction: items are frozen, shape-checked against the
    /// element type, and the declared key metadata is attached.
    pub fn new_array(&self, def: &ArrayDef, items: Vec<Slot>) -> Result<Value> {
        let keyed = KeyedMeta::resolve(self, def)?;
        let mut out = Vec::with_capacity(items.len());
        for (i, slot) in items.into_iter().enumerate() {
            let adopted = adopt(self, &def.item, slot.to_frozen_value())
                .with_context(|| format!("array item {i}"))?;
            out.push(adopted);
        }
        Ok(Value::Array(ArrayValue::from_parts(out, keyed)))
    }

    pub fn enum_unknown(&self, id: &str) -> Result<EnumValue> {
        Ok(EnumValue::unknown(self.enum_def(id)?))
    }

    pub fn enum_constant(&self, id: &str, name: &str) -> Result<EnumValue> {
        EnumValue::constant(self.enum_def(id)?, name)
    }

    pub fn enum_wrap(&self, id: &str, name: &str, payload: Slot) -> Result<EnumValue> {
        let def = self.enum_def(id)?.clone();
        EnumValue::wrap(self, &def, name, payload)
    }

    pub fn enum_create(
        &self,
        id: &str,
        name: &str,
        fields: Vec<(&str, Slot)>,
    ) -> Result<EnumValue> {
        let def = self.enum_def(id)?.clone();
        EnumValue::create(self, &def, name, fields)
    }
}
