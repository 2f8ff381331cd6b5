use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};

use crate::value::Value;

/// Scalar field types and their wire names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Bool,
    Int32,
    Int64,
    Uint64,
    Float32,
    Float64,
    Timestamp,
    String,
    Bytes,
}

impl Primitive {
    pub fn as_str(self) -> &'static str {
        match self {
            Primitive::Bool => "bool",
            Primitive::Int32 => "int32",
            Primitive::Int64 => "int64",
            Primitive::Uint64 => "uint64",
            Primitive::Float32 => "float32",
            Primitive::Float64 => "float64",
            Primitive::Timestamp => "timestamp",
            Primitive::String => "string",
            Primitive::Bytes => "bytes",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "bool" => Some(Primitive::Bool),
            "int32" => Some(Primitive::Int32),
            "int64" => Some(Primitive::Int64),
            "uint64" => Some(Primitive::Uint64),
            "float32" => Some(Primitive::Float32),
            "float64" => Some(Primitive::Float64),
            "timestamp" => Some(Primitive::Timestamp),
            "string" => Some(Primitive::String),
            "bytes" => Some(Primitive::Bytes),
            _ => None,
        }
    }

    /// True if a field of this type may serve as a keyed-array key.
    pub fn is_keyable(self) -> bool {
        !matches!(
            self,
            Primitive::Float32 | Primitive::Float64 | Primitive::Bytes
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDef {
    Primitive(Primitive),
    Array(ArrayDef),
    /// Reference to a struct or enum definition, by stable record id.
    Record(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDef {
    pub item: Box<TypeDef>,
    /// Name of the key field on the item struct, for keyed arrays.
    pub key_field: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FieldDef {
    pub name: String,
    pub number: u32,
    pub ty: TypeDef,
}

impl FieldDef {
    pub fn new(name: &str, number: u32, ty: TypeDef) -> FieldDef {
        FieldDef {
            name: name.to_string(),
            number,
            ty,
        }
    }
}

#[derive(Debug)]
pub struct StructDef {
    pub id: String,
    /// Sorted by ascending wire number; value storage is parallel to this.
    pub fields: Vec<FieldDef>,
    by_name: BTreeMap<String, usize>,
    by_number: BTreeMap<u32, usize>,
    pub(crate) default_cell: OnceLock<crate::value::StructValue>,
    descriptor_cell: OnceLock<Value>,
}

impl StructDef {
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.field_index(name).map(|i| &self.fields[i])
    }

    pub fn field_by_number(&self, number: u32) -> Option<&FieldDef> {
        self.field_index_by_number(number).map(|i| &self.fields[i])
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn field_index_by_number(&self, number: u32) -> Option<usize> {
        self.by_number.get(&number).copied()
    }

    /// Build-once cell for the reflection descriptor of this record.
    pub fn descriptor_cache(&self) -> &OnceLock<Value> {
        &self.descriptor_cell
    }
}

#[derive(Debug, Clone)]
pub struct VariantDef {
    pub name: String,
    pub number: u32,
    /// `None` for constant variants.
    pub payload: Option<TypeDef>,
}

impl VariantDef {
    pub fn constant(name: &str, number: u32) -> VariantDef {
        VariantDef {
            name: name.to_string(),
            number,
            payload: None,
        }
    }

    pub fn data(name: &str, number: u32, payload: TypeDef) -> VariantDef {
        VariantDef {
            name: name.to_string(),
            number,
            payload: Some(payload),
        }
    }
}

#[derive(Debug)]
pub struct EnumDef {
    pub id: String,
    /// Declared variants, sorted by ascending wire number. Wire number 0 is
    /// reserved for the implicit UNKNOWN variant and never appears here.
    pub variants: Vec<VariantDef>,
    by_name: BTreeMap<String, usize>,
    by_number: BTreeMap<u32, usize>,
    descriptor_cell: OnceLock<Value>,
}

impl EnumDef {
    pub fn variant(&self, name: &str) -> Option<&VariantDef> {
        self.variant_index(name).map(|i| &self.variants[i])
    }

    pub fn variant_by_number(&self, number: u32) -> Option<&VariantDef> {
        self.by_number.get(&number).map(|&i| &self.variants[i])
    }

    pub(crate) fn variant_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub(crate) fn variant_index_by_number(&self, number: u32) -> Option<usize> {
        self.by_number.get(&number).copied()
    }

    /// Build-once cell for the reflection descriptor of this record.
    pub fn descriptor_cache(&self) -> &OnceLock<Value> {
        &self.descriptor_cell
    }
}

#[derive(Debug, Clone)]
pub enum RecordDef {
    Struct(Arc<StructDef>),
    Enum(Arc<EnumDef>),
}

impl RecordDef {
    pub fn id(&self) -> &str {
        match self {
            RecordDef::Struct(d) => &d.id,
            RecordDef::Enum(d) => &d.id,
        }
    }

    pub fn kind_str(&self) -> &'static str {
        match self {
            RecordDef::Struct(_) => "struct",
            RecordDef::Enum(_) => "enum",
        }
    }
}

/// An RPC method as declared in the schema: name, numeric id, and the
/// request/response types it frames.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    pub number: u32,
    pub request: TypeDef,
    pub response: TypeDef,
}

/// The set of record definitions one schema compilation produced, keyed by
/// stable record id. Immutable once built; construction, defaulting, and
/// decoding all resolve record references through it.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    records: BTreeMap<String, RecordDef>,
}

impl SchemaRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn record(&self, id: &str) -> Result<&RecordDef> {
        self.records
            .get(id)
            .with_context(|| format!("unknown record id: {id:?}"))
    }

    pub fn struct_def(&self, id: &str) -> Result<&Arc<StructDef>> {
        match self.record(id)? {
            RecordDef::Struct(d) => Ok(d),
            RecordDef::Enum(_) => anyhow::bail!("record {id:?} is an enum, expected a struct"),
        }
    }

    pub fn enum_def(&self, id: &str) -> Result<&Arc<EnumDef>> {
        match self.record(id)? {
            RecordDef::Enum(d) => Ok(d),
            RecordDef::Struct(_) => anyhow::bail!("record {id:?} is a struct, expected an enum"),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &RecordDef> {
        self.records.values()
    }

    /// Validates that every record reference in `ty` resolves and that keyed
    /// arrays point at a legal key field.
    pub fn check_type(&self, ty: &TypeDef) -> Result<()> {
        match ty {
            TypeDef::Primitive(_) => Ok(()),
            TypeDef::Array(ad) => {
                self.check_type(&ad.item)?;
                if let Some(key) = &ad.key_field {
                    let TypeDef::Record(item_id) = &*ad.item else {
                        anyhow::bail!("keyed array item must be a struct, got a non-record type");
                    };
                    let item = self.struct_def(item_id)?;
                    let field = item.field(key).with_context(|| {
                        format!("key field {key:?} not found on struct {item_id:?}")
                    })?;
                    match &field.ty {
                        TypeDef::Primitive(p) if p.is_keyable() => {}
                        other => anyhow::bail!(
                            "key field {key:?} on {item_id:?} has non-keyable type {other:?}"
                        ),
                    }
                }
                Ok(())
            }
            TypeDef::Record(id) => self.record(id).map(|_| ()),
        }
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    structs: Vec<(String, Vec<FieldDef>)>,
    enums: Vec<(String, Vec<VariantDef>)>,
}

impl RegistryBuilder {
    pub fn struct_def(mut self, id: &str, fields: Vec<FieldDef>) -> Self {
        self.structs.push((id.to_string(), fields));
        self
    }

    pub fn enum_def(mut self, id: &str, variants: Vec<VariantDef>) -> Self {
        self.enums.push((id.to_string(), variants));
        self
    }

    pub fn build(self) -> Result<SchemaRegistry> {
        let mut records: BTreeMap<String, RecordDef> = BTreeMap::new();

        for (id, mut fields) in self.structs {
            check_record_id(&id)?;
            fields.sort_by_key(|f| f.number);
            let mut by_name = BTreeMap::new();
            let mut by_number = BTreeMap::new();
            for (i, f) in fields.iter().enumerate() {
                if f.name.is_empty() {
                    anyhow::bail!("struct {id:?}: empty field name");
                }
                if by_name.insert(f.name.clone(), i).is_some() {
                    anyhow::bail!("struct {id:?}: duplicate field name {:?}", f.name);
                }
                if by_number.insert(f.number, i).is_some() {
                    anyhow::bail!("struct {id:?}: duplicate field number {}", f.number);
                }
            }
            let def = RecordDef::Struct(Arc::new(StructDef {
                id: id.clone(),
                fields,
                by_name,
                by_number,
                default_cell: OnceLock::new(),
                descriptor_cell: OnceLock::new(),
            }));
            if records.insert(id.clone(), def).is_some() {
                anyhow::bail!("duplicate record id: {id:?}");
            }
        }

        for (id, mut variants) in self.enums {
            check_record_id(&id)?;
            variants.sort_by_key(|v| v.number);
            let mut by_name = BTreeMap::new();
            let mut by_number = BTreeMap::new();
            for (i, v) in variants.iter().enumerate() {
                if v.name.is_empty() || v.name == "?" {
                    anyhow::bail!("enum {id:?}: invalid variant name {:?}", v.name);
                }
                if v.number == 0 {
                    anyhow::bail!(
                        "enum {id:?}: variant {:?} uses wire number 0, reserved for UNKNOWN",
                        v.name
                    );
                }
                if by_name.insert(v.name.clone(), i).is_some() {
                    anyhow::bail!("enum {id:?}: duplicate variant name {:?}", v.name);
                }
                if by_number.insert(v.number, i).is_some() {
                    anyhow::bail!("enum {id:?}: duplicate variant number {}", v.number);
                }
            }
            let def = RecordDef::Enum(Arc::new(EnumDef {
                id: id.clone(),
                variants,
                by_name,
                by_number,
                descriptor_cell: OnceLock::new(),
            }));
            if records.insert(id.clone(), def).is_some() {
                anyhow::bail!("duplicate record id: {id:?}");
            }
        }

        let registry = SchemaRegistry { records };

        for record in registry.records() {
            match record {
                RecordDef::Struct(d) => {
                    for f in &d.fields {
                        registry.check_type(&f.ty).with_context(|| {
                            format!("struct {:?}, field {:?}", d.id, f.name)
                        })?;
                    }
                }
                RecordDef::Enum(d) => {
                    for v in &d.variants {
                        if let Some(ty) = &v.payload {
                            registry.check_type(ty).with_context(|| {
                                format!("enum {:?}, variant {:?}", d.id, v.name)
                            })?;
                        }
                    }
                }
            }
        }

        check_struct_cycles(&registry)?;

        Ok(registry)
    }
}

fn check_record_id(id: &str) -> Result<()> {
    let ok = match id.split_once(':') {
        Some((file, path)) => !file.is_empty() && !path.is_empty(),
        None => false,
    };
    if !ok {
        anyhow::bail!("invalid record id {id:?} (expected \"<schema-file>:<RecordPath>\")");
    }
    Ok(())
}

/// Rejects record cycles made only of direct struct-to-struct field edges.
/// Such a type's default value would be infinite. Arrays terminate recursion
/// with the empty sequence and enums with UNKNOWN, so edges through them are
/// not followed.
fn check_struct_cycles(registry: &SchemaRegistry) -> Result<()> {
    fn visit(
        registry: &SchemaRegistry,
        id: &str,
        in_progress: &mut BTreeSet<String>,
        done: &mut BTreeSet<String>,
    ) -> Result<()> {
        if done.contains(id) {
            return Ok(());
        }
        if !in_progress.insert(id.to_string()) {
            anyhow::bail!(
                "struct {id:?} is part of a record cycle with no array indirection; \
                 its default value would be infinite"
            );
        }
        if let RecordDef::Struct(d) = registry.record(id)? {
            for f in &d.fields {
                if let TypeDef::Record(target) = &f.ty {
                    if matches!(registry.record(target)?, RecordDef::Struct(_)) {
                        visit(registry, target, in_progress, done)?;
                    }
                }
            }
        }
        in_progress.remove(id);
        done.insert(id.to_string());
        Ok(())
    }

    let mut done = BTreeSet::new();
    for record in registry.records() {
        if let RecordDef::Struct(_) = record {
            let mut in_progress = BTreeSet::new();
            visit(registry, record.id(), &mut in_progress, &mut done)?;
        }
    }
    Ok(())
}
