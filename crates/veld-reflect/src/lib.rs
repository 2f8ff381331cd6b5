//! Self-describing type descriptors.
//!
//! A descriptor is a record-model value over a built-in meta schema: a
//! `type` signature for the root plus a `records` list with every
//! struct/enum the root transitively references, each exactly once in
//! id-sorted order and referenced by id elsewhere, which keeps recursive
//! schemas finite. Being an ordinary record value, a descriptor serializes
//! through the regular codec.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use serde_json::Value as JsonValue;

use veld_codec::{Flavor, Serializer};
use veld_contracts::{
    VELD_REFLECT_ARRAY_TYPE_ID, VELD_REFLECT_FIELD_ID, VELD_REFLECT_RECORD_ID,
    VELD_REFLECT_RECORD_KIND_ID, VELD_REFLECT_TYPE_DESCRIPTOR_ID, VELD_REFLECT_TYPE_SIGNATURE_ID,
};
use veld_model::{
    ArrayDef, FieldDef, Primitive, RecordDef, SchemaRegistry, Slot, TypeDef, Value, VariantDef,
};

static META: Lazy<Arc<SchemaRegistry>> =
    Lazy::new(|| Arc::new(build_meta_registry().expect("reflection meta schema is valid")));

/// The registry describing descriptors themselves.
pub fn meta_registry() -> &'static Arc<SchemaRegistry> {
    &META
}

fn build_meta_registry() -> Result<SchemaRegistry> {
    let signature = || TypeDef::Record(VELD_REFLECT_TYPE_SIGNATURE_ID.to_string());
    SchemaRegistry::builder()
        .enum_def(
            VELD_REFLECT_TYPE_SIGNATURE_ID,
            vec![
                VariantDef::data("primitive", 1, TypeDef::Primitive(Primitive::String)),
                VariantDef::data(
                    "array",
                    2,
                    TypeDef::Record(VELD_REFLECT_ARRAY_TYPE_ID.to_string()),
                ),
                VariantDef::data("record", 3, TypeDef::Primitive(Primitive::String)),
            ],
        )
        .struct_def(
            VELD_REFLECT_ARRAY_TYPE_ID,
            vec![
                FieldDef::new("item", 0, signature()),
                FieldDef::new("key", 1, TypeDef::Primitive(Primitive::String)),
            ],
        )
        .enum_def(
            VELD_REFLECT_RECORD_KIND_ID,
            vec![
                VariantDef::constant("struct", 1),
                VariantDef::constant("enum", 2),
            ],
        )
        .struct_def(
            VELD_REFLECT_FIELD_ID,
            vec![
                FieldDef::new("name", 0, TypeDef::Primitive(Primitive::String)),
                FieldDef::new("type", 1, signature()),
                FieldDef::new("number", 2, TypeDef::Primitive(Primitive::Int64)),
            ],
        )
        .struct_def(
            VELD_REFLECT_RECORD_ID,
            vec![
                FieldDef::new(
                    "kind",
                    0,
                    TypeDef::Record(VELD_REFLECT_RECORD_KIND_ID.to_string()),
                ),
                FieldDef::new("id", 1, TypeDef::Primitive(Primitive::String)),
                FieldDef::new(
                    "fields",
                    2,
                    TypeDef::Array(ArrayDef {
                        item: Box::new(TypeDef::Record(VELD_REFLECT_FIELD_ID.to_string())),
                        key_field: Some("name".to_string()),
                    }),
                ),
            ],
        )
        .struct_def(
            VELD_REFLECT_TYPE_DESCRIPTOR_ID,
            vec![
                FieldDef::new("type", 0, signature()),
                FieldDef::new(
                    "records",
                    1,
                    TypeDef::Array(ArrayDef {
                        item: Box::new(TypeDef::Record(VELD_REFLECT_RECORD_ID.to_string())),
                        key_field: Some("id".to_string()),
                    }),
                ),
            ],
        )
        .build()
}

/// The descriptor for a type of `registry`. Descriptors of record types are
/// computed once per definition and cached; later calls share the built
/// value.
pub fn type_descriptor(registry: &SchemaRegistry, ty: &TypeDef) -> Result<Value> {
    if let TypeDef::Record(id) = ty {
        let cell = match registry.record(id)? {
            RecordDef::Struct(d) => d.descriptor_cache(),
            RecordDef::Enum(d) => d.descriptor_cache(),
        };
        if let Some(v) = cell.get() {
            return Ok(v.clone());
        }
        let built = build_descriptor(registry, ty)?;
        return Ok(cell.get_or_init(|| built).clone());
    }
    build_descriptor(registry, ty)
}

fn build_descriptor(registry: &SchemaRegistry, root: &TypeDef) -> Result<Value> {
    let meta = meta_registry().as_ref();

    let mut seen = BTreeSet::new();
    collect_records(registry, root, &mut seen)?;

    let mut records: Vec<Slot> = Vec::with_capacity(seen.len());
    for id in &seen {
        let record = registry.record(id)?;
        let (kind_name, field_entries) = match record {
            RecordDef::Struct(d) => {
                let mut entries: Vec<Slot> = Vec::with_capacity(d.fields.len());
                for f in &d.fields {
                    entries.push(field_entry(meta, &f.name, Some(&f.ty), f.number)?);
                }
                ("struct", entries)
            }
            RecordDef::Enum(d) => {
                let mut entries: Vec<Slot> = Vec::with_capacity(d.variants.len());
                for v in &d.variants {
                    entries.push(field_entry(meta, &v.name, v.payload.as_ref(), v.number)?);
                }
                ("enum", entries)
            }
        };
        let entry = meta.new_struct(
            VELD_REFLECT_RECORD_ID,
            vec![
                ("kind", meta.enum_constant(VELD_REFLECT_RECORD_KIND_ID, kind_name)?.into()),
                ("id", id.as_str().into()),
                ("fields", Value::array(field_entries).into()),
            ],
        )?;
        records.push(entry.into());
    }

    let descriptor = meta.new_struct(
        VELD_REFLECT_TYPE_DESCRIPTOR_ID,
        vec![
            ("type", signature_value(meta, root)?.into()),
            ("records", Value::array(records).into()),
        ],
    )?;
    Ok(Value::Struct(descriptor))
}

/// One entry of a record's field list. Enum variants reuse the same shape;
/// constant variants carry no type signature, leaving the field at its
/// default (the UNKNOWN signature).
fn field_entry(
    meta: &SchemaRegistry,
    name: &str,
    ty: Option<&TypeDef>,
    number: u32,
) -> Result<Slot> {
    let mut fields: Vec<(&str, Slot)> =
        vec![("name", name.into()), ("number", i64::from(number).into())];
    if let Some(ty) = ty {
        fields.push(("type", signature_value(meta, ty)?.into()));
    }
    Ok(meta.new_struct(VELD_REFLECT_FIELD_ID, fields)?.into())
}

fn signature_value(meta: &SchemaRegistry, ty: &TypeDef) -> Result<Value> {
    let sig = match ty {
        TypeDef::Primitive(p) => {
            meta.enum_wrap(VELD_REFLECT_TYPE_SIGNATURE_ID, "primitive", p.as_str().into())?
        }
        TypeDef::Array(ad) => {
            let item = signature_value(meta, &ad.item)?;
            let key = ad.key_field.as_deref().unwrap_or("");
            let array_type = meta.new_struct(
                VELD_REFLECT_ARRAY_TYPE_ID,
                vec![("item", item.into()), ("key", key.into())],
            )?;
            meta.enum_wrap(VELD_REFLECT_TYPE_SIGNATURE_ID, "array", array_type.into())?
        }
        TypeDef::Record(id) => {
            meta.enum_wrap(VELD_REFLECT_TYPE_SIGNATURE_ID, "record", id.as_str().into())?
        }
    };
    Ok(Value::Enum(sig))
}

fn collect_records(
    registry: &SchemaRegistry,
    ty: &TypeDef,
    seen: &mut BTreeSet<String>,
) -> Result<()> {
    match ty {
        TypeDef::Primitive(_) => Ok(()),
        TypeDef::Array(ad) => collect_records(registry, &ad.item, seen),
        TypeDef::Record(id) => {
            if !seen.insert(id.clone()) {
                return Ok(());
            }
            match registry.record(id)? {
                RecordDef::Struct(d) => {
                    for f in &d.fields {
                        collect_records(registry, &f.ty, seen)?;
                    }
                }
                RecordDef::Enum(d) => {
                    for v in &d.variants {
                        if let Some(payload) = &v.payload {
                            collect_records(registry, payload, seen)?;
                        }
                    }
                }
            }
            Ok(())
        }
    }
}

/// Codec bound to the descriptor type itself.
pub fn descriptor_serializer() -> Result<Serializer> {
    Serializer::for_record(meta_registry(), VELD_REFLECT_TYPE_DESCRIPTOR_ID)
}

pub fn descriptor_to_json(descriptor: &Value) -> Result<JsonValue> {
    Ok(descriptor_serializer()?.to_json(descriptor, Flavor::Readable))
}

pub fn descriptor_as_json_code(descriptor: &Value) -> Result<String> {
    descriptor_serializer()?.to_json_code(descriptor, Flavor::Readable)
}

pub fn descriptor_from_json_code(code: &str) -> Result<Value> {
    descriptor_serializer()?
        .from_json_code(code)
        .context("decode type descriptor")
}

/// Descriptor equality is defined over the JSON-normalized form.
pub fn descriptors_equal(a: &Value, b: &Value) -> Result<bool> {
    Ok(descriptor_to_json(a)? == descriptor_to_json(b)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meta_registry_builds_and_contains_the_descriptor_root() {
        let meta = meta_registry();
        meta.struct_def(VELD_REFLECT_TYPE_DESCRIPTOR_ID).unwrap();
        meta.enum_def(VELD_REFLECT_TYPE_SIGNATURE_ID).unwrap();
    }
}
