//! Loader for the JSON schema-set document the external schema compiler
//! emits: record definitions plus method declarations, validated into a
//! `SchemaRegistry` and a method list.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use veld_contracts::VELD_SCHEMA_SET_SCHEMA_VERSION;
use veld_model::{
    ArrayDef, FieldDef, MethodDef, Primitive, SchemaRegistry, TypeDef, VariantDef,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaSetFile {
    schema_version: String,
    #[serde(default)]
    records: Vec<RecordEntry>,
    #[serde(default)]
    methods: Vec<MethodEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RecordEntry {
    kind: String,
    id: String,
    #[serde(default)]
    fields: Vec<FieldEntry>,
    #[serde(default)]
    variants: Vec<VariantEntry>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldEntry {
    name: String,
    number: u32,
    #[serde(rename = "type")]
    ty: JsonValue,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct VariantEntry {
    name: String,
    number: u32,
    #[serde(default)]
    payload: Option<JsonValue>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct MethodEntry {
    name: String,
    number: u32,
    request: JsonValue,
    response: JsonValue,
}

/// A parsed, validated schema set.
#[derive(Debug)]
pub struct LoadedSchema {
    pub registry: Arc<SchemaRegistry>,
    pub methods: Vec<MethodDef>,
}

pub fn load_schema_set(code: &str) -> Result<LoadedSchema> {
    let file: SchemaSetFile =
        serde_json::from_str(code).context("parse schema-set document")?;
    check_schema_version(&file.schema_version)?;

    let mut builder = SchemaRegistry::builder();
    for record in &file.records {
        match record.kind.as_str() {
            "struct" => {
                if !record.variants.is_empty() {
                    anyhow::bail!("struct {:?} declares variants", record.id);
                }
                let mut fields = Vec::with_capacity(record.fields.len());
                for f in &record.fields {
                    let ty = parse_type_expr(&f.ty).with_context(|| {
                        format!("struct {:?}, field {:?}", record.id, f.name)
                    })?;
                    fields.push(FieldDef::new(&f.name, f.number, ty));
                }
                builder = builder.struct_def(&record.id, fields);
            }
            "enum" => {
                if !record.fields.is_empty() {
                    anyhow::bail!("enum {:?} declares fields", record.id);
                }
                let mut variants = Vec::with_capacity(record.variants.len());
                for v in &record.variants {
                    let variant = match &v.payload {
                        None => VariantDef::constant(&v.name, v.number),
                        Some(payload) => {
                            let ty = parse_type_expr(payload).with_context(|| {
                                format!("enum {:?}, variant {:?}", record.id, v.name)
                            })?;
                            VariantDef::data(&v.name, v.number, ty)
                        }
                    };
                    variants.push(variant);
                }
                builder = builder.enum_def(&record.id, variants);
            }
            other => anyhow::bail!(
                "record {:?}: unknown kind {other:?} (expected \"struct\" or \"enum\")",
                record.id
            ),
        }
    }

    let registry = Arc::new(builder.build()?);

    let mut methods = Vec::with_capacity(file.methods.len());
    for m in &file.methods {
        let request = parse_type_expr(&m.request)
            .with_context(|| format!("method {:?} request", m.name))?;
        let response = parse_type_expr(&m.response)
            .with_context(|| format!("method {:?} response", m.name))?;
        registry
            .check_type(&request)
            .with_context(|| format!("method {:?} request", m.name))?;
        registry
            .check_type(&response)
            .with_context(|| format!("method {:?} response", m.name))?;
        if m.name.is_empty() {
            anyhow::bail!("method with empty name");
        }
        if methods.iter().any(|other: &MethodDef| other.name == m.name) {
            anyhow::bail!("duplicate method name {:?}", m.name);
        }
        if methods.iter().any(|other: &MethodDef| other.number == m.number) {
            anyhow::bail!("duplicate method number {}", m.number);
        }
        methods.push(MethodDef {
            name: m.name.clone(),
            number: m.number,
            request,
            response,
        });
    }

    Ok(LoadedSchema { registry, methods })
}

fn check_schema_version(s: &str) -> Result<()> {
    if s.trim() != VELD_SCHEMA_SET_SCHEMA_VERSION {
        anyhow::bail!(
            "unsupported schema_version: expected {VELD_SCHEMA_SET_SCHEMA_VERSION:?} got {s:?}"
        );
    }
    Ok(())
}

/// A type expression is a primitive name string, `{"array": {"item": T}}`
/// with an optional `"key"`, or `{"record": "<id>"}`.
fn parse_type_expr(json: &JsonValue) -> Result<TypeDef> {
    match json {
        JsonValue::String(name) => {
            let p = Primitive::parse(name)
                .with_context(|| format!("unknown primitive type {name:?}"))?;
            Ok(TypeDef::Primitive(p))
        }
        JsonValue::Object(map) => {
            if map.len() != 1 {
                anyhow::bail!("type expression must have exactly one key, got {json}");
            }
            let (tag, body) = map.iter().next().context("empty type expression")?;
            match tag.as_str() {
                "record" => {
                    let id = body
                        .as_str()
                        .with_context(|| format!("record reference must be a string, got {body}"))?;
                    Ok(TypeDef::Record(id.to_string()))
                }
                "array" => {
                    let JsonValue::Object(body) = body else {
                        anyhow::bail!("array type must be an object, got {body}");
                    };
                    for key in body.keys() {
                        if key != "item" && key != "key" {
                            anyhow::bail!("unknown array type key {key:?}");
                        }
                    }
                    let item = body.get("item").context("array type missing \"item\"")?;
                    let key_field = match body.get("key") {
                        None => None,
                        Some(k) => Some(
                            k.as_str()
                                .with_context(|| format!("array key must be a string, got {k}"))?
                                .to_string(),
                        ),
                    };
                    Ok(TypeDef::Array(ArrayDef {
                        item: Box::new(parse_type_expr(item)?),
                        key_field,
                    }))
                }
                other => anyhow::bail!("unknown type expression tag {other:?}"),
            }
        }
        _ => anyhow::bail!("invalid type expression: {json}"),
    }
}
