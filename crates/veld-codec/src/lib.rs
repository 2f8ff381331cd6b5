//! Dense and readable JSON codecs over the record model.
//!
//! The dense flavor is positional (wire numbers only) and survives field
//! renames; the readable flavor keys by field name for human inspection.
//! Decoding sniffs the flavor from the JSON shape, so both decode through
//! one entry point, and schema evolution is tolerated: short dense arrays
//! fill with defaults, unknown fields are ignored, unknown enum variants
//! degrade to UNKNOWN.

mod decode;
mod encode;

use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::Value as JsonValue;

use veld_model::{SchemaRegistry, TypeDef, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    Dense,
    Readable,
}

/// Codec bound to one declared type. Cheap to construct and clone.
#[derive(Debug, Clone)]
pub struct Serializer {
    registry: Arc<SchemaRegistry>,
    ty: TypeDef,
}

impl Serializer {
    pub fn new(registry: Arc<SchemaRegistry>, ty: TypeDef) -> Result<Serializer> {
        registry.check_type(&ty)?;
        Ok(Serializer { registry, ty })
    }

    pub fn for_record(registry: &Arc<SchemaRegistry>, id: &str) -> Result<Serializer> {
        registry.record(id)?;
        Ok(Serializer {
            registry: registry.clone(),
            ty: TypeDef::Record(id.to_string()),
        })
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn type_def(&self) -> &TypeDef {
        &self.ty
    }

    pub fn to_json(&self, value: &Value, flavor: Flavor) -> JsonValue {
        encode::encode_value(value, flavor)
    }

    pub fn to_json_code(&self, value: &Value, flavor: Flavor) -> Result<String> {
        let json = self.to_json(value, flavor);
        let code = match flavor {
            Flavor::Dense => serde_json::to_string(&json),
            Flavor::Readable => serde_json::to_string_pretty(&json),
        };
        code.context("serialize JSON text")
    }

    pub fn from_json(&self, json: &JsonValue) -> Result<Value> {
        decode::decode_value(&self.registry, &self.ty, json)
    }

    pub fn from_json_code(&self, code: &str) -> Result<Value> {
        let json: JsonValue = serde_json::from_str(code).context("parse JSON text")?;
        self.from_json(&json)
    }
}
