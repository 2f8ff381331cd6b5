use std::sync::Arc;

use anyhow::{Context, Result};
use base64::Engine as _;
use serde_json::Value as JsonValue;

use veld_model::{
    EnumDef, EnumValue, Primitive, RecordDef, SchemaRegistry, Slot, StructDef, StructValue,
    Timestamp, TypeDef, Value,
};

/// Type-driven decode of either wire flavor. `null` always means "the
/// default value"; peers may also emit the integer `0` as a default filler
/// for removed fields, so `0` is accepted as a default marker wherever it
/// is not already a legal value of the type.
pub(crate) fn decode_value(
    registry: &SchemaRegistry,
    ty: &TypeDef,
    json: &JsonValue,
) -> Result<Value> {
    if json.is_null() {
        return registry.default_value(ty);
    }
    match ty {
        TypeDef::Primitive(p) => decode_primitive(registry, *p, ty, json),
        TypeDef::Array(ad) => {
            if is_zero_marker(json) {
                return registry.default_value(ty);
            }
            let JsonValue::Array(items) = json else {
                anyhow::bail!("expected JSON array, got {json}");
            };
            let mut slots = Vec::with_capacity(items.len());
            for (i, item) in items.iter().enumerate() {
                let decoded = decode_value(registry, &ad.item, item)
                    .with_context(|| format!("array item {i}"))?;
                slots.push(Slot::Frozen(decoded));
            }
            registry.new_array(ad, slots)
        }
        TypeDef::Record(id) => {
            if is_zero_marker(json) {
                return registry.default_value(ty);
            }
            decode_record(registry, id, json)
        }
    }
}

fn decode_record(registry: &SchemaRegistry, id: &str, json: &JsonValue) -> Result<Value> {
    match registry.record(id)? {
        RecordDef::Struct(def) => {
            let def = def.clone();
            Ok(Value::Struct(decode_struct(registry, &def, json)?))
        }
        RecordDef::Enum(def) => {
            let def = def.clone();
            Ok(Value::Enum(decode_enum(registry, &def, json)?))
        }
    }
}

fn is_zero_marker(json: &JsonValue) -> bool {
    json.as_i64() == Some(0)
}

fn decode_primitive(
    registry: &SchemaRegistry,
    p: Primitive,
    ty: &TypeDef,
    json: &JsonValue,
) -> Result<Value> {
    match p {
        Primitive::Bool => match json {
            JsonValue::Bool(v) => Ok(Value::Bool(*v)),
            // Peers on the dense flavor may emit 0/1.
            JsonValue::Number(_) => match json.as_i64() {
                Some(0) => Ok(Value::Bool(false)),
                Some(1) => Ok(Value::Bool(true)),
                _ => anyhow::bail!("expected bool, got {json}"),
            },
            _ => anyhow::bail!("expected bool, got {json}"),
        },
        Primitive::Int32 => {
            let v = json
                .as_i64()
                .with_context(|| format!("expected int32, got {json}"))?;
            let v = i32::try_from(v).with_context(|| format!("int32 out of range: {v}"))?;
            Ok(Value::Int32(v))
        }
        Primitive::Int64 => match json {
            JsonValue::Number(_) => json
                .as_i64()
                .map(Value::Int64)
                .with_context(|| format!("expected int64, got {json}")),
            JsonValue::String(s) => {
                let v: i64 = s
                    .parse()
                    .with_context(|| format!("expected int64, got {s:?}"))?;
                Ok(Value::Int64(v))
            }
            _ => anyhow::bail!("expected int64, got {json}"),
        },
        Primitive::Uint64 => match json {
            JsonValue::Number(_) => json
                .as_u64()
                .map(Value::Uint64)
                .with_context(|| format!("expected uint64, got {json}")),
            JsonValue::String(s) => {
                let v: u64 = s
                    .parse()
                    .with_context(|| format!("expected uint64, got {s:?}"))?;
                Ok(Value::Uint64(v))
            }
            _ => anyhow::bail!("expected uint64, got {json}"),
        },
        Primitive::Float32 => Ok(Value::Float32(decode_f64(json)? as f32)),
        Primitive::Float64 => Ok(Value::Float64(decode_f64(json)?)),
        Primitive::Timestamp => match json {
            JsonValue::Number(_) => json
                .as_i64()
                .map(|ms| Value::Timestamp(Timestamp::from_unix_millis(ms)))
                .with_context(|| format!("expected unix milliseconds, got {json}")),
            JsonValue::Object(map) => {
                let ms = map
                    .get("unix_millis")
                    .and_then(JsonValue::as_i64)
                    .with_context(|| format!("expected \"unix_millis\" in {json}"))?;
                Ok(Value::Timestamp(Timestamp::from_unix_millis(ms)))
            }
            _ => anyhow::bail!("expected timestamp, got {json}"),
        },
        Primitive::String => match json {
            JsonValue::String(s) => Ok(Value::from(s.as_str())),
            _ if is_zero_marker(json) => registry.default_value(ty),
            _ => anyhow::bail!("expected string, got {json}"),
        },
        Primitive::Bytes => match json {
            JsonValue::String(s) => {
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(s)
                    .with_context(|| format!("invalid base64: {s:?}"))?;
                Ok(Value::from(bytes))
            }
            _ if is_zero_marker(json) => registry.default_value(ty),
            _ => anyhow::bail!("expected base64 string, got {json}"),
        },
    }
}

fn decode_f64(json: &JsonValue) -> Result<f64> {
    match json {
        JsonValue::Number(_) => json
            .as_f64()
            .with_context(|| format!("expected float, got {json}")),
        JsonValue::String(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            _ => anyhow::bail!("expected float, got {s:?}"),
        },
        _ => anyhow::bail!("expected float, got {json}"),
    }
}

/// Structs accept both flavors: a JSON array decodes positionally (slot
/// index == wire number), an object decodes by field name. Wire numbers
/// and names the schema does not know are ignored; fields the payload
/// does not carry default.
fn decode_struct(
    registry: &SchemaRegistry,
    def: &Arc<StructDef>,
    json: &JsonValue,
) -> Result<StructValue> {
    let mut pairs: Vec<(&str, Slot)> = Vec::new();
    match json {
        JsonValue::Array(slots) => {
            for fd in &def.fields {
                if let Some(slot) = slots.get(fd.number as usize) {
                    let decoded = decode_value(registry, &fd.ty, slot)
                        .with_context(|| format!("struct {:?}, field {:?}", def.id, fd.name))?;
                    pairs.push((fd.name.as_str(), Slot::Frozen(decoded)));
                }
            }
        }
        JsonValue::Object(map) => {
            for fd in &def.fields {
                if let Some(v) = map.get(&fd.name) {
                    let decoded = decode_value(registry, &fd.ty, v)
                        .with_context(|| format!("struct {:?}, field {:?}", def.id, fd.name))?;
                    pairs.push((fd.name.as_str(), Slot::Frozen(decoded)));
                }
            }
        }
        _ => anyhow::bail!("expected array or object for struct {:?}, got {json}", def.id),
    }
    StructValue::partial(registry, def, pairs)
}

/// Enums accept a bare wire number or name (constants), a two-element
/// `[number, payload]` array or a single-key object (data variants).
/// Unrecognized numbers and names degrade to UNKNOWN; a recognized variant
/// with the wrong shape is malformed.
fn decode_enum(
    registry: &SchemaRegistry,
    def: &Arc<EnumDef>,
    json: &JsonValue,
) -> Result<EnumValue> {
    match json {
        JsonValue::Number(_) => {
            let Some(number) = json.as_u64().and_then(|n| u32::try_from(n).ok()) else {
                // Out-of-range or negative variant numbers are unrecognized.
                return Ok(EnumValue::unknown(def));
            };
            if number == 0 {
                return Ok(EnumValue::unknown(def));
            }
            match def.variant_by_number(number) {
                Some(v) if v.payload.is_none() => EnumValue::constant(def, &v.name),
                Some(v) => anyhow::bail!(
                    "enum {:?}: data variant {:?} encoded without payload",
                    def.id,
                    v.name
                ),
                None => Ok(EnumValue::unknown(def)),
            }
        }
        JsonValue::Array(parts) => {
            let [number, payload] = parts.as_slice() else {
                anyhow::bail!("expected [number, payload] for enum {:?}, got {json}", def.id);
            };
            let Some(number) = number.as_u64().and_then(|n| u32::try_from(n).ok()) else {
                anyhow::bail!("expected variant number for enum {:?}, got {number}", def.id);
            };
            match def.variant_by_number(number) {
                Some(v) => {
                    let name = v.name.clone();
                    let Some(payload_ty) = v.payload.clone() else {
                        anyhow::bail!(
                            "enum {:?}: constant variant {:?} encoded with payload",
                            def.id,
                            name
                        );
                    };
                    let decoded = decode_value(registry, &payload_ty, payload)
                        .with_context(|| format!("enum {:?}, variant {:?}", def.id, name))?;
                    EnumValue::wrap(registry, def, &name, Slot::Frozen(decoded))
                }
                // Forward compatibility: drop the payload of a variant this
                // schema does not know.
                None => Ok(EnumValue::unknown(def)),
            }
        }
        JsonValue::String(name) => {
            if name == "?" {
                return Ok(EnumValue::unknown(def));
            }
            match def.variant(name) {
                Some(v) if v.payload.is_none() => EnumValue::constant(def, name),
                Some(_) => anyhow::bail!(
                    "enum {:?}: data variant {name:?} encoded without payload",
                    def.id
                ),
                None => Ok(EnumValue::unknown(def)),
            }
        }
        JsonValue::Object(map) => {
            if map.len() != 1 {
                anyhow::bail!(
                    "expected single-key object for enum {:?}, got {json}",
                    def.id
                );
            }
            let (name, payload) = map.iter().next().context("empty enum object")?;
            match def.variant(name) {
                Some(v) => {
                    let Some(payload_ty) = v.payload.clone() else {
                        anyhow::bail!(
                            "enum {:?}: constant variant {name:?} encoded with payload",
                            def.id
                        );
                    };
                    let decoded = decode_value(registry, &payload_ty, payload)
                        .with_context(|| format!("enum {:?}, variant {name:?}", def.id))?;
                    EnumValue::wrap(registry, def, name, Slot::Frozen(decoded))
                }
                None => Ok(EnumValue::unknown(def)),
            }
        }
        _ => anyhow::bail!("expected enum encoding for {:?}, got {json}", def.id),
    }
}
