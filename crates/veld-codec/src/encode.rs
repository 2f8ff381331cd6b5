use base64::Engine as _;
use serde_json::{json, Map, Value as JsonValue};

use veld_model::{ArrayValue, EnumValue, StructValue, Value};

use crate::Flavor;

/// Largest integer magnitude a JavaScript peer can hold exactly; larger
/// 64-bit values travel as decimal strings.
const MAX_SAFE_JSON_INT: i64 = 9_007_199_254_740_991;

pub(crate) fn encode_value(value: &Value, flavor: Flavor) -> JsonValue {
    match value {
        Value::Bool(v) => json!(v),
        Value::Int32(v) => json!(v),
        Value::Int64(v) => encode_i64(*v),
        Value::Uint64(v) => encode_u64(*v),
        Value::Float32(v) => encode_float(f64::from(*v)),
        Value::Float64(v) => encode_float(*v),
        Value::Timestamp(v) => match flavor {
            Flavor::Dense => json!(v.unix_millis()),
            Flavor::Readable => json!({
                "unix_millis": v.unix_millis(),
                "formatted": v.to_rfc3339(),
            }),
        },
        Value::String(v) => json!(&**v),
        Value::Bytes(v) => json!(base64::engine::general_purpose::STANDARD.encode(&**v)),
        Value::Array(v) => encode_array(v, flavor),
        Value::Struct(v) => match flavor {
            Flavor::Dense => encode_struct_dense(v),
            Flavor::Readable => encode_struct_readable(v),
        },
        Value::Enum(v) => encode_enum(v, flavor),
    }
}

fn encode_i64(v: i64) -> JsonValue {
    if v > MAX_SAFE_JSON_INT || v < -MAX_SAFE_JSON_INT {
        json!(v.to_string())
    } else {
        json!(v)
    }
}

fn encode_u64(v: u64) -> JsonValue {
    if v > MAX_SAFE_JSON_INT as u64 {
        json!(v.to_string())
    } else {
        json!(v)
    }
}

fn encode_float(v: f64) -> JsonValue {
    if v.is_nan() {
        json!("NaN")
    } else if v == f64::INFINITY {
        json!("Infinity")
    } else if v == f64::NEG_INFINITY {
        json!("-Infinity")
    } else {
        json!(v)
    }
}

fn encode_array(v: &ArrayValue, flavor: Flavor) -> JsonValue {
    JsonValue::Array(v.iter().map(|item| encode_value(item, flavor)).collect())
}

/// Positional form: slot index == wire number, up to the highest
/// non-default field. Wire numbers with no current field encode as `0`
/// filler; trailing defaults are dropped entirely.
fn encode_struct_dense(v: &StructValue) -> JsonValue {
    let def = v.def();
    let mut highest: Option<u32> = None;
    for (fd, value) in def.fields.iter().zip(v.fields()) {
        if !value.is_default() {
            highest = Some(fd.number);
        }
    }
    let Some(highest) = highest else {
        return JsonValue::Array(Vec::new());
    };
    let mut slots = vec![json!(0); highest as usize + 1];
    for (fd, value) in def.fields.iter().zip(v.fields()) {
        if fd.number <= highest {
            slots[fd.number as usize] = encode_value(value, Flavor::Dense);
        }
    }
    JsonValue::Array(slots)
}

fn encode_struct_readable(v: &StructValue) -> JsonValue {
    let def = v.def();
    let mut map = Map::new();
    for (fd, value) in def.fields.iter().zip(v.fields()) {
        if !value.is_default() {
            map.insert(fd.name.clone(), encode_value(value, Flavor::Readable));
        }
    }
    JsonValue::Object(map)
}

fn encode_enum(v: &EnumValue, flavor: Flavor) -> JsonValue {
    match flavor {
        Flavor::Dense => match v.payload() {
            None => json!(v.number()),
            Some(payload) => json!([v.number(), encode_value(payload, Flavor::Dense)]),
        },
        Flavor::Readable => match v.payload() {
            None => json!(v.kind()),
            Some(payload) => {
                let mut map = Map::new();
                map.insert(
                    v.kind().to_string(),
                    encode_value(payload, Flavor::Readable),
                );
                JsonValue::Object(map)
            }
        },
    }
}
