//! Transport-free client framing: an HTTP client collaborator only needs to
//! move the strings produced and consumed here.

use std::sync::Arc;

use anyhow::{Context, Result};

use veld_codec::{Flavor, Serializer};
use veld_model::{MethodDef, SchemaRegistry, Value};

/// Frames a request value into the envelope `handle_request` expects.
pub fn encode_request(
    registry: &Arc<SchemaRegistry>,
    method: &MethodDef,
    request: &Value,
    flavor: Flavor,
) -> Result<String> {
    let serializer = Serializer::new(registry.clone(), method.request.clone())?;
    let payload = serializer.to_json_code(request, flavor)?;
    let payload = match flavor {
        // The envelope is a single line; re-compact the pretty form.
        Flavor::Readable => {
            let json: serde_json::Value =
                serde_json::from_str(&payload).context("reparse request payload")?;
            serde_json::to_string(&json).context("compact request payload")?
        }
        Flavor::Dense => payload,
    };
    let format = match flavor {
        Flavor::Dense => "",
        Flavor::Readable => "readable",
    };
    Ok(format!(
        "{}:{}:{}:{}",
        method.name, method.number, format, payload
    ))
}

/// Decodes a successful response body back into a typed value.
pub fn decode_response(
    registry: &Arc<SchemaRegistry>,
    method: &MethodDef,
    body: &str,
) -> Result<Value> {
    let serializer = Serializer::new(registry.clone(), method.response.clone())?;
    serializer
        .from_json_code(body)
        .with_context(|| format!("decode {:?} response", method.name))
}
