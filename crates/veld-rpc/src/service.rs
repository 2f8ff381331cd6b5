use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::Result;
use serde_json::json;

use veld_codec::{Flavor, Serializer};
use veld_model::{MethodDef, SchemaRegistry, Value};

/// Opaque key/value text headers. Handlers read the inbound map and write
/// the outbound one; the dispatcher never interprets them.
pub type Headers = BTreeMap<String, String>;

/// Coarse classification of a dispatch outcome, with its HTTP mapping.
/// Decode failures and handler failures are kept distinct on purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
    Ok,
    BadRequest,
    MethodNotFound,
    ServerError,
}

impl ResponseKind {
    pub fn http_status(self) -> u16 {
        match self {
            ResponseKind::Ok => 200,
            ResponseKind::BadRequest => 400,
            ResponseKind::MethodNotFound => 404,
            ResponseKind::ServerError => 500,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ResponseKind::Ok => "ok",
            ResponseKind::BadRequest => "bad-request",
            ResponseKind::MethodNotFound => "method-not-found",
            ResponseKind::ServerError => "server-error",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RawResponse {
    pub data: String,
    pub content_type: &'static str,
    pub kind: ResponseKind,
}

impl RawResponse {
    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    fn ok_json(data: String) -> RawResponse {
        RawResponse {
            data,
            content_type: "application/json",
            kind: ResponseKind::Ok,
        }
    }

    fn error(kind: ResponseKind, message: String) -> RawResponse {
        RawResponse {
            data: message,
            content_type: "text/plain",
            kind,
        }
    }
}

type HandlerFn = dyn Fn(Value, &Headers, &mut Headers) -> Result<Value> + Send + Sync;

struct Entry {
    method: MethodDef,
    request: Serializer,
    response: Serializer,
    handler: Box<HandlerFn>,
}

/// Owned method routing table. Built once, then shared by reference with
/// the transport's request entry point.
pub struct Service {
    registry: Arc<SchemaRegistry>,
    entries: Vec<Entry>,
    by_name: BTreeMap<String, usize>,
    by_number: BTreeMap<u32, usize>,
}

impl Service {
    pub fn new(registry: Arc<SchemaRegistry>) -> Service {
        Service {
            registry,
            entries: Vec::new(),
            by_name: BTreeMap::new(),
            by_number: BTreeMap::new(),
        }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn methods(&self) -> impl Iterator<Item = &MethodDef> {
        self.entries.iter().map(|e| &e.method)
    }

    /// Registers a handler. The handler receives the decoded request value,
    /// the read-only request headers, and the writable response headers;
    /// an `Err` from it surfaces as a server-error result.
    pub fn add_method<F>(&mut self, method: MethodDef, handler: F) -> Result<()>
    where
        F: Fn(Value, &Headers, &mut Headers) -> Result<Value> + Send + Sync + 'static,
    {
        if self.by_name.contains_key(&method.name) {
            anyhow::bail!("method {:?} is already registered", method.name);
        }
        if self.by_number.contains_key(&method.number) {
            anyhow::bail!("method number {} is already registered", method.number);
        }
        let request = Serializer::new(self.registry.clone(), method.request.clone())?;
        let response = Serializer::new(self.registry.clone(), method.response.clone())?;
        let idx = self.entries.len();
        self.by_name.insert(method.name.clone(), idx);
        self.by_number.insert(method.number, idx);
        self.entries.push(Entry {
            method,
            request,
            response,
            handler: Box::new(handler),
        });
        Ok(())
    }

    /// One request, start to finish. Never panics and never returns an
    /// unclassified failure; every outcome is a `RawResponse`.
    pub fn handle_request(
        &self,
        body: &str,
        req_headers: &Headers,
        res_headers: &mut Headers,
    ) -> RawResponse {
        if body.trim() == "list" {
            return self.list_response();
        }

        let Some(envelope) = parse_envelope(body) else {
            return RawResponse::error(
                ResponseKind::BadRequest,
                "bad request: malformed request envelope".to_string(),
            );
        };

        let idx = match self.resolve(&envelope) {
            Some(idx) => idx,
            None => {
                return RawResponse::error(
                    ResponseKind::MethodNotFound,
                    format!("method not found: {:?}", envelope.name),
                );
            }
        };
        let entry = &self.entries[idx];

        let request = match entry.request.from_json_code(envelope.payload) {
            Ok(v) => v,
            Err(err) => {
                return RawResponse::error(
                    ResponseKind::BadRequest,
                    format!("bad request: {err:#}"),
                );
            }
        };

        let response = match (entry.handler)(request, req_headers, res_headers) {
            Ok(v) => v,
            Err(err) => {
                return RawResponse::error(ResponseKind::ServerError, format!("server error: {err:#}"));
            }
        };

        let flavor = if envelope.readable {
            Flavor::Readable
        } else {
            Flavor::Dense
        };
        match entry.response.to_json_code(&response, flavor) {
            Ok(data) => RawResponse::ok_json(data),
            Err(err) => {
                RawResponse::error(ResponseKind::ServerError, format!("server error: {err:#}"))
            }
        }
    }

    fn resolve(&self, envelope: &Envelope<'_>) -> Option<usize> {
        if !envelope.name.is_empty() {
            if let Some(&idx) = self.by_name.get(envelope.name) {
                return Some(idx);
            }
        }
        envelope
            .number
            .and_then(|n| self.by_number.get(&n))
            .copied()
    }

    /// Self-description: the reserved body `list` yields every registered
    /// method with the type descriptors of its request and response.
    fn list_response(&self) -> RawResponse {
        let mut methods = Vec::with_capacity(self.entries.len());
        for &idx in self.by_name.values() {
            let entry = &self.entries[idx];
            let described = self.describe(&entry.method);
            match described {
                Ok(v) => methods.push(v),
                Err(err) => {
                    return RawResponse::error(
                        ResponseKind::ServerError,
                        format!("server error: {err:#}"),
                    );
                }
            }
        }
        let body = json!({ "methods": methods });
        match serde_json::to_string_pretty(&body) {
            Ok(data) => RawResponse::ok_json(data),
            Err(err) => {
                RawResponse::error(ResponseKind::ServerError, format!("server error: {err:#}"))
            }
        }
    }

    fn describe(&self, method: &MethodDef) -> Result<serde_json::Value> {
        let request = veld_reflect::type_descriptor(&self.registry, &method.request)?;
        let response = veld_reflect::type_descriptor(&self.registry, &method.response)?;
        Ok(json!({
            "method": method.name,
            "number": method.number,
            "request": veld_reflect::descriptor_to_json(&request)?,
            "response": veld_reflect::descriptor_to_json(&response)?,
        }))
    }
}

pub(crate) struct Envelope<'a> {
    pub(crate) name: &'a str,
    pub(crate) number: Option<u32>,
    pub(crate) readable: bool,
    pub(crate) payload: &'a str,
}

/// `"<method>:<number>:<format>:<payload>"`. The format token selects the
/// response flavor; the payload flavor is sniffed by the codec. The number
/// may be empty when the name is given, and vice versa.
pub(crate) fn parse_envelope(body: &str) -> Option<Envelope<'_>> {
    let mut parts = body.splitn(4, ':');
    let name = parts.next()?;
    let number = parts.next()?;
    let format = parts.next()?;
    let payload = parts.next()?;

    let number = if number.is_empty() {
        None
    } else {
        Some(number.parse().ok()?)
    };
    let readable = match format {
        "" => false,
        "readable" => true,
        _ => return None,
    };
    if name.is_empty() && number.is_none() {
        return None;
    }
    Some(Envelope {
        name,
        number,
        readable,
        payload,
    })
}
