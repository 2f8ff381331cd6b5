//! Method dispatch over the codec layer.
//!
//! A `Service` is an owned routing table: method name/number to handler.
//! `handle_request` parses the request envelope, decodes the payload,
//! invokes the handler with the header side-channel, and returns a
//! classified result the transport collaborator maps onto HTTP. The
//! dispatcher performs no I/O and imposes no concurrency control of its
//! own.

mod client;
mod service;

pub use client::{decode_response, encode_request};
pub use service::{Headers, RawResponse, ResponseKind, Service};
