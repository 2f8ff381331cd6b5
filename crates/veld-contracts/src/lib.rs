//! Shared, version-pinned protocol identifiers.
//!
//! These constants are the single source of truth for schema/version strings
//! that appear in machine-readable I/O.

pub const VELD_SCHEMA_SET_SCHEMA_VERSION: &str = "veld.schema-set@0.1.0";

pub const VELD_REFLECT_TYPE_DESCRIPTOR_ID: &str = "veld.reflect:TypeDescriptor";
pub const VELD_REFLECT_TYPE_SIGNATURE_ID: &str = "veld.reflect:TypeSignature";
pub const VELD_REFLECT_ARRAY_TYPE_ID: &str = "veld.reflect:ArrayType";
pub const VELD_REFLECT_RECORD_ID: &str = "veld.reflect:Record";
pub const VELD_REFLECT_RECORD_KIND_ID: &str = "veld.reflect:RecordKind";
pub const VELD_REFLECT_FIELD_ID: &str = "veld.reflect:Field";
