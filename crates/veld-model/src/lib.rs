//! Record definitions and runtime values.
//!
//! A `SchemaRegistry` holds the record definitions supplied by the external
//! schema compiler. Values come in two shapes: frozen (`Value`, deeply
//! immutable, `Arc`-shared, safe to read concurrently) and mutable
//! (`StructMut`/`ArrayMut`, single-owner, freely edited in place). The two
//! convert with shallow `to_mutable` and deep `to_frozen`.

mod keyed;
mod mutable;
mod schema;
mod timestamp;
mod value;

pub use keyed::Key;
pub use mutable::{ArrayMut, Slot, SlotRef, StructMut, StructRef, ValueMut};
pub use schema::{
    ArrayDef, EnumDef, FieldDef, MethodDef, Primitive, RecordDef, RegistryBuilder, SchemaRegistry,
    StructDef, TypeDef, VariantDef,
};
pub use timestamp::Timestamp;
pub use value::{ArrayValue, EnumCase, EnumValue, StructValue, Value};
