use std::sync::Arc;

use anyhow::{Context, Result};

use crate::schema::{ArrayDef, SchemaRegistry, StructDef, TypeDef};
use crate::timestamp::Timestamp;
use crate::value::{adopt, ArrayValue, EnumValue, KeyedMeta, StructValue, Value};

/// A mutable value. Only structs and arrays have a mutable shape; scalars
/// and enums are replaced wholesale through `StructMut::set`.
#[derive(Debug, Clone)]
pub enum ValueMut {
    Struct(StructMut),
    Array(ArrayMut),
}

impl ValueMut {
    /// Deep freeze. Frozen children are reused as-is; mutable children are
    /// converted recursively.
    pub fn to_frozen_value(&self) -> Value {
        match self {
            ValueMut::Struct(m) => Value::Struct(m.to_frozen()),
            ValueMut::Array(m) => Value::Array(m.to_frozen()),
        }
    }
}

/// A field cell: either a ready frozen value or a live mutable one. This is
/// the "frozen or mutable" union — construction APIs accept it so callers
/// can hand over either shape, and mutable parents store it so children are
/// promoted lazily.
#[derive(Debug, Clone)]
pub enum Slot {
    Frozen(Value),
    Mut(ValueMut),
}

impl Slot {
    pub fn to_frozen_value(&self) -> Value {
        match self {
            Slot::Frozen(v) => v.clone(),
            Slot::Mut(m) => m.to_frozen_value(),
        }
    }

    pub fn is_mutable(&self) -> bool {
        matches!(self, Slot::Mut(_))
    }
}

impl From<Value> for Slot {
    fn from(v: Value) -> Slot {
        Slot::Frozen(v)
    }
}

impl From<ValueMut> for Slot {
    fn from(v: ValueMut) -> Slot {
        Slot::Mut(v)
    }
}

impl From<StructMut> for Slot {
    fn from(v: StructMut) -> Slot {
        Slot::Mut(ValueMut::Struct(v))
    }
}

impl From<ArrayMut> for Slot {
    fn from(v: ArrayMut) -> Slot {
        Slot::Mut(ValueMut::Array(v))
    }
}

impl From<StructValue> for Slot {
    fn from(v: StructValue) -> Slot {
        Slot::Frozen(Value::Struct(v))
    }
}

impl From<ArrayValue> for Slot {
    fn from(v: ArrayValue) -> Slot {
        Slot::Frozen(Value::Array(v))
    }
}

impl From<EnumValue> for Slot {
    fn from(v: EnumValue) -> Slot {
        Slot::Frozen(Value::Enum(v))
    }
}

impl From<bool> for Slot {
    fn from(v: bool) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<i32> for Slot {
    fn from(v: i32) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<i64> for Slot {
    fn from(v: i64) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<u64> for Slot {
    fn from(v: u64) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<f32> for Slot {
    fn from(v: f32) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<f64> for Slot {
    fn from(v: f64) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<Timestamp> for Slot {
    fn from(v: Timestamp) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<&str> for Slot {
    fn from(v: &str) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<String> for Slot {
    fn from(v: String) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl From<Vec<u8>> for Slot {
    fn from(v: Vec<u8>) -> Slot {
        Slot::Frozen(Value::from(v))
    }
}

impl StructValue {
    /// Shallow mutable copy: every field of the copy still holds the
    /// original frozen value. Cheap, and mutating the copy never affects
    /// the source.
    pub fn to_mutable(&self) -> StructMut {
        StructMut {
            def: self.def().clone(),
            slots: self
                .fields()
                .iter()
                .map(|v| Slot::Frozen(v.clone()))
                .collect(),
        }
    }
}

/// Mutable struct instance. Not thread-safe; confine to one owner. Nested
/// struct/array fields stay frozen until promoted through
/// `mutable_struct`/`mutable_array`.
#[derive(Debug, Clone)]
pub struct StructMut {
    def: Arc<StructDef>,
    slots: Vec<Slot>,
}

impl StructMut {
    /// A fresh mutable instance with every field at its default.
    pub fn new(registry: &SchemaRegistry, def: &Arc<StructDef>) -> Result<StructMut> {
        Ok(StructValue::default_of(registry, def)?.to_mutable())
    }

    pub fn def(&self) -> &Arc<StructDef> {
        &self.def
    }

    pub fn get(&self, name: &str) -> Result<&Slot> {
        let idx = self.field_index(name)?;
        Ok(&self.slots[idx])
    }

    /// Assigns a field. Frozen inputs are shape-checked and adopted;
    /// mutable inputs are stored live (no copy), so later writes through
    /// the caller's handle remain visible here.
    pub fn set(&mut self, registry: &SchemaRegistry, name: &str, slot: impl Into<Slot>) -> Result<()> {
        let idx = self.field_index(name)?;
        let ty = &self.def.fields[idx].ty;
        let stored = match slot.into() {
            Slot::Frozen(v) => Slot::Frozen(
                adopt(registry, ty, v)
                    .with_context(|| format!("field {:?}.{}", self.def.id, name))?,
            ),
            Slot::Mut(m) => {
                check_mut_assignable(ty, &m)
                    .with_context(|| format!("field {:?}.{}", self.def.id, name))?;
                Slot::Mut(m)
            }
        };
        self.slots[idx] = stored;
        Ok(())
    }

    /// Write-intent access to a struct field. If the field already holds a
    /// mutable struct it is returned as-is; otherwise the frozen value is
    /// replaced by a shallow mutable copy which is returned. Idempotent:
    /// repeated calls without an intervening `set` hit the same instance.
    pub fn mutable_struct(&mut self, name: &str) -> Result<&mut StructMut> {
        let idx = self.field_index(name)?;
        let slot = &mut self.slots[idx];
        let promoted = match &*slot {
            Slot::Mut(ValueMut::Struct(_)) => None,
            Slot::Frozen(Value::Struct(sv)) => Some(ValueMut::Struct(sv.to_mutable())),
            _ => anyhow::bail!("field {:?}.{name} does not hold a struct", self.def.id),
        };
        if let Some(m) = promoted {
            *slot = Slot::Mut(m);
        }
        match slot {
            Slot::Mut(ValueMut::Struct(m)) => Ok(m),
            _ => anyhow::bail!("field {:?}.{name} does not hold a struct", self.def.id),
        }
    }

    /// Write-intent access to an array field; same promotion contract as
    /// `mutable_struct`.
    pub fn mutable_array(&mut self, registry: &SchemaRegistry, name: &str) -> Result<&mut ArrayMut> {
        let idx = self.field_index(name)?;
        let TypeDef::Array(ad) = &self.def.fields[idx].ty else {
            anyhow::bail!("field {:?}.{name} is not an array", self.def.id);
        };
        let slot = &mut self.slots[idx];
        let promoted = match &*slot {
            Slot::Mut(ValueMut::Array(_)) => None,
            Slot::Frozen(Value::Array(av)) => {
                Some(ValueMut::Array(ArrayMut::from_frozen(registry, ad, av)?))
            }
            _ => anyhow::bail!("field {:?}.{name} does not hold an array", self.def.id),
        };
        if let Some(m) = promoted {
            *slot = Slot::Mut(m);
        }
        match slot {
            Slot::Mut(ValueMut::Array(m)) => Ok(m),
            _ => anyhow::bail!("field {:?}.{name} does not hold an array", self.def.id),
        }
    }

    /// Deep freeze: a new frozen instance equal to the snapshot of this
    /// tree right now. Frozen children are shared, mutable children are
    /// converted recursively; later mutation here never reaches the result.
    pub fn to_frozen(&self) -> StructValue {
        let fields: Vec<Value> = self.slots.iter().map(Slot::to_frozen_value).collect();
        StructValue::from_parts(self.def.clone(), fields)
    }

    fn field_index(&self, name: &str) -> Result<usize> {
        self.def
            .field_index(name)
            .with_context(|| format!("struct {:?} has no field {name:?}", self.def.id))
    }
}

/// Mutable ordered sequence. Carries its element type so pushes are
/// shape-checked at the edge.
#[derive(Debug, Clone)]
pub struct ArrayMut {
    pub(crate) def: ArrayDef,
    keyed: Option<KeyedMeta>,
    slots: Vec<Slot>,
}

impl ArrayMut {
    pub fn new(registry: &SchemaRegistry, def: &ArrayDef) -> Result<ArrayMut> {
        Ok(ArrayMut {
            def: def.clone(),
            keyed: KeyedMeta::resolve(registry, def)?,
            slots: Vec::new(),
        })
    }

    pub(crate) fn from_frozen(
        registry: &SchemaRegistry,
        def: &ArrayDef,
        source: &ArrayValue,
    ) -> Result<ArrayMut> {
        Ok(ArrayMut {
            def: def.clone(),
            keyed: KeyedMeta::resolve(registry, def)?,
            slots: source.iter().map(|v| Slot::Frozen(v.clone())).collect(),
        })
    }

    pub fn item_type(&self) -> &TypeDef {
        &self.def.item
    }

    pub fn push(&mut self, registry: &SchemaRegistry, slot: impl Into<Slot>) -> Result<()> {
        let stored = match slot.into() {
            Slot::Frozen(v) => Slot::Frozen(adopt(registry, &self.def.item, v)?),
            Slot::Mut(m) => {
                check_mut_assignable(&self.def.item, &m)?;
                Slot::Mut(m)
            }
        };
        self.slots.push(stored);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Slot> {
        self.slots.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Slot> {
        self.slots.get_mut(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Slot> {
        self.slots.iter()
    }

    pub fn to_frozen(&self) -> ArrayValue {
        let items: Vec<Value> = self.slots.iter().map(Slot::to_frozen_value).collect();
        ArrayValue::from_parts(items, self.keyed.clone())
    }
}

fn check_mut_assignable(ty: &TypeDef, value: &ValueMut) -> Result<()> {
    match (ty, value) {
        (TypeDef::Record(id), ValueMut::Struct(m)) if m.def.id == *id => Ok(()),
        (TypeDef::Array(ad), ValueMut::Array(m)) if m.def == *ad => Ok(()),
        (_, ValueMut::Struct(m)) => anyhow::bail!(
            "mutable struct {:?} does not match field type {ty:?}",
            m.def.id
        ),
        (_, ValueMut::Array(_)) => {
            anyhow::bail!("mutable array does not match field type {ty:?}")
        }
    }
}

/// Read-only view over a frozen or mutable struct, so one function can
/// accept either without caring which it got. Exposes no writes.
#[derive(Debug, Clone, Copy)]
pub enum StructRef<'a> {
    Frozen(&'a StructValue),
    Mutable(&'a StructMut),
}

impl<'a> StructRef<'a> {
    pub fn def(&self) -> &'a Arc<StructDef> {
        match self {
            StructRef::Frozen(sv) => sv.def(),
            StructRef::Mutable(sm) => sm.def(),
        }
    }

    pub fn get(&self, name: &str) -> Result<SlotRef<'a>> {
        match self {
            StructRef::Frozen(sv) => Ok(SlotRef::Frozen(sv.get(name)?)),
            StructRef::Mutable(sm) => Ok(match sm.get(name)? {
                Slot::Frozen(v) => SlotRef::Frozen(v),
                Slot::Mut(m) => SlotRef::Mut(m),
            }),
        }
    }
}

impl<'a> From<&'a StructValue> for StructRef<'a> {
    fn from(v: &'a StructValue) -> StructRef<'a> {
        StructRef::Frozen(v)
    }
}

impl<'a> From<&'a StructMut> for StructRef<'a> {
    fn from(v: &'a StructMut) -> StructRef<'a> {
        StructRef::Mutable(v)
    }
}

/// Borrowed counterpart of `Slot`.
#[derive(Debug, Clone, Copy)]
pub enum SlotRef<'a> {
    Frozen(&'a Value),
    Mut(&'a ValueMut),
}

impl<'a> SlotRef<'a> {
    pub fn to_frozen_value(&self) -> Value {
        match self {
            SlotRef::Frozen(v) => (*v).clone(),
            SlotRef::Mut(m) => m.to_frozen_value(),
        }
    }

    pub fn as_str(&self) -> Option<&'a str> {
        match self {
            SlotRef::Frozen(v) => v.as_str(),
            SlotRef::Mut(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            SlotRef::Frozen(v) => v.as_i64(),
            SlotRef::Mut(_) => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            SlotRef::Frozen(v) => v.as_bool(),
            SlotRef::Mut(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldDef, Primitive, SchemaRegistry};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .struct_def(
                "user.veld:User",
                vec![
                    FieldDef::new("user_id", 0, TypeDef::Primitive(Primitive::Int64)),
                    FieldDef::new("name", 1, TypeDef::Primitive(Primitive::String)),
                    FieldDef::new("quote", 2, TypeDef::Primitive(Primitive::String)),
                    FieldDef::new(
                        "pets",
                        3,
                        TypeDef::Array(ArrayDef {
                            item: Box::new(TypeDef::Record("user.veld:User.Pet".to_string())),
                            key_field: None,
                        }),
                    ),
                ],
            )
            .struct_def(
                "user.veld:User.Pet",
                vec![FieldDef::new("name", 0, TypeDef::Primitive(Primitive::String))],
            )
            .struct_def(
                "user.veld:UserHistory",
                vec![FieldDef::new(
                    "user",
                    0,
                    TypeDef::Record("user.veld:User".to_string()),
                )],
            )
            .build()
            .unwrap()
    }

    #[test]
    fn to_mutable_is_shallow_and_detached() {
        let reg = registry();
        let jane = reg
            .new_struct(
                "user.veld:User",
                vec![("user_id", 43i64.into()), ("name", "Jane Doe".into())],
            )
            .unwrap();

        let mut evil = jane.to_mutable();
        evil.set(&reg, "name", "Evil Jane").unwrap();

        assert_eq!(jane.get("name").unwrap().as_str(), Some("Jane Doe"));
        let frozen = evil.to_frozen();
        assert_eq!(frozen.get("name").unwrap().as_str(), Some("Evil Jane"));
        assert_eq!(frozen.get("user_id").unwrap().as_i64(), Some(43));
    }

    #[test]
    fn to_frozen_snapshots_are_detached_from_the_source() {
        let reg = registry();
        let def = reg.struct_def("user.veld:User").unwrap().clone();
        let mut m = StructMut::new(&reg, &def).unwrap();
        m.set(&reg, "name", "before").unwrap();

        let snapshot = m.to_frozen();
        m.set(&reg, "name", "after").unwrap();

        assert_eq!(snapshot.get("name").unwrap().as_str(), Some("before"));
        assert_eq!(m.to_frozen().get("name").unwrap().as_str(), Some("after"));
    }

    #[test]
    fn mutable_struct_promotes_once_and_stays_live() {
        let reg = registry();
        let history_def = reg.struct_def("user.veld:UserHistory").unwrap().clone();
        let user_def = reg.struct_def("user.veld:User").unwrap().clone();

        let mut history = StructMut::new(&reg, &history_def).unwrap();
        let joly = StructMut::new(&reg, &user_def).unwrap();
        history.set(&reg, "user", joly).unwrap();

        history
            .mutable_struct("user")
            .unwrap()
            .set(&reg, "quote", "I am Joly.")
            .unwrap();

        // Second access hits the same live instance, not a fresh copy.
        assert_eq!(
            history
                .mutable_struct("user")
                .unwrap()
                .get("quote")
                .unwrap()
                .to_frozen_value()
                .as_str(),
            Some("I am Joly.")
        );

        let frozen = history.to_frozen();
        let user = frozen.get("user").unwrap().as_struct().unwrap();
        assert_eq!(user.get("quote").unwrap().as_str(), Some("I am Joly."));
    }

    #[test]
    fn mutable_struct_promotes_frozen_fields_lazily() {
        let reg = registry();
        let history_def = reg.struct_def("user.veld:UserHistory").unwrap().clone();
        let john = reg
            .new_struct("user.veld:User", vec![("name", "John".into())])
            .unwrap();

        let mut history = StructMut::new(&reg, &history_def).unwrap();
        history.set(&reg, "user", john.clone()).unwrap();
        assert!(!history.get("user").unwrap().is_mutable());

        history
            .mutable_struct("user")
            .unwrap()
            .set(&reg, "quote", "X")
            .unwrap();
        assert!(history.get("user").unwrap().is_mutable());

        // The source frozen value is untouched.
        assert_eq!(john.get("quote").unwrap().as_str(), Some(""));
        let frozen = history.to_frozen();
        let user = frozen.get("user").unwrap().as_struct().unwrap();
        assert_eq!(user.get("quote").unwrap().as_str(), Some("X"));
        assert_eq!(user.get("name").unwrap().as_str(), Some("John"));
    }

    #[test]
    fn mutable_array_accepts_mixed_shapes() {
        let reg = registry();
        let user_def = reg.struct_def("user.veld:User").unwrap().clone();
        let mut lyla = StructMut::new(&reg, &user_def).unwrap();

        let cupcake = reg
            .new_struct("user.veld:User.Pet", vec![("name", "Cupcake".into())])
            .unwrap();
        let pet_def = reg.struct_def("user.veld:User.Pet").unwrap().clone();
        let mut simba = StructMut::new(&reg, &pet_def).unwrap();
        simba.set(&reg, "name", "Simba").unwrap();

        lyla.mutable_array(&reg, "pets").unwrap().push(&reg, cupcake).unwrap();
        lyla.mutable_array(&reg, "pets").unwrap().push(&reg, simba).unwrap();

        let frozen = lyla.to_frozen();
        let pets = frozen.get("pets").unwrap().as_array().unwrap();
        assert_eq!(pets.len(), 2);
        assert_eq!(
            pets.get(0).unwrap().as_struct().unwrap().get("name").unwrap().as_str(),
            Some("Cupcake")
        );
        assert_eq!(
            pets.get(1).unwrap().as_struct().unwrap().get("name").unwrap().as_str(),
            Some("Simba")
        );
    }

    #[test]
    fn struct_ref_reads_either_shape() {
        let reg = registry();
        let jane = reg
            .new_struct("user.veld:User", vec![("name", "Jane Doe".into())])
            .unwrap();
        let user_def = reg.struct_def("user.veld:User").unwrap().clone();
        let mut lyla = StructMut::new(&reg, &user_def).unwrap();
        lyla.set(&reg, "name", "Lyla Doe").unwrap();

        fn name_of(user: StructRef<'_>) -> String {
            user.get("name").unwrap().as_str().unwrap_or_default().to_string()
        }

        assert_eq!(name_of(StructRef::from(&jane)), "Jane Doe");
        assert_eq!(name_of(StructRef::from(&lyla)), "Lyla Doe");
    }

    #[test]
    fn promotion_on_non_struct_field_is_an_error() {
        let reg = registry();
        let user_def = reg.struct_def("user.veld:User").unwrap().clone();
        let mut m = StructMut::new(&reg, &user_def).unwrap();
        let err = m.mutable_struct("name").unwrap_err();
        assert!(format!("{err:#}").contains("does not hold a struct"));
    }
}
