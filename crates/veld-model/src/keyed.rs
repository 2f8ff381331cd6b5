use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::timestamp::Timestamp;
use crate::value::{ArrayValue, StructValue, Value};

/// A keyed-array key. Only types with total equality may key an array, so
/// floats and bytes are excluded at registry build time.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Bool(bool),
    Int(i64),
    Uint(u64),
    Timestamp(i64),
    Str(Arc<str>),
}

impl Key {
    pub(crate) fn from_value(value: &Value) -> Option<Key> {
        match value {
            Value::Bool(v) => Some(Key::Bool(*v)),
            Value::Int32(v) => Some(Key::Int(i64::from(*v))),
            Value::Int64(v) => Some(Key::Int(*v)),
            Value::Uint64(v) => Some(Key::Uint(*v)),
            Value::Timestamp(v) => Some(Key::Timestamp(v.unix_millis())),
            Value::String(v) => Some(Key::Str(v.clone())),
            _ => None,
        }
    }
}

impl From<bool> for Key {
    fn from(v: bool) -> Key {
        Key::Bool(v)
    }
}

impl From<i32> for Key {
    fn from(v: i32) -> Key {
        Key::Int(i64::from(v))
    }
}

impl From<i64> for Key {
    fn from(v: i64) -> Key {
        Key::Int(v)
    }
}

impl From<u64> for Key {
    fn from(v: u64) -> Key {
        Key::Uint(v)
    }
}

impl From<Timestamp> for Key {
    fn from(v: Timestamp) -> Key {
        Key::Timestamp(v.unix_millis())
    }
}

impl From<&str> for Key {
    fn from(v: &str) -> Key {
        Key::Str(Arc::from(v))
    }
}

impl ArrayValue {
    /// Looks an item up by key. The first call scans the backing sequence
    /// once to build the key index; the sequence never changes after
    /// construction, so later calls are O(1) map hits. Duplicate keys:
    /// the last-indexed item wins.
    pub fn find(&self, key: &Key) -> Result<Option<&Value>> {
        let Some(keyed) = &self.repr.keyed else {
            anyhow::bail!("not a keyed array");
        };
        let field_index = keyed.field_index;
        let index = self
            .repr
            .index
            .get_or_init(|| build_index(&self.repr.items, field_index));
        Ok(index.get(key).map(|&i| &self.repr.items[i]))
    }

    /// Like `find`, but absent keys yield the item type's DEFAULT instead
    /// of an absence, so call sites can read fields without null checks.
    pub fn find_or_default(
        &self,
        registry: &crate::schema::SchemaRegistry,
        key: &Key,
    ) -> Result<Value> {
        if let Some(found) = self.find(key)? {
            return Ok(found.clone());
        }
        let keyed = self
            .repr
            .keyed
            .as_ref()
            .context("not a keyed array")?;
        Ok(Value::Struct(StructValue::default_of(
            registry,
            &keyed.item_def,
        )?))
    }
}

fn build_index(items: &[Value], field_index: usize) -> HashMap<Key, usize> {
    let mut map = HashMap::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        if let Value::Struct(sv) = item {
            if let Some(key) = Key::from_value(&sv.fields()[field_index]) {
                // Last one wins on duplicates.
                map.insert(key, i);
            }
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArrayDef, FieldDef, Primitive, SchemaRegistry, TypeDef};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builder()
            .struct_def(
                "user.veld:User",
                vec![
                    FieldDef::new("user_id", 0, TypeDef::Primitive(Primitive::Int64)),
                    FieldDef::new("name", 1, TypeDef::Primitive(Primitive::String)),
                ],
            )
            .struct_def(
                "user.veld:UserRegistry",
                vec![FieldDef::new(
                    "users",
                    0,
                    TypeDef::Array(ArrayDef {
                        item: Box::new(TypeDef::Record("user.veld:User".to_string())),
                        key_field: Some("user_id".to_string()),
                    }),
                )],
            )
            .build()
            .unwrap()
    }

    fn user(reg: &SchemaRegistry, id: i64, name: &str) -> StructValue {
        reg.new_struct(
            "user.veld:User",
            vec![("user_id", id.into()), ("name", name.into())],
        )
        .unwrap()
    }

    #[test]
    fn find_hits_present_keys_and_misses_absent_ones() {
        let reg = registry();
        let john = user(&reg, 42, "John Doe");
        let jane = user(&reg, 100, "Jane Doe");
        let registry_value = reg
            .new_struct(
                "user.veld:UserRegistry",
                vec![(
                    "users",
                    Value::array(vec![john.clone().into(), jane.into()]).into(),
                )],
            )
            .unwrap();

        let users = registry_value.get("users").unwrap().as_array().unwrap();
        let found = users.find(&Key::from(42i64)).unwrap().unwrap();
        assert_eq!(found.as_struct().unwrap(), &john);
        assert!(users.find(&Key::from(7i64)).unwrap().is_none());
    }

    #[test]
    fn find_or_default_never_returns_absence() {
        let reg = registry();
        let john = user(&reg, 42, "John Doe");
        let registry_value = reg
            .new_struct(
                "user.veld:UserRegistry",
                vec![("users", Value::array(vec![john.into()]).into())],
            )
            .unwrap();
        let users = registry_value.get("users").unwrap().as_array().unwrap();

        let hit = users.find_or_default(&reg, &Key::from(42i64)).unwrap();
        assert_eq!(
            hit.as_struct().unwrap().get("name").unwrap().as_str(),
            Some("John Doe")
        );

        let miss = users.find_or_default(&reg, &Key::from(100i64)).unwrap();
        assert_eq!(miss.as_struct().unwrap().get("name").unwrap().as_str(), Some(""));
        assert_eq!(miss.as_struct().unwrap().get("user_id").unwrap().as_i64(), Some(0));
    }

    #[test]
    fn duplicate_keys_last_one_wins() {
        let reg = registry();
        let first = user(&reg, 42, "First");
        let second = user(&reg, 42, "Second");
        let registry_value = reg
            .new_struct(
                "user.veld:UserRegistry",
                vec![(
                    "users",
                    Value::array(vec![first.into(), second.into()]).into(),
                )],
            )
            .unwrap();
        let users = registry_value.get("users").unwrap().as_array().unwrap();

        let found = users.find(&Key::from(42i64)).unwrap().unwrap();
        assert_eq!(
            found.as_struct().unwrap().get("name").unwrap().as_str(),
            Some("Second")
        );
        // Both items are still present in order; only lookup dedups.
        assert_eq!(users.len(), 2);
    }

    #[test]
    fn mutable_items_are_read_at_construction_time() {
        let reg = registry();
        let user_def = reg.struct_def("user.veld:User").unwrap().clone();
        let mut lyla = crate::mutable::StructMut::new(&reg, &user_def).unwrap();
        lyla.set(&reg, "user_id", 44i64).unwrap();
        lyla.set(&reg, "name", "Lyla Doe").unwrap();

        let john = user(&reg, 42, "John Doe");
        let registry_value = reg
            .new_struct(
                "user.veld:UserRegistry",
                vec![(
                    "users",
                    Value::array(vec![john.into(), lyla.clone().into()]).into(),
                )],
            )
            .unwrap();
        let users = registry_value.get("users").unwrap().as_array().unwrap();

        // The mutable item was frozen on the way in; its key as of
        // construction is what the index sees, and later mutation of the
        // source cannot reach the stored copy.
        lyla.set(&reg, "name", "Renamed").unwrap();
        let found = users.find(&Key::from(44i64)).unwrap().unwrap();
        assert_eq!(
            found.as_struct().unwrap().get("name").unwrap().as_str(),
            Some("Lyla Doe")
        );
    }

    #[test]
    fn find_on_an_unkeyed_array_is_an_error() {
        let arr = match Value::array(vec![]) {
            Value::Array(a) => a,
            _ => unreachable!(),
        };
        let err = arr.find(&Key::from(1i64)).unwrap_err();
        assert!(format!("{err:#}").contains("not a keyed array"));
    }
}
