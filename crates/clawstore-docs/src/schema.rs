//! Schema descriptor cache
//!
//! Every storable type implements [`Record`] and lists its persisted fields
//! once, usually through [`record_fields!`](crate::record_fields). The table is
//! validated and cached per type on first use; cloning, merging and loading
//! all go through it, so no runtime introspection is needed.
//!
//! ```ignore
//! #[derive(Default)]
//! struct Player { uid: String, health: i32, name: String }
//!
//! impl Record for Player {
//!     const TYPE_NAME: &'static str = "game::Player";
//!     fn fields() -> Vec<FieldDescriptor<Self>> {
//!         record_fields!(Player { uid, health, name })
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::sync::{Arc, OnceLock};

use hashbrown::HashMap;
use parking_lot::RwLock;
use serde_json::{Map, Value};

use crate::error::{DocError, DocResult};

/// Field names recognised as the document identity.
pub const IDENTITY_FIELDS: [&str; 2] = ["uid", "UID"];

pub type Getter<T> = fn(&T) -> serde_json::Result<Value>;
pub type Setter<T> = fn(&mut T, Value) -> serde_json::Result<()>;
pub type Copier<T> = fn(&T, &mut T);

/// A type that can be stored in a collection.
///
/// `Default` provides fresh pool instances and the base for loading, so fields
/// missing from an older file keep their default value.
pub trait Record: Default + Send + Sync + 'static {
    /// Stable name written to collection definition files. Renaming it orphans
    /// existing collections of this type.
    const TYPE_NAME: &'static str;

    /// Persisted fields. Must include a `uid` (or `UID`) string field.
    fn fields() -> Vec<FieldDescriptor<Self>>;
}

/// Accessors for one persisted field.
pub struct FieldDescriptor<T> {
    name: &'static str,
    get: Getter<T>,
    set: Setter<T>,
    copy: Copier<T>,
}

impl<T> FieldDescriptor<T> {
    pub fn new(name: &'static str, get: Getter<T>, set: Setter<T>, copy: Copier<T>) -> Self {
        Self { name, get, set, copy }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

/// Build the field table for a struct whose fields are `Serialize +
/// DeserializeOwned + Clone`. Stored field names are the Rust field names.
#[macro_export]
macro_rules! record_fields {
    ($ty:ty { $($field:ident),* $(,)? }) => {
        vec![$(
            $crate::schema::FieldDescriptor::<$ty>::new(
                stringify!($field),
                |record: &$ty| -> $crate::__private::serde_json::Result<$crate::__private::Value> {
                    $crate::__private::serde_json::to_value(&record.$field)
                },
                |record: &mut $ty, value: $crate::__private::Value| -> $crate::__private::serde_json::Result<()> {
                    record.$field = $crate::__private::serde_json::from_value(value)?;
                    Ok(())
                },
                |source: &$ty, target: &mut $ty| {
                    ::core::clone::Clone::clone_from(&mut target.$field, &source.$field);
                },
            )
        ),*]
    };
}

type SchemaMap = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static SCHEMAS: OnceLock<SchemaMap> = OnceLock::new();

/// Validated field table for one record type. The identity field is kept last.
pub struct Schema<T> {
    fields: Vec<FieldDescriptor<T>>,
    names: Vec<&'static str>,
}

impl<T: Record> Schema<T> {
    /// Cached schema for `T`, built on first use.
    pub fn of() -> DocResult<Arc<Schema<T>>> {
        let cache = SCHEMAS.get_or_init(Default::default);
        let key = TypeId::of::<T>();

        if let Some(entry) = cache.read().get(&key) {
            if let Ok(schema) = Arc::clone(entry).downcast::<Schema<T>>() {
                return Ok(schema);
            }
        }

        let built = Arc::new(Self::build()?);
        let entry = cache
            .write()
            .entry(key)
            .or_insert_with(|| built.clone() as Arc<dyn Any + Send + Sync>)
            .clone();
        Ok(entry.downcast::<Schema<T>>().unwrap_or(built))
    }

    fn build() -> DocResult<Self> {
        let mut fields = T::fields();
        let identity = fields
            .iter()
            .position(|f| IDENTITY_FIELDS.contains(&f.name))
            .ok_or(DocError::MissingIdentityField { type_name: T::TYPE_NAME })?;

        let id_field = fields.remove(identity);
        match (id_field.get)(&T::default()) {
            Ok(Value::String(_)) | Ok(Value::Null) => {}
            _ => {
                return Err(DocError::InvalidIdentityField {
                    type_name: T::TYPE_NAME,
                    field: id_field.name,
                })
            }
        }
        fields.push(id_field);

        let names = fields.iter().map(|f| f.name).collect();
        Ok(Self { fields, names })
    }

    /// Declared field names, identity last.
    pub fn field_names(&self) -> &[&'static str] {
        &self.names
    }

    pub fn declares(&self, name: &str) -> bool {
        self.names.iter().any(|n| *n == name)
    }

    fn identity(&self) -> &FieldDescriptor<T> {
        // build() guarantees a trailing identity field
        &self.fields[self.fields.len() - 1]
    }

    pub fn identity_name(&self) -> &'static str {
        self.identity().name
    }

    /// Current identity of `record`; empty when unset.
    pub fn uid_of(&self, record: &T) -> DocResult<String> {
        match (self.identity().get)(record)? {
            Value::String(uid) => Ok(uid),
            Value::Null => Ok(String::new()),
            _ => Err(DocError::InvalidIdentityField {
                type_name: T::TYPE_NAME,
                field: self.identity().name,
            }),
        }
    }

    pub fn set_uid(&self, record: &mut T, uid: &str) -> DocResult<()> {
        (self.identity().set)(record, Value::String(uid.to_string()))?;
        Ok(())
    }

    /// Copy every declared field from `source` into `target`, identity last.
    pub fn copy_into(&self, source: &T, target: &mut T) {
        for field in &self.fields {
            (field.copy)(source, target);
        }
    }

    /// Structured form of `record`, one entry per declared field.
    pub fn to_object(&self, record: &T) -> DocResult<Map<String, Value>> {
        let mut object = Map::new();
        for field in &self.fields {
            let value = (field.get)(record).map_err(|e| DocError::Serialization {
                message: format!("{}.{}: {}", T::TYPE_NAME, field.name, e),
            })?;
            object.insert(field.name.to_string(), value);
        }
        Ok(object)
    }

    /// Build a record from its structured form. Entries the type does not
    /// declare are ignored; declared fields missing from `object` keep their
    /// default value.
    pub fn from_object(&self, object: &Map<String, Value>) -> DocResult<T> {
        let mut record = T::default();
        for field in &self.fields {
            if let Some(value) = object.get(field.name) {
                (field.set)(&mut record, value.clone()).map_err(|e| DocError::Serialization {
                    message: format!("{}.{}: {}", T::TYPE_NAME, field.name, e),
                })?;
            }
        }
        Ok(record)
    }
}

/// Copy the persisted fields of one record into another.
///
/// Useful for moving data loaded from the store into a live object without
/// replacing it.
pub fn copy_saved_data<T: Record>(source: &T, target: &mut T) -> DocResult<()> {
    Schema::<T>::of()?.copy_into(source, target);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Player {
        uid: String,
        health: i32,
        name: String,
        scratch: u32, // not persisted
    }

    impl Record for Player {
        const TYPE_NAME: &'static str = "schema::Player";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Player { uid, health, name })
        }
    }

    #[derive(Default)]
    struct NoIdentity {
        health: i32,
    }

    impl Record for NoIdentity {
        const TYPE_NAME: &'static str = "schema::NoIdentity";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(NoIdentity { health })
        }
    }

    #[derive(Default)]
    struct NumericIdentity {
        uid: u64,
    }

    impl Record for NumericIdentity {
        const TYPE_NAME: &'static str = "schema::NumericIdentity";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(NumericIdentity { uid })
        }
    }

    static COPY_ORDER: Mutex<Vec<&'static str>> = parking_lot::const_mutex(Vec::new());

    #[derive(Default)]
    struct Observed {
        uid: String,
        a: i32,
        b: i32,
    }

    impl Record for Observed {
        const TYPE_NAME: &'static str = "schema::Observed";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            fn tracked(name: &'static str, copy: Copier<Observed>) -> FieldDescriptor<Observed> {
                FieldDescriptor::new(name, |_| Ok(Value::Null), |_, _| Ok(()), copy)
            }
            // uid declared first
            vec![
                tracked("uid", |s, t| {
                    COPY_ORDER.lock().push("uid");
                    t.uid = s.uid.clone();
                }),
                tracked("a", |s, t| {
                    COPY_ORDER.lock().push("a");
                    t.a = s.a;
                }),
                tracked("b", |s, t| {
                    COPY_ORDER.lock().push("b");
                    t.b = s.b;
                }),
            ]
        }
    }

    #[test]
    fn test_schema_is_cached() {
        let first = Schema::<Player>::of().unwrap();
        let second = Schema::<Player>::of().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_identity_kept_last() {
        let schema = Schema::<Player>::of().unwrap();
        assert_eq!(schema.field_names(), &["health", "name", "uid"]);
        assert_eq!(schema.identity_name(), "uid");
        assert!(schema.declares("name"));
        assert!(!schema.declares("scratch"));
    }

    #[test]
    fn test_missing_identity_rejected() {
        let result = Schema::<NoIdentity>::of();
        assert!(matches!(result, Err(DocError::MissingIdentityField { .. })));
    }

    #[test]
    fn test_non_string_identity_rejected() {
        let result = Schema::<NumericIdentity>::of();
        assert!(matches!(result, Err(DocError::InvalidIdentityField { field: "uid", .. })));
    }

    #[test]
    fn test_copy_sets_identity_last() {
        let schema = Schema::<Observed>::of().unwrap();
        let source = Observed { uid: "u1".into(), a: 1, b: 2 };
        let mut target = Observed::default();

        COPY_ORDER.lock().clear();
        schema.copy_into(&source, &mut target);

        assert_eq!(*COPY_ORDER.lock(), vec!["a", "b", "uid"]);
        assert_eq!((target.uid.as_str(), target.a, target.b), ("u1", 1, 2));
    }

    #[test]
    fn test_copy_skips_undeclared_fields() {
        let source = Player { uid: "p1".into(), health: 50, name: "Steve".into(), scratch: 9 };
        let mut target = Player::default();
        copy_saved_data(&source, &mut target).unwrap();

        assert_eq!(target.health, 50);
        assert_eq!(target.name, "Steve");
        assert_eq!(target.uid, "p1");
        assert_eq!(target.scratch, 0);
    }

    #[test]
    fn test_object_conversion() {
        let schema = Schema::<Player>::of().unwrap();
        let player = Player { uid: "p1".into(), health: 7, name: "Bob".into(), scratch: 3 };

        let object = schema.to_object(&player).unwrap();
        assert_eq!(Value::Object(object.clone()), json!({ "uid": "p1", "health": 7, "name": "Bob" }));

        let back = schema.from_object(&object).unwrap();
        assert_eq!(back, Player { scratch: 0, ..player });
    }

    #[test]
    fn test_from_object_tolerates_schema_drift() {
        let schema = Schema::<Player>::of().unwrap();
        let object = json!({ "uid": "p1", "health": 3, "retired_field": true });
        let player = schema.from_object(object.as_object().unwrap()).unwrap();

        assert_eq!(player.health, 3);
        assert_eq!(player.name, "");
    }

    #[test]
    fn test_from_object_wrong_value_type() {
        let schema = Schema::<Player>::of().unwrap();
        let object = json!({ "uid": "p1", "health": "lots" });
        let result = schema.from_object(object.as_object().unwrap());
        assert!(matches!(result, Err(DocError::Serialization { .. })));
    }

    #[test]
    fn test_uid_get_set() {
        let schema = Schema::<Player>::of().unwrap();
        let mut player = Player::default();
        assert_eq!(schema.uid_of(&player).unwrap(), "");

        schema.set_uid(&mut player, "abc").unwrap();
        assert_eq!(player.uid, "abc");
        assert_eq!(schema.uid_of(&player).unwrap(), "abc");
    }
}
