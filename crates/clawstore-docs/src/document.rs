//! Documents and type-erased record handling
//!
//! A [`Document`] pairs a uid with an immutable, type-erased record and a stale
//! flag. Re-inserting a uid installs a new `Document`; the old one is never
//! mutated, so readers holding an `Arc` keep a consistent value.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::error::{DocError, DocResult};
use crate::schema::{Record, Schema};

/// Shared, type-erased record payload.
pub type RecordData = Arc<dyn Any + Send + Sync>;

/// Reserved file name of a collection's definition file.
pub const DEFINITION_FILE: &str = "definition";

/// One stored record.
pub struct Document {
    uid: String,
    data: RecordData,
    stale: AtomicBool,
}

impl Document {
    /// A freshly inserted document, stale until persisted.
    pub fn fresh(uid: String, data: RecordData) -> Self {
        Self { uid, data, stale: AtomicBool::new(true) }
    }

    /// A document restored from disk.
    pub fn loaded(uid: String, data: RecordData) -> Self {
        Self { uid, data, stale: AtomicBool::new(false) }
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    pub fn data(&self) -> &RecordData {
        &self.data
    }

    /// Borrow the record as `T`, if it is one.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Shared handle to the record as `T`, if it is one.
    pub fn downcast_arc<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        Arc::clone(&self.data).downcast::<T>().ok()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Acquire)
    }

    pub(crate) fn mark_clean(&self) {
        self.stale.store(false, Ordering::Release);
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("uid", &self.uid)
            .field("stale", &self.is_stale())
            .finish_non_exhaustive()
    }
}

/// Check a caller-supplied uid before it becomes a file name.
pub fn validate_uid(uid: &str) -> DocResult<()> {
    let reason = if uid == DEFINITION_FILE {
        "reserved for the collection definition file"
    } else if uid.contains('/') || uid.contains('\\') {
        "must not contain path separators"
    } else if uid.starts_with('.') {
        "must not start with '.'"
    } else {
        return Ok(());
    };
    Err(DocError::InvalidUid { uid: uid.to_string(), reason })
}

/// New random identity: 32 lowercase hex characters.
pub fn generate_uid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

type EncodeFn = fn(&(dyn Any + Send + Sync)) -> DocResult<Map<String, Value>>;
type DecodeFn = fn(&Map<String, Value>) -> DocResult<(String, RecordData)>;

/// Runtime handle on a registered record type.
///
/// Collections restored from disk only know their type by its stable name;
/// this is what the name resolves to.
#[derive(Clone)]
pub struct RecordType {
    type_id: TypeId,
    type_name: &'static str,
    field_names: Arc<[&'static str]>,
    encode: EncodeFn,
    decode: DecodeFn,
}

impl RecordType {
    /// Validate `T`'s schema and build its handle.
    pub fn of<T: Record>() -> DocResult<Self> {
        let schema = Schema::<T>::of()?;
        Ok(Self {
            type_id: TypeId::of::<T>(),
            type_name: T::TYPE_NAME,
            field_names: schema.field_names().into(),
            encode: encode_erased::<T>,
            decode: decode_erased::<T>,
        })
    }

    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    pub fn declares(&self, name: &str) -> bool {
        self.field_names.iter().any(|n| *n == name)
    }

    /// Structured form of a record of this type.
    pub fn encode(&self, data: &(dyn Any + Send + Sync)) -> DocResult<Map<String, Value>> {
        (self.encode)(data)
    }

    /// Record of this type plus the uid it carries.
    pub fn decode(&self, object: &Map<String, Value>) -> DocResult<(String, RecordData)> {
        (self.decode)(object)
    }
}

impl std::fmt::Debug for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordType")
            .field("type_name", &self.type_name)
            .field("fields", &self.field_names)
            .finish()
    }
}

fn encode_erased<T: Record>(data: &(dyn Any + Send + Sync)) -> DocResult<Map<String, Value>> {
    let record = data.downcast_ref::<T>().ok_or_else(|| DocError::Serialization {
        message: format!("payload is not a {}", T::TYPE_NAME),
    })?;
    Schema::<T>::of()?.to_object(record)
}

fn decode_erased<T: Record>(object: &Map<String, Value>) -> DocResult<(String, RecordData)> {
    let schema = Schema::<T>::of()?;
    let record = schema.from_object(object)?;
    let uid = schema.uid_of(&record)?;
    Ok((uid, Arc::new(record)))
}
