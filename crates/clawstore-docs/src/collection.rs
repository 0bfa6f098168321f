//! Named, homogeneous groups of documents

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};

use crate::document::{Document, RecordType};
use crate::error::{DocError, DocResult};

/// All documents of one record type under one name.
pub struct Collection {
    name: String,
    record_type: RecordType,
    documents: DashMap<String, Arc<Document>>,
    /// Serialises file access for this collection
    io_lock: Mutex<()>,
}

impl Collection {
    pub fn new(name: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            name: name.into(),
            record_type,
            documents: DashMap::new(),
            io_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_type(&self) -> &RecordType {
        &self.record_type
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn get(&self, uid: &str) -> Option<Arc<Document>> {
        self.documents.get(uid).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.documents.contains_key(uid)
    }

    /// Install `document`, replacing any previous one with the same uid.
    pub fn insert(&self, document: Arc<Document>) -> Option<Arc<Document>> {
        self.documents.insert(document.uid().to_string(), document)
    }

    pub fn remove(&self, uid: &str) -> Option<Arc<Document>> {
        self.documents.remove(uid).map(|(_, document)| document)
    }

    /// Handles on every current document. Concurrent writers may or may not be
    /// reflected; no shard locks are held once this returns.
    pub fn snapshot(&self) -> Vec<Arc<Document>> {
        self.documents.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn stale_documents(&self) -> Vec<Arc<Document>> {
        self.documents
            .iter()
            .filter(|entry| entry.value().is_stale())
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn stale_count(&self) -> usize {
        self.documents.iter().filter(|entry| entry.value().is_stale()).count()
    }

    pub fn clear(&self) {
        self.documents.clear();
    }

    pub(crate) fn lock_io(&self) -> MutexGuard<'_, ()> {
        self.io_lock.lock()
    }
}

impl std::fmt::Debug for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collection")
            .field("name", &self.name)
            .field("type", &self.record_type.type_name())
            .field("documents", &self.documents.len())
            .finish()
    }
}

/// Registry of collections by name.
#[derive(Default)]
pub struct Collections {
    by_name: DashMap<String, Arc<Collection>>,
    creation: Mutex<()>,
}

impl Collections {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up `name`, failing if it holds a different type.
    pub fn get(&self, name: &str, record_type: &RecordType) -> DocResult<Option<Arc<Collection>>> {
        match self.by_name.get(name) {
            Some(entry) => {
                let collection = Arc::clone(entry.value());
                drop(entry);
                check_type(&collection, record_type)?;
                Ok(Some(collection))
            }
            None => Ok(None),
        }
    }

    /// Fetch `name`, creating an empty collection of `record_type` if absent.
    /// Returns the collection and whether this call created it.
    pub fn get_or_create(
        &self,
        name: &str,
        record_type: &RecordType,
    ) -> DocResult<(Arc<Collection>, bool)> {
        if let Some(existing) = self.get(name, record_type)? {
            return Ok((existing, false));
        }

        let _creating = self.creation.lock();
        // another creator may have won while we waited
        if let Some(existing) = self.get(name, record_type)? {
            return Ok((existing, false));
        }
        let collection = Arc::new(Collection::new(name, record_type.clone()));
        self.by_name.insert(name.to_string(), Arc::clone(&collection));
        Ok((collection, true))
    }

    /// Register a collection restored from disk.
    pub fn restore(&self, collection: Collection) -> Arc<Collection> {
        let collection = Arc::new(collection);
        let _creating = self.creation.lock();
        self.by_name.insert(collection.name().to_string(), Arc::clone(&collection));
        collection
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<Collection>> {
        self.by_name.get(name).map(|entry| Arc::clone(entry.value()))
    }

    pub fn all(&self) -> Vec<Arc<Collection>> {
        self.by_name.iter().map(|entry| Arc::clone(entry.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    pub fn clear(&self) {
        let _creating = self.creation.lock();
        self.by_name.clear();
    }
}

fn check_type(collection: &Collection, record_type: &RecordType) -> DocResult<()> {
    if collection.record_type().type_id() == record_type.type_id() {
        Ok(())
    } else {
        Err(DocError::TypeMismatch {
            collection: collection.name().to_string(),
            expected: collection.record_type().type_name().to_string(),
            actual: record_type.type_name().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_fields;
    use crate::schema::{FieldDescriptor, Record};
    use std::thread;

    #[derive(Default)]
    struct Player {
        uid: String,
        health: i32,
    }

    impl Record for Player {
        const TYPE_NAME: &'static str = "collection::Player";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Player { uid, health })
        }
    }

    #[derive(Default)]
    struct Monster {
        uid: String,
    }

    impl Record for Monster {
        const TYPE_NAME: &'static str = "collection::Monster";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Monster { uid })
        }
    }

    fn player(uid: &str, health: i32) -> Arc<Document> {
        Arc::new(Document::fresh(uid.into(), Arc::new(Player { uid: uid.into(), health })))
    }

    #[test]
    fn test_insert_replaces_by_uid() {
        let collection = Collection::new("players", RecordType::of::<Player>().unwrap());
        assert!(collection.insert(player("p1", 10)).is_none());
        let old = collection.insert(player("p1", 20)).unwrap();

        assert_eq!(old.downcast_ref::<Player>().unwrap().health, 10);
        assert_eq!(collection.len(), 1);
        assert_eq!(collection.get("p1").unwrap().downcast_ref::<Player>().unwrap().health, 20);
    }

    #[test]
    fn test_stale_tracking() {
        let collection = Collection::new("players", RecordType::of::<Player>().unwrap());
        collection.insert(player("p1", 1));
        collection.insert(player("p2", 2));
        collection.get("p1").unwrap().mark_clean();

        assert_eq!(collection.stale_count(), 1);
        assert_eq!(collection.stale_documents()[0].uid(), "p2");
    }

    #[test]
    fn test_type_mismatch() {
        let registry = Collections::new();
        let players = RecordType::of::<Player>().unwrap();
        let monsters = RecordType::of::<Monster>().unwrap();

        let (_, created) = registry.get_or_create("things", &players).unwrap();
        assert!(created);
        assert!(matches!(
            registry.get_or_create("things", &monsters),
            Err(DocError::TypeMismatch { .. })
        ));
        assert!(registry.get("things", &monsters).is_err());
        assert!(registry.get("missing", &monsters).unwrap().is_none());
    }

    #[test]
    fn test_racing_creators_converge() {
        let registry = Arc::new(Collections::new());
        let players = RecordType::of::<Player>().unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let players = players.clone();
                thread::spawn(move || registry.get_or_create("players", &players).unwrap())
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|(_, created)| *created).count(), 1);
        assert!(results.windows(2).all(|w| Arc::ptr_eq(&w[0].0, &w[1].0)));
        assert_eq!(registry.len(), 1);
    }
}
