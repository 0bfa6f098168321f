//! Database handle: the public CRUD surface
//!
//! `Database` owns the collection registry, the object pool, the persistence
//! layer and the write-back scheduler.
//!
//! **Read path**: RAM only; every result is a pooled copy (or a shared `Arc`
//! from `select_unsafe`)
//! **Write path**: copy into RAM, mark stale, queue for the scheduler
//! **Background**: ticker thread paces stale documents onto disk

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{info, warn};

use crate::collection::{Collection, Collections};
use crate::config::Config;
use crate::document::{generate_uid, validate_uid, Document, RecordType};
use crate::error::{DocError, DocResult};
use crate::fileio::{DiskIo, FileIo};
use crate::persistence::Persistence;
use crate::pool::{ObjectPool, PoolStats};
use crate::scheduler::{start_ticker, FlushReport, TickerHandle, WriteBackScheduler};
use crate::schema::{self, Record, Schema};

/// One document or collection that could not be restored by `init`.
#[derive(Debug, Clone)]
pub struct LoadFailure {
    pub collection: String,
    /// `None` when the whole collection was skipped
    pub uid: Option<String>,
    pub error: DocError,
}

/// Summary of what `init` restored from disk.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    pub collections: usize,
    pub documents: usize,
    pub failures: Vec<LoadFailure>,
}

/// Embedded document store.
///
/// All public methods take `&self` and may be called from any thread.
/// Register record types, call [`init`](Database::init), then use the CRUD
/// methods. Dropping the handle shuts it down and flushes.
pub struct Database {
    config: Config,
    persistence: Arc<Persistence>,
    collections: Arc<Collections>,
    pool: Arc<ObjectPool>,
    scheduler: Arc<WriteBackScheduler>,
    /// Registered record types by stable name
    types: RwLock<HashMap<&'static str, RecordType>>,
    /// Background ticker; its lock also serialises init and shutdown
    ticker: Mutex<Option<TickerHandle>>,
    initialised: AtomicBool,
}

impl Database {
    /// A database stored in the directory at `path`.
    pub fn new<P: AsRef<Path>>(path: P, config: Config) -> DocResult<Self> {
        Self::with_io(config, Arc::new(DiskIo::new(path)))
    }

    /// A database on a custom storage backend.
    pub fn with_io(config: Config, io: Arc<dyn FileIo>) -> DocResult<Self> {
        config.validate().map_err(DocError::InvalidConfig)?;

        let persistence = Arc::new(Persistence::from_config(io, &config));
        let collections = Arc::new(Collections::new());
        let pool = Arc::new(ObjectPool::new(config.instance_pool_size));
        let scheduler = Arc::new(WriteBackScheduler::new(
            Arc::clone(&collections),
            Arc::clone(&persistence),
            &config,
        ));

        Ok(Self {
            config,
            persistence,
            collections,
            pool,
            scheduler,
            types: RwLock::new(HashMap::new()),
            ticker: Mutex::new(None),
            initialised: AtomicBool::new(false),
        })
    }

    /// Make `T` resolvable from collection definitions on disk. Types used
    /// through `insert`/`select` are registered on first use, but collections
    /// written by an earlier run only load if their type is registered before
    /// `init`.
    pub fn register<T: Record>(&self) -> DocResult<()> {
        self.record_type::<T>().map(|_| ())
    }

    fn record_type<T: Record>(&self) -> DocResult<RecordType> {
        if let Some(existing) = self.types.read().get(T::TYPE_NAME) {
            return check_registered::<T>(existing);
        }

        let record_type = RecordType::of::<T>()?;
        let mut types = self.types.write();
        let entry = types.entry(T::TYPE_NAME).or_insert_with(|| record_type.clone());
        let resolved = check_registered::<T>(entry)?;
        drop(types);

        self.pool.register::<T>();
        Ok(resolved)
    }

    pub fn is_initialised(&self) -> bool {
        self.initialised.load(Ordering::Acquire)
    }

    fn ensure_initialised(&self) -> DocResult<()> {
        if self.is_initialised() {
            Ok(())
        } else {
            Err(DocError::NotInitialised)
        }
    }

    /// Load every collection from disk and start the ticker.
    ///
    /// Integrity problems (a uid that does not match its file name, an
    /// unregistered type, a corrupt file) are recorded in the report and the
    /// rest of the load continues. Storage that keeps failing past its retry
    /// budget aborts the load.
    pub fn init(&self) -> DocResult<LoadReport> {
        let mut ticker = self.ticker.lock();
        if self.is_initialised() {
            return Err(DocError::AlreadyInitialised);
        }

        if !self.config.merge_on_write {
            warn!("merge-on-write is disabled: fields dropped from a record type are deleted from its files on the next write");
        }

        let report = match self.load_all() {
            Ok(report) => report,
            Err(e) => {
                self.collections.clear();
                return Err(e);
            }
        };

        self.pool.check_pool();
        if self.config.background_ticker {
            *ticker = Some(start_ticker(
                Arc::clone(&self.scheduler),
                Arc::clone(&self.pool),
                &self.config,
            )?);
        }
        self.initialised.store(true, Ordering::Release);

        info!(
            collections = report.collections,
            documents = report.documents,
            failures = report.failures.len(),
            "database initialised"
        );
        Ok(report)
    }

    fn load_all(&self) -> DocResult<LoadReport> {
        self.persistence.ensure_root()?;

        let mut report = LoadReport::default();
        for name in self.persistence.list_collections()? {
            match self.load_collection(&name, &mut report) {
                Ok(()) => report.collections += 1,
                Err(e @ DocError::RetriesExhausted { .. }) => return Err(e),
                Err(e) => {
                    warn!(collection = %name, error = %e, "collection not loaded");
                    report.failures.push(LoadFailure { collection: name, uid: None, error: e });
                }
            }
        }
        Ok(report)
    }

    fn load_collection(&self, name: &str, report: &mut LoadReport) -> DocResult<()> {
        let definition = self.persistence.load_collection_definition(name)?;
        let record_type = self
            .types
            .read()
            .get(definition.document_type.as_str())
            .cloned()
            .ok_or_else(|| DocError::UnresolvedType {
                collection: name.to_string(),
                type_name: definition.document_type.clone(),
            })?;

        let collection = Collection::new(name, record_type);
        for uid in self.persistence.list_documents(name)? {
            match self.persistence.load_document(name, &uid, collection.record_type()) {
                Ok(document) => {
                    collection.insert(Arc::new(document));
                    report.documents += 1;
                }
                Err(e @ DocError::RetriesExhausted { .. }) => return Err(e),
                Err(e) => {
                    warn!(collection = name, uid = %uid, error = %e, "document not loaded");
                    report.failures.push(LoadFailure {
                        collection: name.to_string(),
                        uid: Some(uid),
                        error: e,
                    });
                }
            }
        }

        self.collections.restore(collection);
        Ok(())
    }

    /// Stop the ticker, write every stale document and release the in-memory
    /// data. If the final flush fails the database stays initialised (without
    /// a ticker) so the caller can retry.
    pub fn shutdown(&self) -> DocResult<FlushReport> {
        let mut ticker = self.ticker.lock();
        self.ensure_initialised()?;

        if let Some(handle) = ticker.take() {
            handle.shutdown();
        }

        let report = self.scheduler.flush_now()?;
        self.scheduler.with_writes_paused(|| self.collections.clear());
        self.pool.clear();
        self.initialised.store(false, Ordering::Release);

        info!(written = report.written, "database shut down");
        Ok(report)
    }

    /// The collection `name` if it exists and holds `T`.
    fn existing_collection<T: Record>(&self, name: &str) -> DocResult<Option<Arc<Collection>>> {
        let record_type = self.record_type::<T>()?;
        self.collections.get(name, &record_type)
    }

    /// The collection `name`, created empty (with its definition file) if absent.
    fn collection_or_create<T: Record>(&self, name: &str) -> DocResult<Arc<Collection>> {
        let record_type = self.record_type::<T>()?;
        let (collection, created) = self.collections.get_or_create(name, &record_type)?;
        if created {
            // a failed write here is repaired by the first document write
            if let Err(e) = self.persistence.save_collection_definition(&collection) {
                warn!(collection = name, error = %e, "could not write collection definition");
            }
        }
        Ok(collection)
    }

    /// Store a copy of `record`. An empty uid is replaced by a generated one,
    /// which is also written back into `record`. Returns the uid.
    pub fn insert<T: Record>(&self, collection: &str, record: &mut T) -> DocResult<String> {
        self.ensure_initialised()?;
        let schema = Schema::<T>::of()?;

        let mut uid = schema.uid_of(record)?;
        if uid.is_empty() {
            uid = generate_uid();
            schema.set_uid(record, &uid)?;
        } else {
            validate_uid(&uid)?;
        }

        let target = self.collection_or_create::<T>(collection)?;
        let copy = self.pool.copy_of(record, &schema);
        target.insert(Arc::new(Document::fresh(uid.clone(), Arc::new(copy))));
        self.scheduler.enqueue(target.name(), &uid);
        Ok(uid)
    }

    /// Insert each record in turn. Stops at the first error.
    pub fn insert_many<T: Record>(&self, collection: &str, records: &mut [T]) -> DocResult<Vec<String>> {
        records.iter_mut().map(|record| self.insert(collection, record)).collect()
    }

    /// Reads create unknown collections, so a later insert finds them.
    fn readable<T: Record>(&self, collection: &str) -> DocResult<(Arc<Schema<T>>, Arc<Collection>)> {
        self.ensure_initialised()?;
        let schema = Schema::<T>::of()?;
        let collection = self.collection_or_create::<T>(collection)?;
        Ok((schema, collection))
    }

    /// Copy of the first record matching `predicate`.
    pub fn select_one<T, F>(&self, collection: &str, predicate: F) -> DocResult<Option<T>>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        let (schema, collection) = self.readable::<T>(collection)?;
        for document in collection.snapshot() {
            if let Some(record) = document.downcast_ref::<T>() {
                if predicate(record) {
                    return Ok(Some(self.pool.copy_of(record, &schema)));
                }
            }
        }
        Ok(None)
    }

    /// Copy of the record with `uid`.
    pub fn select_by_uid<T: Record>(&self, collection: &str, uid: &str) -> DocResult<Option<T>> {
        let (schema, collection) = self.readable::<T>(collection)?;
        Ok(collection
            .get(uid)
            .and_then(|document| document.downcast_ref::<T>().map(|r| self.pool.copy_of(r, &schema))))
    }

    /// Copies of every record matching `predicate`.
    pub fn select<T, F>(&self, collection: &str, predicate: F) -> DocResult<Vec<T>>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        let (schema, collection) = self.readable::<T>(collection)?;
        Ok(collection
            .snapshot()
            .iter()
            .filter_map(|document| document.downcast_ref::<T>())
            .filter(|record| predicate(record))
            .map(|record| self.pool.copy_of(record, &schema))
            .collect())
    }

    /// Shared handles on every record matching `predicate`, without copying.
    /// The records are the cached values themselves; they are immutable, and
    /// re-inserting a uid installs a new value rather than changing these.
    pub fn select_unsafe<T, F>(&self, collection: &str, predicate: F) -> DocResult<Vec<Arc<T>>>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        let (_, collection) = self.readable::<T>(collection)?;
        Ok(collection
            .snapshot()
            .iter()
            .filter_map(|document| document.downcast_arc::<T>())
            .filter(|record| predicate(record))
            .collect())
    }

    /// Delete every record matching `predicate`, in memory and on disk.
    /// Returns how many were removed.
    pub fn delete<T, F>(&self, collection: &str, predicate: F) -> DocResult<usize>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        self.ensure_initialised()?;
        let Some(collection) = self.existing_collection::<T>(collection)? else {
            return Ok(0);
        };

        let doomed: Vec<String> = collection
            .snapshot()
            .iter()
            .filter(|document| document.downcast_ref::<T>().map_or(false, |r| predicate(r)))
            .map(|document| document.uid().to_string())
            .collect();

        let mut removed = 0;
        let mut first_error = None;
        for uid in &doomed {
            match self.remove_document(&collection, uid) {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    removed += 1;
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(removed),
        }
    }

    /// Delete the record with `uid`. Returns whether it existed.
    pub fn delete_by_uid<T: Record>(&self, collection: &str, uid: &str) -> DocResult<bool> {
        self.ensure_initialised()?;
        match self.existing_collection::<T>(collection)? {
            Some(collection) => self.remove_document(&collection, uid),
            None => Ok(false),
        }
    }

    /// Drop the map slot first so no flush can write the document back, then
    /// unlink its file.
    fn remove_document(&self, collection: &Collection, uid: &str) -> DocResult<bool> {
        if collection.remove(uid).is_none() {
            return Ok(false);
        }
        self.persistence.delete_document(collection, uid)?;
        Ok(true)
    }

    /// Whether any record matches `predicate`.
    pub fn any<T, F>(&self, collection: &str, predicate: F) -> DocResult<bool>
    where
        T: Record,
        F: Fn(&T) -> bool,
    {
        self.ensure_initialised()?;
        let Some(collection) = self.existing_collection::<T>(collection)? else {
            return Ok(false);
        };
        Ok(collection
            .snapshot()
            .iter()
            .any(|document| document.downcast_ref::<T>().map_or(false, |r| predicate(r))))
    }

    pub fn any_by_uid<T: Record>(&self, collection: &str, uid: &str) -> DocResult<bool> {
        self.ensure_initialised()?;
        Ok(self
            .existing_collection::<T>(collection)?
            .map_or(false, |collection| collection.contains(uid)))
    }

    /// Write every stale document now.
    pub fn flush_now(&self) -> DocResult<FlushReport> {
        self.ensure_initialised()?;
        self.scheduler.flush_now()
    }

    /// Delete every collection, in memory and on disk.
    pub fn wipe_all(&self) -> DocResult<()> {
        self.ensure_initialised()?;
        let removed = self.scheduler.with_writes_paused(|| {
            self.collections.clear();
            self.persistence.wipe_all()
        })?;
        info!(collections = removed, "database wiped");
        Ok(())
    }

    /// Documents not yet persisted, across all collections.
    pub fn stale_count(&self) -> usize {
        self.collections.all().iter().map(|c| c.stale_count()).sum()
    }

    /// Names of the collections currently loaded.
    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.all().iter().map(|c| c.name().to_string()).collect();
        names.sort();
        names
    }

    /// Copy every persisted field of `source` into `target`.
    pub fn copy_saved_data<T: Record>(&self, source: &T, target: &mut T) -> DocResult<()> {
        schema::copy_saved_data(source, target)
    }

    /// Return a copy obtained from a select to the object pool.
    pub fn recycle<T: Record>(&self, value: T) {
        self.pool.recycle(value);
    }

    pub fn scheduler(&self) -> &Arc<WriteBackScheduler> {
        &self.scheduler
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.is_initialised() {
            if let Err(e) = self.shutdown() {
                warn!(error = %e, "shutdown on drop did not complete");
            }
        }
    }
}

fn check_registered<T: Record>(existing: &RecordType) -> DocResult<RecordType> {
    if existing.is::<T>() {
        Ok(existing.clone())
    } else {
        Err(DocError::DuplicateTypeName { type_name: T::TYPE_NAME })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fileio::MemoryIo;
    use crate::record_fields;
    use crate::schema::FieldDescriptor;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Player {
        uid: String,
        health: i32,
        name: String,
    }

    impl Record for Player {
        const TYPE_NAME: &'static str = "engine::Player";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Player { uid, health, name })
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Impostor {
        uid: String,
    }

    impl Record for Impostor {
        const TYPE_NAME: &'static str = "engine::Player";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Impostor { uid })
        }
    }

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Monster {
        uid: String,
    }

    impl Record for Monster {
        const TYPE_NAME: &'static str = "engine::Monster";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Monster { uid })
        }
    }

    fn memory_db() -> (Arc<MemoryIo>, Database) {
        let io = Arc::new(MemoryIo::new());
        let db = Database::with_io(Config::manual(), io.clone()).unwrap();
        db.register::<Player>().unwrap();
        db.init().unwrap();
        (io, db)
    }

    fn player(health: i32, name: &str) -> Player {
        Player { uid: String::new(), health, name: name.into() }
    }

    #[test]
    fn test_operations_require_init() {
        let db = Database::with_io(Config::manual(), Arc::new(MemoryIo::new())).unwrap();
        assert!(matches!(db.insert("players", &mut player(1, "a")), Err(DocError::NotInitialised)));
        assert!(matches!(db.select::<Player, _>("players", |_| true), Err(DocError::NotInitialised)));
        assert!(matches!(db.flush_now(), Err(DocError::NotInitialised)));
        assert!(matches!(db.shutdown(), Err(DocError::NotInitialised)));
    }

    #[test]
    fn test_double_init_rejected() {
        let (_, db) = memory_db();
        assert!(matches!(db.init(), Err(DocError::AlreadyInitialised)));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = Config { partial_writes_per_second: 0, ..Config::manual() };
        let result = Database::with_io(config, Arc::new(MemoryIo::new()));
        assert!(matches!(result, Err(DocError::InvalidConfig(_))));
    }

    #[test]
    fn test_duplicate_type_name_rejected() {
        let (_, db) = memory_db();
        assert!(matches!(db.register::<Impostor>(), Err(DocError::DuplicateTypeName { .. })));
        assert!(db.register::<Player>().is_ok());
    }

    #[test]
    fn test_insert_assigns_and_writes_back_uid() {
        let (_, db) = memory_db();
        let mut p = player(10, "Steve");
        let uid = db.insert("players", &mut p).unwrap();

        assert_eq!(uid.len(), 32);
        assert_eq!(p.uid, uid);

        // same object again keeps its identity
        p.health = 20;
        assert_eq!(db.insert("players", &mut p).unwrap(), uid);
        assert_eq!(db.select::<Player, _>("players", |_| true).unwrap().len(), 1);
        assert_eq!(db.select_by_uid::<Player>("players", &uid).unwrap().unwrap().health, 20);
    }

    #[test]
    fn test_invalid_uid_rejected() {
        let (_, db) = memory_db();
        let mut p = Player { uid: "definition".into(), ..player(1, "x") };
        assert!(matches!(db.insert("players", &mut p), Err(DocError::InvalidUid { .. })));
        assert_eq!(db.stale_count(), 0);
    }

    #[test]
    fn test_type_mismatch_between_collections() {
        let (_, db) = memory_db();
        db.insert("things", &mut player(1, "x")).unwrap();
        assert!(matches!(
            db.insert("things", &mut Monster::default()),
            Err(DocError::TypeMismatch { .. })
        ));
        assert!(matches!(
            db.select::<Monster, _>("things", |_| true),
            Err(DocError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_copy_isolation() {
        let (_, db) = memory_db();
        let mut original = player(50, "Alice");
        let uid = db.insert("players", &mut original).unwrap();

        // the caller's object is not the cached one
        original.health = 0;
        let mut read = db.select_by_uid::<Player>("players", &uid).unwrap().unwrap();
        assert_eq!(read.health, 50);

        // nor is a selected copy
        read.name = "Mallory".into();
        let again = db.select_one::<Player, _>("players", |p| p.uid == uid).unwrap().unwrap();
        assert_eq!(again.name, "Alice");
    }

    #[test]
    fn test_select_unsafe_shares_cached_value() {
        let (_, db) = memory_db();
        db.insert("players", &mut player(1, "a")).unwrap();

        let first = db.select_unsafe::<Player, _>("players", |_| true).unwrap();
        let second = db.select_unsafe::<Player, _>("players", |_| true).unwrap();
        assert!(Arc::ptr_eq(&first[0], &second[0]));
    }

    #[test]
    fn test_select_on_unknown_collection_creates_it() {
        let (io, db) = memory_db();
        assert!(db.select::<Player, _>("empty", |_| true).unwrap().is_empty());
        assert_eq!(db.collection_names(), vec!["empty"]);
        assert!(io.read(Path::new("empty/definition")).unwrap().is_some());
    }

    #[test]
    fn test_delete_and_any() {
        let (io, db) = memory_db();
        let weak = db.insert("players", &mut player(5, "weak")).unwrap();
        db.insert("players", &mut player(95, "strong")).unwrap();
        db.flush_now().unwrap();

        assert!(db.any::<Player, _>("players", |p| p.health < 10).unwrap());
        assert_eq!(db.delete::<Player, _>("players", |p| p.health < 10).unwrap(), 1);
        assert!(!db.any_by_uid::<Player>("players", &weak).unwrap());
        assert!(io.read(&Path::new("players").join(&weak)).unwrap().is_none());

        assert!(!db.delete_by_uid::<Player>("players", &weak).unwrap());
        assert_eq!(db.delete::<Player, _>("nowhere", |_| true).unwrap(), 0);
    }

    #[test]
    fn test_flush_clears_stale() {
        let (_, db) = memory_db();
        db.insert_many("players", &mut [player(1, "a"), player(2, "b")]).unwrap();
        assert_eq!(db.stale_count(), 2);

        let report = db.flush_now().unwrap();
        assert_eq!(report.written, 2);
        assert_eq!(db.stale_count(), 0);
    }

    #[test]
    fn test_shutdown_and_reinit() {
        let (_, db) = memory_db();
        let uid = db.insert("players", &mut player(7, "Bo")).unwrap();

        assert_eq!(db.shutdown().unwrap().written, 1);
        assert!(!db.is_initialised());

        let report = db.init().unwrap();
        assert_eq!(report.documents, 1);
        assert_eq!(db.select_by_uid::<Player>("players", &uid).unwrap().unwrap().name, "Bo");
    }

    #[test]
    fn test_failed_shutdown_can_be_retried() {
        let (io, db) = memory_db();
        db.insert("players", &mut player(7, "Bo")).unwrap();

        io.fail_next_writes(crate::persistence::DOCUMENT_WRITE_ATTEMPTS);
        assert!(matches!(db.shutdown(), Err(DocError::FlushIncomplete { .. })));
        assert!(db.is_initialised());
        assert_eq!(db.shutdown().unwrap().written, 1);
    }

    #[test]
    fn test_pool_serves_selects() {
        let (_, db) = memory_db();
        db.insert("players", &mut player(1, "a")).unwrap();
        let before = db.pool_stats().hits;
        let copy = db.select_one::<Player, _>("players", |_| true).unwrap().unwrap();
        assert!(db.pool_stats().hits > before);
        db.recycle(copy);
    }

    #[test]
    fn test_select_after_recycle_reuses_the_instance() {
        let (_, db) = memory_db();
        let uid = db.insert("players", &mut player(1, "a")).unwrap();

        let mut copy = db.select_by_uid::<Player>("players", &uid).unwrap().unwrap();
        copy.name.reserve(256);
        let capacity = copy.name.capacity();
        db.recycle(copy);

        let before = db.pool_stats();
        let again = db.select_by_uid::<Player>("players", &uid).unwrap().unwrap();
        let after = db.pool_stats();
        assert_eq!(again, Player { uid: uid.clone(), health: 1, name: "a".into() });
        assert_eq!(again.name.capacity(), capacity);
        assert_eq!(after.hits, before.hits + 1);
        assert_eq!(after.misses, before.misses);
    }

    #[test]
    fn test_shutdown_empties_pool() {
        let (_, db) = memory_db();
        assert!(db.pool_stats().pooled > 0);
        db.shutdown().unwrap();
        assert_eq!(db.pool_stats().pooled, 0);

        db.init().unwrap();
        assert!(db.pool_stats().pooled > 0);
    }
}
