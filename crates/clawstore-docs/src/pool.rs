//! Clone-on-read object pool
//!
//! Reads hand out copies, never the cached record. The pool keeps a free list
//! of instances per registered type, buffers included, so a busy read path
//! copies into memory it already owns instead of allocating. The ticker calls
//! [`ObjectPool::check_pool`] to top the lists up or shrink them when idle.

use std::any::{Any, TypeId};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};

use crate::schema::{Record, Schema};

/// Consecutive checks without an acquisition before a list is shrunk.
pub const IDLE_CHECKS_BEFORE_SHRINK: u32 = 30;

/// Type-erased face of one [`FreeList`], for the resizing pass.
trait Resizable: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn len(&self) -> usize;
    fn fill_to(&self, target: usize);
    /// Returns the length before truncating when it was above `floor`.
    fn shrink_to(&self, floor: usize) -> Option<usize>;
    fn clear(&self);
}

/// Instances of `T` held by value, so taking and returning one never touches
/// the heap.
struct FreeList<T> {
    free: Mutex<Vec<T>>,
}

impl<T: Record> FreeList<T> {
    fn pop(&self) -> Option<T> {
        self.free.lock().pop()
    }

    /// Keeps `value` while the list is below `target`.
    fn push(&self, value: T, target: usize) {
        let mut free = self.free.lock();
        if free.len() < target {
            free.push(value);
        }
    }
}

impl<T: Record> Resizable for FreeList<T> {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn len(&self) -> usize {
        self.free.lock().len()
    }

    fn fill_to(&self, target: usize) {
        let mut free = self.free.lock();
        let missing = target.saturating_sub(free.len());
        free.extend((0..missing).map(|_| T::default()));
    }

    fn shrink_to(&self, floor: usize) -> Option<usize> {
        let mut free = self.free.lock();
        let before = free.len();
        if before <= floor {
            return None;
        }
        free.truncate(floor);
        free.shrink_to_fit();
        Some(before)
    }

    fn clear(&self) {
        let mut free = self.free.lock();
        free.clear();
        free.shrink_to_fit();
    }
}

struct TypePool {
    list: Box<dyn Resizable>,
    acquired_since_check: AtomicU64,
    idle_checks: AtomicU32,
}

/// Pool hit/miss counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    /// Instances currently held across all free lists
    pub pooled: usize,
}

/// Per-type free lists of reusable instances.
pub struct ObjectPool {
    target: usize,
    pools: RwLock<HashMap<TypeId, Arc<TypePool>>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ObjectPool {
    /// A pool aiming to keep `target` instances per registered type.
    pub fn new(target: usize) -> Self {
        Self {
            target,
            pools: RwLock::new(HashMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Start pooling `T`. The list fills on the next `check_pool`.
    pub fn register<T: Record>(&self) {
        let key = TypeId::of::<T>();
        if self.pools.read().contains_key(&key) {
            return;
        }
        self.pools.write().entry(key).or_insert_with(|| {
            Arc::new(TypePool {
                list: Box::new(FreeList::<T> { free: Mutex::new(Vec::new()) }),
                acquired_since_check: AtomicU64::new(0),
                idle_checks: AtomicU32::new(0),
            })
        });
    }

    fn pool_for<T: Record>(&self) -> Option<Arc<TypePool>> {
        self.pools.read().get(&TypeId::of::<T>()).cloned()
    }

    /// A pooled instance of `T`, or a default one when the list is empty.
    /// Pooled instances may still hold the values of an earlier copy.
    fn take<T: Record>(&self) -> T {
        let pooled = self.pool_for::<T>().and_then(|pool| {
            pool.acquired_since_check.fetch_add(1, Ordering::Relaxed);
            pool.list.as_any().downcast_ref::<FreeList<T>>().and_then(|list| list.pop())
        });

        match pooled {
            Some(instance) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                instance
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                T::default()
            }
        }
    }

    /// An instance of `T` whose declared fields hold their default values.
    /// A pooled instance is reset in place and keeps its buffers; with nothing
    /// pooled this is a plain `T::default()`. Fields outside the schema are
    /// left as the previous user set them.
    pub fn acquire<T: Record>(&self) -> T {
        let mut instance = self.take::<T>();
        if let Ok(schema) = Schema::<T>::of() {
            schema.copy_into(&T::default(), &mut instance);
        }
        instance
    }

    /// Independent copy of `source` built on a pooled instance. Every declared
    /// field is overwritten, reusing the buffers the instance already owns.
    pub fn copy_of<T: Record>(&self, source: &T, schema: &Schema<T>) -> T {
        let mut target = self.take::<T>();
        schema.copy_into(source, &mut target);
        target
    }

    /// Hand a finished copy back. It is kept as is, buffers included, while
    /// the list is below target.
    pub fn recycle<T: Record>(&self, value: T) {
        let Some(pool) = self.pool_for::<T>() else {
            return;
        };
        if let Some(list) = pool.list.as_any().downcast_ref::<FreeList<T>>() {
            list.push(value, self.target);
        }
    }

    /// Grow every list toward target, or shrink lists that have seen no
    /// acquisitions for [`IDLE_CHECKS_BEFORE_SHRINK`] checks to a quarter of it.
    pub fn check_pool(&self) {
        let pools: Vec<(TypeId, Arc<TypePool>)> =
            self.pools.read().iter().map(|(k, v)| (*k, Arc::clone(v))).collect();

        for (type_id, pool) in pools {
            let acquired = pool.acquired_since_check.swap(0, Ordering::Relaxed);
            let idle = if acquired > 0 {
                pool.idle_checks.store(0, Ordering::Relaxed);
                0
            } else {
                pool.idle_checks.fetch_add(1, Ordering::Relaxed) + 1
            };

            if idle >= IDLE_CHECKS_BEFORE_SHRINK {
                let floor = self.target / 4;
                if let Some(from) = pool.list.shrink_to(floor) {
                    tracing::debug!(?type_id, from, to = floor, "shrinking idle pool");
                }
            } else {
                pool.list.fill_to(self.target);
            }
        }
    }

    /// Drop every pooled instance. Registrations stay, so the lists refill on
    /// the next `check_pool`.
    pub fn clear(&self) {
        for pool in self.pools.read().values() {
            pool.list.clear();
        }
    }

    pub fn stats(&self) -> PoolStats {
        let pooled = self.pools.read().values().map(|pool| pool.list.len()).sum();
        PoolStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            pooled,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_fields;
    use crate::schema::FieldDescriptor;

    #[derive(Debug, Default, Clone, PartialEq)]
    struct Player {
        uid: String,
        health: i32,
        tags: Vec<String>,
    }

    impl Record for Player {
        const TYPE_NAME: &'static str = "pool::Player";
        fn fields() -> Vec<FieldDescriptor<Self>> {
            record_fields!(Player { uid, health, tags })
        }
    }

    #[test]
    fn test_unregistered_type_allocates() {
        let pool = ObjectPool::new(4);
        let schema = Schema::<Player>::of().unwrap();
        let source = Player { uid: "p1".into(), health: 1, tags: vec![] };
        assert_eq!(pool.copy_of(&source, &schema), source);
        assert_eq!(pool.stats(), PoolStats { hits: 0, misses: 1, pooled: 0 });

        pool.recycle(source);
        assert_eq!(pool.stats().pooled, 0);
    }

    #[test]
    fn test_check_pool_fills_to_target() {
        let pool = ObjectPool::new(4);
        pool.register::<Player>();
        assert_eq!(pool.stats().pooled, 0);

        pool.check_pool();
        assert_eq!(pool.stats().pooled, 4);

        let schema = Schema::<Player>::of().unwrap();
        let _ = pool.copy_of(&Player::default(), &schema);
        assert_eq!(pool.stats().hits, 1);
        assert_eq!(pool.stats().pooled, 3);
    }

    #[test]
    fn test_clone_is_independent() {
        let pool = ObjectPool::new(2);
        pool.register::<Player>();
        pool.check_pool();

        let schema = Schema::<Player>::of().unwrap();
        let source = Player { uid: "p1".into(), health: 5, tags: vec!["a".into()] };
        let mut copy = pool.copy_of(&source, &schema);
        assert_eq!(copy, source);

        copy.tags.push("b".into());
        copy.health = 0;
        assert_eq!(source.tags, vec!["a".to_string()]);
        assert_eq!(source.health, 5);
    }

    #[test]
    fn test_idle_pool_shrinks() {
        let pool = ObjectPool::new(8);
        pool.register::<Player>();
        pool.check_pool();
        assert_eq!(pool.stats().pooled, 8);

        for _ in 0..IDLE_CHECKS_BEFORE_SHRINK {
            pool.check_pool();
        }
        assert_eq!(pool.stats().pooled, 2);

        // activity resets the idle run and the list grows back
        let schema = Schema::<Player>::of().unwrap();
        let _ = pool.copy_of(&Player::default(), &schema);
        pool.check_pool();
        assert_eq!(pool.stats().pooled, 8);
    }

    #[test]
    fn test_recycle_respects_target() {
        let pool = ObjectPool::new(1);
        pool.register::<Player>();

        pool.recycle(Player { uid: "x".into(), health: 9, tags: vec![] });
        pool.recycle(Player::default());
        assert_eq!(pool.stats().pooled, 1);
    }

    #[test]
    fn test_acquire_resets_recycled_instance() {
        let pool = ObjectPool::new(2);
        pool.register::<Player>();

        let mut old = Player { uid: "x".into(), health: 9, tags: Vec::with_capacity(32) };
        old.tags.push("t".into());
        pool.recycle(old);

        let reused = pool.acquire::<Player>();
        assert_eq!(reused, Player::default());
        assert!(reused.tags.capacity() >= 32);
        assert_eq!(pool.stats().hits, 1);
    }

    #[test]
    fn test_recycled_instance_is_reused_with_its_buffers() {
        let pool = ObjectPool::new(4);
        pool.register::<Player>();
        let schema = Schema::<Player>::of().unwrap();

        let mut old = Player { uid: "old".into(), health: 9, tags: Vec::with_capacity(64) };
        old.tags.push("stale".into());
        pool.recycle(old);

        let source = Player { uid: "p2".into(), health: 3, tags: vec!["fresh".into()] };
        let copy = pool.copy_of(&source, &schema);
        assert_eq!(copy, source);
        assert!(copy.tags.capacity() >= 64);
        assert_eq!(pool.stats(), PoolStats { hits: 1, misses: 0, pooled: 0 });
    }

    #[test]
    fn test_clear_keeps_registrations() {
        let pool = ObjectPool::new(3);
        pool.register::<Player>();
        pool.check_pool();
        pool.clear();
        assert_eq!(pool.stats().pooled, 0);

        pool.check_pool();
        assert_eq!(pool.stats().pooled, 3);
    }
}
