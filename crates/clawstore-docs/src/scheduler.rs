//! Write-back scheduler: paced flushing of stale documents
//!
//! Inserts only touch RAM. The scheduler moves stale documents to disk in two
//! ways, both under one write-in-progress lock:
//!
//! 1. **Full write** every `persist_every`: scan every collection, persist
//!    every stale document, and remember how many there were.
//! 2. **Partial writes** `partial_writes_per_second` times a second between
//!    full writes: drain the pending queue (fed by inserts) at the rate implied
//!    by the stale count seen at the last full write, so the I/O of one
//!    interval is spread across it instead of arriving in one burst.
//!
//! Documents that go stale after a full write are only guaranteed to be
//! written by the next one; partial writes are a smoothing device.
//!
//! The scheduler itself is passive. [`start_ticker`] runs the background
//! thread that feeds it real elapsed time and resizes the object pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use hashbrown::HashSet;
use parking_lot::Mutex;
use tracing::{debug, error, info};

use crate::collection::{Collection, Collections};
use crate::config::Config;
use crate::document::Document;
use crate::error::{DocError, DocResult};
use crate::persistence::Persistence;
use crate::pool::ObjectPool;

/// `(collection, uid)`
pub type DocKey = (String, String);

/// What the scheduler is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SchedulerState {
    Idle = 0,
    FullWriteInProgress = 1,
    PartialWriteInProgress = 2,
}

impl SchedulerState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SchedulerState::FullWriteInProgress,
            2 => SchedulerState::PartialWriteInProgress,
            _ => SchedulerState::Idle,
        }
    }
}

/// Result of one write pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Documents written
    pub written: usize,
    /// Documents that failed and remain stale
    pub failed: usize,
    /// Queued documents that had been deleted, replaced or already written
    pub skipped: usize,
}

/// What a call to [`WriteBackScheduler::tick`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    FullWrite(FlushReport),
    PartialWrite(FlushReport),
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    pub full_writes: u64,
    pub partial_writes: u64,
    pub documents_written: u64,
    pub write_failures: u64,
}

/// Guarded by the write-in-progress lock.
#[derive(Debug, Default)]
struct Pacing {
    stale_at_last_full_write: usize,
    written_since_last_full_write: usize,
}

#[derive(Debug, Default)]
struct Clock {
    since_full: Duration,
    since_partial: Duration,
}

/// FIFO of documents waiting for a partial write, without duplicates.
#[derive(Debug, Default)]
struct PendingQueue {
    order: VecDeque<DocKey>,
    members: HashSet<DocKey>,
}

impl PendingQueue {
    fn push(&mut self, key: DocKey) {
        if self.members.insert(key.clone()) {
            self.order.push_back(key);
        }
    }

    fn pop(&mut self) -> Option<DocKey> {
        let key = self.order.pop_front()?;
        self.members.remove(&key);
        Some(key)
    }

    fn retain(&mut self, mut keep: impl FnMut(&DocKey) -> bool) {
        let members = &mut self.members;
        self.order.retain(|key| {
            let kept = keep(key);
            if !kept {
                members.remove(key);
            }
            kept
        });
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn clear(&mut self) {
        self.order.clear();
        self.members.clear();
    }
}

#[derive(Debug, Default)]
struct Counters {
    full_writes: AtomicU64,
    partial_writes: AtomicU64,
    documents_written: AtomicU64,
    write_failures: AtomicU64,
}

/// Paces stale documents onto disk.
pub struct WriteBackScheduler {
    collections: Arc<Collections>,
    persistence: Arc<Persistence>,
    persist_every: Duration,
    partial_interval: Duration,
    write_lock: Mutex<Pacing>,
    pending: Mutex<PendingQueue>,
    clock: Mutex<Clock>,
    state: AtomicU8,
    counters: Counters,
}

impl WriteBackScheduler {
    pub fn new(collections: Arc<Collections>, persistence: Arc<Persistence>, config: &Config) -> Self {
        Self {
            collections,
            persistence,
            persist_every: config.persist_every,
            partial_interval: config.partial_write_interval(),
            write_lock: Mutex::new(Pacing::default()),
            pending: Mutex::new(PendingQueue::default()),
            clock: Mutex::new(Clock::default()),
            state: AtomicU8::new(SchedulerState::Idle as u8),
            counters: Counters::default(),
        }
    }

    /// Queue a freshly stale document for partial writes. Never blocks on a
    /// write in progress.
    pub fn enqueue(&self, collection: &str, uid: &str) {
        self.pending.lock().push((collection.to_string(), uid.to_string()));
    }

    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn state(&self) -> SchedulerState {
        SchedulerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            full_writes: self.counters.full_writes.load(Ordering::Relaxed),
            partial_writes: self.counters.partial_writes.load(Ordering::Relaxed),
            documents_written: self.counters.documents_written.load(Ordering::Relaxed),
            write_failures: self.counters.write_failures.load(Ordering::Relaxed),
        }
    }

    /// Stale count recorded by the last full write (or forced flush).
    pub fn stale_at_last_full_write(&self) -> usize {
        self.write_lock.lock().stale_at_last_full_write
    }

    /// Advance the scheduler clock by `elapsed` and run whichever write is due.
    pub fn tick(&self, elapsed: Duration) -> TickOutcome {
        enum Due {
            Nothing,
            Full,
            Partial(Duration),
        }

        let due = {
            let mut clock = self.clock.lock();
            clock.since_full += elapsed;
            clock.since_partial += elapsed;

            if clock.since_full >= self.persist_every {
                // reset before writing so a slow write cannot queue a backlog of full writes
                *clock = Clock::default();
                Due::Full
            } else if clock.since_partial >= self.partial_interval {
                clock.since_partial = Duration::ZERO;
                Due::Partial(clock.since_full)
            } else {
                Due::Nothing
            }
        };

        match due {
            Due::Nothing => TickOutcome::Idle,
            Due::Full => {
                let mut pacing = self.write_lock.lock();
                TickOutcome::FullWrite(self.full_write(&mut pacing))
            }
            Due::Partial(since_full) => {
                let mut pacing = self.write_lock.lock();
                TickOutcome::PartialWrite(self.partial_write(&mut pacing, since_full))
            }
        }
    }

    /// Persist every stale document now. Used on shutdown.
    pub fn flush_now(&self) -> DocResult<FlushReport> {
        let mut pacing = self.write_lock.lock();
        let mut first_error = None;
        let report = self.full_write_inner(&mut pacing, &mut first_error);

        match first_error {
            Some(first_error) => Err(DocError::FlushIncomplete {
                written: report.written,
                failed: report.failed,
                first_error: Box::new(first_error),
            }),
            None => Ok(report),
        }
    }

    /// Run `f` with writes excluded, then forget all queued work and pacing.
    pub fn with_writes_paused<R>(&self, f: impl FnOnce() -> R) -> R {
        let mut pacing = self.write_lock.lock();
        let result = f();
        *pacing = Pacing::default();
        self.pending.lock().clear();
        result
    }

    fn full_write(&self, pacing: &mut Pacing) -> FlushReport {
        let mut first_error = None;
        self.full_write_inner(pacing, &mut first_error)
    }

    fn full_write_inner(&self, pacing: &mut Pacing, first_error: &mut Option<DocError>) -> FlushReport {
        self.set_state(SchedulerState::FullWriteInProgress);

        // Recompute the stale set from scratch
        let stale: Vec<(Arc<Collection>, Arc<Document>)> = self
            .collections
            .all()
            .into_iter()
            .flat_map(|collection| {
                collection
                    .stale_documents()
                    .into_iter()
                    .map(move |doc| (Arc::clone(&collection), doc))
                    .collect::<Vec<_>>()
            })
            .collect();
        pacing.stale_at_last_full_write = stale.len();

        let mut report = FlushReport::default();
        for (collection, doc) in &stale {
            match self.persist(collection, doc) {
                Ok(true) => report.written += 1,
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    report.failed += 1;
                    self.enqueue(collection.name(), doc.uid());
                    first_error.get_or_insert(e);
                }
            }
        }
        pacing.written_since_last_full_write = 0;

        // Anything written here no longer needs a partial write
        let collections = &self.collections;
        self.pending.lock().retain(|(name, uid)| {
            collections
                .lookup(name)
                .and_then(|c| c.get(uid))
                .map_or(false, |doc| doc.is_stale())
        });

        self.counters.full_writes.fetch_add(1, Ordering::Relaxed);
        self.set_state(SchedulerState::Idle);

        if report.written > 0 || report.failed > 0 {
            info!(written = report.written, failed = report.failed, "full write complete");
        }
        report
    }

    fn partial_write(&self, pacing: &mut Pacing, since_full: Duration) -> FlushReport {
        let mut report = FlushReport::default();

        let elapsed = since_full.min(self.persist_every).as_nanos();
        let interval = self.persist_every.as_nanos().max(1);
        let target = (pacing.stale_at_last_full_write as u128 * elapsed / interval) as usize;
        let to_write = target.saturating_sub(pacing.written_since_last_full_write);
        if to_write == 0 {
            return report;
        }

        self.set_state(SchedulerState::PartialWriteInProgress);

        // Each queued key is looked at once per pass
        let budget = self.pending.lock().len();
        for _ in 0..budget {
            if report.written >= to_write {
                break;
            }
            let Some((name, uid)) = self.pending.lock().pop() else {
                break;
            };

            let Some(collection) = self.collections.lookup(&name) else {
                report.skipped += 1;
                continue;
            };
            let Some(doc) = collection.get(&uid).filter(|doc| doc.is_stale()) else {
                report.skipped += 1;
                continue;
            };

            match self.persist(&collection, &doc) {
                Ok(true) => {
                    report.written += 1;
                    pacing.written_since_last_full_write += 1;
                }
                Ok(false) => report.skipped += 1,
                Err(_) => {
                    report.failed += 1;
                    self.enqueue(&name, &uid);
                }
            }
        }

        self.counters.partial_writes.fetch_add(1, Ordering::Relaxed);
        self.set_state(SchedulerState::Idle);

        debug!(written = report.written, target = to_write, "partial write complete");
        report
    }

    /// Write one document and clear its stale flag on success.
    fn persist(&self, collection: &Collection, doc: &Document) -> DocResult<bool> {
        match self.persistence.save_document(collection, doc) {
            Ok(written) => {
                if written {
                    doc.mark_clean();
                    self.counters.documents_written.fetch_add(1, Ordering::Relaxed);
                }
                Ok(written)
            }
            Err(e) => {
                self.counters.write_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    collection = collection.name(),
                    uid = doc.uid(),
                    error = %e,
                    "document write failed, it stays stale"
                );
                Err(e)
            }
        }
    }

    fn set_state(&self, state: SchedulerState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

/// Handle to the running ticker thread.
/// Dropping this handle stops the thread.
pub struct TickerHandle {
    shutdown: Arc<AtomicBool>,
    thread: Option<thread::JoinHandle<()>>,
}

impl TickerHandle {
    /// Stop ticking and wait for the thread to exit. A write already in
    /// progress finishes first.
    pub fn shutdown(mut self) {
        self.stop();
    }

    pub fn is_running(&self) -> bool {
        self.thread.as_ref().map_or(false, |h| !h.is_finished())
    }

    fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            handle.thread().unpark();
            let _ = handle.join();
        }
    }
}

impl Drop for TickerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Start the background ticker.
///
/// Every `tick_interval` the thread feeds the real elapsed time to
/// `scheduler.tick`, and every `pool_check_interval` it calls
/// `pool.check_pool()`.
pub fn start_ticker(
    scheduler: Arc<WriteBackScheduler>,
    pool: Arc<ObjectPool>,
    config: &Config,
) -> DocResult<TickerHandle> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_clone = Arc::clone(&shutdown);
    let tick_interval = config.tick_interval;
    let pool_interval = config.pool_check_interval;

    let thread = thread::Builder::new()
        .name("clawstore-docs-ticker".to_string())
        .spawn(move || ticker_loop(scheduler, pool, tick_interval, pool_interval, shutdown_clone))
        .map_err(|e| DocError::Io {
            path: None,
            kind: e.kind(),
            message: format!("Failed to spawn ticker thread: {}", e),
        })?;

    Ok(TickerHandle { shutdown, thread: Some(thread) })
}

fn ticker_loop(
    scheduler: Arc<WriteBackScheduler>,
    pool: Arc<ObjectPool>,
    tick_interval: Duration,
    pool_interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    debug!(?tick_interval, "ticker started");
    let mut last = Instant::now();
    let mut since_pool_check = Duration::ZERO;

    while !shutdown.load(Ordering::Acquire) {
        thread::park_timeout(tick_interval);
        if shutdown.load(Ordering::Acquire) {
            break;
        }

        let now = Instant::now();
        let elapsed = now - last;
        last = now;

        scheduler.tick(elapsed);

        since_pool_check += elapsed;
        if since_pool_check >= pool_interval {
            since_pool_check = Duration::ZERO;
            pool.check_pool();
        }
    }
    debug!("ticker stopped");
}
