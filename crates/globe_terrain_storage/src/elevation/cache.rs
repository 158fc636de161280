use super::config::ElevationSourceConfig;
use super::queue::{by_key, QueryQueue, ReplyQueue};
use super::{CacheError, ModelQuery, NodeQuery, NO_DATA, QUERY_LEN, REPLY_LEN};
use crate::{sync::lock_or_recover, RecordArray, SmallKeyHashMap};

use auto_impl::auto_impl;
use globe_terrain_core::{compare_code, Morton2};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A persistent store of `(elevation, uncertainty)` pairs keyed by the Morton code of the position.
///
/// Writes may be buffered until `commit`.
#[auto_impl(&mut, Box)]
pub trait ElevationCache: Send {
    fn get(&self, key: Morton2) -> Result<Option<(i32, i32)>, CacheError>;

    fn set(&mut self, key: Morton2, h: i32, dh: i32) -> Result<(), CacheError>;

    fn commit(&mut self) -> Result<(), CacheError>;

    /// The model that the cached values came from, if one was ever stored.
    fn model_query(&self) -> Result<Option<ModelQuery>, CacheError>;

    fn set_model_query(&mut self, model: &ModelQuery) -> Result<(), CacheError>;
}

/// An `ElevationCache` that lives only as long as the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryElevationCache {
    records: SmallKeyHashMap<Morton2, (i32, i32)>,
    model: Option<ModelQuery>,
    num_commits: usize,
}

impl MemoryElevationCache {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn num_commits(&self) -> usize {
        self.num_commits
    }
}

impl ElevationCache for MemoryElevationCache {
    fn get(&self, key: Morton2) -> Result<Option<(i32, i32)>, CacheError> {
        Ok(self.records.get(&key).copied())
    }

    fn set(&mut self, key: Morton2, h: i32, dh: i32) -> Result<(), CacheError> {
        self.records.insert(key, (h, dh));

        Ok(())
    }

    fn commit(&mut self) -> Result<(), CacheError> {
        self.num_commits += 1;

        Ok(())
    }

    fn model_query(&self) -> Result<Option<ModelQuery>, CacheError> {
        Ok(self.model)
    }

    fn set_model_query(&mut self, model: &ModelQuery) -> Result<(), CacheError> {
        self.model = Some(*model);

        Ok(())
    }
}

/// Record layout of a pending cache write.
const WRITE_LON: usize = 0;
const WRITE_LAT: usize = 1;
const WRITE_H: usize = 2;
const WRITE_DH: usize = 3;
pub(crate) const WRITE_LEN: usize = 4;

/// The cache tier of an `ElevationSource`: its query queue, the store, and the server values waiting to be written back.
pub(crate) struct CacheTier {
    pub queue: QueryQueue,
    store: Mutex<Box<dyn ElevationCache>>,
    writes: Mutex<RecordArray>,
    pending_writes: AtomicUsize,
}

impl CacheTier {
    pub fn new(store: Box<dyn ElevationCache>) -> Self {
        Self {
            queue: QueryQueue::new(),
            store: Mutex::new(store),
            writes: Mutex::new(RecordArray::new(WRITE_LEN)),
            pending_writes: AtomicUsize::new(0),
        }
    }

    pub fn with_store<R>(&self, f: impl FnOnce(&mut dyn ElevationCache) -> R) -> R {
        let mut store = lock_or_recover(&self.store);

        f(&mut **store)
    }

    #[inline]
    pub fn pending_writes(&self) -> usize {
        self.pending_writes.load(Ordering::Acquire)
    }

    /// Queues server values for writeback and wakes the cache worker.
    pub fn push_writes(&self, new_writes: &RecordArray) {
        if new_writes.is_empty() {
            return;
        }
        {
            let mut writes = lock_or_recover(&self.writes);
            writes.extend_from_range(new_writes, 0, new_writes.len());
            self.pending_writes.store(writes.len(), Ordering::Release);
        }
        self.queue.notify();
    }

    /// One round of the cache worker: answer a batch of queries in Morton order, then spend what is left of the time budget
    /// writing back server values. Misses go to `forward` when there is a server, otherwise they are answered with `NO_DATA`.
    pub fn run_round(&self, config: &ElevationSourceConfig, forward: Option<&QueryQueue>, replies: &ReplyQueue) {
        let start = Instant::now();
        let max = config.cache_round_max_queries;
        let budget = config.cache_round_time_budget;

        let mut batch = self.queue.take(max);
        batch.sort_by(by_key);

        let mut store = lock_or_recover(&self.store);
        let mut answered = RecordArray::with_capacity(REPLY_LEN, batch.len());
        for i in 0..batch.len() {
            if i > max / 20 && i % 50 == 0 && start.elapsed() > budget {
                tracing::debug!("Cache round over budget; requeueing {} queries", batch.len() - i);
                self.queue.requeue(&batch, i);
                break;
            }
            let query = NodeQuery::from_record(batch.get(i));
            let key = Morton2::from_lon_lat(query.lon, query.lat);
            let hit = store.get(key).unwrap_or_else(|e| {
                tracing::warn!("Elevation cache read failed: {}", e);
                None
            });
            match hit {
                Some((h, dh)) => answered.push(&query.reply(h, dh)),
                None => {
                    let forwarded = forward.map_or(false, |server| server.add(&query));
                    if !forwarded {
                        answered.push(&query.reply(NO_DATA, 0));
                    }
                }
            }
        }
        replies.extend(&answered);

        if start.elapsed() < budget && batch.len() < max {
            self.write_back(&mut **store, max - batch.len(), start, budget);
        }
        if let Err(e) = store.commit() {
            tracing::error!("Elevation cache commit failed: {}", e);
        }
    }

    fn write_back(&self, store: &mut dyn ElevationCache, limit: usize, start: Instant, budget: Duration) {
        let mut writes = lock_or_recover(&self.writes);
        // Descending, so popping from the back writes in ascending key order.
        writes.sort_by(|a, b| compare_code(b[WRITE_LON], b[WRITE_LAT], a[WRITE_LON], a[WRITE_LAT]));

        let mut record = [0; WRITE_LEN];
        let mut written = 0;
        while written < limit && writes.pop_into(&mut record) {
            let key = Morton2::from_lon_lat(record[WRITE_LON], record[WRITE_LAT]);
            if let Err(e) = store.set(key, record[WRITE_H], record[WRITE_DH]) {
                tracing::warn!("Elevation cache write failed: {}", e);
            }
            written += 1;
            if written % 50 == 0 && start.elapsed() > budget {
                break;
            }
        }
        self.pending_writes.store(writes.len(), Ordering::Release);
    }
}

/// A cache write for the position of query record `q`.
#[inline]
pub(crate) fn write_record(q: &[i32], h: i32, dh: i32) -> [i32; WRITE_LEN] {
    debug_assert_eq!(q.len(), QUERY_LEN);
    [q[super::QUERY_LON], q[super::QUERY_LAT], h, dh]
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
