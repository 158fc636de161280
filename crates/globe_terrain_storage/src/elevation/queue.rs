use super::{
    cancel_records, NodeQuery, QUERY_LAT, QUERY_LEN, QUERY_LON, QUERY_NODE, QUERY_PRIORITY, REPLY_LEN, REPLY_NODE,
};
use crate::{sync::lock_or_recover, NodeId, RecordArray};

use core::cmp::Ordering;
use globe_terrain_core::compare_code;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Condvar, Mutex};

/// Orders query records by Morton code, cancelled records last.
pub(crate) fn by_key(a: &[i32], b: &[i32]) -> Ordering {
    match (a[QUERY_NODE] < 0, b[QUERY_NODE] < 0) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => compare_code(a[QUERY_LON], a[QUERY_LAT], b[QUERY_LON], b[QUERY_LAT]),
    }
}

/// Orders query records so that popping from the back yields the highest priority first. Cancelled records sort to the back
/// too, where they are skipped. Ties break on Morton code.
pub(crate) fn by_priority(a: &[i32], b: &[i32]) -> Ordering {
    match (a[QUERY_NODE] < 0, b[QUERY_NODE] < 0) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a[QUERY_PRIORITY]
            .cmp(&b[QUERY_PRIORITY])
            .then_with(|| compare_code(a[QUERY_LON], a[QUERY_LAT], b[QUERY_LON], b[QUERY_LAT])),
    }
}

/// A blocking multi-producer queue of `NodeQuery` records, shared by the surface and one tier's workers.
pub(crate) struct QueryQueue {
    queries: Mutex<RecordArray>,
    wakeup: Condvar,
    enabled: AtomicBool,
}

impl QueryQueue {
    pub fn new() -> Self {
        Self {
            queries: Mutex::new(RecordArray::new(QUERY_LEN)),
            wakeup: Condvar::new(),
            enabled: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(AtomicOrdering::Acquire)
    }

    /// Disables the queue and wakes every waiting worker so it can exit.
    pub fn close(&self) {
        self.enabled.store(false, AtomicOrdering::Release);
        let _queries = lock_or_recover(&self.queries);
        self.wakeup.notify_all();
    }

    /// Wakes one waiting worker without adding a query.
    pub fn notify(&self) {
        let _queries = lock_or_recover(&self.queries);
        self.wakeup.notify_one();
    }

    /// Returns `false` if the queue is disabled and the query was not taken.
    pub fn add(&self, query: &NodeQuery) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let mut queries = lock_or_recover(&self.queries);
        queries.push(&query.to_record());
        self.wakeup.notify_one();

        true
    }

    /// Puts records `[from, len)` of `batch` back on the queue.
    pub fn requeue(&self, batch: &RecordArray, from: usize) {
        let mut queries = lock_or_recover(&self.queries);
        queries.extend_from_range(batch, from, batch.len());
        self.wakeup.notify_one();
    }

    pub fn len(&self) -> usize {
        lock_or_recover(&self.queries).len()
    }

    /// Blocks until the queue has queries or `has_other_work` holds. Returns `false` once the queue is disabled.
    pub fn wait_for_work(&self, has_other_work: impl Fn() -> bool) -> bool {
        let mut queries = lock_or_recover(&self.queries);
        while self.is_enabled() && queries.is_empty() && !has_other_work() {
            queries = self
                .wakeup
                .wait(queries)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }

        self.is_enabled()
    }

    /// Takes up to `max` live queries, highest priority first when there are more than `max`.
    pub fn take(&self, max: usize) -> RecordArray {
        let mut queries = lock_or_recover(&self.queries);
        let mut batch = RecordArray::with_capacity(QUERY_LEN, max.min(queries.len()));
        if queries.len() > max {
            queries.sort_by(by_priority);
        }
        let mut record = [0; QUERY_LEN];
        while batch.len() < max && queries.pop_into(&mut record) {
            if record[QUERY_NODE] >= 0 {
                batch.push(&record);
            }
        }

        batch
    }

    /// Tombstones every queued query for a node in `sorted_nodes`.
    pub fn cancel(&self, sorted_nodes: &[NodeId], removed: &mut Vec<NodeId>) {
        let mut queries = lock_or_recover(&self.queries);
        cancel_records(&mut queries, QUERY_NODE, sorted_nodes, removed);
    }

    pub fn refresh_priorities(&self, priority: &dyn Fn(NodeId) -> Option<i32>) {
        let mut queries = lock_or_recover(&self.queries);
        for r in queries.iter_mut() {
            if r[QUERY_NODE] < 0 {
                continue;
            }
            match priority(r[QUERY_NODE] as NodeId) {
                Some(p) => r[QUERY_PRIORITY] = p,
                None => r[QUERY_NODE] = -1,
            }
        }
        queries.retain(|r| r[QUERY_NODE] >= 0);
    }
}

/// The replies waiting for the surface to pick them up.
pub(crate) struct ReplyQueue {
    replies: Mutex<RecordArray>,
}

impl ReplyQueue {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(RecordArray::new(REPLY_LEN)),
        }
    }

    pub fn push(&self, reply: &[i32; REPLY_LEN]) {
        lock_or_recover(&self.replies).push(reply);
    }

    pub fn extend(&self, replies: &RecordArray) {
        lock_or_recover(&self.replies).extend_from_range(replies, 0, replies.len());
    }

    pub fn drain_into(&self, sink: &mut dyn super::ElevationSink) {
        // Swap out the replies so workers aren't blocked while the sink integrates them.
        let mut drained = {
            let mut replies = lock_or_recover(&self.replies);
            std::mem::replace(&mut *replies, RecordArray::new(REPLY_LEN))
        };
        super::drain_replies(&mut drained, sink);
    }

    pub fn cancel(&self, sorted_nodes: &[NodeId], removed: &mut Vec<NodeId>) {
        let mut replies = lock_or_recover(&self.replies);
        cancel_records(&mut replies, REPLY_NODE, sorted_nodes, removed);
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝
