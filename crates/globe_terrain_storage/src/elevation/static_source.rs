use super::queue::ReplyQueue;
use super::{ElevationQueries, ElevationSink, ModelQuery, NodeQuery, NO_DATA};
use crate::NodeId;

use std::sync::atomic::{AtomicUsize, Ordering};

/// A synchronous elevation source that answers every query from a function of `(lon, lat)`.
///
/// Replies are still delivered through `process_replies`, so the surface sees them at the same point in the frame as it would
/// with a networked source. Useful for procedural terrain and for tests.
pub struct StaticElevation<F> {
    elevation: F,
    model: Option<ModelQuery>,
    replies: ReplyQueue,
    num_queries: AtomicUsize,
}

impl<F> StaticElevation<F>
where
    F: Fn(i32, i32) -> Option<(i32, i32)> + Send + Sync,
{
    /// `elevation` returns `(h, dh)` in elevation units, or `None` where there is no data.
    pub fn new(model: Option<ModelQuery>, elevation: F) -> Self {
        Self {
            elevation,
            model,
            replies: ReplyQueue::new(),
            num_queries: AtomicUsize::new(0),
        }
    }

    /// Total queries received so far.
    pub fn num_queries(&self) -> usize {
        self.num_queries.load(Ordering::Relaxed)
    }
}

impl<F> ElevationQueries for StaticElevation<F>
where
    F: Fn(i32, i32) -> Option<(i32, i32)> + Send + Sync,
{
    fn model_query(&self) -> Option<ModelQuery> {
        self.model
    }

    fn add_query(&self, query: NodeQuery) {
        self.num_queries.fetch_add(1, Ordering::Relaxed);
        let (h, dh) = (self.elevation)(query.lon, query.lat).unwrap_or((NO_DATA, 0));
        self.replies.push(&query.reply(h, dh));
    }

    fn remove_queries(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut sorted = nodes.to_vec();
        sorted.sort_unstable();
        let mut removed = Vec::new();
        self.replies.cancel(&sorted, &mut removed);
        removed.sort_unstable();
        removed.dedup();

        removed
    }

    fn process_replies(&self, sink: &mut dyn ElevationSink) {
        self.replies.drain_into(sink);
    }

    fn refresh_priorities(&self, _priority: &dyn Fn(NodeId) -> Option<i32>) {}

    fn close(&self) {}
}
