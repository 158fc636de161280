//! Fetching node elevations in the background.
//!
//! The surface posts one `NodeQuery` per new node. An `ElevationSource` answers them from two tiers: a local persistent
//! `ElevationCache` and a remote server reached through an `ElevationTransport`. Each tier has its own query queue and worker
//! threads. Answers land in a shared reply queue that the surface drains once per frame with `process_replies`.
//!
//! `StaticElevation` is a synchronous stand-in that answers every query from a closure.

pub mod cache;
pub mod config;
pub mod error;
pub mod protocol;
pub mod queue;
pub mod server;
pub mod source;
pub mod static_source;
pub mod transport;

pub use cache::*;
pub use config::*;
pub use error::*;
pub use protocol::{ModelQuery, ModelType, NO_DATA};
pub use source::*;
pub use static_source::*;
pub use transport::*;

use crate::NodeId;

use auto_impl::auto_impl;

/// Elevation value of a node whose data has not arrived yet.
pub const PENDING: i32 = i32::MIN;
/// Elevation value of a node the sources have no data for. Distinct from `PENDING`.
pub const UNKNOWN: i32 = i32::MIN + 1;

/// A request for the elevation at one surface node.
///
/// The position travels with the query, so workers never read the node arena. `priority` is the node's last-used timestamp;
/// when a fetch round can't take everything, the highest priorities go first.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct NodeQuery {
    pub node: NodeId,
    pub lon: i32,
    pub lat: i32,
    pub priority: i32,
}

/// Record layout of a queued `NodeQuery`. A negative node id marks a cancelled query.
pub(crate) const QUERY_NODE: usize = 0;
pub(crate) const QUERY_LON: usize = 1;
pub(crate) const QUERY_LAT: usize = 2;
pub(crate) const QUERY_PRIORITY: usize = 3;
pub(crate) const QUERY_LEN: usize = 4;

impl NodeQuery {
    #[inline]
    pub(crate) fn to_record(&self) -> [i32; QUERY_LEN] {
        [self.node as i32, self.lon, self.lat, self.priority]
    }

    #[inline]
    pub(crate) fn from_record(r: &[i32]) -> Self {
        Self {
            node: r[QUERY_NODE] as NodeId,
            lon: r[QUERY_LON],
            lat: r[QUERY_LAT],
            priority: r[QUERY_PRIORITY],
        }
    }

    #[inline]
    pub(crate) fn reply(&self, h: i32, dh: i32) -> [i32; REPLY_LEN] {
        [self.node as i32, self.lon, self.lat, h, dh]
    }
}

/// Record layout of a reply. A negative node id marks a cancelled reply.
pub(crate) const REPLY_NODE: usize = 0;
pub(crate) const REPLY_LON: usize = 1;
pub(crate) const REPLY_LAT: usize = 2;
pub(crate) const REPLY_H: usize = 3;
pub(crate) const REPLY_DH: usize = 4;
pub(crate) const REPLY_LEN: usize = 5;

/// Receives elevation replies. Implemented by the surface's node arena.
pub trait ElevationSink {
    /// Integrates one reply for the node at `(lon, lat)`. Implementations must ignore the reply if `node` has since been
    /// freed or reused for another position.
    fn set_node_values(&mut self, node: NodeId, lon: i32, lat: i32, h: i32, dh: i32);
}

/// Everything the surface needs from an elevation source.
#[auto_impl(&, Box, Arc)]
pub trait ElevationQueries: Send + Sync {
    /// The model reported by the server or remembered by the cache.
    fn model_query(&self) -> Option<ModelQuery>;

    fn add_query(&self, query: NodeQuery);

    /// Cancels any queued query or unprocessed reply for `nodes`. Returns each node that had something cancelled, once.
    fn remove_queries(&self, nodes: &[NodeId]) -> Vec<NodeId>;

    /// Drains the reply queue into `sink`. `NO_DATA` replies integrate as `UNKNOWN`.
    fn process_replies(&self, sink: &mut dyn ElevationSink);

    /// Re-stamps every queued query with `priority(node)`. A `None` cancels the query.
    fn refresh_priorities(&self, priority: &dyn Fn(NodeId) -> Option<i32>);

    /// Stops all workers. Further queries are dropped.
    fn close(&self);
}

/// Integrates every live reply in `replies` into `sink` and clears it.
pub(crate) fn drain_replies(replies: &mut crate::RecordArray, sink: &mut dyn ElevationSink) {
    for r in replies.iter() {
        if r[REPLY_NODE] < 0 {
            continue;
        }
        let h = if r[REPLY_H] == NO_DATA {
            UNKNOWN
        } else {
            r[REPLY_H]
        };
        sink.set_node_values(r[REPLY_NODE] as NodeId, r[REPLY_LON], r[REPLY_LAT], h, r[REPLY_DH]);
    }
    replies.clear();
}

/// Tombstones every record in `records` whose node is in `sorted_nodes`, appending the matched ids to `removed`.
pub(crate) fn cancel_records(
    records: &mut crate::RecordArray,
    node_field: usize,
    sorted_nodes: &[NodeId],
    removed: &mut Vec<NodeId>,
) {
    for r in records.iter_mut() {
        let node = r[node_field];
        if node >= 0 && sorted_nodes.binary_search(&(node as NodeId)).is_ok() {
            removed.push(node as NodeId);
            r[node_field] = -1;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use super::protocol::{decode_batch_request, decode_model_reply, encode_batch_reply, encode_model_reply};
    use super::*;

    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    pub struct RecordingSink {
        pub values: Vec<(NodeId, i32, i32, i32, i32)>,
    }

    impl ElevationSink for RecordingSink {
        fn set_node_values(&mut self, node: NodeId, lon: i32, lat: i32, h: i32, dh: i32) {
            self.values.push((node, lon, lat, h, dh));
        }
    }

    /// An in-process elevation server speaking the binary protocol.
    #[derive(Clone)]
    pub struct FakeServer {
        failures: Arc<Mutex<VecDeque<TransportError>>>,
        posts: Arc<AtomicUsize>,
        model_reply: Vec<u8>,
    }

    impl FakeServer {
        pub fn new() -> Self {
            let model = ModelQuery {
                model_type: ModelType::Model4x8,
                a: 6_378_137.0,
                f: 1.0 / 298.257_223_563,
                h_scale: 1.0,
                version: 1,
            };

            Self {
                failures: Default::default(),
                posts: Default::default(),
                model_reply: encode_model_reply(&model),
            }
        }

        /// The elevation served at `(lon, lat)`.
        pub fn elevation(lon: i32, lat: i32) -> (i32, i32) {
            ((lon >> 12) + (lat >> 12), 1)
        }

        /// The model as it reads after the wire round trip.
        pub fn model(&self) -> ModelQuery {
            decode_model_reply(&self.model_reply).unwrap()
        }

        /// The next posts fail with `failures`, in order.
        pub fn fail_next(&self, failures: Vec<TransportError>) {
            self.failures.lock().unwrap().extend(failures);
        }

        pub fn num_posts(&self) -> usize {
            self.posts.load(Ordering::SeqCst)
        }
    }

    impl ElevationTransport for FakeServer {
        fn post(&self, body: &[u8]) -> Result<Vec<u8>, TransportError> {
            self.posts.fetch_add(1, Ordering::SeqCst);
            if let Some(failure) = self.failures.lock().unwrap().pop_front() {
                return Err(failure);
            }
            if body == protocol::model_query_request().as_slice() {
                return Ok(self.model_reply.clone());
            }
            let (sequence, keys) = decode_batch_request(body).ok_or(TransportError::Status(400))?;
            let values: Vec<(i32, i32)> = keys
                .iter()
                .map(|k| {
                    let (lon, lat) = k.lon_lat();
                    Self::elevation(lon, lat)
                })
                .collect();

            Ok(encode_batch_reply(sequence, &values))
        }
    }
}
