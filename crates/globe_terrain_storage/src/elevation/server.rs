use super::cache::{write_record, CacheTier, WRITE_LEN};
use super::config::ElevationSourceConfig;
use super::protocol::{
    decode_batch_reply, decode_model_reply, encode_batch_request, max_batch_len, model_query_request,
};
use super::queue::{by_key, QueryQueue, ReplyQueue};
use super::{ElevationTransport, ModelQuery, NodeQuery, ProtocolError, TransportError, QUERY_LAT, QUERY_LON, REPLY_LEN};
use crate::RecordArray;

use globe_terrain_core::Morton2;
use std::sync::atomic::{AtomicI32, Ordering};

/// The server tier of an `ElevationSource`: its query queue and the transport that batches are posted through.
pub(crate) struct ServerTier {
    pub queue: QueryQueue,
    transport: Box<dyn ElevationTransport>,
    sequence: AtomicI32,
    batch_len: usize,
    request_buffer_size: usize,
    max_attempts: u32,
}

enum Failure {
    /// Counts toward the attempt limit and disables the server once it is exceeded.
    Connection(String),
    /// Counts toward the attempt limit, but only the batch is dropped once it is exceeded.
    Other(String),
}

impl ServerTier {
    pub fn new(transport: Box<dyn ElevationTransport>, config: &ElevationSourceConfig) -> Self {
        Self {
            queue: QueryQueue::new(),
            transport,
            sequence: AtomicI32::new(0),
            batch_len: max_batch_len(config.request_buffer_size),
            request_buffer_size: config.request_buffer_size,
            max_attempts: config.max_attempts,
        }
    }

    pub fn request_buffer_size(&self) -> usize {
        self.request_buffer_size
    }

    /// Asks the server for its model. A server that can't be reached is disabled.
    pub fn model_query(&self) -> Option<ModelQuery> {
        let reply = match self.transport.post(&model_query_request()) {
            Ok(reply) => reply,
            Err(e) => {
                if matches!(e, TransportError::Unreachable(_)) || e.is_connection_failure() {
                    tracing::error!("Disabling elevation server: {}", e);
                    self.queue.close();
                } else {
                    tracing::warn!("Elevation model query failed: {}", e);
                }
                return None;
            }
        };
        match decode_model_reply(&reply) {
            Ok(model) => {
                tracing::info!(
                    "Elevation server model {:?} v{} (a = {}, f = {}, h_scale = {})",
                    model.model_type,
                    model.version,
                    model.a,
                    model.f,
                    model.h_scale
                );
                Some(model)
            }
            Err(e) => {
                tracing::warn!("Bad elevation model reply: {}", e);
                None
            }
        }
    }

    /// One round of a server worker: post a Morton-sorted batch and deliver the answers to `replies`, and to `cache` for
    /// writeback if there is one. `out` is the reusable request buffer.
    pub fn run_round(&self, replies: &ReplyQueue, cache: Option<&CacheTier>, out: &mut Vec<u8>) {
        let mut batch = self.queue.take(self.batch_len);
        if batch.is_empty() {
            return;
        }
        batch.sort_by(by_key);

        let keys: Vec<Morton2> = batch
            .iter()
            .map(|q| Morton2::from_lon_lat(q[QUERY_LON], q[QUERY_LAT]))
            .collect();
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
        encode_batch_request(sequence, &keys, out);

        let values = match self.post_batch(out, sequence, batch.len()) {
            Some(values) => values,
            None => return,
        };

        let mut answered = RecordArray::with_capacity(REPLY_LEN, batch.len());
        let mut writes = RecordArray::with_capacity(WRITE_LEN, if cache.is_some() { batch.len() } else { 0 });
        for (q, (h, dh)) in batch.iter().zip(values) {
            answered.push(&NodeQuery::from_record(q).reply(h, dh));
            if cache.is_some() {
                writes.push(&write_record(q, h, dh));
            }
        }
        replies.extend(&answered);
        if let Some(cache) = cache {
            cache.push_writes(&writes);
        }
    }

    /// Posts `body` until a well-formed reply arrives or the attempt limit is exceeded.
    fn post_batch(&self, body: &[u8], sequence: i32, count: usize) -> Option<Vec<(i32, i32)>> {
        let mut attempts = 0;
        loop {
            if !self.queue.is_enabled() {
                return None;
            }
            let failure = match self.transport.post(body) {
                Ok(bytes) => match decode_batch_reply(&bytes, sequence, count) {
                    Ok(values) => return Some(values.collect()),
                    Err(e @ ProtocolError::ShortReply { .. }) => Failure::Other(e.to_string()),
                    Err(e) => {
                        tracing::warn!("Discarding elevation batch: {}", e);
                        return None;
                    }
                },
                Err(TransportError::Unreachable(message)) => {
                    tracing::error!("Elevation server unreachable, disabling it: {}", message);
                    self.queue.close();
                    return None;
                }
                Err(e) if e.is_connection_failure() => Failure::Connection(e.to_string()),
                Err(e) => Failure::Other(e.to_string()),
            };

            attempts += 1;
            match failure {
                Failure::Connection(message) if attempts > self.max_attempts => {
                    tracing::error!(
                        "{} failed attempts to reach the elevation server, disabling it: {}",
                        attempts,
                        message
                    );
                    self.queue.close();
                    return None;
                }
                Failure::Other(message) if attempts > self.max_attempts => {
                    tracing::warn!("Dropping elevation batch of {} after {} attempts: {}", count, attempts, message);
                    return None;
                }
                Failure::Connection(message) | Failure::Other(message) => {
                    tracing::debug!("Elevation request attempt {} failed: {}", attempts, message);
                }
            }
        }
    }
}

// ████████╗███████╗███████╗████████╗
// ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝
//    ██║   █████╗  ███████╗   ██║
//    ██║   ██╔══╝  ╚════██║   ██║
//    ██║   ███████╗███████║   ██║
//    ╚═╝   ╚══════╝╚══════╝   ╚═╝

#[cfg(test)]
mod test {
    use super::super::test_util::{FakeServer, RecordingSink};
    use super::super::MemoryElevationCache;
    use super::*;

    use pretty_assertions::assert_eq;

    fn add_queries(tier: &ServerTier, n: u32) {
        for node in 0..n {
            tier.queue.add(&NodeQuery {
                node,
                lon: node as i32 * 1000,
                lat: -(node as i32),
                priority: 6,
            });
        }
    }

    #[test]
    fn batch_answers_every_query() {
        let server = FakeServer::new();
        let tier = ServerTier::new(Box::new(server.clone()), &ElevationSourceConfig::default());
        let cache = CacheTier::new(Box::new(MemoryElevationCache::default()));
        let replies = ReplyQueue::new();
        add_queries(&tier, 10);

        tier.run_round(&replies, Some(&cache), &mut Vec::new());

        let mut sink = RecordingSink::default();
        replies.drain_into(&mut sink);
        sink.values.sort_unstable();
        assert_eq!(sink.values.len(), 10);
        for (node, lon, lat, h, dh) in sink.values {
            assert_eq!((lon, lat), (node as i32 * 1000, -(node as i32)));
            assert_eq!((h, dh), FakeServer::elevation(lon, lat));
        }
        assert_eq!(cache.pending_writes(), 10);
    }

    #[test]
    fn transient_failures_are_retried() {
        let server = FakeServer::new();
        server.fail_next(vec![
            TransportError::Transient("refused".into()),
            TransportError::Transient("refused".into()),
        ]);
        let tier = ServerTier::new(Box::new(server.clone()), &ElevationSourceConfig::default());
        let replies = ReplyQueue::new();
        add_queries(&tier, 3);

        tier.run_round(&replies, None, &mut Vec::new());

        let mut sink = RecordingSink::default();
        replies.drain_into(&mut sink);
        assert_eq!(sink.values.len(), 3);
        assert!(tier.queue.is_enabled());
        assert_eq!(server.num_posts(), 3);
    }

    #[test]
    fn too_many_connection_failures_disable_the_server() {
        let server = FakeServer::new();
        server.fail_next((0..6).map(|_| TransportError::Transient("timeout".into())).collect());
        let tier = ServerTier::new(Box::new(server.clone()), &ElevationSourceConfig::default());
        add_queries(&tier, 3);

        tier.run_round(&ReplyQueue::new(), None, &mut Vec::new());

        assert!(!tier.queue.is_enabled());
        assert_eq!(server.num_posts(), 6);
    }

    #[test]
    fn unreachable_disables_immediately() {
        let server = FakeServer::new();
        server.fail_next(vec![TransportError::Unreachable("no route to host".into())]);
        let tier = ServerTier::new(Box::new(server.clone()), &ElevationSourceConfig::default());
        add_queries(&tier, 1);

        tier.run_round(&ReplyQueue::new(), None, &mut Vec::new());

        assert!(!tier.queue.is_enabled());
        assert_eq!(server.num_posts(), 1);
    }

    #[test]
    fn status_errors_drop_the_batch_but_keep_the_server() {
        let server = FakeServer::new();
        server.fail_next((0..6).map(|_| TransportError::Status(503)).collect());
        let tier = ServerTier::new(Box::new(server.clone()), &ElevationSourceConfig::default());
        let replies = ReplyQueue::new();
        add_queries(&tier, 2);

        tier.run_round(&replies, None, &mut Vec::new());

        let mut sink = RecordingSink::default();
        replies.drain_into(&mut sink);
        assert!(sink.values.is_empty());
        assert!(tier.queue.is_enabled());
    }

    #[test]
    fn model_query_reads_the_server_model() {
        let server = FakeServer::new();
        let tier = ServerTier::new(Box::new(server.clone()), &ElevationSourceConfig::default());

        assert_eq!(tier.model_query(), Some(server.model()));
    }
}
