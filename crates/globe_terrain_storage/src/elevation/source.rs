use super::cache::CacheTier;
use super::queue::ReplyQueue;
use super::server::ServerTier;
use super::{
    CacheError, ElevationCache, ElevationError, ElevationQueries, ElevationSink, ElevationSourceConfig,
    ElevationTransport, HttpTransport, ModelQuery, NodeQuery, NO_DATA,
};
use crate::{sync::lock_or_recover, NodeId};

use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

struct Shared {
    config: ElevationSourceConfig,
    server: Option<ServerTier>,
    cache: Option<CacheTier>,
    replies: ReplyQueue,
}

impl Shared {
    fn close_queues(&self) {
        if let Some(server) = &self.server {
            server.queue.close();
        }
        if let Some(cache) = &self.cache {
            cache.queue.close();
        }
    }
}

/// The two-tier elevation pipeline: a local cache in front of a remote server.
///
/// Queries go to the cache first. Cache misses are forwarded to the server, and server answers are written back to the cache
/// in the background. Without a cache, queries go straight to the server. A query that no tier can take is answered with
/// `NO_DATA` right away, so the node never stays pending.
///
/// Dropping the source stops and joins all workers.
pub struct ElevationSource {
    shared: Arc<Shared>,
    model: Option<ModelQuery>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ElevationSource {
    /// Queries the server model, opens the cache with it and starts the workers.
    ///
    /// The model comes from the server when it answers and from the cache otherwise. A server that can't be reached at
    /// startup is left out entirely.
    pub fn open(
        config: ElevationSourceConfig,
        transport: Option<Box<dyn ElevationTransport>>,
        cache: Option<Box<dyn ElevationCache>>,
    ) -> Result<Self, ElevationError> {
        let server = transport.map(|t| ServerTier::new(t, &config));
        let server_model = server.as_ref().and_then(|s| s.model_query());
        let server = server.filter(|s| s.queue.is_enabled());

        let cache = cache.map(CacheTier::new);
        let cache_model = match &cache {
            Some(cache) => cache.with_store(|store| -> Result<_, CacheError> {
                if let Some(model) = &server_model {
                    store.set_model_query(model)?;
                    store.commit()?;
                }
                store.model_query()
            })?,
            None => None,
        };

        let model = server_model.or(cache_model);
        if model.is_none() {
            tracing::error!("Unable to open either cache or server connection for elevations");
        }

        let shared = Arc::new(Shared {
            config,
            server,
            cache,
            replies: ReplyQueue::new(),
        });
        let workers = spawn_workers(&shared).map_err(|e| {
            shared.close_queues();
            e
        })?;

        Ok(Self {
            shared,
            model,
            workers: Mutex::new(workers),
        })
    }

    /// Opens a source backed by an HTTP elevation server at `url`.
    pub fn connect(
        url: &str,
        config: ElevationSourceConfig,
        cache: Option<Box<dyn ElevationCache>>,
    ) -> Result<Self, ElevationError> {
        let transport = HttpTransport::new(url, config.request_timeout)?;

        Self::open(config, Some(Box::new(transport)), cache)
    }

    /// Whether the server tier exists and is still enabled.
    pub fn has_server(&self) -> bool {
        self.shared.server.as_ref().map_or(false, |s| s.queue.is_enabled())
    }

    pub fn has_cache(&self) -> bool {
        self.shared.cache.is_some()
    }

    /// Queries waiting in either tier.
    pub fn num_queued(&self) -> usize {
        self.shared.server.as_ref().map_or(0, |s| s.queue.len())
            + self.shared.cache.as_ref().map_or(0, |c| c.queue.len())
    }

    fn join_workers(&self) {
        let workers = std::mem::take(&mut *lock_or_recover(&self.workers));
        for worker in workers {
            if worker.join().is_err() {
                tracing::error!("Elevation worker panicked");
            }
        }
    }
}

impl Drop for ElevationSource {
    fn drop(&mut self) {
        self.close();
    }
}

impl ElevationQueries for ElevationSource {
    fn model_query(&self) -> Option<ModelQuery> {
        self.model
    }

    fn add_query(&self, query: NodeQuery) {
        if let Some(cache) = &self.shared.cache {
            if cache.queue.add(&query) {
                return;
            }
        }
        if let Some(server) = &self.shared.server {
            if server.queue.add(&query) {
                return;
            }
        }
        self.shared.replies.push(&query.reply(NO_DATA, 0));
    }

    fn remove_queries(&self, nodes: &[NodeId]) -> Vec<NodeId> {
        let mut sorted = nodes.to_vec();
        sorted.sort_unstable();

        let mut removed = Vec::new();
        if let Some(cache) = &self.shared.cache {
            cache.queue.cancel(&sorted, &mut removed);
        }
        if let Some(server) = &self.shared.server {
            server.queue.cancel(&sorted, &mut removed);
        }
        self.shared.replies.cancel(&sorted, &mut removed);

        removed.sort_unstable();
        removed.dedup();

        removed
    }

    fn process_replies(&self, sink: &mut dyn ElevationSink) {
        self.shared.replies.drain_into(sink);
    }

    fn refresh_priorities(&self, priority: &dyn Fn(NodeId) -> Option<i32>) {
        if let Some(cache) = &self.shared.cache {
            cache.queue.refresh_priorities(priority);
        }
        if let Some(server) = &self.shared.server {
            server.queue.refresh_priorities(priority);
        }
    }

    fn close(&self) {
        self.shared.close_queues();
        self.join_workers();
    }
}

fn spawn_workers(shared: &Arc<Shared>) -> Result<Vec<JoinHandle<()>>, ElevationError> {
    let mut workers = Vec::new();
    if shared.server.is_some() {
        for i in 0..shared.config.server_threads {
            let shared = Arc::clone(shared);
            workers.push(
                thread::Builder::new()
                    .name(format!("elevation-server-{}", i))
                    .spawn(move || run_server_worker(&shared))?,
            );
        }
    }
    if shared.cache.is_some() {
        for i in 0..shared.config.cache_threads {
            let shared = Arc::clone(shared);
            workers.push(
                thread::Builder::new()
                    .name(format!("elevation-cache-{}", i))
                    .spawn(move || run_cache_worker(&shared))?,
            );
        }
    }

    Ok(workers)
}

fn run_server_worker(shared: &Shared) {
    let server = match &shared.server {
        Some(server) => server,
        None => return,
    };
    let mut out = Vec::with_capacity(server.request_buffer_size());
    while server.queue.wait_for_work(|| false) {
        server.run_round(&shared.replies, shared.cache.as_ref(), &mut out);
    }
    tracing::debug!("Elevation server worker exiting");
}

fn run_cache_worker(shared: &Shared) {
    let cache = match &shared.cache {
        Some(cache) => cache,
        None => return,
    };
    while cache.queue.wait_for_work(|| cache.pending_writes() > 0) {
        cache.run_round(
            &shared.config,
            shared.server.as_ref().map(|s| &s.queue),
            &shared.replies,
        );
    }
    tracing::debug!("Elevation cache worker exiting");
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
    use super::super::{MemoryElevationCache, TransportError, UNKNOWN};
    use super::*;

    use globe_terrain_core::Morton2;
    use pretty_assertions::assert_eq;
    use std::time::{Duration, Instant};

    fn wait_for_replies(source: &ElevationSource, sink: &mut RecordingSink, n: usize) {
        let start = Instant::now();
        while sink.values.len() < n && start.elapsed() < Duration::from_secs(10) {
            source.process_replies(sink);
            thread::sleep(Duration::from_millis(2));
        }
    }

    fn query(node: NodeId) -> NodeQuery {
        NodeQuery {
            node,
            lon: node as i32 * 7919,
            lat: node as i32 * -104_729,
            priority: 6,
        }
    }

    #[test]
    fn server_answers_through_cache() {
        let server = FakeServer::new();
        let mut memory = MemoryElevationCache::default();
        memory.set(Morton2::from_lon_lat(0, 0), 42, 0).unwrap();
        let source = ElevationSource::open(
            ElevationSourceConfig::default(),
            Some(Box::new(server.clone())),
            Some(Box::new(memory)),
        )
        .unwrap();
        assert_eq!(source.model_query(), Some(server.model()));
        assert!(source.has_server() && source.has_cache());

        for node in 0..200 {
            source.add_query(query(node));
        }
        let mut sink = RecordingSink::default();
        wait_for_replies(&source, &mut sink, 200);
        sink.values.sort_unstable();

        assert_eq!(sink.values.len(), 200);
        assert_eq!(sink.values[0], (0, 0, 0, 42, 0));
        for &(node, lon, lat, h, dh) in sink.values[1..].iter() {
            let q = query(node);
            assert_eq!((lon, lat), (q.lon, q.lat));
            assert_eq!((h, dh), FakeServer::elevation(lon, lat));
        }
    }

    #[test]
    fn no_tiers_answer_with_unknown() {
        let source = ElevationSource::open(ElevationSourceConfig::default(), None, None).unwrap();
        assert_eq!(source.model_query(), None);

        source.add_query(query(3));
        let mut sink = RecordingSink::default();
        source.process_replies(&mut sink);

        assert_eq!(sink.values.len(), 1);
        assert_eq!(sink.values[0].3, UNKNOWN);
    }

    #[test]
    fn remove_queries_is_idempotent() {
        let source = ElevationSource::open(ElevationSourceConfig::default(), None, None).unwrap();
        for node in [1, 2, 5].iter() {
            source.add_query(query(*node));
        }

        assert_eq!(source.remove_queries(&[2, 1, 2, 9]), vec![1, 2]);
        assert_eq!(source.remove_queries(&[2, 1, 2, 9]), Vec::<NodeId>::new());

        let mut sink = RecordingSink::default();
        source.process_replies(&mut sink);
        assert_eq!(sink.values.len(), 1);
        assert_eq!(sink.values[0].0, 5);
    }

    #[test]
    fn worker_counts_follow_config() {
        let source = ElevationSource::open(
            ElevationSourceConfig::new(3, 2),
            Some(Box::new(FakeServer::new())),
            Some(Box::new(MemoryElevationCache::default())),
        )
        .unwrap();
        {
            let workers = lock_or_recover(&source.workers);
            let mut names: Vec<_> = workers.iter().filter_map(|w| w.thread().name()).collect();
            names.sort_unstable();
            assert_eq!(
                names,
                vec![
                    "elevation-cache-0",
                    "elevation-cache-1",
                    "elevation-server-0",
                    "elevation-server-1",
                    "elevation-server-2",
                ]
            );
        }

        // Every cache worker shares the one queue, so queries are still answered exactly once.
        for node in 0..100 {
            source.add_query(query(node));
        }
        let mut sink = RecordingSink::default();
        wait_for_replies(&source, &mut sink, 100);
        thread::sleep(Duration::from_millis(20));
        source.process_replies(&mut sink);
        assert_eq!(sink.values.len(), 100);

        // Cache only: no server workers.
        let source = ElevationSource::open(
            ElevationSourceConfig::new(3, 2),
            None,
            Some(Box::new(MemoryElevationCache::default())),
        )
        .unwrap();
        assert_eq!(lock_or_recover(&source.workers).len(), 2);
    }

    #[test]
    fn unreachable_server_falls_back_to_cache_model() {
        let cached_model = FakeServer::new().model();
        let mut memory = MemoryElevationCache::default();
        memory.set_model_query(&cached_model).unwrap();

        let server = FakeServer::new();
        server.fail_next(vec![TransportError::Unreachable("unknown host".into())]);
        let source = ElevationSource::open(
            ElevationSourceConfig::default(),
            Some(Box::new(server)),
            Some(Box::new(memory)),
        )
        .unwrap();

        assert!(!source.has_server());
        assert_eq!(source.model_query(), Some(cached_model));

        source.add_query(query(4));
        let mut sink = RecordingSink::default();
        wait_for_replies(&source, &mut sink, 1);
        assert_eq!(sink.values[0].3, UNKNOWN);
    }
}
