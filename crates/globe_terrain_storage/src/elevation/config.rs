use std::time::Duration;

/// Tuning knobs for an `ElevationSource`.
#[derive(Clone, Debug)]
pub struct ElevationSourceConfig {
    /// Worker threads posting batches to the server.
    pub server_threads: usize,
    /// Worker threads answering queries from the cache and writing server values back.
    pub cache_threads: usize,
    /// Size in bytes of one batch request; bounds the number of queries per batch.
    pub request_buffer_size: usize,
    /// Consecutive failed connection attempts before the server is disabled.
    pub max_attempts: u32,
    /// Timeout for a single HTTP request.
    pub request_timeout: Duration,
    /// Queries taken by one cache round.
    pub cache_round_max_queries: usize,
    /// Wall-clock budget of one cache round, shared by lookups and writeback.
    pub cache_round_time_budget: Duration,
}

impl Default for ElevationSourceConfig {
    fn default() -> Self {
        Self {
            server_threads: 2,
            cache_threads: 1,
            request_buffer_size: 1 << 15,
            max_attempts: 5,
            request_timeout: Duration::from_secs(15),
            cache_round_max_queries: 2000,
            cache_round_time_budget: Duration::from_secs(2),
        }
    }
}

impl ElevationSourceConfig {
    /// A config with the given worker counts and defaults otherwise.
    pub fn new(server_threads: usize, cache_threads: usize) -> Self {
        assert!(server_threads > 0);
        assert!(cache_threads > 0);

        Self {
            server_threads,
            cache_threads,
            ..Default::default()
        }
    }
}
