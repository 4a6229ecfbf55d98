// HTTP lookup server
//
// Serves `/check/<backend>/<query>` against the configured databases and
// filters. All backends are opened and validated before the listener
// starts; afterwards they are shared read-only across workers, and the
// result cache is the only mutable shared state.

mod config;
mod error;
mod handle_check;
mod handle_status;
mod routes;
mod startup;

pub use config::ServerConfig;
pub use startup::{prepare_backends, serve};

use crate::cache::QueryCache;
use crate::lookup::Backends;
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub struct ServerState {
    pub backends: Arc<Backends>,
    pub cache: Arc<QueryCache>,
    pub config: ServerConfig,
    pub start_time: Instant,
    /// Monotonic salt for --perf-test needle perturbation.
    pub perf_counter: Arc<AtomicU64>,
}

impl ServerState {
    pub fn new(backends: Arc<Backends>, config: ServerConfig) -> Self {
        let cache = Arc::new(QueryCache::new(config.cache_capacity));
        Self {
            backends,
            cache,
            config,
            start_time: Instant::now(),
            perf_counter: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn router(&self) -> axum::Router {
        routes::create_router(self.clone())
    }
}
