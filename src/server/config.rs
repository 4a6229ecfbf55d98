// Server configuration

use crate::constants;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Worker threads of the runtime serving requests.
    pub threads: usize,
    /// Respond with `{"count": n}` instead of plain text.
    pub json: bool,
    /// Perturb every needle so the cache never hits (benchmarking only;
    /// results are wrong by construction).
    pub perf_test: bool,
    /// Build or load a TOC per database at startup.
    pub toc: bool,
    pub toc_bits: u8,
    pub cache_capacity: usize,
    pub request_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: constants::DEFAULT_BIND_ADDRESS.to_string(),
            port: constants::DEFAULT_PORT,
            threads: 1,
            json: false,
            perf_test: false,
            toc: false,
            toc_bits: constants::DEFAULT_TOC_BITS,
            cache_capacity: constants::DEFAULT_CACHE_CAPACITY,
            request_timeout: Duration::from_secs(constants::REQUEST_TIMEOUT_SECS),
        }
    }
}
