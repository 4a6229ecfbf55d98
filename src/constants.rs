// Constants for version and binary identification

/// Binary name used in user agents and diagnostics
pub const BINARY_NAME: &str = "hibpdb";

/// Package version from Cargo.toml (set at compile time)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Returns the user agent string for HTTP requests
pub fn user_agent() -> String {
    format!("{}/{}", BINARY_NAME, VERSION)
}

// ============================================================================
// Upstream API Constants
// ============================================================================

/// Default base URL of the range API
pub const DEFAULT_RANGE_URL: &str = "https://api.pwnedpasswords.com/range";

/// Exclusive upper bound of the 5-hex-digit prefix space (2^20 shards)
pub const PREFIX_SPACE: u32 = 0x100000;

// ============================================================================
// Download Pipeline Constants
// ============================================================================

/// Default number of concurrent in-flight range fetches
pub const DEFAULT_PARALLEL_MAX: usize = 64;

/// Per-request HTTP timeout
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum fetch attempts per shard before the run is failed
pub const FETCH_RETRY_MAX: u32 = 5;

/// Initial retry backoff, doubled per attempt
pub const RETRY_BACKOFF_MS: u64 = 500;

/// Cap applied to upstream Retry-After waits
pub const MAX_RETRY_AFTER_SECS: u64 = 60;

/// Writer <-> transport handshake timeout; exceeding it is treated as a
/// stalled thread and fails the run
pub const HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// How long the transport waits for a completion before yielding an empty
/// batch to keep the handshake alive
pub const TRANSPORT_YIELD_MS: u64 = 500;

/// Target flush unit of the record writer; rounded down to a whole number
/// of records
pub const FLUSH_TARGET_BYTES: usize = 1 << 20;

// ============================================================================
// Table of Contents Constants
// ============================================================================

/// Magic bytes at the start of a TOC sidecar file
pub const TOC_MAGIC: [u8; 4] = *b"TOC1";

/// Valid range and default for the TOC prefix width
pub const TOC_BITS_MIN: u8 = 15;
pub const TOC_BITS_MAX: u8 = 25;
pub const DEFAULT_TOC_BITS: u8 = 20;

// ============================================================================
// Filter Constants
// ============================================================================

/// Top bits of the 64-bit key selecting a filter shard
pub const FILTER_SHARD_BITS: u8 = 8;

// ============================================================================
// Server Constants
// ============================================================================

/// Default bind address and port for the lookup server
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8082;

/// Default per-request timeout; exceeded requests return 504
pub const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default result cache bound, in entries
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;
