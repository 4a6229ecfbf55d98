// src/lib.rs
pub mod cache;
pub mod constants;
pub mod download;
pub mod error;
pub mod filter;
pub mod flat_file;
pub mod format;
pub mod lookup;
pub mod record;
pub mod server;
pub mod toc;

// Re-export main types
pub use cache::{CacheStats, QueryCache};
pub use download::{DownloadConfig, DownloadStats};
pub use error::{DbError, DownloadError};
pub use filter::{FuseFilter16, FuseFilter8, ShardedFilter};
pub use flat_file::{FlatFileDb, NtlmDb, RecordWriter, Sha1Db, Sha1t64Db};
pub use lookup::{BackendKind, BackendPaths, Backends, Needle};
pub use record::{NtlmRecord, PwRecord, Sha1Record, Sha1t64Record};
pub use server::{ServerConfig, ServerState};
pub use toc::Toc;
