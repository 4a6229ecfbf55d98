use std::path::PathBuf;

/// Errors raised by the on-disk structures (flat file, TOC sidecar, filter
/// file). `Format` means the bytes on disk cannot be what we wrote; it is
/// always fatal for the run.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("format error in '{path}': {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DbError {
    pub fn format(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        DbError::Format {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the download pipeline.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),

    #[error("HTTP request failed for prefix {prefix:05X}: {source}")]
    HttpRequest {
        prefix: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("HTTP {status} for prefix {prefix:05X}")]
    HttpStatus { prefix: u32, status: u16 },

    #[error("download failed after {attempts} attempts for prefix {prefix:05X}: {last}")]
    RetriesExhausted {
        prefix: u32,
        attempts: u32,
        last: String,
    },

    #[error("malformed upstream line for prefix {prefix:05X}: {line:?}")]
    BadLine { prefix: u32, line: String },

    #[error("timed out after {0:?} waiting for the {1} thread")]
    Stall(std::time::Duration, &'static str),

    #[error("output file '{path}' exists; pass --resume to continue it")]
    OutputExists { path: PathBuf },

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
