#![allow(dead_code)]

use axum::extract::{Path as AxumPath, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use hibpdb::lookup::BackendPaths;
use hibpdb::record::{parse_range_line, Sha1Record};
use hibpdb::server::{prepare_backends, ServerConfig, ServerState};
use hibpdb::RecordWriter;
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

// ============================================================================
// Mock range API
// ============================================================================

#[derive(Clone, Default)]
struct MockState {
    /// Fail the first request for every prefix with a 500, to exercise the
    /// retry path.
    fail_first: bool,
    seen: Arc<Mutex<HashSet<String>>>,
}

/// Deterministic shard content: between 2 and 4 suffix lines per prefix,
/// sorted, CRLF-terminated like the real API.
pub fn shard_lines(prefix: u32) -> String {
    let lines = prefix % 3 + 2;
    let mut body = String::new();
    for j in 0..lines {
        body.push_str(&format!(
            "{:035X}:{}\r\n",
            u128::from(j) * 0x1111 + 0xABC,
            prefix + j + 1
        ));
    }
    body
}

/// Every record an uninterrupted download over `[0, limit)` should produce,
/// in order.
pub fn expected_records(limit: u32) -> Vec<Sha1Record> {
    (0..limit)
        .flat_map(|p| {
            shard_lines(p)
                .lines()
                .filter(|l| !l.is_empty())
                .map(|l| parse_range_line::<20>(p, l).unwrap())
                .collect::<Vec<_>>()
        })
        .collect()
}

async fn handle_range(
    State(state): State<MockState>,
    AxumPath(prefix): AxumPath<String>,
) -> axum::response::Response {
    if state.fail_first && state.seen.lock().unwrap().insert(prefix.clone()) {
        return (StatusCode::INTERNAL_SERVER_ERROR, "transient").into_response();
    }
    match u32::from_str_radix(&prefix, 16) {
        Ok(p) => shard_lines(p).into_response(),
        Err(_) => (StatusCode::BAD_REQUEST, "bad prefix").into_response(),
    }
}

/// Run a mock range API on an ephemeral port, on its own runtime thread.
/// Returns a base URL suitable for `DownloadConfig::base_url`.
pub fn spawn_mock_upstream(fail_first: bool) -> String {
    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async move {
            let state = MockState {
                fail_first,
                seen: Arc::new(Mutex::new(HashSet::new())),
            };
            let app = Router::new()
                .route("/range/{prefix}", get(handle_range))
                .with_state(state);
            let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
            tx.send(listener.local_addr().unwrap()).unwrap();
            axum::serve(listener, app).await.unwrap();
        });
    });
    let addr = rx.recv().unwrap();
    format!("http://{}/range", addr)
}

// ============================================================================
// Database fixtures
// ============================================================================

/// Deterministic pseudo-random 20-byte hashes.
pub fn lcg_hashes(n: usize, mut seed: u64) -> Vec<[u8; 20]> {
    let mut next = move || {
        seed = seed
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        seed
    };
    (0..n)
        .map(|_| {
            let mut hash = [0u8; 20];
            for chunk in hash.chunks_mut(8) {
                let word = next().to_be_bytes();
                chunk.copy_from_slice(&word[..chunk.len()]);
            }
            hash
        })
        .collect()
}

/// Write a sorted SHA-1 database from arbitrary (hash, count) entries.
pub fn write_sha1_db(path: &Path, entries: &[([u8; 20], u32)]) {
    let mut records: Vec<Sha1Record> = entries
        .iter()
        .map(|(h, c)| Sha1Record::new(*h, *c))
        .collect();
    records.sort();
    records.dedup();
    let mut writer = RecordWriter::<20>::create(path).unwrap();
    for record in &records {
        writer.push(record).unwrap();
    }
    writer.finish().unwrap();
}

// ============================================================================
// In-process lookup server
// ============================================================================

/// Open backends, bind an ephemeral port and serve. Returns the base URL
/// and the server task handle.
pub async fn start_test_server(
    paths: BackendPaths,
    config: ServerConfig,
) -> (String, tokio::task::JoinHandle<()>) {
    let backends = prepare_backends(&paths, &config).unwrap();
    let state = ServerState::new(Arc::new(backends), config);
    let router = state.router();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    (format!("http://{}", addr), handle)
}
