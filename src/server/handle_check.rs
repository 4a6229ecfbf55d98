// The /check/<backend>/<query> handler

use crate::server::{error, ServerState};
use crate::lookup::{parse_query, BackendKind, QueryError};
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::sync::atomic::Ordering;

pub async fn handle_check(
    State(state): State<ServerState>,
    Path((backend, query)): Path<(String, String)>,
) -> Response {
    let Some(kind) = BackendKind::parse(&backend) else {
        return error::not_found("unknown backend");
    };

    // --perf-test makes every needle unique so the cache never hits.
    // Passwords get a suffix before hashing, hash queries are perturbed
    // after parsing; either way the results are meaningless.
    let salt = state
        .config
        .perf_test
        .then(|| state.perf_counter.fetch_add(1, Ordering::Relaxed));
    let query = match (salt, kind) {
        (Some(salt), BackendKind::Plain) => format!("{}{}", query, salt),
        _ => query,
    };

    let mut needle = match parse_query(kind, &query) {
        Ok(needle) => needle,
        Err(e) => return error::bad_request(&e.to_string()),
    };
    if kind != BackendKind::Plain {
        if let Some(salt) = salt {
            needle.perturb(salt);
        }
    }

    let cache_key = (kind.tag(), needle.bytes().to_vec());
    if let Some(cached) = state.cache.get(&cache_key) {
        return respond(state.config.json, cached);
    }

    match state.backends.lookup(kind, &needle) {
        Ok(result) => {
            state.cache.insert(cache_key, result);
            respond(state.config.json, result)
        }
        Err(QueryError::Unavailable(name)) => {
            error::not_found(&format!("backend '{}' is not configured", name))
        }
        Err(QueryError::BadQuery(reason)) => error::bad_request(&reason),
    }
}

/// A miss responds 200 with count 0; only transport-level problems use
/// error statuses.
fn respond(as_json: bool, count: Option<u32>) -> Response {
    let count = count.unwrap_or(0);
    if as_json {
        (StatusCode::OK, axum::Json(json!({ "count": count }))).into_response()
    } else {
        (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            count.to_string(),
        )
            .into_response()
    }
}
