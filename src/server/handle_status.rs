// Info page and status endpoint

use crate::constants;
use crate::server::ServerState;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use serde_json::json;

pub async fn handle_root(State(state): State<ServerState>) -> Response {
    let mut page = String::new();
    page.push_str(&format!(
        "{} lookup server v{}\n\n",
        constants::BINARY_NAME,
        constants::VERSION
    ));
    page.push_str("Checks passwords and password hashes against a local copy\n");
    page.push_str("of the Have I Been Pwned breach corpus.\n\n");

    page.push_str("Backends\n");
    page.push_str("━━━━━━━━\n");
    for name in state.backends.configured() {
        page.push_str(&format!("  {}\n", name));
    }

    page.push_str("\nEndpoints\n");
    page.push_str("━━━━━━━━━\n");
    page.push_str("  GET  /check/<backend>/<query>   Breach count for a hash or password\n");
    page.push_str("  GET  /status                    Server status (JSON)\n");
    page.push_str("  GET  /                          This page\n\n");

    page.push_str("Examples\n");
    page.push_str("━━━━━━━━\n");
    page.push_str("  curl http://localhost/check/plain/P@ssw0rd\n");
    page.push_str("  curl http://localhost/check/sha1/21BD12DC183F740EE76F27B78EB39C8AD972A757\n");

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        page,
    )
        .into_response()
}

pub async fn handle_status(State(state): State<ServerState>) -> Response {
    let body = json!({
        "server": {
            "version": constants::VERSION,
            "uptime_seconds": state.start_time.elapsed().as_secs(),
            "threads": state.config.threads,
            "json": state.config.json,
            "toc": state.config.toc,
        },
        "backends": state.backends.configured(),
        "cache": state.cache.stats(),
    });
    (StatusCode::OK, axum::Json(body)).into_response()
}
