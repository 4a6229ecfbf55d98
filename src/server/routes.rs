// Route setup and request-level middleware

use crate::server::{error, handle_check, handle_status, ServerState};
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

pub fn create_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(handle_status::handle_root))
        .route("/status", get(handle_status::handle_status))
        .route("/check/{backend}/{query}", get(handle_check::handle_check))
        .fallback(handle_unroutable)
        .layer(
            ServiceBuilder::new()
                .layer(CorsLayer::permissive())
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    request_timeout,
                )),
        )
        .with_state(state)
}

/// Anything that does not match a route is a malformed request path.
async fn handle_unroutable() -> Response {
    error::bad_request("invalid path; expected /check/<backend>/<query>")
}

/// Bound every request by the configured timeout; exceeded requests return
/// 504. No lock is held across this await.
async fn request_timeout(State(state): State<ServerState>, req: Request, next: Next) -> Response {
    match tokio::time::timeout(state.config.request_timeout, next.run(req)).await {
        Ok(response) => response,
        Err(_) => (StatusCode::GATEWAY_TIMEOUT, "request timed out").into_response(),
    }
}
