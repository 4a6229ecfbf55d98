// Error response helpers

use axum::http::StatusCode;
use axum::response::IntoResponse;
use serde_json::json;

/// JSON error body with the given status.
pub fn json_error(status: StatusCode, message: &str) -> axum::response::Response {
    (status, axum::Json(json!({"error": message}))).into_response()
}

/// 400 for malformed queries and unroutable paths.
pub fn bad_request(message: &str) -> axum::response::Response {
    json_error(StatusCode::BAD_REQUEST, message)
}

/// 404 for backends that exist in the API but are not configured, and for
/// unknown backend names.
pub fn not_found(message: &str) -> axum::response::Response {
    json_error(StatusCode::NOT_FOUND, message)
}
