//! HTTP routes for Rollcall

pub mod health;
pub mod names;
pub mod progress;
pub mod trainees;

pub use health::{health_check, readiness_check, version_info};
pub use names::{handle_get_locks, handle_get_names, handle_update_name};
pub use progress::handle_lab_progress;
pub use trainees::handle_trainees;

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::BoardError;

/// Serialize `body` as a JSON response
pub fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response<Full<Bytes>> {
    match serde_json::to_string(&body) {
        Ok(json) => Response::builder()
            .status(status)
            .header("Content-Type", "application/json")
            .header("Access-Control-Allow-Origin", "*")
            .header("Cache-Control", "no-store")
            .body(Full::new(Bytes::from(json)))
            .unwrap_or_else(|_| internal_error_response()),
        Err(_) => internal_error_response(),
    }
}

/// Error response carrying the error's message
pub fn error_response(err: &BoardError) -> Response<Full<Bytes>> {
    json_response(
        err.status_code(),
        serde_json::json!({ "error": err.to_string() }),
    )
}

fn internal_error_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::from("Failed to build response")));
    *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    response
}

/// Parse the query string into `T`, falling back to `T::default()`
pub fn parse_query<T: DeserializeOwned + Default>(query: Option<&str>) -> T {
    serde_urlencoded::from_str(query.unwrap_or("")).unwrap_or_default()
}
