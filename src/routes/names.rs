//! Display name and lock endpoints
//!
//! - `POST /api/trainee-name?username=&name=` - persist a display name, then
//!   rebroadcast the mapping to realtime viewers
//! - `GET /api/trainee-names` - current name mapping
//! - `GET /api/locks` - current lock table

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::error;

use super::{error_response, json_response, parse_query};
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
struct NameQuery {
    username: Option<String>,
    name: Option<String>,
}

/// Handle POST /api/trainee-name
pub async fn handle_update_name(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let params: NameQuery = parse_query(query);

    let Some(username) = params.username.filter(|u| !u.trim().is_empty()) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Missing username" }),
        );
    };
    let name = params.name.unwrap_or_default();

    if let Err(e) = state.roster.set_display_name(&username, &name).await {
        error!(username = %username, error = %e, "Failed to save display name");
        return json_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            serde_json::json!({ "error": format!("Failed to save name: {}", e) }),
        );
    }

    // Viewers learn about the write asynchronously; the response doesn't wait
    state.bridge.on_display_name_written(&username);

    json_response(
        StatusCode::OK,
        serde_json::json!({ "success": true, "username": username, "name": name }),
    )
}

/// Handle GET /api/trainee-names
pub async fn handle_get_names(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.roster.display_names().await {
        Ok(names) => json_response(StatusCode::OK, names),
        Err(e) => {
            error!(error = %e, "Name mapping failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "service unavailable" }),
            )
        }
    }
}

/// Handle GET /api/locks
pub async fn handle_get_locks(state: Arc<AppState>) -> Response<Full<Bytes>> {
    match state.hub.locks().await {
        Ok(locks) => json_response(StatusCode::OK, locks),
        Err(e) => error_response(&e),
    }
}
