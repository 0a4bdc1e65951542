//! WebSocket upgrade for the realtime channel
//!
//! Upgrades `/ws/trainee-names` and hands the socket to the hub session. The
//! channel is unauthenticated, like the board itself.

use bytes::Bytes;
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;
use tracing::{error, warn};

use crate::hub;
use crate::routes::json_response;
use crate::server::http::AppState;

/// Handle WebSocket upgrade for the realtime channel
pub fn handle_realtime_upgrade(state: Arc<AppState>, mut req: Request<Incoming>) -> Response<Full<Bytes>> {
    if !hyper_tungstenite::is_upgrade_request(&req) {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "WebSocket upgrade required" }),
        );
    }

    let (response, websocket) = match hyper_tungstenite::upgrade(&mut req, None) {
        Ok(upgrade) => upgrade,
        Err(e) => {
            error!("WebSocket upgrade failed: {}", e);
            return json_response(
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "WebSocket upgrade failed" }),
            );
        }
    };

    let hub = state.hub.clone();
    tokio::spawn(async move {
        match websocket.await {
            Ok(ws) => {
                if let Err(e) = hub::serve_connection(ws, hub).await {
                    warn!("Realtime session error: {}", e);
                }
            }
            Err(e) => {
                error!("WebSocket connection failed: {}", e);
            }
        }
    });

    // Return the upgrade response
    let (parts, _body) = response.into_parts();
    Response::from_parts(parts, Full::new(Bytes::new()))
}
