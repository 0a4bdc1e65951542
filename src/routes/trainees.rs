//! Trainee listing endpoints
//!
//! - `GET /`, `/api/trainees` - trainee board (admins hidden)
//! - `GET /teacher`, `/api/teacher/trainees` - teacher board, `?token=` gated
//!   when a token is configured

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, warn};

use super::{error_response, json_response, parse_query};
use crate::roster::{Scope, TraineeView};
use crate::server::AppState;
use crate::types::BoardError;

#[derive(Debug, Default, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Board payload
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardResponse {
    pub cluster_name: String,
    pub cluster_domain: String,
    pub teacher: bool,
    pub trainees: Vec<TraineeView>,
}

/// Handle a board listing for `scope`
pub async fn handle_trainees(
    state: Arc<AppState>,
    scope: Scope,
    query: Option<&str>,
) -> Response<Full<Bytes>> {
    if scope.is_privileged() {
        let params: TokenQuery = parse_query(query);
        if !state.args.token_matches(params.token.as_deref()) {
            warn!("Teacher view requested with missing or wrong token");
            return error_response(&BoardError::Unauthorized(
                "teacher view requires a valid token".to_string(),
            ));
        }
    }

    match state.roster.trainee_views(scope).await {
        Ok(trainees) => json_response(
            StatusCode::OK,
            BoardResponse {
                cluster_name: state.args.cluster_name.clone(),
                cluster_domain: state.args.cluster_domain.clone(),
                teacher: scope.is_privileged(),
                trainees,
            },
        ),
        Err(e) => {
            error!(scope = ?scope, error = %e, "Trainee listing failed");
            json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                serde_json::json!({ "error": "service unavailable" }),
            )
        }
    }
}
