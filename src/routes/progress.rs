//! Lab progress proxy
//!
//! `GET /api/lab-progress?username=` forwards to the trainee's progress
//! application and relays its body as-is. Anything other than a 200 from the
//! application is reported as "not ready".

use bytes::Bytes;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use super::{json_response, parse_query};
use crate::config::Args;
use crate::server::AppState;

#[derive(Debug, Default, Deserialize)]
struct ProgressQuery {
    username: Option<String>,
}

/// Progress URL for `username`, or `None` when the name can't form a host label
pub fn progress_url(args: &Args, username: &str) -> Option<String> {
    let valid = !username.is_empty()
        && username.len() <= 63
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !username.starts_with('-')
        && !username.ends_with('-');

    valid.then(|| {
        format!(
            "https://example-web-app-{}.{}.{}/progress",
            username, args.cluster_name, args.cluster_domain
        )
    })
}

/// Handle GET /api/lab-progress
pub async fn handle_lab_progress(state: Arc<AppState>, query: Option<&str>) -> Response<Full<Bytes>> {
    let params: ProgressQuery = parse_query(query);

    let Some(username) = params.username.filter(|u| !u.is_empty()) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Missing username" }),
        );
    };

    let Some(url) = progress_url(&state.args, &username) else {
        return json_response(
            StatusCode::BAD_REQUEST,
            serde_json::json!({ "error": "Invalid username" }),
        );
    };

    relay_progress(&state.http_client, &url).await
}

/// Fetch the progress document and pass its body through unchanged
async fn relay_progress(client: &reqwest::Client, url: &str) -> Response<Full<Bytes>> {
    let response = match client.get(url).header("flat", "true").send().await {
        Ok(resp) => resp,
        Err(e) => {
            debug!(url = %url, error = %e, "Progress application unreachable");
            return not_ready();
        }
    };

    if response.status() != reqwest::StatusCode::OK {
        debug!(url = %url, status = %response.status(), "Progress application not ready");
        return not_ready();
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/json")
        .to_string();

    let body = match response.bytes().await {
        Ok(body) => body,
        Err(e) => {
            debug!(url = %url, error = %e, "Progress response body failed");
            return not_ready();
        }
    };

    Response::builder()
        .status(StatusCode::OK)
        .header("Content-Type", content_type)
        .header("Access-Control-Allow-Origin", "*")
        .header("Cache-Control", "no-store")
        .body(Full::new(body))
        .unwrap_or_else(|_| not_ready())
}

fn not_ready() -> Response<Full<Bytes>> {
    json_response(
        StatusCode::SERVICE_UNAVAILABLE,
        serde_json::json!({ "error": "progress application not ready" }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Reply, StubServer};
    use clap::Parser;
    use http_body_util::BodyExt;

    fn args() -> Args {
        Args::try_parse_from(["rollcall", "--cluster-name", "lab", "--cluster-domain", "example.org"])
            .unwrap()
    }

    #[test]
    fn test_progress_url() {
        assert_eq!(
            progress_url(&args(), "user7").as_deref(),
            Some("https://example-web-app-user7.lab.example.org/progress")
        );
    }

    #[test]
    fn test_progress_url_rejects_hostile_names() {
        let args = args();
        assert!(progress_url(&args, "").is_none());
        assert!(progress_url(&args, "evil.com/x").is_none());
        assert!(progress_url(&args, "User1").is_none());
        assert!(progress_url(&args, "-user").is_none());
    }

    async fn body_bytes(resp: Response<Full<Bytes>>) -> Bytes {
        resp.into_body().collect().await.unwrap().to_bytes()
    }

    #[tokio::test]
    async fn test_relay_passes_body_through() {
        let stub = StubServer::start(vec![Reply {
            method: "GET",
            path: "/progress".to_string(),
            status: 200,
            content_type: "text/plain; charset=utf-8",
            body: "labs: 3/7".to_string(),
        }])
        .await;
        let client = reqwest::Client::new();

        let resp = relay_progress(&client, &format!("{}/progress", stub.url)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            resp.headers().get("Content-Type").unwrap(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(body_bytes(resp).await, Bytes::from_static(b"labs: 3/7"));

        let sent = &stub.requests()[0];
        assert!(sent.headers.contains("flat: true"), "{}", sent.headers);
    }

    #[tokio::test]
    async fn test_relay_non_200_is_not_ready() {
        let stub = StubServer::start(vec![Reply::json("GET", "/progress", 502, "{}")]).await;
        let client = reqwest::Client::new();

        let resp = relay_progress(&client, &format!("{}/progress", stub.url)).await;
        assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(resp).await).unwrap();
        assert_eq!(body["error"], "progress application not ready");
    }
}
