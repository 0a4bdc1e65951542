//! HTTP server implementation
//!
//! Uses hyper http1 with TokioIo for async handling and upgrades for the
//! realtime channel. Routing is a plain `(method, path)` match.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::header::HeaderValue;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use crate::bridge::UpdateBridge;
use crate::cluster::ClusterSource;
use crate::config::Args;
use crate::hub::{Hub, HubConfig, HubHandle};
use crate::roster::{Roster, RosterSettings, Scope};
use crate::routes;
use crate::server::websocket;
use crate::types::{BoardError, Result};

type BoxBody = http_body_util::combinators::BoxBody<Bytes, hyper::Error>;

/// Upper bound for a lab progress probe
const PROGRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// Routed paths; any other method on these gets a 405
const KNOWN_PATHS: &[&str] = &[
    "/",
    "/health",
    "/healthz",
    "/ready",
    "/readyz",
    "/version",
    "/teacher",
    "/api/trainees",
    "/api/teacher/trainees",
    "/api/trainee-name",
    "/api/trainee-names",
    "/api/locks",
    "/api/lab-progress",
    "/ws/trainee-names",
];

/// Shared application state
pub struct AppState {
    pub args: Args,
    /// Aggregation pipeline over the cluster source
    pub roster: Roster,
    /// Realtime hub submitter
    pub hub: HubHandle,
    /// Name rebroadcast after writes
    pub bridge: UpdateBridge,
    /// Client for lab progress probes
    pub http_client: reqwest::Client,
    pub started_at: Instant,
}

impl AppState {
    /// Build state and start the hub (must run inside a tokio runtime)
    pub fn new(args: Args, source: Arc<dyn ClusterSource>) -> Result<Self> {
        let roster = Roster::new(source, RosterSettings::from_args(&args));
        let hub = Hub::spawn(HubConfig {
            outbound_buffer: args.outbound_buffer,
            ..Default::default()
        });
        let bridge = UpdateBridge::new(roster.clone(), hub.clone());

        let http_client = reqwest::Client::builder()
            .timeout(PROGRESS_TIMEOUT)
            .user_agent(concat!("rollcall/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BoardError::Internal(format!("progress client: {}", e)))?;

        Ok(Self {
            args,
            roster,
            hub,
            bridge,
            http_client,
            started_at: Instant::now(),
        })
    }
}

/// Start the HTTP server
pub async fn run(state: Arc<AppState>) -> Result<()> {
    let addr = state.args.listen_addr();
    let listener = TcpListener::bind(addr).await?;

    info!(
        listen = %addr,
        cluster = %state.args.cluster_name,
        domain = %state.args.cluster_domain,
        "Rollcall listening"
    );

    if !state.args.token_gate_enabled() {
        warn!("No TOKEN configured - teacher view is open");
    }

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);

                    let service = service_fn(move |req| {
                        let state = Arc::clone(&state);
                        async move { handle_request(state, addr, req).await }
                    });

                    if let Err(err) = http1::Builder::new()
                        .serve_connection(io, service)
                        .with_upgrades()
                        .await
                    {
                        debug!("Error serving connection from {}: {:?}", addr, err);
                    }
                });
            }
            Err(e) => {
                error!("Error accepting connection: {:?}", e);
            }
        }
    }
}

/// Route incoming HTTP requests
async fn handle_request(
    state: Arc<AppState>,
    addr: SocketAddr,
    req: Request<Incoming>,
) -> std::result::Result<Response<BoxBody>, hyper::Error> {
    let started = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);
    let query = query.as_deref();

    debug!("[{}] {} {}", addr, method, path);

    let response = match (&method, path.as_str()) {
        // Liveness probe
        (&Method::GET, "/health") | (&Method::GET, "/healthz") => {
            routes::health_check(Arc::clone(&state)).await
        }

        // Readiness probe - hub control loop must be alive
        (&Method::GET, "/ready") | (&Method::GET, "/readyz") => {
            routes::readiness_check(Arc::clone(&state))
        }

        (&Method::GET, "/version") => routes::version_info(),

        (&Method::OPTIONS, _) => preflight_response(),

        (&Method::GET, "/") | (&Method::GET, "/api/trainees") => {
            routes::handle_trainees(Arc::clone(&state), Scope::Trainee, query).await
        }

        (&Method::GET, "/teacher") | (&Method::GET, "/api/teacher/trainees") => {
            routes::handle_trainees(Arc::clone(&state), Scope::Teacher, query).await
        }

        (&Method::POST, "/api/trainee-name") => {
            routes::handle_update_name(Arc::clone(&state), query).await
        }

        (&Method::GET, "/api/trainee-names") => routes::handle_get_names(Arc::clone(&state)).await,

        (&Method::GET, "/api/locks") => routes::handle_get_locks(Arc::clone(&state)).await,

        (&Method::GET, "/api/lab-progress") => {
            routes::handle_lab_progress(Arc::clone(&state), query).await
        }

        (&Method::GET, "/ws/trainee-names") => {
            websocket::handle_realtime_upgrade(Arc::clone(&state), req)
        }

        (_, p) if KNOWN_PATHS.contains(&p) => method_not_allowed_response(),

        _ => not_found_response(&path),
    };

    info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Request completed"
    );

    Ok(to_boxed(response))
}

/// Convert a Full<Bytes> body to BoxBody
fn to_boxed(response: Response<Full<Bytes>>) -> Response<BoxBody> {
    response.map(|body| body.map_err(|never| match never {}).boxed())
}

/// CORS preflight response
fn preflight_response() -> Response<Full<Bytes>> {
    let mut response = Response::new(Full::new(Bytes::new()));
    let headers = response.headers_mut();
    headers.insert("Access-Control-Allow-Origin", HeaderValue::from_static("*"));
    headers.insert("Access-Control-Allow-Headers", HeaderValue::from_static("*"));
    headers.insert(
        "Access-Control-Allow-Methods",
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    response
}

/// Not found response
fn not_found_response(path: &str) -> Response<Full<Bytes>> {
    routes::error_response(&BoardError::NotFound(path.to_string()))
}

fn method_not_allowed_response() -> Response<Full<Bytes>> {
    routes::json_response(
        StatusCode::METHOD_NOT_ALLOWED,
        serde_json::json!({ "error": "Method not allowed" }),
    )
}
