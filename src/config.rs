//! Configuration for Rollcall
//!
//! CLI arguments and environment variable handling using clap.

use clap::Parser;
use std::net::SocketAddr;

const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

/// Rollcall - live status board for training clusters
#[derive(Parser, Debug, Clone)]
#[command(name = "rollcall")]
#[command(about = "Live status board for multi-tenant training clusters")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Port override (keeps the LISTEN host)
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Label selector identifying trainee credential secrets
    #[arg(long, env = "LABEL_SELECTOR", default_value = "acend-userconfig=true")]
    pub label_selector: String,

    /// Secret data key holding the trainee username
    #[arg(long, env = "SECRET_USERNAME_KEY", default_value = "username")]
    pub username_key: String,

    /// Secret data key holding the trainee password
    #[arg(long, env = "SECRET_PASSWORD_KEY", default_value = "password")]
    pub password_key: String,

    /// Cluster name shown to trainees
    #[arg(long, env = "CLUSTER_NAME", default_value = "training")]
    pub cluster_name: String,

    /// Cluster domain shown to trainees
    #[arg(long, env = "CLUSTER_DOMAIN", default_value = "cluster.acend.ch")]
    pub cluster_domain: String,

    /// Shared secret for the teacher view (unset disables the gate)
    #[arg(long, env = "TOKEN")]
    pub token: Option<String>,

    /// Kubernetes API server URL
    /// Derived from KUBERNETES_SERVICE_HOST/PORT when running in-cluster
    #[arg(long, env = "KUBE_API_URL")]
    pub kube_api_url: Option<String>,

    /// Bearer token file for the Kubernetes API
    #[arg(long, env = "KUBE_TOKEN_FILE", default_value_t = format!("{SERVICE_ACCOUNT_DIR}/token"))]
    pub kube_token_file: String,

    /// CA bundle for the Kubernetes API (skipped when the file is missing)
    #[arg(long, env = "KUBE_CA_FILE", default_value_t = format!("{SERVICE_ACCOUNT_DIR}/ca.crt"))]
    pub kube_ca_file: String,

    /// Cluster request timeout in milliseconds
    #[arg(long, env = "REQUEST_TIMEOUT_MS", default_value = "15000")]
    pub request_timeout_ms: u64,

    /// Per-trainee lookups kept in flight while building a listing
    #[arg(long, env = "FETCH_CONCURRENCY", default_value = "8")]
    pub fetch_concurrency: usize,

    /// Outbound messages buffered per realtime connection before it is dropped
    #[arg(long, env = "OUTBOUND_BUFFER", default_value = "32")]
    pub outbound_buffer: usize,

    /// Enable development mode (seeded in-memory cluster, no API server needed)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Number of trainees seeded in development mode
    #[arg(long, env = "DEV_TRAINEES", default_value = "3")]
    pub dev_trainees: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    pub log_json: bool,
}

impl Args {
    /// Effective listen address (PORT wins over the LISTEN port)
    pub fn listen_addr(&self) -> SocketAddr {
        match self.port {
            Some(port) => SocketAddr::new(self.listen.ip(), port),
            None => self.listen,
        }
    }

    /// Get effective API server URL
    pub fn kube_api_url(&self) -> String {
        if let Some(ref url) = self.kube_api_url {
            return url.trim_end_matches('/').to_string();
        }

        match (
            std::env::var("KUBERNETES_SERVICE_HOST"),
            std::env::var("KUBERNETES_SERVICE_PORT"),
        ) {
            (Ok(host), Ok(port)) if host.contains(':') => format!("https://[{host}]:{port}"),
            (Ok(host), Ok(port)) => format!("https://{host}:{port}"),
            _ => "https://kubernetes.default.svc".to_string(),
        }
    }

    /// Whether the teacher view requires a token
    pub fn token_gate_enabled(&self) -> bool {
        self.token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Check a presented token against the configured secret
    pub fn token_matches(&self, presented: Option<&str>) -> bool {
        match self.token.as_deref() {
            None | Some("") => true,
            Some(expected) => presented == Some(expected),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.label_selector.trim().is_empty() {
            return Err("LABEL_SELECTOR must not be empty".to_string());
        }

        if self.username_key.is_empty() || self.password_key.is_empty() {
            return Err("SECRET_USERNAME_KEY and SECRET_PASSWORD_KEY must not be empty".to_string());
        }

        if self.fetch_concurrency == 0 {
            return Err("FETCH_CONCURRENCY must be at least 1".to_string());
        }

        if self.outbound_buffer == 0 {
            return Err("OUTBOUND_BUFFER must be at least 1".to_string());
        }

        Ok(())
    }
}
