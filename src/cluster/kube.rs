//! Kubernetes REST client for the cluster source
//!
//! Talks plain JSON to the API server with a service-account bearer token.
//! Only the handful of endpoints the board needs are covered:
//!
//! - `GET  /api/v1/secrets?labelSelector=...`
//! - `GET  /apis/rbac.authorization.k8s.io/v1/clusterrolebindings/{name}`
//! - `GET  /api/v1/namespaces/{ns}/pods?labelSelector=...`
//! - `GET|PUT /api/v1/namespaces/{ns}/configmaps/{name}`
//! - `POST /api/v1/namespaces/{ns}/configmaps`

use base64::Engine;
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

use super::{
    display_name_record, ClusterSource, CredentialRecord, RoleBindingRecord, WorkloadRecord,
    DISPLAY_NAME_KEY,
};
use crate::config::Args;
use crate::types::{BoardError, Result};

/// Longest response body excerpt carried in an error
const ERROR_BODY_EXCERPT: usize = 256;

/// Connection settings for the API server
#[derive(Debug, Clone)]
pub struct KubeConfig {
    pub api_url: String,
    pub token_file: PathBuf,
    pub ca_file: PathBuf,
    pub request_timeout: Duration,
}

impl KubeConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            api_url: args.kube_api_url(),
            token_file: PathBuf::from(&args.kube_token_file),
            ca_file: PathBuf::from(&args.kube_ca_file),
            request_timeout: Duration::from_millis(args.request_timeout_ms),
        }
    }
}

/// Cluster source backed by the Kubernetes API
pub struct KubeClient {
    config: KubeConfig,
    http_client: reqwest::Client,
}

impl KubeClient {
    pub fn new(config: KubeConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("rollcall/", env!("CARGO_PKG_VERSION")));

        match std::fs::read(&config.ca_file) {
            Ok(pem) => {
                let cert = reqwest::Certificate::from_pem(&pem)
                    .map_err(|e| BoardError::Internal(format!("invalid CA bundle: {}", e)))?;
                builder = builder.add_root_certificate(cert);
            }
            Err(e) => {
                warn!(
                    path = %config.ca_file.display(),
                    error = %e,
                    "Cluster CA bundle not readable, using system roots"
                );
            }
        }

        let http_client = builder
            .build()
            .map_err(|e| BoardError::Internal(format!("cluster client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.config.api_url
    }

    /// Service-account tokens rotate, so the file is re-read per request
    async fn bearer_token(&self) -> Option<String> {
        match tokio::fs::read_to_string(&self.config.token_file).await {
            Ok(token) => Some(token.trim().to_string()),
            Err(e) => {
                debug!(
                    path = %self.config.token_file.display(),
                    error = %e,
                    "No bearer token, sending unauthenticated request"
                );
                None
            }
        }
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let request = match self.bearer_token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        request
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| BoardError::Cluster(format!("{}: {}", what, e)))
    }

    /// GET a JSON resource, mapping 404 to `None`
    async fn get_json<T: DeserializeOwned>(&self, path: &str, what: &str) -> Result<Option<T>> {
        let url = format!("{}{}", self.config.api_url, path);
        let response = self.send(self.http_client.get(&url), what).await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let response = check_status(response, what).await?;
        let value = response
            .json::<T>()
            .await
            .map_err(|e| BoardError::Cluster(format!("{}: invalid response: {}", what, e)))?;

        Ok(Some(value))
    }

    async fn write_json(
        &self,
        request: RequestBuilder,
        body: &serde_json::Value,
        what: &str,
    ) -> Result<()> {
        let response = self.send(request.json(body), what).await?;
        check_status(response, what).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterSource for KubeClient {
    async fn list_credentials(&self, selector: &str) -> Result<Vec<CredentialRecord>> {
        let path = format!(
            "/api/v1/secrets?labelSelector={}",
            urlencoding::encode(selector)
        );
        let list: ObjectList<Secret> = self
            .get_json(&path, "list secrets")
            .await?
            .ok_or_else(|| BoardError::Cluster("list secrets: endpoint not found".into()))?;

        Ok(list.items.into_iter().map(decode_secret).collect())
    }

    async fn get_role_binding(&self, name: &str) -> Result<Option<RoleBindingRecord>> {
        let path = format!(
            "/apis/rbac.authorization.k8s.io/v1/clusterrolebindings/{}",
            urlencoding::encode(name)
        );
        let binding: Option<ClusterRoleBinding> = self.get_json(&path, "get role binding").await?;

        Ok(binding.map(|b| RoleBindingRecord {
            name: b.metadata.name,
            role: b.role_ref.map(|r| r.name),
        }))
    }

    async fn list_workloads(&self, owner: &str, selector: &str) -> Result<Vec<WorkloadRecord>> {
        let path = format!(
            "/api/v1/namespaces/{}/pods?labelSelector={}",
            urlencoding::encode(owner),
            urlencoding::encode(selector)
        );
        // A missing namespace simply has no workloads
        let list: Option<ObjectList<Pod>> = self.get_json(&path, "list pods").await?;

        Ok(list
            .map(|l| l.items.into_iter().map(summarize_pod).collect())
            .unwrap_or_default())
    }

    async fn get_display_name(&self, owner: &str) -> Result<Option<String>> {
        let path = config_map_path(owner);
        let config_map: Option<ConfigMap> = self.get_json(&path, "get display name").await?;

        Ok(config_map.and_then(|cm| cm.data.and_then(|mut d| d.remove(DISPLAY_NAME_KEY))))
    }

    async fn upsert_display_name(&self, owner: &str, name: &str) -> Result<()> {
        let path = config_map_path(owner);
        let existing: Option<serde_json::Value> = self.get_json(&path, "get display name").await?;

        match existing {
            Some(mut config_map) => {
                let Some(object) = config_map.as_object_mut() else {
                    return Err(BoardError::Cluster(
                        "update display name: config map is not an object".into(),
                    ));
                };
                object.insert(
                    "data".to_string(),
                    serde_json::json!({ DISPLAY_NAME_KEY: name }),
                );

                let url = format!("{}{}", self.config.api_url, path);
                debug!(owner = %owner, "Replacing display-name record");
                self.write_json(self.http_client.put(&url), &config_map, "update display name")
                    .await
            }
            None => {
                let body = serde_json::json!({
                    "apiVersion": "v1",
                    "kind": "ConfigMap",
                    "metadata": {
                        "name": display_name_record(owner),
                        "namespace": owner,
                    },
                    "data": { DISPLAY_NAME_KEY: name },
                });

                let url = format!(
                    "{}/api/v1/namespaces/{}/configmaps",
                    self.config.api_url,
                    urlencoding::encode(owner)
                );
                debug!(owner = %owner, "Creating display-name record");
                self.write_json(self.http_client.post(&url), &body, "create display name")
                    .await
            }
        }
    }
}

fn config_map_path(owner: &str) -> String {
    format!(
        "/api/v1/namespaces/{}/configmaps/{}",
        urlencoding::encode(owner),
        urlencoding::encode(&display_name_record(owner))
    )
}

async fn check_status(response: Response, what: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let excerpt: String = body.chars().take(ERROR_BODY_EXCERPT).collect();
    Err(BoardError::Cluster(format!("{}: HTTP {} {}", what, status, excerpt)))
}

// ============================================================================
// API object shapes (only the fields we read)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: String,
    #[serde(default)]
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct ObjectList<T> {
    #[serde(default = "Vec::new")]
    items: Vec<T>,
}

#[derive(Debug, Deserialize)]
struct Secret {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClusterRoleBinding {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    role_ref: Option<RoleRef>,
}

#[derive(Debug, Deserialize)]
struct RoleRef {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Pod {
    #[serde(default)]
    metadata: ObjectMeta,
    #[serde(default)]
    status: Option<PodStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PodStatus {
    #[serde(default)]
    container_statuses: Vec<ContainerStatus>,
}

#[derive(Debug, Deserialize)]
struct ContainerStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Debug, Deserialize)]
struct ConfigMap {
    #[serde(default)]
    data: Option<BTreeMap<String, String>>,
}

/// Decode base64 secret data; undecodable values are dropped
fn decode_secret(secret: Secret) -> CredentialRecord {
    let engine = base64::engine::general_purpose::STANDARD;
    let data = secret
        .data
        .unwrap_or_default()
        .into_iter()
        .filter_map(|(key, encoded)| match engine.decode(encoded.as_bytes()) {
            Ok(bytes) => Some((key, String::from_utf8_lossy(&bytes).into_owned())),
            Err(e) => {
                warn!(
                    secret = %secret.metadata.name,
                    key = %key,
                    error = %e,
                    "Skipping undecodable secret field"
                );
                None
            }
        })
        .collect();

    CredentialRecord {
        name: secret.metadata.name,
        namespace: secret.metadata.namespace,
        data,
    }
}

fn summarize_pod(pod: Pod) -> WorkloadRecord {
    let statuses = pod.status.map(|s| s.container_statuses).unwrap_or_default();
    WorkloadRecord {
        name: pod.metadata.name,
        ready_containers: statuses.iter().filter(|c| c.ready).count(),
        total_containers: statuses.len(),
    }
}
