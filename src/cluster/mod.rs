//! Cluster resource access
//!
//! The board reads three independent resource kinds from the cluster and
//! writes one:
//!
//! - credential records (secrets carrying a trainee username/password)
//! - role bindings (`cluster-admin-<username>` marks an admin)
//! - workloads (pods of the trainee's webshell, for readiness)
//! - display-name records (one config map per trainee, read and upserted)
//!
//! [`ClusterSource`] is the seam between the aggregation pipeline and the
//! cluster. [`KubeClient`] talks to a real API server, [`MemoryCluster`] backs
//! tests and development mode.

pub mod kube;
pub mod memory;

pub use kube::KubeClient;
pub use memory::MemoryCluster;

use std::collections::BTreeMap;

use crate::types::Result;

/// Data key holding the display name inside a display-name record
pub const DISPLAY_NAME_KEY: &str = "displayName";

/// Name of the role binding whose existence marks `username` as an admin
pub fn admin_binding_name(username: &str) -> String {
    format!("cluster-admin-{}", username)
}

/// Label selector matching the webshell workload owned by `username`
pub fn workload_selector(username: &str) -> String {
    format!("app.kubernetes.io/instance={}-webshell", username)
}

/// Name of the display-name record stored in the trainee's namespace
pub fn display_name_record(username: &str) -> String {
    format!("trainee-displayname-{}", username)
}

/// A credential record with its data already decoded
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialRecord {
    pub name: String,
    pub namespace: String,
    pub data: BTreeMap<String, String>,
}

impl CredentialRecord {
    /// Look up a decoded data field
    pub fn field(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleBindingRecord {
    pub name: String,
    /// Referenced role, informational only
    pub role: Option<String>,
}

/// Readiness summary of one workload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkloadRecord {
    pub name: String,
    pub ready_containers: usize,
    pub total_containers: usize,
}

impl WorkloadRecord {
    pub fn is_ready(&self) -> bool {
        self.ready_containers > 0
    }
}

/// Read/write access to the cluster resources the board depends on
///
/// Implementations return `Ok(None)` for resources that do not exist and
/// reserve `Err` for failed fetches.
#[async_trait::async_trait]
pub trait ClusterSource: Send + Sync {
    /// List credential records matching a label selector, across namespaces
    async fn list_credentials(&self, selector: &str) -> Result<Vec<CredentialRecord>>;

    /// Fetch a cluster-scoped role binding by name
    async fn get_role_binding(&self, name: &str) -> Result<Option<RoleBindingRecord>>;

    /// List workloads in the owner's namespace matching a label selector
    async fn list_workloads(&self, owner: &str, selector: &str) -> Result<Vec<WorkloadRecord>>;

    /// Read the display name stored for `owner`
    async fn get_display_name(&self, owner: &str) -> Result<Option<String>>;

    /// Create or replace the display name stored for `owner`
    async fn upsert_display_name(&self, owner: &str, name: &str) -> Result<()>;
}
