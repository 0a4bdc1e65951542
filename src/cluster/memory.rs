//! In-memory cluster source
//!
//! Used by tests and development mode. Supports simple equality label
//! selectors and per-resource failure injection.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use super::{
    admin_binding_name, workload_selector, ClusterSource, CredentialRecord, RoleBindingRecord,
    WorkloadRecord,
};
use crate::types::{BoardError, Result};

#[derive(Debug, Clone)]
struct StoredCredential {
    labels: BTreeMap<String, String>,
    record: CredentialRecord,
}

#[derive(Debug, Clone)]
struct StoredWorkload {
    labels: BTreeMap<String, String>,
    record: WorkloadRecord,
}

#[derive(Default)]
struct MemoryState {
    credentials: Vec<StoredCredential>,
    role_bindings: HashSet<String>,
    /// owner namespace -> workloads
    workloads: HashMap<String, Vec<StoredWorkload>>,
    display_names: HashMap<String, String>,
}

/// Failure switches, one per resource kind
#[derive(Default)]
struct Faults {
    credentials: AtomicBool,
    role_bindings: AtomicBool,
    workloads: AtomicBool,
    display_names: AtomicBool,
    writes: AtomicBool,
}

/// Cluster source held entirely in memory
#[derive(Default)]
pub struct MemoryCluster {
    state: RwLock<MemoryState>,
    faults: Faults,
    workload_queries: AtomicUsize,
    role_binding_queries: AtomicUsize,
}

/// Labels carried by seeded credential records
pub const DEFAULT_CREDENTIAL_LABEL: (&str, &str) = ("acend-userconfig", "true");

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `count` trainees `user1..userN` labelled for the default selector
    pub async fn seeded(count: usize) -> Self {
        let cluster = Self::new();
        for i in 1..=count {
            let username = format!("user{}", i);
            let password = uuid::Uuid::new_v4().simple().to_string()[..12].to_string();
            cluster.add_trainee(&username, &password).await;
            cluster.set_workload_ready(&username, i % 2 == 1).await;
        }
        cluster
    }

    /// Add a credential record with the default label and field keys
    pub async fn add_trainee(&self, username: &str, password: &str) {
        let data = BTreeMap::from([
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ]);
        let labels = BTreeMap::from([(
            DEFAULT_CREDENTIAL_LABEL.0.to_string(),
            DEFAULT_CREDENTIAL_LABEL.1.to_string(),
        )]);
        self.add_credential(labels, username, data).await;
    }

    /// Add an arbitrary credential record
    pub async fn add_credential(
        &self,
        labels: BTreeMap<String, String>,
        namespace: &str,
        data: BTreeMap<String, String>,
    ) {
        let mut state = self.state.write().await;
        let name = format!("{}-credentials-{}", namespace, state.credentials.len());
        state.credentials.push(StoredCredential {
            labels,
            record: CredentialRecord {
                name,
                namespace: namespace.to_string(),
                data,
            },
        });
    }

    /// Create the admin role binding for `username`
    pub async fn add_admin(&self, username: &str) {
        self.state
            .write()
            .await
            .role_bindings
            .insert(admin_binding_name(username));
    }

    /// Replace the webshell workload of `owner` with one ready or idle pod
    pub async fn set_workload_ready(&self, owner: &str, ready: bool) {
        let instance = workload_selector(owner);
        let (key, value) = instance.split_once('=').unwrap_or((instance.as_str(), ""));
        let labels = BTreeMap::from([(key.to_string(), value.to_string())]);

        let workload = StoredWorkload {
            labels,
            record: WorkloadRecord {
                name: format!("{}-webshell-0", owner),
                ready_containers: usize::from(ready),
                total_containers: 1,
            },
        };

        self.state
            .write()
            .await
            .workloads
            .insert(owner.to_string(), vec![workload]);
    }

    pub async fn set_display_name(&self, owner: &str, name: &str) {
        self.state
            .write()
            .await
            .display_names
            .insert(owner.to_string(), name.to_string());
    }

    pub fn fail_credentials(&self, fail: bool) {
        self.faults.credentials.store(fail, Ordering::SeqCst);
    }

    pub fn fail_role_bindings(&self, fail: bool) {
        self.faults.role_bindings.store(fail, Ordering::SeqCst);
    }

    pub fn fail_workloads(&self, fail: bool) {
        self.faults.workloads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_display_names(&self, fail: bool) {
        self.faults.display_names.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.faults.writes.store(fail, Ordering::SeqCst);
    }

    /// Number of workload listings served so far
    pub fn workload_queries(&self) -> usize {
        self.workload_queries.load(Ordering::SeqCst)
    }

    /// Number of role-binding lookups served so far
    pub fn role_binding_queries(&self) -> usize {
        self.role_binding_queries.load(Ordering::SeqCst)
    }
}

fn injected(flag: &AtomicBool, what: &str) -> Result<()> {
    if flag.load(Ordering::SeqCst) {
        Err(BoardError::Cluster(format!("{}: injected failure", what)))
    } else {
        Ok(())
    }
}

/// Match equality-based selectors: `k=v`, `k==v`, `k!=v` and bare `k`
pub fn selector_matches(selector: &str, labels: &BTreeMap<String, String>) -> bool {
    selector
        .split(',')
        .map(str::trim)
        .filter(|term| !term.is_empty())
        .all(|term| {
            if let Some((key, value)) = term.split_once("!=") {
                labels.get(key.trim()).map(String::as_str) != Some(value.trim())
            } else if let Some((key, value)) = term.split_once("==").or_else(|| term.split_once('=')) {
                labels.get(key.trim()).map(String::as_str) == Some(value.trim())
            } else {
                labels.contains_key(term)
            }
        })
}

#[async_trait::async_trait]
impl ClusterSource for MemoryCluster {
    async fn list_credentials(&self, selector: &str) -> Result<Vec<CredentialRecord>> {
        injected(&self.faults.credentials, "list secrets")?;

        let state = self.state.read().await;
        Ok(state
            .credentials
            .iter()
            .filter(|c| selector_matches(selector, &c.labels))
            .map(|c| c.record.clone())
            .collect())
    }

    async fn get_role_binding(&self, name: &str) -> Result<Option<RoleBindingRecord>> {
        self.role_binding_queries.fetch_add(1, Ordering::SeqCst);
        injected(&self.faults.role_bindings, "get role binding")?;

        let state = self.state.read().await;
        Ok(state.role_bindings.get(name).map(|name| RoleBindingRecord {
            name: name.clone(),
            role: Some("cluster-admin".to_string()),
        }))
    }

    async fn list_workloads(&self, owner: &str, selector: &str) -> Result<Vec<WorkloadRecord>> {
        self.workload_queries.fetch_add(1, Ordering::SeqCst);
        injected(&self.faults.workloads, "list pods")?;

        let state = self.state.read().await;
        Ok(state
            .workloads
            .get(owner)
            .map(|workloads| {
                workloads
                    .iter()
                    .filter(|w| selector_matches(selector, &w.labels))
                    .map(|w| w.record.clone())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn get_display_name(&self, owner: &str) -> Result<Option<String>> {
        injected(&self.faults.display_names, "get display name")?;
        Ok(self.state.read().await.display_names.get(owner).cloned())
    }

    async fn upsert_display_name(&self, owner: &str, name: &str) -> Result<()> {
        injected(&self.faults.writes, "update display name")?;
        self.set_display_name(owner, name).await;
        Ok(())
    }
}
