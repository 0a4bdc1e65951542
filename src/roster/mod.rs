//! Trainee roster aggregation
//!
//! Reconciles credential records, admin role bindings and workload readiness
//! into one ordered list of [`TraineeView`]s.
//!
//! ## Pipeline
//!
//! 1. List credential records for the configured label selector and extract
//!    username/password via the configured field keys (first record wins for
//!    a repeated username).
//! 2. Look up `cluster-admin-<username>`. Trainee scope drops admins, teacher
//!    scope keeps them flagged `isAdmin`.
//! 3. Teacher scope only: list the trainee's webshell workloads; ready when any
//!    workload has a ready container.
//! 4. Resolve the display name, soft-failing to an empty string.
//! 5. Stable sort by the numeric suffix of `user<N>` names.
//!
//! Per-trainee lookups run with bounded concurrency but results keep fetch
//! order, so the final sort stays deterministic.

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cluster::{admin_binding_name, workload_selector, ClusterSource};
use crate::config::Args;
use crate::types::{BoardError, Result};

/// Literal prefix of numbered trainee usernames
pub const USERNAME_PREFIX: &str = "user";

/// Who the listing is built for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Trainee-facing board: admins hidden, readiness not probed
    Trainee,
    /// Teacher board: admins flagged, readiness probed
    Teacher,
}

impl Scope {
    pub fn is_privileged(self) -> bool {
        matches!(self, Scope::Teacher)
    }
}

/// One row of the board
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraineeView {
    pub username: String,
    pub password: String,
    pub display_name: String,
    pub is_admin: bool,
    pub is_ready: bool,
}

/// Aggregation settings
#[derive(Debug, Clone)]
pub struct RosterSettings {
    pub label_selector: String,
    pub username_key: String,
    pub password_key: String,
    /// Per-trainee lookups in flight at once
    pub fetch_concurrency: usize,
}

impl Default for RosterSettings {
    fn default() -> Self {
        Self {
            label_selector: "acend-userconfig=true".to_string(),
            username_key: "username".to_string(),
            password_key: "password".to_string(),
            fetch_concurrency: 8,
        }
    }
}

impl RosterSettings {
    pub fn from_args(args: &Args) -> Self {
        Self {
            label_selector: args.label_selector.clone(),
            username_key: args.username_key.clone(),
            password_key: args.password_key.clone(),
            fetch_concurrency: args.fetch_concurrency.max(1),
        }
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    username: String,
    password: String,
}

/// Aggregation pipeline over a cluster source
#[derive(Clone)]
pub struct Roster {
    source: Arc<dyn ClusterSource>,
    settings: RosterSettings,
}

impl Roster {
    pub fn new(source: Arc<dyn ClusterSource>, settings: RosterSettings) -> Self {
        Self { source, settings }
    }

    /// Build the ordered board for `scope`
    ///
    /// Any failed credential, role-binding or workload fetch fails the whole
    /// listing. Display-name lookups never do.
    pub async fn trainee_views(&self, scope: Scope) -> Result<Vec<TraineeView>> {
        let candidates = self.candidates().await?;
        let total = candidates.len();

        let enriched: Vec<Option<TraineeView>> = stream::iter(
            candidates
                .into_iter()
                .map(|candidate| self.enrich(candidate, scope)),
        )
        .buffered(self.settings.fetch_concurrency)
        .try_collect()
        .await?;

        let mut views: Vec<TraineeView> = enriched.into_iter().flatten().collect();
        sort_trainees(&mut views);

        debug!(
            scope = ?scope,
            candidates = total,
            listed = views.len(),
            "Built trainee listing"
        );

        Ok(views)
    }

    /// Current `username -> displayName` mapping for every known trainee
    pub async fn display_names(&self) -> Result<BTreeMap<String, String>> {
        let candidates = self.candidates().await?;

        let names: Vec<(String, String)> = stream::iter(candidates.into_iter().map(|c| async move {
            let name = self.resolve_display_name(&c.username).await;
            (c.username, name)
        }))
        .buffered(self.settings.fetch_concurrency)
        .collect()
        .await;

        Ok(names.into_iter().collect())
    }

    /// Persist a display name
    pub async fn set_display_name(&self, username: &str, name: &str) -> Result<()> {
        if username.trim().is_empty() {
            return Err(BoardError::BadRequest("Missing username".to_string()));
        }

        self.source.upsert_display_name(username, name).await?;
        info!(username = %username, "Display name updated");
        Ok(())
    }

    /// Credential candidates in fetch order, one per distinct username
    async fn candidates(&self) -> Result<Vec<Candidate>> {
        let records = self
            .source
            .list_credentials(&self.settings.label_selector)
            .await?;

        let mut seen = HashSet::new();
        let mut candidates = Vec::with_capacity(records.len());

        for record in records {
            let Some(username) = record
                .field(&self.settings.username_key)
                .filter(|u| !u.is_empty())
            else {
                warn!(
                    record = %record.name,
                    namespace = %record.namespace,
                    key = %self.settings.username_key,
                    "Credential record has no username, skipping"
                );
                continue;
            };

            if !seen.insert(username.to_string()) {
                debug!(username = %username, record = %record.name, "Duplicate credential record");
                continue;
            }

            candidates.push(Candidate {
                username: username.to_string(),
                password: record
                    .field(&self.settings.password_key)
                    .unwrap_or_default()
                    .to_string(),
            });
        }

        Ok(candidates)
    }

    async fn enrich(&self, candidate: Candidate, scope: Scope) -> Result<Option<TraineeView>> {
        let is_admin = self
            .source
            .get_role_binding(&admin_binding_name(&candidate.username))
            .await?
            .is_some();

        if is_admin && !scope.is_privileged() {
            return Ok(None);
        }

        let is_ready = if scope.is_privileged() {
            self.source
                .list_workloads(&candidate.username, &workload_selector(&candidate.username))
                .await?
                .iter()
                .any(|w| w.is_ready())
        } else {
            false
        };

        let display_name = self.resolve_display_name(&candidate.username).await;

        Ok(Some(TraineeView {
            username: candidate.username,
            password: candidate.password,
            display_name,
            is_admin,
            is_ready,
        }))
    }

    async fn resolve_display_name(&self, username: &str) -> String {
        match self.source.get_display_name(username).await {
            Ok(name) => name.unwrap_or_default(),
            Err(e) => {
                debug!(username = %username, error = %e, "Display name unavailable");
                String::new()
            }
        }
    }
}

/// Numeric ordering key: `N` for `user<N>`, otherwise 0
pub fn sort_key(username: &str) -> u64 {
    username
        .strip_prefix(USERNAME_PREFIX)
        .filter(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|digits| digits.parse().ok())
        .unwrap_or(0)
}

/// Stable sort by [`sort_key`]
pub fn sort_trainees(views: &mut [TraineeView]) {
    views.sort_by_key(|v| sort_key(&v.username));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(username: &str) -> TraineeView {
        TraineeView {
            username: username.to_string(),
            password: String::new(),
            display_name: String::new(),
            is_admin: false,
            is_ready: false,
        }
    }

    fn names(views: &[TraineeView]) -> Vec<&str> {
        views.iter().map(|v| v.username.as_str()).collect()
    }

    #[test]
    fn test_sort_key() {
        assert_eq!(sort_key("user1"), 1);
        assert_eq!(sort_key("user10"), 10);
        assert_eq!(sort_key("user007"), 7);
        assert_eq!(sort_key("user"), 0);
        assert_eq!(sort_key("user-3"), 0);
        assert_eq!(sort_key("user+3"), 0);
        assert_eq!(sort_key("teacher"), 0);
        assert_eq!(sort_key("User5"), 0);
        assert_eq!(sort_key("user99999999999999999999999"), 0);
    }

    #[test]
    fn test_numeric_not_lexicographic() {
        let mut views = vec![view("user2"), view("user10"), view("user1")];
        sort_trainees(&mut views);
        assert_eq!(names(&views), ["user1", "user2", "user10"]);
    }

    #[test]
    fn test_unmatched_names_keep_fetch_order() {
        let mut views = vec![
            view("user3"),
            view("zeta"),
            view("user1"),
            view("alpha"),
            view("user0"),
        ];
        sort_trainees(&mut views);
        assert_eq!(names(&views), ["zeta", "alpha", "user0", "user1", "user3"]);
    }

    #[test]
    fn test_scope_flag() {
        assert!(Scope::Teacher.is_privileged());
        assert!(!Scope::Trainee.is_privileged());
    }

    #[test]
    fn test_view_serializes_camel_case() {
        let json = serde_json::to_value(view("user1")).unwrap();
        assert_eq!(json["displayName"], "");
        assert_eq!(json["isAdmin"], false);
        assert_eq!(json["isReady"], false);
    }
}
