//! Glue between display-name writes and the realtime hub
//!
//! After a write succeeds the full name mapping is recomputed and handed to
//! the hub as one broadcast. The writer never waits for this.

use std::collections::BTreeMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::hub::HubHandle;
use crate::roster::Roster;
use crate::types::Result;

#[derive(Clone)]
pub struct UpdateBridge {
    roster: Roster,
    hub: HubHandle,
}

impl UpdateBridge {
    pub fn new(roster: Roster, hub: HubHandle) -> Self {
        Self { roster, hub }
    }

    /// Recompute names and broadcast them in the background
    pub fn on_display_name_written(&self, username: &str) -> JoinHandle<()> {
        let bridge = self.clone();
        let username = username.to_string();

        tokio::spawn(async move {
            match bridge.rebroadcast().await {
                Ok(count) => debug!(username = %username, trainees = count, "Names rebroadcast"),
                Err(e) => warn!(username = %username, error = %e, "Failed to rebroadcast names"),
            }
        })
    }

    /// Recompute the name mapping and submit it; returns the mapping size
    pub async fn rebroadcast(&self) -> Result<usize> {
        let names: BTreeMap<String, String> = self.roster.display_names().await?;
        let count = names.len();
        self.hub.broadcast_names(names).await?;
        Ok(count)
    }
}
