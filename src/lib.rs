//! Rollcall - live status board for multi-tenant training clusters
//!
//! Rollcall lists the trainees provisioned on a cluster, lets them pick a
//! display name, and keeps every open board in sync over a WebSocket.
//!
//! ## Components
//!
//! - **Roster**: aggregation of credential, admin and workload records
//! - **Hub**: single-writer actor owning connections and the lock table
//! - **Bridge**: rebroadcasts the name mapping after a write
//! - **Cluster**: Kubernetes REST client and an in-memory stand-in

pub mod bridge;
pub mod cluster;
pub mod config;
pub mod hub;
pub mod roster;
pub mod routes;
pub mod server;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{BoardError, Result};
