//! Rollcall - live status board for multi-tenant training clusters

use clap::Parser;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use rollcall::{
    cluster::{kube::KubeConfig, ClusterSource, KubeClient, MemoryCluster},
    config::Args,
    server::{self, AppState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Initialize tracing/logging
    let log_level = args.log_level.clone();
    let fmt_layer = if args.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("rollcall={},info", log_level).into()),
        )
        .with(fmt_layer)
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("======================================");
    info!("  Rollcall - training cluster board");
    info!("======================================");
    info!("Listen: {}", args.listen_addr());
    info!("Mode: {}", if args.dev_mode { "DEVELOPMENT" } else { "PRODUCTION" });
    info!("Cluster: {}.{}", args.cluster_name, args.cluster_domain);
    info!("Selector: {}", args.label_selector);
    info!("Teacher token: {}", if args.token_gate_enabled() { "set" } else { "unset" });
    info!("======================================");

    let source: Arc<dyn ClusterSource> = if args.dev_mode {
        info!("Seeding in-memory cluster with {} trainee(s)", args.dev_trainees);
        Arc::new(MemoryCluster::seeded(args.dev_trainees).await)
    } else {
        let client = KubeClient::new(KubeConfig::from_args(&args))?;
        info!("Kubernetes API: {}", client.api_url());
        Arc::new(client)
    };

    let state = Arc::new(AppState::new(args, source)?);
    server::run(state).await?;

    Ok(())
}
