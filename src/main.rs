//! SDN load balancer.
//!
//! ```text
//!                 ┌──────────────────────────────────────────────────┐
//!   client ──────▶│ switch: flow table hit → rewrite dst → backend   │──────▶ backend
//!          ◀──────│         reverse entry  → rewrite src → client    │◀──────
//!                 │                                                  │
//!                 │   miss: buffer + PacketIn    InstallPair+PacketOut│
//!                 │              │                        ▲          │
//!                 └──────────────┼────────────────────────┼──────────┘
//!                                ▼                        │
//!                 ┌──────────────────────────────────────────────────┐
//!                 │ controller: bindings + policy + backend pool     │
//!                 └──────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;

use clap::Parser;

use sdn_balancer::config::{load_config, BalancerConfig, ConfigWatcher};
use sdn_balancer::lifecycle::{signals, Deployment};
use sdn_balancer::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "sdn-balancer")]
#[command(about = "Flow-programming load balancer for a virtual service endpoint", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Validate the configuration and exit.
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BalancerConfig::default(),
    };

    if cli.check {
        println!("configuration ok ({} backends)", config.backends.len());
        return Ok(());
    }

    logging::init(&config.observability);
    tracing::info!("sdn-balancer v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let mut deployment = Deployment::start(&config);

    if let Some(mut egress) = deployment.take_egress() {
        tokio::spawn(async move {
            while let Some(out) = egress.recv().await {
                tracing::trace!(port = %out.port, flow = %out.packet.key, bytes = out.packet.len(), "Egress");
            }
        });
    }

    // Keep the watcher alive for the life of the process.
    let _watcher = match &cli.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path, config.clone());
            let handle = deployment.controller.clone();
            tokio::spawn(async move {
                while let Some(next) = updates.recv().await {
                    if let Err(e) = handle.reconcile(&next.backends).await {
                        tracing::error!(error = %e, "Failed to apply reloaded backends");
                    }
                }
            });
            match watcher.run() {
                Ok(watcher) => Some(watcher),
                Err(e) => {
                    tracing::warn!(error = %e, "Config hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    signals::wait_for_signal().await;

    let stats = deployment.controller.flow_stats();
    tracing::info!(
        pending = stats.pending,
        established = stats.established,
        table_entries = deployment.switch.table().len(),
        "Stopping"
    );
    deployment.stop().await;
    Ok(())
}
