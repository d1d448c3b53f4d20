//! OWServer poller - Main Entry Point

use anyhow::Context;
use clap::{Parser, Subcommand};
use owserver_poller::{
    discovery::NetworkDiscovery,
    logging::{init_logging, LogConfig},
    PollerConfig, PollingScheduler,
};
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};

/// OWServer poller configuration
#[derive(Parser, Debug)]
#[command(name = "owserver-poller")]
#[command(about = "Poll EDS 1-Wire OWServers and decode their sensors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// TOML configuration file
    #[arg(long, short, global = true, env = "OWSERVER_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll forever until Ctrl-C (default)
    Run,
    /// Run a single poll cycle and print the report
    Once,
    /// Broadcast a discovery probe and print the servers that answer
    Discover,
    /// Print the ROM IDs found on every server
    Sensors,
    /// Log the raw details.xml of every server
    Dump {
        /// Also write the dump to a dated file in this directory
        #[arg(long)]
        dir: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = PollerConfig::load(cli.config.as_deref()).context("Invalid configuration")?;

    let mut log_config = LogConfig::from_config(&config.logging);
    if cli.debug {
        log_config = log_config.with_level(Level::DEBUG);
    }
    init_logging(log_config).map_err(|e| anyhow::anyhow!("Failed to initialize logging: {e}"))?;

    info!("🚀 Starting owserver-poller v{}", env!("CARGO_PKG_VERSION"));

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let mut scheduler = PollingScheduler::from_config(config)?;
            info!("📋 {} devices configured", scheduler.store().len());

            let cancel = CancellationToken::new();
            let signal_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("🛑 Stop requested");
                    signal_cancel.cancel();
                }
            });

            scheduler.run_forever(cancel).await;
        }
        Command::Once => {
            let mut scheduler = PollingScheduler::from_config(config)?;
            let report = scheduler.run_cycle().await;
            println!("Servers polled:  {}", report.servers_polled);
            println!("Sensors updated: {}", report.sensors_updated);
            if !report.servers_failed.is_empty() {
                println!("Servers failed:  {}", report.servers_failed.join(", "));
            }
            if !report.newly_offline.is_empty() {
                println!("Now offline:     {}", report.newly_offline.join(", "));
            }
            for device in scheduler.store().devices() {
                let primary = device
                    .primary_value
                    .as_ref()
                    .map(ToString::to_string)
                    .unwrap_or_else(|| "-".to_string());
                let status = if device.online { "online" } else { "offline" };
                println!("{:<24} {:<8} {}", device.name, status, primary);
            }
        }
        Command::Discover => {
            let servers = NetworkDiscovery::from_config(&config.discovery).discover().await;
            if servers.is_empty() {
                println!("No OWServers found");
            }
            for server in servers {
                println!("{server}");
            }
        }
        Command::Sensors => {
            let scheduler = PollingScheduler::from_config(config)?;
            for (server, roms) in scheduler.sensor_list().await {
                println!("{server}:");
                for rom in roms {
                    println!("  {rom}");
                }
            }
        }
        Command::Dump { dir } => {
            let scheduler = PollingScheduler::from_config(config)?;
            for (server, passed) in scheduler.dump_details(dir.as_deref()).await? {
                println!("{server}: {}", if passed { "passed" } else { "failed" });
            }
        }
    }

    Ok(())
}
