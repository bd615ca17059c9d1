//! roomlb - session-affine load balancer
//!
//! Usage:
//!     roomlb --config <path>
//!
//! See --help for more options.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

use roomlb::backend::SessionRouter;
use roomlb::config::{Config, load_config};
use roomlb::frontend::FrontendListener;
use roomlb::metrics::{MetricsCollector, MetricsServer};
use roomlb::util::{ShutdownSignal, init_logging};

/// Session-affine load balancer that pins each session to one backend.
#[derive(Parser, Debug)]
#[command(name = "roomlb")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(&cli.config).with_context(|| {
        format!(
            "failed to load configuration from '{}'",
            cli.config.display()
        )
    })?;

    // CLI overrides config
    let log_level = cli
        .log_level
        .as_deref()
        .unwrap_or(&config.global.log_level);

    init_logging(log_level, &config.global.log_format)
        .context("failed to initialize logging")?;

    if cli.validate {
        info!("Configuration is valid");
        println!("Configuration is valid.");
        println!("  Listen: {}", config.frontend.listen);
        println!("  Session header: {}", config.frontend.session_header);
        println!("  Algorithm: {:?}", config.balancer.algorithm);
        println!("  Servers: {}", config.balancer.servers.len());
        for server in &config.balancer.servers {
            println!("    - {}", server);
        }
        return Ok(());
    }

    info!(
        config_path = %cli.config.display(),
        listen = %config.frontend.listen,
        algorithm = ?config.balancer.algorithm,
        servers = config.balancer.servers.len(),
        "roomlb starting"
    );

    run(config)
}

/// Run the load balancer with the given configuration.
fn run(config: Config) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;

    runtime.block_on(async { run_async(config).await })
}

/// Async entry point for the load balancer.
async fn run_async(config: Config) -> Result<()> {
    let shutdown = ShutdownSignal::new();
    let metrics = MetricsCollector::new();
    let router = Arc::new(SessionRouter::new(&config.balancer, metrics.clone()));

    let mut handles = Vec::new();

    if config.global.metrics.enabled {
        let address = config.global.metrics.address;
        let server = MetricsServer::bind(address, &config.global.metrics.path, metrics.clone())
            .await
            .with_context(|| format!("failed to bind metrics server on {}", address))?;

        let shutdown_rx = shutdown.subscribe();
        handles.push(tokio::spawn(server.run(shutdown_rx)));
    }

    let listen = config.frontend.listen;
    let listener = FrontendListener::bind(config.frontend, Arc::clone(&router), metrics)
        .await
        .with_context(|| format!("failed to bind frontend on {}", listen))?;

    let shutdown_rx = shutdown.subscribe();
    handles.push(tokio::spawn(listener.run(shutdown_rx)));

    info!("roomlb is running");
    info!("press Ctrl+C to stop");

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("received shutdown signal");
        }
        Err(e) => {
            error!(error = %e, "failed to listen for shutdown signal");
        }
    }

    shutdown.trigger();

    for handle in handles {
        let _ = handle.await;
    }

    let sessions: usize = router.snapshot().iter().map(|b| b.sessions).sum();
    info!(sessions, "roomlb shut down complete");
    Ok(())
}
