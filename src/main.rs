//! Sumi-Bot main entry point
//!
//! This is the command-line interface for the Sumi-Bot fetch service.

use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use sumi_bot::config::{load_config_with_hash, Config};
use sumi_bot::extraction::FsSpecProvider;
use sumi_bot::server::{build_service, serve};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

/// Sumi-Bot: an on-demand page fetch and extraction service
///
/// Sumi-Bot keeps one fetch engine running and answers each call to
/// `POST /bot/fetch` with the fetched page and, when the caller's project
/// has a spec for the requested spider, the items extracted from it.
#[derive(Parser, Debug)]
#[command(name = "sumi-bot")]
#[command(version = "1.0.0")]
#[command(about = "An on-demand page fetch and extraction service", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Override the listen address from the config
    #[arg(long, value_name = "ADDR")]
    bind: Option<SocketAddr>,

    /// Validate config and spec root, then exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let mut config = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            cfg
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if let Some(bind) = cli.bind {
        config.server.bind = bind.to_string();
    }

    if cli.check {
        handle_check(&config)?;
    } else {
        handle_serve(config).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_bot=info,warn"),
            1 => EnvFilter::new("sumi_bot=debug,info"),
            2 => EnvFilter::new("sumi_bot=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

/// Handles the --check mode: shows the effective configuration and projects
fn handle_check(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Sumi-Bot Configuration Check ===\n");

    println!("Server:");
    println!("  Bind: {}", config.server.bind);

    println!("\nEngine:");
    println!("  Worker: {}", config.engine.worker_name);
    println!(
        "  Max concurrent fetches: {}",
        config.engine.max_concurrent_fetches
    );
    println!("  Idle interval: {}ms", config.engine.idle_interval_ms);
    println!(
        "  Timeouts: {}s request, {}s connect",
        config.engine.request_timeout_secs, config.engine.connect_timeout_secs
    );

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nExtraction:");
    println!("  Classification: {:?}", config.extraction.classification);

    let provider = FsSpecProvider::new(config.specs.root.clone());
    let projects = provider.projects()?;
    println!(
        "\nProjects in {} ({}):",
        config.specs.root.display(),
        projects.len()
    );
    for project in &projects {
        println!("  - {}", project);
    }

    println!("\n✓ Configuration is valid");

    Ok(())
}

/// Handles the main serve operation
async fn handle_serve(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let provider = Arc::new(FsSpecProvider::new(config.specs.root.clone()));
    tracing::info!("Serving specs from: {}", config.specs.root.display());

    let service = build_service(&config, provider)?;

    let listener = match TcpListener::bind(config.server.bind.as_str()).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", config.server.bind, e);
            service.supervisor.shutdown().await;
            return Err(e.into());
        }
    };

    let result = serve(listener, service.router.clone(), shutdown_signal()).await;

    service.supervisor.shutdown().await;
    if !service.pending.is_empty() {
        tracing::warn!(
            "{} requests were still pending at shutdown",
            service.pending.len()
        );
    }

    match result {
        Ok(()) => {
            tracing::info!("Server stopped");
            Ok(())
        }
        Err(e) => {
            tracing::error!("Server failed: {}", e);
            Err(e.into())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
