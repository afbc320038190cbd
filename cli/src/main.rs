// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Conductor CLI
//!
//! The `conductor` binary runs a task end to end in-process: it loads a plan
//! file, validates it, schedules its phases on a bounded pool of agent
//! processes and streams progress until the task reaches a terminal status.
//!
//! ## Commands
//!
//! - `conductor run <GOAL> --plan <FILE>` - Execute a task
//! - `conductor plan validate|show <FILE>` - Inspect a plan without running it
//! - `conductor config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;

use conductor_cli::commands::{self, ConfigCommand, PlanCommand, RunArgs};

/// Conductor - run goals as dependency-ordered plans on a pool of agents
#[derive(Parser)]
#[command(name = "conductor")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "CONDUCTOR_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "CONDUCTOR_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Expose Prometheus metrics on this address while running
    #[arg(long, global = true, env = "CONDUCTOR_METRICS_ADDR", value_name = "ADDR")]
    metrics_addr: Option<SocketAddr>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan and execute a goal
    #[command(name = "run")]
    Run(RunArgs),

    /// Inspect plan files
    #[command(name = "plan")]
    Plan {
        #[command(subcommand)]
        command: PlanCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env is optional
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    init_logging(&cli.log_level)?;

    if let Some(addr) = cli.metrics_addr {
        metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to start metrics exporter")?;
        info!("Serving metrics on http://{}/metrics", addr);
    }

    match cli.command {
        Commands::Run(args) => commands::run::execute(args, cli.config).await,
        Commands::Plan { command } => commands::plan::handle_command(command, cli.config).await,
        Commands::Config { command } => {
            commands::config::handle_command(command, cli.config).await
        }
    }
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();

    Ok(())
}
