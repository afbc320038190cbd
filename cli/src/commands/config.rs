// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use conductor_core::domain::config::{OrchestratorConfig, CONFIG_PATH_ENV};

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./conductor-config.yaml)
        #[arg(short, long, default_value = "./conductor-config.yaml")]
        output: PathBuf,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output } => generate(output).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = OrchestratorConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            CONFIG_PATH_ENV,
            std::env::var(CONFIG_PATH_ENV)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./conductor-config.yaml");
        println!("  4. ~/.conductor/config.yaml");
        println!("  5. /etc/conductor/config.yaml");
        println!();
    }

    println!("{}", "Scheduler:".bold());
    println!("  Max concurrent agents: {}", config.scheduler.max_concurrent_agents);
    for (role, cap) in &config.scheduler.per_role_caps {
        println!("  Cap for {}: {}", role, cap);
    }
    match config.scheduler.phase_timeout {
        Some(timeout) => println!("  Phase timeout: {:?}", timeout),
        None => println!("  Phase timeout: {}", "(none)".dimmed()),
    }
    println!();

    println!("{}", "Recovery:".bold());
    println!("  Confidence threshold: {}", config.recovery.confidence_threshold);
    println!("  Max attempts per phase: {}", config.recovery.max_attempts_per_phase);
    println!("  Max recovery decisions per task: {}", config.recovery.max_task_recovery_attempts);
    println!(
        "  Backoff: {:?} doubling up to {:?}",
        config.recovery.backoff_base, config.recovery.backoff_max
    );
    println!("  Help timeout: {:?}", config.recovery.help_timeout);
    println!();

    println!("{}", "Roles:".bold());
    let catalog = config.role_catalog();
    for role in catalog.roles() {
        let command = config
            .environment
            .commands
            .get(&role)
            .or(config.environment.default_command.as_ref());
        match command {
            Some(spec) => println!("  {} → {} {}", role.to_string().bold(), spec.program, spec.args.join(" ")),
            None => println!("  {} → {}", role.to_string().bold(), "(no command)".red()),
        }
    }
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = OrchestratorConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf) -> Result<()> {
    OrchestratorConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
