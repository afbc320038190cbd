// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Plan inspection commands
//!
//! Commands: validate, show

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};

use conductor_core::{
    application::validation::PlanValidator,
    domain::{config::OrchestratorConfig, plan::ExecutionPlan, task::TaskId},
    infrastructure::StaticPlanner,
};

#[derive(Subcommand)]
pub enum PlanCommand {
    /// Validate a plan file against the configured role catalog
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Show the execution waves of a plan file
    Show {
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Print the plan summary as JSON
        #[arg(long)]
        json: bool,
    },
}

pub async fn handle_command(command: PlanCommand, config_path: Option<PathBuf>) -> Result<()> {
    let config =
        OrchestratorConfig::load_or_default(config_path).context("Failed to load configuration")?;

    match command {
        PlanCommand::Validate { file } => {
            let plan = load(&config, &file)?;
            println!(
                "{}",
                format!("✓ Plan is valid ({} phases)", plan.len()).green()
            );
            Ok(())
        }
        PlanCommand::Show { file, json } => {
            let plan = load(&config, &file)?;
            let summary = plan.summary();
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
                return Ok(());
            }
            for (index, wave) in summary.waves.iter().enumerate() {
                println!("{}", format!("Wave {}", index + 1).bold());
                for id in wave {
                    if let Some(phase) = plan.get(id) {
                        let deps: Vec<String> =
                            phase.dependencies.iter().map(ToString::to_string).collect();
                        println!(
                            "  {} ({}){}",
                            id.to_string().bold(),
                            phase.role,
                            if deps.is_empty() {
                                String::new()
                            } else {
                                format!(" after {}", deps.join(", ")).dimmed().to_string()
                            }
                        );
                    }
                }
            }
            println!();
            println!("Estimated cost: {:.1}", summary.estimated_cost);
            Ok(())
        }
    }
}

fn load(config: &OrchestratorConfig, file: &Path) -> Result<ExecutionPlan> {
    let planner = StaticPlanner::from_file(file)?;
    let validator = PlanValidator::new(config.role_catalog());
    match validator.validate(TaskId::new(), planner.phases()) {
        Ok(plan) => Ok(plan),
        Err(rejection) => {
            eprintln!("{}", "Plan rejected:".red().bold());
            for violation in &rejection.violations {
                eprintln!("  - {}", violation);
            }
            Err(rejection).context(format!("{} is not a valid plan", file.display()))
        }
    }
}
