// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Task execution command
//!
//! Plans the goal from a plan file, executes it in-process and streams
//! progress events. Ctrl-C cancels the task and waits for agents to stop.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use conductor_core::{
    application::orchestration::{OrchestrationError, OrchestrationService},
    domain::{
        config::OrchestratorConfig,
        plan::PlanSummary,
        task::{Goal, StatusReport, TaskStatus},
    },
    infrastructure::{EventBusError, StaticPlanner},
};

use crate::embedded::{print_event, status_label, EmbeddedOrchestrator};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Goal to accomplish
    #[arg(value_name = "GOAL")]
    pub goal: String,

    /// Plan file (YAML or JSON list of phases)
    #[arg(short, long, value_name = "FILE")]
    pub plan: PathBuf,

    /// Constraint passed to the planner, as key=value (value may be JSON)
    #[arg(long = "constraint", value_name = "KEY=VALUE", value_parser = parse_constraint)]
    pub constraints: Vec<(String, serde_json::Value)>,

    /// Override scheduler.max_concurrent_agents
    #[arg(long, value_name = "N")]
    pub max_agents: Option<usize>,

    /// Override scheduler.phase_timeout (e.g. "90s", "10m")
    #[arg(long, value_name = "DURATION", value_parser = parse_duration)]
    pub phase_timeout: Option<Duration>,

    /// Print the final status report as JSON
    #[arg(long)]
    pub json: bool,

    /// Do not stream progress events
    #[arg(short, long)]
    pub quiet: bool,
}

pub async fn execute(args: RunArgs, config_path: Option<PathBuf>) -> Result<()> {
    let mut config =
        OrchestratorConfig::load_or_default(config_path).context("Failed to load configuration")?;
    if let Some(max) = args.max_agents {
        config.scheduler.max_concurrent_agents = max;
    }
    if let Some(timeout) = args.phase_timeout {
        config.scheduler.phase_timeout = Some(timeout);
    }
    config
        .validate()
        .context("Configuration validation failed")?;

    let planner = StaticPlanner::from_file(&args.plan)?;
    let orchestrator = EmbeddedOrchestrator::new(config, Arc::new(planner));
    let service = orchestrator.service();

    let goal = args
        .constraints
        .into_iter()
        .fold(Goal::new(args.goal), |goal, (key, value)| {
            goal.with_constraint(key, value)
        });

    let submission = match service.submit(goal).await {
        Ok(submission) => submission,
        Err(OrchestrationError::PlanRejected(rejection)) => {
            eprintln!("{}", "Plan rejected:".red().bold());
            for violation in &rejection.violations {
                eprintln!("  - {}", violation);
            }
            anyhow::bail!("plan has {} violation(s)", rejection.violations.len());
        }
        Err(e) => return Err(e).context("Failed to submit task"),
    };

    let task_id = submission.task_id;
    if !args.quiet {
        print_summary(&submission.summary);
    }

    let mut events = service.subscribe(task_id);
    let execution = {
        let service = service.clone();
        tokio::spawn(async move { service.execute(task_id).await })
    };

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancel_requested = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(event) => {
                    if !args.quiet {
                        print_event(&event);
                    }
                    if event.is_terminal() {
                        break;
                    }
                }
                Err(EventBusError::Lagged(skipped)) => {
                    warn!("Event stream lagged, skipped {} events", skipped);
                }
                Err(_) => break,
            },
            signal = &mut ctrl_c, if !cancel_requested => {
                cancel_requested = true;
                if let Err(e) = signal {
                    warn!("Failed to listen for Ctrl-C: {}", e);
                    continue;
                }
                eprintln!("{}", "Cancelling task...".yellow());
                service.cancel(task_id).await.context("Failed to cancel task")?;
            }
        }
    }

    let status = execution
        .await
        .context("Execution task aborted")?
        .context("Task execution failed")?;
    info!("Task {} finished with status {}", task_id, status);

    let report = service.get_status(task_id).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    match status {
        TaskStatus::Completed | TaskStatus::Partial => Ok(()),
        other => anyhow::bail!("task {} finished with status {}", task_id, other),
    }
}

fn print_summary(summary: &PlanSummary) {
    println!("{} {}", "Task".bold(), summary.task_id);
    println!(
        "  {} phases, estimated cost {:.1}",
        summary.phase_count, summary.estimated_cost
    );
    for (index, wave) in summary.waves.iter().enumerate() {
        let ids: Vec<String> = wave.iter().map(ToString::to_string).collect();
        println!("  wave {}: {}", index + 1, ids.join(", "));
    }
    println!();
}

fn print_report(report: &StatusReport) {
    println!();
    println!("{} {}", "Status:".bold(), status_label(report.status));
    for phase in &report.phases {
        println!(
            "  {:<24} {:<10} {:<12} attempts={}",
            phase.id.to_string(),
            phase.role.to_string(),
            phase.state.to_string(),
            phase.attempts
        );
        if let Some(error) = &phase.last_error {
            println!("    {} {}", "last error:".dimmed(), error);
        }
    }
    if !report.errors.is_empty() {
        println!("{}", "Errors:".red().bold());
        for error in &report.errors {
            println!("  - {}", error);
        }
    }
}

fn parse_constraint(raw: &str) -> Result<(String, serde_json::Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", raw))?;
    let value = serde_json::from_str(value)
        .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
    Ok((key.trim().to_string(), value))
}

fn parse_duration(raw: &str) -> Result<Duration, String> {
    humantime_serde::re::humantime::parse_duration(raw).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_constraint_json_and_text() {
        assert_eq!(
            parse_constraint("budget=12.5").unwrap(),
            ("budget".to_string(), serde_json::json!(12.5))
        );
        assert_eq!(
            parse_constraint("language=rust").unwrap(),
            ("language".to_string(), serde_json::json!("rust"))
        );
        assert!(parse_constraint("missing-separator").is_err());
    }

    #[test]
    fn test_parse_duration() {
        assert_eq!(parse_duration("90s").unwrap(), Duration::from_secs(90));
        assert!(parse_duration("soon").is_err());
    }
}
