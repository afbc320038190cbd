// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Embedded mode execution
//!
//! Creates services in-process and executes commands directly.

use colored::Colorize;
use std::sync::Arc;

use conductor_core::{
    application::orchestration::{OrchestrationDeps, StandardOrchestrationService},
    domain::{
        config::OrchestratorConfig,
        events::OrchestrationEvent,
        phase::PhaseState,
        planner::Planner,
        recovery::{AttemptOutcome, HeuristicClassifier},
        task::TaskStatus,
    },
    infrastructure::{
        EventBus, InMemoryLearningStore, InMemoryTaskRepository, ProcessEnvironment,
    },
};
use conductor_swarm::CoordinationBus;

pub struct EmbeddedOrchestrator {
    service: Arc<StandardOrchestrationService>,
    bus: Arc<CoordinationBus>,
}

impl EmbeddedOrchestrator {
    pub fn new(config: OrchestratorConfig, planner: Arc<dyn Planner>) -> Self {
        let bus = Arc::new(CoordinationBus::new(config.bus.clone()));
        let event_bus = EventBus::new(config.bus.event_capacity);

        let deps = OrchestrationDeps {
            planner,
            environment: Arc::new(ProcessEnvironment::new(config.environment.clone())),
            classifier: Arc::new(HeuristicClassifier::new()),
            coordination: bus.clone(),
            repository: Arc::new(InMemoryTaskRepository::new()),
            learning: Arc::new(InMemoryLearningStore::new()),
            event_bus,
        };

        Self {
            service: Arc::new(StandardOrchestrationService::new(config, deps)),
            bus,
        }
    }

    pub fn service(&self) -> Arc<StandardOrchestrationService> {
        self.service.clone()
    }

    pub fn coordination(&self) -> &CoordinationBus {
        &self.bus
    }
}

pub fn print_event(event: &OrchestrationEvent) {
    match event {
        OrchestrationEvent::PlanAccepted { summary, .. } => {
            println!(
                "{} {} phases in {} waves",
                "Plan accepted:".bold(),
                summary.phase_count,
                summary.waves.len()
            );
        }
        OrchestrationEvent::PhaseStateChanged { phase_id, from, to, .. } => {
            let to_label = match to {
                PhaseState::Completed => to.to_string().green(),
                PhaseState::Failed | PhaseState::Escalated => to.to_string().red(),
                PhaseState::Cancelled => to.to_string().yellow(),
                _ => to.to_string().cyan(),
            };
            println!("  {} {} -> {}", phase_id.to_string().bold(), from.to_string().dimmed(), to_label);
        }
        OrchestrationEvent::AgentSpawned { agent_id, role, .. } => {
            println!("  {} {} ({})", "spawned".dimmed(), agent_id, role);
        }
        OrchestrationEvent::AgentTerminated { agent_id, .. } => {
            println!("  {} {}", "terminated".dimmed(), agent_id);
        }
        OrchestrationEvent::RecoveryAttempted { attempt, .. } => {
            let verdict = match attempt.outcome {
                AttemptOutcome::RetryScheduled => "retry".yellow(),
                AttemptOutcome::Escalated => "escalate".red(),
            };
            println!(
                "  {} {} attempt {} [{} {:.2}] {} via {}",
                "recovery".magenta(),
                attempt.phase_id,
                attempt.attempt,
                attempt.classification.as_str(),
                attempt.confidence,
                verdict,
                attempt.strategy
            );
        }
        OrchestrationEvent::TaskFinished { status, .. } => {
            println!("{} {}", "Task finished:".bold(), status_label(*status));
        }
    }
}

pub fn status_label(status: TaskStatus) -> colored::ColoredString {
    match status {
        TaskStatus::Completed => status.to_string().green().bold(),
        TaskStatus::Partial => status.to_string().yellow().bold(),
        TaskStatus::Failed => status.to_string().red().bold(),
        TaskStatus::Cancelled => status.to_string().yellow(),
        TaskStatus::Pending | TaskStatus::Running => status.to_string().cyan(),
    }
}
