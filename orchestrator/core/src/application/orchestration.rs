// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestration Service
//!
//! The caller-facing contract of the core: `submit`, `execute`,
//! `get_status` and `cancel`, plus a per-task event subscription.
//!
//! `submit` asks the planner to decompose the goal (with outcomes of similar
//! past runs as context), validates the result and parks the accepted plan.
//! `execute` drives the plan to a terminal status on a dedicated
//! [`TaskRunner`]; it returns once the task has finished. `cancel` may be
//! called from any other task at any time.
//!
//! A finished task is dropped from memory once the repository holds its
//! terminal status and the closing record entry; later calls are answered
//! from the repository.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::recovery::RecoveryEngine;
use crate::application::runner::{RunnerServices, TaskProgress, TaskRunner};
use crate::application::validation::PlanValidator;
use crate::domain::config::OrchestratorConfig;
use crate::domain::coordination::CoordinationPort;
use crate::domain::events::OrchestrationEvent;
use crate::domain::plan::{ExecutionPlan, PlanSummary, PlanValidationError};
use crate::domain::planner::{Planner, PlannerError};
use crate::domain::record::{ExecutionRecord, RecordEvent};
use crate::domain::recovery::{FailureClassifier, PastOutcome};
use crate::domain::repository::{LearningStore, RepositoryError, TaskRepository};
use crate::domain::runtime::ExecutionEnvironment;
use crate::domain::task::{Goal, StatusReport, TaskId, TaskStatus};
use crate::infrastructure::event_bus::{EventBus, TaskEventReceiver};

/// Past runs handed to the planner as context.
const SIMILAR_RUNS_LIMIT: usize = 5;

#[derive(Debug, Error)]
pub enum OrchestrationError {
    #[error(transparent)]
    Planner(#[from] PlannerError),

    #[error("Plan rejected: {0}")]
    PlanRejected(#[from] PlanValidationError),

    #[error("Task {0} not found")]
    TaskNotFound(TaskId),

    #[error("Task {0} is already executing")]
    AlreadyStarted(TaskId),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Submission {
    pub task_id: TaskId,
    pub summary: PlanSummary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelAck {
    pub task_id: TaskId,
    /// Execution had started and was interrupted.
    pub was_running: bool,
    /// The task had already reached a terminal status; nothing changed.
    pub already_finished: bool,
}

#[async_trait]
pub trait OrchestrationService: Send + Sync {
    async fn submit(&self, goal: Goal) -> Result<Submission, OrchestrationError>;

    async fn execute(&self, task_id: TaskId) -> Result<TaskStatus, OrchestrationError>;

    async fn get_status(&self, task_id: TaskId) -> Result<StatusReport, OrchestrationError>;

    async fn cancel(&self, task_id: TaskId) -> Result<CancelAck, OrchestrationError>;

    fn subscribe(&self, task_id: TaskId) -> TaskEventReceiver;
}

/// Adapters the service is wired with.
pub struct OrchestrationDeps {
    pub planner: Arc<dyn Planner>,
    pub environment: Arc<dyn ExecutionEnvironment>,
    pub classifier: Arc<dyn FailureClassifier>,
    pub coordination: Arc<dyn CoordinationPort>,
    pub repository: Arc<dyn TaskRepository>,
    pub learning: Arc<dyn LearningStore>,
    pub event_bus: EventBus,
}

struct TaskSlot {
    goal: Goal,
    /// Taken by the first `execute`.
    plan: Mutex<Option<ExecutionPlan>>,
    cancel: CancellationToken,
    progress: Arc<TaskProgress>,
    history: Vec<PastOutcome>,
}

pub struct StandardOrchestrationService {
    planner: Arc<dyn Planner>,
    validator: PlanValidator,
    services: RunnerServices,
    tasks: RwLock<HashMap<TaskId, Arc<TaskSlot>>>,
}

impl StandardOrchestrationService {
    pub fn new(config: OrchestratorConfig, deps: OrchestrationDeps) -> Self {
        let validator = PlanValidator::new(config.role_catalog());
        let recovery = Arc::new(RecoveryEngine::new(
            config.recovery.clone(),
            deps.classifier,
            deps.planner.clone(),
            deps.coordination.clone(),
        ));

        Self {
            planner: deps.planner,
            validator,
            services: RunnerServices {
                config: Arc::new(config),
                environment: deps.environment,
                recovery,
                coordination: deps.coordination,
                repository: deps.repository,
                learning: deps.learning,
                event_bus: deps.event_bus,
            },
            tasks: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.services.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.services.event_bus
    }

    /// Audit log of a task, from memory or the repository.
    pub async fn execution_record(&self, task_id: TaskId) -> Result<ExecutionRecord, OrchestrationError> {
        if let Some(slot) = self.slot(task_id) {
            return Ok(slot.progress.record());
        }
        let entries = self.services.repository.read_record(task_id).await?;
        if entries.is_empty() {
            return Err(OrchestrationError::TaskNotFound(task_id));
        }
        let goal = entries
            .iter()
            .find_map(|e| match &e.event {
                RecordEvent::TaskStarted { goal, .. } => Some(goal.clone()),
                _ => None,
            })
            .unwrap_or_default();
        Ok(ExecutionRecord::restore(task_id, goal, entries))
    }

    fn slot(&self, task_id: TaskId) -> Option<Arc<TaskSlot>> {
        self.tasks.read().get(&task_id).cloned()
    }

    /// Tasks still held in memory.
    pub fn tracked_tasks(&self) -> usize {
        self.tasks.read().len()
    }

    /// Terminal status of a task that is no longer held in memory.
    async fn persisted_terminal_status(&self, task_id: TaskId) -> Result<Option<TaskStatus>, OrchestrationError> {
        let status = self.services.repository.read_status(task_id).await?;
        Ok(status.filter(|s| s.is_terminal()))
    }

    /// Drop a finished task from memory if the repository can answer for it.
    async fn retire(&self, task_id: TaskId, status: TaskStatus) {
        let repository = &self.services.repository;
        let status_saved = matches!(repository.read_status(task_id).await, Ok(Some(s)) if s == status);
        let record_closed = match repository.read_record(task_id).await {
            Ok(entries) => matches!(
                entries.last().map(|e| &e.event),
                Some(RecordEvent::TaskFinished { .. })
            ),
            Err(_) => false,
        };

        if status_saved && record_closed {
            self.tasks.write().remove(&task_id);
            debug!("Task {} retired from memory", task_id);
        } else {
            warn!("Keeping task {} in memory: repository is missing its final state", task_id);
        }
    }

    async fn similar_runs(&self, goal: &Goal) -> (serde_json::Value, Vec<PastOutcome>) {
        match self
            .services
            .learning
            .similar_past_runs(goal, SIMILAR_RUNS_LIMIT)
            .await
        {
            Ok(runs) => {
                let outcomes = runs.iter().flat_map(|r| r.outcomes.iter().cloned()).collect();
                let context = serde_json::to_value(&runs).unwrap_or(serde_json::Value::Null);
                (context, outcomes)
            }
            Err(e) => {
                warn!("Learning store unavailable, planning without history: {}", e);
                (serde_json::Value::Null, Vec::new())
            }
        }
    }

    async fn run(&self, slot: &TaskSlot, plan: ExecutionPlan) -> TaskStatus {
        let task_id = plan.task_id();
        let runner = TaskRunner::new(
            plan,
            slot.goal.clone(),
            self.services.clone(),
            slot.progress.clone(),
            slot.history.clone(),
        );
        let status = runner.run(slot.cancel.clone()).await;
        self.retire(task_id, status).await;
        status
    }
}

#[async_trait]
impl OrchestrationService for StandardOrchestrationService {
    async fn submit(&self, goal: Goal) -> Result<Submission, OrchestrationError> {
        let task_id = TaskId::new();
        info!("Planning task {}: {}", task_id, goal.text);

        let (similar, history) = self.similar_runs(&goal).await;
        let mut context = HashMap::new();
        context.insert("similar_runs".to_string(), similar);

        let raw = self.planner.decompose(&goal, &context).await?;
        let plan = match self.validator.validate(task_id, &raw) {
            Ok(plan) => plan,
            Err(e) => {
                warn!("Plan for task {} rejected with {} violation(s)", task_id, e.violations.len());
                metrics::counter!("conductor_plans_rejected_total").increment(1);
                return Err(e.into());
            }
        };

        self.services.repository.save_plan(&plan).await?;
        self.services
            .repository
            .write_status(task_id, TaskStatus::Pending)
            .await?;

        let summary = plan.summary();
        self.services.event_bus.publish(OrchestrationEvent::PlanAccepted {
            task_id,
            summary: summary.clone(),
            accepted_at: Utc::now(),
        });

        let slot = Arc::new(TaskSlot {
            progress: Arc::new(TaskProgress::new(&plan, &goal)),
            goal,
            plan: Mutex::new(Some(plan)),
            cancel: CancellationToken::new(),
            history,
        });
        self.tasks.write().insert(task_id, slot);

        info!("Accepted plan for task {} with {} phase(s)", task_id, summary.phase_count);
        Ok(Submission { task_id, summary })
    }

    async fn execute(&self, task_id: TaskId) -> Result<TaskStatus, OrchestrationError> {
        let Some(slot) = self.slot(task_id) else {
            return self
                .persisted_terminal_status(task_id)
                .await?
                .ok_or(OrchestrationError::TaskNotFound(task_id));
        };

        let plan = slot.plan.lock().take();
        match plan {
            Some(plan) => Ok(self.run(&slot, plan).await),
            None => {
                let status = slot.progress.status();
                if status.is_terminal() {
                    Ok(status)
                } else {
                    Err(OrchestrationError::AlreadyStarted(task_id))
                }
            }
        }
    }

    async fn get_status(&self, task_id: TaskId) -> Result<StatusReport, OrchestrationError> {
        if let Some(slot) = self.slot(task_id) {
            return Ok(slot.progress.report());
        }

        let repository = &self.services.repository;
        let plan = repository
            .read_plan(task_id)
            .await?
            .ok_or(OrchestrationError::TaskNotFound(task_id))?;
        let status = repository
            .read_status(task_id)
            .await?
            .unwrap_or(TaskStatus::Pending);
        let record = ExecutionRecord::restore(task_id, String::new(), repository.read_record(task_id).await?);
        Ok(StatusReport::build(&plan, status, Some(&record)))
    }

    async fn cancel(&self, task_id: TaskId) -> Result<CancelAck, OrchestrationError> {
        let Some(slot) = self.slot(task_id) else {
            return match self.persisted_terminal_status(task_id).await? {
                Some(_) => Ok(CancelAck {
                    task_id,
                    was_running: false,
                    already_finished: true,
                }),
                None => Err(OrchestrationError::TaskNotFound(task_id)),
            };
        };

        if slot.progress.status().is_terminal() {
            return Ok(CancelAck {
                task_id,
                was_running: false,
                already_finished: true,
            });
        }

        slot.cancel.cancel();
        let pending = slot.plan.lock().take();
        let was_running = pending.is_none();
        if let Some(plan) = pending {
            // Never executed: run the cancellation path so every phase ends
            // CANCELLED and the record is closed.
            self.run(&slot, plan).await;
        }

        info!("Cancellation requested for task {}", task_id);
        Ok(CancelAck {
            task_id,
            was_running,
            already_finished: false,
        })
    }

    fn subscribe(&self, task_id: TaskId) -> TaskEventReceiver {
        self.services.event_bus.subscribe_task(task_id)
    }
}
