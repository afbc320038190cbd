// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Runner
//!
//! The single coordinating authority of one task. A runner owns the task's
//! [`Scheduler`] and [`AgentPoolManager`] and reacts to events instead of
//! polling: agent leases, phase results, recovery decisions, retry timers,
//! health checks and cancellation all arrive on one channel and are applied
//! one at a time, so phase state is never changed concurrently.
//!
//! Phase execution is the only genuinely parallel part. Each RUNNING phase
//! runs on its own tokio task and reports back through the channel.
//!
//! Every state change is appended to the execution record, forwarded to the
//! task repository, published on the [`EventBus`] and reflected in the
//! shared [`TaskProgress`] read by `get_status`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Event loop driving one task from start to terminal status

use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::pool::{AgentPoolManager, HealthIssue, Lease, PoolError};
use crate::application::recovery::{RecoveryDecision, RecoveryEngine, RecoveryRequest, RecoveryResult};
use crate::application::scheduler::Scheduler;
use crate::domain::agent::AgentId;
use crate::domain::config::OrchestratorConfig;
use crate::domain::coordination::CoordinationPort;
use crate::domain::events::OrchestrationEvent;
use crate::domain::phase::PhaseId;
use crate::domain::plan::ExecutionPlan;
use crate::domain::record::{ExecutionRecord, RecordEntry, RecordEvent};
use crate::domain::recovery::{FailureClass, PastOutcome};
use crate::domain::repository::{LearningStore, TaskRepository};
use crate::domain::role::Role;
use crate::domain::runtime::{ExecutionEnvironment, PhaseAssignment, PhaseFailure, PhaseOutput};
use crate::domain::task::{Goal, StatusReport, TaskId, TaskStatus};
use crate::infrastructure::event_bus::EventBus;

/// Context key under which a sibling agent's suggestion reaches the next attempt.
pub const HELP_CONTEXT_KEY: &str = "help";

// ============================================================================
// Shared Progress
// ============================================================================

/// Live view of one task, shared between its runner and status readers.
pub struct TaskProgress {
    report: RwLock<StatusReport>,
    record: RwLock<ExecutionRecord>,
}

impl TaskProgress {
    pub fn new(plan: &ExecutionPlan, goal: &Goal) -> Self {
        Self {
            report: RwLock::new(StatusReport::build(plan, TaskStatus::Pending, None)),
            record: RwLock::new(ExecutionRecord::new(plan.task_id(), goal.text.clone())),
        }
    }

    pub fn report(&self) -> StatusReport {
        self.report.read().clone()
    }

    pub fn status(&self) -> TaskStatus {
        self.report.read().status
    }

    pub fn record(&self) -> ExecutionRecord {
        self.record.read().clone()
    }

    /// Resolved retries of every phase except `phase`.
    pub fn past_outcomes_excluding(&self, phase: &PhaseId) -> Vec<PastOutcome> {
        self.record.read().past_outcomes_excluding(phase)
    }

    fn append(&self, event: RecordEvent) -> RecordEntry {
        self.record.write().append(event).clone()
    }

    fn refresh(&self, plan: &ExecutionPlan, status: TaskStatus) {
        let report = {
            let record = self.record.read();
            StatusReport::build(plan, status, Some(&record))
        };
        *self.report.write() = report;
    }
}

// ============================================================================
// Runner
// ============================================================================

/// Collaborators shared by every task of an orchestrator.
#[derive(Clone)]
pub struct RunnerServices {
    pub config: Arc<OrchestratorConfig>,
    pub environment: Arc<dyn ExecutionEnvironment>,
    pub recovery: Arc<RecoveryEngine>,
    pub coordination: Arc<dyn CoordinationPort>,
    pub repository: Arc<dyn TaskRepository>,
    pub learning: Arc<dyn LearningStore>,
    pub event_bus: EventBus,
}

#[derive(Debug)]
enum RunOutcome {
    Succeeded(PhaseOutput),
    Failed(PhaseFailure),
    TimedOut(Duration),
}

enum RunnerEvent {
    Acquired { phase_id: PhaseId, lease: Lease },
    AcquireFailed { phase_id: PhaseId, error: PoolError },
    Finished { phase_id: PhaseId, agent_id: AgentId, outcome: RunOutcome },
    RecoveryDecided { phase_id: PhaseId, result: RecoveryResult },
    RetryDue { phase_id: PhaseId },
}

enum Wake {
    Cancel,
    Event(RunnerEvent),
    Health,
}

struct Inflight {
    agent_id: AgentId,
    task: JoinHandle<()>,
}

pub struct TaskRunner {
    task_id: TaskId,
    goal: Goal,
    services: RunnerServices,
    scheduler: Scheduler,
    pool: Arc<AgentPoolManager>,
    progress: Arc<TaskProgress>,
    history: Vec<PastOutcome>,

    tx: mpsc::UnboundedSender<RunnerEvent>,
    rx: mpsc::UnboundedReceiver<RunnerEvent>,

    inflight: HashMap<PhaseId, Inflight>,
    acquiring: HashMap<PhaseId, JoinHandle<()>>,
    recovering: HashMap<PhaseId, JoinHandle<()>>,
    retry_timers: HashMap<PhaseId, JoinHandle<()>>,
    /// Agents kept BUSY with their failed phase until recovery decides.
    held_agents: HashMap<PhaseId, AgentId>,
    hints: HashMap<PhaseId, String>,
    recovery_decisions: u32,
    /// Set when the pool refused a lease; cleared when an agent frees up.
    backpressure: bool,
}

impl TaskRunner {
    /// `history` holds recovery outcomes of similar past runs.
    pub fn new(
        plan: ExecutionPlan,
        goal: Goal,
        services: RunnerServices,
        progress: Arc<TaskProgress>,
        history: Vec<PastOutcome>,
    ) -> Self {
        let task_id = plan.task_id();
        let config = services.config.clone();
        let pool = Arc::new(AgentPoolManager::new(
            task_id,
            services.environment.clone(),
            config.scheduler.max_concurrent_agents,
            config.pool.clone(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();

        Self {
            task_id,
            goal,
            scheduler: Scheduler::new(plan, &config.scheduler),
            services,
            pool,
            progress,
            history,
            tx,
            rx,
            inflight: HashMap::new(),
            acquiring: HashMap::new(),
            recovering: HashMap::new(),
            retry_timers: HashMap::new(),
            held_agents: HashMap::new(),
            hints: HashMap::new(),
            recovery_decisions: 0,
            backpressure: false,
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    /// Drive the task to a terminal status.
    pub async fn run(mut self, cancel: CancellationToken) -> TaskStatus {
        self.start().await;

        let mut health = tokio::time::interval(self.services.config.pool.heartbeat_interval);
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if cancel.is_cancelled() {
                return self.shutdown_cancelled().await;
            }

            if !self.backpressure {
                self.dispatch();
            }
            self.flush().await;

            if self.scheduler.is_settled() {
                let status = self.scheduler.outcome();
                return self.finish(status).await;
            }

            if self.is_idle() {
                let stalled = self.scheduler.cancel_stalled();
                warn!(
                    "Task {} cannot make progress; cancelling {} phase(s)",
                    self.task_id,
                    stalled.len()
                );
                continue;
            }

            let wake = tokio::select! {
                biased;
                _ = cancel.cancelled() => Wake::Cancel,
                Some(event) = self.rx.recv() => Wake::Event(event),
                _ = health.tick() => Wake::Health,
            };

            match wake {
                Wake::Cancel => return self.shutdown_cancelled().await,
                Wake::Event(event) => self.handle(event).await,
                Wake::Health => self.check_health().await,
            }
        }
    }

    fn is_idle(&self) -> bool {
        self.inflight.is_empty()
            && self.acquiring.is_empty()
            && self.recovering.is_empty()
            && self.retry_timers.is_empty()
    }

    async fn start(&mut self) {
        info!(
            "Starting task {} with {} phase(s)",
            self.task_id,
            self.scheduler.plan().len()
        );
        metrics::counter!("conductor_tasks_started_total").increment(1);
        self.append(RecordEvent::TaskStarted {
            goal: self.goal.text.clone(),
            phase_count: self.scheduler.plan().len(),
        })
        .await;
        self.progress.refresh(self.scheduler.plan(), TaskStatus::Running);
    }

    fn dispatch(&mut self) {
        for phase_id in self.scheduler.tick() {
            let Some(role) = self.scheduler.plan().get(&phase_id).map(|p| p.role) else {
                continue;
            };
            let task = self.spawn_acquire(phase_id.clone(), role);
            self.acquiring.insert(phase_id, task);
        }
    }

    fn spawn_acquire(&self, phase_id: PhaseId, role: Role) -> JoinHandle<()> {
        let pool = self.pool.clone();
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let event = match pool.acquire(role, &phase_id).await {
                Ok(lease) => RunnerEvent::Acquired { phase_id, lease },
                Err(error) => RunnerEvent::AcquireFailed { phase_id, error },
            };
            let _ = tx.send(event);
        })
    }

    async fn handle(&mut self, event: RunnerEvent) {
        match event {
            RunnerEvent::Acquired { phase_id, lease } => {
                self.collect_evicted().await;
                self.on_acquired(phase_id, lease).await
            }
            RunnerEvent::AcquireFailed { phase_id, error } => {
                self.collect_evicted().await;
                self.on_acquire_failed(phase_id, error).await
            }
            RunnerEvent::Finished {
                phase_id,
                agent_id,
                outcome,
            } => self.on_finished(phase_id, agent_id, outcome).await,
            RunnerEvent::RecoveryDecided { phase_id, result } => {
                self.on_recovery_decided(phase_id, result).await
            }
            RunnerEvent::RetryDue { phase_id } => {
                self.retry_timers.remove(&phase_id);
                self.retry(&phase_id);
            }
        }
    }

    async fn collect_evicted(&mut self) {
        for agent_id in self.pool.take_evicted() {
            self.on_agent_terminated(agent_id, "evicted for another role").await;
        }
    }

    async fn on_acquired(&mut self, phase_id: PhaseId, lease: Lease) {
        self.acquiring.remove(&phase_id);

        if lease.spawned {
            self.on_agent_spawned(lease.agent_id, lease.role).await;
        }

        if let Err(e) = self.scheduler.mark_running(&phase_id) {
            warn!("Phase '{}' could not start: {}", phase_id, e);
            self.release_agent(lease.agent_id);
            return;
        }

        let Some(assignment) = self.assignment_for(&phase_id) else {
            return;
        };
        debug!(
            "Phase '{}' attempt {} running on agent {}",
            phase_id, assignment.attempt, lease.agent_id
        );

        let handle = lease.handle.clone();
        let agent_id = lease.agent_id;
        let timeout = self.services.config.scheduler.phase_timeout;
        let tx = self.tx.clone();
        let id = phase_id.clone();
        let task = tokio::spawn(async move {
            let outcome = match timeout {
                Some(limit) => match tokio::time::timeout(limit, handle.run(assignment)).await {
                    Ok(Ok(output)) => RunOutcome::Succeeded(output),
                    Ok(Err(failure)) => RunOutcome::Failed(failure),
                    Err(_) => RunOutcome::TimedOut(limit),
                },
                None => match handle.run(assignment).await {
                    Ok(output) => RunOutcome::Succeeded(output),
                    Err(failure) => RunOutcome::Failed(failure),
                },
            };
            let _ = tx.send(RunnerEvent::Finished {
                phase_id: id,
                agent_id,
                outcome,
            });
        });

        self.inflight.insert(phase_id, Inflight { agent_id, task });
    }

    fn assignment_for(&mut self, phase_id: &PhaseId) -> Option<PhaseAssignment> {
        let plan = self.scheduler.plan();
        let phase = plan.get(phase_id)?;

        let mut context = HashMap::new();
        for dependency in &phase.dependencies {
            if let Some(output) = plan.get(dependency).and_then(|p| p.output()) {
                context.insert(dependency.to_string(), output.clone());
            }
        }
        if let Some(hint) = self.hints.remove(phase_id) {
            context.insert(HELP_CONTEXT_KEY.to_string(), serde_json::Value::String(hint));
        }

        Some(PhaseAssignment {
            task_id: self.task_id,
            phase_id: phase_id.clone(),
            role: phase.role,
            description: phase.description.clone(),
            attempt: phase.attempts(),
            context,
        })
    }

    async fn on_acquire_failed(&mut self, phase_id: PhaseId, error: PoolError) {
        self.acquiring.remove(&phase_id);
        match error {
            PoolError::AtCapacity { limit } => {
                debug!("No agent available for phase '{}' ({} live)", phase_id, limit);
                if let Err(e) = self.scheduler.unassign(&phase_id) {
                    warn!("Failed to return phase '{}' to READY: {}", phase_id, e);
                }
                self.backpressure = true;
            }
            PoolError::Closed => {}
            other => {
                let failure = PhaseFailure::new(format!("agent unavailable: {}", other))
                    .with_kind_hint(FailureClass::TransientInfra);
                self.fail_phase(phase_id, failure, None).await;
            }
        }
    }

    async fn on_finished(&mut self, phase_id: PhaseId, agent_id: AgentId, outcome: RunOutcome) {
        // A stale result: the phase was already failed by a health verdict.
        if !self.owns_phase(&phase_id, agent_id) {
            return;
        }
        self.inflight.remove(&phase_id);
        self.backpressure = false;

        match outcome {
            RunOutcome::Succeeded(output) => {
                for line in &output.logs {
                    debug!(phase = %phase_id, "{}", line);
                }
                if let Err(e) = self.scheduler.complete(&phase_id, output.result) {
                    warn!("Failed to complete phase '{}': {}", phase_id, e);
                }
                self.release_agent(agent_id);
            }
            RunOutcome::Failed(failure) => {
                debug!("Phase '{}' failed: {}", phase_id, failure);
                self.fail_phase(phase_id, failure, Some(agent_id)).await;
            }
            RunOutcome::TimedOut(limit) => {
                warn!("Phase '{}' timed out after {:?}", phase_id, limit);
                self.terminate_agent(agent_id, "phase timeout").await;
                self.fail_phase(phase_id, PhaseFailure::timed_out(limit), None)
                    .await;
            }
        }
    }

    /// FAILED → RECOVERING and hand the failure to the recovery engine.
    async fn fail_phase(&mut self, phase_id: PhaseId, failure: PhaseFailure, held: Option<AgentId>) {
        let failed = self
            .scheduler
            .fail(&phase_id, &failure.message)
            .and_then(|_| self.scheduler.begin_recovery(&phase_id));
        if let Err(e) = failed {
            warn!("Failed to route phase '{}' to recovery: {}", phase_id, e);
            if let Some(agent_id) = held {
                self.release_agent(agent_id);
            }
            return;
        }
        self.flush().await;

        let Some(phase) = self.scheduler.plan().get(&phase_id).cloned() else {
            return;
        };
        let agent = held.and_then(|agent_id| self.pool.handle(agent_id));
        if let Some(agent_id) = held {
            self.held_agents.insert(phase_id.clone(), agent_id);
        }

        // The phase's own retries are already counted by its attempt budget.
        let mut history = self.history.clone();
        history.extend(self.progress.past_outcomes_excluding(&phase_id));

        let request = RecoveryRequest {
            task_id: self.task_id,
            phase,
            failure,
            task_attempts: self.recovery_decisions,
            agent,
            history,
        };
        self.recovery_decisions += 1;

        let engine = self.services.recovery.clone();
        let tx = self.tx.clone();
        let id = phase_id.clone();
        let task = tokio::spawn(async move {
            let result = engine.recover(request).await;
            let _ = tx.send(RunnerEvent::RecoveryDecided { phase_id: id, result });
        });
        self.recovering.insert(phase_id, task);
    }

    async fn on_recovery_decided(&mut self, phase_id: PhaseId, result: RecoveryResult) {
        self.recovering.remove(&phase_id);
        self.backpressure = false;

        let RecoveryResult { decision, attempt } = result;
        self.append(RecordEvent::RecoveryAttempted(attempt.clone())).await;
        self.services
            .event_bus
            .publish(OrchestrationEvent::RecoveryAttempted {
                task_id: self.task_id,
                attempt,
            });

        let held = self.held_agents.remove(&phase_id);
        match decision {
            RecoveryDecision::Retry {
                delay,
                fresh_agent,
                revised,
                hint,
            } => {
                if let Some(agent_id) = held {
                    if fresh_agent {
                        self.terminate_agent(agent_id, "replaced after failure").await;
                    } else {
                        self.release_agent(agent_id);
                    }
                }
                if let Some(revised) = revised {
                    if let Err(e) =
                        self.scheduler
                            .revise(&phase_id, revised.description, revised.estimated_cost)
                    {
                        warn!("Failed to revise phase '{}': {}", phase_id, e);
                    }
                }
                if let Some(hint) = hint {
                    self.hints.insert(phase_id.clone(), hint);
                }

                if delay.is_zero() {
                    self.retry(&phase_id);
                } else {
                    debug!("Retrying phase '{}' in {:?}", phase_id, delay);
                    let tx = self.tx.clone();
                    let id = phase_id.clone();
                    let timer = tokio::spawn(async move {
                        tokio::time::sleep(delay).await;
                        let _ = tx.send(RunnerEvent::RetryDue { phase_id: id });
                    });
                    self.retry_timers.insert(phase_id, timer);
                }
            }
            RecoveryDecision::Escalate { reason } => {
                if let Some(agent_id) = held {
                    self.release_agent(agent_id);
                }
                match self.scheduler.escalate(&phase_id, &reason.to_string()) {
                    Ok(cancelled) if !cancelled.is_empty() => info!(
                        "Escalation of phase '{}' cancelled {} downstream phase(s)",
                        phase_id,
                        cancelled.len()
                    ),
                    Ok(_) => {}
                    Err(e) => warn!("Failed to escalate phase '{}': {}", phase_id, e),
                }
            }
        }
    }

    fn owns_phase(&self, phase_id: &PhaseId, agent_id: AgentId) -> bool {
        self.inflight
            .get(phase_id)
            .is_some_and(|inflight| inflight.agent_id == agent_id)
    }

    fn retry(&mut self, phase_id: &PhaseId) {
        if let Err(e) = self.scheduler.retry(phase_id) {
            warn!("Failed to retry phase '{}': {}", phase_id, e);
        }
    }

    async fn check_health(&mut self) {
        for verdict in self.pool.check_health().await {
            let reason = match verdict.issue {
                HealthIssue::HeartbeatLost => "heartbeat lost",
                HealthIssue::LifetimeExceeded => "lifetime exceeded",
            };
            self.terminate_agent(verdict.agent_id, reason).await;
            self.backpressure = false;

            let Some(phase_id) = verdict.phase else {
                continue;
            };
            if !self.owns_phase(&phase_id, verdict.agent_id) {
                continue;
            }
            if let Some(inflight) = self.inflight.remove(&phase_id) {
                inflight.task.abort();
            }

            let failure = match verdict.issue {
                HealthIssue::HeartbeatLost => PhaseFailure::heartbeat_lost(),
                HealthIssue::LifetimeExceeded => PhaseFailure::timed_out(self.pool.config().agent_timeout),
            };
            self.fail_phase(phase_id, failure, None).await;
        }

        for agent_id in self.pool.reap_idle().await {
            self.on_agent_terminated(agent_id, "idle timeout").await;
            self.backpressure = false;
        }

        let pruned = self.pool.prune_terminated();
        if pruned > 0 {
            debug!("Dropped {} terminated agent(s) of task {}", pruned, self.task_id);
        }
    }

    async fn terminate_agent(&mut self, agent_id: AgentId, reason: &str) {
        match self.pool.terminate(agent_id).await {
            Ok(true) => self.on_agent_terminated(agent_id, reason).await,
            // Terminated earlier and already pruned.
            Ok(false) | Err(PoolError::UnknownAgent(_)) => {}
            Err(e) => warn!("Failed to terminate agent {}: {}", agent_id, e),
        }
    }

    fn release_agent(&self, agent_id: AgentId) {
        match self.pool.release(agent_id) {
            Ok(()) | Err(PoolError::UnknownAgent(_)) => {}
            Err(e) => warn!("Failed to release agent {}: {}", agent_id, e),
        }
    }

    async fn on_agent_spawned(&mut self, agent_id: AgentId, role: Role) {
        self.append(RecordEvent::AgentSpawned { agent_id, role }).await;
        self.services.event_bus.publish(OrchestrationEvent::AgentSpawned {
            task_id: self.task_id,
            agent_id,
            role,
            spawned_at: Utc::now(),
        });
        self.services
            .coordination
            .join(self.task_id, agent_id, role)
            .await;
    }

    async fn on_agent_terminated(&mut self, agent_id: AgentId, reason: &str) {
        self.append(RecordEvent::AgentTerminated {
            agent_id,
            reason: reason.to_string(),
        })
        .await;
        self.services
            .event_bus
            .publish(OrchestrationEvent::AgentTerminated {
                task_id: self.task_id,
                agent_id,
                terminated_at: Utc::now(),
            });
        self.services.coordination.leave(self.task_id, agent_id).await;
    }

    /// Record, publish and expose every queued phase transition.
    async fn flush(&mut self) {
        let transitions = self.scheduler.drain_transitions();
        if transitions.is_empty() {
            return;
        }

        for transition in transitions {
            self.append(RecordEvent::PhaseTransition {
                phase_id: transition.phase_id.clone(),
                from: transition.from,
                to: transition.to,
                cause: transition.cause,
            })
            .await;
            self.services
                .event_bus
                .publish(OrchestrationEvent::PhaseStateChanged {
                    task_id: self.task_id,
                    phase_id: transition.phase_id,
                    from: transition.from,
                    to: transition.to,
                    changed_at: Utc::now(),
                });
        }

        let status = if self.scheduler.is_cancelled() {
            TaskStatus::Cancelled
        } else {
            TaskStatus::Running
        };
        self.progress.refresh(self.scheduler.plan(), status);
    }

    async fn append(&self, event: RecordEvent) {
        let entry = self.progress.append(event);
        if let Err(e) = self
            .services
            .repository
            .append_record(self.task_id, &entry)
            .await
        {
            warn!("Failed to persist record entry {} of task {}: {}", entry.sequence, self.task_id, e);
        }
    }

    async fn shutdown_cancelled(mut self) -> TaskStatus {
        info!("Cancelling task {}", self.task_id);
        let cancelled = self.scheduler.cancel_all();
        debug!("Cancelled {} phase(s) of task {}", cancelled.len(), self.task_id);
        self.flush().await;

        for (_, inflight) in self.inflight.drain() {
            inflight.task.abort();
        }
        for (_, task) in self.recovering.drain() {
            task.abort();
        }
        for (_, timer) in self.retry_timers.drain() {
            timer.abort();
        }

        // Let pending leases land so their agents are terminated below.
        let acquiring: Vec<JoinHandle<()>> = self.acquiring.drain().map(|(_, task)| task).collect();
        futures::future::join_all(acquiring).await;

        self.finish(TaskStatus::Cancelled).await
    }

    async fn finish(mut self, status: TaskStatus) -> TaskStatus {
        for agent_id in self.pool.terminate_all().await {
            self.on_agent_terminated(agent_id, "task finished").await;
        }
        self.services.coordination.close_task(self.task_id).await;

        self.append(RecordEvent::TaskFinished { status }).await;
        self.progress.refresh(self.scheduler.plan(), status);

        let repository = &self.services.repository;
        if let Err(e) = repository.save_plan(self.scheduler.plan()).await {
            warn!("Failed to persist final plan of task {}: {}", self.task_id, e);
        }
        if let Err(e) = repository.write_status(self.task_id, status).await {
            warn!("Failed to persist status of task {}: {}", self.task_id, e);
        }
        if let Err(e) = self
            .services
            .learning
            .record_outcome(&self.progress.record())
            .await
        {
            warn!("Failed to report task {} to the learning store: {}", self.task_id, e);
        }

        metrics::counter!("conductor_tasks_finished_total", "status" => status.as_str()).increment(1);
        info!("Task {} finished: {}", self.task_id, status.as_str());

        self.services.event_bus.publish(OrchestrationEvent::TaskFinished {
            task_id: self.task_id,
            status,
            finished_at: Utc::now(),
        });
        status
    }
}
