// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Scripted execution environment shared by the orchestration tests.
//!
//! Every phase id maps to a queue of behaviors consumed one per run; an
//! empty queue means "succeed after the default delay".

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use conductor_core::application::orchestration::{OrchestrationDeps, StandardOrchestrationService};
use conductor_core::domain::config::OrchestratorConfig;
use conductor_core::domain::phase::RawPhase;
use conductor_core::domain::recovery::HeuristicClassifier;
use conductor_core::domain::role::Role;
use conductor_core::domain::runtime::{
    AgentHandle, ExecutionEnvironment, PhaseAssignment, PhaseFailure, PhaseOutput,
    ResourceLimits, RuntimeError,
};
use conductor_core::infrastructure::{
    DetachedCoordination, EventBus, InMemoryLearningStore, InMemoryTaskRepository, StaticPlanner,
};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub enum Behavior {
    Succeed(serde_json::Value),
    Fail(PhaseFailure),
    /// Run until the agent is terminated.
    Hang,
    /// Stop answering heartbeats, then run until terminated.
    GoSilent,
}

#[derive(Debug, Clone)]
pub struct RunSpan {
    pub phase_id: String,
    pub started: Instant,
    pub finished: Option<Instant>,
}

#[derive(Default)]
struct Shared {
    scripts: Mutex<HashMap<String, VecDeque<Behavior>>>,
    spans: Mutex<Vec<RunSpan>>,
    agents: Mutex<Vec<Arc<ScriptedAgent>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
    run_started: Notify,
}

pub struct ScriptedEnvironment {
    shared: Arc<Shared>,
    delay: Duration,
}

impl ScriptedEnvironment {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            shared: Arc::new(Shared::default()),
            delay,
        })
    }

    pub fn script(&self, phase_id: &str, behaviors: impl IntoIterator<Item = Behavior>) {
        self.shared
            .scripts
            .lock()
            .entry(phase_id.to_string())
            .or_default()
            .extend(behaviors);
    }

    pub fn spans(&self) -> Vec<RunSpan> {
        self.shared.spans.lock().clone()
    }

    pub fn runs_of(&self, phase_id: &str) -> usize {
        self.shared
            .spans
            .lock()
            .iter()
            .filter(|s| s.phase_id == phase_id)
            .count()
    }

    pub fn max_running(&self) -> usize {
        self.shared.max_running.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn agents(&self) -> Vec<Arc<ScriptedAgent>> {
        self.shared.agents.lock().clone()
    }

    /// Wait until at least `count` runs are executing at once.
    pub async fn wait_for_running(&self, count: usize) {
        loop {
            let notified = self.shared.run_started.notified();
            if self.running() >= count {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl ExecutionEnvironment for ScriptedEnvironment {
    async fn spawn(
        &self,
        role: Role,
        _limits: &ResourceLimits,
    ) -> Result<Arc<dyn AgentHandle>, RuntimeError> {
        let agent = Arc::new(ScriptedAgent {
            role,
            shared: self.shared.clone(),
            delay: self.delay,
            terminated: AtomicBool::new(false),
            silent: AtomicBool::new(false),
            terminate_calls: AtomicUsize::new(0),
            cancel: CancellationToken::new(),
        });
        self.shared.agents.lock().push(agent.clone());
        Ok(agent)
    }
}

pub struct ScriptedAgent {
    pub role: Role,
    shared: Arc<Shared>,
    delay: Duration,
    terminated: AtomicBool,
    silent: AtomicBool,
    terminate_calls: AtomicUsize,
    cancel: CancellationToken,
}

impl ScriptedAgent {
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    pub fn terminate_calls(&self) -> usize {
        self.terminate_calls.load(Ordering::SeqCst)
    }
}

/// Keeps the running gauge honest when the run future is dropped mid-flight.
struct RunGuard {
    shared: Arc<Shared>,
    index: usize,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.shared.running.fetch_sub(1, Ordering::SeqCst);
        if let Some(span) = self.shared.spans.lock().get_mut(self.index) {
            span.finished = Some(Instant::now());
        }
    }
}

#[async_trait]
impl AgentHandle for ScriptedAgent {
    async fn run(&self, assignment: PhaseAssignment) -> Result<PhaseOutput, PhaseFailure> {
        let phase_id = assignment.phase_id.to_string();
        let behavior = self
            .shared
            .scripts
            .lock()
            .get_mut(&phase_id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Behavior::Succeed(serde_json::json!({ "phase": phase_id })));

        let index = {
            let mut spans = self.shared.spans.lock();
            spans.push(RunSpan {
                phase_id: phase_id.clone(),
                started: Instant::now(),
                finished: None,
            });
            spans.len() - 1
        };
        let now = self.shared.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.max_running.fetch_max(now, Ordering::SeqCst);
        let _guard = RunGuard {
            shared: self.shared.clone(),
            index,
        };
        self.shared.run_started.notify_waiters();

        match behavior {
            Behavior::Hang => {
                self.cancel.cancelled().await;
                Err(PhaseFailure::new("agent terminated"))
            }
            Behavior::GoSilent => {
                self.silent.store(true, Ordering::SeqCst);
                self.cancel.cancelled().await;
                Err(PhaseFailure::new("agent terminated"))
            }
            Behavior::Succeed(result) => {
                tokio::select! {
                    _ = tokio::time::sleep(self.delay) => Ok(PhaseOutput::new(result)),
                    _ = self.cancel.cancelled() => Err(PhaseFailure::new("agent terminated")),
                }
            }
            Behavior::Fail(failure) => {
                tokio::time::sleep(self.delay).await;
                Err(failure)
            }
        }
    }

    async fn install(&self, _dependency: &str) -> Result<(), RuntimeError> {
        Ok(())
    }

    async fn terminate(&self) -> Result<(), RuntimeError> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        self.terminated.store(true, Ordering::SeqCst);
        self.cancel.cancel();
        Ok(())
    }

    async fn heartbeat(&self) -> Result<DateTime<Utc>, RuntimeError> {
        if self.is_terminated() {
            return Err(RuntimeError::HeartbeatFailed("terminated".to_string()));
        }
        if self.silent.load(Ordering::SeqCst) {
            return Err(RuntimeError::HeartbeatFailed("no answer".to_string()));
        }
        Ok(Utc::now())
    }
}

pub fn phase(id: &str, role: &str, deps: &[&str]) -> RawPhase {
    RawPhase {
        id: id.to_string(),
        description: format!("work for {}", id),
        role: role.to_string(),
        dependencies: deps.iter().map(|d| d.to_string()).collect(),
        estimated_cost: None,
    }
}

/// Defaults with delays short enough for tests.
pub fn test_config(max_agents: usize) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.scheduler.max_concurrent_agents = max_agents;
    config.recovery.backoff_base = Duration::from_millis(5);
    config.recovery.backoff_max = Duration::from_millis(20);
    config.recovery.help_timeout = Duration::from_millis(20);
    config.pool.heartbeat_interval = Duration::from_millis(50);
    config
}

pub struct Harness {
    pub service: Arc<StandardOrchestrationService>,
    pub environment: Arc<ScriptedEnvironment>,
    pub repository: Arc<InMemoryTaskRepository>,
    pub learning: Arc<InMemoryLearningStore>,
}

pub fn harness(
    config: OrchestratorConfig,
    phases: Vec<RawPhase>,
    environment: Arc<ScriptedEnvironment>,
) -> Harness {
    let repository = Arc::new(InMemoryTaskRepository::new());
    let learning = Arc::new(InMemoryLearningStore::new());
    let deps = OrchestrationDeps {
        planner: Arc::new(StaticPlanner::new(phases)),
        environment: environment.clone(),
        classifier: Arc::new(HeuristicClassifier::new()),
        coordination: Arc::new(DetachedCoordination::new()),
        repository: repository.clone(),
        learning: learning.clone(),
        event_bus: EventBus::with_default_capacity(),
    };

    Harness {
        service: Arc::new(StandardOrchestrationService::new(config, deps)),
        environment,
        repository,
        learning,
    }
}
