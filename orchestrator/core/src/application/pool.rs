// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Pool Manager
//!
//! Leases role-specialized agents to phases of one task under a strict
//! ceiling on live agents. Idle agents of the requested role are reused before
//! new ones are spawned; an idle agent of another role is evicted when the
//! ceiling is reached. Health is tracked through environment heartbeats.
//!
//! Lock discipline: the agent table is guarded by a `parking_lot::Mutex` that
//! is never held across an `.await`. Spawning reserves a SPAWNING slot first so
//! concurrent acquisitions cannot overshoot the ceiling.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Agent lifecycle and resource ceiling for one task

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::domain::agent::{Agent, AgentError, AgentId, AgentState};
use crate::domain::config::PoolConfig;
use crate::domain::phase::PhaseId;
use crate::domain::role::Role;
use crate::domain::runtime::{AgentHandle, ExecutionEnvironment, RuntimeError};
use crate::domain::task::TaskId;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Agent pool is at capacity ({limit} live agents)")]
    AtCapacity { limit: usize },

    #[error("Agent pool is closed")]
    Closed,

    #[error("Unknown agent {0}")]
    UnknownAgent(AgentId),

    #[error(transparent)]
    Spawn(#[from] RuntimeError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

/// An agent bound to a phase until released.
#[derive(Clone)]
pub struct Lease {
    pub agent_id: AgentId,
    pub role: Role,
    pub handle: Arc<dyn AgentHandle>,
    /// The agent was spawned for this lease rather than reused.
    pub spawned: bool,
}

impl std::fmt::Debug for Lease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Lease")
            .field("agent_id", &self.agent_id)
            .field("role", &self.role)
            .field("spawned", &self.spawned)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthIssue {
    HeartbeatLost,
    LifetimeExceeded,
}

/// An agent the last health check marked UNHEALTHY.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthVerdict {
    pub agent_id: AgentId,
    pub phase: Option<PhaseId>,
    pub issue: HealthIssue,
}

struct PooledAgent {
    agent: Agent,
    handle: Option<Arc<dyn AgentHandle>>,
}

struct PoolState {
    agents: HashMap<AgentId, PooledAgent>,
    /// Agents evicted by `acquire` that the caller has not collected yet.
    evicted: Vec<AgentId>,
    closed: bool,
}

pub struct AgentPoolManager {
    task_id: TaskId,
    environment: Arc<dyn ExecutionEnvironment>,
    max_agents: usize,
    config: PoolConfig,
    state: Mutex<PoolState>,
}

enum Reservation {
    Reused(Lease),
    Spawn {
        agent_id: AgentId,
        evicted: Option<(AgentId, Arc<dyn AgentHandle>)>,
    },
}

impl AgentPoolManager {
    pub fn new(
        task_id: TaskId,
        environment: Arc<dyn ExecutionEnvironment>,
        max_agents: usize,
        config: PoolConfig,
    ) -> Self {
        Self {
            task_id,
            environment,
            max_agents: max_agents.max(1),
            config,
            state: Mutex::new(PoolState {
                agents: HashMap::new(),
                evicted: Vec::new(),
                closed: false,
            }),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Lease an agent of `role` for `phase`.
    pub async fn acquire(&self, role: Role, phase: &PhaseId) -> Result<Lease, PoolError> {
        let (agent_id, evicted) = match self.reserve(role, phase)? {
            Reservation::Reused(lease) => {
                debug!("Reusing idle {} agent {} for phase '{}'", role, lease.agent_id, phase);
                return Ok(lease);
            }
            Reservation::Spawn { agent_id, evicted } => (agent_id, evicted),
        };

        if let Some((evicted_id, handle)) = evicted {
            info!("Evicting idle agent {} to make room for a {} agent", evicted_id, role);
            if let Err(e) = handle.terminate().await {
                warn!("Failed to terminate evicted agent {}: {}", evicted_id, e);
            }
            self.report_live();
        }

        let limits = self.config.resource_limits();
        let spawned = self.environment.spawn(role, &limits).await;

        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.state.lock().agents.remove(&agent_id);
                warn!("Failed to spawn {} agent for phase '{}': {}", role, phase, e);
                return Err(PoolError::Spawn(e));
            }
        };

        let registered = {
            let mut state = self.state.lock();
            if state.closed {
                state.agents.remove(&agent_id);
                None
            } else if let Some(slot) = state.agents.get_mut(&agent_id) {
                slot.handle = Some(handle.clone());
                slot.agent.mark_ready()?;
                slot.agent.assign(phase.clone())?;
                Some(())
            } else {
                None
            }
        };

        if registered.is_none() {
            // Closed while spawning.
            if let Err(e) = handle.terminate().await {
                warn!("Failed to terminate agent spawned after pool close: {}", e);
            }
            return Err(PoolError::Closed);
        }

        self.report_live();
        info!("Spawned {} agent {} for phase '{}'", role, agent_id, phase);
        Ok(Lease {
            agent_id,
            role,
            handle,
            spawned: true,
        })
    }

    fn reserve(&self, role: Role, phase: &PhaseId) -> Result<Reservation, PoolError> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(PoolError::Closed);
        }

        let idle = state
            .agents
            .values()
            .filter(|p| p.agent.role == role && p.agent.state() == AgentState::Idle)
            .filter(|p| p.handle.is_some())
            .min_by_key(|p| p.agent.spawn_time)
            .map(|p| p.agent.id);

        if let Some(agent_id) = idle {
            if let Some(slot) = state.agents.get_mut(&agent_id) {
                slot.agent.assign(phase.clone())?;
                if let Some(handle) = slot.handle.clone() {
                    return Ok(Reservation::Reused(Lease {
                        agent_id,
                        role,
                        handle,
                        spawned: false,
                    }));
                }
            }
        }

        let live = state.agents.values().filter(|p| p.agent.state().is_live()).count();
        let mut evicted = None;
        if live >= self.max_agents {
            let victim = state
                .agents
                .values()
                .filter(|p| p.agent.state() == AgentState::Idle)
                .min_by_key(|p| p.agent.idle_since())
                .map(|p| p.agent.id);

            match victim {
                Some(victim_id) => {
                    if let Some(slot) = state.agents.remove(&victim_id) {
                        state.evicted.push(victim_id);
                        if let Some(handle) = slot.handle {
                            evicted = Some((victim_id, handle));
                        }
                    }
                }
                None => {
                    return Err(PoolError::AtCapacity {
                        limit: self.max_agents,
                    })
                }
            }
        }

        let agent = Agent::new(self.task_id, role);
        let agent_id = agent.id;
        state.agents.insert(agent_id, PooledAgent { agent, handle: None });
        Ok(Reservation::Spawn { agent_id, evicted })
    }

    /// Return a busy agent to IDLE. Releasing a terminated agent is a no-op.
    pub fn release(&self, agent_id: AgentId) -> Result<(), PoolError> {
        let mut state = self.state.lock();
        let slot = state
            .agents
            .get_mut(&agent_id)
            .ok_or(PoolError::UnknownAgent(agent_id))?;
        if let Some(phase) = slot.agent.release() {
            debug!("Agent {} released from phase '{}'", agent_id, phase);
        }
        Ok(())
    }

    /// Terminate an agent. Returns `false` when it was already terminated.
    pub async fn terminate(&self, agent_id: AgentId) -> Result<bool, PoolError> {
        let handle = {
            let mut state = self.state.lock();
            let slot = state
                .agents
                .get_mut(&agent_id)
                .ok_or(PoolError::UnknownAgent(agent_id))?;
            if !slot.agent.terminate() {
                return Ok(false);
            }
            slot.handle.clone()
        };

        if let Some(handle) = handle {
            if let Err(e) = handle.terminate().await {
                warn!("Environment failed to terminate agent {}: {}", agent_id, e);
            }
        }
        self.report_live();
        info!("Terminated agent {}", agent_id);
        Ok(true)
    }

    /// Close the pool and terminate every agent that is still alive.
    /// Returns the agents terminated by this call.
    pub async fn terminate_all(&self) -> Vec<AgentId> {
        let targets: Vec<AgentId> = {
            let mut state = self.state.lock();
            state.closed = true;
            state
                .agents
                .values()
                .filter(|p| p.agent.state().is_live())
                .map(|p| p.agent.id)
                .collect()
        };

        let results = futures::future::join_all(targets.iter().map(|id| self.terminate(*id))).await;
        targets
            .into_iter()
            .zip(results)
            .filter_map(|(id, result)| matches!(result, Ok(true)).then_some(id))
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Poll heartbeats and mark agents that went silent or outlived their
    /// wall-time limit as UNHEALTHY.
    pub async fn check_health(&self) -> Vec<HealthVerdict> {
        let handles: Vec<(AgentId, Arc<dyn AgentHandle>)> = {
            let state = self.state.lock();
            state
                .agents
                .values()
                .filter(|p| matches!(p.agent.state(), AgentState::Idle | AgentState::Busy))
                .filter_map(|p| p.handle.clone().map(|h| (p.agent.id, h)))
                .collect()
        };

        let beats = futures::future::join_all(
            handles
                .iter()
                .map(|(id, handle)| async move { (*id, handle.heartbeat().await) }),
        )
        .await;

        let now = Utc::now();
        let mut verdicts = Vec::new();
        let mut state = self.state.lock();
        for (agent_id, beat) in beats {
            let Some(slot) = state.agents.get_mut(&agent_id) else {
                continue;
            };
            match beat {
                Ok(at) => slot.agent.record_heartbeat(at),
                Err(e) => debug!("Heartbeat from agent {} failed: {}", agent_id, e),
            }

            let issue = if slot.agent.lifetime_exceeded(now, self.config.agent_timeout) {
                Some(HealthIssue::LifetimeExceeded)
            } else if slot.agent.heartbeat_overdue(now, self.config.heartbeat_grace) {
                Some(HealthIssue::HeartbeatLost)
            } else {
                None
            };

            if let Some(issue) = issue {
                if !matches!(slot.agent.state(), AgentState::Idle | AgentState::Busy) {
                    continue;
                }
                let phase = slot.agent.mark_unhealthy();
                warn!("Agent {} marked unhealthy ({:?})", agent_id, issue);
                verdicts.push(HealthVerdict {
                    agent_id,
                    phase,
                    issue,
                });
            }
        }
        verdicts
    }

    /// Terminate agents idle for longer than the idle timeout.
    pub async fn reap_idle(&self) -> Vec<AgentId> {
        let now = Utc::now();
        let expired: Vec<AgentId> = {
            let state = self.state.lock();
            state
                .agents
                .values()
                .filter(|p| p.agent.idle_expired(now, self.config.idle_timeout))
                .map(|p| p.agent.id)
                .collect()
        };

        let mut reaped = Vec::new();
        for agent_id in expired {
            if let Ok(true) = self.terminate(agent_id).await {
                reaped.push(agent_id);
            }
        }
        reaped
    }

    /// Agents terminated by eviction since the last call.
    pub fn take_evicted(&self) -> Vec<AgentId> {
        std::mem::take(&mut self.state.lock().evicted)
    }

    /// Forget terminated agents. Returns how many were dropped.
    pub fn prune_terminated(&self) -> usize {
        let mut state = self.state.lock();
        let before = state.agents.len();
        state
            .agents
            .retain(|_, p| p.agent.state() != AgentState::Terminated);
        before - state.agents.len()
    }

    pub fn agent(&self, agent_id: AgentId) -> Option<Agent> {
        self.state.lock().agents.get(&agent_id).map(|p| p.agent.clone())
    }

    pub fn handle(&self, agent_id: AgentId) -> Option<Arc<dyn AgentHandle>> {
        self.state
            .lock()
            .agents
            .get(&agent_id)
            .and_then(|p| p.handle.clone())
    }

    pub fn snapshot(&self) -> Vec<Agent> {
        let mut agents: Vec<Agent> = self.state.lock().agents.values().map(|p| p.agent.clone()).collect();
        agents.sort_by_key(|a| a.spawn_time);
        agents
    }

    pub fn live_count(&self) -> usize {
        self.state
            .lock()
            .agents
            .values()
            .filter(|p| p.agent.state().is_live())
            .count()
    }

    pub fn busy_count(&self) -> usize {
        self.state
            .lock()
            .agents
            .values()
            .filter(|p| p.agent.state() == AgentState::Busy)
            .count()
    }

    fn report_live(&self) {
        metrics::gauge!("conductor_pool_live_agents").set(self.live_count() as f64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::runtime::{PhaseAssignment, PhaseFailure, PhaseOutput, ResourceLimits};
    use async_trait::async_trait;
    use chrono::DateTime;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    struct MockHandle {
        alive: AtomicBool,
        terminations: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AgentHandle for MockHandle {
        async fn run(&self, _assignment: PhaseAssignment) -> Result<PhaseOutput, PhaseFailure> {
            Ok(PhaseOutput::new(serde_json::Value::Null))
        }

        async fn install(&self, _dependency: &str) -> Result<(), RuntimeError> {
            Ok(())
        }

        async fn terminate(&self) -> Result<(), RuntimeError> {
            self.alive.store(false, Ordering::SeqCst);
            self.terminations.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn heartbeat(&self) -> Result<DateTime<Utc>, RuntimeError> {
            if self.alive.load(Ordering::SeqCst) {
                Ok(Utc::now())
            } else {
                Err(RuntimeError::HeartbeatFailed("gone".to_string()))
            }
        }
    }

    struct MockEnvironment {
        spawns: AtomicUsize,
        terminations: Arc<AtomicUsize>,
        silent: AtomicBool,
    }

    impl MockEnvironment {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                spawns: AtomicUsize::new(0),
                terminations: Arc::new(AtomicUsize::new(0)),
                silent: AtomicBool::new(false),
            })
        }
    }

    #[async_trait]
    impl ExecutionEnvironment for MockEnvironment {
        async fn spawn(
            &self,
            _role: Role,
            _limits: &ResourceLimits,
        ) -> Result<Arc<dyn AgentHandle>, RuntimeError> {
            self.spawns.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(MockHandle {
                alive: AtomicBool::new(!self.silent.load(Ordering::SeqCst)),
                terminations: self.terminations.clone(),
            }))
        }
    }

    fn pool(env: Arc<MockEnvironment>, max: usize, config: PoolConfig) -> AgentPoolManager {
        AgentPoolManager::new(TaskId::new(), env, max, config)
    }

    #[tokio::test]
    async fn test_idle_agent_of_same_role_is_reused() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 2, PoolConfig::default());

        let first = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        assert!(first.spawned);
        pool.release(first.agent_id).unwrap();

        let second = pool.acquire(Role::Code, &PhaseId::new("b")).await.unwrap();
        assert!(!second.spawned);
        assert_eq!(second.agent_id, first.agent_id);
        assert_eq!(env.spawns.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_ceiling_is_enforced() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 1, PoolConfig::default());

        let _busy = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        let err = pool.acquire(Role::Code, &PhaseId::new("b")).await.unwrap_err();
        assert!(matches!(err, PoolError::AtCapacity { limit: 1 }));
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn test_idle_agent_of_other_role_is_evicted_at_ceiling() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 1, PoolConfig::default());

        let writer = pool.acquire(Role::Writer, &PhaseId::new("a")).await.unwrap();
        pool.release(writer.agent_id).unwrap();

        let coder = pool.acquire(Role::Code, &PhaseId::new("b")).await.unwrap();
        assert!(coder.spawned);
        assert_eq!(env.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(pool.live_count(), 1);
    }

    #[tokio::test]
    async fn test_terminate_is_idempotent() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 2, PoolConfig::default());

        let lease = pool.acquire(Role::Qa, &PhaseId::new("a")).await.unwrap();
        assert!(pool.terminate(lease.agent_id).await.unwrap());
        assert!(!pool.terminate(lease.agent_id).await.unwrap());
        assert_eq!(env.terminations.load(Ordering::SeqCst), 1);
        assert_eq!(pool.agent(lease.agent_id).unwrap().state(), AgentState::Terminated);
    }

    #[tokio::test]
    async fn test_terminate_all_closes_the_pool() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 3, PoolConfig::default());

        let a = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        let b = pool.acquire(Role::Qa, &PhaseId::new("b")).await.unwrap();
        pool.release(b.agent_id).unwrap();

        let mut terminated = pool.terminate_all().await;
        terminated.sort();
        let mut expected = vec![a.agent_id, b.agent_id];
        expected.sort();
        assert_eq!(terminated, expected);

        let err = pool.acquire(Role::Code, &PhaseId::new("c")).await.unwrap_err();
        assert!(matches!(err, PoolError::Closed));
    }

    #[tokio::test]
    async fn test_silent_agent_is_marked_unhealthy() {
        let env = MockEnvironment::new();
        env.silent.store(true, Ordering::SeqCst);
        let config = PoolConfig {
            heartbeat_grace: Duration::from_millis(20),
            ..PoolConfig::default()
        };
        let pool = pool(env.clone(), 2, config);

        let lease = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let verdicts = pool.check_health().await;
        assert_eq!(
            verdicts,
            vec![HealthVerdict {
                agent_id: lease.agent_id,
                phase: Some(PhaseId::new("a")),
                issue: HealthIssue::HeartbeatLost,
            }]
        );
        assert_eq!(pool.agent(lease.agent_id).unwrap().state(), AgentState::Unhealthy);
    }

    #[tokio::test]
    async fn test_healthy_agent_passes_check() {
        let env = MockEnvironment::new();
        let config = PoolConfig {
            heartbeat_grace: Duration::from_millis(20),
            ..PoolConfig::default()
        };
        let pool = pool(env.clone(), 2, config);

        let _lease = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(pool.check_health().await.is_empty());
    }

    #[tokio::test]
    async fn test_idle_agents_are_reaped() {
        let env = MockEnvironment::new();
        let config = PoolConfig {
            idle_timeout: Duration::from_millis(10),
            ..PoolConfig::default()
        };
        let pool = pool(env.clone(), 2, config);

        let lease = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        pool.release(lease.agent_id).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(pool.reap_idle().await, vec![lease.agent_id]);
        assert_eq!(pool.live_count(), 0);
    }

    #[tokio::test]
    async fn test_evicted_agents_are_collected_once() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 1, PoolConfig::default());

        let writer = pool.acquire(Role::Writer, &PhaseId::new("a")).await.unwrap();
        assert!(pool.take_evicted().is_empty());
        pool.release(writer.agent_id).unwrap();

        pool.acquire(Role::Code, &PhaseId::new("b")).await.unwrap();
        assert_eq!(pool.take_evicted(), vec![writer.agent_id]);
        assert!(pool.take_evicted().is_empty());
        assert!(pool.agent(writer.agent_id).is_none());
    }

    #[tokio::test]
    async fn test_terminated_agents_are_pruned() {
        let env = MockEnvironment::new();
        let pool = pool(env.clone(), 2, PoolConfig::default());

        let a = pool.acquire(Role::Code, &PhaseId::new("a")).await.unwrap();
        let b = pool.acquire(Role::Qa, &PhaseId::new("b")).await.unwrap();
        pool.terminate(a.agent_id).await.unwrap();

        assert_eq!(pool.prune_terminated(), 1);
        assert_eq!(pool.prune_terminated(), 0);
        assert!(pool.agent(a.agent_id).is_none());
        assert_eq!(pool.agent(b.agent_id).unwrap().state(), AgentState::Busy);
    }
}
