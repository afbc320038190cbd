// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent Domain Model
//!
//! An agent is an isolated worker with a single role, owned by the pool of
//! exactly one task. It executes at most one phase at a time.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Agent identity and lifecycle state machine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::domain::phase::PhaseId;
use crate::domain::role::Role;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub Uuid);

impl AgentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for AgentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    Spawning,
    Idle,
    Busy,
    Unhealthy,
    Terminated,
}

impl AgentState {
    /// Counts against the pool ceiling.
    pub fn is_live(&self) -> bool {
        !matches!(self, AgentState::Terminated)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub task_id: TaskId,
    pub role: Role,
    state: AgentState,
    current_phase: Option<PhaseId>,
    pub spawn_time: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    idle_since: Option<DateTime<Utc>>,
}

impl Agent {
    pub fn new(task_id: TaskId, role: Role) -> Self {
        let now = Utc::now();
        Self {
            id: AgentId::new(),
            task_id,
            role,
            state: AgentState::Spawning,
            current_phase: None,
            spawn_time: now,
            last_heartbeat: now,
            idle_since: None,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    pub fn current_phase(&self) -> Option<&PhaseId> {
        self.current_phase.as_ref()
    }

    pub fn idle_since(&self) -> Option<DateTime<Utc>> {
        self.idle_since
    }

    /// The environment finished provisioning the agent.
    pub fn mark_ready(&mut self) -> Result<(), AgentError> {
        if self.state != AgentState::Spawning {
            return Err(AgentError::InvalidState {
                agent: self.id,
                state: self.state,
                operation: "mark_ready",
            });
        }
        let now = Utc::now();
        self.state = AgentState::Idle;
        self.idle_since = Some(now);
        self.last_heartbeat = now;
        Ok(())
    }

    pub fn assign(&mut self, phase: PhaseId) -> Result<(), AgentError> {
        match self.state {
            AgentState::Idle => {
                self.state = AgentState::Busy;
                self.current_phase = Some(phase);
                self.idle_since = None;
                Ok(())
            }
            AgentState::Busy => Err(AgentError::AlreadyBusy {
                agent: self.id,
                phase: self.current_phase.clone().unwrap_or_else(|| phase.clone()),
            }),
            state => Err(AgentError::InvalidState {
                agent: self.id,
                state,
                operation: "assign",
            }),
        }
    }

    /// Return a busy agent to IDLE. Releasing an agent that is not busy is a no-op.
    pub fn release(&mut self) -> Option<PhaseId> {
        if self.state != AgentState::Busy {
            return None;
        }
        self.state = AgentState::Idle;
        self.idle_since = Some(Utc::now());
        self.current_phase.take()
    }

    pub fn record_heartbeat(&mut self, at: DateTime<Utc>) {
        if at > self.last_heartbeat {
            self.last_heartbeat = at;
        }
    }

    /// Flag the agent as unhealthy, returning the phase it was executing.
    pub fn mark_unhealthy(&mut self) -> Option<PhaseId> {
        if !self.state.is_live() {
            return None;
        }
        self.state = AgentState::Unhealthy;
        self.idle_since = None;
        self.current_phase.take()
    }

    /// Returns `false` if the agent was already terminated.
    pub fn terminate(&mut self) -> bool {
        if self.state == AgentState::Terminated {
            return false;
        }
        self.state = AgentState::Terminated;
        self.current_phase = None;
        self.idle_since = None;
        true
    }

    pub fn heartbeat_overdue(&self, now: DateTime<Utc>, grace: Duration) -> bool {
        elapsed(self.last_heartbeat, now) > grace
    }

    pub fn lifetime_exceeded(&self, now: DateTime<Utc>, limit: Duration) -> bool {
        elapsed(self.spawn_time, now) > limit
    }

    pub fn idle_expired(&self, now: DateTime<Utc>, idle_timeout: Duration) -> bool {
        match (self.state, self.idle_since) {
            (AgentState::Idle, Some(since)) => elapsed(since, now) > idle_timeout,
            _ => false,
        }
    }
}

fn elapsed(since: DateTime<Utc>, now: DateTime<Utc>) -> Duration {
    (now - since).to_std().unwrap_or(Duration::ZERO)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("Agent {agent} is already executing phase '{phase}'")]
    AlreadyBusy { agent: AgentId, phase: PhaseId },

    #[error("Agent {agent} is {state:?}; cannot {operation}")]
    InvalidState {
        agent: AgentId,
        state: AgentState,
        operation: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_agent() -> Agent {
        let mut agent = Agent::new(TaskId::new(), Role::Code);
        agent.mark_ready().unwrap();
        agent
    }

    #[test]
    fn test_agent_is_exclusive_to_one_phase() {
        let mut agent = ready_agent();
        agent.assign(PhaseId::new("a")).unwrap();

        let err = agent.assign(PhaseId::new("b")).unwrap_err();
        assert_eq!(
            err,
            AgentError::AlreadyBusy {
                agent: agent.id,
                phase: PhaseId::new("a"),
            }
        );
    }

    #[test]
    fn test_release_returns_to_idle() {
        let mut agent = ready_agent();
        agent.assign(PhaseId::new("a")).unwrap();

        assert_eq!(agent.release(), Some(PhaseId::new("a")));
        assert_eq!(agent.state(), AgentState::Idle);
        assert!(agent.idle_since().is_some());
        assert_eq!(agent.release(), None);
    }

    #[test]
    fn test_terminate_is_idempotent() {
        let mut agent = ready_agent();
        assert!(agent.terminate());
        assert!(!agent.terminate());
        assert!(agent.assign(PhaseId::new("a")).is_err());
    }

    #[test]
    fn test_heartbeat_deadline() {
        let agent = ready_agent();
        let later = agent.last_heartbeat + chrono::Duration::seconds(90);
        assert!(agent.heartbeat_overdue(later, Duration::from_secs(60)));
        assert!(!agent.heartbeat_overdue(later, Duration::from_secs(120)));
    }

    #[test]
    fn test_unhealthy_agent_gives_up_its_phase() {
        let mut agent = ready_agent();
        agent.assign(PhaseId::new("a")).unwrap();
        assert_eq!(agent.mark_unhealthy(), Some(PhaseId::new("a")));
        assert_eq!(agent.state(), AgentState::Unhealthy);
    }
}
