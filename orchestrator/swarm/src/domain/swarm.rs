// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Aggregate
//!
//! The set of agents taking part in one task. Membership decides who
//! receives broadcasts and help requests.

use chrono::{DateTime, Utc};
use conductor_core::domain::agent::AgentId;
use conductor_core::domain::role::Role;
use conductor_core::domain::task::TaskId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwarmError {
    #[error("Swarm of task {0} is closed")]
    Closed(TaskId),

    #[error("Agent {0} is not a member of the swarm")]
    NotAMember(AgentId),
}

/// Aggregate root for the agents of one task.
///
/// # Invariants
///
/// - A closed swarm accepts no new members and never reopens.
/// - An agent appears at most once, with a single role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Swarm {
    pub task_id: TaskId,
    members: HashMap<AgentId, Role>,
    closed: bool,
    pub created_at: DateTime<Utc>,
}

impl Swarm {
    pub fn new(task_id: TaskId) -> Self {
        Self {
            task_id,
            members: HashMap::new(),
            closed: false,
            created_at: Utc::now(),
        }
    }

    /// Returns `false` if the agent was already a member.
    pub fn join(&mut self, agent_id: AgentId, role: Role) -> Result<bool, SwarmError> {
        if self.closed {
            return Err(SwarmError::Closed(self.task_id));
        }
        Ok(self.members.insert(agent_id, role).is_none())
    }

    pub fn leave(&mut self, agent_id: AgentId) -> bool {
        self.members.remove(&agent_id).is_some()
    }

    pub fn contains(&self, agent_id: AgentId) -> bool {
        self.members.contains_key(&agent_id)
    }

    pub fn role_of(&self, agent_id: AgentId) -> Option<Role> {
        self.members.get(&agent_id).copied()
    }

    /// Members other than `except`, in a stable order.
    pub fn siblings(&self, except: Option<AgentId>) -> Vec<AgentId> {
        let mut ids: Vec<AgentId> = self
            .members
            .keys()
            .copied()
            .filter(|id| Some(*id) != except)
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn close(&mut self) {
        self.closed = true;
        self.members.clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_siblings_exclude_sender() {
        let mut swarm = Swarm::new(TaskId::new());
        let a = AgentId::new();
        let b = AgentId::new();
        swarm.join(a, Role::Code).unwrap();
        swarm.join(b, Role::Qa).unwrap();

        assert_eq!(swarm.siblings(Some(a)), vec![b]);
        assert_eq!(swarm.siblings(None).len(), 2);
        assert_eq!(swarm.role_of(b), Some(Role::Qa));
    }

    #[test]
    fn test_closed_swarm_rejects_members() {
        let mut swarm = Swarm::new(TaskId::new());
        swarm.join(AgentId::new(), Role::Code).unwrap();
        swarm.close();

        assert!(swarm.is_empty());
        assert!(matches!(
            swarm.join(AgentId::new(), Role::Code),
            Err(SwarmError::Closed(_))
        ));
    }
}
