// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Synchronization Points
//!
//! A named barrier inside a task: released once the expected number of
//! distinct agents have arrived.

use chrono::{DateTime, Utc};
use conductor_core::domain::agent::AgentId;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncPoint {
    pub name: String,
    pub expected: usize,
    arrived: HashSet<AgentId>,
    pub opened_at: DateTime<Utc>,
}

impl SyncPoint {
    pub fn new(name: impl Into<String>, expected: usize) -> Self {
        Self {
            name: name.into(),
            expected: expected.max(1),
            arrived: HashSet::new(),
            opened_at: Utc::now(),
        }
    }

    /// Record an arrival. Repeated arrivals of the same agent count once.
    /// Returns `true` when the point is released.
    pub fn arrive(&mut self, agent_id: AgentId) -> bool {
        self.arrived.insert(agent_id);
        self.is_released()
    }

    pub fn is_released(&self) -> bool {
        self.arrived.len() >= self.expected
    }

    pub fn remaining(&self) -> usize {
        self.expected.saturating_sub(self.arrived.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_after_distinct_arrivals() {
        let mut point = SyncPoint::new("merge", 2);
        let a = AgentId::new();

        assert!(!point.arrive(a));
        assert!(!point.arrive(a));
        assert_eq!(point.remaining(), 1);
        assert!(point.arrive(AgentId::new()));
    }
}
