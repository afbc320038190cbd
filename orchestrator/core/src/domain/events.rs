// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Orchestration Events
//!
//! Outbound progress notifications, one stream per task. Observers (CLI,
//! dashboards, tests) subscribe through the event bus instead of polling
//! task status.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Event vocabulary for per-task progress

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::agent::AgentId;
use crate::domain::phase::{PhaseId, PhaseState};
use crate::domain::plan::PlanSummary;
use crate::domain::recovery::RecoveryAttempt;
use crate::domain::role::Role;
use crate::domain::task::{TaskId, TaskStatus};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    PlanAccepted {
        task_id: TaskId,
        summary: PlanSummary,
        accepted_at: DateTime<Utc>,
    },
    PhaseStateChanged {
        task_id: TaskId,
        phase_id: PhaseId,
        from: PhaseState,
        to: PhaseState,
        changed_at: DateTime<Utc>,
    },
    AgentSpawned {
        task_id: TaskId,
        agent_id: AgentId,
        role: Role,
        spawned_at: DateTime<Utc>,
    },
    AgentTerminated {
        task_id: TaskId,
        agent_id: AgentId,
        terminated_at: DateTime<Utc>,
    },
    RecoveryAttempted {
        task_id: TaskId,
        attempt: RecoveryAttempt,
    },
    TaskFinished {
        task_id: TaskId,
        status: TaskStatus,
        finished_at: DateTime<Utc>,
    },
}

impl OrchestrationEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            OrchestrationEvent::PlanAccepted { task_id, .. }
            | OrchestrationEvent::PhaseStateChanged { task_id, .. }
            | OrchestrationEvent::AgentSpawned { task_id, .. }
            | OrchestrationEvent::AgentTerminated { task_id, .. }
            | OrchestrationEvent::RecoveryAttempted { task_id, .. }
            | OrchestrationEvent::TaskFinished { task_id, .. } => *task_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrchestrationEvent::TaskFinished { .. })
    }
}
