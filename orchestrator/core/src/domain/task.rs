// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Task Domain Model
//!
//! A task is one run of the orchestrator against one goal. It owns exactly one
//! execution plan, one agent pool and one execution record.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Task identity, goal and caller-facing status types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use uuid::Uuid;

use crate::domain::phase::{CancelCause, PhaseId, PhaseState};
use crate::domain::plan::ExecutionPlan;
use crate::domain::recovery::RecoveryAttempt;
use crate::domain::record::ExecutionRecord;
use crate::domain::role::Role;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects: Goal
// ============================================================================

/// Immutable statement of what the caller wants done.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub text: String,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub constraints: HashMap<String, serde_json::Value>,
}

impl Goal {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            constraints: HashMap::new(),
        }
    }

    pub fn with_constraint(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.constraints.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Value Objects: Status
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Plan accepted, execution not started.
    Pending,
    Running,
    /// Every phase completed.
    Completed,
    /// Some phases completed, others escalated or were cancelled downstream.
    Partial,
    /// No phase produced usable output.
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Partial | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Partial => "partial",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-phase view inside a [`StatusReport`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub id: PhaseId,
    pub role: Role,
    pub state: PhaseState,
    pub attempts: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancel_cause: Option<CancelCause>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<serde_json::Value>,

    /// Every recovery decision taken for this phase, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recovery: Vec<RecoveryAttempt>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub phases: Vec<PhaseStatus>,
    pub errors: Vec<String>,
}

impl StatusReport {
    pub fn build(plan: &ExecutionPlan, status: TaskStatus, record: Option<&ExecutionRecord>) -> Self {
        let phases: Vec<PhaseStatus> = plan
            .phases()
            .iter()
            .map(|phase| PhaseStatus {
                id: phase.id.clone(),
                role: phase.role,
                state: phase.state(),
                attempts: phase.attempts(),
                last_error: phase.last_error().map(str::to_string),
                cancel_cause: phase.cancel_cause().cloned(),
                output: phase.output().cloned(),
                recovery: record
                    .map(|r| r.attempts_for(&phase.id).cloned().collect())
                    .unwrap_or_default(),
            })
            .collect();

        let errors = phases
            .iter()
            .filter(|p| matches!(p.state, PhaseState::Escalated | PhaseState::Failed))
            .filter_map(|p| {
                p.last_error
                    .as_ref()
                    .map(|e| format!("phase '{}' ({}): {}", p.id, p.state, e))
            })
            .collect();

        Self {
            task_id: plan.task_id(),
            status,
            phases,
            errors,
        }
    }

    pub fn phase(&self, id: &PhaseId) -> Option<&PhaseStatus> {
        self.phases.iter().find(|p| &p.id == id)
    }

    /// Fraction of phases in a terminal state, in `[0, 1]`.
    pub fn progress(&self) -> f64 {
        if self.phases.is_empty() {
            return 1.0;
        }
        let settled = self.phases.iter().filter(|p| p.state.is_terminal()).count();
        settled as f64 / self.phases.len() as f64
    }
}
