// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Phase Domain Model
//!
//! A phase is one work unit of an execution plan, executed by exactly one
//! agent of the phase's role. Its lifecycle is a closed state machine; every
//! change goes through [`Phase::transition_to`], which consults
//! [`PhaseState::can_transition_to`].
//!
//! ```text
//! PENDING ──▶ READY ──▶ ASSIGNED ──▶ RUNNING ──▶ COMPLETED
//!    ▲          ▲          │            │
//!    │          └──────────┘            ▼
//!    └──────── RECOVERING ◀──────── FAILED ──▶ ESCALATED
//! ```
//!
//! Any non-terminal state may move to CANCELLED. COMPLETED, CANCELLED and
//! ESCALATED are terminal.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Phase entity and its state machine

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::role::Role;

// ============================================================================
// Value Objects: Identifiers
// ============================================================================

/// Planner-assigned identifier of a phase, unique within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(String);

impl PhaseId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PhaseId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for PhaseId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

// ============================================================================
// Value Objects: State
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PhaseState {
    Pending,
    Ready,
    Assigned,
    Running,
    Completed,
    Failed,
    Recovering,
    Cancelled,
    Escalated,
}

impl PhaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseState::Pending => "PENDING",
            PhaseState::Ready => "READY",
            PhaseState::Assigned => "ASSIGNED",
            PhaseState::Running => "RUNNING",
            PhaseState::Completed => "COMPLETED",
            PhaseState::Failed => "FAILED",
            PhaseState::Recovering => "RECOVERING",
            PhaseState::Cancelled => "CANCELLED",
            PhaseState::Escalated => "ESCALATED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PhaseState::Completed | PhaseState::Cancelled | PhaseState::Escalated
        )
    }

    /// Holds an agent slot against the concurrency caps.
    pub fn is_active(&self) -> bool {
        matches!(self, PhaseState::Assigned | PhaseState::Running)
    }

    pub fn can_transition_to(&self, next: PhaseState) -> bool {
        use PhaseState::*;

        if self.is_terminal() {
            return false;
        }
        if next == Cancelled {
            return true;
        }

        matches!(
            (self, next),
            (Pending, Ready)
                | (Ready, Assigned)
                | (Assigned, Ready)
                | (Assigned, Running)
                | (Assigned, Failed)
                | (Running, Completed)
                | (Running, Failed)
                | (Failed, Recovering)
                | (Failed, Escalated)
                | (Recovering, Pending)
                | (Recovering, Escalated)
        )
    }
}

impl fmt::Display for PhaseState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a phase ended up CANCELLED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum CancelCause {
    /// The caller cancelled the whole task.
    TaskCancelled,
    /// A transitive dependency escalated and can no longer complete.
    UpstreamEscalated { phase_id: PhaseId },
    /// Nothing in the task could make further progress.
    Stalled,
}

impl fmt::Display for CancelCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelCause::TaskCancelled => f.write_str("task-cancelled"),
            CancelCause::UpstreamEscalated { phase_id } => {
                write!(f, "upstream-escalated ({})", phase_id)
            }
            CancelCause::Stalled => f.write_str("stalled"),
        }
    }
}

// ============================================================================
// Entity: Phase
// ============================================================================

/// Phase exactly as emitted by a planner, before validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawPhase {
    #[serde(deserialize_with = "scalar::string")]
    pub id: String,

    #[serde(default)]
    pub description: String,

    pub role: String,

    #[serde(
        default,
        alias = "deps",
        alias = "depends_on",
        deserialize_with = "scalar::strings"
    )]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
}

/// Planners often emit numeric ids (`id: 1`); they are read as strings.
mod scalar {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(i64),
        Float(f64),
    }

    impl From<Scalar> for String {
        fn from(value: Scalar) -> Self {
            match value {
                Scalar::Text(s) => s,
                Scalar::Integer(i) => i.to_string(),
                Scalar::Float(f) => f.to_string(),
            }
        }
    }

    pub fn string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
        Scalar::deserialize(deserializer).map(String::from)
    }

    pub fn strings<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        Vec::<Scalar>::deserialize(deserializer).map(|v| v.into_iter().map(String::from).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Phase {
    pub id: PhaseId,
    pub description: String,
    pub role: Role,
    /// Dependency ids in declaration order, without duplicates.
    pub dependencies: Vec<PhaseId>,
    pub estimated_cost: Option<f64>,
    state: PhaseState,
    /// Number of times the phase has entered RUNNING.
    attempts: u32,
    last_error: Option<String>,
    cancel_cause: Option<CancelCause>,
    output: Option<serde_json::Value>,
}

impl Phase {
    pub fn new(
        id: PhaseId,
        description: impl Into<String>,
        role: Role,
        dependencies: Vec<PhaseId>,
        estimated_cost: Option<f64>,
    ) -> Self {
        Self {
            id,
            description: description.into(),
            role,
            dependencies,
            estimated_cost,
            state: PhaseState::Pending,
            attempts: 0,
            last_error: None,
            cancel_cause: None,
            output: None,
        }
    }

    pub fn state(&self) -> PhaseState {
        self.state
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn cancel_cause(&self) -> Option<&CancelCause> {
        self.cancel_cause.as_ref()
    }

    pub fn output(&self) -> Option<&serde_json::Value> {
        self.output.as_ref()
    }

    /// Move to `next`, returning the previous state.
    pub fn transition_to(&mut self, next: PhaseState) -> Result<PhaseState, PhaseError> {
        if self.state.is_terminal() {
            return Err(PhaseError::Immutable {
                phase: self.id.clone(),
                state: self.state,
            });
        }
        if !self.state.can_transition_to(next) {
            return Err(PhaseError::InvalidTransition {
                phase: self.id.clone(),
                from: self.state,
                to: next,
            });
        }

        let previous = self.state;
        self.state = next;
        if next == PhaseState::Running {
            self.attempts += 1;
        }
        Ok(previous)
    }

    pub fn complete(&mut self, output: serde_json::Value) -> Result<PhaseState, PhaseError> {
        let previous = self.transition_to(PhaseState::Completed)?;
        self.output = Some(output);
        self.last_error = None;
        Ok(previous)
    }

    pub fn fail(&mut self, error: impl Into<String>) -> Result<PhaseState, PhaseError> {
        let previous = self.transition_to(PhaseState::Failed)?;
        self.last_error = Some(error.into());
        Ok(previous)
    }

    pub fn cancel(&mut self, cause: CancelCause) -> Result<PhaseState, PhaseError> {
        let previous = self.transition_to(PhaseState::Cancelled)?;
        self.cancel_cause = Some(cause);
        Ok(previous)
    }

    /// Replace the instructions of a phase that is being recovered.
    pub fn revise(
        &mut self,
        description: impl Into<String>,
        estimated_cost: Option<f64>,
    ) -> Result<(), PhaseError> {
        if self.state != PhaseState::Recovering {
            return Err(PhaseError::NotRecovering {
                phase: self.id.clone(),
                state: self.state,
            });
        }
        self.description = description.into();
        if estimated_cost.is_some() {
            self.estimated_cost = estimated_cost;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PhaseError {
    #[error("Phase '{phase}' cannot move from {from} to {to}")]
    InvalidTransition {
        phase: PhaseId,
        from: PhaseState,
        to: PhaseState,
    },

    #[error("Phase '{phase}' is {state} and can no longer change")]
    Immutable { phase: PhaseId, state: PhaseState },

    #[error("Phase '{phase}' is {state}; only recovering phases can be revised")]
    NotRecovering { phase: PhaseId, state: PhaseState },
}
