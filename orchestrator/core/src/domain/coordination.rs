// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Coordination Port
//!
//! The slice of the coordination bus the orchestrator itself needs: agent
//! membership, help requests on behalf of a failing phase, and closing a
//! task's channels.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Interface between the orchestrator and the coordination bus

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::agent::AgentId;
use crate::domain::phase::PhaseId;
use crate::domain::recovery::FailureClass;
use crate::domain::role::Role;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpRequest {
    pub task_id: TaskId,
    pub phase_id: PhaseId,
    pub role: Role,
    pub problem: String,
    pub classification: FailureClass,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HelpResponse {
    pub responder: AgentId,
    pub suggestion: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HelpOutcome {
    Help(HelpResponse),
    /// Nobody answered within the timeout, or nobody could be asked.
    NoHelp,
}

#[async_trait]
pub trait CoordinationPort: Send + Sync {
    async fn join(&self, task_id: TaskId, agent_id: AgentId, role: Role);

    async fn leave(&self, task_id: TaskId, agent_id: AgentId);

    /// Never fails: an unanswered request resolves to [`HelpOutcome::NoHelp`].
    async fn request_help(&self, request: HelpRequest, timeout: Duration) -> HelpOutcome;

    /// Stop accepting messages for the task.
    async fn close_task(&self, task_id: TaskId);
}
