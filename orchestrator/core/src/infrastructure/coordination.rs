// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Detached coordination: a [`CoordinationPort`] for orchestrators running
//! without a coordination bus. Membership calls are ignored and help
//! requests always resolve to [`HelpOutcome::NoHelp`].

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use crate::domain::agent::AgentId;
use crate::domain::coordination::{CoordinationPort, HelpOutcome, HelpRequest};
use crate::domain::role::Role;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, Default)]
pub struct DetachedCoordination;

impl DetachedCoordination {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CoordinationPort for DetachedCoordination {
    async fn join(&self, _task_id: TaskId, _agent_id: AgentId, _role: Role) {}

    async fn leave(&self, _task_id: TaskId, _agent_id: AgentId) {}

    async fn request_help(&self, request: HelpRequest, _timeout: Duration) -> HelpOutcome {
        debug!(
            "No coordination bus; help request for phase '{}' goes unanswered",
            request.phase_id
        );
        HelpOutcome::NoHelp
    }

    async fn close_task(&self, _task_id: TaskId) {}
}
