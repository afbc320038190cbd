// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Execution Environment Port
//!
//! Abstraction over whatever actually hosts agents (processes, containers,
//! remote sandboxes). The orchestrator only spawns, runs, installs into,
//! heartbeats and terminates agents through these traits.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Interface to the sandboxed execution environment

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::phase::PhaseId;
use crate::domain::recovery::FailureClass;
use crate::domain::role::Role;
use crate::domain::task::TaskId;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(with = "humantime_serde")]
    pub wall_time: Duration,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu_millis: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_bytes: Option<u64>,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            wall_time: Duration::from_secs(3600),
            cpu_millis: None,
            memory_bytes: None,
        }
    }
}

/// Everything an agent needs to execute one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseAssignment {
    pub task_id: TaskId,
    pub phase_id: PhaseId,
    pub role: Role,
    pub description: String,
    /// 1 for the first run, incremented on every retry.
    pub attempt: u32,
    /// Outputs of completed dependencies keyed by phase id, plus `help` when
    /// a sibling agent suggested a fix for the previous attempt.
    pub context: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseOutput {
    pub result: serde_json::Value,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub logs: Vec<String>,
}

impl PhaseOutput {
    pub fn new(result: serde_json::Value) -> Self {
        Self {
            result,
            logs: Vec::new(),
        }
    }
}

/// A phase run that did not succeed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseFailure {
    pub message: String,

    /// Set when the environment already knows what kind of failure this is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind_hint: Option<FailureClass>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl PhaseFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind_hint: None,
            details: None,
        }
    }

    pub fn with_kind_hint(mut self, class: FailureClass) -> Self {
        self.kind_hint = Some(class);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self::new(format!("phase timed out after {:?}", limit))
            .with_kind_hint(FailureClass::TransientInfra)
    }

    pub fn heartbeat_lost() -> Self {
        Self::new("infra-timeout: agent stopped sending heartbeats")
            .with_kind_hint(FailureClass::TransientInfra)
    }
}

impl std::fmt::Display for PhaseFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("Failed to spawn agent: {0}")]
    SpawnFailed(String),

    #[error("Failed to install dependency: {0}")]
    InstallFailed(String),

    #[error("Failed to terminate agent: {0}")]
    TerminationFailed(String),

    #[error("Heartbeat failed: {0}")]
    HeartbeatFailed(String),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

/// Live agent inside the execution environment.
#[async_trait]
pub trait AgentHandle: Send + Sync {
    /// Execute one phase to completion.
    async fn run(&self, assignment: PhaseAssignment) -> Result<PhaseOutput, PhaseFailure>;

    /// Install a named dependency into the agent's sandbox.
    async fn install(&self, dependency: &str) -> Result<(), RuntimeError>;

    /// Stop the agent and release its resources. Must tolerate repeated calls.
    async fn terminate(&self) -> Result<(), RuntimeError>;

    /// Liveness check; returns the time the agent reported itself alive.
    async fn heartbeat(&self) -> Result<DateTime<Utc>, RuntimeError>;
}

#[async_trait]
pub trait ExecutionEnvironment: Send + Sync {
    async fn spawn(
        &self,
        role: Role,
        limits: &ResourceLimits,
    ) -> Result<Arc<dyn AgentHandle>, RuntimeError>;
}
